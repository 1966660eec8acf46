//! Per-request key resolution.

use std::collections::BTreeMap;

/// The identifying keys resolved for one request, mapping key-type name
/// (e.g. `"ip"`) to its value. The HTTP host seeds `"ip"` and registered
/// key providers merge further types in before evaluation.
#[derive(Debug, Clone, Default)]
pub struct RequestKeys(BTreeMap<String, String>);

impl RequestKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys seeded with the resolved client address.
    pub fn with_ip(ip: impl Into<String>) -> Self {
        let mut keys = Self::new();
        keys.insert(crate::policy::DEFAULT_KEY_TYPE, ip);
        keys
    }

    pub fn insert(&mut self, key_type: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key_type.into(), value.into());
    }

    pub fn get(&self, key_type: &str) -> Option<&str> {
        self.0.get(key_type).map(String::as_str)
    }

    /// Walk `order` and return the first key type that holds a non-empty
    /// value, together with that value.
    pub fn select(&self, order: &[&str]) -> Option<(&str, &str)> {
        for key_type in order {
            if let Some((name, value)) = self.0.get_key_value(*key_type) {
                if !value.is_empty() {
                    return Some((name.as_str(), value.as_str()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_prefers_earlier_key_types() {
        let mut keys = RequestKeys::with_ip("1.2.3.4");
        keys.insert("user", "u-42");

        assert_eq!(keys.select(&["user", "ip"]), Some(("user", "u-42")));
        assert_eq!(keys.select(&["ip", "user"]), Some(("ip", "1.2.3.4")));
    }

    #[test]
    fn select_skips_empty_values() {
        let mut keys = RequestKeys::with_ip("1.2.3.4");
        keys.insert("user", "");

        assert_eq!(keys.select(&["user", "ip"]), Some(("ip", "1.2.3.4")));
    }

    #[test]
    fn select_returns_none_when_nothing_resolves() {
        let keys = RequestKeys::new();
        assert_eq!(keys.select(&["user", "ip"]), None);
    }
}
