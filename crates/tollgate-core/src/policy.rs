//! Rate limit policy configuration.

use serde::{Deserialize, Serialize};

/// Storage path used for the global default policy, which is not scoped to
/// any particular route.
pub const DEFAULT_SCOPE: &str = "_default_";

/// Key type every policy falls back to when none is configured.
pub const DEFAULT_KEY_TYPE: &str = "ip";

/// One rate-limited scope: at most `limit` requests per `within` seconds,
/// counted by the first key type in `by` that resolves to a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Maximum requests allowed in one window. Zero disables the policy.
    pub limit: i64,

    /// Window length in seconds. Zero disables the policy.
    pub within: i64,

    /// Key types to count by, in selection order. A bare string is treated
    /// as a single-element list; empty falls back to `["ip"]`.
    #[serde(default)]
    pub by: KeySelection,

    /// Whether automated-test traffic bypasses this policy. Inherits the
    /// settings-level value when unset.
    #[serde(default)]
    pub exclude_tests: Option<bool>,

    /// Lifecycle stage name for the default policy. Accepted for
    /// configuration compatibility; a resident server evaluates the default
    /// policy at request entry regardless.
    #[serde(default)]
    pub hook: Option<String>,
}

impl Policy {
    pub fn new(limit: i64, within: i64) -> Self {
        Self {
            limit,
            within,
            by: KeySelection::default(),
            exclude_tests: None,
            hook: None,
        }
    }

    /// A policy with no effective limit never counts or denies.
    pub fn is_noop(&self) -> bool {
        self.limit <= 0 || self.within <= 0
    }

    /// The configured key types in selection order, normalized: bare strings
    /// wrapped, blanks dropped, and `["ip"]` substituted when nothing valid
    /// remains.
    pub fn key_types(&self) -> Vec<&str> {
        let listed: Vec<&str> = match &self.by {
            KeySelection::One(name) => vec![name.as_str()],
            KeySelection::Many(names) => names.iter().map(String::as_str).collect(),
        };

        let listed: Vec<&str> = listed.into_iter().filter(|name| !name.is_empty()).collect();

        if listed.is_empty() {
            vec![DEFAULT_KEY_TYPE]
        } else {
            listed
        }
    }
}

/// Key selection for a policy: either one key type or an ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySelection {
    One(String),
    Many(Vec<String>),
}

impl Default for KeySelection {
    fn default() -> Self {
        KeySelection::Many(Vec::new())
    }
}

impl From<&str> for KeySelection {
    fn from(name: &str) -> Self {
        KeySelection::One(name.to_string())
    }
}

impl<S: Into<String>> FromIterator<S> for KeySelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        KeySelection::Many(iter.into_iter().map(Into::into).collect())
    }
}

/// Normalize a route path for use as a storage key: the characters `/`,
/// `\`, `{`, `}`, `:` and `?` all become `_`.
pub fn sanitize_route_path(path: &str) -> String {
    path.chars()
        .map(|c| match c {
            '/' | '\\' | '{' | '}' | ':' | '?' => '_',
            other => other,
        })
        .collect()
}
