//! Engine-wide limiter settings.

use std::path::PathBuf;

use crate::policy::Policy;

/// Table name the schema migration creates and the table driver uses unless
/// overridden.
pub const DEFAULT_DB_TABLE: &str = "rate_limit_counters";

/// Which persistence backend counts requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    File,
    Db,
}

impl Driver {
    /// Parse a configured driver name. Unknown names yield `None`, which
    /// leaves the engine inert.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Some(Driver::File),
            "db" => Some(Driver::Db),
            _ => None,
        }
    }
}

/// Fully resolved limiter settings with defaults applied. Built once at
/// startup and threaded into the evaluator - never read from global state.
#[derive(Debug, Clone)]
pub struct LimiterSettings {
    /// No driver means the entire engine is inert: no middleware, no
    /// cleanup, no storage access.
    pub driver: Option<Driver>,

    /// Counter directory for the file driver.
    pub file_directory: Option<PathBuf>,

    /// Counter table for the table driver.
    pub db_table: String,

    /// Settings-level default for policies that do not set `exclude_tests`.
    pub exclude_tests: bool,

    /// Global policy evaluated once per request, or `None` to disable
    /// global limiting.
    pub default_policy: Option<Policy>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            driver: None,
            file_directory: None,
            db_table: DEFAULT_DB_TABLE.to_string(),
            exclude_tests: false,
            default_policy: None,
        }
    }
}

impl LimiterSettings {
    pub fn is_enabled(&self) -> bool {
        self.driver.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_parses_known_names() {
        assert_eq!(Driver::parse("file"), Some(Driver::File));
        assert_eq!(Driver::parse(" DB "), Some(Driver::Db));
        assert_eq!(Driver::parse("redis"), None);
        assert_eq!(Driver::parse(""), None);
    }

    #[test]
    fn defaults_leave_engine_inert() {
        let settings = LimiterSettings::default();
        assert!(!settings.is_enabled());
        assert_eq!(settings.db_table, DEFAULT_DB_TABLE);
        assert!(!settings.exclude_tests);
        assert!(settings.default_policy.is_none());
    }
}
