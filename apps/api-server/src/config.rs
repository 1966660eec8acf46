//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use tollgate_core::context::RuntimeContext;
use tollgate_core::policy::Policy;
use tollgate_core::settings::{DEFAULT_DB_TABLE, Driver, LimiterSettings};
use tollgate_infra::DatabaseConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: Option<DatabaseConfig>,
    pub rate_limits: LimiterSettings,
    /// Cron expression for the recurring expired-counter sweep.
    pub sweep_schedule: String,
    /// Whether this deployment serves automated-test traffic.
    pub test_run: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database = env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
            url,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        });

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database,
            rate_limits: Self::limiter_settings(),
            sweep_schedule: env::var("RATE_LIMIT_SWEEP_SCHEDULE")
                .unwrap_or_else(|_| "0 */10 * * * *".to_string()),
            test_run: env::var("APP_ENV").map(|v| v == "test").unwrap_or(false),
        }
    }

    /// Resolve limiter settings, applying defaults for anything omitted.
    /// An unset or unknown driver leaves the whole engine inert.
    fn limiter_settings() -> LimiterSettings {
        let driver = env::var("RATE_LIMIT_DRIVER").ok().and_then(|raw| {
            let parsed = Driver::parse(&raw);
            if parsed.is_none() {
                tracing::warn!(driver = %raw, "Unknown rate limit driver, limiting disabled");
            }
            parsed
        });

        LimiterSettings {
            driver,
            file_directory: env::var("RATE_LIMIT_FILE_DIR").ok().map(PathBuf::from),
            db_table: env::var("RATE_LIMIT_DB_TABLE")
                .unwrap_or_else(|_| DEFAULT_DB_TABLE.to_string()),
            exclude_tests: env::var("RATE_LIMIT_EXCLUDE_TESTS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            default_policy: Self::default_policy(),
        }
    }

    /// The global policy, present only when both limit and window are set.
    fn default_policy() -> Option<Policy> {
        let limit = env::var("RATE_LIMIT_DEFAULT_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())?;
        let within = env::var("RATE_LIMIT_DEFAULT_WITHIN")
            .ok()
            .and_then(|s| s.parse().ok())?;

        let mut policy = Policy::new(limit, within);
        if let Ok(by) = env::var("RATE_LIMIT_DEFAULT_BY") {
            policy.by = by
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect();
        }
        if let Ok(hook) = env::var("RATE_LIMIT_DEFAULT_HOOK") {
            policy.hook = Some(hook);
        }
        Some(policy)
    }

    pub fn runtime_context(&self) -> RuntimeContext {
        RuntimeContext::http().with_test_run(self.test_run)
    }
}
