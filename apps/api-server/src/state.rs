//! Application state - shared across all handlers and middleware.

use std::sync::Arc;

use actix_web::dev::ServiceRequest;
use tracing::{info, warn};

use tollgate_core::evaluator::RateLimitEvaluator;
use tollgate_core::ports::CounterStore;
use tollgate_core::routes::RouteLimitTable;
use tollgate_core::settings::Driver;
use tollgate_infra::{FileCounterStore, TableCounterStore};

use crate::config::AppConfig;

/// Resolves an additional key type from the incoming request; results are
/// merged into the request's key map before evaluation.
pub type KeyProvider = Arc<dyn Fn(&ServiceRequest) -> Option<(String, String)> + Send + Sync>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no driver is configured - the engine is inert.
    pub limiter: Option<Arc<RateLimitEvaluator>>,
    pub route_limits: Arc<RouteLimitTable>,
    pub key_providers: Arc<Vec<KeyProvider>>,
}

impl AppState {
    /// Build the application state with the configured counter backend.
    pub async fn new(
        config: &AppConfig,
        route_limits: RouteLimitTable,
        key_providers: Vec<KeyProvider>,
    ) -> Self {
        Self {
            limiter: Self::build_limiter(config).await,
            route_limits: Arc::new(route_limits),
            key_providers: Arc::new(key_providers),
        }
    }

    async fn build_limiter(config: &AppConfig) -> Option<Arc<RateLimitEvaluator>> {
        let settings = config.rate_limits.clone();

        let store: Arc<dyn CounterStore> = match settings.driver {
            None => {
                info!("No rate limit driver configured, limiting disabled");
                return None;
            }
            Some(Driver::File) => {
                let Some(directory) = settings.file_directory.clone() else {
                    warn!("File driver configured without RATE_LIMIT_FILE_DIR, limiting disabled");
                    return None;
                };
                info!(directory = %directory.display(), "Using file counter store");
                Arc::new(FileCounterStore::new(directory))
            }
            Some(Driver::Db) => {
                let Some(db_config) = config.database.as_ref() else {
                    warn!("Db driver configured without DATABASE_URL, limiting disabled");
                    return None;
                };
                match db_config.connect().await {
                    Ok(conn) => {
                        info!(table = %settings.db_table, "Using table counter store");
                        // Fixture rows survive sweeps unless tests are
                        // excluded from limiting altogether.
                        Arc::new(TableCounterStore::new(
                            conn,
                            settings.db_table.clone(),
                            !settings.exclude_tests,
                        ))
                    }
                    Err(e) => {
                        warn!("Failed to connect to database: {}. Limiting disabled.", e);
                        return None;
                    }
                }
            }
        };

        if let Some(hook) = settings
            .default_policy
            .as_ref()
            .and_then(|policy| policy.hook.as_deref())
        {
            // Every per-request hook stage collapses into request entry in a
            // resident server.
            info!(hook = %hook, "Default policy hook accepted; it runs at request entry");
        }

        Some(Arc::new(RateLimitEvaluator::new(
            store,
            settings,
            config.runtime_context(),
        )))
    }
}
