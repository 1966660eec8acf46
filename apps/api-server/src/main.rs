//! # Tollgate API Server
//!
//! The main entry point for the Actix-web HTTP server hosting the
//! fixed-window rate limiter.

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::ServiceRequest, web};
use tokio_cron_scheduler::JobSchedulerError;
use tracing_actix_web::TracingLogger;

mod background;
mod config;
mod handlers;
mod middleware;
mod observability;
mod state;

use background::scheduler::Scheduler;
use config::AppConfig;
use middleware::rate_limit::RateLimitMiddleware;
use observability::RequestIdMiddleware;
use state::{AppState, KeyProvider};
use tollgate_core::evaluator::RateLimitEvaluator;
use tollgate_core::policy::Policy;
use tollgate_core::routes::RouteLimitTable;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Tollgate API Server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config, route_limits(), key_providers()).await;

    // Startup sweep plus the recurring cleanup job, only when a driver is
    // configured.
    let _scheduler = match state.limiter.clone() {
        Some(limiter) => Some(
            start_cleanup(&config, limiter)
                .await
                .map_err(std::io::Error::other)?,
        ),
        None => None,
    };

    let app_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(RateLimitMiddleware::new(app_state.clone()))
            .wrap(RequestIdMiddleware)
            .app_data(web::Data::new(app_state.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

/// Sweep expired counters once at startup, then on the configured schedule.
async fn start_cleanup(
    config: &AppConfig,
    limiter: Arc<RateLimitEvaluator>,
) -> Result<Scheduler, JobSchedulerError> {
    match limiter.purge_expired().await {
        Ok(removed) => tracing::info!(removed, "Swept expired rate limit counters"),
        Err(e) => tracing::warn!("Startup counter sweep failed: {}", e),
    }

    let scheduler = Scheduler::new().await?;
    let sweep_limiter = limiter.clone();
    scheduler
        .add_cron(&config.sweep_schedule, move || {
            let limiter = sweep_limiter.clone();
            async move {
                match limiter.purge_expired().await {
                    Ok(removed) => {
                        tracing::debug!(removed, "Swept expired rate limit counters")
                    }
                    Err(e) => tracing::warn!("Scheduled counter sweep failed: {}", e),
                }
            }
        })
        .await?;
    scheduler.start().await?;

    Ok(scheduler)
}

/// Route-attached limits: the route metadata the middleware consults after
/// the global default policy.
fn route_limits() -> RouteLimitTable {
    let mut echo_policy = Policy::new(5, 60);
    echo_policy.by = ["user", "ip"].into_iter().collect();

    RouteLimitTable::new().limit("/api/echo", echo_policy)
}

/// Extra key types merged into every request's key map. The `user` key is
/// resolved from the `X-User-Id` header a fronting auth layer sets.
fn key_providers() -> Vec<KeyProvider> {
    vec![Arc::new(|req: &ServiceRequest| {
        req.headers()
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(|id| ("user".to_string(), id.to_string()))
    })]
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,api_server=debug,tollgate_infra=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}
