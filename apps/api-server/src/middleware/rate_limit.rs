//! Rate limiting middleware - the request side of the lifecycle wiring.
//!
//! On every request: resolve the identifying keys, evaluate the global
//! default policy against the `_default_` scope, then evaluate each policy
//! attached to the matched route against the route pattern's sanitized path.
//! The first denial short-circuits with `429 Too Many Requests`.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;

use actix_web::{
    Error, ResponseError,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use tracing::warn;

use tollgate_core::evaluator::{Decision, RateLimitEvaluator};
use tollgate_core::keys::RequestKeys;
use tollgate_core::policy::{DEFAULT_SCOPE, sanitize_route_path};
use tollgate_core::routes::RouteLimitTable;

use crate::middleware::error::AppError;
use crate::state::{AppState, KeyProvider};

/// Rate limiting middleware factory. Inert when no driver is configured.
pub struct RateLimitMiddleware {
    state: AppState,
}

impl RateLimitMiddleware {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            state: self.state.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    state: AppState,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let state = self.state.clone();

        Box::pin(async move {
            let Some(limiter) = state.limiter.clone() else {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            };

            let keys = resolve_keys(&req, &state.key_providers);

            match evaluate_request(&limiter, &state.route_limits, &keys, req.path()).await {
                Ok(()) => {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(app_error) => {
                    if let AppError::RateLimited { reset_at } = &app_error {
                        warn!(path = %req.path(), reset_at, "Rate limit exceeded");
                    }

                    let response = app_error.error_response();
                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
            }
        })
    }
}

/// Seed the key map with the transport-layer client address and merge in the
/// registered key providers. A context with no network peer falls back to
/// the loopback address.
fn resolve_keys(req: &ServiceRequest, providers: &[KeyProvider]) -> RequestKeys {
    let ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let mut keys = RequestKeys::with_ip(ip);
    for provider in providers {
        if let Some((key_type, value)) = provider(req) {
            keys.insert(key_type, value);
        }
    }
    keys
}

/// Default policy first, then every policy on the matched route.
async fn evaluate_request(
    limiter: &RateLimitEvaluator,
    routes: &RouteLimitTable,
    keys: &RequestKeys,
    request_path: &str,
) -> Result<(), AppError> {
    if let Some(policy) = limiter.default_policy() {
        deny_on_limit(limiter.check(policy, keys, DEFAULT_SCOPE).await?)?;
    }

    if let Some(route) = routes.matched(request_path) {
        let scoped_path = sanitize_route_path(&route.pattern);
        for policy in &route.policies {
            deny_on_limit(limiter.check(policy, keys, &scoped_path).await?)?;
        }
    }

    Ok(())
}

fn deny_on_limit(decision: Decision) -> Result<(), AppError> {
    match decision {
        Decision::Denied { reset_at } => Err(AppError::RateLimited { reset_at }),
        Decision::Allowed { .. } | Decision::Exempt => Ok(()),
    }
}
