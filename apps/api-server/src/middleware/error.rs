//! Error handling - RFC 7807 compliant responses.

use std::fmt;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use tollgate_core::RateLimitError;
use tollgate_shared::ErrorResponse;

/// Application-level error type that converts to RFC 7807 responses.
/// Every variant aborts only the current request.
#[derive(Debug)]
pub enum AppError {
    /// Expected denial; carries the window reset timestamp.
    RateLimited { reset_at: i64 },
    /// No configured key type resolved a value for this request.
    KeyUnresolved,
    /// The counter store failed fatally for this request.
    LimiterStorage(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::RateLimited { reset_at } => {
                write!(f, "Rate limit exceeded, reset at {}", reset_at)
            }
            AppError::KeyUnresolved => write!(f, "No rate limit key resolved"),
            AppError::LimiterStorage(msg) => write!(f, "Rate limit storage failure: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::KeyUnresolved => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LimiterStorage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::RateLimited { reset_at } => {
                let retry_after = (*reset_at - chrono::Utc::now().timestamp()).max(0);

                HttpResponse::TooManyRequests()
                    .insert_header(("X-RateLimit-Remaining", "0"))
                    .insert_header(("Retry-After", retry_after.to_string()))
                    .json(ErrorResponse::too_many_requests(*reset_at))
            }
            AppError::KeyUnresolved => {
                tracing::error!("No rate limit key could be resolved for this request");
                HttpResponse::InternalServerError().json(ErrorResponse::key_unresolved())
            }
            AppError::LimiterStorage(detail) => {
                tracing::error!("Rate limit storage failure: {}", detail);
                HttpResponse::InternalServerError().json(ErrorResponse::limiter_storage_failure())
            }
        }
    }
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::NoClientKey => AppError::KeyUnresolved,
            RateLimitError::Storage(e) => AppError::LimiterStorage(e.to_string()),
        }
    }
}
