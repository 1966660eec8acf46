//! Domain-level error types.

use thiserror::Error;

use crate::ports::StoreError;

/// Rate limit evaluation failures. Both variants abort only the current
/// request, never the host process.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// None of the policy's key types resolved to a value - the caller
    /// cannot be identified. A misconfiguration, not a denial.
    #[error("no rate limit key could be resolved for this request")]
    NoClientKey,

    #[error("counter storage failed: {0}")]
    Storage(#[from] StoreError),
}
