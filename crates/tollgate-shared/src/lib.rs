//! # Tollgate Shared
//!
//! Response types shared across the HTTP surface.

pub mod response;

pub use response::{ApiResponse, ErrorResponse};
