//! # Tollgate Core
//!
//! The domain layer of the Tollgate rate limiter.
//! This crate contains the policy model, the fixed-window evaluation logic,
//! and the counter-store port - with zero infrastructure dependencies.

pub mod context;
pub mod error;
pub mod evaluator;
pub mod keys;
pub mod policy;
pub mod ports;
pub mod routes;
pub mod settings;

pub use error::RateLimitError;
