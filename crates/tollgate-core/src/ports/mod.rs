//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod counter_store;

pub use counter_store::{CounterKey, CounterStore, CounterWindow, StoreError};
