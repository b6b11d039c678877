//! Execution policies wrapped around every outbound attempt.
//!
//! The dispatcher treats a [`ResiliencePolicy`] as opaque: it hands the policy a
//! zero-argument [`Operation`] and awaits the result. [`RetryPolicy`] retries with backoff,
//! [`ExecuteOnce`] runs the operation a single time, and [`ResilienceExecutor`] resolves
//! which one applies to a call and wires policy events into the configured logger.

pub mod executor;
pub mod policy;
pub mod retry;

pub use executor::*;
pub use policy::*;
pub use retry::*;
