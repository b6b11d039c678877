//! Bearer credential acquisition and caching.

pub mod cache;
pub mod metrics;
pub mod secret;
pub mod source;

pub use cache::*;
pub use metrics::*;
pub use secret::*;
pub use source::*;
