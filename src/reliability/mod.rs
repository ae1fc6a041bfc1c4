//! Reliability primitives shared by the network layer.

pub mod retry;

pub use retry::{RetryConfig, retry_typed};
