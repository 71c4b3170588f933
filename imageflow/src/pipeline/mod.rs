//! Pipeline execution.
//!
//! This module provides:
//! - A sequential [`Runner`] with reverse-order cleanup
//! - A bounded [`RetryPolicy`] for best-effort teardown

mod retry;
mod runner;

pub use retry::{
    BackoffStrategy, JitterStrategy, RetryError, RetryPolicy, DEFAULT_CLEANUP_ATTEMPTS,
    DEFAULT_CLEANUP_DELAY_MS, MAX_CLEANUP_ATTEMPTS, MAX_CLEANUP_DELAY_MS,
};
pub use runner::{RunReport, Runner};
