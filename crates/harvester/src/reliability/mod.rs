//! Reliability patterns for extraction
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff and additive jitter

mod retry;

pub use retry::{Jitter, RetryPolicy};
