//! Consumer error types.

use std::time::Duration;

use thiserror::Error;

/// A retry configuration that violates its preconditions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryConfigError {
    /// The backoff factor is below 1 or not a finite number.
    #[error("Backoff factor must be a finite number >= 1, got {0}")]
    InvalidFactor(f64),

    /// The first delay is longer than the cap.
    #[error("Initial backoff {initial:?} exceeds max backoff {max:?}")]
    InitialExceedsMax { initial: Duration, max: Duration },
}
