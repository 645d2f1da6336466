use std::time::Duration;

use thiserror::Error;

/// Invalid construction parameters, reported before anything is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("reservoir capacity must be at least 1")]
    ZeroCapacity,
    #[error("decay half-life must be a positive duration (got {0:?})")]
    InvalidHalfLife(Duration),
    #[error("bucket period must be a positive duration")]
    ZeroPeriod,
}
