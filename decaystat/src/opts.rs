//! Construction options for the stat types.
//!
//! All options deserialize with `serde` so an outer configuration layer can load them, and every
//! stat type calls `validate` before building anything.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{decay::ExponentialDecay, error::ConfigError};

/// Retained samples per reservoir; gives roughly a 99.9% confidence level with a 5% margin of
/// error assuming a normal distribution.
pub const DEFAULT_CAPACITY: usize = 1028;
pub const DEFAULT_BUCKET_PERIOD: Duration = Duration::from_secs(60);

/// Configuration for a [`crate::DecayedReservoir`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservoirOpts {
    /// Maximum number of retained samples
    pub capacity: usize,
    /// Time after which a sample's weight has halved. `None` disables decay (all-time).
    pub half_life: Option<Duration>,
}

impl Default for ReservoirOpts {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, half_life: None }
    }
}

impl ReservoirOpts {
    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn with_half_life(half_life: Duration) -> Self {
        Self { half_life: Some(half_life), ..Self::default() }
    }

    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decay().map(|_| ())
    }

    /// Validates the options and resolves the configured decay.
    pub fn decay(&self) -> Result<ExponentialDecay, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        match self.half_life {
            Some(half_life) => ExponentialDecay::with_half_life(half_life),
            None => Ok(ExponentialDecay::none()),
        }
    }
}

/// Configuration for a [`crate::BucketedView`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketOpts {
    /// Length of one bucket
    pub period: Duration,
    /// Maximum number of retained samples in the live bucket
    pub capacity: usize,
}

impl Default for BucketOpts {
    fn default() -> Self {
        Self { period: DEFAULT_BUCKET_PERIOD, capacity: DEFAULT_CAPACITY }
    }
}

impl BucketOpts {
    pub fn period(self, period: Duration) -> Self {
        Self { period, ..self }
    }

    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Configuration for a [`crate::MultiWindowStat`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatOpts {
    /// Capacity of each of the four horizon reservoirs
    pub capacity: usize,
    pub bucket: BucketOpts,
}

impl Default for StatOpts {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, bucket: BucketOpts::default() }
    }
}

impl StatOpts {
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    pub fn bucket(self, bucket: BucketOpts) -> Self {
        Self { bucket, ..self }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        self.bucket.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ReservoirOpts::default().validate().is_ok());
        assert!(BucketOpts::default().validate().is_ok());
        assert!(StatOpts::default().validate().is_ok());
        assert_eq!(StatOpts::default().capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert_eq!(ReservoirOpts::all_time().capacity(0).validate(), Err(ConfigError::ZeroCapacity));
        assert_eq!(BucketOpts::default().capacity(0).validate(), Err(ConfigError::ZeroCapacity));
        assert_eq!(StatOpts::default().capacity(0).validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn rejects_zero_durations() {
        let opts = ReservoirOpts::with_half_life(Duration::ZERO);
        assert_eq!(opts.validate(), Err(ConfigError::InvalidHalfLife(Duration::ZERO)));

        let opts = StatOpts::default().bucket(BucketOpts::default().period(Duration::ZERO));
        assert_eq!(opts.validate(), Err(ConfigError::ZeroPeriod));
    }

    #[test]
    fn deserializes_with_defaults() {
        let opts: StatOpts =
            serde_json::from_str(r#"{"bucket": {"period": {"secs": 1, "nanos": 0}}}"#).unwrap();
        assert_eq!(opts.capacity, DEFAULT_CAPACITY);
        assert_eq!(opts.bucket.period, Duration::from_secs(1));
        assert_eq!(opts.bucket.capacity, DEFAULT_CAPACITY);
    }
}
