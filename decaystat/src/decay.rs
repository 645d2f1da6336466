//! Exponential decay rates for named time horizons.
//!
//! A sample of age `t` seconds carries weight `exp(α · t)`. Decayed horizons use a negative `α`
//! chosen so that the weight halves after the horizon's nominal window; the all-time horizon uses
//! `α = 0`, i.e. every sample keeps a weight of one forever.

use std::{f64::consts::LN_2, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ONE_MINUTE: Duration = Duration::from_secs(60);
pub const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
pub const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

/// The decay rate of a horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDecay {
    alpha: f64,
}

impl ExponentialDecay {
    /// Weight halves after one minute.
    pub fn one_minute() -> Self {
        Self::from_half_life(ONE_MINUTE)
    }

    /// Weight halves after five minutes.
    pub fn five_minutes() -> Self {
        Self::from_half_life(FIVE_MINUTES)
    }

    /// Weight halves after fifteen minutes.
    pub fn fifteen_minutes() -> Self {
        Self::from_half_life(FIFTEEN_MINUTES)
    }

    /// No decay: every sample keeps a weight of one.
    pub const fn none() -> Self {
        Self { alpha: 0.0 }
    }

    /// A decay whose weight halves after `half_life`.
    pub fn with_half_life(half_life: Duration) -> Result<Self, ConfigError> {
        if half_life.is_zero() {
            return Err(ConfigError::InvalidHalfLife(half_life));
        }

        Ok(Self::from_half_life(half_life))
    }

    // Callers guarantee a non-zero half-life.
    fn from_half_life(half_life: Duration) -> Self {
        Self { alpha: 0.5f64.ln() / half_life.as_secs_f64() }
    }

    /// The decay exponent `α`. Negative for decayed horizons, zero for [`ExponentialDecay::none`].
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The forward-decay growth rate `λ = -α`, used to weight new samples relative to a landmark.
    pub(crate) fn lambda(&self) -> f64 {
        -self.alpha
    }

    pub fn is_decaying(&self) -> bool {
        self.alpha != 0.0
    }

    /// The weight of a sample observed `age` ago.
    pub fn weight(&self, age: Duration) -> f64 {
        (self.alpha * age.as_secs_f64()).exp()
    }

    /// The time after which a sample's weight has halved, if the horizon decays at all.
    pub fn half_life(&self) -> Option<Duration> {
        if !self.is_decaying() {
            return None;
        }
        Duration::try_from_secs_f64(LN_2 / self.lambda()).ok()
    }

    /// The mean lifetime `1/λ` of a sample: the integral of its weight over all ages.
    ///
    /// A steady stream of `r` events per second settles at a total weight of `r / λ`.
    pub fn mean_lifetime(&self) -> Option<Duration> {
        if !self.is_decaying() {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.lambda()).ok()
    }
}

impl Default for ExponentialDecay {
    fn default() -> Self {
        Self::none()
    }
}

/// A named time horizon over which a reservoir summarizes recent behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Horizon {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    AllTime,
}

impl Horizon {
    pub const ALL: [Horizon; 4] =
        [Horizon::OneMinute, Horizon::FiveMinutes, Horizon::FifteenMinutes, Horizon::AllTime];

    pub fn decay(self) -> ExponentialDecay {
        match self {
            Horizon::OneMinute => ExponentialDecay::one_minute(),
            Horizon::FiveMinutes => ExponentialDecay::five_minutes(),
            Horizon::FifteenMinutes => ExponentialDecay::fifteen_minutes(),
            Horizon::AllTime => ExponentialDecay::none(),
        }
    }

    /// Stable name used by exposition layers.
    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::OneMinute => "one_minute",
            Horizon::FiveMinutes => "five_minutes",
            Horizon::FifteenMinutes => "fifteen_minutes",
            Horizon::AllTime => "all_time",
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
