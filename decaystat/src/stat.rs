//! One observation stream summarized over several horizons at once.

use quanta::Clock;
use serde::Serialize;

use crate::{
    IntoSample,
    bucketed::BucketedView,
    decay::Horizon,
    distribution::{DecayedReservoir, Snapshot},
    error::ConfigError,
    opts::StatOpts,
    traits::Stat,
};

/// One-, five- and fifteen-minute decayed reservoirs, an all-time reservoir and a bucketed view of
/// the last complete period, all fed from the same [`MultiWindowStat::add`] calls.
#[derive(Debug)]
pub struct MultiWindowStat {
    one_minute: DecayedReservoir,
    five_minutes: DecayedReservoir,
    fifteen_minutes: DecayedReservoir,
    all_time: DecayedReservoir,
    bucket: BucketedView,
    clock: Clock,
}

/// Snapshots of every window of a [`MultiWindowStat`].
///
/// The inner snapshots are taken one after the other, so they may reflect instants a few
/// microseconds apart. Windows serialize under camelCase names (`oneMinute`, `allTime`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiWindowSnapshot {
    pub one_minute: Snapshot,
    pub five_minutes: Snapshot,
    pub fifteen_minutes: Snapshot,
    pub all_time: Snapshot,
    /// The last complete bucket period
    pub bucket: Snapshot,
}

impl MultiWindowSnapshot {
    pub fn horizon(&self, horizon: Horizon) -> &Snapshot {
        match horizon {
            Horizon::OneMinute => &self.one_minute,
            Horizon::FiveMinutes => &self.five_minutes,
            Horizon::FifteenMinutes => &self.fifteen_minutes,
            Horizon::AllTime => &self.all_time,
        }
    }
}

impl Default for MultiWindowStat {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiWindowStat {
    /// Default capacities and a one-minute bucket period.
    pub fn new() -> Self {
        Self::build(&StatOpts::default(), Clock::new())
    }

    /// Construct a stat on the system clock from validated `opts`.
    pub fn with_opts(opts: StatOpts) -> Result<Self, ConfigError> {
        Self::with_clock(opts, Clock::new())
    }

    /// Like [`Self::with_opts`], reading time from `clock`.
    pub fn with_clock(opts: StatOpts, clock: Clock) -> Result<Self, ConfigError> {
        opts.validate()?;
        Ok(Self::build(&opts, clock))
    }

    // `opts` must have been validated.
    fn build(opts: &StatOpts, clock: Clock) -> Self {
        let reservoir = |horizon: Horizon| {
            DecayedReservoir::build(horizon.decay(), opts.capacity, clock.clone(), None)
        };

        Self {
            one_minute: reservoir(Horizon::OneMinute),
            five_minutes: reservoir(Horizon::FiveMinutes),
            fifteen_minutes: reservoir(Horizon::FifteenMinutes),
            all_time: reservoir(Horizon::AllTime),
            bucket: BucketedView::build(&opts.bucket, clock.clone()),
            clock,
        }
    }

    /// Record an observation in every window, with a single timestamp.
    pub fn add<V: IntoSample>(&self, value: V) {
        let value = value.into_sample();
        let now = self.clock.now();

        self.one_minute.add_at(value, now);
        self.five_minutes.add_at(value, now);
        self.fifteen_minutes.add_at(value, now);
        self.all_time.add_at(value, now);
        self.bucket.add_at(value, now);
    }

    /// Snapshot every window. See [`MultiWindowSnapshot`] on consistency across windows.
    pub fn snapshot(&self) -> MultiWindowSnapshot {
        MultiWindowSnapshot {
            one_minute: self.one_minute.snapshot(),
            five_minutes: self.five_minutes.snapshot(),
            fifteen_minutes: self.fifteen_minutes.snapshot(),
            all_time: self.all_time.snapshot(),
            bucket: self.bucket.current_snapshot(),
        }
    }

    /// The reservoir with a one-minute half-life.
    pub fn one_minute(&self) -> &DecayedReservoir {
        &self.one_minute
    }

    /// The reservoir with a five-minute half-life.
    pub fn five_minutes(&self) -> &DecayedReservoir {
        &self.five_minutes
    }

    /// The reservoir with a fifteen-minute half-life.
    pub fn fifteen_minutes(&self) -> &DecayedReservoir {
        &self.fifteen_minutes
    }

    /// The undecayed reservoir.
    pub fn all_time(&self) -> &DecayedReservoir {
        &self.all_time
    }

    /// The view of the last complete bucket period.
    pub fn bucket(&self) -> &BucketedView {
        &self.bucket
    }

    /// The reservoir backing `horizon`.
    pub fn horizon(&self, horizon: Horizon) -> &DecayedReservoir {
        match horizon {
            Horizon::OneMinute => &self.one_minute,
            Horizon::FiveMinutes => &self.five_minutes,
            Horizon::FifteenMinutes => &self.fifteen_minutes,
            Horizon::AllTime => &self.all_time,
        }
    }
}

impl Stat for MultiWindowStat {
    type Snapshot = MultiWindowSnapshot;

    fn add(&self, value: f64) {
        MultiWindowStat::add(self, value);
    }

    fn snapshot(&self) -> MultiWindowSnapshot {
        MultiWindowStat::snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use quanta::Mock;

    use super::*;
    use crate::opts::BucketOpts;

    fn mocked() -> (MultiWindowStat, Arc<Mock>) {
        let (clock, mock) = Clock::mock();
        let opts = StatOpts::default()
            .capacity(256)
            .bucket(BucketOpts::default().period(Duration::from_secs(60)));
        (MultiWindowStat::with_clock(opts, clock).unwrap(), mock)
    }

    #[test]
    fn rejects_invalid_config() {
        let err = MultiWindowStat::with_opts(StatOpts::default().capacity(0)).unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
    }

    #[test]
    fn fans_out_to_every_window() {
        let (stat, _) = mocked();
        for value in 1..=10 {
            stat.add(value);
        }

        let snapshot = stat.snapshot();
        for horizon in Horizon::ALL {
            let window = snapshot.horizon(horizon);
            assert_eq!(window.count, 10, "{horizon}");
            assert_eq!(window.min, Some(1.0), "{horizon}");
            assert_eq!(window.max, Some(10.0), "{horizon}");
            assert_eq!(window.total, 55.0, "{horizon}");
        }
        // the first bucket period is still in progress
        assert!(snapshot.bucket.is_empty());
    }

    #[test]
    fn horizons_forget_at_different_speeds() {
        let (stat, mock) = mocked();

        for _ in 0..600 {
            stat.add(10);
            mock.increment(Duration::from_secs(1));
        }
        for _ in 0..120 {
            stat.add(1_000);
            mock.increment(Duration::from_secs(1));
        }

        let snapshot = stat.snapshot();
        assert_eq!(snapshot.one_minute.p50, Some(1_000.0));
        assert_eq!(snapshot.all_time.p50, Some(10.0));
        assert!(snapshot.one_minute.rate > snapshot.fifteen_minutes.rate);

        // the last complete minute only saw the new regime
        assert_eq!(snapshot.bucket.count, 60);
        assert_eq!(snapshot.bucket.min, Some(1_000.0));
    }

    #[test]
    fn all_time_count_is_monotonic() {
        let (stat, mock) = mocked();
        let mut last = 0;
        for round in 0..20 {
            for _ in 0..round {
                stat.add(round);
            }
            mock.increment(Duration::from_secs(30));

            let count = stat.snapshot().all_time.count;
            assert!(count >= last);
            last = count;
        }
        assert_eq!(last, (0..20).sum::<u64>());
    }

    #[test]
    fn snapshot_serializes_with_window_names() {
        let (stat, _) = mocked();
        stat.add(3.5);

        let value = serde_json::to_value(stat.snapshot()).unwrap();
        let object = value.as_object().unwrap();
        for window in ["oneMinute", "fiveMinutes", "fifteenMinutes", "allTime", "bucket"] {
            assert!(object.contains_key(window), "missing {window}");
        }
        assert_eq!(object.len(), 5);
        assert_eq!(value["allTime"]["max"], 3.5);
        assert_eq!(value["oneMinute"]["p50"], 3.5);
        assert!(value["bucket"]["p50"].is_null());
    }
}
