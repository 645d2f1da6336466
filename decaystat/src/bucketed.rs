//! Last-complete-period summaries.
//!
//! A [`BucketedView`] keeps two roles: a `live` reservoir collecting the current period and the
//! `completed` snapshot of the period before it. Both sit behind one [`ArcCell`] and are replaced
//! together, so a reader sees either the old pair or the new pair, never a mix.
//!
//! Period boundaries lie on a fixed grid `epoch + k · period`, with `epoch` the construction
//! instant. Rotation is lazy: the first `add` or `current_snapshot` past the live period's end
//! performs it.

use std::time::Duration;

use parking_lot::Mutex;
use quanta::{Clock, Instant};
use tracing::debug;

use crate::{
    IntoSample,
    arc_swap_cell::{ArcCell, Guard},
    decay::ExponentialDecay,
    distribution::{DecayedReservoir, Snapshot},
    error::ConfigError,
    opts::BucketOpts,
    traits::Stat,
};

/// Summary of the most recently completed fixed-length period.
#[derive(Debug)]
pub struct BucketedView {
    period: Duration,
    capacity: usize,
    clock: Clock,
    epoch: Instant,
    roles: ArcCell<Roles>,
    // serializes rotations; held from sealing the live reservoir until the new roles are stored
    rotation: Mutex<()>,
}

#[derive(Debug)]
struct Roles {
    /// Index on the period grid of the period `live` collects
    index: u64,
    live: DecayedReservoir,
    completed: Snapshot,
}

impl BucketedView {
    pub fn new(opts: BucketOpts) -> Result<Self, ConfigError> {
        Self::with_clock(opts, Clock::new())
    }

    pub fn with_clock(opts: BucketOpts, clock: Clock) -> Result<Self, ConfigError> {
        opts.validate()?;
        Ok(Self::build(&opts, clock))
    }

    /// `opts` must have been validated.
    pub(crate) fn build(opts: &BucketOpts, clock: Clock) -> Self {
        let epoch = clock.now();
        let live = DecayedReservoir::build(
            ExponentialDecay::none(),
            opts.capacity,
            clock.clone(),
            Some(epoch),
        );

        Self {
            period: opts.period,
            capacity: opts.capacity,
            clock,
            epoch,
            roles: ArcCell::new(Roles { index: 0, live, completed: Snapshot::empty() }),
            rotation: Mutex::new(()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Record an observation in the current period.
    pub fn add<V: IntoSample>(&self, value: V) {
        self.add_at(value.into_sample(), self.clock.now());
    }

    /// The snapshot of the last fully elapsed period.
    ///
    /// Before the first period has elapsed, and after a period without observations, this is an
    /// empty snapshot.
    pub fn current_snapshot(&self) -> Snapshot {
        self.current_snapshot_at(self.clock.now())
    }

    pub(crate) fn add_at(&self, value: f64, now: Instant) {
        loop {
            let roles = self.current(now);
            if roles.live.try_add_at(value, now) {
                return;
            }

            // The live reservoir was sealed by a rotation that has not been published yet. Wait
            // for it to finish, then retry on the new live reservoir.
            drop(roles);
            drop(self.rotation.lock());
        }
    }

    pub(crate) fn current_snapshot_at(&self, now: Instant) -> Snapshot {
        self.current(now).completed.clone()
    }

    /// Loads the roles, rotating first if `now` is past the live period.
    fn current(&self, now: Instant) -> Guard<Roles> {
        let roles = self.roles.load();
        if self.index_of(now) <= roles.index {
            return roles;
        }

        drop(roles);
        self.rotate(now);
        self.roles.load()
    }

    fn rotate(&self, now: Instant) {
        let _rotation = self.rotation.lock();

        let roles = self.roles.load();
        let index = self.index_of(now);
        // another thread got here first
        if index <= roles.index {
            return;
        }

        let sealed = roles.live.seal_at(self.start_of(roles.index + 1));
        let completed = if index == roles.index + 1 {
            sealed
        } else {
            debug!(
                target: "decaystat",
                stale = roles.index,
                current = index,
                dropped = sealed.count,
                "bucket periods elapsed without activity"
            );
            Snapshot::empty()
        };

        let live = DecayedReservoir::build(
            ExponentialDecay::none(),
            self.capacity,
            self.clock.clone(),
            Some(self.start_of(index)),
        );

        debug!(target: "decaystat", index, completed = completed.count, "rotated bucket");

        drop(roles);
        self.roles.store(Roles { index, live, completed });
    }

    fn index_of(&self, now: Instant) -> u64 {
        let elapsed = now.duration_since(self.epoch);
        let index = elapsed.as_nanos() / self.period.as_nanos();
        u64::try_from(index).unwrap_or(u64::MAX)
    }

    fn start_of(&self, index: u64) -> Instant {
        let offset = self.period.as_nanos().saturating_mul(u128::from(index));
        self.epoch + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
    }
}

impl Stat for BucketedView {
    type Snapshot = Snapshot;

    fn add(&self, value: f64) {
        BucketedView::add(self, value);
    }

    fn snapshot(&self) -> Snapshot {
        self.current_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quanta::Mock;

    use super::*;

    const PERIOD: Duration = Duration::from_secs(10);

    fn mocked() -> (BucketedView, Arc<Mock>) {
        let (clock, mock) = Clock::mock();
        let opts = BucketOpts::default().period(PERIOD).capacity(64);
        (BucketedView::with_clock(opts, clock).unwrap(), mock)
    }

    #[test]
    fn rejects_zero_period() {
        let err = BucketedView::new(BucketOpts::default().period(Duration::ZERO)).unwrap_err();
        assert_eq!(err, ConfigError::ZeroPeriod);
    }

    #[test]
    fn nothing_completed_during_first_period() {
        let (view, mock) = mocked();
        view.add(1);
        view.add(2);
        mock.increment(Duration::from_secs(9));

        assert!(view.current_snapshot().is_empty());
    }

    #[test]
    fn exposes_previous_period_only() {
        let (view, mock) = mocked();
        for value in [1, 2, 3] {
            view.add(value);
        }

        // exactly on the boundary the first period is complete
        mock.increment(PERIOD);
        view.add(100);
        view.add(200);

        let snapshot = view.current_snapshot();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.max, Some(3.0));
        assert_eq!(snapshot.p50, Some(2.0));
        // three observations over a ten second period
        assert!((snapshot.rate - 0.3).abs() < 1e-9);

        mock.increment(Duration::from_secs(5));
        assert_eq!(view.current_snapshot(), snapshot);

        mock.increment(Duration::from_secs(5));
        let snapshot = view.current_snapshot();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.min, Some(100.0));
    }

    #[test]
    fn rotates_on_reads_without_writes() {
        let (view, mock) = mocked();
        view.add(5);

        mock.increment(Duration::from_secs(12));
        assert_eq!(view.current_snapshot().count, 1);

        // period 1 saw nothing
        mock.increment(Duration::from_secs(10));
        assert!(view.current_snapshot().is_empty());
    }

    #[test]
    fn idle_periods_yield_an_empty_bucket() {
        let (view, mock) = mocked();
        view.add(5);

        mock.increment(Duration::from_secs(35));
        assert!(view.current_snapshot().is_empty());

        view.add(6);
        mock.increment(PERIOD);
        let snapshot = view.current_snapshot();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.max, Some(6.0));
    }

    #[test]
    fn boundaries_stay_on_the_grid() {
        let (view, mock) = mocked();

        // rotate late into period 1; period 2 still starts at 20s, not 15s + 10s
        mock.increment(Duration::from_secs(15));
        view.add(1);
        mock.increment(Duration::from_secs(5));
        view.add(2);

        let snapshot = view.current_snapshot();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.max, Some(1.0));
    }
}
