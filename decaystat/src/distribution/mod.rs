//! Exponentially decayed sample reservoir.
//!
//! Weights use forward decay: a sample observed at `t` is inserted with weight
//! `exp(λ · (t − landmark))` where `λ = −α`, so newer samples are heavier and the relative weight of
//! a sample of age `a` is `exp(α · a)`. Because the absolute weights grow with reservoir age, the
//! landmark is periodically moved to "now" and every retained weight is multiplied by
//! `exp(α · (now − landmark))`, which keeps them in range without changing their ratios.

use std::time::Duration;

use parking_lot::Mutex;
use quanta::{Clock, Instant};
use tracing::{debug, trace};

use crate::{
    IntoSample,
    decay::{ExponentialDecay, Horizon},
    error::ConfigError,
    opts::{DEFAULT_CAPACITY, ReservoirOpts},
    traits::Stat,
};

mod samples;
use samples::Samples;

mod snapshot;
pub use snapshot::{SNAPSHOT_QUANTILES, Snapshot};
use snapshot::Totals;

/// Upper bound on the time between two rescales.
pub const RESCALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Largest forward-decay exponent `λ · (now − landmark)` a reservoir lets its weights reach before
/// rescaling. `exp(64)` leaves ample headroom below `f64::MAX` for priorities and weight sums.
const MAX_EXPONENT: f64 = 64.0;

/// A fixed-capacity weighted sample set under a single decay rate.
///
/// Every mutation (insertion, eviction, rescale) happens under one lock per reservoir, so
/// snapshots never observe a partially applied update.
#[derive(Debug)]
pub struct DecayedReservoir {
    decay: ExponentialDecay,
    capacity: usize,
    rescale_after: Option<Duration>,
    clock: Clock,
    created: Instant,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    samples: Samples,
    totals: Totals,
    landmark: Instant,
    // forward-decayed weight of every recorded observation, relative to `landmark`
    decayed_weight: f64,
    // set once a bucketed view retires this reservoir
    sealed: bool,
}

/// What a reservoir read out under its lock.
struct Reading {
    totals: Totals,
    samples: Vec<(f64, f64)>,
    decayed_weight: f64,
    landmark: Instant,
}

impl DecayedReservoir {
    /// Construct a reservoir on the system clock, failing on a zero capacity or half-life.
    pub fn new(opts: ReservoirOpts) -> Result<Self, ConfigError> {
        Self::with_clock(opts, Clock::new())
    }

    /// Construct a reservoir reading time from `clock`, e.g. a [`Clock::mock`] in tests.
    pub fn with_clock(opts: ReservoirOpts, clock: Clock) -> Result<Self, ConfigError> {
        let decay = opts.decay()?;
        Ok(Self::build(decay, opts.capacity, clock, None))
    }

    /// A reservoir of the default capacity decaying over `horizon`.
    pub fn for_horizon(horizon: Horizon) -> Self {
        Self::build(horizon.decay(), DEFAULT_CAPACITY, Clock::new(), None)
    }

    /// An undecayed reservoir of the default capacity.
    pub fn all_time() -> Self {
        Self::for_horizon(Horizon::AllTime)
    }

    /// `capacity` must be non-zero; `start` defaults to the clock's current time.
    pub(crate) fn build(
        decay: ExponentialDecay,
        capacity: usize,
        clock: Clock,
        start: Option<Instant>,
    ) -> Self {
        let created = start.unwrap_or_else(|| clock.now());
        let rescale_after = decay.is_decaying().then(|| {
            let safe = Duration::try_from_secs_f64(MAX_EXPONENT / decay.lambda());
            safe.map_or(RESCALE_THRESHOLD, |safe| safe.min(RESCALE_THRESHOLD))
        });

        debug!(target: "decaystat", alpha = decay.alpha(), capacity, ?rescale_after, "created reservoir");

        Self {
            decay,
            capacity,
            rescale_after,
            clock,
            created,
            state: Mutex::new(State {
                samples: Samples::with_capacity(capacity),
                totals: Totals::default(),
                landmark: created,
                decayed_weight: 0.0,
                sealed: false,
            }),
        }
    }

    /// The decay applied to sample weights.
    pub fn decay(&self) -> ExponentialDecay {
        self.decay
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples currently retained, never more than [`Self::capacity`].
    pub fn retained(&self) -> usize {
        self.state.lock().samples.len()
    }

    /// Record an observation.
    ///
    /// Non-finite values (NaN, ±∞) are discarded: they are not counted and only show up in
    /// [`Snapshot::discarded`].
    pub fn add<V: IntoSample>(&self, value: V) {
        self.add_at(value.into_sample(), self.clock.now());
    }

    /// Summarize the retained samples as of now.
    ///
    /// Takes the reservoir lock only to copy the samples out; sorting happens after releasing it.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(self.clock.now())
    }

    pub(crate) fn add_at(&self, value: f64, now: Instant) {
        // standalone reservoirs are never sealed
        let _ = self.try_add_at(value, now);
    }

    /// Records `value` unless the reservoir has been sealed. Returns whether the reservoir was
    /// still accepting writes.
    pub(crate) fn try_add_at(&self, value: f64, now: Instant) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }

        if !value.is_finite() {
            state.totals.discarded += 1;
            trace!(target: "decaystat", value, "discarded non-finite observation");
            return true;
        }

        self.rescale_if_due(&mut state, now);

        let weight = self.forward_weight(state.landmark, now);
        state.totals.record(value);
        state.decayed_weight += weight;
        state.samples.offer(value, weight, &mut rand::thread_rng());

        true
    }

    pub(crate) fn snapshot_at(&self, now: Instant) -> Snapshot {
        let reading = {
            let mut state = self.state.lock();
            if !state.sealed {
                self.rescale_if_due(&mut state, now);
            }
            Self::read(&state)
        };

        self.summarize(reading, now)
    }

    /// Stops accepting writes and summarizes the reservoir as of `end`.
    pub(crate) fn seal_at(&self, end: Instant) -> Snapshot {
        let reading = {
            let mut state = self.state.lock();
            state.sealed = true;
            Self::read(&state)
        };

        self.summarize(reading, end)
    }

    fn read(state: &State) -> Reading {
        Reading {
            totals: state.totals,
            samples: state.samples.weighted_values(),
            decayed_weight: state.decayed_weight,
            landmark: state.landmark,
        }
    }

    // Sorting happens here, outside of the lock.
    fn summarize(&self, reading: Reading, now: Instant) -> Snapshot {
        let rate = match self.decay.half_life() {
            // current weight of every recorded observation over the horizon's window
            Some(window) => {
                let age = signed_secs(now, reading.landmark);
                reading.decayed_weight * (self.decay.alpha() * age).exp() / window.as_secs_f64()
            }
            None => {
                let elapsed = signed_secs(now, self.created);
                if elapsed > 0.0 { reading.totals.count as f64 / elapsed } else { 0.0 }
            }
        };

        Snapshot::new(reading.totals, reading.samples, rate)
    }

    fn forward_weight(&self, landmark: Instant, now: Instant) -> f64 {
        if !self.decay.is_decaying() {
            return 1.0;
        }
        (self.decay.lambda() * signed_secs(now, landmark)).exp()
    }

    fn rescale_if_due(&self, state: &mut State, now: Instant) {
        let Some(rescale_after) = self.rescale_after else { return };
        let Some(elapsed) = now.checked_duration_since(state.landmark) else { return };
        if elapsed < rescale_after {
            return;
        }

        let factor = (self.decay.alpha() * elapsed.as_secs_f64()).exp();
        let dropped = state.samples.rescale(factor);
        state.decayed_weight *= factor;
        state.landmark = now;

        trace!(
            target: "decaystat",
            factor,
            dropped,
            retained = state.samples.len(),
            "rescaled reservoir"
        );
    }
}

impl Stat for DecayedReservoir {
    type Snapshot = Snapshot;

    fn add(&self, value: f64) {
        DecayedReservoir::add(self, value);
    }

    fn snapshot(&self) -> Snapshot {
        DecayedReservoir::snapshot(self)
    }
}

/// Seconds from `since` to `now`, negative if `now` is earlier.
///
/// Writers read the clock before taking the lock, so a racing rescale can move the landmark past a
/// writer's timestamp.
fn signed_secs(now: Instant, since: Instant) -> f64 {
    match now.checked_duration_since(since) {
        Some(elapsed) => elapsed.as_secs_f64(),
        None => -since.duration_since(now).as_secs_f64(),
    }
}
