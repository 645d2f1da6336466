//! Exponentially decayed distribution statistics for live service monitoring.
//!
//! The crate summarizes a stream of numeric observations (latencies, sizes, counts) into compact
//! distributions that can be read at any time while writers keep recording:
//! - [`decay::ExponentialDecay`]: the decay rate of a named time horizon.
//! - [`distribution::DecayedReservoir`]: a fixed-capacity weighted reservoir whose samples lose
//!   influence as they age.
//! - [`bucketed::BucketedView`]: the summary of the last fully elapsed period.
//! - [`stat::MultiWindowStat`]: one-, five- and fifteen-minute horizons, all time and a bucketed
//!   view, all fed from the same stream.
//!
//! ```rust
//! use decaystat::MultiWindowStat;
//!
//! let stat = MultiWindowStat::new();
//! stat.add(12.5);
//! stat.add(40u64);
//!
//! let snapshot = stat.snapshot();
//! assert_eq!(snapshot.all_time.count, 2);
//! assert_eq!(snapshot.all_time.max, Some(40.0));
//! ```

mod arc_swap_cell;

pub mod bucketed;
pub use bucketed::BucketedView;

pub mod decay;
pub use decay::{ExponentialDecay, Horizon};

pub mod distribution;
pub use distribution::{DecayedReservoir, Snapshot};

pub mod error;
pub use error::ConfigError;

pub mod opts;
pub use opts::{BucketOpts, ReservoirOpts, StatOpts};

pub mod stat;
pub use stat::{MultiWindowSnapshot, MultiWindowStat};

pub mod traits;
pub use traits::{Stat, Summary};

#[cfg(feature = "prometheus")]
pub mod collector;

mod private {
    pub trait Sealed {}

    impl Sealed for u64 {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for u32 {}
    impl Sealed for usize {}
    impl Sealed for f32 {}
}

/// Numeric types accepted by `add`, converted to an `f64` observation.
///
/// Lets callers record `.add(buf.len())` or `.add(elapsed.as_micros() as u64)` directly.
/// Integers beyond 2^53 in magnitude are rounded to the nearest representable `f64`.
pub trait IntoSample: private::Sealed {
    fn into_sample(self) -> f64;
}

impl IntoSample for f64 {
    #[inline]
    fn into_sample(self) -> f64 {
        self
    }
}

macro_rules! impl_into_sample {
    ($($in_ty:ty),+ $(,)?) => {
        $(
            impl $crate::IntoSample for $in_ty {
                #[inline]
                fn into_sample(self) -> f64 {
                    self as f64
                }
            }
        )+
    };
}

impl_into_sample!(u64, i64, i32, u32, usize, f32);
