//! Immutable, point-in-time summaries of a reservoir.

use serde::Serialize;

use crate::traits::Summary;

/// Percentiles exported as named fields of every [`Snapshot`].
pub const SNAPSHOT_QUANTILES: [f64; 5] = [0.5, 0.75, 0.9, 0.95, 0.99];

/// An immutable summary of a reservoir at the moment it was taken.
///
/// Field names are stable: exposition layers render them by name. A reservoir that never saw an
/// observation reports `count == 0` and `None` for every value field, which serializes as `null`.
///
/// Percentiles are weighted order statistics over the retained samples: the reported value for
/// quantile `q` is the smallest retained value whose cumulative weight (in ascending value order)
/// reaches `q` times the total retained weight.
///
/// Snapshots serialize but do not deserialize: the weighted samples behind [`Snapshot::quantile`]
/// stay in memory, so the serialized fields are a report, not a copy of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Observations recorded since creation, independent of eviction
    pub count: u64,
    /// Non-finite observations that were dropped instead of recorded
    pub discarded: u64,
    /// Sum of every recorded observation
    pub total: f64,
    /// Smallest observation ever recorded
    pub min: Option<f64>,
    /// Largest observation ever recorded
    pub max: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    /// Recency-weighted events per second: the current decayed weight of every recorded
    /// observation divided by the horizon's window (its half-life). Without decay, the count
    /// divided by the time covered.
    pub rate: f64,

    #[serde(skip)]
    entries: Vec<Entry>,
}

/// A retained sample, with the weight of every sample up to and including it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    value: f64,
    cumulative: f64,
}

/// Counters tracked over every observation, retained or not.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Totals {
    pub(crate) count: u64,
    pub(crate) discarded: u64,
    pub(crate) total: f64,
    pub(crate) min: Option<f64>,
    pub(crate) max: Option<f64>,
}

impl Totals {
    pub(crate) fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.min = Some(self.min.map_or(value, |min| min.min(value)));
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
    }
}

impl Snapshot {
    /// The summary of a reservoir that never saw an observation.
    pub fn empty() -> Self {
        Self::new(Totals::default(), Vec::new(), 0.0)
    }

    /// Builds a snapshot out of `(value, weight)` pairs copied from a reservoir.
    pub(crate) fn new(totals: Totals, mut samples: Vec<(f64, f64)>, rate: f64) -> Self {
        samples.sort_by(|(a, _), (b, _)| a.total_cmp(b));

        let mut cumulative = 0.0;
        let entries = samples
            .into_iter()
            .map(|(value, weight)| {
                cumulative += weight;
                Entry { value, cumulative }
            })
            .collect();

        let mut snapshot = Self {
            count: totals.count,
            discarded: totals.discarded,
            total: totals.total,
            min: totals.min,
            max: totals.max,
            p50: None,
            p75: None,
            p90: None,
            p95: None,
            p99: None,
            rate,
            entries,
        };

        let [p50, p75, p90, p95, p99] = SNAPSHOT_QUANTILES.map(|q| snapshot.quantile(q));
        snapshot.p50 = p50;
        snapshot.p75 = p75;
        snapshot.p90 = p90;
        snapshot.p95 = p95;
        snapshot.p99 = p99;

        snapshot
    }

    /// Number of samples the percentiles were computed from.
    pub fn retained(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of every recorded observation.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }

    /// Weighted quantile over the retained samples; `q` is clamped to `[0, 1]`.
    ///
    /// Returns `None` when no sample is retained, e.g. before the first observation or once a bucket
    /// has rotated out of a period without observations.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let last = self.entries.last()?;
        let q = if q.is_nan() { 0.5 } else { q.clamp(0.0, 1.0) };
        let target = q * last.cumulative;

        let idx = self.entries.partition_point(|entry| entry.cumulative < target);
        let entry = self.entries.get(idx).unwrap_or(last);

        Some(entry.value)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Summary for Snapshot {
    fn sample_sum(&self) -> f64 {
        self.total
    }

    fn sample_count(&self) -> u64 {
        self.count
    }

    fn quantile(&self, q: f64) -> Option<f64> {
        Snapshot::quantile(self, q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_of(samples: &[(f64, f64)]) -> Snapshot {
        let mut totals = Totals::default();
        for (value, _) in samples {
            totals.record(*value);
        }
        Snapshot::new(totals, samples.to_vec(), 0.0)
    }

    #[test]
    fn empty_snapshot_has_no_values() {
        let snapshot = Snapshot::empty();
        assert_eq!(snapshot.count, 0);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.min, None);
        assert_eq!(snapshot.max, None);
        assert_eq!(snapshot.p50, None);
        assert_eq!(snapshot.p99, None);
        assert_eq!(snapshot.quantile(0.5), None);
        assert_eq!(snapshot.mean(), None);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let snapshot = snapshot_of(&[(42.0, 0.3)]);
        for q in [0.0, 0.01, 0.5, 0.99, 1.0] {
            assert_eq!(snapshot.quantile(q), Some(42.0));
        }
        assert_eq!(snapshot.p50, Some(42.0));
        assert_eq!(snapshot.p99, Some(42.0));
    }

    #[test]
    fn lower_weighted_median_on_ties() {
        let snapshot = snapshot_of(&[(40.0, 1.0), (10.0, 1.0), (30.0, 1.0), (20.0, 1.0)]);
        assert_eq!(snapshot.p50, Some(20.0));
        assert_eq!(snapshot.p75, Some(30.0));
        assert_eq!(snapshot.quantile(0.0), Some(10.0));
        assert_eq!(snapshot.quantile(1.0), Some(40.0));
        assert_eq!(snapshot.mean(), Some(25.0));
    }

    #[test]
    fn heavier_samples_dominate() {
        // 40 light samples vs 10 samples six times heavier: a 40/60 split
        let mut samples = vec![(177.0, 1.0); 40];
        samples.extend(vec![(9999.0, 6.0); 10]);
        let snapshot = snapshot_of(&samples);

        assert_eq!(snapshot.p50, Some(9999.0));
        assert_eq!(snapshot.quantile(0.3), Some(177.0));
        assert_eq!(snapshot.retained(), 50);
    }

    #[test]
    fn out_of_range_quantiles_are_clamped() {
        let snapshot = snapshot_of(&[(1.0, 1.0), (2.0, 1.0)]);
        assert_eq!(snapshot.quantile(-3.0), Some(1.0));
        assert_eq!(snapshot.quantile(7.0), Some(2.0));
    }

    #[test]
    fn serializes_stable_field_names() {
        let value = serde_json::to_value(Snapshot::empty()).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "count",
            "discarded",
            "total",
            "min",
            "max",
            "p50",
            "p75",
            "p90",
            "p95",
            "p99",
            "rate",
        ] {
            assert!(object.contains_key(field), "missing {field}");
        }
        assert_eq!(object.len(), 11);
        assert!(object["min"].is_null());
    }

    #[test]
    fn serialized_fields_match_reads() {
        let snapshot = snapshot_of(&[(40.0, 1.0), (10.0, 1.0), (30.0, 1.0), (20.0, 1.0)]);
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value["count"], 4);
        assert_eq!(value["total"], 100.0);
        for (field, q) in ["p50", "p75", "p90", "p95", "p99"].into_iter().zip(SNAPSHOT_QUANTILES) {
            assert_eq!(value[field].as_f64(), snapshot.quantile(q), "{field}");
        }
        assert!(value.get("entries").is_none());

        // a clone carries the weighted samples along
        let copy = snapshot.clone();
        assert_eq!(copy, snapshot);
        assert_eq!(copy.retained(), 4);
        assert_eq!(copy.quantile(0.5), Some(20.0));
    }
}
