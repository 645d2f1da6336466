/// Abstracts over a statistic that is written by many threads and read at any time
pub trait Stat {
    type Snapshot;

    /// Add a new data point to the statistic
    fn add(&self, _: f64);

    /// Return an immutable summary of the statistic as of now
    fn snapshot(&self) -> Self::Snapshot;
}

/// Abstracts over the representation of the Summary data
pub trait Summary {
    /// Computes the sum of all the samples in the summary
    fn sample_sum(&self) -> f64;

    /// Returns the number of samples in the summary
    fn sample_count(&self) -> u64;

    /// Attempt to compute the value for the given quantile
    fn quantile(&self, _: f64) -> Option<f64>;
}
