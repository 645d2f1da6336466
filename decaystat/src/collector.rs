//! Prometheus exposition for [`MultiWindowStat`].
//!
//! A [`MultiWindowCollector`] renders every window of a stat as one summary family labeled by
//! `window`, plus a gauge family with the decayed rate of each window:
//!
//! ```text
//! # TYPE http_latency summary
//! http_latency{window="one_minute",quantile="0.5"} 12
//! ...
//! http_latency_sum{window="all_time"} 41230
//! http_latency_count{window="all_time"} 3120
//! # TYPE http_latency_rate gauge
//! http_latency_rate{window="one_minute"} 4.2
//! ```

use std::{collections::HashMap, sync::Arc};

use metrics_util::{Quantile, parse_quantiles};
use prometheus::{
    Opts, Registry,
    core::{Collector, Desc, Describer},
    proto as pp,
};

use crate::{
    decay::Horizon,
    distribution::{SNAPSHOT_QUANTILES, Snapshot},
    stat::{MultiWindowSnapshot, MultiWindowStat},
    traits::Summary,
};

/// Label distinguishing the windows of one stat.
pub const WINDOW_LABEL: &str = "window";

/// `window` label value of the last complete bucket period.
pub const BUCKET_WINDOW: &str = "bucket";

/// Configuration options for [`MultiWindowCollector`]
#[derive(Clone, Debug)]
pub struct CollectorOpts {
    pub common_opts: Opts,

    /// Which quantiles to export
    pub quantiles: Vec<Quantile>,
}

impl CollectorOpts {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, help: S2) -> Self {
        Self { common_opts: Opts::new(name, help), quantiles: parse_quantiles(&SNAPSHOT_QUANTILES) }
    }

    /// See [`Opts::namespace`]
    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.common_opts = self.common_opts.namespace(namespace);
        self
    }

    /// See [`Opts::const_labels`]
    pub fn const_labels(mut self, const_labels: HashMap<String, String>) -> Self {
        self.common_opts = self.common_opts.const_labels(const_labels);
        self
    }

    /// Configure the quantiles to export for every window
    pub fn quantiles(self, quantiles: &[f64]) -> Self {
        Self { quantiles: parse_quantiles(quantiles), ..self }
    }
}

/// Exposes a shared [`MultiWindowStat`] to a [`prometheus::Registry`].
///
/// Every scrape takes a fresh [`MultiWindowStat::snapshot`].
#[derive(Clone, Debug)]
pub struct MultiWindowCollector {
    stat: Arc<MultiWindowStat>,
    summary_desc: Desc,
    rate_desc: Desc,
    quantiles: Vec<Quantile>,
}

impl MultiWindowCollector {
    pub fn new(stat: Arc<MultiWindowStat>, opts: CollectorOpts) -> prometheus::Result<Self> {
        let common = opts.common_opts.variable_labels(vec![WINDOW_LABEL.to_owned()]);
        let summary_desc = common.describe()?;
        let rate_desc = Desc::new(
            format!("{}_rate", summary_desc.fq_name),
            "Recency-weighted events per second.".to_owned(),
            vec![WINDOW_LABEL.to_owned()],
            common.const_labels.clone(),
        )?;

        Ok(Self { stat, summary_desc, rate_desc, quantiles: opts.quantiles })
    }

    /// Registers the collector, replacing a collector already registered under the same name.
    pub fn register(self, registry: &Registry) -> prometheus::Result<()> {
        let boxed = Box::new(self);
        match registry.register(boxed.clone()) {
            Err(prometheus::Error::AlreadyReg) => {
                registry.unregister(boxed.clone())?;
                registry.register(boxed)
            }
            other => other,
        }
    }

    fn windows(
        snapshot: &MultiWindowSnapshot,
    ) -> impl Iterator<Item = (&'static str, &Snapshot)> + '_ {
        Horizon::ALL
            .into_iter()
            .map(|horizon| (horizon.as_str(), snapshot.horizon(horizon)))
            .chain([(BUCKET_WINDOW, &snapshot.bucket)])
    }
}

impl Collector for MultiWindowCollector {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.summary_desc, &self.rate_desc]
    }

    fn collect(&self) -> Vec<pp::MetricFamily> {
        let snapshot = self.stat.snapshot();

        let mut summaries = Vec::with_capacity(5);
        let mut rates = Vec::with_capacity(5);
        for (window, summary) in Self::windows(&snapshot) {
            // Both descs carry exactly one variable label
            let Ok(labels) = make_label_pairs(&self.summary_desc, &[window]) else { continue };

            let mut m = pp::Metric::from_label(labels.clone());
            m.set_summary(proto(summary, &self.quantiles));
            summaries.push(m);

            let mut gauge = pp::Gauge::default();
            gauge.set_value(summary.rate);
            let mut m = pp::Metric::from_label(labels);
            m.set_gauge(gauge);
            rates.push(m);
        }

        vec![
            family(&self.summary_desc, pp::MetricType::SUMMARY, summaries),
            family(&self.rate_desc, pp::MetricType::GAUGE, rates),
        ]
    }
}

fn family(desc: &Desc, kind: pp::MetricType, metrics: Vec<pp::Metric>) -> pp::MetricFamily {
    let mut family = pp::MetricFamily::default();
    family.set_name(desc.fq_name.clone());
    family.set_help(desc.help.clone());
    family.set_field_type(kind);
    family.set_metric(metrics);
    family
}

/// Converts a summary into its protobuf representation, skipping quantiles it has no value for.
pub fn proto<S: Summary>(summary: &S, quantiles: &[Quantile]) -> pp::Summary {
    let mut proto = pp::Summary::default();

    proto.set_sample_sum(summary.sample_sum());
    proto.set_sample_count(summary.sample_count());

    let mut values = Vec::with_capacity(quantiles.len());
    for quantile in quantiles {
        let Some(val) = summary.quantile(quantile.value()) else { continue };

        let mut q = pp::Quantile::default();
        q.set_quantile(quantile.value());
        q.set_value(val);
        values.push(q);
    }

    proto.set_quantile(values);

    proto
}

// from prometheus::value::make_label_pairs
fn make_label_pairs<V: AsRef<str>>(
    desc: &Desc,
    label_values: &[V],
) -> prometheus::Result<Vec<pp::LabelPair>> {
    if desc.variable_labels.len() != label_values.len() {
        return Err(prometheus::Error::InconsistentCardinality {
            expect: desc.variable_labels.len(),
            got: label_values.len(),
        });
    }

    let mut label_pairs = Vec::with_capacity(label_values.len() + desc.const_label_pairs.len());
    for (name, value) in desc.variable_labels.iter().zip(label_values) {
        let mut label_pair = pp::LabelPair::default();
        label_pair.set_name(name.clone());
        label_pair.set_value(value.as_ref().to_owned());
        label_pairs.push(label_pair);
    }

    label_pairs.extend(desc.const_label_pairs.iter().cloned());
    label_pairs.sort();
    Ok(label_pairs)
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, TextEncoder};
    use quanta::Clock;

    use super::*;
    use crate::opts::StatOpts;

    fn encode(families: &[pp::MetricFamily]) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn proto_skips_missing_quantiles() {
        let quantiles = parse_quantiles(&[0.5, 0.99]);

        let empty = proto(&Snapshot::empty(), &quantiles);
        assert_eq!(empty.sample_count(), 0);
        assert!(empty.quantile.is_empty());
    }

    #[test]
    fn collects_every_window() {
        let (clock, _mock) = Clock::mock();
        let stat = Arc::new(MultiWindowStat::with_clock(StatOpts::default(), clock).unwrap());
        for value in [10, 20, 30, 40] {
            stat.add(value);
        }

        let collector =
            MultiWindowCollector::new(stat, CollectorOpts::new("latency", "Request latency."))
                .unwrap();
        let families = collector.collect();
        assert_eq!(families.len(), 2);

        let output = encode(&families);
        assert!(output.contains("# TYPE latency summary"));
        assert!(output.contains("# TYPE latency_rate gauge"));
        for window in ["one_minute", "five_minutes", "fifteen_minutes", "all_time", "bucket"] {
            assert!(output.contains(&format!("latency_count{{window=\"{window}\"}}")), "{window}");
            assert!(output.contains(&format!("latency_rate{{window=\"{window}\"}}")), "{window}");
        }
        assert!(output.contains("latency_count{window=\"all_time\"} 4"));
        assert!(output.contains("latency_sum{window=\"all_time\"} 100"));
        assert!(output.contains("latency{window=\"all_time\",quantile=\"0.5\"} 20"));
        // the bucket has no completed period yet, so it exports no quantiles
        assert!(!output.contains("latency{window=\"bucket\""));
    }
}
