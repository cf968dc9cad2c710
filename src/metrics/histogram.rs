//! Prometheus-style bucketed histograms over per-record observations.
//!
//! Layout of a histogram with `n` bounds, `n + 3` series wide:
//!
//! ```text
//! [ <name>_bucket{le=b0} .. <name>_bucket{le=b(n-1)}, <name>_bucket{le=Inf}, <name>_sum, <name>_count ]
//! ```
//!
//! A bucket counts the observations `v` with `b(i-1) < v <= b(i)`.

use super::types::{AggregateMetric, MetricIdentity};
use crate::core::Result;

/// Receives the observations of one record.
///
/// Handed to the extraction function of [`histogram`], which may call
/// [`observe`](Self::observe) any number of times per record (once per
/// transaction, say, or not at all).
pub struct HistogramSink<'a> {
    bounds: &'a [f64],
    dest: &'a mut [f64],
}

impl HistogramSink<'_> {
    /// Count one observation into its bucket, the running sum and the count.
    #[inline]
    pub fn observe(&mut self, value: f64) {
        let n = self.bounds.len();
        // first bound >= value; past the end means the Inf bucket, NaN included
        let bucket = self.bounds.partition_point(|b| value.is_nan() || *b < value);
        self.dest[bucket] += 1.0;
        self.dest[n + 1] += value;
        self.dest[n + 2] += 1.0;
    }
}

/// Histogram series for `name` with the given upper bounds.
///
/// Bounds are sorted ascending here. `+Inf` and NaN bounds are dropped, the
/// trailing `le=Inf` bucket already covers them. An empty bound list still
/// yields that bucket, which then equals the count.
pub fn histogram<E, F>(name: &str, mut bounds: Vec<f64>, func: F) -> AggregateMetric<E>
where
    E: 'static,
    F: Fn(&E, &mut HistogramSink<'_>) -> Result<()> + Send + Sync + 'static,
{
    bounds.retain(|b| *b < f64::INFINITY);
    bounds.sort_by(f64::total_cmp);

    let bucket_name = format!("{name}_bucket");
    let mut series = Vec::with_capacity(bounds.len() + 3);
    for bound in &bounds {
        series.push(MetricIdentity::with_label(
            bucket_name.as_str(),
            "le",
            format_bound(*bound),
        ));
    }
    series.push(MetricIdentity::with_label(bucket_name.as_str(), "le", "Inf"));
    series.push(MetricIdentity::new(format!("{name}_sum")));
    series.push(MetricIdentity::new(format!("{name}_count")));

    AggregateMetric::new(series, move |record, dest| {
        let mut sink = HistogramSink {
            bounds: &bounds,
            dest,
        };
        func(record, &mut sink)
    })
}

fn format_bound(bound: f64) -> String {
    if bound == f64::NEG_INFINITY {
        return "-Inf".into();
    }
    bound.to_string()
}
