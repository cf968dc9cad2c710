//! Build-time combinators over [`AggregateMetric`].
//!
//! All offset arithmetic happens here, once. The closures these functions
//! return only index into precomputed ranges when a record is computed.

use super::types::{AggregateMetric, Metric, MetricIdentity};
use crate::core::{MetricsError, Result};

/// Collect scalar metrics into an aggregate, one slot each, in declaration
/// order. The first failing metric aborts the computation.
pub fn aggregate<E: 'static>(metrics: impl IntoIterator<Item = Metric<E>>) -> AggregateMetric<E> {
    let (series, funcs): (Vec<MetricIdentity>, Vec<_>) =
        metrics.into_iter().map(Metric::into_parts).unzip();

    // Identities are kept alongside for error context only.
    let ids = series.clone();
    AggregateMetric::new(series, move |record, dest| {
        for ((slot, func), id) in dest.iter_mut().zip(&funcs).zip(&ids) {
            *slot = func(record).map_err(|e| MetricsError::in_metric(id.to_string(), e))?;
        }
        Ok(())
    })
}

/// Concatenate aggregates into one tree.
///
/// Each child owns the sub-range `start..start + width` of the parent's
/// destination, fixed here in declaration order. Failures are wrapped with
/// the failing child's index.
pub fn combine_aggregates<E: 'static>(
    aggs: impl IntoIterator<Item = AggregateMetric<E>>,
) -> AggregateMetric<E> {
    let mut series = Vec::new();
    let mut children = Vec::new();
    for agg in aggs {
        let (child_series, func) = agg.into_parts();
        let start = series.len();
        let width = child_series.len();
        series.extend(child_series);
        children.push((start, width, func));
    }

    AggregateMetric::new(series, move |record, dest| {
        for (index, (start, width, func)) in children.iter().enumerate() {
            func(record, &mut dest[*start..*start + *width])
                .map_err(|e| MetricsError::in_aggregate(index, e))?;
        }
        Ok(())
    })
}

/// Reuse a tree built for `A` on an outer record type `B`.
///
/// `convert` projects the outer record onto the inner one; series are
/// unchanged.
pub fn transform_aggregate<A, B, F>(convert: F, inner: AggregateMetric<A>) -> AggregateMetric<B>
where
    A: 'static,
    B: 'static,
    F: Fn(&B) -> &A + Send + Sync + 'static,
{
    let (series, func) = inner.into_parts();
    AggregateMetric::new(series, move |record: &B, dest: &mut [f64]| func(convert(record), dest))
}

/// One metric name split over an enumerated, ordered label domain.
///
/// `func` receives the whole `values.len()`-wide destination and fans out
/// into it itself, e.g. counting sub-items per category.
pub fn parametrized_metric<E, F>(
    name: &str,
    key: &str,
    values: impl IntoIterator<Item = impl Into<String>>,
    func: F,
) -> AggregateMetric<E>
where
    E: 'static,
    F: Fn(&E, &mut [f64]) -> Result<()> + Send + Sync + 'static,
{
    let series = values
        .into_iter()
        .map(|value| MetricIdentity::with_label(name, key, value))
        .collect();
    AggregateMetric::new(series, func)
}
