//! Metric aggregation algebra.
//!
//! Trees are assembled once from scalar metrics, histograms and
//! parametrized splits, then flattened into a single fixed-width vector
//! computation per record:
//! - O(width) per record, no allocation
//! - Positionally stable series order
//! - Failures traceable to one named metric through nested combinators

pub mod combinators;
pub mod histogram;
pub mod types;

pub use combinators::{aggregate, combine_aggregates, parametrized_metric, transform_aggregate};
pub use histogram::{histogram, HistogramSink};
pub use types::{AggregateMetric, ComputeFn, Label, Labels, Metric, MetricIdentity};
