//! Onchain metrics - per-block metric vectors streamed as CSV or JSON lines.
//!
//! Metric trees are composed once from a small algebra of scalar metrics,
//! histograms and labelled splits, then computed for every record into one
//! flat, positionally stable vector. Exporters turn those vectors into
//! output bytes as records stream in.
//!
//! # Architecture
//!
//! - `metrics`: the composition algebra
//! - `export`: CSV and JSON-lines exporters
//! - `chain`: Ethereum/OP-stack records and their metric set
//! - `source`: JSON-lines block reader
//! - `core`: errors and configuration
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use futures::stream;
//! use onchain_metrics::export::CsvExporter;
//! use onchain_metrics::metrics::{aggregate, Metric};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> onchain_metrics::Result<()> {
//!     let tree = aggregate([Metric::new("double", |v: &(i64, f64)| Ok(v.1 * 2.0))]);
//!     let exporter = CsvExporter::new(&tree, |v: &(i64, f64)| v.0);
//!     let mut out = tokio::io::stdout();
//!     let records = stream::iter([(1, 0.5), (2, 1.5)]);
//!     exporter.run(&CancellationToken::new(), records, &mut out).await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod chain;
pub mod cli;
pub mod core;
pub mod export;
pub mod metrics;
pub mod source;

// Re-export core types for convenience
pub use crate::core::{Config, MetricsError, Result};
pub use crate::metrics::{AggregateMetric, Metric, MetricIdentity};
