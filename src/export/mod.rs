//! Streaming exporters for metric trees.
//!
//! Both exporters consume a cancellable record stream, compute the tree
//! into one reusable scratch vector per record, and write encoded bytes to
//! an async sink:
//! - [`CsvExporter`]: one `<timestamp>,<v0>,...,<vN>` line per record
//! - [`JsonLinesExporter`]: one tagged time-series object per series per
//!   batch of records
//!
//! Cancellation is only observed while waiting for the next record, and
//! always wins over a record that is ready at the same time.

pub mod csv;
pub mod json;

pub use self::csv::CsvExporter;
pub use self::json::{JsonLinesExporter, DEFAULT_BATCH_SIZE};

use crate::core::{MetricsError, Result};
use crate::metrics::AggregateMetric;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Dense CSV, one line per record
    #[default]
    Csv,
    /// Batched JSON lines in the VictoriaMetrics import format
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" | "jsonl" | "json-lines" => Ok(ExportFormat::Json),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => f.write_str("csv"),
            ExportFormat::Json => f.write_str("json"),
        }
    }
}

/// Counters of a finished export run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Records consumed and computed
    pub records: u64,
    /// Write calls issued to the sink (lines for CSV, flushes for JSON)
    pub writes: u64,
    /// Bytes written to the sink
    pub bytes: u64,
}

/// Wait for the next record, or fail with [`MetricsError::Cancelled`].
///
/// `Ok(None)` means the source closed cleanly.
pub(crate) async fn next_record<S>(
    cancel: &CancellationToken,
    records: &mut S,
) -> Result<Option<S::Item>>
where
    S: Stream + Unpin,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(MetricsError::Cancelled),
        next = records.next() => Ok(next),
    }
}

/// Run the exporter for `format` over `records`, writing to `out`.
pub async fn run_export<E, T, S, W>(
    format: ExportFormat,
    batch_size: usize,
    metric: &AggregateMetric<E>,
    time_fn: T,
    cancel: &CancellationToken,
    records: S,
    out: &mut W,
) -> Result<ExportStats>
where
    T: Fn(&E) -> i64,
    S: Stream<Item = E> + Unpin,
    W: AsyncWrite + Unpin,
{
    match format {
        ExportFormat::Csv => CsvExporter::new(metric, time_fn).run(cancel, records, out).await,
        ExportFormat::Json => {
            JsonLinesExporter::new(metric, time_fn)
                .with_batch_size(batch_size)
                .run(cancel, records, out)
                .await
        },
    }
}
