//! Dense CSV export: one `<timestamp>,<v0>,...,<vN>\n` line per record.

use super::{next_record, ExportStats};
use crate::core::{MetricsError, Result};
use crate::metrics::AggregateMetric;
use futures::Stream;
use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Fractional digits of every CSV value.
pub const CSV_PRECISION: usize = 8;

/// Streams one CSV line per record.
pub struct CsvExporter<'a, E, T> {
    metric: &'a AggregateMetric<E>,
    time_fn: T,
}

impl<'a, E, T> CsvExporter<'a, E, T>
where
    T: Fn(&E) -> i64,
{
    pub fn new(metric: &'a AggregateMetric<E>, time_fn: T) -> Self {
        Self { metric, time_fn }
    }

    /// CSV header matching the value columns: `timestamp,<series>,...`
    pub fn header(&self) -> String {
        let mut header = String::from("timestamp");
        for series in self.metric.series() {
            header.push(',');
            header.push_str(&series.to_string());
        }
        header.push('\n');
        header
    }

    /// Consume `records` until the source closes or `cancel` fires.
    ///
    /// Each line goes out in a single write, after its record was fully
    /// computed; a failing record never produces partial output.
    pub async fn run<S, W>(
        &self,
        cancel: &CancellationToken,
        mut records: S,
        out: &mut W,
    ) -> Result<ExportStats>
    where
        S: Stream<Item = E> + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut dest = vec![0.0; self.metric.width()];
        // ~20 bytes covers the timestamp and a typical value
        let mut buf: Vec<u8> = Vec::with_capacity(20 * (dest.len() + 1));
        let mut stats = ExportStats::default();

        loop {
            let record = match next_record(cancel, &mut records).await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(lines = stats.writes, "CSV export cancelled");
                    return Err(e);
                },
            };
            let index = stats.records;
            let timestamp = (self.time_fn)(&record);

            dest.fill(0.0);
            self.metric
                .compute(&record, &mut dest)
                .map_err(|e| MetricsError::in_record(index, timestamp, e))?;

            buf.clear();
            format_line(&mut buf, timestamp, &dest)
                .map_err(|e| MetricsError::in_record(index, timestamp, e))?;

            out.write_all(&buf).await.map_err(|source| MetricsError::Write {
                context: format!("line {index} (t={timestamp})"),
                source,
            })?;

            stats.records += 1;
            stats.writes += 1;
            stats.bytes += buf.len() as u64;
        }

        out.flush().await.map_err(|source| MetricsError::Write {
            context: "CSV output".to_string(),
            source,
        })?;
        tracing::info!(records = stats.records, bytes = stats.bytes, "CSV export finished");
        Ok(stats)
    }
}

fn format_line(buf: &mut Vec<u8>, timestamp: i64, values: &[f64]) -> Result<()> {
    write!(buf, "{timestamp}").map_err(|e| MetricsError::Format(format!("timestamp: {e}")))?;
    for v in values {
        // infinities spelled the way Prometheus-style tooling parses them
        if *v == f64::INFINITY {
            buf.extend_from_slice(b",+Inf");
        } else if *v == f64::NEG_INFINITY {
            buf.extend_from_slice(b",-Inf");
        } else {
            write!(buf, ",{:.*}", CSV_PRECISION, v)
                .map_err(|e| MetricsError::Format(format!("value {v}: {e}")))?;
        }
    }
    buf.push(b'\n');
    Ok(())
}
