//! Batched JSON-lines export in the VictoriaMetrics `/api/v1/import` shape.
//!
//! Every flush writes one line per series:
//!
//! ```text
//! {"metric":{"__name__":"<name>","<key>":"<value>"},"values":[...],"timestamps":[...]}
//! ```
//!
//! All series of a flush share the same timestamps, which are encoded once
//! per flush and embedded as-is into every line.

use super::{next_record, ExportStats};
use crate::core::{MetricsError, Result};
use crate::metrics::{AggregateMetric, MetricIdentity};
use futures::Stream;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Records per flush unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Serialize)]
struct SeriesLine<'a> {
    metric: &'a RawValue,
    values: &'a [f64],
    timestamps: &'a RawValue,
}

/// Buffered values of the batch in progress.
///
/// Buffers are cleared, not reallocated, between flushes.
struct Batch {
    /// Pre-encoded tag object per series
    tags: Vec<Box<RawValue>>,
    /// Values per series, parallel to `tags`
    values: Vec<Vec<f64>>,
    /// Timestamps shared by every series
    timestamps: Vec<i64>,
    out: Vec<u8>,
}

impl Batch {
    fn new(series: &[MetricIdentity], capacity: usize) -> Result<Self> {
        let tags = series.iter().map(encode_tags).collect::<Result<Vec<_>>>()?;
        let values = (0..series.len()).map(|_| Vec::with_capacity(capacity)).collect();
        Ok(Self {
            tags,
            values,
            timestamps: Vec::with_capacity(capacity),
            out: Vec::new(),
        })
    }

    fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Buffer one record's row. JSON has no NaN or infinity, so a
    /// non-finite value fails the record instead of going out as `null`.
    fn push(&mut self, timestamp: i64, row: &[f64]) -> Result<()> {
        if let Some(i) = row.iter().position(|v| !v.is_finite()) {
            return Err(MetricsError::Format(format!(
                "series {i} value {} (t={timestamp}) as JSON",
                row[i]
            )));
        }
        for (series, value) in self.values.iter_mut().zip(row) {
            series.push(*value);
        }
        self.timestamps.push(timestamp);
        Ok(())
    }

    /// Write the buffered batch as one write call and reset the buffers.
    ///
    /// Returns the number of bytes written; an empty batch writes nothing.
    async fn flush<W>(&mut self, out: &mut W) -> Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        if self.timestamps.is_empty() {
            return Ok(0);
        }

        let timestamps =
            serde_json::value::to_raw_value(&self.timestamps).map_err(|source| {
                MetricsError::Encode {
                    context: "timestamps".to_string(),
                    source,
                }
            })?;

        self.out.clear();
        for (i, (tags, values)) in self.tags.iter().zip(&self.values).enumerate() {
            let line = SeriesLine {
                metric: tags,
                values,
                timestamps: &timestamps,
            };
            serde_json::to_writer(&mut self.out, &line).map_err(|source| MetricsError::Encode {
                context: format!("series {i}"),
                source,
            })?;
            self.out.push(b'\n');
        }

        let t0 = self.timestamps[0];
        let count = self.timestamps.len();
        out.write_all(&self.out).await.map_err(|source| MetricsError::Write {
            context: format!("metrics (t0 = {t0}, count = {count}) to output"),
            source,
        })?;
        tracing::debug!(t0, count, bytes = self.out.len(), "flushed metrics batch");

        for values in &mut self.values {
            values.clear();
        }
        self.timestamps.clear();
        Ok(self.out.len())
    }
}

/// `{"__name__": <name>, <label key>: <label value>, ...}`
fn encode_tags(series: &MetricIdentity) -> Result<Box<RawValue>> {
    let mut tags = serde_json::Map::new();
    tags.insert("__name__".to_string(), series.name.clone().into());
    for label in &series.labels {
        tags.insert(label.key.clone(), label.value.clone().into());
    }
    serde_json::value::to_raw_value(&tags).map_err(|source| MetricsError::Encode {
        context: format!("metrics tags map of {:?}", series.name),
        source,
    })
}

/// Streams batched per-series JSON objects.
pub struct JsonLinesExporter<'a, E, T> {
    metric: &'a AggregateMetric<E>,
    time_fn: T,
    batch_size: usize,
}

impl<'a, E, T> JsonLinesExporter<'a, E, T>
where
    T: Fn(&E) -> i64,
{
    pub fn new(metric: &'a AggregateMetric<E>, time_fn: T) -> Self {
        Self {
            metric,
            time_fn,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Records per flush; values below 1 are treated as 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Consume `records` until the source closes or `cancel` fires.
    ///
    /// A full batch is flushed as soon as it fills up and a partial one when
    /// the source closes. On cancellation the partial batch is dropped
    /// without being written.
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
        let mut batch = Batch::new(self.metric.series(), self.batch_size)?;
        let mut dest = vec![0.0; self.metric.width()];
        let mut stats = ExportStats::default();

        loop {
            let record = match next_record(cancel, &mut records).await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        flushes = stats.writes,
                        dropped = batch.len(),
                        "JSON export cancelled, dropping partial batch"
                    );
                    return Err(e);
                },
            };
            let index = stats.records;
            let timestamp = (self.time_fn)(&record);

            dest.fill(0.0);
            self.metric
                .compute(&record, &mut dest)
                .map_err(|e| MetricsError::in_record(index, timestamp, e))?;
            batch
                .push(timestamp, &dest)
                .map_err(|e| MetricsError::in_record(index, timestamp, e))?;
            stats.records += 1;

            if batch.len() >= self.batch_size {
                let written = batch.flush(out).await?;
                stats.writes += 1;
                stats.bytes += written as u64;
            }
        }

        let written = batch.flush(out).await?;
        if written > 0 {
            stats.writes += 1;
            stats.bytes += written as u64;
        }
        out.flush().await.map_err(|source| MetricsError::Write {
            context: "JSON output".to_string(),
            source,
        })?;
        tracing::info!(
            records = stats.records,
            flushes = stats.writes,
            bytes = stats.bytes,
            "JSON export finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_support::{BrokenSink, RecordingSink};
    use crate::metrics::{aggregate, histogram, parametrized_metric, Metric};
    use futures::stream::{self, StreamExt};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[derive(Debug, Clone)]
    struct Tick {
        t: i64,
        v: f64,
    }

    fn ticks(n: i64) -> Vec<Tick> {
        (0..n).map(|i| Tick { t: 1000 + i, v: i as f64 }).collect()
    }

    fn tree() -> AggregateMetric<Tick> {
        crate::metrics::combine_aggregates([
            aggregate([Metric::new("tick_value", |t: &Tick| Ok(t.v))]),
            parametrized_metric("tick_parity", "parity", ["even", "odd"], |t: &Tick, dest| {
                dest[(t.t % 2) as usize] += 1.0;
                Ok(())
            }),
        ])
    }

    fn parse_lines(write: &[u8]) -> Vec<Value> {
        std::str::from_utf8(write)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_batches_of_100() {
        let tree = tree();
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t);
        assert_eq!(exporter.batch_size(), 100);
        let mut out = RecordingSink::default();

        let stats = exporter
            .run(&CancellationToken::new(), stream::iter(ticks(250)), &mut out)
            .await
            .unwrap();

        assert_eq!(stats.records, 250);
        assert_eq!(stats.writes, 3);
        assert_eq!(out.writes.len(), 3);

        let sizes: Vec<usize> = out
            .writes
            .iter()
            .map(|w| parse_lines(w)[0]["timestamps"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, [100, 100, 50]);

        let last = parse_lines(&out.writes[2]);
        assert_eq!(last.len(), tree.width());
        for line in &last {
            assert_eq!(line["timestamps"].as_array().unwrap().len(), 50);
            assert_eq!(line["values"].as_array().unwrap().len(), 50);
        }
        assert_eq!(last[0]["timestamps"][0], Value::from(1200));
        assert_eq!(last[0]["values"][49], Value::from(249.0));
    }

    #[tokio::test]
    async fn test_line_shape() {
        let tree = tree();
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t).with_batch_size(2);
        let mut out = RecordingSink::default();
        exporter
            .run(&CancellationToken::new(), stream::iter(ticks(2)), &mut out)
            .await
            .unwrap();

        assert_eq!(
            out.joined(),
            concat!(
                r#"{"metric":{"__name__":"tick_value"},"values":[0.0,1.0],"timestamps":[1000,1001]}"#,
                "\n",
                r#"{"metric":{"__name__":"tick_parity","parity":"even"},"values":[1.0,0.0],"timestamps":[1000,1001]}"#,
                "\n",
                r#"{"metric":{"__name__":"tick_parity","parity":"odd"},"values":[0.0,1.0],"timestamps":[1000,1001]}"#,
                "\n",
            )
        );
    }

    #[tokio::test]
    async fn test_shared_timestamps_identical() {
        let tree = histogram("tick", vec![1.0, 10.0], |t: &Tick, sink| {
            sink.observe(t.v);
            Ok(())
        });
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t).with_batch_size(7);
        let mut out = Vec::new();
        exporter
            .run(&CancellationToken::new(), stream::iter(ticks(5)), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let encoded: Vec<&str> = text
            .lines()
            .map(|l| {
                let at = l.find(r#""timestamps":"#).unwrap();
                &l[at..]
            })
            .collect();
        assert_eq!(encoded.len(), 5);
        assert!(encoded.iter().all(|e| *e == encoded[0]));
    }

    #[tokio::test]
    async fn test_empty_source_writes_nothing() {
        let tree = tree();
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t);
        let mut out = RecordingSink::default();
        let stats = exporter
            .run(&CancellationToken::new(), stream::iter(Vec::<Tick>::new()), &mut out)
            .await
            .unwrap();
        assert_eq!(stats.writes, 0);
        assert!(out.writes.is_empty());
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_flush() {
        let tree = tree();
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t).with_batch_size(10);
        let mut out = RecordingSink::default();
        let stats = exporter
            .run(&CancellationToken::new(), stream::iter(ticks(20)), &mut out)
            .await
            .unwrap();
        assert_eq!(stats.writes, 2);
        assert_eq!(out.writes.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_drops_partial_batch() {
        let tree = tree();
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t).with_batch_size(10);
        let cancel = CancellationToken::new();
        let mut out = RecordingSink::default();

        // one full batch plus 5 records, then the source stalls
        let records = stream::iter(ticks(15)).chain(stream::pending());
        let trigger = cancel.clone();
        let (result, ()) = tokio::join!(exporter.run(&cancel, records, &mut out), async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(out.writes.len(), 1);
        for line in parse_lines(&out.writes[0]) {
            let timestamps = line["timestamps"].as_array().unwrap();
            assert_eq!(timestamps.len(), 10);
            assert!(timestamps.iter().all(|t| t.as_i64().unwrap() < 1010));
        }
    }

    #[tokio::test]
    async fn test_compute_error_has_record_context() {
        let tree = aggregate([Metric::new("v", |t: &Tick| {
            if t.t == 1003 {
                Err(MetricsError::extract("bad tick"))
            } else {
                Ok(t.v)
            }
        })]);
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t);
        let mut out = RecordingSink::default();
        let err = exporter
            .run(&CancellationToken::new(), stream::iter(ticks(10)), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetricsError::Record {
                index: 3,
                timestamp: 1003,
                ..
            }
        ));
        assert!(out.writes.is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_value_rejected() {
        let tree = aggregate([Metric::new("ratio", |t: &Tick| {
            Ok(if t.t == 1001 { f64::INFINITY } else { t.v })
        })]);
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t);
        let mut out = RecordingSink::default();
        let err = exporter
            .run(&CancellationToken::new(), stream::iter(ticks(3)), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MetricsError::Record {
                index: 1,
                timestamp: 1001,
                ..
            }
        ));
        assert_eq!(err.root_cause().category(), "encode");
        assert!(err.to_string().contains("series 0 value inf"));
        assert!(out.writes.is_empty());
    }

    #[tokio::test]
    async fn test_write_error() {
        let tree = tree();
        let exporter = JsonLinesExporter::new(&tree, |t: &Tick| t.t);
        let err = exporter
            .run(&CancellationToken::new(), stream::iter(ticks(3)), &mut BrokenSink)
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Write { .. }));
        assert!(err.to_string().contains("t0 = 1000, count = 3"));
    }
}
