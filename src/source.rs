//! JSON-lines block source.
//!
//! Reads one [`BlockWithReceipts`] per line and feeds it into a bounded
//! channel; a full channel blocks the reader. The receiving side is turned
//! into the record stream the exporters consume.

use crate::chain::BlockWithReceipts;
use crate::core::{MetricsError, Result};
use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Counters of a finished read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Lines read, blank ones included
    pub lines: u64,
    /// Records handed to the channel
    pub records: u64,
    /// Records dropped for being older than the minimum time
    pub skipped: u64,
}

/// Reads blocks from JSON lines.
#[derive(Debug, Clone, Default)]
pub struct BlockReader {
    min_time: u64,
}

impl BlockReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip blocks with a timestamp below `min_time`.
    pub fn with_min_time(mut self, min_time: u64) -> Self {
        self.min_time = min_time;
        self
    }

    /// Read `input` to the end, sending each block to `sink`.
    ///
    /// Stops early, without error, when `cancel` fires or the receiver is
    /// dropped. A malformed line fails with [`MetricsError::Parse`] and
    /// ends the read; `sink` is dropped either way, which closes the
    /// record stream.
    pub async fn run<R>(
        &self,
        cancel: &CancellationToken,
        input: R,
        sink: mpsc::Sender<BlockWithReceipts>,
    ) -> Result<ReadStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut stats = ReadStats::default();

        loop {
            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            stats.lines += 1;

            if line.trim().is_empty() {
                continue;
            }
            let record: BlockWithReceipts = serde_json::from_str(&line)
                .map_err(|e| MetricsError::parse(stats.lines, e.to_string()))?;

            if record.block.header.timestamp < self.min_time {
                stats.skipped += 1;
                continue;
            }

            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                sent = sink.send(record) => sent,
            };
            if sent.is_err() {
                tracing::debug!(line = stats.lines, "record receiver dropped, stopping reader");
                break;
            }
            stats.records += 1;
        }

        tracing::debug!(
            lines = stats.lines,
            records = stats.records,
            skipped = stats.skipped,
            "block reader finished"
        );
        Ok(stats)
    }
}

/// Record stream over the receiving end of the reader's channel.
///
/// Ends once every sender is dropped and the buffer is drained.
pub fn record_stream<T>(mut rx: mpsc::Receiver<T>) -> impl Stream<Item = T> + Unpin {
    futures::stream::poll_fn(move |cx| rx.poll_recv(cx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn line(number: u64, timestamp: u64) -> String {
        format!(
            r#"{{"block": {{"number": {number}, "hash": "0x{:064x}", "timestamp": {timestamp}}}, "receipts": []}}"#,
            number
        )
    }

    #[tokio::test]
    async fn test_reads_all_records() {
        let input = format!("{}\n\n{}\n{}\n", line(1, 10), line(2, 20), line(3, 30));
        let (tx, rx) = mpsc::channel(8);

        let stats = BlockReader::new()
            .run(&CancellationToken::new(), input.as_bytes(), tx)
            .await
            .unwrap();
        assert_eq!(
            stats,
            ReadStats {
                lines: 4,
                records: 3,
                skipped: 0
            }
        );

        let numbers: Vec<u64> = record_stream(rx).map(|r| r.block.header.number).collect().await;
        assert_eq!(numbers, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_min_time_filter() {
        let input = format!("{}\n{}\n{}\n", line(1, 10), line(2, 20), line(3, 30));
        let (tx, rx) = mpsc::channel(8);

        let stats = BlockReader::new()
            .with_min_time(20)
            .run(&CancellationToken::new(), input.as_bytes(), tx)
            .await
            .unwrap();
        assert_eq!(stats.skipped, 1);

        let numbers: Vec<u64> = record_stream(rx).map(|r| r.block.header.number).collect().await;
        assert_eq!(numbers, [2, 3]);
    }

    #[tokio::test]
    async fn test_malformed_line() {
        let input = format!("{}\nnot json\n{}\n", line(1, 10), line(3, 30));
        let (tx, rx) = mpsc::channel(8);

        let err = BlockReader::new()
            .run(&CancellationToken::new(), input.as_bytes(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Parse { line: 2, .. }));

        // the record before the bad line still went through
        let numbers: Vec<u64> = record_stream(rx).map(|r| r.block.header.number).collect().await;
        assert_eq!(numbers, [1]);
    }

    #[tokio::test]
    async fn test_backpressure_and_dropped_receiver() {
        let input = format!("{}\n{}\n{}\n", line(1, 10), line(2, 20), line(3, 30));
        let (tx, mut rx) = mpsc::channel(1);

        let reader = BlockReader::new();
        let cancel = CancellationToken::new();
        let (stats, ()) = tokio::join!(reader.run(&cancel, input.as_bytes(), tx), async move {
            let first = rx.recv().await.unwrap();
            assert_eq!(first.block.header.number, 1);
            drop(rx);
        });

        let stats = stats.unwrap();
        assert!(stats.records < 3);
    }

    #[tokio::test]
    async fn test_cancelled_reader_stops() {
        let input = format!("{}\n", line(1, 10));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = BlockReader::new().run(&cancel, input.as_bytes(), tx).await.unwrap();
        assert_eq!(stats.records, 0);
        assert_eq!(record_stream(rx).count().await, 0);
    }
}
