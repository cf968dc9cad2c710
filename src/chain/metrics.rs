//! Ethereum and OP-stack block metrics.
//!
//! The tree is composed once per chain and then computed for every block:
//!
//! ```text
//! combine
//! ├── transform(block)
//! │   └── combine
//! │       ├── transform(header) [block_number, block_basefee]
//! │       ├── [block_hash, block_tx_count, block_size, block_deploy_txs]
//! │       ├── block_withdrawals, tx_gas_limit, block_tx_type_usage
//! │       ├── tx_priority_fee, tx_size, tx_rollup_data_gas
//! │       └── calldata_txs (only with an inbox table)
//! ├── block_tx_status
//! └── tx_nonce, tx_gas_usage, tx_fee, block_tx_logs, block_tx_l1_cost
//! ```

use super::inboxes::{Inbox, InboxTable};
use super::types::{
    gwei, Address, Block, BlockWithReceipts, Header, Receipt, Transaction, DEPOSIT_TX_TYPE,
};
use super::ChainType;
use crate::core::Result;
use crate::metrics::{
    aggregate, combine_aggregates, histogram, parametrized_metric, transform_aggregate,
    AggregateMetric, Metric,
};
use ahash::AHashMap;

/// Fee bounds in gwei.
pub const FEE_BOUNDS: [f64; 8] = [0.001, 0.01, 0.1, 1.0, 10.0, 100.0, 1000.0, 10000.0];

const GAS_LIMIT_BOUNDS: [f64; 10] = [
    0.0, 21_000.0, 50_000.0, 100_000.0, 250_000.0, 1_000_000.0, 4_000_000.0, 8_000_000.0,
    15_000_000.0, 30_000_000.0,
];

const NONCE_BOUNDS: [f64; 8] = [0.0, 1.0, 5.0, 10.0, 100.0, 1000.0, 10_000.0, 100_000.0];

const TX_SIZE_BOUNDS: [f64; 7] = [100.0, 1000.0, 10_000.0, 20_000.0, 40_000.0, 128_000.0, 1_000_000.0];

const ROLLUP_DATA_GAS_BOUNDS: [f64; 7] =
    [0.0, 100.0, 1000.0, 10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0];

/// Trailing `calldata_txs` categories, after the inboxes.
pub const CALLDATA_CONTRACT_DEPLOYS: &str = "contract deploys";
pub const CALLDATA_UNKNOWN_METHOD: &str = "unknown method";
pub const CALLDATA_OTHER: &str = "other";

/// Metric tree of a chain.
///
/// OP-stack chains use the Ethereum set; their deposit-specific fields
/// (deposit nonce, L1 fee) are optional on every record. With an inbox
/// table the tree also splits calldata by rollup inbox.
pub fn chain_metrics(
    kind: ChainType,
    inboxes: Option<InboxTable>,
) -> AggregateMetric<BlockWithReceipts> {
    let tree = eth_metrics(inboxes);
    tracing::debug!(%kind, series = tree.width(), "built chain metric tree");
    tree
}

fn eth_metrics(inboxes: Option<InboxTable>) -> AggregateMetric<BlockWithReceipts> {
    let mut block_aggs = vec![
        transform_aggregate(Block::header, aggregate([block_number(), block_basefee()])),
        aggregate([block_hash(), block_tx_count(), block_size(), block_deploy_txs()]),
        block_withdrawals(),
        tx_histogram("tx_gas_limit", GAS_LIMIT_BOUNDS.to_vec(), |_, tx| tx.gas as f64),
        block_tx_type_usage(),
        tx_histogram("tx_priority_fee", FEE_BOUNDS.to_vec(), |block, tx| {
            gwei(tx.effective_gas_tip(block.base_fee()))
        }),
        tx_histogram("tx_size", TX_SIZE_BOUNDS.to_vec(), |_, tx| tx.size() as f64),
        tx_histogram("tx_rollup_data_gas", ROLLUP_DATA_GAS_BOUNDS.to_vec(), |_, tx| {
            tx.rollup_data_gas() as f64
        }),
    ];
    if let Some(inboxes) = inboxes {
        block_aggs.push(calldata_stats(inboxes));
    }

    combine_aggregates([
        transform_aggregate(BlockWithReceipts::block, combine_aggregates(block_aggs)),
        block_tx_status(),
        receipt_histogram("tx_nonce", NONCE_BOUNDS.to_vec(), |tx, rec| {
            tx.nonce.or(rec.deposit_nonce).map_or(-1.0, |n| n as f64)
        }),
        receipt_histogram("tx_gas_usage", Vec::new(), |_, rec| rec.gas_used as f64),
        receipt_histogram("tx_fee", Vec::new(), |_, rec| gwei(rec.fee())),
        receipt_histogram("block_tx_logs", Vec::new(), |_, rec| rec.logs.len() as f64),
        receipt_histogram("block_tx_l1_cost", Vec::new(), |_, rec| {
            gwei(rec.l1_fee.unwrap_or(0))
        }),
    ])
}

fn block_number() -> Metric<Header> {
    Metric::new("block_number", |hdr: &Header| Ok(hdr.number as f64))
}

fn block_basefee() -> Metric<Header> {
    Metric::new("block_basefee", |hdr: &Header| Ok(gwei(hdr.base_fee_per_gas.unwrap_or(0))))
}

/// First 8 hash bytes as a little-endian integer, so hash changes show up
/// when graphed. A plain conversion keeps the value in a sane range.
fn block_hash() -> Metric<Block> {
    Metric::new("block_hash", |block: &Block| {
        let mut head = [0u8; 8];
        head.copy_from_slice(&block.hash().as_bytes()[..8]);
        Ok(u64::from_le_bytes(head) as f64)
    })
}

fn block_tx_count() -> Metric<Block> {
    Metric::new("block_tx_count", |block: &Block| Ok(block.transactions.len() as f64))
}

fn block_size() -> Metric<Block> {
    Metric::new("block_size", |block: &Block| Ok(block.size as f64))
}

fn block_deploy_txs() -> Metric<Block> {
    Metric::new("block_deploy_txs", |block: &Block| {
        Ok(block.transactions.iter().filter(|tx| tx.to.is_none()).count() as f64)
    })
}

fn block_withdrawals() -> AggregateMetric<Block> {
    histogram("block_withdrawals", Vec::new(), |block: &Block, sink| {
        for w in &block.withdrawals {
            sink.observe(w.amount as f64);
        }
        Ok(())
    })
}

fn block_tx_type_usage() -> AggregateMetric<Block> {
    parametrized_metric(
        "block_tx_type_usage",
        "tx_type",
        ["0", "1", "2", "3", "126", "other"],
        |block: &Block, dest| {
            for tx in &block.transactions {
                let slot = match tx.tx_type {
                    0..=3 => tx.tx_type as usize,
                    DEPOSIT_TX_TYPE => 4,
                    _ => 5,
                };
                dest[slot] += 1.0;
            }
            Ok(())
        },
    )
}

fn block_tx_status() -> AggregateMetric<BlockWithReceipts> {
    parametrized_metric(
        "block_tx_status",
        "status",
        ["success", "failed"],
        |record: &BlockWithReceipts, dest| {
            for rec in &record.receipts {
                if rec.is_success() {
                    dest[0] += 1.0;
                } else {
                    dest[1] += 1.0;
                }
            }
            Ok(())
        },
    )
}

/// Histogram with one observation per transaction of a block.
fn tx_histogram<F>(name: &str, bounds: Vec<f64>, value: F) -> AggregateMetric<Block>
where
    F: Fn(&Block, &Transaction) -> f64 + Send + Sync + 'static,
{
    histogram(name, bounds, move |block: &Block, sink| {
        for tx in &block.transactions {
            sink.observe(value(block, tx));
        }
        Ok(())
    })
}

/// Histogram with one observation per transaction and its receipt.
fn receipt_histogram<F>(name: &str, bounds: Vec<f64>, value: F) -> AggregateMetric<BlockWithReceipts>
where
    F: Fn(&Transaction, &Receipt) -> f64 + Send + Sync + 'static,
{
    histogram(name, bounds, move |record: &BlockWithReceipts, sink| {
        for (tx, rec) in record.transactions_with_receipts()? {
            sink.observe(value(tx, rec));
        }
        Ok(())
    })
}

/// Calldata volume (transaction sizes) per rollup inbox.
///
/// Inboxes are ordered by name. Transactions without a recipient count as
/// contract deploys, transactions to an inbox with a non-matching selector
/// as unknown method, and everything else as other.
pub fn calldata_stats(inboxes: InboxTable) -> AggregateMetric<Block> {
    let mut entries: Vec<(Address, Inbox)> = inboxes.into_iter().collect();
    entries.sort_by(|a, b| a.1.name.cmp(&b.1.name).then(a.0.cmp(&b.0)));

    let mut names: Vec<String> = entries.iter().map(|(_, inbox)| inbox.name.clone()).collect();
    names.extend(
        [CALLDATA_CONTRACT_DEPLOYS, CALLDATA_UNKNOWN_METHOD, CALLDATA_OTHER].map(String::from),
    );

    let slots: AHashMap<Address, (usize, Inbox)> = entries
        .into_iter()
        .enumerate()
        .map(|(slot, (addr, inbox))| (addr, (slot, inbox)))
        .collect();

    parametrized_metric("calldata_txs", "inbox", names, move |block: &Block, dest| -> Result<()> {
        let n = dest.len();
        for tx in &block.transactions {
            let slot = match tx.to.as_ref() {
                None => n - 3,
                Some(to) => match slots.get(to) {
                    Some((slot, inbox)) if inbox.accepts(tx.input.as_slice()) => *slot,
                    Some(_) => n - 2,
                    None => n - 1,
                },
            };
            dest[slot] += tx.size() as f64;
        }
        Ok(())
    })
}
