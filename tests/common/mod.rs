//! Common test utilities and fixtures.

#![allow(dead_code)]

use serde_json::{json, Value};

/// Mainnet Arbitrum One sequencer inbox.
pub const ARB_ONE_INBOX: &str = "0x1c479675ad559dc151f6ec7ed3fbf8cee79582b6";

/// Arbitrum `addSequencerL2BatchFromOrigin` selector.
pub const ARB_BATCH_SELECTOR: &str = "8f111f3c";

struct TestTx {
    to: Option<String>,
    gas: u64,
    input: String,
    success: bool,
    gas_used: u64,
}

/// Test fixture builder for blocks with sensible defaults.
///
/// Every transaction pays a 2 gwei fee cap with a 1 gwei tip on a 1 gwei
/// base fee.
pub struct TestBlockBuilder {
    number: u64,
    timestamp: u64,
    txs: Vec<TestTx>,
}

impl TestBlockBuilder {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            timestamp: 1_700_000_000 + number * 12,
            txs: Vec::new(),
        }
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Plain value transfer.
    pub fn transfer(mut self, to: &str) -> Self {
        self.txs.push(TestTx {
            to: Some(to.to_string()),
            gas: 21_000,
            input: "0x".to_string(),
            success: true,
            gas_used: 21_000,
        });
        self
    }

    /// Call with the given hex calldata (no `0x`).
    pub fn call(mut self, to: &str, calldata: &str, success: bool) -> Self {
        self.txs.push(TestTx {
            to: Some(to.to_string()),
            gas: 200_000,
            input: format!("0x{calldata}"),
            success,
            gas_used: 120_000,
        });
        self
    }

    /// Contract creation.
    pub fn deploy(mut self, code: &str) -> Self {
        self.txs.push(TestTx {
            to: None,
            gas: 1_000_000,
            input: format!("0x{code}"),
            success: true,
            gas_used: 500_000,
        });
        self
    }

    pub fn build(&self) -> Value {
        let transactions: Vec<Value> = self
            .txs
            .iter()
            .enumerate()
            .map(|(i, tx)| {
                json!({
                    "type": "0x2",
                    "nonce": i,
                    "gas": tx.gas,
                    "maxFeePerGas": "0x77359400",
                    "maxPriorityFeePerGas": "0x3b9aca00",
                    "to": tx.to,
                    "input": tx.input,
                })
            })
            .collect();
        let receipts: Vec<Value> = self
            .txs
            .iter()
            .map(|tx| {
                json!({
                    "status": if tx.success { "0x1" } else { "0x0" },
                    "gasUsed": tx.gas_used,
                    "effectiveGasPrice": "0x77359400",
                    "logs": [],
                })
            })
            .collect();

        json!({
            "block": {
                "number": format!("{:#x}", self.number),
                "hash": format!("0x{:064x}", self.number),
                "timestamp": self.timestamp,
                "baseFeePerGas": "0x3b9aca00",
                "size": 1000 + 100 * self.txs.len(),
                "transactions": transactions,
                "withdrawals": [],
            },
            "receipts": receipts,
        })
    }
}

/// One JSON line per block.
pub fn jsonl(blocks: &[TestBlockBuilder]) -> String {
    let mut out = String::new();
    for block in blocks {
        out.push_str(&block.build().to_string());
        out.push('\n');
    }
    out
}
