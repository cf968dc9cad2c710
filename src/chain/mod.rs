//! Ethereum-family chain records and the metric trees computed over them.

pub mod inboxes;
pub mod metrics;
pub mod types;

pub use inboxes::{inbox_table, Inbox, InboxTable, KNOWN_L1_CHAIN_IDS};
pub use metrics::{calldata_stats, chain_metrics};
pub use types::{Address, Block, BlockWithReceipts, Header, Receipt, Transaction, B256};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of chain being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Ethereum L1
    Ethereum,
    /// OP-stack L2
    Opstack,
}

impl FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" => Ok(ChainType::Ethereum),
            "opstack" => Ok(ChainType::Opstack),
            _ => Err(format!("unrecognized chain type: {s:?}")),
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainType::Ethereum => f.write_str("ethereum"),
            ChainType::Opstack => f.write_str("opstack"),
        }
    }
}
