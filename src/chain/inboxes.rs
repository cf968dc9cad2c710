//! Known rollup batch inboxes on L1 chains.
//!
//! Tables are built on demand and handed to the metric constructors that
//! need them; nothing here is global or mutable.

use super::types::Address;
use crate::core::{MetricsError, Result};
use ahash::AHashMap;

/// Rollup inboxes by address.
pub type InboxTable = AHashMap<Address, Inbox>;

/// A rollup batch inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbox {
    pub name: String,
    /// Method selectors that count as batch submissions. Empty means any
    /// calldata counts, for inboxes that take raw data.
    pub method_sigs: Vec<[u8; 4]>,
}

impl Inbox {
    pub fn new(name: &str, method_sigs: &[&str]) -> Result<Self> {
        let method_sigs = method_sigs
            .iter()
            .map(|sig| parse_method_sig(sig))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            method_sigs,
        })
    }

    /// Does this calldata look like a batch submission to this inbox
    pub fn accepts(&self, input: &[u8]) -> bool {
        self.method_sigs.is_empty() || self.method_sigs.iter().any(|sig| input.starts_with(sig))
    }
}

fn parse_method_sig(sig: &str) -> Result<[u8; 4]> {
    let digits = sig.strip_prefix("0x").unwrap_or(sig);
    let bytes = hex::decode(digits)
        .map_err(|e| MetricsError::config(format!("bad method sig {sig:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| MetricsError::config(format!("bad method sig len: {}", b.len())))
}

// (address, name, method selectors)
type InboxSpec = (&'static str, &'static str, &'static [&'static str]);

const ETH_MAINNET_INBOXES: &[InboxSpec] = &[
    ("0xff00000000000000000000000000000000000010", "mainnet op", &[]),
    // addSequencerL2BatchFromOrigin
    ("0x1c479675ad559dc151f6ec7ed3fbf8cee79582b6", "mainnet arb one sequencer inbox", &["0x8f111f3c"]),
    ("0x211e1c4c7f1bf5351ac850ed10fd68cffcf6c21b", "mainnet arb nova sequencer inbox", &["0x8f111f3c"]),
    // commitBlocks, proveBlocks
    ("0x3dB52cE065f728011Ac6732222270b3F2360d919", "mainnet zksync era", &["0x0c4dd810", "0x7739cbe7"]),
    // commitBlocks
    ("0xaBEA9132b05A70803a4E85094fD0e1800777fBEF", "mainnet zksync lite", &["0x45269298"]),
    // sequenceBatches, verifyBatchesTrustedAggregator
    ("0x5132A183E9F3CB7C848b0AAC5Ae0c4f0491B7aB2", "mainnet polygon zkevm", &["0x5e9145c9", "0xa50a164b"]),
    ("0x6F54Ca6F6EdE96662024Ffd61BFd18f3f4e34DFf", "mainnet zora", &[]),
];

const ETH_GOERLI_INBOXES: &[InboxSpec] = &[
    ("0xff00000000000000000000000000000000000420", "goerli op", &[]),
    ("0x8453100000000000000000000000000000000000", "goerli base", &[]),
    ("0xa997cfD539E703921fD1e3Cf25b4c241a27a4c7A", "goerli polygon zkevm", &["0x5e9145c9", "0xa50a164b"]),
    // proveBlocks, commitBlocks, executeBlocks
    ("0xB949b4E3945628650862a29Abef3291F2eD52471", "goerli zksync era", &["0x7739cbe7", "0x0c4dd810", "0xce9dcf16"]),
    ("0x3C584eC7f0f2764CC715ac3180Ae9828465E9833", "goerli scroll alpha", &["0xcb905499"]),
    ("0x0484A87B144745A2E5b7c359552119B6EA2917A9", "goerli arb sequencer inbox", &["0x8f111f3c"]),
    ("0xFf00000000000000000000000000000000000421", "goerli op nightly", &[]),
    ("0xff00000000000000000000000000000000000888", "goerli op chaos", &[]),
    ("0x70BaD09280FD342D02fe64119779BC1f0791BAC2", "goerli linea", &["0x4165d6dd"]),
    ("0xFf00000000000000000000000000000000042069", "goerli op unknown", &[]),
    ("0xff00000000000000000000000000000000000997", "goerli op internal", &[]),
    ("0x427c9a666d3b27873111cE3894712Bf64C6343A0", "goerli zora", &[]),
];

/// L1 chain ids with a known inbox table.
pub const KNOWN_L1_CHAIN_IDS: &[u64] = &[1, 5];

/// Build the inbox table of an L1 chain.
pub fn inbox_table(l1_chain_id: u64) -> Result<InboxTable> {
    let specs = match l1_chain_id {
        1 => ETH_MAINNET_INBOXES,
        5 => ETH_GOERLI_INBOXES,
        other => return Err(MetricsError::config(format!("unknown L1: {other}"))),
    };

    let mut table = InboxTable::with_capacity(specs.len());
    for (addr, name, sigs) in specs {
        let addr: Address = addr
            .parse()
            .map_err(|e: String| MetricsError::config(format!("inbox {name}: {e}")))?;
        table.insert(addr, Inbox::new(name, sigs)?);
    }
    Ok(table)
}
