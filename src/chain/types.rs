//! Block records as read from JSON lines.
//!
//! Field names follow the Ethereum JSON-RPC block/receipt objects.
//! Quantities may be JSON numbers or `0x`-prefixed hex strings; numbers
//! above `u64::MAX` only survive exactly in hex form.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits)
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = decode_hex(s).map_err(|e| format!("invalid hex {s:?}: {e}"))?;
                let array: [u8; $len] = bytes.try_into().map_err(|b: Vec<u8>| {
                    format!("expected {} bytes, got {} in {s:?}", $len, b.len())
                })?;
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 20-byte account address
    Address,
    20
);
fixed_bytes!(
    /// 32-byte hash
    B256,
    32
);

/// Variable-length hex data such as transaction input.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        decode_hex(&s).map(Bytes).map_err(de::Error::custom)
    }
}

/// Number-or-hex quantity decoding used through `deserialize_with`.
mod quantity {
    use super::*;

    struct QuantityVisitor;

    impl<'de> Visitor<'de> for QuantityVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or 0x-prefixed hex quantity")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(u128::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative quantity {v}")))
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u128, E> {
            // numbers beyond u64 arrive as floats
            if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
                Ok(v as u128)
            } else {
                Err(E::custom(format!("invalid quantity {v}")))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            match v.strip_prefix("0x") {
                Some("") => Ok(0),
                Some(digits) => u128::from_str_radix(digits, 16),
                None => v.parse(),
            }
            .map_err(|e| E::custom(format!("invalid quantity {v:?}: {e}")))
        }
    }

    struct Quantity(u128);

    impl<'de> Deserialize<'de> for Quantity {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            d.deserialize_any(QuantityVisitor).map(Quantity)
        }
    }

    pub fn u128<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        Quantity::deserialize(d).map(|q| q.0)
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let q = Quantity::deserialize(d)?.0;
        u64::try_from(q).map_err(|_| de::Error::custom(format!("quantity {q} exceeds u64")))
    }

    pub fn opt_u128<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u128>, D::Error> {
        Ok(Option::<Quantity>::deserialize(d)?.map(|q| q.0))
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        match Option::<Quantity>::deserialize(d)? {
            Some(Quantity(q)) => u64::try_from(q)
                .map(Some)
                .map_err(|_| de::Error::custom(format!("quantity {q} exceeds u64"))),
            None => Ok(None),
        }
    }
}

/// Transaction type byte of OP-stack deposit transactions.
pub const DEPOSIT_TX_TYPE: u64 = 0x7e;

/// Receipt status of a successful transaction.
pub const RECEIPT_STATUS_SUCCESS: u64 = 1;

/// Convert a wei amount to gwei.
#[allow(clippy::cast_precision_loss)]
pub fn gwei(wei: u128) -> f64 {
    wei as f64 / 1e9
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    #[serde(deserialize_with = "quantity::u64")]
    pub number: u64,
    pub hash: B256,
    #[serde(deserialize_with = "quantity::u64")]
    pub timestamp: u64,
    #[serde(default, deserialize_with = "quantity::opt_u128")]
    pub base_fee_per_gas: Option<u128>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(flatten)]
    pub header: Header,
    #[serde(default, deserialize_with = "quantity::u64")]
    pub size: u64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub withdrawals: Vec<Withdrawal>,
}

impl Block {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn hash(&self) -> &B256 {
        &self.header.hash
    }

    pub fn base_fee(&self) -> Option<u128> {
        self.header.base_fee_per_gas
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "type", default, deserialize_with = "quantity::u64")]
    pub tx_type: u64,
    #[serde(default, deserialize_with = "quantity::opt_u64")]
    pub nonce: Option<u64>,
    #[serde(deserialize_with = "quantity::u64")]
    pub gas: u64,
    #[serde(default, deserialize_with = "quantity::opt_u128")]
    pub gas_price: Option<u128>,
    #[serde(default, deserialize_with = "quantity::opt_u128")]
    pub max_fee_per_gas: Option<u128>,
    #[serde(default, deserialize_with = "quantity::opt_u128")]
    pub max_priority_fee_per_gas: Option<u128>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default, deserialize_with = "quantity::opt_u64")]
    pub size: Option<u64>,
}

impl Transaction {
    pub fn is_deposit(&self) -> bool {
        self.tx_type == DEPOSIT_TX_TYPE
    }

    /// Encoded size, or the input length when the source did not provide it
    pub fn size(&self) -> u64 {
        self.size.unwrap_or(self.input.len() as u64)
    }

    /// Tip paid to the block producer per unit of gas, in wei.
    ///
    /// `min(tip cap, fee cap - base fee)`, floored at zero. Deposits pay no
    /// tip.
    pub fn effective_gas_tip(&self, base_fee: Option<u128>) -> u128 {
        if self.is_deposit() {
            return 0;
        }
        let tip_cap = self.max_priority_fee_per_gas.or(self.gas_price).unwrap_or(0);
        let fee_cap = self.max_fee_per_gas.or(self.gas_price).unwrap_or(0);
        match base_fee {
            Some(base) => tip_cap.min(fee_cap.saturating_sub(base)),
            None => tip_cap,
        }
    }

    /// L1 data gas of the calldata: 4 per zero byte, 16 per non-zero byte
    pub fn rollup_data_gas(&self) -> u64 {
        let zeros = self.input.as_slice().iter().filter(|b| **b == 0).count() as u64;
        let ones = self.input.len() as u64 - zeros;
        zeros * 4 + ones * 16
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    #[serde(default, deserialize_with = "quantity::u64")]
    pub index: u64,
    #[serde(default)]
    pub address: Option<Address>,
    /// Amount in gwei
    #[serde(deserialize_with = "quantity::u64")]
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(deserialize_with = "quantity::u64")]
    pub status: u64,
    #[serde(deserialize_with = "quantity::u64")]
    pub gas_used: u64,
    #[serde(default, deserialize_with = "quantity::u128")]
    pub effective_gas_price: u128,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default, deserialize_with = "quantity::opt_u64")]
    pub deposit_nonce: Option<u64>,
    #[serde(default, deserialize_with = "quantity::opt_u128")]
    pub l1_fee: Option<u128>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == RECEIPT_STATUS_SUCCESS
    }

    /// Total fee in wei: gas used times effective gas price
    pub fn fee(&self) -> u128 {
        u128::from(self.gas_used).saturating_mul(self.effective_gas_price)
    }
}

/// A block together with the receipts of its transactions, in order.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockWithReceipts {
    pub block: Block,
    #[serde(default)]
    pub receipts: Vec<Receipt>,
}

impl BlockWithReceipts {
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Block timestamp in seconds
    pub fn time(&self) -> i64 {
        i64::try_from(self.block.header.timestamp).unwrap_or(i64::MAX)
    }

    /// Transactions paired with their receipts.
    ///
    /// Fails if the receipt count does not match the transaction count.
    pub fn transactions_with_receipts(
        &self,
    ) -> crate::core::Result<impl Iterator<Item = (&Transaction, &Receipt)> + '_> {
        let txs = &self.block.transactions;
        if txs.len() != self.receipts.len() {
            return Err(crate::core::MetricsError::extract(format!(
                "block {} has {} transactions but {} receipts",
                self.block.header.number,
                txs.len(),
                self.receipts.len()
            )));
        }
        Ok(txs.iter().zip(&self.receipts))
    }
}
