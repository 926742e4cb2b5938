//! Typed views of the JSON-RPC wire format.
//!
//! Quantities arrive as `0x`-prefixed hex strings (`"0x12a05f200"`); the
//! `quantity` serde helpers below parse them into integers. Hashes,
//! addresses and byte payloads deserialize through `alloy_primitives`.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Deserialize;

/// A block with its transactions, as returned by `eth_getBlockByNumber`
/// with `include_transactions = true`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub hash: B256,
    #[serde(with = "quantity")]
    pub number: u64,
    pub parent_hash: B256,
    pub miner: Address,
    pub difficulty: U256,
    #[serde(with = "quantity")]
    pub gas_limit: u64,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(with = "quantity")]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    #[serde(with = "quantity", default)]
    pub block_number: u64,
    #[serde(with = "quantity", default)]
    pub transaction_index: u64,
    pub from: Address,
    /// Absent for contract-creation transactions.
    pub to: Option<Address>,
    pub input: Bytes,
    /// Legacy gas price; type-2 transactions report the effective price or
    /// omit the field entirely.
    #[serde(with = "quantity_opt", default)]
    pub gas_price: Option<u64>,
    #[serde(with = "quantity")]
    pub gas: u64,
    pub value: U256,
    #[serde(with = "quantity")]
    pub nonce: u64,
}

/// A log entry from `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    pub transaction_hash: B256,
    #[serde(with = "quantity")]
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

/// The slice of `eth_getTransactionReceipt` the pipeline consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    /// `0x1` success, `0x0` failure; pre-Byzantium receipts omit it.
    #[serde(with = "quantity_opt", default)]
    pub status: Option<u64>,
}

impl RpcReceipt {
    /// Success flag; receipts without a status field count as successful.
    pub fn succeeded(&self) -> bool {
        self.status.unwrap_or(1) == 1
    }
}

pub(crate) mod quantity {
    use serde::{Deserialize, Deserializer};

    pub fn parse_hex_u64(s: &str) -> Option<u64> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(digits, 16).ok()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) => parse_hex_u64(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid hex quantity: {s}"))),
            None => Ok(0),
        }
    }
}

pub(crate) mod quantity_opt {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) => super::quantity::parse_hex_u64(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid hex quantity: {s}"))),
            None => Ok(None),
        }
    }
}
