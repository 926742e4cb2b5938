//! Domain records for decoded chain data.
//!
//! These are the rows the pipeline produces and the warehouse persists.
//! Hashes and addresses stay in their `alloy_primitives` form until the
//! storage boundary, where each dialect applies its own fixed-width hex
//! encoding.

use alloy_primitives::{Address, B256, U256};
use chrono::{TimeZone, Utc};
use ethlake_abi::NamedValue;
use serde::{Deserialize, Serialize};

/// A decoded block and everything it owns during processing.
///
/// The decoding worker exclusively owns this record; transactions and logs
/// are released when the enclosing batch commits.
#[derive(Debug, Clone)]
pub struct Block {
    pub hash: B256,
    pub number: u64,
    pub parent_hash: B256,
    pub miner: Address,
    /// Arbitrary precision on the wire; projected to f64 at storage.
    pub difficulty: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Seconds since epoch, UTC.
    pub block_time: i64,
    /// `true` when the block sits on the confirmed canonical chain.
    pub status: bool,
    pub transactions: Vec<Transaction>,
    pub logs: Vec<EventLog>,
}

/// Transaction persistence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Rejected,
    /// Receipt not yet observed; the reconciler resolves these later.
    Unknown,
}

impl TxStatus {
    pub fn as_i8(self) -> i8 {
        match self {
            TxStatus::Success => 1,
            TxStatus::Rejected => -1,
            TxStatus::Unknown => 0,
        }
    }

    pub fn from_i8(v: i8) -> Self {
        match v {
            1 => TxStatus::Success,
            -1 => TxStatus::Rejected,
            _ => TxStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub hash: B256,
    pub block_number: u64,
    pub txn_index: u64,
    pub status: TxStatus,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub input: Vec<u8>,
    /// Decoded method name; `""` for plain transfers (input under four
    /// bytes), `"UNKNOWN"` when the ABI was missing or decoding failed.
    pub method: String,
    pub params: Vec<NamedValue>,
    pub gas_price: u64,
    pub gas: u64,
    /// Arbitrary precision on the wire; projected to f64 at storage.
    pub value: U256,
    pub nonce: u64,
    pub block_time: i64,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    pub block_number: u64,
    pub log_index: u64,
    pub removed: bool,
    pub txn_index: u64,
    pub txn_hash: B256,
    pub address: Address,
    pub data: Vec<u8>,
    /// Decoded event name; `""` for logs without topics, `"UNKNOWN"` when
    /// the ABI was missing or decoding failed.
    pub event: String,
    pub params: Vec<NamedValue>,
    pub block_time: i64,
}

/// A contract row as persisted in the warehouse.
///
/// The parsed method/event tables are rebuilt from `abi` on load and never
/// persisted directly.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    /// Lowercased `0x`-prefixed hex.
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: f64,
    /// UTC midnight (unix seconds) of the most recent successful decode.
    pub last_event_date: i64,
    /// UTC midnight (unix seconds) of the most recent decode failure.
    pub last_error_date: i64,
    /// ABI JSON from Etherscan; empty when fetched but unparseable.
    pub abi: String,
}

/// The two tracked pipeline processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessKind {
    /// The block decode-and-persist pass.
    AddTransaction,
    /// The receipt reconciliation pass.
    SetStatus,
}

impl ProcessKind {
    pub fn as_i16(self) -> i16 {
        match self {
            ProcessKind::AddTransaction => 1,
            ProcessKind::SetStatus => 2,
        }
    }
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessKind::AddTransaction => write!(f, "transaction"),
            ProcessKind::SetStatus => write!(f, "status"),
        }
    }
}

/// The contiguous completed `[low, hi]` block range for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub kind: ProcessKind,
    pub hi_block: u64,
    pub low_block: u64,
    pub hi_block_time: i64,
    pub low_block_time: i64,
}

/// Project an arbitrary-precision integer to f64.
///
/// Values above 2^53 lose precision; the warehouse schema accepts that.
pub fn u256_to_f64(v: U256) -> f64 {
    v.to_string().parse().unwrap_or(f64::MAX)
}

/// Round unix seconds down to the containing UTC day's midnight.
///
/// Zero or negative input rounds the current system time instead.
pub fn round_to_utc_day(secs: i64) -> i64 {
    let t = if secs > 0 {
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    };
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc().timestamp())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_i8() {
        for s in [TxStatus::Success, TxStatus::Rejected, TxStatus::Unknown] {
            assert_eq!(TxStatus::from_i8(s.as_i8()), s);
        }
    }

    #[test]
    fn round_to_utc_day_truncates_time_of_day() {
        // 2021-11-24 13:47:16 UTC → 2021-11-24 00:00:00 UTC
        assert_eq!(round_to_utc_day(1_637_761_636), 1_637_712_000);
        // midnight is a fixed point
        assert_eq!(round_to_utc_day(1_637_712_000), 1_637_712_000);
    }

    #[test]
    fn u256_projection() {
        assert_eq!(u256_to_f64(U256::from(1_000_000u64)), 1_000_000.0);
        // 1e21 wei is beyond 2^53, projected approximately
        let wei = U256::from(10u64).pow(U256::from(21u64));
        let f = u256_to_f64(wei);
        assert!((f - 1e21).abs() / 1e21 < 1e-9);
    }

    #[test]
    fn process_kind_display() {
        assert_eq!(ProcessKind::AddTransaction.to_string(), "transaction");
        assert_eq!(ProcessKind::SetStatus.to_string(), "status");
    }
}
