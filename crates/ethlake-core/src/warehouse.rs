//! The warehouse gateway contract.
//!
//! The pipeline issues logical operations; a dialect (ClickHouse direct,
//! or Redshift with S3 staging) decides how they execute. Inserts land in
//! the gateway's open session transaction and become visible at
//! [`Warehouse::commit`]; queries bypass the transaction.
//!
//! A gateway holds ONE session transaction. Callers must not interleave
//! `begin..commit` sections from concurrent tasks: the worker pool takes
//! its transaction mutex across the whole write section, so staged rows
//! never mix across batches and a rollback only ever discards the batch
//! that failed.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Block, Contract, EventLog, ProcessKind, Progress, Transaction};

/// Direction selector for [`Warehouse::query_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockQuery {
    /// Smallest stored block number strictly above the reference.
    MinAbove,
    /// Largest stored block number strictly below the reference.
    MaxBelow,
    /// Largest stored block number overall.
    AbsoluteMax,
    /// Smallest stored block number overall.
    AbsoluteMin,
}

/// One row of the reconciler's candidate scan.
#[derive(Debug, Clone)]
pub struct TxStatusRow {
    /// Fixed-width lowercase hex, no prefix (storage form).
    pub to: String,
    pub block_time: i64,
    /// Fixed-width lowercase hex, no prefix (storage form).
    pub hash: String,
    pub block_number: u64,
    pub status: i8,
}

/// Logical storage operations the pipeline depends on.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Open the session transaction if none is open. At most one write
    /// section may be open at a time; see the module note on serialization.
    async fn begin(&self) -> Result<(), StoreError>;

    /// Commit the open transaction. Implementations retry connection loss
    /// with backoff (up to ten attempts, spaced 20·k seconds); the caller's
    /// transaction mutex keeps those retries single-threaded.
    async fn commit(&self) -> Result<(), StoreError>;

    /// Discard the open transaction and any staged rows.
    async fn rollback(&self) -> Result<(), StoreError>;

    async fn insert_blocks(&self, blocks: &[Block]) -> Result<(), StoreError>;
    async fn insert_transactions(&self, txs: &[Transaction]) -> Result<(), StoreError>;
    async fn insert_logs(&self, logs: &[EventLog]) -> Result<(), StoreError>;

    /// Bulk-load newly discovered contracts. Runs in its own transaction,
    /// independent of the session transaction.
    async fn insert_contracts(&self, contracts: &[Contract]) -> Result<(), StoreError>;

    /// Single-row update of a contract's event/error dates.
    async fn update_contract_dates(&self, contract: &Contract) -> Result<(), StoreError>;

    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StoreError>;
    async fn query_progress(&self, kind: ProcessKind) -> Result<Option<Progress>, StoreError>;

    /// Navigate stored block numbers relative to a reference.
    async fn query_block(
        &self,
        reference: u64,
        direction: BlockQuery,
    ) -> Result<Option<u64>, StoreError>;

    /// Block numbers stored outside `[low, high]`; used at startup to
    /// recover intervals the progress row does not cover.
    async fn query_block_numbers_outside(
        &self,
        low: u64,
        high: u64,
    ) -> Result<Vec<u64>, StoreError>;

    /// Fetch one contract row by its storage-form address.
    async fn query_contract(&self, address: &str) -> Result<Option<Contract>, StoreError>;

    /// Contracts whose `last_event_date` falls within the last `days` days.
    async fn query_contracts_since(&self, days: u32) -> Result<Vec<Contract>, StoreError>;

    /// One page of the reconciler's candidate cursor, ordered by
    /// `(block_time, hash)`: transactions with `block_time` in
    /// `[start, end)`.
    async fn query_transactions(
        &self,
        start: i64,
        end: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TxStatusRow>, StoreError>;

    /// Re-emit the matched transaction rows with `status = -1` in a single
    /// statement. `to_addrs[i]` pairs with `hashes[i]`.
    async fn mark_transactions_rejected(
        &self,
        to_addrs: &[String],
        hashes: &[String],
    ) -> Result<(), StoreError>;
}

// ─── In-memory warehouse (for tests and dry runs) ─────────────────────────────

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::TxStatus;

#[derive(Default)]
struct MemoryState {
    staged: Option<(Vec<Block>, Vec<Transaction>, Vec<EventLog>)>,
    blocks: Vec<Block>,
    transactions: Vec<Transaction>,
    logs: Vec<EventLog>,
    contracts: HashMap<String, Contract>,
    progress: HashMap<i16, Progress>,
}

/// In-memory warehouse for unit tests and dry runs.
#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<MemoryState>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a progress row (test setup).
    pub fn seed_progress(&self, progress: Progress) {
        let mut state = self.state.lock().unwrap();
        state.progress.insert(progress.kind.as_i16(), progress);
    }

    /// Pre-seed committed blocks by number (test setup).
    pub fn seed_block_numbers(&self, numbers: &[u64]) {
        let mut state = self.state.lock().unwrap();
        for &number in numbers {
            state.blocks.push(Block {
                hash: Default::default(),
                number,
                parent_hash: Default::default(),
                miner: Default::default(),
                difficulty: Default::default(),
                gas_limit: 0,
                gas_used: 0,
                block_time: 0,
                status: true,
                transactions: vec![],
                logs: vec![],
            });
        }
    }

    pub fn committed_block_count(&self) -> usize {
        self.state.lock().unwrap().blocks.len()
    }

    pub fn committed_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().transactions.clone()
    }

    pub fn committed_logs(&self) -> Vec<EventLog> {
        self.state.lock().unwrap().logs.clone()
    }

    pub fn contract_count(&self) -> usize {
        self.state.lock().unwrap().contracts.len()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn begin(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.staged.is_none() {
            state.staged = Some(Default::default());
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some((blocks, txs, logs)) = state.staged.take() {
            state.blocks.extend(blocks);
            state.transactions.extend(txs);
            state.logs.extend(logs);
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        self.state.lock().unwrap().staged = None;
        Ok(())
    }

    async fn insert_blocks(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let staged = state.staged.get_or_insert_with(Default::default);
        staged.0.extend_from_slice(blocks);
        Ok(())
    }

    async fn insert_transactions(&self, txs: &[Transaction]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let staged = state.staged.get_or_insert_with(Default::default);
        staged.1.extend_from_slice(txs);
        Ok(())
    }

    async fn insert_logs(&self, logs: &[EventLog]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let staged = state.staged.get_or_insert_with(Default::default);
        staged.2.extend_from_slice(logs);
        Ok(())
    }

    async fn insert_contracts(&self, contracts: &[Contract]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for contract in contracts {
            state
                .contracts
                .insert(contract.address.clone(), contract.clone());
        }
        Ok(())
    }

    async fn update_contract_dates(&self, contract: &Contract) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(stored) = state.contracts.get_mut(&contract.address) {
            stored.last_event_date = contract.last_event_date;
            stored.last_error_date = contract.last_error_date;
        }
        Ok(())
    }

    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.progress.insert(progress.kind.as_i16(), *progress);
        Ok(())
    }

    async fn query_progress(&self, kind: ProcessKind) -> Result<Option<Progress>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.progress.get(&kind.as_i16()).copied())
    }

    async fn query_block(
        &self,
        reference: u64,
        direction: BlockQuery,
    ) -> Result<Option<u64>, StoreError> {
        let state = self.state.lock().unwrap();
        let numbers = state.blocks.iter().map(|b| b.number);
        Ok(match direction {
            BlockQuery::MinAbove => numbers.filter(|&n| n > reference).min(),
            BlockQuery::MaxBelow => numbers.filter(|&n| n < reference).max(),
            BlockQuery::AbsoluteMax => numbers.max(),
            BlockQuery::AbsoluteMin => numbers.min(),
        })
    }

    async fn query_block_numbers_outside(
        &self,
        low: u64,
        high: u64,
    ) -> Result<Vec<u64>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .blocks
            .iter()
            .map(|b| b.number)
            .filter(|&n| high == 0 || n > high || n < low)
            .collect())
    }

    async fn query_contract(&self, address: &str) -> Result<Option<Contract>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.contracts.get(address).cloned())
    }

    async fn query_contracts_since(&self, days: u32) -> Result<Vec<Contract>, StoreError> {
        let horizon =
            chrono::Utc::now().timestamp() - i64::from(days) * 24 * 3600;
        let state = self.state.lock().unwrap();
        Ok(state
            .contracts
            .values()
            .filter(|c| c.last_event_date > horizon)
            .cloned()
            .collect())
    }

    async fn query_transactions(
        &self,
        start: i64,
        end: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TxStatusRow>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<TxStatusRow> = state
            .transactions
            .iter()
            .filter(|tx| tx.block_time >= start && tx.block_time < end)
            .map(|tx| TxStatusRow {
                to: tx.to.map(|a| format!("{a:x}")).unwrap_or_default(),
                block_time: tx.block_time,
                hash: format!("{:x}", tx.hash),
                block_number: tx.block_number,
                status: tx.status.as_i8(),
            })
            .collect();
        rows.sort_by(|a, b| (a.block_time, &a.hash).cmp(&(b.block_time, &b.hash)));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn mark_transactions_rejected(
        &self,
        _to_addrs: &[String],
        hashes: &[String],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for tx in state.transactions.iter_mut() {
            if hashes.iter().any(|h| *h == format!("{:x}", tx.hash)) {
                tx.status = TxStatus::Rejected;
            }
        }
        Ok(())
    }
}
