//! The contract-ABI cache.
//!
//! Guarantees at-most-one Etherscan fetch per contract address via a
//! three-tier lookup — memory, warehouse, Etherscan — performed under a
//! single process-wide mutex. Holding the lock across the remote fetch is
//! deliberate: it serializes all contract fetches, which both enforces the
//! at-most-one invariant and doubles as a crude global rate limit on top
//! of the Etherscan client's own pacing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use ethlake_abi::AbiTables;
use ethlake_rpc::{EthApi, EtherscanClient, RetrySchedule, RpcError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::types::{round_to_utc_day, Contract};
use crate::warehouse::Warehouse;

/// New contracts accumulate in a side buffer and flush to the warehouse in
/// batches of this size.
const FLUSH_BATCH: usize = 200;

/// ERC-20 property probe selectors.
const SEL_NAME: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];
const SEL_SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
const SEL_DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
const SEL_TOTAL_SUPPLY: [u8; 4] = [0x18, 0x16, 0x0d, 0xdd];

/// A cached contract with its rebuilt lookup tables.
///
/// Entries are shared across workers; the decode-day stamps are atomics so
/// readers never re-enter the cache mutex to touch them.
pub struct ContractEntry {
    /// Lowercased `0x`-prefixed hex.
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: f64,
    /// ABI JSON; empty means fetched-but-unparseable (never re-fetched).
    pub abi: String,
    pub tables: AbiTables,
    last_event_day: AtomicI64,
    last_error_day: AtomicI64,
}

impl ContractEntry {
    fn from_row(row: Contract) -> Self {
        let tables = if row.abi.is_empty() {
            AbiTables::default()
        } else {
            match AbiTables::parse(&row.abi) {
                Ok(tables) => tables,
                Err(e) => {
                    warn!(address = %row.address, error = %e, "stored ABI no longer parses");
                    AbiTables::default()
                }
            }
        };
        Self {
            address: row.address,
            name: row.name,
            symbol: row.symbol,
            decimals: row.decimals,
            total_supply: row.total_supply,
            abi: row.abi,
            tables,
            last_event_day: AtomicI64::new(row.last_event_date),
            last_error_day: AtomicI64::new(row.last_error_date),
        }
    }

    pub fn to_row(&self) -> Contract {
        Contract {
            address: self.address.clone(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            total_supply: self.total_supply,
            last_event_date: self.last_event_day.load(Ordering::Relaxed),
            last_error_date: self.last_error_day.load(Ordering::Relaxed),
            abi: self.abi.clone(),
        }
    }

    /// Advance a day stamp to `day` if newer; returns whether it moved.
    fn advance(slot: &AtomicI64, day: i64) -> bool {
        slot.fetch_max(day, Ordering::Relaxed) < day
    }
}

struct CacheInner {
    entries: HashMap<String, Arc<ContractEntry>>,
    /// Fetched this run, not yet flushed to the warehouse.
    created: Vec<Arc<ContractEntry>>,
}

/// Process-wide contract cache.
pub struct ContractCache {
    eth: Arc<dyn EthApi>,
    etherscan: Arc<EtherscanClient>,
    warehouse: Arc<dyn Warehouse>,
    fetch_retry: RetrySchedule,
    inner: Mutex<CacheInner>,
}

impl ContractCache {
    pub fn new(
        eth: Arc<dyn EthApi>,
        etherscan: Arc<EtherscanClient>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        Self {
            eth,
            etherscan,
            warehouse,
            fetch_retry: RetrySchedule::scaled(10, Duration::from_secs(10)),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                created: Vec::new(),
            }),
        }
    }

    /// Pre-populate with every contract active in the last `days` days,
    /// bounding the startup miss storm.
    pub async fn preload(&self, days: u32) -> Result<usize, PipelineError> {
        let rows = self.warehouse.query_contracts_since(days).await?;
        let mut inner = self.inner.lock().await;
        let mut loaded = 0usize;
        for row in rows {
            let entry = Arc::new(ContractEntry::from_row(row));
            inner.entries.insert(entry.address.clone(), entry);
            loaded += 1;
        }
        info!(contracts = loaded, days, "contract cache warmed up");
        Ok(loaded)
    }

    /// Three-tier lookup. `Ok(None)` means no ABI could be obtained right
    /// now; the caller records an UNKNOWN decode and moves on. `Err` is
    /// reserved for warehouse failures, which are fatal.
    pub async fn lookup(
        &self,
        address: &Address,
        block_time: i64,
    ) -> Result<Option<Arc<ContractEntry>>, PipelineError> {
        let key = format!("{address:#x}");
        let mut inner = self.inner.lock().await;

        // tier 1: memory. The event-day stamp moves in record_event, not
        // here; advancing it on lookup would swallow the warehouse mirror.
        if let Some(entry) = inner.entries.get(&key) {
            return Ok(Some(entry.clone()));
        }

        // tier 2: warehouse
        if let Some(row) = self.warehouse.query_contract(&key).await? {
            let entry = Arc::new(ContractEntry::from_row(row));
            inner.entries.insert(key, entry.clone());
            return Ok(Some(entry));
        }

        // tier 3: Etherscan
        let abi = match self.fetch_abi(&key).await {
            Ok(abi) => abi,
            Err(RpcError::AbiUnavailable { .. }) => {
                // Definitive negative answer: remember it with the empty-ABI
                // sentinel so the address is never fetched again.
                debug!(address = %key, "contract has no verified ABI");
                String::new()
            }
            Err(e) => {
                // Transient exhaustion: no placeholder, a later lookup
                // retries after the rate-limit cooldown.
                warn!(address = %key, error = %e, "Etherscan fetch exhausted");
                return Ok(None);
            }
        };

        let tables = if abi.is_empty() {
            AbiTables::default()
        } else {
            match AbiTables::parse(&abi) {
                Ok(tables) => tables,
                Err(e) => {
                    warn!(address = %key, error = %e, "fetched ABI does not parse");
                    AbiTables::default()
                }
            }
        };
        // unparseable ABI keeps the empty-string sentinel in storage
        let abi = if tables.is_empty() { String::new() } else { abi };

        let mut entry = ContractEntry {
            address: key.clone(),
            name: String::new(),
            symbol: String::new(),
            decimals: 0,
            total_supply: 0.0,
            abi,
            tables,
            last_event_day: AtomicI64::new(round_to_utc_day(block_time)),
            last_error_day: AtomicI64::new(0),
        };
        self.probe_token_properties(address, &mut entry).await;

        let entry = Arc::new(entry);
        inner.entries.insert(key, entry.clone());
        inner.created.push(entry.clone());
        if inner.created.len() >= FLUSH_BATCH {
            Self::flush_created(&self.warehouse, &mut inner).await?;
        }
        Ok(Some(entry))
    }

    /// Best-effort ERC-20 property reads; individual failures leave the
    /// field at its default.
    async fn probe_token_properties(&self, address: &Address, entry: &mut ContractEntry) {
        if let Some(name) = self.call_string(address, SEL_NAME).await {
            entry.name = name;
        }
        if let Some(symbol) = self.call_string(address, SEL_SYMBOL).await {
            entry.symbol = symbol;
        }
        if let Some(decimals) = self.call_uint(address, SEL_DECIMALS).await {
            entry.decimals = decimals.try_into().unwrap_or(0);
        }
        if let Some(supply) = self.call_uint(address, SEL_TOTAL_SUPPLY).await {
            entry.total_supply = crate::types::u256_to_f64(supply);
        }
    }

    async fn call_string(&self, address: &Address, selector: [u8; 4]) -> Option<String> {
        let out = self.eth.call(address, &selector).await.ok()?;
        decode_return_string(&out)
    }

    async fn call_uint(&self, address: &Address, selector: [u8; 4]) -> Option<U256> {
        let out = self.eth.call(address, &selector).await.ok()?;
        if out.len() < 32 {
            return None;
        }
        Some(U256::from_be_slice(&out[..32]))
    }

    /// Etherscan with the pipeline's 10-attempt, 10·k-second schedule.
    async fn fetch_abi(&self, address: &str) -> Result<String, RpcError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.etherscan.fetch_abi(address).await {
                Ok(abi) => return Ok(abi),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };
            match self.fetch_retry.delay_after(attempt) {
                Some(delay) => {
                    warn!(
                        address,
                        attempt,
                        delay_s = delay.as_secs(),
                        error = %err,
                        "Etherscan fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(RpcError::RetriesExhausted {
                        method: "getabi".into(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    })
                }
            }
        }
    }

    async fn flush_created(
        warehouse: &Arc<dyn Warehouse>,
        inner: &mut CacheInner,
    ) -> Result<(), PipelineError> {
        if inner.created.is_empty() {
            return Ok(());
        }
        let rows: Vec<Contract> = inner.created.iter().map(|e| e.to_row()).collect();
        // A failed flush is fatal: losing fetched ABIs would silently break
        // the at-most-one-fetch invariant on restart.
        warehouse.insert_contracts(&rows).await?;
        info!(contracts = rows.len(), "flushed new contracts");
        inner.created.clear();
        Ok(())
    }

    /// Flush any buffered contracts; called at shutdown.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().await;
        Self::flush_created(&self.warehouse, &mut inner).await
    }

    /// Stamp a successful decode with the block's UTC day and mirror the
    /// change to the warehouse. Mirror failures are logged, not fatal.
    pub async fn record_event(&self, entry: &Arc<ContractEntry>, block_time: i64) {
        if ContractEntry::advance(&entry.last_event_day, round_to_utc_day(block_time)) {
            self.mirror_dates(entry).await;
        }
    }

    /// Stamp a decode failure, symmetrically to [`Self::record_event`].
    pub async fn record_error(&self, entry: &Arc<ContractEntry>, block_time: i64) {
        if ContractEntry::advance(&entry.last_error_day, round_to_utc_day(block_time)) {
            self.mirror_dates(entry).await;
        }
    }

    async fn mirror_dates(&self, entry: &Arc<ContractEntry>) {
        if let Err(e) = self.warehouse.update_contract_dates(&entry.to_row()).await {
            warn!(address = %entry.address, error = %e, "contract date update failed");
        }
    }

    /// Number of in-memory entries, for status reporting.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

/// Decode a single ABI-encoded `string` return value.
fn decode_return_string(data: &[u8]) -> Option<String> {
    // offset word, length word, then the bytes
    if data.len() < 64 {
        return None;
    }
    let offset = usize::try_from(U256::from_be_slice(&data[..32])).ok()?;
    let len_end = offset.checked_add(32)?;
    if data.len() < len_end {
        return None;
    }
    let len = usize::try_from(U256::from_be_slice(&data[offset..len_end])).ok()?;
    let end = len_end.checked_add(len)?;
    if data.len() < end {
        return None;
    }
    String::from_utf8(data[len_end..end].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_return_string_roundtrip() {
        // ABI encoding of the string "Dai Stablecoin"
        let mut data = vec![0u8; 64];
        data[31] = 0x20; // offset = 32
        let s = b"Dai Stablecoin";
        data[63] = s.len() as u8;
        data.extend_from_slice(s);
        data.resize(96, 0);
        assert_eq!(decode_return_string(&data).as_deref(), Some("Dai Stablecoin"));
    }

    #[test]
    fn decode_return_string_rejects_short_data() {
        assert!(decode_return_string(&[]).is_none());
        assert!(decode_return_string(&[0u8; 32]).is_none());
    }

    #[test]
    fn day_stamp_only_advances() {
        let slot = AtomicI64::new(100);
        assert!(ContractEntry::advance(&slot, 200));
        assert!(!ContractEntry::advance(&slot, 150));
        assert_eq!(slot.load(Ordering::Relaxed), 200);
    }
}
