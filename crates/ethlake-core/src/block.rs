//! Single-block and batch decoding.
//!
//! For one block: build the [`Block`] record, decode every transaction's
//! input, check every receipt, fetch and decode the block's logs. Decode
//! failures degrade to `"UNKNOWN"` markers; only node retry exhaustion and
//! warehouse failures escape as errors.

use alloy_primitives::B256;
use ethlake_abi::{decode_input, decode_log};
use ethlake_rpc::types::{RpcBlock, RpcLog, RpcTransaction};
use ethlake_rpc::EthApi as _;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::interval::Interval;
use crate::services::Services;
use crate::types::{Block, EventLog, Transaction, TxStatus};

/// Decode a block by number, including transactions and logs.
pub async fn decode_by_number(services: &Services, number: u64) -> Result<Block, PipelineError> {
    let raw = services.eth.block_by_number(number).await?;
    decode_block(services, raw).await
}

/// Decode a block by hash.
pub async fn decode_by_hash(services: &Services, hash: &B256) -> Result<Block, PipelineError> {
    let raw = services.eth.block_by_hash(hash).await?;
    decode_block(services, raw).await
}

/// Decode a batch interval, walking `high → low` so each block's parent
/// hash can be checked against its successor incrementally.
pub async fn decode_range(
    services: &Services,
    interval: Interval,
) -> Result<Vec<Block>, PipelineError> {
    let mut blocks = Vec::with_capacity(interval.len() as usize);
    let mut parent_of_previous: Option<B256> = None;
    for number in (interval.low..=interval.high).rev() {
        let block = decode_by_number(services, number).await?;
        if let Some(expected) = parent_of_previous {
            if block.hash != expected {
                warn!(
                    number,
                    hash = %block.hash,
                    expected = %expected,
                    "parent hash mismatch inside batch"
                );
            }
        }
        parent_of_previous = Some(block.parent_hash);
        blocks.push(block);
    }
    Ok(blocks)
}

/// Decode a fully-materialized block from the node.
pub async fn decode_block(services: &Services, raw: RpcBlock) -> Result<Block, PipelineError> {
    debug!(number = raw.number, hash = %raw.hash, txs = raw.transactions.len(), "decoding block");
    let block_time = raw.timestamp as i64;

    let mut block = Block {
        hash: raw.hash,
        number: raw.number,
        parent_hash: raw.parent_hash,
        miner: raw.miner,
        difficulty: raw.difficulty,
        gas_limit: raw.gas_limit,
        gas_used: raw.gas_used,
        block_time,
        status: true,
        transactions: Vec::with_capacity(raw.transactions.len()),
        logs: Vec::new(),
    };

    for raw_tx in raw.transactions {
        // Receipt retrieval retries inside the client; exhaustion is fatal
        // for the batch.
        let status = match services.eth.transaction_receipt(&raw_tx.hash).await? {
            Some(receipt) if receipt.succeeded() => TxStatus::Success,
            Some(_) => TxStatus::Rejected,
            None => TxStatus::Unknown,
        };
        if status == TxStatus::Rejected {
            // rejected transactions are dropped here; the reconciler owns
            // flipping rows that were stored before their receipt settled
            continue;
        }
        let tx = decode_transaction(services, raw_tx, block_time, status).await?;
        block.transactions.push(tx);
    }

    block.logs = decode_block_logs(services, &raw.hash, block_time).await?;
    Ok(block)
}

/// Decode one transaction's input against the standard and contract
/// tables.
async fn decode_transaction(
    services: &Services,
    raw: RpcTransaction,
    block_time: i64,
    status: TxStatus,
) -> Result<Transaction, PipelineError> {
    let mut tx = Transaction {
        hash: raw.hash,
        block_number: raw.block_number,
        txn_index: raw.transaction_index,
        status,
        from: raw.from,
        to: raw.to,
        input: raw.input.to_vec(),
        method: String::new(),
        params: Vec::new(),
        gas_price: raw.gas_price.unwrap_or(0),
        gas: raw.gas,
        value: raw.value,
        nonce: raw.nonce,
        block_time,
    };

    // no selector → plain value transfer, nothing to decode
    if tx.input.len() < 4 {
        return Ok(tx);
    }
    let selector: [u8; 4] = tx.input[..4].try_into().expect("length checked");

    // optimistic standard-ABI path, behind its flag
    if services.config.standard_first {
        if let Some(func) = services.standard.method(&selector) {
            if let Ok(decoded) = decode_input(func, &tx.input) {
                tx.method = decoded.name;
                tx.params = decoded.params;
                return Ok(tx);
            }
        }
    }

    let Some(to) = raw.to else {
        // contract creation carries init code, not a method call
        return Ok(tx);
    };

    match services.contracts.lookup(&to, block_time).await? {
        Some(entry) => match entry.tables.method(&selector) {
            Some(func) => match decode_input(func, &tx.input) {
                Ok(decoded) => {
                    tx.method = decoded.name;
                    tx.params = decoded.params;
                    services.contracts.record_event(&entry, block_time).await;
                }
                Err(e) => {
                    debug!(hash = %tx.hash, error = %e, "input decode failed");
                    tx.method = "UNKNOWN".into();
                    services.contracts.record_error(&entry, block_time).await;
                }
            },
            None => {
                debug!(hash = %tx.hash, selector = %hex::encode(selector), "unknown method");
                tx.method = "UNKNOWN".into();
                services.contracts.record_error(&entry, block_time).await;
            }
        },
        None => tx.method = "UNKNOWN".into(),
    }
    Ok(tx)
}

/// Fetch and decode a block's logs; removed logs are dropped.
async fn decode_block_logs(
    services: &Services,
    block_hash: &B256,
    block_time: i64,
) -> Result<Vec<EventLog>, PipelineError> {
    let raw_logs = services.eth.logs_by_block_hash(block_hash).await?;
    let mut logs = Vec::with_capacity(raw_logs.len());
    for raw in raw_logs {
        if raw.removed {
            debug!(block = raw.block_number, index = raw.log_index, "skipping removed log");
            continue;
        }
        logs.push(decode_event_log(services, raw, block_time).await?);
    }
    Ok(logs)
}

/// Decode one log against the standard and contract event tables.
async fn decode_event_log(
    services: &Services,
    raw: RpcLog,
    block_time: i64,
) -> Result<EventLog, PipelineError> {
    let mut log = EventLog {
        block_number: raw.block_number,
        log_index: raw.log_index,
        removed: raw.removed,
        txn_index: raw.transaction_index,
        txn_hash: raw.transaction_hash,
        address: raw.address,
        data: raw.data.to_vec(),
        event: String::new(),
        params: Vec::new(),
        block_time,
    };

    // anonymous log: emitted with no event name and no parameters
    let Some(topic0) = raw.topics.first().copied() else {
        return Ok(log);
    };

    // Standard signatures first; a parse failure falls through to the
    // contract-specific table, so proxies reusing a standard topic with a
    // different layout still resolve.
    if services.config.standard_first {
        if let Some(event) = services.standard.event(&topic0) {
            if let Ok(decoded) = decode_log(event, &raw.topics, &log.data) {
                log.event = decoded.name;
                log.params = decoded.params;
                return Ok(log);
            }
        }
    }

    match services.contracts.lookup(&raw.address, block_time).await? {
        Some(entry) => match entry.tables.event(&topic0) {
            Some(event) => match decode_log(event, &raw.topics, &log.data) {
                Ok(decoded) => {
                    log.event = decoded.name;
                    log.params = decoded.params;
                    services.contracts.record_event(&entry, block_time).await;
                }
                Err(e) => {
                    debug!(tx = %log.txn_hash, index = log.log_index, error = %e, "log decode failed");
                    log.event = "UNKNOWN".into();
                    services.contracts.record_error(&entry, block_time).await;
                }
            },
            None => {
                log.event = "UNKNOWN".into();
                services.contracts.record_error(&entry, block_time).await;
            }
        },
        None => log.event = "UNKNOWN".into(),
    }
    Ok(log)
}

