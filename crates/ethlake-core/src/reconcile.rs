//! Retroactive transaction-receipt reconciliation.
//!
//! Rows stored with status success-or-unknown are re-checked against
//! `eth_getTransactionReceipt` over a closed time range. The range splits
//! into fixed-width windows processed concurrently; rejections accumulate
//! and are flipped to `status = -1` in bulk. A separate progress record
//! (`SetStatus`) advances after each committed window.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::B256;
use ethlake_rpc::EthApi as _;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::services::Services;
use crate::types::{ProcessKind, Progress};
use crate::warehouse::TxStatusRow;

/// Page size of the candidate cursor.
const SCAN_PAGE: u64 = 5_000;

/// One reconciliation window, `[start, end)` in unix seconds.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    end: i64,
}

/// Shared progress accumulator across window workers.
#[derive(Debug, Default)]
struct ReconcileState {
    low_block: u64,
    hi_block: u64,
    low_time: i64,
    hi_time: i64,
    rejected: u64,
    scanned: u64,
}

impl ReconcileState {
    fn widen(&mut self, row_low: u64, row_hi: u64, time_low: i64, time_hi: i64) {
        if self.hi_block == 0 {
            (self.low_block, self.hi_block) = (row_low, row_hi);
            (self.low_time, self.hi_time) = (time_low, time_hi);
            return;
        }
        if row_low < self.low_block {
            self.low_block = row_low;
            self.low_time = time_low;
        }
        if row_hi > self.hi_block {
            self.hi_block = row_hi;
            self.hi_time = time_hi;
        }
    }
}

/// Reconcile receipts over `[start_time, end_time)`.
///
/// Splits the range into `status_int_hours` windows and processes them
/// with `threads` concurrent workers.
pub async fn run_reconciler(
    services: Arc<Services>,
    start_time: i64,
    end_time: i64,
) -> Result<(), PipelineError> {
    if end_time <= start_time {
        info!(start_time, end_time, "nothing to reconcile");
        return Ok(());
    }

    let step = services.config.status_int_hours.max(1) * 3600;
    let mut windows = VecDeque::new();
    let mut cursor = start_time;
    while cursor < end_time {
        windows.push_back(Window {
            start: cursor,
            end: (cursor + step).min(end_time),
        });
        cursor += step;
    }
    info!(
        windows = windows.len(),
        hours = services.config.status_int_hours,
        "reconciler starting"
    );

    let queue = Arc::new(Mutex::new(windows));
    let state = Arc::new(Mutex::new(ReconcileState::default()));

    let mut tasks: JoinSet<Result<(), PipelineError>> = JoinSet::new();
    for _ in 0..services.config.threads.max(1) {
        let services = services.clone();
        let queue = queue.clone();
        let state = state.clone();
        tasks.spawn(async move {
            loop {
                let window = {
                    let mut queue = queue.lock().await;
                    match queue.pop_front() {
                        Some(w) => w,
                        None => return Ok(()),
                    }
                };
                reconcile_window(&services, window, &state).await?;
            }
        });
    }

    let mut first_error: Option<PipelineError> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Join(e.to_string())),
        };
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    let state = state.lock().await;
    info!(
        scanned = state.scanned,
        rejected = state.rejected,
        "reconciliation complete"
    );
    Ok(())
}

/// Scan one window's candidates, flip failures, advance progress.
async fn reconcile_window(
    services: &Services,
    window: Window,
    state: &Arc<Mutex<ReconcileState>>,
) -> Result<(), PipelineError> {
    let mut rejected_to: Vec<String> = Vec::new();
    let mut rejected_hash: Vec<String> = Vec::new();
    let mut scanned = 0u64;
    let mut rejected = 0u64;
    let mut block_span: Option<(u64, u64)> = None;
    let mut offset = 0u64;

    loop {
        let page = services
            .warehouse
            .query_transactions(window.start, window.end, offset, SCAN_PAGE)
            .await?;
        let page_len = page.len() as u64;

        for row in page {
            scanned += 1;
            block_span = Some(match block_span {
                Some((low, hi)) => (low.min(row.block_number), hi.max(row.block_number)),
                None => (row.block_number, row.block_number),
            });
            if !is_candidate(&row) {
                continue;
            }

            let Ok(hash) = B256::from_str(&format!("0x{}", row.hash)) else {
                warn!(hash = %row.hash, "stored transaction hash does not parse");
                continue;
            };
            // retried inside the client; exhaustion is fatal
            let receipt = services.eth.transaction_receipt(&hash).await?;
            if matches!(receipt, Some(r) if !r.succeeded()) {
                rejected += 1;
                rejected_to.push(row.to.clone());
                rejected_hash.push(row.hash.clone());
                if rejected_hash.len() >= services.config.status_batch_size {
                    flush_rejected(services, &mut rejected_to, &mut rejected_hash).await?;
                }
            }
        }

        if page_len < SCAN_PAGE {
            break;
        }
        offset += page_len;
    }

    flush_rejected(services, &mut rejected_to, &mut rejected_hash).await?;

    // Window committed: widen the SetStatus progress record.
    let mut state = state.lock().await;
    state.scanned += scanned;
    state.rejected += rejected;
    if let Some((low, hi)) = block_span {
        state.widen(low, hi, window.start, window.end);
        let progress = Progress {
            kind: ProcessKind::SetStatus,
            hi_block: state.hi_block,
            low_block: state.low_block,
            hi_block_time: state.hi_time,
            low_block_time: state.low_time,
        };
        services.warehouse.upsert_progress(&progress).await?;
    }
    info!(
        start = window.start,
        end = window.end,
        scanned,
        rejected,
        "reconciler window complete"
    );
    Ok(())
}

/// Candidates: stored as success or unknown, with a real `to` address.
fn is_candidate(row: &TxStatusRow) -> bool {
    row.status >= 0 && !row.to.is_empty()
}

async fn flush_rejected(
    services: &Services,
    to_addrs: &mut Vec<String>,
    hashes: &mut Vec<String>,
) -> Result<(), PipelineError> {
    if hashes.is_empty() {
        return Ok(());
    }
    services
        .warehouse
        .mark_transactions_rejected(to_addrs, hashes)
        .await?;
    info!(count = hashes.len(), "marked transactions rejected");
    to_addrs.clear();
    hashes.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: i8, to: &str) -> TxStatusRow {
        TxStatusRow {
            to: to.into(),
            block_time: 0,
            hash: "ab".repeat(32),
            block_number: 1,
            status,
        }
    }

    #[test]
    fn candidates_are_success_or_unknown_with_recipient() {
        assert!(is_candidate(&row(1, "6b175474e89094c44da98b954eedeac495271d0f")));
        assert!(is_candidate(&row(0, "6b175474e89094c44da98b954eedeac495271d0f")));
        assert!(!is_candidate(&row(-1, "6b175474e89094c44da98b954eedeac495271d0f")));
        assert!(!is_candidate(&row(1, "")));
    }

    #[test]
    fn state_widens_monotonically() {
        let mut state = ReconcileState::default();
        state.widen(100, 200, 10, 20);
        state.widen(150, 180, 15, 18); // inside, no change
        assert_eq!((state.low_block, state.hi_block), (100, 200));
        state.widen(50, 250, 5, 25);
        assert_eq!((state.low_block, state.hi_block), (50, 250));
        assert_eq!((state.low_time, state.hi_time), (5, 25));
    }
}
