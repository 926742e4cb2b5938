//! Batch scheduling and the worker pool.
//!
//! The scheduler partitions pending work into fixed-size `[low, high]`
//! jobs and feeds them to `threads` workers over a bounded channel. One
//! cancellation token fans out to every task: the first worker error
//! cancels its siblings, and SIGINT/SIGTERM triggers a graceful drain —
//! the scheduler stops emitting, workers finish their current batch, the
//! open transaction commits.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ethlake_rpc::EthApi as _;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::block::decode_range;
use crate::error::PipelineError;
use crate::interval::Interval;
use crate::services::Services;

/// What the scheduler feeds into the channel.
type Job = Interval;

/// Which direction the pipeline walks the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Follow the confirmed tip, also backfilling behind the scheduled
    /// range. Runs until cancelled.
    Follow,
    /// Walk strictly backwards from the scheduled range, bounded by
    /// `max_batches` scheduling iterations.
    Backfill,
}

/// Run the full pipeline: scheduler, workers, signal handling.
///
/// Returns the first fatal error, or `Ok` on clean shutdown.
pub async fn run_pipeline(services: Arc<Services>, mode: WalkMode) -> Result<(), PipelineError> {
    let token = CancellationToken::new();
    let threads = services.config.threads.max(1);
    let (tx, rx) = mpsc::channel::<Job>(threads);
    let rx = Arc::new(Mutex::new(rx));
    // Warehouse transaction mutex: workers share one session transaction,
    // so exactly one of them may be inside begin..commit at a time.
    let write_lock = Arc::new(Mutex::new(()));

    let mut tasks: JoinSet<Result<(), PipelineError>> = JoinSet::new();

    {
        let services = services.clone();
        let token = token.clone();
        tasks.spawn(async move { scheduler(services, mode, tx, token).await });
    }
    for id in 0..threads {
        let services = services.clone();
        let token = token.clone();
        let rx = rx.clone();
        let write_lock = write_lock.clone();
        tasks.spawn(async move { worker(id, services, rx, write_lock, token).await });
    }
    spawn_signal_listener(token.clone());

    let mut first_error: Option<PipelineError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "pipeline task failed, cancelling peers");
                token.cancel();
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                token.cancel();
                first_error.get_or_insert(PipelineError::Join(join_err.to_string()));
            }
        }
    }

    // Drain buffered state before reporting: new contracts and the final
    // progress row survive even a cancelled run.
    if let Err(e) = services.contracts.flush().await {
        warn!(error = %e, "final contract flush failed");
        first_error.get_or_insert(e);
    }
    if let Err(e) = services.tracker.save_next(services.warehouse.as_ref()).await {
        warn!(error = %e, "final progress save failed");
        first_error.get_or_insert(e);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// The scheduling loop.
///
/// 1. Seed pending work with every gap the tracker knows about.
/// 2. When pending runs dry, consult the node for the confirmed tip.
/// 3. With nothing scheduled yet, reserve `threads × batch_size` blocks
///    below the tip; afterwards extend upward to the tip and downward by
///    another `threads × batch_size` blocks.
/// 4. Split every range into `batch_size` jobs and enqueue them.
async fn scheduler(
    services: Arc<Services>,
    mode: WalkMode,
    tx: mpsc::Sender<Job>,
    token: CancellationToken,
) -> Result<(), PipelineError> {
    let batch = services.config.batch_size.max(1);
    let span = batch * services.config.threads.max(1) as u64;
    let mut pending: VecDeque<Job> = VecDeque::new();

    for gap in services.tracker.gaps().await {
        push_split(&mut pending, gap, batch);
    }
    info!(jobs = pending.len(), mode = ?mode, "scheduler seeded with gap jobs");

    let mut iterations = 0u32;
    loop {
        if token.is_cancelled() {
            break;
        }

        if pending.is_empty() {
            if mode == WalkMode::Backfill {
                iterations += 1;
                if iterations > services.config.max_batches {
                    info!(iterations = iterations - 1, "bounded walk complete");
                    break;
                }
            }

            let tip = services
                .eth
                .latest_confirmed(services.config.block_delay)
                .await?;
            if tip == 0 {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                }
            }

            match services.tracker.scheduled().await {
                None => {
                    let low = tip.saturating_sub(span).saturating_add(1);
                    push_split(&mut pending, Interval::new(low, tip), batch);
                    services.tracker.set_scheduled(Interval::new(low, tip)).await;
                }
                Some(scheduled) => {
                    let mut reserved = scheduled;
                    if mode == WalkMode::Follow && tip > scheduled.high {
                        push_split(
                            &mut pending,
                            Interval::new(scheduled.high + 1, tip),
                            batch,
                        );
                        reserved.high = tip;
                    }
                    if scheduled.low > 1 {
                        let old_low = scheduled.low.saturating_sub(span).max(1);
                        push_split(
                            &mut pending,
                            Interval::new(old_low, scheduled.low - 1),
                            batch,
                        );
                        reserved.low = old_low;
                    }
                    services.tracker.set_scheduled(reserved).await;
                }
            }

            if pending.is_empty() {
                // tip has not advanced; idle until it does
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                }
            }
        }

        let job = pending.pop_front().expect("pending checked non-empty");
        // Bounded channel of depth `threads`: when every worker is busy and
        // the buffer is full, retry each second rather than queueing
        // unboundedly ahead of the workers.
        let mut job = job;
        loop {
            match tx.try_send(job) {
                Ok(()) => break,
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    job = returned;
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
            }
        }
    }
    Ok(())
}

/// Split `range` into `batch_size` jobs, highest first.
fn push_split(pending: &mut VecDeque<Job>, range: Interval, batch: u64) {
    let mut high = range.high;
    while high >= range.low {
        let low = high.saturating_sub(batch - 1).max(range.low);
        pending.push_back(Interval::new(low, high));
        if low == range.low {
            break;
        }
        high = low - 1;
    }
}

/// One decode worker: pull a job, decode its blocks descending, commit the
/// batch, mark progress.
async fn worker(
    id: usize,
    services: Arc<Services>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    write_lock: Arc<Mutex<()>>,
    token: CancellationToken,
) -> Result<(), PipelineError> {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => return Ok(()),
                },
            }
        };

        info!(worker = id, low = job.low, high = job.high, "decoding batch");
        let blocks = match decode_range(&services, job).await {
            Ok(blocks) => blocks,
            Err(e) => {
                // nothing of this batch was staged yet; a rollback here
                // would discard a sibling's rows
                token.cancel();
                return Err(e);
            }
        };

        // Held across begin..commit: staged rows never mix across batches,
        // a rollback only ever discards this batch, and commit retries
        // stay single-threaded.
        let _write = write_lock.lock().await;
        let result = async {
            services.warehouse.begin().await?;
            services.warehouse.insert_blocks(&blocks).await?;
            for block in &blocks {
                services.warehouse.insert_transactions(&block.transactions).await?;
                services.warehouse.insert_logs(&block.logs).await?;
            }
            services.warehouse.commit().await?;
            Ok::<(), PipelineError>(())
        }
        .await;

        if let Err(e) = result {
            let _ = services.warehouse.rollback().await;
            token.cancel();
            return Err(e);
        }
        drop(_write);

        for block in &blocks {
            services.tracker.add_block(block.number, block.block_time).await;
        }
        services
            .tracker
            .save_next(services.warehouse.as_ref())
            .await?;
    }
}

/// Cancel the token on SIGINT or SIGTERM.
fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(term) => term,
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable");
                    if ctrl_c.await.is_ok() {
                        info!("interrupt received, draining");
                        token.cancel();
                    }
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("interrupt received, draining"),
                _ = term.recv() => info!("termination requested, draining"),
            }
            token.cancel();
        }
        #[cfg(not(unix))]
        {
            if ctrl_c.await.is_ok() {
                info!("interrupt received, draining");
                token.cancel();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(range: (u64, u64), batch: u64) -> Vec<(u64, u64)> {
        let mut pending = VecDeque::new();
        push_split(&mut pending, Interval::new(range.0, range.1), batch);
        pending.iter().map(|iv| (iv.low, iv.high)).collect()
    }

    #[test]
    fn split_exact_batches() {
        assert_eq!(split((1, 80), 40), vec![(41, 80), (1, 40)]);
    }

    #[test]
    fn split_with_remainder() {
        assert_eq!(split((10, 99), 40), vec![(60, 99), (20, 59), (10, 19)]);
    }

    #[test]
    fn split_single_block() {
        assert_eq!(split((7, 7), 40), vec![(7, 7)]);
    }

    #[test]
    fn split_covers_every_block_once() {
        let jobs = split((100, 1000), 37);
        let mut covered = vec![false; 901];
        for (low, high) in jobs {
            for n in low..=high {
                assert!(!covered[(n - 100) as usize], "block {n} scheduled twice");
                covered[(n - 100) as usize] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }
}
