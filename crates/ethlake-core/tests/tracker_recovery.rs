//! Startup recovery of the interval tracker from warehouse state.

use std::sync::Arc;

use ethlake_core::{
    BlockIntervals, Interval, MemoryWarehouse, ProcessKind, Progress, Warehouse,
};

fn progress(low: u64, hi: u64) -> Progress {
    Progress {
        kind: ProcessKind::AddTransaction,
        hi_block: hi,
        low_block: low,
        hi_block_time: 0,
        low_block_time: 0,
    }
}

#[tokio::test]
async fn load_without_progress_starts_empty() {
    let warehouse = MemoryWarehouse::new();
    let tracker = BlockIntervals::load(&warehouse).await.unwrap();
    assert!(tracker.gaps().await.is_empty());
    assert!(tracker.scheduled().await.is_none());
}

#[tokio::test]
async fn load_recovers_stray_blocks_as_intervals() {
    let warehouse = MemoryWarehouse::new();
    warehouse.seed_progress(progress(100, 200));
    // blocks persisted outside the progress extent by an interrupted run
    warehouse.seed_block_numbers(&[300, 301, 302, 95]);

    let tracker = BlockIntervals::load(&warehouse).await.unwrap();
    let working = tracker.working().await;
    assert_eq!(
        working
            .as_slice()
            .iter()
            .map(|iv| (iv.low, iv.high))
            .collect::<Vec<_>>(),
        vec![(95, 95), (100, 200), (300, 302)]
    );
    assert_eq!(
        tracker.gaps().await,
        vec![Interval::new(96, 99), Interval::new(201, 299)]
    );
    // scheduled spans the full known extent
    assert_eq!(tracker.scheduled().await, Some(Interval::new(95, 302)));
}

#[tokio::test]
async fn corrupt_progress_row_is_fatal() {
    let warehouse = MemoryWarehouse::new();
    warehouse.seed_progress(progress(200, 100)); // hi < low
    assert!(BlockIntervals::load(&warehouse).await.is_err());
}

#[tokio::test]
async fn save_next_persists_only_on_change() {
    let warehouse = Arc::new(MemoryWarehouse::new());
    warehouse.seed_progress(progress(100, 200));
    let tracker = BlockIntervals::load(warehouse.as_ref()).await.unwrap();

    // no movement, no write
    tracker.save_next(warehouse.as_ref()).await.unwrap();
    let stored = warehouse
        .query_progress(ProcessKind::AddTransaction)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((stored.low_block, stored.hi_block), (100, 200));

    // extend, then save
    tracker.add_block(201, 5000).await;
    tracker.add_block(202, 5012).await;
    tracker.save_next(warehouse.as_ref()).await.unwrap();
    let stored = warehouse
        .query_progress(ProcessKind::AddTransaction)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((stored.low_block, stored.hi_block), (100, 202));
    assert_eq!(stored.hi_block_time, 5012);
}

#[tokio::test]
async fn progress_is_monotonic_across_saves() {
    let warehouse = Arc::new(MemoryWarehouse::new());
    warehouse.seed_progress(progress(100, 110));
    let tracker = BlockIntervals::load(warehouse.as_ref()).await.unwrap();

    let mut last = (100u64, 110u64);
    for n in [111u64, 99, 112, 98, 113] {
        tracker.add_block(n, 0).await;
        tracker.save_next(warehouse.as_ref()).await.unwrap();
        let stored = warehouse
            .query_progress(ProcessKind::AddTransaction)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.low_block <= last.0, "low regressed at {n}");
        assert!(stored.hi_block >= last.1, "high regressed at {n}");
        last = (stored.low_block, stored.hi_block);
    }
    assert_eq!(last, (98, 113));
}
