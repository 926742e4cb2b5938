//! The ethlake decode-and-persist pipeline.
//!
//! This crate owns the hard parts: the scheduler that partitions the chain
//! into batch intervals, the worker pool that decodes them, the contract
//! cache that guarantees at-most-one ABI fetch per address, the interval
//! tracker that records completed block ranges and drives gap recovery,
//! and the receipt reconciler that retroactively flags rejected
//! transactions. Storage backends implement the [`warehouse::Warehouse`]
//! trait from `ethlake-store`.

pub mod block;
pub mod contracts;
pub mod error;
pub mod interval;
pub mod reconcile;
pub mod schedule;
pub mod services;
pub mod types;
pub mod warehouse;

pub use error::{PipelineError, StoreError};
pub use interval::{BlockIntervals, Interval, IntervalSet};
pub use services::{PipelineConfig, Services};
pub use types::{Block, Contract, EventLog, ProcessKind, Progress, Transaction, TxStatus};
pub use warehouse::{BlockQuery, MemoryWarehouse, TxStatusRow, Warehouse};
