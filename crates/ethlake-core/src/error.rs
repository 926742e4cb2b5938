//! Pipeline and storage error types.

use thiserror::Error;

/// Errors from a warehouse gateway implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("warehouse connection error: {0}")]
    Connection(String),

    #[error("warehouse statement failed: {0}")]
    Statement(String),

    #[error("row encoding failed: {0}")]
    Encode(String),

    #[error("staging error: {0}")]
    Staging(String),

    #[error("credential error: {0}")]
    Secret(String),

    /// A persisted progress row with `hi < low`; unrecoverable.
    #[error("corrupted progress row: hi {hi} < low {low}")]
    CorruptProgress { hi: u64, low: u64 },

    /// Commit retried through the full reconnect schedule without success.
    #[error("commit failed after {attempts} reconnect attempts: {last_error}")]
    CommitExhausted { attempts: u32, last_error: String },
}

/// Errors that escape a pipeline component.
///
/// Decode failures never appear here; they are absorbed as
/// `"UNKNOWN"` method/event markers. What does escape is fatal for the
/// batch: node retry exhaustion, warehouse failures, cancellation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Rpc(#[from] ethlake_rpc::RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("worker panicked: {0}")]
    Join(String),
}
