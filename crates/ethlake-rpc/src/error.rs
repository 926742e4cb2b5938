//! Client error types.

use thiserror::Error;

/// Errors from the node or Etherscan clients.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport failure: connection refused, timeout, bad status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response body did not match the expected shape.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The node returned `null` where a value was required.
    #[error("missing result for {method}")]
    MissingResult { method: String },

    /// Retry schedule exhausted without a successful response.
    #[error("{method} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        method: String,
        attempts: u32,
        last_error: String,
    },

    /// Etherscan responded, but with an application-level error.
    #[error("Etherscan error: {message}")]
    Etherscan { message: String },

    /// Etherscan has no (verified) ABI for this address; recoverable.
    #[error("no ABI available for {address}")]
    AbiUnavailable { address: String },
}

impl RpcError {
    /// Transient errors are worth retrying; node-side execution errors and
    /// negative Etherscan answers are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}
