//! Upstream clients for the ethlake pipeline.
//!
//! Two HTTP collaborators live here: the Ethereum node (JSON-RPC 2.0) and
//! Etherscan (contract ABI lookup). Both are plain `reqwest` clients with
//! the retry schedules the pipeline components expect baked in.

pub mod api;
pub mod client;
pub mod error;
pub mod etherscan;
pub mod retry;
pub mod types;

pub use api::EthApi;
pub use client::EthClient;
pub use error::RpcError;
pub use etherscan::EtherscanClient;
pub use retry::RetrySchedule;
pub use types::{RpcBlock, RpcLog, RpcReceipt, RpcTransaction};
