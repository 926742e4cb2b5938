//! The node-client contract the pipeline consumes.
//!
//! [`EthClient`](crate::EthClient) is the production implementation;
//! tests substitute fakes with canned blocks and receipts.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;

use crate::error::RpcError;
use crate::types::{RpcBlock, RpcLog, RpcReceipt};

/// Ethereum node operations used by the decode pipeline.
#[async_trait]
pub trait EthApi: Send + Sync {
    /// Current chain tip.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Newest block considered confirmed: tip minus `block_delay`.
    async fn latest_confirmed(&self, block_delay: u64) -> Result<u64, RpcError> {
        Ok(self.block_number().await?.saturating_sub(block_delay))
    }

    /// Block with full transaction objects.
    async fn block_by_number(&self, number: u64) -> Result<RpcBlock, RpcError>;

    async fn block_by_hash(&self, hash: &B256) -> Result<RpcBlock, RpcError>;

    /// All logs of one block, selected by hash.
    async fn logs_by_block_hash(&self, hash: &B256) -> Result<Vec<RpcLog>, RpcError>;

    /// `None` when the node does not know the transaction.
    async fn transaction_receipt(&self, hash: &B256) -> Result<Option<RpcReceipt>, RpcError>;

    /// Read-only call against the latest block.
    async fn call(&self, to: &Address, data: &[u8]) -> Result<Bytes, RpcError>;

    /// Deployed bytecode at the latest block.
    async fn get_code(&self, address: &Address) -> Result<Bytes, RpcError>;
}
