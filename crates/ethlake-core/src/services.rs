//! The shared services context.
//!
//! Everything the pipeline components need — clients, the standard ABI
//! tables, the contract cache, the interval tracker, the warehouse — is
//! carried in one [`Services`] struct passed through the call graph. No
//! hidden global state; tests swap in fakes by building their own context.

use std::sync::Arc;

use ethlake_abi::StandardAbi;
use ethlake_rpc::{EthApi, EtherscanClient};

use crate::contracts::ContractCache;
use crate::error::PipelineError;
use crate::interval::BlockIntervals;
use crate::warehouse::Warehouse;

/// Tunables, populated from CLI flags and environment overrides.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker count.
    pub threads: usize,
    /// Blocks per worker batch.
    pub batch_size: u64,
    /// Confirmation depth below the chain tip.
    pub block_delay: u64,
    /// Bounded-mode iteration cap for the backward walk.
    pub max_batches: u32,
    /// Rejections accumulated before a bulk mark-rejected statement.
    pub status_batch_size: usize,
    /// Reconciler window width in hours.
    pub status_int_hours: i64,
    /// Try standard-ABI signatures before the contract cache. A contract
    /// reusing a standard topic-0 with different semantics would be
    /// silently reclassified, hence the switch.
    pub standard_first: bool,
    /// Contract-cache warm-up horizon in days.
    pub preload_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: 5,
            batch_size: 40,
            block_delay: 12,
            max_batches: 100,
            status_batch_size: 100,
            status_int_hours: 12,
            standard_first: true,
            preload_days: 30,
        }
    }
}

/// The wired-up pipeline context.
pub struct Services {
    pub config: PipelineConfig,
    pub eth: Arc<dyn EthApi>,
    pub standard: Arc<StandardAbi>,
    pub contracts: Arc<ContractCache>,
    pub tracker: Arc<BlockIntervals>,
    pub warehouse: Arc<dyn Warehouse>,
}

impl Services {
    /// Wire the full context: clients, warmed cache, loaded tracker.
    pub async fn connect(
        config: PipelineConfig,
        eth: Arc<dyn EthApi>,
        etherscan: EtherscanClient,
        warehouse: Arc<dyn Warehouse>,
    ) -> Result<Self, PipelineError> {
        let etherscan = Arc::new(etherscan);
        let contracts = Arc::new(ContractCache::new(
            eth.clone(),
            etherscan,
            warehouse.clone(),
        ));
        contracts.preload(config.preload_days).await?;
        let tracker = Arc::new(BlockIntervals::load(warehouse.as_ref()).await?);

        Ok(Self {
            config,
            eth,
            standard: Arc::new(StandardAbi::load()),
            contracts,
            tracker,
            warehouse,
        })
    }
}
