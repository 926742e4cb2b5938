//! Mainnet fixture tests.
//!
//! These need a mainnet JSON-RPC node (`ETHEREUM_URL`) and an Etherscan
//! key (`ETHERSCAN_APIKEY`); run them explicitly:
//!
//! ```bash
//! ETHEREUM_URL=... ETHERSCAN_APIKEY=... cargo test -p ethlake-core -- --ignored
//! ```

use std::sync::Arc;

use ethlake_abi::{AbiTables, StandardAbi};
use ethlake_core::block::decode_by_number;
use ethlake_core::contracts::ContractCache;
use ethlake_core::{BlockIntervals, MemoryWarehouse, PipelineConfig, Services};
use ethlake_rpc::{EthApi as _, EthClient, EtherscanClient};

fn services() -> Arc<Services> {
    let node_url =
        std::env::var("ETHEREUM_URL").expect("ETHEREUM_URL must be set for mainnet tests");
    let api_key =
        std::env::var("ETHERSCAN_APIKEY").expect("ETHERSCAN_APIKEY must be set for mainnet tests");

    let eth = Arc::new(EthClient::new(node_url).unwrap());
    let etherscan = Arc::new(EtherscanClient::new(api_key, 350).unwrap());
    let warehouse = Arc::new(MemoryWarehouse::new());
    let contracts = Arc::new(ContractCache::new(
        eth.clone(),
        etherscan,
        warehouse.clone(),
    ));

    Arc::new(Services {
        config: PipelineConfig::default(),
        eth,
        standard: Arc::new(StandardAbi::load()),
        contracts,
        tracker: Arc::new(BlockIntervals::new(vec![])),
        warehouse,
    })
}

#[tokio::test]
#[ignore = "requires a mainnet node and an Etherscan key"]
async fn decode_block_13648265() {
    let services = services();
    let block = decode_by_number(&services, 13_648_265).await.unwrap();

    assert_eq!(
        format!("{:#x}", block.hash),
        "0x5593e9f8d436700e7826552c87be8de76b947d9619d6c8a17f2d6a5c7e7787e9"
    );
    // persisted view: successful transactions only
    assert_eq!(block.transactions.len(), 52);
    assert_eq!(block.logs.len(), 56);
    assert!(block
        .transactions
        .iter()
        .all(|tx| tx.status.as_i8() >= 0));
}

#[tokio::test]
#[ignore = "requires an Etherscan key"]
async fn dai_abi_method_and_event_counts() {
    let api_key = std::env::var("ETHERSCAN_APIKEY").unwrap();
    let etherscan = EtherscanClient::new(api_key, 350).unwrap();
    let abi = etherscan
        .fetch_abi("0x6b175474e89094c44da98b954eedeac495271d0f")
        .await
        .unwrap();
    let tables = AbiTables::parse(&abi).unwrap();
    assert_eq!(tables.methods.len(), 22);
    assert_eq!(tables.events.len(), 3);
}

#[tokio::test]
#[ignore = "requires an Etherscan key"]
async fn usdt_abi_method_and_event_counts() {
    let api_key = std::env::var("ETHERSCAN_APIKEY").unwrap();
    let etherscan = EtherscanClient::new(api_key, 350).unwrap();
    let abi = etherscan
        .fetch_abi("0xdac17f958d2ee523a2206206994597c13d831ec7")
        .await
        .unwrap();
    let tables = AbiTables::parse(&abi).unwrap();
    assert_eq!(tables.methods.len(), 32);
    assert_eq!(tables.events.len(), 11);
}

#[tokio::test]
#[ignore = "requires a mainnet node"]
async fn confirmed_tip_sits_below_head() {
    let services = services();
    let head = services.eth.block_number().await.unwrap();
    let confirmed = services.eth.latest_confirmed(12).await.unwrap();
    assert!(head - confirmed >= 12);
}
