//! ethlake — walk the confirmed Ethereum chain, decode every transaction
//! input and event log against contract ABIs, and persist the result into
//! a columnar warehouse.
//!
//! ```bash
//! ethlake --apiKey <etherscan-key> --command newTx
//! ethlake --apiKey <etherscan-key> --command oldTx --maxBatches 500
//! ethlake --apiKey <etherscan-key> --command rejectTx
//! ```
//!
//! Environment variables (`ETHEREUM_URL`, `ETHERSCAN_APIKEY`,
//! `CLICKHOUSE_*`, `AWS_*`) override the corresponding flags.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tracing::info;

use ethlake_core::schedule::{run_pipeline, WalkMode};
use ethlake_core::{block, reconcile, PipelineConfig, ProcessKind, Services, Warehouse};
use ethlake_rpc::{EthApi, EthClient, EtherscanClient};
use ethlake_store::{
    ClickHouseConfig, ClickHouseGateway, PasswordSecret, RedshiftConfig, RedshiftGateway,
    S3Staging,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Command {
    /// Follow the confirmed chain tip, backfilling behind it.
    #[value(name = "newTx")]
    NewTx,
    /// Walk backwards through history, bounded by `maxBatches`.
    #[value(name = "oldTx")]
    OldTx,
    /// Re-check receipts and mark rejected transactions.
    #[value(name = "rejectTx")]
    RejectTx,
    /// Decode the latest confirmed block and print a summary.
    #[value(name = "default")]
    Default,
}

#[derive(Debug, Parser)]
#[command(
    name = "ethlake",
    about = "Ethereum mainnet ABI-decoding warehouse indexer",
    version
)]
struct Cli {
    /// Ethereum JSON-RPC URL
    #[arg(long = "nodeURL", env = "ETHEREUM_URL", default_value = "http://localhost:8545")]
    node_url: String,

    /// Etherscan API key
    #[arg(long = "apiKey", env = "ETHERSCAN_APIKEY")]
    api_key: String,

    /// Minimum milliseconds between Etherscan calls
    #[arg(long = "etherscanDelay", default_value_t = 350)]
    etherscan_delay: u64,

    /// Confirmation depth below the chain tip
    #[arg(long = "blockDelay", default_value_t = 12)]
    block_delay: u64,

    /// Blocks per worker batch
    #[arg(long = "blockBatchSize", alias = "batchSize", default_value_t = 40)]
    block_batch_size: u64,

    /// Worker count
    #[arg(long = "threads", default_value_t = 5)]
    threads: usize,

    /// Bounded-mode max scheduling iterations
    #[arg(long = "maxBatches", default_value_t = 100)]
    max_batches: u32,

    /// Rejections per bulk mark-rejected statement
    #[arg(long = "statusBatchSize", default_value_t = 100)]
    status_batch_size: usize,

    /// Reconciler window width in hours
    #[arg(long = "statusIntHours", default_value_t = 12)]
    status_int_hours: i64,

    /// Contract-cache warm-up horizon in days
    #[arg(long = "preloadDays", default_value_t = 30)]
    preload_days: u32,

    /// Try standard token signatures before the contract cache
    #[arg(long = "standardFirst", default_value_t = true, action = clap::ArgAction::Set)]
    standard_first: bool,

    #[arg(long = "command", value_enum, default_value = "newTx")]
    command: Command,

    // ── ClickHouse dialect ────────────────────────────────────────────
    /// Warehouse HTTP endpoint
    #[arg(long = "dbURL", env = "CLICKHOUSE_URL", default_value = "http://127.0.0.1:8123")]
    db_url: String,

    #[arg(long = "dbName", env = "CLICKHOUSE_DB", default_value = "default")]
    db_name: String,

    #[arg(long = "dbUser", env = "CLICKHOUSE_USER", default_value = "default")]
    db_user: String,

    #[arg(long = "dbPassword", env = "CLICKHOUSE_PASSWORD", default_value = "")]
    db_password: String,

    // ── Redshift dialect (selected when --redshift is set) ────────────
    /// Redshift database name; selects the staging dialect
    #[arg(long = "redshift", env = "AWS_REDSHIFT", default_value = "")]
    redshift: String,

    #[arg(long = "profile", env = "AWS_PROFILE", default_value = "default")]
    profile: String,

    #[arg(long = "region", env = "AWS_REGION", default_value = "us-west-2")]
    region: String,

    /// Secrets Manager entry holding the cluster credentials
    #[arg(long = "secret", env = "AWS_SECRET", default_value = "")]
    secret: String,

    #[arg(long = "s3Bucket", env = "AWS_S3BUCKET", default_value = "")]
    s3_bucket: String,

    /// IAM role ARN the COPY statements assume
    #[arg(long = "copyRole", env = "AWS_COPY_ROLE", default_value = "")]
    copy_role: String,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            threads: self.threads,
            batch_size: self.block_batch_size,
            block_delay: self.block_delay,
            max_batches: self.max_batches,
            status_batch_size: self.status_batch_size,
            status_int_hours: self.status_int_hours,
            standard_first: self.standard_first,
            preload_days: self.preload_days,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.api_key.is_empty() {
        bail!("an Etherscan API key is required (--apiKey or ETHERSCAN_APIKEY)");
    }

    let eth: Arc<dyn EthApi> =
        Arc::new(EthClient::new(&cli.node_url).context("building node client")?);
    let etherscan =
        EtherscanClient::new(&cli.api_key, cli.etherscan_delay).context("building Etherscan client")?;

    let warehouse = connect_warehouse(&cli).await?;
    let services = Arc::new(
        Services::connect(cli.pipeline_config(), eth, etherscan, warehouse)
            .await
            .context("wiring pipeline services")?,
    );

    match cli.command {
        Command::NewTx => run_pipeline(services, WalkMode::Follow).await?,
        Command::OldTx => run_pipeline(services, WalkMode::Backfill).await?,
        Command::RejectTx => run_reject(services).await?,
        Command::Default => run_smoke(services).await?,
    }
    info!("done");
    Ok(())
}

/// Pick the warehouse dialect from the flags.
async fn connect_warehouse(cli: &Cli) -> Result<Arc<dyn Warehouse>> {
    if cli.redshift.is_empty() {
        let gateway = ClickHouseGateway::connect(ClickHouseConfig {
            url: cli.db_url.clone(),
            database: cli.db_name.clone(),
            user: cli.db_user.clone(),
            password: cli.db_password.clone(),
        })
        .await
        .context("connecting to ClickHouse")?;
        return Ok(Arc::new(gateway));
    }

    if cli.secret.is_empty() || cli.s3_bucket.is_empty() || cli.copy_role.is_empty() {
        bail!("the Redshift dialect needs --secret, --s3Bucket and --copyRole");
    }
    let secret = PasswordSecret::fetch(&cli.secret, &cli.profile, &cli.region)
        .await
        .context("fetching warehouse credentials")?;
    let staging = S3Staging::connect(&cli.s3_bucket, &cli.profile, &cli.region)
        .await
        .context("connecting to S3")?;
    let gateway = RedshiftGateway::connect(
        &secret,
        RedshiftConfig {
            db_name: cli.redshift.clone(),
            copy_role: cli.copy_role.clone(),
            ..RedshiftConfig::default()
        },
        staging,
    )
    .await
    .context("connecting to Redshift")?;
    Ok(Arc::new(gateway))
}

/// Reconcile receipts over the window between the last reconciliation and
/// the decode pipeline's progress.
async fn run_reject(services: Arc<Services>) -> Result<()> {
    let decoded = services
        .warehouse
        .query_progress(ProcessKind::AddTransaction)
        .await?;
    let reconciled = services
        .warehouse
        .query_progress(ProcessKind::SetStatus)
        .await?;

    let end = decoded
        .as_ref()
        .map(|p| p.hi_block_time)
        .filter(|&t| t > 0)
        .unwrap_or_else(|| Utc::now().timestamp());
    let start = reconciled
        .as_ref()
        .map(|p| p.hi_block_time)
        .filter(|&t| t > 0)
        .or_else(|| decoded.as_ref().map(|p| p.low_block_time).filter(|&t| t > 0))
        .unwrap_or(end - 24 * 3600);

    reconcile::run_reconciler(services, start, end).await?;
    Ok(())
}

/// Decode the newest confirmed block and print what a full run would
/// persist.
async fn run_smoke(services: Arc<Services>) -> Result<()> {
    let tip = services
        .eth
        .latest_confirmed(services.config.block_delay)
        .await?;
    let block = block::decode_by_number(&services, tip).await?;
    info!(
        number = block.number,
        hash = %block.hash,
        time = block.block_time,
        transactions = block.transactions.len(),
        logs = block.logs.len(),
        "decoded latest confirmed block"
    );
    for tx in block.transactions.iter().take(10) {
        info!(index = tx.txn_index, method = %tx.method, hash = %tx.hash, "transaction");
    }
    Ok(())
}
