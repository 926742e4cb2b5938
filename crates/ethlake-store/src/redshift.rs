//! Redshift warehouse gateway.
//!
//! Drives the cluster over the Postgres wire protocol via `sqlx`. Batches
//! stage as CSV files in S3 — one folder per batch — and load with a
//! privileged `COPY`. All three loads (transactions, logs, blocks) run
//! inside one warehouse transaction so a crash can never leave
//! transactions pointing at absent blocks. The staging folder is deleted
//! on commit and on rollback.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use ethlake_core::types::u256_to_f64;
use ethlake_core::{
    Block, BlockQuery, Contract, EventLog, ProcessKind, Progress, StoreError, Transaction,
    TxStatusRow, Warehouse,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::encode::{
    address_fixed, filter_str, format_date, format_datetime, hash_fixed, hex_fixed,
    opt_address_fixed, stored_input, stored_params, truncate_str, StoredParam, MAX_ABI_BYTES,
    MAX_NAME_CHARS, MAX_PARAMS,
};
use crate::s3::S3Staging;
use crate::secret::PasswordSecret;

const COMMIT_ATTEMPTS: u32 = 10;
const COMMIT_BACKOFF_STEP: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct RedshiftConfig {
    pub db_name: String,
    /// Schema holding the warehouse tables.
    pub schema: String,
    pub copy_role: String,
    pub pool_size: u32,
}

impl Default for RedshiftConfig {
    fn default() -> Self {
        Self {
            db_name: "dev".into(),
            schema: "eth".into(),
            copy_role: String::new(),
            pool_size: 10,
        }
    }
}

/// Rows staged while the session transaction is open.
#[derive(Default)]
struct StagedBatch {
    blocks: Vec<Block>,
    transactions: Vec<Transaction>,
    logs: Vec<EventLog>,
}

impl StagedBatch {
    fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.transactions.is_empty() && self.logs.is_empty()
    }

    /// Folder name from the staged block range.
    fn folder(&self) -> String {
        let low = self.blocks.iter().map(|b| b.number).min().unwrap_or(0);
        let high = self.blocks.iter().map(|b| b.number).max().unwrap_or(0);
        format!("batch-{low}-{high}")
    }
}

pub struct RedshiftGateway {
    pool: PgPool,
    staging: S3Staging,
    config: RedshiftConfig,
    txn: Mutex<Option<StagedBatch>>,
}

impl RedshiftGateway {
    /// Connect using credentials from Secrets Manager.
    pub async fn connect(
        secret: &PasswordSecret,
        config: RedshiftConfig,
        staging: S3Staging,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&secret.connection_url(&config.db_name))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(host = %secret.host, db = %config.db_name, "Redshift connected");
        Ok(Self {
            pool,
            staging,
            config,
            txn: Mutex::new(None),
        })
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.config.schema, name)
    }

    /// Begin a database transaction, reconnecting with backoff on failure.
    async fn begin_tx(&self) -> Result<sqlx::Transaction<'_, sqlx::Postgres>, StoreError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.pool.begin().await {
                Ok(tx) => return Ok(tx),
                Err(e) => e.to_string(),
            };
            if attempt >= COMMIT_ATTEMPTS {
                return Err(StoreError::CommitExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            let delay = COMMIT_BACKOFF_STEP * attempt;
            warn!(attempt, delay_s = delay.as_secs(), error = %err, "begin failed, reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    fn copy_statement(&self, table: &str, columns: &[&str], folder: &str, file: &str) -> String {
        format!(
            "COPY {} ({}) FROM 's3://{}/{}/{}' IAM_ROLE '{}' REGION '{}' \
             TIMEFORMAT 'auto' ACCEPTINVCHARS STATUPDATE ON CSV",
            self.table(table),
            columns.join(","),
            self.staging.bucket(),
            folder,
            file,
            self.config.copy_role,
            self.staging.region(),
        )
    }

    /// Stage the batch's CSV files under `folder`.
    async fn upload_batch(&self, batch: &StagedBatch, folder: &str) -> Result<(), StoreError> {
        let txs = compose_csv(batch.transactions.iter().map(transaction_record))?;
        self.staging.put(&format!("{folder}/transactions.csv"), txs).await?;
        let logs = compose_csv(batch.logs.iter().map(log_record))?;
        self.staging.put(&format!("{folder}/logs.csv"), logs).await?;
        let blocks = compose_csv(batch.blocks.iter().map(block_record))?;
        self.staging.put(&format!("{folder}/blocks.csv"), blocks).await?;
        info!(
            folder,
            blocks = batch.blocks.len(),
            transactions = batch.transactions.len(),
            logs = batch.logs.len(),
            "batch staged to S3"
        );
        Ok(())
    }
}

// ─── CSV row encoding ─────────────────────────────────────────────────────────

const BLOCK_COLUMNS: &[&str] = &[
    "Hash", "Number", "ParentHash", "Miner", "Difficulty", "GasLimit", "GasUsed", "Status",
    "BlockTime",
];

const TRANSACTION_COLUMNS: &[&str] = &[
    "Hash", "BlockNumber", "TxnIndex", "Status", "FromAddress", "ToAddress", "GasPrice", "Gas",
    "Value", "Nonce", "BlockTime", "Input", "Method", "ArgsLen", "Arg_1", "S_Value_1",
    "F_Value_1", "Arg_2", "S_Value_2", "F_Value_2", "Arg_3", "S_Value_3", "F_Value_3", "Arg_4",
    "S_Value_4", "F_Value_4", "Arg_5", "S_Value_5", "F_Value_5",
];

const LOG_COLUMNS: &[&str] = &[
    "BlockNumber", "LogIndex", "Removed", "TxnIndex", "TxnHash", "Address", "BlockTime", "Data",
    "Event", "ArgsLen", "Arg_1", "S_Value_1", "F_Value_1", "Arg_2", "S_Value_2", "F_Value_2",
    "Arg_3", "S_Value_3", "F_Value_3", "Arg_4", "S_Value_4", "F_Value_4", "Arg_5", "S_Value_5",
    "F_Value_5",
];

const CONTRACT_COLUMNS: &[&str] = &[
    "Address", "Name", "Symbol", "Decimals", "TotalSupply", "LastEventDate", "LastErrorDate",
    "ABI",
];

/// Render records as CSV with every field double-quoted (doubled-quote
/// escaping), the staging format the loader expects.
fn compose_csv(records: impl Iterator<Item = Vec<String>>) -> Result<Vec<u8>, StoreError> {
    let mut writer = WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .has_headers(false)
        .from_writer(Vec::new());
    for record in records {
        writer
            .write_record(&record)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Encode(e.to_string()))
}

/// The five positional parameter column triples.
fn param_columns(stored: &[StoredParam]) -> Vec<String> {
    let mut fields = Vec::with_capacity(MAX_PARAMS * 3);
    for i in 0..MAX_PARAMS {
        match stored.get(i) {
            Some(p) => {
                fields.push(p.name.clone());
                fields.push(p.text.clone());
                fields.push(p.number.to_string());
            }
            None => {
                fields.push(String::new());
                fields.push(String::new());
                fields.push("0".into());
            }
        }
    }
    fields
}

fn block_record(b: &Block) -> Vec<String> {
    vec![
        hash_fixed(&b.hash),
        b.number.to_string(),
        hash_fixed(&b.parent_hash),
        address_fixed(&b.miner),
        u256_to_f64(b.difficulty).to_string(),
        b.gas_limit.to_string(),
        b.gas_used.to_string(),
        i8::from(b.status).to_string(),
        format_datetime(b.block_time),
    ]
}

fn transaction_record(tx: &Transaction) -> Vec<String> {
    // hex without prefix in staging files
    let input = hex::encode(stored_input(&tx.input, tx.params.len()));
    let mut record = vec![
        hash_fixed(&tx.hash),
        tx.block_number.to_string(),
        tx.txn_index.to_string(),
        tx.status.as_i8().to_string(),
        address_fixed(&tx.from),
        opt_address_fixed(&tx.to),
        tx.gas_price.to_string(),
        tx.gas.to_string(),
        u256_to_f64(tx.value).to_string(),
        tx.nonce.to_string(),
        format_datetime(tx.block_time),
        input,
        truncate_str(&tx.method, MAX_NAME_CHARS).to_string(),
        tx.params.len().to_string(),
    ];
    record.extend(param_columns(&stored_params(&tx.params)));
    record
}

fn log_record(log: &EventLog) -> Vec<String> {
    let data = hex::encode(stored_input(&log.data, log.params.len()));
    let mut record = vec![
        log.block_number.to_string(),
        log.log_index.to_string(),
        i8::from(log.removed).to_string(),
        log.txn_index.to_string(),
        hash_fixed(&log.txn_hash),
        address_fixed(&log.address),
        format_datetime(log.block_time),
        data,
        truncate_str(&log.event, MAX_NAME_CHARS).to_string(),
        log.params.len().to_string(),
    ];
    record.extend(param_columns(&stored_params(&log.params)));
    record
}

fn contract_record(c: &Contract) -> Vec<String> {
    vec![
        hex_fixed(&c.address, 40),
        truncate_str(&c.name, MAX_NAME_CHARS).to_string(),
        truncate_str(&c.symbol, MAX_NAME_CHARS).to_string(),
        c.decimals.to_string(),
        c.total_supply.to_string(),
        format_date(c.last_event_date),
        format_date(c.last_error_date),
        filter_str(&c.abi, MAX_ABI_BYTES).to_string(),
    ]
}

fn timestamp_secs(row: &sqlx::postgres::PgRow, column: &str) -> i64 {
    row.try_get::<chrono::NaiveDateTime, _>(column)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

fn date_secs(row: &sqlx::postgres::PgRow, column: &str) -> i64 {
    row.try_get::<chrono::NaiveDate, _>(column)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// CHAR columns come back space-padded.
fn char_column(row: &sqlx::postgres::PgRow, column: &str) -> String {
    row.try_get::<String, _>(column)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_default()
}

fn secs_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

#[async_trait]
impl Warehouse for RedshiftGateway {
    async fn begin(&self) -> Result<(), StoreError> {
        let mut txn = self.txn.lock().await;
        if txn.is_none() {
            *txn = Some(StagedBatch::default());
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let batch = {
            let mut txn = self.txn.lock().await;
            match txn.take() {
                Some(batch) if !batch.is_empty() => batch,
                _ => return Ok(()),
            }
        };

        let folder = batch.folder();
        self.upload_batch(&batch, &folder).await?;

        // all three loads in ONE transaction
        let result = async {
            let mut tx = self.begin_tx().await?;
            for (table, columns, file) in [
                ("transactions", TRANSACTION_COLUMNS, "transactions.csv"),
                ("logs", LOG_COLUMNS, "logs.csv"),
                ("blocks", BLOCK_COLUMNS, "blocks.csv"),
            ] {
                let sql = self.copy_statement(table, columns, &folder, file);
                debug!(table, "executing COPY");
                sqlx::query(&sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Statement(format!("COPY {table}: {e}")))?;
            }
            tx.commit()
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            Ok::<(), StoreError>(())
        }
        .await;

        // staging folder goes away on success and on failure
        if let Err(e) = self.staging.delete_folder(&folder).await {
            warn!(folder = %folder, error = %e, "staging cleanup failed");
        }
        result
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let mut txn = self.txn.lock().await;
        if let Some(batch) = txn.take() {
            debug!(
                blocks = batch.blocks.len(),
                transactions = batch.transactions.len(),
                logs = batch.logs.len(),
                "discarding staged batch"
            );
        }
        Ok(())
    }

    async fn insert_blocks(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let mut txn = self.txn.lock().await;
        let batch = txn.get_or_insert_with(StagedBatch::default);
        batch.blocks.extend_from_slice(blocks);
        Ok(())
    }

    async fn insert_transactions(&self, txs: &[Transaction]) -> Result<(), StoreError> {
        let mut txn = self.txn.lock().await;
        let batch = txn.get_or_insert_with(StagedBatch::default);
        batch.transactions.extend_from_slice(txs);
        Ok(())
    }

    async fn insert_logs(&self, logs: &[EventLog]) -> Result<(), StoreError> {
        let mut txn = self.txn.lock().await;
        let batch = txn.get_or_insert_with(StagedBatch::default);
        batch.logs.extend_from_slice(logs);
        Ok(())
    }

    async fn insert_contracts(&self, contracts: &[Contract]) -> Result<(), StoreError> {
        if contracts.is_empty() {
            return Ok(());
        }
        let file = "contracts/contracts.csv";
        let csv = compose_csv(contracts.iter().map(contract_record))?;
        self.staging.put(file, csv).await?;

        let result = async {
            let mut tx = self.begin_tx().await?;
            let sql = self.copy_statement("contracts", CONTRACT_COLUMNS, "contracts", "contracts.csv");
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Statement(format!("COPY contracts: {e}")))?;
            tx.commit()
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            Ok::<(), StoreError>(())
        }
        .await;

        if let Err(e) = self.staging.delete_file(file).await {
            warn!(error = %e, "contract staging cleanup failed");
        }
        result
    }

    async fn update_contract_dates(&self, contract: &Contract) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET LastEventDate = $1, LastErrorDate = $2 WHERE Address = $3",
            self.table("contracts")
        );
        sqlx::query(&sql)
            .bind(secs_to_datetime(contract.last_event_date).date_naive())
            .bind(secs_to_datetime(contract.last_error_date).date_naive())
            .bind(hex_fixed(&contract.address, 40))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(())
    }

    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StoreError> {
        let update = format!(
            "UPDATE {} SET HiBlock = $1, LowBlock = $2, HiBlockTime = $3, LowBlockTime = $4 \
             WHERE ProcessID = $5",
            self.table("progress")
        );
        let updated = sqlx::query(&update)
            .bind(progress.hi_block as i64)
            .bind(progress.low_block as i64)
            .bind(secs_to_datetime(progress.hi_block_time).naive_utc())
            .bind(secs_to_datetime(progress.low_block_time).naive_utc())
            .bind(progress.kind.as_i16())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let insert = format!(
            "INSERT INTO {} (ProcessID, HiBlock, LowBlock, HiBlockTime, LowBlockTime) \
             VALUES ($1, $2, $3, $4, $5)",
            self.table("progress")
        );
        sqlx::query(&insert)
            .bind(progress.kind.as_i16())
            .bind(progress.hi_block as i64)
            .bind(progress.low_block as i64)
            .bind(secs_to_datetime(progress.hi_block_time).naive_utc())
            .bind(secs_to_datetime(progress.low_block_time).naive_utc())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(())
    }

    async fn query_progress(&self, kind: ProcessKind) -> Result<Option<Progress>, StoreError> {
        let sql = format!(
            "SELECT HiBlock, LowBlock, HiBlockTime, LowBlockTime FROM {} WHERE ProcessID = $1",
            self.table("progress")
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_i16())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(row.map(|row| Progress {
            kind,
            hi_block: row.try_get::<i64, _>("hiblock").unwrap_or(0) as u64,
            low_block: row.try_get::<i64, _>("lowblock").unwrap_or(0) as u64,
            hi_block_time: timestamp_secs(&row, "hiblocktime"),
            low_block_time: timestamp_secs(&row, "lowblocktime"),
        }))
    }

    async fn query_block(
        &self,
        reference: u64,
        direction: BlockQuery,
    ) -> Result<Option<u64>, StoreError> {
        let table = self.table("blocks");
        let sql = match direction {
            BlockQuery::MinAbove => {
                format!("SELECT MIN(Number) AS n FROM {table} WHERE Number > {reference}")
            }
            BlockQuery::MaxBelow => {
                format!("SELECT MAX(Number) AS n FROM {table} WHERE Number < {reference}")
            }
            BlockQuery::AbsoluteMax => format!("SELECT MAX(Number) AS n FROM {table}"),
            BlockQuery::AbsoluteMin => format!("SELECT MIN(Number) AS n FROM {table}"),
        };
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(row
            .try_get::<Option<i64>, _>("n")
            .map_err(|e| StoreError::Statement(e.to_string()))?
            .map(|n| n as u64))
    }

    async fn query_block_numbers_outside(
        &self,
        low: u64,
        high: u64,
    ) -> Result<Vec<u64>, StoreError> {
        let table = self.table("blocks");
        let sql = if high > 0 {
            format!("SELECT Number FROM {table} WHERE Number > {high} OR Number < {low}")
        } else {
            format!("SELECT Number FROM {table}")
        };
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<i64, _>("number").unwrap_or(0) as u64)
            .collect())
    }

    async fn query_contract(&self, address: &str) -> Result<Option<Contract>, StoreError> {
        let sql = format!(
            "SELECT Address, Name, Symbol, Decimals, TotalSupply, LastEventDate, LastErrorDate, ABI \
             FROM {} WHERE Address = $1",
            self.table("contracts")
        );
        let row = sqlx::query(&sql)
            .bind(hex_fixed(address, 40))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(row.map(|row| contract_from_row(&row)))
    }

    async fn query_contracts_since(&self, days: u32) -> Result<Vec<Contract>, StoreError> {
        let sql = format!(
            "SELECT Address, Name, Symbol, Decimals, TotalSupply, LastEventDate, LastErrorDate, ABI \
             FROM {} WHERE LastEventDate > $1",
            self.table("contracts")
        );
        let horizon = (Utc::now() - chrono::Duration::days(days as i64)).date_naive();
        let rows = sqlx::query(&sql)
            .bind(horizon)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(rows.iter().map(contract_from_row).collect())
    }

    async fn query_transactions(
        &self,
        start: i64,
        end: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TxStatusRow>, StoreError> {
        let sql = format!(
            "SELECT ToAddress, BlockTime, Hash, BlockNumber, Status FROM {} \
             WHERE BlockTime >= $1 AND BlockTime < $2 \
             ORDER BY BlockTime, Hash LIMIT {limit} OFFSET {offset}",
            self.table("transactions")
        );
        let rows = sqlx::query(&sql)
            .bind(secs_to_datetime(start).naive_utc())
            .bind(secs_to_datetime(end).naive_utc())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| TxStatusRow {
                to: char_column(row, "toaddress"),
                block_time: timestamp_secs(row, "blocktime"),
                hash: char_column(row, "hash"),
                block_number: row.try_get::<i64, _>("blocknumber").unwrap_or(0) as u64,
                status: row.try_get::<i16, _>("status").unwrap_or(0) as i8,
            })
            .collect())
    }

    async fn mark_transactions_rejected(
        &self,
        to_addrs: &[String],
        hashes: &[String],
    ) -> Result<(), StoreError> {
        if hashes.is_empty() {
            return Ok(());
        }
        let quote = |values: &[String]| {
            values
                .iter()
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(",")
        };
        let sql = format!(
            "UPDATE {} SET Status = -1 WHERE Hash IN ({}) AND ToAddress IN ({})",
            self.table("transactions"),
            quote(hashes),
            quote(to_addrs),
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(())
    }
}

fn contract_from_row(row: &sqlx::postgres::PgRow) -> Contract {
    Contract {
        address: format!("0x{}", char_column(row, "address")),
        name: char_column(row, "name"),
        symbol: char_column(row, "symbol"),
        decimals: row.try_get::<i16, _>("decimals").unwrap_or(0) as u8,
        total_supply: row.try_get::<f64, _>("totalsupply").unwrap_or(0.0),
        last_event_date: date_secs(row, "lasteventdate"),
        last_error_date: date_secs(row, "lasterrordate"),
        abi: char_column(row, "abi"),
    }
}
