//! Warehouse gateways for the ethlake pipeline.
//!
//! Two dialects implement the [`ethlake_core::Warehouse`] contract:
//!
//! - [`clickhouse::ClickHouseGateway`] speaks SQL to ClickHouse's native
//!   HTTP endpoint, buffering rows per table and flushing them as batched
//!   multi-row inserts on commit.
//! - [`redshift::RedshiftGateway`] drives a Redshift cluster over the
//!   Postgres wire protocol, staging large batches as CSV in S3 and
//!   loading them with a privileged `COPY`.

pub mod clickhouse;
pub mod encode;
pub mod redshift;
pub mod s3;
pub mod secret;

pub use clickhouse::{ClickHouseConfig, ClickHouseGateway};
pub use redshift::{RedshiftConfig, RedshiftGateway};
pub use s3::S3Staging;
pub use secret::PasswordSecret;
