//! Ethereum JSON-RPC 2.0 client over HTTP.
//!
//! Each accessor carries the retry schedule its pipeline caller expects:
//! block and receipt fetches retry 3 times at a 10 s spacing, log fetches
//! 5 times at a linearly growing one. Transport failures retry; JSON-RPC
//! execution errors do not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::api::EthApi;
use crate::error::RpcError;
use crate::retry::RetrySchedule;
use crate::types::{quantity::parse_hex_u64, RpcBlock, RpcLog, RpcReceipt};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client for one Ethereum node endpoint.
pub struct EthClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    block_retry: RetrySchedule,
    logs_retry: RetrySchedule,
}

impl EthClient {
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
            block_retry: RetrySchedule::fixed(3, Duration::from_secs(10)),
            logs_retry: RetrySchedule::scaled(5, Duration::from_secs(10)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One request, no retry.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {status}: {body}")));
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        if body.result.is_null() {
            return Err(RpcError::MissingResult {
                method: method.to_string(),
            });
        }
        Ok(serde_json::from_value(body.result)?)
    }

    /// Retry `method` on transient failures per `schedule`.
    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        schedule: RetrySchedule,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.request(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };
            match schedule.delay_after(attempt) {
                Some(delay) => {
                    warn!(
                        method,
                        attempt,
                        delay_s = delay.as_secs(),
                        error = %err,
                        "node request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(RpcError::RetriesExhausted {
                        method: method.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    })
                }
            }
        }
    }

}

#[async_trait::async_trait]
impl EthApi for EthClient {
    /// `eth_blockNumber`: the current chain tip.
    async fn block_number(&self) -> Result<u64, RpcError> {
        let raw: String = self
            .request_with_retry(self.block_retry, "eth_blockNumber", json!([]))
            .await?;
        parse_hex_u64(&raw).ok_or(RpcError::MissingResult {
            method: "eth_blockNumber".into(),
        })
    }

    /// `eth_getBlockByNumber` with full transaction objects.
    async fn block_by_number(&self, number: u64) -> Result<RpcBlock, RpcError> {
        self.request_with_retry(
            self.block_retry,
            "eth_getBlockByNumber",
            json!([format!("0x{number:x}"), true]),
        )
        .await
    }

    /// `eth_getBlockByHash` with full transaction objects.
    async fn block_by_hash(&self, hash: &B256) -> Result<RpcBlock, RpcError> {
        self.request_with_retry(self.block_retry, "eth_getBlockByHash", json!([hash, true]))
            .await
    }

    /// `eth_getLogs` filtered to a single block by hash.
    ///
    /// Filtering by hash rather than number pins the query to the exact
    /// chain the block fetch observed.
    async fn logs_by_block_hash(&self, hash: &B256) -> Result<Vec<RpcLog>, RpcError> {
        self.request_with_retry(
            self.logs_retry,
            "eth_getLogs",
            json!([{ "blockHash": hash }]),
        )
        .await
    }

    /// `eth_getTransactionReceipt`; `None` when the node does not know the
    /// transaction.
    async fn transaction_receipt(&self, hash: &B256) -> Result<Option<RpcReceipt>, RpcError> {
        match self
            .request_with_retry::<RpcReceipt>(self.block_retry, "eth_getTransactionReceipt", json!([hash]))
            .await
        {
            Ok(receipt) => Ok(Some(receipt)),
            Err(RpcError::MissingResult { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `eth_call` against the latest block. Used for the best-effort ERC-20
    /// property probes; callers treat failures as absent values.
    async fn call(&self, to: &Address, data: &[u8]) -> Result<Bytes, RpcError> {
        self.request(
            "eth_call",
            json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
        )
        .await
    }

    /// `eth_getCode` at the latest block.
    async fn get_code(&self, address: &Address) -> Result<Bytes, RpcError> {
        self.request("eth_getCode", json!([address, "latest"])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_as_jsonrpc_2() {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_blockNumber",
            params: json!([]),
            id: 7,
        };
        let body = serde_json::to_string(&req).unwrap();
        assert!(body.contains(r#""jsonrpc":"2.0""#));
        assert!(body.contains(r#""method":"eth_blockNumber""#));
        assert!(body.contains(r#""id":7"#));
    }

    #[test]
    fn response_error_object_parses() {
        let body: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
        )
        .unwrap();
        let err = body.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "header not found");
    }

    #[test]
    fn null_result_is_detected() {
        let body: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(body.result.is_null());
        assert!(body.error.is_none());
    }

    // Scenario fixtures (S1, S4) hit mainnet and are exercised by the
    // integration tests in ethlake-core; this module stays offline.
}
