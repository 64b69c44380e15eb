//! Chain JSON-RPC client
//!
//! HTTP side of the chain interface. The websocket subscription lives in
//! `subscriber`. Everything is behind the `ChainRpc` trait so the poller,
//! processor and verifier can run against a mock in tests.

use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One entry from a signature backfill window, newest first on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Whether the transaction failed on-chain
    pub failed: bool,
}

/// A fetched transaction with its log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Position within the block, when the node reports it
    pub tx_index: Option<i32>,
    pub log_messages: Vec<String>,
    pub failed: bool,
}

/// Chain RPC surface consumed by the indexer.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current slot at finalized commitment.
    async fn get_slot(&self) -> Result<u64>;

    /// Signatures for the program address newer than `until`, capped at
    /// `limit` (node-side max 1000).
    async fn get_signatures_for_address(
        &self,
        address: &str,
        until: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>>;

    /// Fetch transactions by signature. Unknown signatures come back None.
    async fn get_parsed_transactions(&self, signatures: &[String]) -> Result<Vec<Option<TxRecord>>>;

    /// Batched account fetch; None per address means confirmed absent.
    async fn get_multiple_accounts(&self, addresses: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Single account fetch; None means confirmed absent.
    async fn get_account_info(&self, address: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC over HTTP client.
pub struct HttpRpcClient {
    rpc_url: String,
    client: reqwest::Client,
}

impl HttpRpcClient {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id: 1,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexerError::Connection(e.to_string()))?;

        let rpc_response: RpcResponse = response
            .json()
            .await
            .map_err(|e| IndexerError::Rpc(format!("{method}: bad response: {e}")))?;

        if let Some(error) = rpc_response.error {
            return Err(IndexerError::Rpc(format!(
                "{method}: {} {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| IndexerError::Rpc(format!("{method}: no result")))
    }

    fn decode_account_value(value: &Value) -> Result<Option<Vec<u8>>> {
        if value.is_null() {
            return Ok(None);
        }
        let encoded = value
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|d| d.as_str())
            .ok_or_else(|| IndexerError::Rpc("account data missing".to_string()))?;
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| IndexerError::Rpc(format!("account data: {e}")))?;
        Ok(Some(bytes))
    }
}

#[async_trait]
impl ChainRpc for HttpRpcClient {
    async fn get_slot(&self) -> Result<u64> {
        let result = self
            .rpc_call("getSlot", json!([{ "commitment": "finalized" }]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| IndexerError::Rpc("getSlot: non-integer result".to_string()))
    }

    async fn get_signatures_for_address(
        &self,
        address: &str,
        until: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>> {
        let mut opts = json!({ "limit": limit, "commitment": "finalized" });
        if let Some(until) = until {
            opts["until"] = json!(until);
        }
        let result = self
            .rpc_call("getSignaturesForAddress", json!([address, opts]))
            .await?;

        let entries = result
            .as_array()
            .ok_or_else(|| IndexerError::Rpc("getSignaturesForAddress: not an array".to_string()))?;

        let mut infos = Vec::with_capacity(entries.len());
        for entry in entries {
            let signature = entry
                .get("signature")
                .and_then(|s| s.as_str())
                .ok_or_else(|| IndexerError::Rpc("signature entry missing signature".to_string()))?
                .to_string();
            let slot = entry.get("slot").and_then(|s| s.as_u64()).unwrap_or(0);
            let block_time = entry.get("blockTime").and_then(|t| t.as_i64());
            let failed = entry.get("err").map(|e| !e.is_null()).unwrap_or(false);
            infos.push(SignatureInfo {
                signature,
                slot,
                block_time,
                failed,
            });
        }
        Ok(infos)
    }

    async fn get_parsed_transactions(&self, signatures: &[String]) -> Result<Vec<Option<TxRecord>>> {
        let mut records = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let result = self
                .rpc_call(
                    "getTransaction",
                    json!([
                        signature,
                        {
                            "commitment": "finalized",
                            "maxSupportedTransactionVersion": 0,
                            "encoding": "json"
                        }
                    ]),
                )
                .await?;

            if result.is_null() {
                records.push(None);
                continue;
            }

            let slot = result.get("slot").and_then(|s| s.as_u64()).unwrap_or(0);
            let block_time = result.get("blockTime").and_then(|t| t.as_i64());
            let tx_index = result
                .get("transactionIndex")
                .and_then(|i| i.as_i64())
                .map(|i| i as i32);
            let meta = result.get("meta");
            let failed = meta
                .and_then(|m| m.get("err"))
                .map(|e| !e.is_null())
                .unwrap_or(false);
            let log_messages = meta
                .and_then(|m| m.get("logMessages"))
                .and_then(|l| l.as_array())
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(|l| l.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            records.push(Some(TxRecord {
                signature: signature.clone(),
                slot,
                block_time,
                tx_index,
                log_messages,
                failed,
            }));
        }
        Ok(records)
    }

    async fn get_multiple_accounts(&self, addresses: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let result = self
            .rpc_call(
                "getMultipleAccounts",
                json!([
                    addresses,
                    { "commitment": "finalized", "encoding": "base64" }
                ]),
            )
            .await?;

        let values = result
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| IndexerError::Rpc("getMultipleAccounts: missing value".to_string()))?;

        if values.len() != addresses.len() {
            return Err(IndexerError::Rpc(format!(
                "getMultipleAccounts: asked {} got {}",
                addresses.len(),
                values.len()
            )));
        }

        values.iter().map(Self::decode_account_value).collect()
    }

    async fn get_account_info(&self, address: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .rpc_call(
                "getAccountInfo",
                json!([address, { "commitment": "finalized", "encoding": "base64" }]),
            )
            .await?;
        let value = result
            .get("value")
            .ok_or_else(|| IndexerError::Rpc("getAccountInfo: missing value".to_string()))?;
        Self::decode_account_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_account_value_null_means_absent() {
        assert_eq!(
            HttpRpcClient::decode_account_value(&Value::Null).unwrap(),
            None
        );
    }

    #[test]
    fn test_decode_account_value_base64() {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let value = json!({ "data": [encoded, "base64"] });
        assert_eq!(
            HttpRpcClient::decode_account_value(&value).unwrap(),
            Some(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_decode_account_value_rejects_garbage() {
        let value = json!({ "data": ["!!!not-base64!!!", "base64"] });
        assert!(HttpRpcClient::decode_account_value(&value).is_err());
    }
}
