use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};
use url::Url;

use super::{Provider, Transport};
use crate::{
    client::ClientError,
    error::HarnessError,
    types::{BlockHash, Header},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC fork source over plain HTTP POST.
pub struct HttpProvider {
    client: reqwest::Client,
    url: Url,
    transport: Transport,
    next_id: AtomicU64,
}

impl HttpProvider {
    pub fn new(endpoint: &str) -> Result<Self, HarnessError> {
        let url = Url::parse(endpoint)
            .and_then(|url| url.join("json_rpc"))
            .map_err(|e| HarnessError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url,
            transport: Transport::Http {
                url: endpoint.to_string(),
            },
            next_id: AtomicU64::new(0),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, HarnessError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("http rpc call {} -> {}", method, self.url);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: Value = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(HarnessError::Client(ClientError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data: error.get("data").cloned(),
            }));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn header(&self, hash: Option<BlockHash>) -> Result<Option<Header>, HarnessError> {
        let result = self.call("chain_getHeader", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let header = serde_json::from_value(result)
            .map_err(|e| HarnessError::Client(ClientError::InvalidResponse(e.to_string())))?;
        Ok(Some(header))
    }

    async fn head_hash(&self) -> Result<Option<BlockHash>, HarnessError> {
        let result = self.call("chain_getBlockHash", json!([])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let hash = serde_json::from_value(result)
            .map_err(|e| HarnessError::Client(ClientError::InvalidResponse(e.to_string())))?;
        Ok(Some(hash))
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }
}
