use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Provider, Transport};
use crate::{
    client::{ClientError, WsClient},
    error::HarnessError,
    types::{BlockHash, Header},
};

/// JSON-RPC fork source over a WebSocket connection.
///
/// Connects with the fixed harness connect timeout and no idle timeout: the
/// remote connection is long-lived and may legitimately stay quiet.
pub struct WsProvider {
    client: Arc<WsClient>,
    transport: Transport,
}

impl WsProvider {
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, HarnessError> {
        if url.is_empty() {
            return Err(HarnessError::InvalidEndpoint(
                "no endpoint configured".to_string(),
            ));
        }
        let client = WsClient::connect(url, connect_timeout, None).await?;
        Ok(Self {
            client,
            transport: Transport::Ws {
                url: url.to_string(),
                connect_timeout,
            },
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, HarnessError> {
        self.client.call(method, params).await.map_err(Into::into)
    }
}

#[async_trait]
impl Provider for WsProvider {
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

    async fn disconnect(&self) -> Result<(), HarnessError> {
        self.client.disconnect().await.map_err(Into::into)
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }
}
