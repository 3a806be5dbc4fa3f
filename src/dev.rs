//! Dev-control surface: the fixed `dev_*` JSON-RPC family that drives block
//! production and state mutation on the local node.
//!
//! Method names and positional parameter order are wire contracts shared with
//! the server registry; see `rpc::methods`.

use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    client::{ClientError, WsClient},
    types::{BlockHash, HashOrNumber, StorageValues, TimeSpec},
};

/// Parameters of `dev_newBlock`. `to` targets an absolute block number and
/// wins over `count`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBlockParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<u64>,
}

/// Typed client for the dev-control calls, layered over an open connection.
///
/// Calls are fire-and-await with no client-side retry: transport failures and
/// server-side rejections surface directly to the caller.
#[derive(Clone)]
pub struct DevClient {
    client: Arc<WsClient>,
}

impl DevClient {
    pub fn new(client: Arc<WsClient>) -> Self {
        Self { client }
    }

    /// Produce one or more blocks; resolves with the hash of the last one.
    pub async fn new_block(
        &self,
        param: Option<NewBlockParams>,
    ) -> Result<BlockHash, ClientError> {
        trace!("dev_newBlock {:?}", param);
        let result = self.client.call("dev_newBlock", (param,)).await?;
        serde_json::from_value(result).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Apply storage overrides, optionally targeting a block hash.
    pub async fn set_storage(
        &self,
        values: StorageValues,
        at: Option<BlockHash>,
    ) -> Result<BlockHash, ClientError> {
        let result = self.client.call("dev_setStorage", (values, at)).await?;
        serde_json::from_value(result).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Shift the chain clock; resolves with the new timestamp in millis.
    pub async fn time_travel(&self, date: impl Into<TimeSpec>) -> Result<u64, ClientError> {
        let result = self.client.call("dev_timeTravel", (date.into(),)).await?;
        result
            .as_u64()
            .ok_or_else(|| ClientError::InvalidResponse("timestamp must be an integer".into()))
    }

    /// Move the head to a known block hash or number.
    pub async fn set_head(
        &self,
        target: impl Into<HashOrNumber>,
    ) -> Result<BlockHash, ClientError> {
        let result = self.client.call("dev_setHead", (target.into(),)).await?;
        serde_json::from_value(result).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}
