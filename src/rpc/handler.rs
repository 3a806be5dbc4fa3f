use std::collections::HashMap;

use futures::future::BoxFuture;
use log::{trace, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::{InternalRpcError, RpcResponseError};
use crate::config::JSON_RPC_VERSION;

/// JSON-RPC request id: number or string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Id {
    Number(u64),
    String(String),
}

#[derive(Deserialize, Debug)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Id>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

pub type HandlerResult = Result<Value, InternalRpcError>;

/// A registered method: borrows the shared data for the duration of one call.
pub type Handler<T> = for<'a> fn(&'a T, Value) -> BoxFuture<'a, HandlerResult>;

/// Wrap an `async fn(&T, Value) -> HandlerResult` into a [`Handler`].
#[macro_export]
macro_rules! async_handler {
    ($handler:path) => {
        |data, params| Box::pin($handler(data, params))
    };
}

/// JSON-RPC 2.0 method registry and dispatcher.
pub struct RpcHandler<T: Send + Sync + 'static> {
    methods: HashMap<String, Handler<T>>,
    data: T,
}

impl<T: Send + Sync + 'static> RpcHandler<T> {
    pub fn new(data: T) -> Self {
        Self {
            methods: HashMap::new(),
            data,
        }
    }

    pub fn register_method(&mut self, name: &str, handler: Handler<T>) {
        if self.methods.insert(name.to_string(), handler).is_some() {
            warn!("method '{}' was already registered", name);
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn get_data(&self) -> &T {
        &self.data
    }

    /// Parse one request from raw bytes and execute it.
    pub async fn handle_request(&self, body: &[u8]) -> Result<Value, RpcResponseError> {
        let request: Value = serde_json::from_slice(body)
            .map_err(|_| RpcResponseError::new(None, InternalRpcError::ParseBodyError))?;
        if request.is_array() {
            return Err(RpcResponseError::new(
                None,
                InternalRpcError::InvalidRequestStr("batch requests are not supported"),
            ));
        }
        let request: RpcRequest = serde_json::from_value(request)
            .map_err(|_| RpcResponseError::new(None, InternalRpcError::InvalidJSONRequest))?;
        self.execute(request).await
    }

    pub async fn execute(&self, request: RpcRequest) -> Result<Value, RpcResponseError> {
        let id = request.id;
        if request.jsonrpc != JSON_RPC_VERSION {
            return Err(RpcResponseError::new(id, InternalRpcError::InvalidVersion));
        }

        let handler = self.methods.get(&request.method).ok_or_else(|| {
            RpcResponseError::new(
                id.clone(),
                InternalRpcError::MethodNotFound(request.method.clone()),
            )
        })?;

        trace!("executing method '{}'", request.method);
        let result = handler(&self.data, request.params)
            .await
            .map_err(|error| RpcResponseError::new(id.clone(), error))?;

        Ok(json!({
            "jsonrpc": JSON_RPC_VERSION,
            "id": id,
            "result": result,
        }))
    }
}

/// Read one positional parameter; missing entries read as null, so `Option`
/// targets turn them into `None`.
pub fn positional_param<P: DeserializeOwned>(
    params: &Value,
    index: usize,
) -> Result<P, InternalRpcError> {
    let value = match params {
        Value::Null => Value::Null,
        Value::Array(values) => values.get(index).cloned().unwrap_or(Value::Null),
        _ => {
            return Err(InternalRpcError::InvalidParams(
                "expected positional parameters",
            ))
        }
    };
    serde_json::from_value(value).map_err(InternalRpcError::InvalidJSONParams)
}

pub fn require_no_params(params: &Value) -> Result<(), InternalRpcError> {
    match params {
        Value::Null => Ok(()),
        Value::Array(values) if values.is_empty() => Ok(()),
        _ => Err(InternalRpcError::UnexpectedParams),
    }
}
