use std::fmt::{Display, Formatter};

use actix_web::{HttpResponse, ResponseError};
use serde_json::{Error as SerdeError, Value};
use thiserror::Error;

use super::handler::Id;
use crate::{chain::ChainError, config::JSON_RPC_VERSION};

#[derive(Error, Debug)]
pub enum InternalRpcError {
    #[error("Internal error: {}", _0)]
    InternalError(&'static str),
    #[error("Invalid body in request")]
    ParseBodyError,
    #[error("Invalid JSON request")]
    InvalidJSONRequest,
    #[error("Invalid request: {}", _0)]
    InvalidRequestStr(&'static str),
    #[error("Invalid params: {}", _0)]
    InvalidJSONParams(#[from] SerdeError),
    #[error("Invalid params: {}", _0)]
    InvalidParams(&'static str),
    #[error("Unexpected parameters for this method")]
    UnexpectedParams,
    #[error("Expected json_rpc set to '2.0'")]
    InvalidVersion,
    #[error("Method '{}' in request was not found", _0)]
    MethodNotFound(String),
    // Custom errors must have a code between -3 and -31999
    #[error("{}", _1)]
    Custom(i16, String),
}

impl InternalRpcError {
    pub fn get_code(&self) -> i16 {
        match self {
            // JSON RPC errors
            Self::ParseBodyError => -32700,
            Self::InvalidJSONRequest | Self::InvalidRequestStr(_) | Self::InvalidVersion => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidJSONParams(_) | Self::InvalidParams(_) | Self::UnexpectedParams => -32602,
            // Internal errors
            Self::InternalError(_) => -32603,
            // Custom errors
            Self::Custom(code, _) => *code,
        }
    }
}

impl From<ChainError> for InternalRpcError {
    fn from(error: ChainError) -> Self {
        let code = match &error {
            ChainError::UnknownBlock(_) => -101,
            ChainError::NotHead(_) => -102,
            ChainError::InvalidTimestamp(_) => -103,
            ChainError::Store(_) | ChainError::Encode(_) => -104,
        };
        Self::Custom(code, error.to_string())
    }
}

#[derive(Debug)]
pub struct RpcResponseError {
    id: Option<Id>,
    error: InternalRpcError,
}

impl RpcResponseError {
    pub fn new<T: Into<InternalRpcError>>(id: Option<Id>, error: T) -> Self {
        Self {
            id,
            error: error.into(),
        }
    }

    pub fn get_id(&self) -> Value {
        match &self.id {
            Some(id) => serde_json::to_value(id).unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    /// Error response object, built by hand so serialization cannot fail.
    pub fn to_json(&self) -> Value {
        let mut error_obj = serde_json::Map::new();
        error_obj.insert(
            "code".to_string(),
            Value::Number(self.error.get_code().into()),
        );
        error_obj.insert(
            "message".to_string(),
            Value::String(format!("{:#}", self.error)),
        );

        let mut obj = serde_json::Map::new();
        obj.insert(
            "jsonrpc".to_string(),
            Value::String(JSON_RPC_VERSION.to_string()),
        );
        obj.insert("id".to_string(), self.get_id());
        obj.insert("error".to_string(), Value::Object(error_obj));
        Value::Object(obj)
    }
}

impl Display for RpcResponseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RpcError[id: {}, error: {:#}]",
            self.get_id(),
            self.error
        )
    }
}

impl ResponseError for RpcResponseError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::Ok().json(self.to_json())
    }
}
