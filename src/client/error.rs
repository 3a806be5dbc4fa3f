use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Connection-layer failures. Transport problems and server-reported RPC
/// errors are kept distinct; callers own any retry policy.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("connection idle timeout")]
    IdleTimeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("websocket transport error: {0}")]
    Transport(String),
    #[error("json error: {0}")]
    Json(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl ClientError {
    /// True for connection-level failures, false for server-reported errors.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Rpc { .. })
    }
}

impl From<tokio_tungstenite_wasm::Error> for ClientError {
    fn from(error: tokio_tungstenite_wasm::Error) -> Self {
        Self::Transport(error.to_string())
    }
}
