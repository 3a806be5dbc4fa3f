use thiserror::Error;

use crate::{chain::ChainError, client::ClientError, types::BlockHash};

/// Setup-layer failures surfaced by the context factory. All are fatal and
/// never retried internally.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("cannot find header for {target}")]
    HeaderNotFound { target: String },
    #[error("cannot find block hash")]
    BlockHashUnavailable,
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("invalid genesis snapshot: {0}")]
    InvalidGenesis(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn header_not_found(hash: Option<BlockHash>) -> Self {
        Self::HeaderNotFound {
            target: hash
                .map(|hash| hash.to_string())
                .unwrap_or_else(|| "tip".to_string()),
        }
    }
}
