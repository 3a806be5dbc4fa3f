//! Fork-source providers.
//!
//! A provider answers header queries for the chain being forked and, for
//! genesis snapshots, supplies the seed storage. Implementations exist for
//! HTTP and WebSocket endpoints, genesis chain-spec URLs, and fixed in-memory
//! fixtures; tests may bring their own.

mod genesis;
mod http;
mod ws;

pub use genesis::GenesisProvider;
pub use http::HttpProvider;
pub use ws::WsProvider;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    config::CONNECT_TIMEOUT,
    error::HarnessError,
    types::{BlockHash, Header, StorageValues},
};

/// Transport selected for a fork source. Resolution is a pure function of the
/// setup options so tests can assert the selection without any network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Genesis { url: String },
    Http { url: String },
    Ws { url: String, connect_timeout: Duration },
    /// Fixed in-memory fixture, only reachable via explicit injection.
    Static,
}

/// Pick the transport for the given options. Exactly one branch applies:
/// a genesis URL wins, then an HTTP(S) endpoint, else WebSocket with the
/// fixed connect timeout.
pub fn resolve(genesis: Option<&str>, endpoint: Option<&str>) -> Transport {
    if let Some(url) = genesis {
        Transport::Genesis { url: url.to_string() }
    } else if endpoint
        .map(|e| e.starts_with("http://") || e.starts_with("https://"))
        .unwrap_or(false)
    {
        Transport::Http {
            url: endpoint.unwrap_or_default().to_string(),
        }
    } else {
        Transport::Ws {
            url: endpoint.unwrap_or_default().to_string(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Open a connection for the resolved transport.
pub async fn connect(transport: Transport) -> Result<Arc<dyn Provider>, HarnessError> {
    match transport {
        Transport::Genesis { url } => Ok(Arc::new(GenesisProvider::fetch(&url).await?)),
        Transport::Http { url } => Ok(Arc::new(HttpProvider::new(&url)?)),
        Transport::Ws {
            url,
            connect_timeout,
        } => Ok(Arc::new(WsProvider::connect(&url, connect_timeout).await?)),
        Transport::Static => Err(HarnessError::InvalidEndpoint(
            "static transport requires an explicitly injected provider".to_string(),
        )),
    }
}

/// The fork-source seam the context factory talks to.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Header for the given hash, or the source's tip when no hash is given.
    async fn header(&self, hash: Option<BlockHash>) -> Result<Option<Header>, HarnessError>;

    /// Current tip hash of the source, if one can be determined.
    async fn head_hash(&self) -> Result<Option<BlockHash>, HarnessError>;

    /// Seed storage for the forked chain (genesis snapshots only).
    async fn initial_storage(&self) -> Result<Option<StorageValues>, HarnessError> {
        Ok(None)
    }

    /// Release the connection to the source. Best-effort.
    async fn disconnect(&self) -> Result<(), HarnessError> {
        Ok(())
    }

    fn transport(&self) -> &Transport;
}

/// Fixed in-memory fork source for offline fixtures and tests.
pub struct StaticProvider {
    header: Header,
    storage: Option<StorageValues>,
    transport: Transport,
}

impl StaticProvider {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            storage: None,
            transport: Transport::Static,
        }
    }

    pub fn with_storage(header: Header, storage: StorageValues) -> Self {
        Self {
            header,
            storage: Some(storage),
            transport: Transport::Static,
        }
    }
}

#[async_trait]
impl Provider for StaticProvider {
    async fn header(&self, hash: Option<BlockHash>) -> Result<Option<Header>, HarnessError> {
        Ok(match hash {
            None => Some(self.header),
            Some(hash) if hash == self.header.hash => Some(self.header),
            Some(_) => None,
        })
    }

    async fn head_hash(&self) -> Result<Option<BlockHash>, HarnessError> {
        Ok(Some(self.header.hash))
    }

    async fn initial_storage(&self) -> Result<Option<StorageValues>, HarnessError> {
        Ok(self.storage.clone())
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_branch_wins() {
        let transport = resolve(Some("https://example.com/spec.json"), Some("wss://node"));
        assert!(matches!(transport, Transport::Genesis { .. }));
    }

    #[test]
    fn http_endpoint_selects_http_transport() {
        let transport = resolve(None, Some("http://example"));
        assert_eq!(
            transport,
            Transport::Http {
                url: "http://example".to_string()
            }
        );
        assert!(matches!(
            resolve(None, Some("https://example")),
            Transport::Http { .. }
        ));
    }

    #[test]
    fn anything_else_selects_ws_with_fixed_timeout() {
        let transport = resolve(None, Some("wss://acala-rpc.aca-api.network"));
        let Transport::Ws {
            url,
            connect_timeout,
        } = transport
        else {
            panic!("expected ws transport");
        };
        assert_eq!(url, "wss://acala-rpc.aca-api.network");
        assert_eq!(connect_timeout, Duration::from_millis(3_000));

        // no endpoint at all still resolves to ws; connecting fails later
        assert!(matches!(resolve(None, None), Transport::Ws { .. }));
    }

    #[tokio::test]
    async fn static_provider_serves_fixture() {
        let header = Header::new(BlockHash::new([1u8; 32]), 5);
        let provider = StaticProvider::new(header);
        assert_eq!(provider.header(None).await.unwrap(), Some(header));
        assert_eq!(
            provider.header(Some(header.hash)).await.unwrap(),
            Some(header)
        );
        assert_eq!(
            provider.header(Some(BlockHash::zero())).await.unwrap(),
            None
        );
        assert_eq!(provider.head_hash().await.unwrap(), Some(header.hash));
    }
}
