use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::{Provider, Transport};
use crate::{
    error::HarnessError,
    types::{BlockHash, Header, StorageValues},
};

/// Fork source built from a genesis chain-spec snapshot.
///
/// The snapshot is a chain-spec JSON whose `genesis.raw.top` map seeds the
/// forked chain's storage. The synthetic genesis header has number 0 and a
/// hash derived from the canonical (key-sorted) storage map.
#[derive(Debug)]
pub struct GenesisProvider {
    header: Header,
    storage: StorageValues,
    transport: Transport,
}

impl GenesisProvider {
    pub async fn fetch(url: &str) -> Result<Self, HarnessError> {
        debug!("fetching genesis snapshot from {}", url);
        let spec: Value = reqwest::get(url)
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::from_spec(url, &spec)
    }

    pub fn from_spec(url: &str, spec: &Value) -> Result<Self, HarnessError> {
        let top = spec
            .pointer("/genesis/raw/top")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                HarnessError::InvalidGenesis("missing genesis.raw.top storage map".to_string())
            })?;

        let mut hasher = blake3::Hasher::new();
        for (key, value) in top {
            hasher.update(key.as_bytes());
            hasher.update(value.to_string().as_bytes());
        }
        let header = Header::new(BlockHash::new(*hasher.finalize().as_bytes()), 0);

        Ok(Self {
            header,
            storage: top.clone(),
            transport: Transport::Genesis {
                url: url.to_string(),
            },
        })
    }

    pub fn genesis_hash(&self) -> BlockHash {
        self.header.hash
    }
}

#[async_trait]
impl Provider for GenesisProvider {
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
        Ok(Some(self.storage.clone()))
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }
}
