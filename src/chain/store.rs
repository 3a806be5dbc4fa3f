use std::path::Path;

use super::ChainError;
use crate::types::{Header, StorageValues};

const HEAD_KEY: &[u8] = b"head";
const STORAGE_KEY: &[u8] = b"storage";
const TIMESTAMP_KEY: &[u8] = b"timestamp";

/// Optional on-disk mirror of the dev chain state.
///
/// The harness is ephemeral: the store is only a materialization for
/// inspection, nothing is resumed from it on construction.
pub struct ChainStore {
    db: sled::Db,
}

impl ChainStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn persist(
        &self,
        head: &Header,
        storage: &StorageValues,
        timestamp: u64,
    ) -> Result<(), ChainError> {
        self.db.insert(HEAD_KEY, serde_json::to_vec(head)?)?;
        self.db.insert(STORAGE_KEY, serde_json::to_vec(storage)?)?;
        self.db.insert(TIMESTAMP_KEY, timestamp.to_le_bytes().to_vec())?;
        self.db.flush()?;
        Ok(())
    }

    pub fn load_head(&self) -> Result<Option<Header>, ChainError> {
        match self.db.get(HEAD_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn load_storage(&self) -> Result<Option<StorageValues>, ChainError> {
        match self.db.get(STORAGE_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }
}
