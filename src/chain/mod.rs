//! Manual-mode dev chain double.
//!
//! `DevChain` tracks the forked head, produced blocks, storage overrides and
//! the chain timestamp. It never produces blocks autonomously; all production
//! is explicitly triggered through `new_block`. Runtime execution, inherents
//! and state diffs are out of scope: this is the state the dev RPC surface
//! mutates and tests assert against.

mod store;

pub use store::ChainStore;

use std::collections::HashMap;

use log::debug;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use crate::{
    config::BLOCK_TIME_MILLIS,
    types::{BlockHash, HashOrNumber, Header, StorageValues, TimeSpec},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("block {0} not found")]
    UnknownBlock(String),
    #[error("block {0} is not the current head")]
    NotHead(BlockHash),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("store error: {0}")]
    Store(#[from] sled::Error),
    #[error("store encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Chain construction flags, resolved centrally from the setup options.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub mock_signature_host: bool,
    pub allow_unresolved_imports: bool,
    /// Opaque type-registry overrides handed through to API layers.
    pub registered_types: Value,
    pub runtime_log_level: Option<u8>,
    pub process_queued_messages: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            mock_signature_host: false,
            allow_unresolved_imports: false,
            registered_types: Value::Object(Default::default()),
            runtime_log_level: None,
            process_queued_messages: true,
        }
    }
}

/// Events published on every head change.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    NewHead(Header),
}

struct ChainState {
    head: Header,
    blocks: HashMap<BlockHash, Header>,
    numbers: HashMap<u64, BlockHash>,
    storage: StorageValues,
    timestamp: u64,
}

pub struct DevChain {
    config: ChainConfig,
    state: RwLock<ChainState>,
    events: broadcast::Sender<ChainEvent>,
    store: Option<ChainStore>,
}

impl DevChain {
    /// Create a chain pinned to the given fork header.
    ///
    /// `seed_storage` preloads storage overrides (genesis snapshots); `store`
    /// attaches the optional on-disk state mirror.
    pub fn new(
        fork: Header,
        config: ChainConfig,
        store: Option<ChainStore>,
        seed_storage: Option<StorageValues>,
    ) -> Result<Self, ChainError> {
        let mut blocks = HashMap::new();
        let mut numbers = HashMap::new();
        blocks.insert(fork.hash, fork);
        numbers.insert(fork.number, fork.hash);

        let state = ChainState {
            head: fork,
            blocks,
            numbers,
            storage: seed_storage.unwrap_or_default(),
            timestamp: 0,
        };
        if let Some(store) = &store {
            store.persist(&state.head, &state.storage, state.timestamp)?;
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            state: RwLock::new(state),
            events,
            store,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Whether a persistent store backs this instance.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Subscribe to head-change events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Produce blocks on top of the current head and return the hash of the
    /// last one. `to` wins over `count` and targets an absolute block number;
    /// a target at or below the head produces nothing.
    pub async fn new_block(
        &self,
        count: Option<u64>,
        to: Option<u64>,
    ) -> Result<BlockHash, ChainError> {
        let mut state = self.state.write().await;
        let count = match to {
            Some(to) => to.saturating_sub(state.head.number),
            None => count.unwrap_or(1),
        };

        for _ in 0..count {
            let number = state.head.number + 1;
            let header = Header::new(synthetic_hash(&state.head.hash, number), number);
            state.blocks.insert(header.hash, header);
            state.numbers.insert(number, header.hash);
            state.head = header;
            state.timestamp += BLOCK_TIME_MILLIS;
            debug!("produced block #{} {}", header.number, header.hash);
            let _ = self.events.send(ChainEvent::NewHead(header));
        }

        self.persist(&state)?;
        Ok(state.head.hash)
    }

    /// Apply storage overrides at the head. A null value deletes the key.
    /// Targeting any block other than the current head is rejected.
    pub async fn set_storage(
        &self,
        values: StorageValues,
        at: Option<BlockHash>,
    ) -> Result<BlockHash, ChainError> {
        let mut state = self.state.write().await;
        if let Some(at) = at {
            if at != state.head.hash {
                return Err(if state.blocks.contains_key(&at) {
                    ChainError::NotHead(at)
                } else {
                    ChainError::UnknownBlock(at.to_string())
                });
            }
        }

        for (key, value) in values {
            if value.is_null() {
                state.storage.remove(&key);
            } else {
                state.storage.insert(key, value);
            }
        }

        self.persist(&state)?;
        Ok(state.head.hash)
    }

    /// Set the chain timestamp and return it in milliseconds.
    pub async fn time_travel(&self, spec: TimeSpec) -> Result<u64, ChainError> {
        let timestamp = match spec {
            TimeSpec::Timestamp(millis) => millis,
            TimeSpec::Date(date) => parse_iso_millis(&date)?,
        };

        let mut state = self.state.write().await;
        state.timestamp = timestamp;
        self.persist(&state)?;
        Ok(timestamp)
    }

    /// Move the head to a previously recorded block. History is retained, so
    /// the head can be moved forward again; producing a new block from an
    /// older head supersedes the number index above it.
    pub async fn set_head(&self, target: HashOrNumber) -> Result<Header, ChainError> {
        let mut state = self.state.write().await;
        let header = match target {
            HashOrNumber::Hash(hash) => state
                .blocks
                .get(&hash)
                .copied()
                .ok_or_else(|| ChainError::UnknownBlock(hash.to_string()))?,
            HashOrNumber::Number(number) => {
                let hash = state
                    .numbers
                    .get(&number)
                    .copied()
                    .ok_or_else(|| ChainError::UnknownBlock(format!("#{}", number)))?;
                state
                    .blocks
                    .get(&hash)
                    .copied()
                    .ok_or_else(|| ChainError::UnknownBlock(hash.to_string()))?
            }
        };

        state.head = header;
        debug!("head set to #{} {}", header.number, header.hash);
        let _ = self.events.send(ChainEvent::NewHead(header));
        self.persist(&state)?;
        Ok(header)
    }

    pub async fn head(&self) -> Header {
        self.state.read().await.head
    }

    pub async fn timestamp(&self) -> u64 {
        self.state.read().await.timestamp
    }

    /// Header for the given hash, or the head when no hash is given.
    pub async fn header(&self, hash: Option<BlockHash>) -> Option<Header> {
        let state = self.state.read().await;
        match hash {
            Some(hash) => state.blocks.get(&hash).copied(),
            None => Some(state.head),
        }
    }

    /// Hash at the given number, or the head hash when no number is given.
    pub async fn hash_by_number(&self, number: Option<u64>) -> Option<BlockHash> {
        let state = self.state.read().await;
        match number {
            Some(number) => state.numbers.get(&number).copied(),
            None => Some(state.head.hash),
        }
    }

    pub async fn storage(&self, key: &str) -> Option<Value> {
        self.state.read().await.storage.get(key).cloned()
    }

    pub async fn storage_snapshot(&self) -> StorageValues {
        self.state.read().await.storage.clone()
    }

    fn persist(&self, state: &ChainState) -> Result<(), ChainError> {
        if let Some(store) = &self.store {
            store.persist(&state.head, &state.storage, state.timestamp)?;
        }
        Ok(())
    }
}

/// Deterministic block hash: blake3 of the parent hash and the block number.
fn synthetic_hash(parent: &BlockHash, number: u64) -> BlockHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(parent.as_bytes());
    hasher.update(&number.to_le_bytes());
    BlockHash::new(*hasher.finalize().as_bytes())
}

fn parse_iso_millis(date: &str) -> Result<u64, ChainError> {
    let millis = if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(date) {
        parsed.timestamp_millis()
    } else {
        // bare dates are accepted as midnight UTC
        let day = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| ChainError::InvalidTimestamp(format!("{date}: {e}")))?;
        day.and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .ok_or_else(|| ChainError::InvalidTimestamp(date.to_string()))?
    };
    u64::try_from(millis).map_err(|_| ChainError::InvalidTimestamp(date.to_string()))
}
