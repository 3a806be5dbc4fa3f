use std::{fmt, str::FromStr};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Size in bytes of a block hash.
pub const HASH_SIZE: usize = 32;

/// Fixed-length block identifier, rendered as 0x-prefixed hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash([u8; HASH_SIZE]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid block hash")]
pub struct InvalidBlockHash;

impl BlockHash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn from_hex(value: &str) -> Result<Self, InvalidBlockHash> {
        let raw = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(raw).map_err(|_| InvalidBlockHash)?;
        let bytes: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| InvalidBlockHash)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for BlockHash {
    type Err = InvalidBlockHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(DeError::custom)
    }
}

/// Block header as exchanged with fork sources and the local dev node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub hash: BlockHash,
    pub number: u64,
}

impl Header {
    pub const fn new(hash: BlockHash, number: u64) -> Self {
        Self { hash, number }
    }
}

/// Storage key/value overrides as carried by `dev_setStorage`.
/// A null value deletes the key.
pub type StorageValues = serde_json::Map<String, Value>;

/// Target timestamp for `dev_timeTravel`: ISO-8601 date string or
/// integer milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSpec {
    Timestamp(u64),
    Date(String),
}

impl From<u64> for TimeSpec {
    fn from(millis: u64) -> Self {
        Self::Timestamp(millis)
    }
}

impl From<&str> for TimeSpec {
    fn from(date: &str) -> Self {
        Self::Date(date.to_string())
    }
}

impl From<String> for TimeSpec {
    fn from(date: String) -> Self {
        Self::Date(date)
    }
}

/// Block reference for `dev_setHead`: hash or number.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HashOrNumber {
    Number(u64),
    Hash(BlockHash),
}

impl From<u64> for HashOrNumber {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl From<BlockHash> for HashOrNumber {
    fn from(hash: BlockHash) -> Self {
        Self::Hash(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_round_trip() {
        let hash =
            BlockHash::from_hex("0x0df086f32a9c3399f7fa158d3d77a1790830bd309134c5853718141c969299c7")
                .unwrap();
        assert_eq!(
            hash.to_string(),
            "0x0df086f32a9c3399f7fa158d3d77a1790830bd309134c5853718141c969299c7"
        );
        // hex without prefix is accepted too
        let bare = BlockHash::from_hex(
            "0df086f32a9c3399f7fa158d3d77a1790830bd309134c5853718141c969299c7",
        )
        .unwrap();
        assert_eq!(hash, bare);
    }

    #[test]
    fn hash_rejects_bad_input() {
        assert!(BlockHash::from_hex("0x1234").is_err());
        assert!(BlockHash::from_hex("not-hex").is_err());
    }

    #[test]
    fn header_serde_shape() {
        let header = Header::new(BlockHash::zero(), 42);
        let value = serde_json::to_value(header).unwrap();
        assert_eq!(value["number"], 42);
        assert!(value["hash"].as_str().unwrap().starts_with("0x0000"));
    }
}
