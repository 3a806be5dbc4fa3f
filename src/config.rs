use std::{collections::HashMap, time::Duration};

use lazy_static::lazy_static;

/// JSON-RPC protocol version carried on every request and response.
pub const JSON_RPC_VERSION: &str = "2.0";

/// Connect timeout for WebSocket connections (fork source and local node).
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(3_000);

/// Idle timeout for the local test connection. A connection that receives
/// no frame for this long is considered dead.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Grace delay before closing the RPC server so in-flight responses drain.
pub const TEARDOWN_GRACE: Duration = Duration::from_millis(100);

/// Timestamp advancement per produced block, in milliseconds.
pub const BLOCK_TIME_MILLIS: u64 = 12_000;

/// When this environment variable is set to any non-empty value, the forked
/// chain runs in-memory only and no persistent store is attached.
pub const RUN_TESTS_WITHOUT_DB: &str = "RUN_TESTS_WITHOUT_DB";

/// Returns true when the persistent store is disabled for this process.
pub fn store_disabled() -> bool {
    std::env::var(RUN_TESTS_WITHOUT_DB)
        .map(|value| !value.is_empty())
        .unwrap_or(false)
}

/// A named fork target: endpoint URL plus the pinned block hash tests fork at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub endpoint: &'static str,
    pub block_hash: &'static str,
}

lazy_static! {
    /// Fixture table of reproducible fork points used by test suites.
    pub static ref ENVIRONMENTS: HashMap<&'static str, Environment> = {
        let mut map = HashMap::new();
        map.insert(
            "acala",
            Environment {
                endpoint: "wss://acala-rpc.aca-api.network",
                // 3,800,000
                block_hash: "0x0df086f32a9c3399f7fa158d3d77a1790830bd309134c5853718141c969299c7",
            },
        );
        map.insert(
            "acalaV15",
            Environment {
                endpoint: "wss://acala-rpc.aca-api.network",
                // 6,800,000
                block_hash: "0x6c74912ce35793b05980f924c3a4cdf1f96c66b2bedd0c7b7378571e60918145",
            },
        );
        map.insert(
            "rococo",
            Environment {
                endpoint: "wss://rococo-rpc.polkadot.io",
                block_hash: "0xd7fef00504decd41d5d2e9a04346f6bc639fd428083e3ca941f636a8f88d456a",
            },
        );
        map
    };
}

/// Look up a fork target by name.
pub fn environment(name: &str) -> Option<&'static Environment> {
    ENVIRONMENTS.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockHash;

    #[test]
    fn registry_contains_fixtures() {
        assert_eq!(ENVIRONMENTS.len(), 3);
        let acala = environment("acala").unwrap();
        assert_eq!(acala.endpoint, "wss://acala-rpc.aca-api.network");
        assert!(environment("kusama").is_none());
    }

    #[test]
    fn registry_hashes_parse() {
        for env in ENVIRONMENTS.values() {
            assert!(BlockHash::from_hex(env.block_hash).is_ok());
        }
    }
}
