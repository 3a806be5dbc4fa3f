//! # forkbench
//!
//! Deterministic test-synchronization harness for exercising an ephemeral,
//! forked dev node over JSON-RPC. It bridges three asynchrony models —
//! one-shot futures, push-based streams, and RPC round-trips that trigger
//! externally-driven state changes — into primitives a test can `.await`
//! without races or missed events.
//!
//! The pieces:
//! - [`harness::setup_all`] forks a source chain, boots a local RPC server on
//!   an OS-assigned port and wires a client; once per suite, with cheap
//!   per-test contexts via [`harness::SetupAll::setup`].
//! - [`dev::DevClient`] drives block production and state mutation through
//!   the fixed `dev_*` RPC family.
//! - [`observe::observe`] turns a push stream into an awaitable,
//!   at-most-one-pending-value primitive with a recorded emission log.
//! - [`mock::mock_callback`] is the callback-to-future analog for
//!   mock-callback assertions.
//! - [`config::ENVIRONMENTS`] is the fixture table of named fork targets.
//!
//! ```rust,ignore
//! let suite = setup_all(SetupOptions {
//!     endpoint: Some("wss://acala-rpc.aca-api.network".into()),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let context = suite.setup().await?;
//! let dev = context.dev();
//! let hash = dev.new_block(None).await?;
//! context.teardown().await?;
//! suite.teardown_all().await?;
//! ```

pub mod chain;
pub mod client;
pub mod config;
pub mod dev;
pub mod harness;
pub mod mock;
pub mod observe;
pub mod provider;
pub mod rpc;
pub mod slot;
pub mod types;

mod error;

pub use chain::{ChainConfig, ChainEvent, DevChain};
pub use client::{ClientError, HeadsSubscription, WsClient};
pub use dev::{DevClient, NewBlockParams};
pub use error::HarnessError;
pub use harness::{setup_all, Api, ApiContext, RunningContext, SetupAll, SetupOptions};
pub use mock::{mock_callback, MockCallback};
pub use observe::{observe, ObserveError, Observer};
pub use types::{BlockHash, HashOrNumber, Header, StorageValues, TimeSpec};
