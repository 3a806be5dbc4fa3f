//! Context factory: forks a source chain, boots an ephemeral RPC server and
//! wires test clients to it.
//!
//! `setup_all` is the per-suite entry point (expensive: talks to the fork
//! source); `SetupAll::setup*` are the per-test entry points (cheap: fresh
//! server and connection against the already-forked source). Teardown is
//! idempotent and strictly LIFO with respect to setup.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, info, warn};
use serde_json::Value;
use tokio::{sync::Mutex, time::sleep};

use crate::{
    chain::{ChainConfig, ChainStore, DevChain},
    client::{ClientError, HeadsSubscription, WsClient},
    config::{self, CONNECT_TIMEOUT, IDLE_TIMEOUT, TEARDOWN_GRACE},
    dev::DevClient,
    error::HarnessError,
    provider::{self, Provider, Transport},
    rpc::RpcServer,
    types::{BlockHash, Header},
};

/// Per-suite setup options. Every field is optional; defaults are resolved
/// once, centrally, by the factory.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Fork-source endpoint. `http(s)://` selects the HTTP transport,
    /// anything else the WebSocket transport.
    pub endpoint: Option<String>,
    /// Block to fork at; defaults to the source's tip, pinned at first setup.
    pub block_hash: Option<BlockHash>,
    pub mock_signature_host: Option<bool>,
    pub allow_unresolved_imports: Option<bool>,
    /// Genesis chain-spec URL. Takes precedence over `endpoint`.
    pub genesis: Option<String>,
    /// Opaque type-registry overrides handed through to API layers.
    pub registered_types: Option<Value>,
    pub runtime_log_level: Option<u8>,
    pub process_queued_messages: Option<bool>,
    /// Path of the persistent store, e.g. "e2e-tests-db". Suppressed by the
    /// `RUN_TESTS_WITHOUT_DB` environment variable.
    pub db: Option<PathBuf>,
}

impl SetupOptions {
    /// Options pre-filled from the named registry environment.
    pub fn for_environment(name: &str) -> Option<Self> {
        let env = config::environment(name)?;
        let block_hash = BlockHash::from_hex(env.block_hash).ok()?;
        Some(Self {
            endpoint: Some(env.endpoint.to_string()),
            block_hash: Some(block_hash),
            ..Default::default()
        })
    }

    /// The transport these options resolve to. Pure: no network I/O.
    pub fn transport(&self) -> Transport {
        provider::resolve(self.genesis.as_deref(), self.endpoint.as_deref())
    }

    fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            mock_signature_host: self.mock_signature_host.unwrap_or(false),
            allow_unresolved_imports: self.allow_unresolved_imports.unwrap_or(false),
            registered_types: self
                .registered_types
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
            runtime_log_level: self.runtime_log_level,
            process_queued_messages: self.process_queued_messages.unwrap_or(true),
        }
    }
}

/// Fork the configured source and return the per-suite handle.
///
/// Fails with [`HarnessError::HeaderNotFound`] when the source cannot serve a
/// header for the requested block (or for its tip when none was requested).
pub async fn setup_all(options: SetupOptions) -> Result<SetupAll, HarnessError> {
    let provider = provider::connect(options.transport()).await?;
    SetupAll::with_provider(provider, options).await
}

/// Per-suite handle: owns the fork-source connection and hands out fresh
/// per-test contexts.
pub struct SetupAll {
    provider: Arc<dyn Provider>,
    options: SetupOptions,
    header: Header,
    pinned: Mutex<Option<BlockHash>>,
    genesis_mode: bool,
}

impl SetupAll {
    /// Like [`setup_all`], with an explicitly injected fork source.
    pub async fn with_provider(
        provider: Arc<dyn Provider>,
        options: SetupOptions,
    ) -> Result<Self, HarnessError> {
        let header = provider
            .header(options.block_hash)
            .await?
            .ok_or_else(|| HarnessError::header_not_found(options.block_hash))?;
        info!("forking at block #{} ({})", header.number, header.hash);

        let genesis_mode = matches!(provider.transport(), Transport::Genesis { .. });
        Ok(Self {
            pinned: Mutex::new(options.block_hash),
            provider,
            options,
            header,
            genesis_mode,
        })
    }

    /// Fresh raw per-test context: chain instance, ephemeral RPC server and
    /// an open local connection.
    pub async fn setup(&self) -> Result<RunningContext, HarnessError> {
        let pinned = {
            let mut pinned = self.pinned.lock().await;
            match *pinned {
                Some(hash) => hash,
                None => {
                    let hash = self
                        .provider
                        .head_hash()
                        .await?
                        .ok_or(HarnessError::BlockHashUnavailable)?;
                    *pinned = Some(hash);
                    hash
                }
            }
        };

        let store = match (&self.options.db, config::store_disabled()) {
            (Some(path), false) => Some(ChainStore::open(path)?),
            _ => None,
        };
        let chain = Arc::new(DevChain::new(
            Header::new(pinned, self.header.number),
            self.options.chain_config(),
            store,
            self.provider.initial_storage().await?,
        )?);

        if self.genesis_mode {
            // build the first block on top of the snapshot
            chain.new_block(None, None).await?;
        }

        let server = RpcServer::bind(chain.clone(), 0).await?;
        let port = server.port();
        let ws = WsClient::connect(
            &format!("ws://127.0.0.1:{}/json_rpc", port),
            CONNECT_TIMEOUT,
            Some(IDLE_TIMEOUT),
        )
        .await?;
        debug!("test context ready on port {}", port);

        Ok(RunningContext {
            chain,
            port,
            ws,
            server,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Per-test context with the full-featured typed client layered on top,
    /// gated on a readiness round-trip.
    pub async fn setup_api(&self) -> Result<ApiContext, HarnessError> {
        let inner = self.setup().await?;
        let api = Api::ready(inner.ws.clone()).await?;
        Ok(ApiContext { api, inner })
    }

    /// Per-test context with a dedicated subscription connection layered over
    /// the same server.
    pub async fn setup_subscriptions(&self) -> Result<SubscriptionsContext, HarnessError> {
        let inner = self.setup().await?;
        let subscriptions = WsClient::connect(
            &format!("ws://127.0.0.1:{}/json_rpc", inner.port),
            CONNECT_TIMEOUT,
            Some(IDLE_TIMEOUT),
        )
        .await?;
        Ok(SubscriptionsContext {
            subscriptions,
            inner,
        })
    }

    /// Release the fork-source connection.
    pub async fn teardown_all(&self) -> Result<(), HarnessError> {
        sleep(TEARDOWN_GRACE).await;
        self.provider.disconnect().await
    }

    pub fn fork_header(&self) -> Header {
        self.header
    }
}

/// One running per-test context. Owned by the test that created it; release
/// with [`RunningContext::teardown`] before creating the next one.
pub struct RunningContext {
    chain: Arc<DevChain>,
    port: u16,
    ws: Arc<WsClient>,
    server: RpcServer,
    torn_down: AtomicBool,
}

impl RunningContext {
    pub fn chain(&self) -> &Arc<DevChain> {
        &self.chain
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ws(&self) -> &Arc<WsClient> {
        &self.ws
    }

    pub fn dev(&self) -> DevClient {
        DevClient::new(self.ws.clone())
    }

    pub async fn subscribe_new_heads(&self) -> Result<HeadsSubscription, ClientError> {
        self.ws.subscribe_new_heads().await
    }

    /// Disconnect the local client, wait the grace delay so in-flight
    /// responses drain, then stop the server. Idempotent: a second call
    /// performs no observable action.
    pub async fn teardown(&self) -> Result<(), HarnessError> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(error) = self.ws.disconnect().await {
            warn!("test connection did not close cleanly: {}", error);
        }
        sleep(TEARDOWN_GRACE).await;
        self.server.stop().await;
        Ok(())
    }
}

/// Full-featured typed client over the raw connection.
pub struct Api {
    client: Arc<WsClient>,
}

impl Api {
    /// Layer over an open connection and wait until the node answers.
    pub async fn ready(client: Arc<WsClient>) -> Result<Self, ClientError> {
        let name = client.call("system_name", Vec::<Value>::new()).await?;
        debug!("connected to {}", name);
        Ok(Self { client })
    }

    pub fn client(&self) -> &Arc<WsClient> {
        &self.client
    }

    pub fn dev(&self) -> DevClient {
        DevClient::new(self.client.clone())
    }

    pub async fn system_name(&self) -> Result<String, ClientError> {
        let result = self.client.call("system_name", Vec::<Value>::new()).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse("system_name must be a string".into()))
    }

    pub async fn get_header(&self, hash: Option<BlockHash>) -> Result<Option<Header>, ClientError> {
        let result = self.client.call("chain_getHeader", (hash,)).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    pub async fn get_block_hash(&self, number: Option<u64>) -> Result<Option<BlockHash>, ClientError> {
        let result = self.client.call("chain_getBlockHash", (number,)).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.client.disconnect().await
    }
}

/// Per-test context with the typed [`Api`] layered on top.
pub struct ApiContext {
    api: Api,
    inner: RunningContext,
}

impl ApiContext {
    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn chain(&self) -> &Arc<DevChain> {
        self.inner.chain()
    }

    pub fn ws(&self) -> &Arc<WsClient> {
        self.inner.ws()
    }

    pub fn port(&self) -> u16 {
        self.inner.port()
    }

    pub fn dev(&self) -> DevClient {
        self.api.dev()
    }

    /// Disconnect the layered client first, then the raw context.
    pub async fn teardown(&self) -> Result<(), HarnessError> {
        if let Err(error) = self.api.disconnect().await {
            warn!("api client did not disconnect cleanly: {}", error);
        }
        self.inner.teardown().await
    }
}

/// Per-test context with a dedicated subscription connection.
pub struct SubscriptionsContext {
    subscriptions: Arc<WsClient>,
    inner: RunningContext,
}

impl SubscriptionsContext {
    /// The dedicated subscription connection.
    pub fn client(&self) -> &Arc<WsClient> {
        &self.subscriptions
    }

    pub fn chain(&self) -> &Arc<DevChain> {
        self.inner.chain()
    }

    pub fn ws(&self) -> &Arc<WsClient> {
        self.inner.ws()
    }

    pub fn port(&self) -> u16 {
        self.inner.port()
    }

    pub fn dev(&self) -> DevClient {
        self.inner.dev()
    }

    pub async fn new_heads(&self) -> Result<HeadsSubscription, ClientError> {
        self.subscriptions.subscribe_new_heads().await
    }

    /// Destroy the subscription layer first, then the raw context.
    pub async fn teardown(&self) -> Result<(), HarnessError> {
        if let Err(error) = self.subscriptions.disconnect().await {
            warn!("subscription client did not disconnect cleanly: {}", error);
        }
        self.inner.teardown().await
    }
}
