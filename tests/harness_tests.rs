//! End-to-end tests: fork a source, boot the ephemeral server, drive the dev
//! control surface and synchronize on its effects.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;
use tokio::time::timeout;

use forkbench::{
    observe,
    provider::{GenesisProvider, Provider, StaticProvider, Transport},
    BlockHash, ClientError, HarnessError, Header, NewBlockParams, SetupAll, SetupOptions,
    StorageValues, WsClient,
};

const WAIT: Duration = Duration::from_secs(10);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fork_header() -> Header {
    Header::new(BlockHash::new([7u8; 32]), 5_000)
}

async fn static_suite() -> Result<SetupAll> {
    init_logging();
    let provider = Arc::new(StaticProvider::new(fork_header()));
    Ok(SetupAll::with_provider(provider, SetupOptions::default()).await?)
}

#[tokio::test]
async fn dev_calls_drive_the_forked_chain() -> Result<()> {
    let suite = static_suite().await?;
    let context = suite.setup().await?;
    let dev = context.dev();

    // block production advances the head and returns the head hash
    let hash = dev.new_block(None).await?;
    let head = context.chain().head().await;
    assert_eq!(head.number, 5_001);
    assert_eq!(head.hash, hash);

    let hash = dev
        .new_block(Some(NewBlockParams {
            count: Some(3),
            to: None,
        }))
        .await?;
    assert_eq!(context.chain().head().await.number, 5_004);
    assert_eq!(context.chain().head().await.hash, hash);

    // storage overrides land on the head
    let mut values = StorageValues::new();
    values.insert("0xdeadbeef".into(), json!("0x2a"));
    dev.set_storage(values, None).await?;
    assert_eq!(
        context.chain().storage("0xdeadbeef").await,
        Some(json!("0x2a"))
    );

    // time travel returns the applied timestamp
    let millis = dev.time_travel("2024-06-01T12:00:00Z").await?;
    assert_eq!(context.chain().timestamp().await, millis);

    // rewind to the fork point
    dev.set_head(5_000u64).await?;
    assert_eq!(context.chain().head().await, fork_header());

    context.teardown().await?;
    suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn server_rejections_carry_code_and_message() -> Result<()> {
    let suite = static_suite().await?;
    let context = suite.setup().await?;

    let error = context.dev().set_head(123_456u64).await.unwrap_err();
    match &error {
        ClientError::Rpc { code, message, .. } => {
            assert_eq!(*code, -101);
            assert!(message.contains("not found"), "message: {}", message);
        }
        other => panic!("expected rpc error, got {:?}", other),
    }
    assert!(!error.is_transport());

    context.teardown().await?;
    suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn observer_synchronizes_on_head_subscriptions() -> Result<()> {
    let suite = static_suite().await?;
    let context = suite.setup_subscriptions().await?;
    let dev = context.dev();

    let heads = context.new_heads().await?;
    let observer = observe(heads);

    let pending = observer.next_value();
    dev.new_block(None).await?;
    let header = timeout(WAIT, pending).await??;
    assert_eq!(header.number, 5_001);

    // the settled slot was replaced: a new future waits for a new emission
    let pending = observer.next_value();
    assert!(pending.clone().now_or_never().is_none());
    dev.new_block(None).await?;
    let header = timeout(WAIT, pending).await??;
    assert_eq!(header.number, 5_002);

    // emission log grew in delivery order
    let numbers: Vec<u64> = observer
        .get_emissions()
        .into_iter()
        .map(|header| header.number)
        .collect();
    assert_eq!(numbers, vec![5_001, 5_002]);

    observer.unsubscribe();
    context.teardown().await?;
    suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn api_context_layers_over_the_raw_connection() -> Result<()> {
    let suite = static_suite().await?;
    let context = suite.setup_api().await?;

    let name = context.api().system_name().await?;
    assert!(name.starts_with("forkbench/"), "name: {}", name);

    let head = context.api().get_header(None).await?.unwrap();
    assert_eq!(head, fork_header());

    context.dev().new_block(None).await?;
    let head = context.api().get_header(None).await?.unwrap();
    assert_eq!(head.number, 5_001);
    assert_eq!(
        context.api().get_block_hash(Some(5_001)).await?,
        Some(head.hash)
    );

    context.teardown().await?;
    suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn a_running_instance_is_a_valid_fork_source() -> Result<()> {
    let upstream_suite = static_suite().await?;
    let upstream = upstream_suite.setup().await?;
    upstream
        .dev()
        .new_block(Some(NewBlockParams {
            count: Some(2),
            to: None,
        }))
        .await?;
    let upstream_head = upstream.chain().head().await;

    // fork it over HTTP
    let options = SetupOptions {
        endpoint: Some(format!("http://127.0.0.1:{}", upstream.port())),
        ..Default::default()
    };
    assert!(matches!(options.transport(), Transport::Http { .. }));
    let suite = forkbench::setup_all(options).await?;
    assert_eq!(suite.fork_header(), upstream_head);

    let context = suite.setup().await?;
    assert_eq!(context.chain().head().await, upstream_head);
    context.teardown().await?;
    suite.teardown_all().await?;

    // and over WebSocket
    let options = SetupOptions {
        endpoint: Some(format!("ws://127.0.0.1:{}/json_rpc", upstream.port())),
        ..Default::default()
    };
    assert!(matches!(options.transport(), Transport::Ws { .. }));
    let suite = forkbench::setup_all(options).await?;
    assert_eq!(suite.fork_header(), upstream_head);
    suite.teardown_all().await?;

    upstream.teardown().await?;
    upstream_suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn genesis_mode_builds_exactly_one_block_eagerly() -> Result<()> {
    let spec = json!({
        "name": "dev",
        "id": "dev",
        "genesis": { "raw": { "top": { "0x3a636f6465": "0x00" } } }
    });
    init_logging();
    let provider = Arc::new(GenesisProvider::from_spec("https://example/spec.json", &spec)?);
    let suite = SetupAll::with_provider(provider, SetupOptions::default()).await?;

    let context = suite.setup().await?;
    // one block was produced before any test-issued newBlock
    assert_eq!(context.chain().head().await.number, 1);
    // the snapshot seeded the storage
    assert_eq!(
        context.chain().storage("0x3a636f6465").await,
        Some(json!("0x00"))
    );

    context.teardown().await?;
    suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn missing_header_fails_setup_without_retry() -> Result<()> {
    let provider = Arc::new(StaticProvider::new(fork_header()));
    let options = SetupOptions {
        block_hash: Some(BlockHash::new([9u8; 32])),
        ..Default::default()
    };
    let error = SetupAll::with_provider(provider, options)
        .await
        .err()
        .expect("setup must fail");
    match error {
        HarnessError::HeaderNotFound { target } => {
            assert!(target.starts_with("0x0909"), "target: {}", target)
        }
        other => panic!("expected HeaderNotFound, got {:?}", other),
    }
    Ok(())
}

/// A source that serves headers but cannot name a tip.
struct TiplessProvider {
    header: Header,
    transport: Transport,
}

#[async_trait]
impl Provider for TiplessProvider {
    async fn header(&self, _hash: Option<BlockHash>) -> Result<Option<Header>, HarnessError> {
        Ok(Some(self.header))
    }

    async fn head_hash(&self) -> Result<Option<BlockHash>, HarnessError> {
        Ok(None)
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }
}

#[tokio::test]
async fn unresolvable_tip_fails_per_test_setup() -> Result<()> {
    let provider = Arc::new(TiplessProvider {
        header: fork_header(),
        transport: Transport::Static,
    });
    let suite = SetupAll::with_provider(provider, SetupOptions::default()).await?;
    let error = suite.setup().await.err().expect("setup must fail");
    assert!(matches!(error, HarnessError::BlockHashUnavailable));
    Ok(())
}

#[tokio::test]
async fn teardown_is_idempotent_and_frees_the_port() -> Result<()> {
    let suite = static_suite().await?;
    let context = suite.setup().await?;
    let port = context.port();

    context.teardown().await?;
    // the second call performs no observable action
    context.teardown().await?;

    // the server is gone: a fresh connection attempt fails at the transport
    let error = WsClient::connect(
        &format!("ws://127.0.0.1:{}/json_rpc", port),
        Duration::from_millis(3_000),
        None,
    )
    .await
    .err()
    .expect("connect must fail after teardown");
    assert!(error.is_transport());

    suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn calls_after_disconnect_fail_with_transport_error() -> Result<()> {
    let suite = static_suite().await?;
    let context = suite.setup().await?;

    context.ws().disconnect().await?;
    let error = context.dev().new_block(None).await.unwrap_err();
    assert!(matches!(error, ClientError::ConnectionClosed));

    context.teardown().await?;
    suite.teardown_all().await?;
    Ok(())
}

#[tokio::test]
async fn persistent_store_follows_the_kill_switch() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let provider = Arc::new(StaticProvider::new(fork_header()));
    let suite = SetupAll::with_provider(
        provider,
        SetupOptions {
            db: Some(dir.path().join("e2e-tests-db")),
            ..Default::default()
        },
    )
    .await?;
    let context = suite.setup().await?;
    assert!(context.chain().has_store());
    assert!(dir.path().join("e2e-tests-db").exists());
    context.teardown().await?;
    suite.teardown_all().await?;

    // with the environment variable set, the chain stays in-memory
    std::env::set_var(forkbench::config::RUN_TESTS_WITHOUT_DB, "1");
    let provider = Arc::new(StaticProvider::new(fork_header()));
    let suite = SetupAll::with_provider(
        provider,
        SetupOptions {
            db: Some(dir.path().join("suppressed-db")),
            ..Default::default()
        },
    )
    .await?;
    let context = suite.setup().await?;
    let has_store = context.chain().has_store();
    let db_exists = dir.path().join("suppressed-db").exists();
    context.teardown().await?;
    suite.teardown_all().await?;
    std::env::remove_var(forkbench::config::RUN_TESTS_WITHOUT_DB);

    assert!(!has_store);
    assert!(!db_exists);
    Ok(())
}
