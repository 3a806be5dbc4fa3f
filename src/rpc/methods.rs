use std::sync::Arc;

use serde_json::{json, Value};

use super::handler::{positional_param, require_no_params, HandlerResult, RpcHandler};
use crate::{
    async_handler,
    chain::DevChain,
    dev::NewBlockParams,
    types::{BlockHash, HashOrNumber, StorageValues, TimeSpec},
};

pub const NODE_NAME: &str = concat!("forkbench/", env!("CARGO_PKG_VERSION"));

/// Register the full method table of the local dev node.
///
/// The `dev_*` family is a fixed wire contract: method names and positional
/// parameter order must not change. The `chain_*` queries make a running
/// instance usable as a fork source for another harness.
pub fn register_methods(handler: &mut RpcHandler<Arc<DevChain>>) {
    handler.register_method("system_name", async_handler!(system_name));
    handler.register_method("chain_getHeader", async_handler!(chain_get_header));
    handler.register_method("chain_getBlockHash", async_handler!(chain_get_block_hash));

    // dev control surface
    handler.register_method("dev_newBlock", async_handler!(dev_new_block));
    handler.register_method("dev_setStorage", async_handler!(dev_set_storage));
    handler.register_method("dev_timeTravel", async_handler!(dev_time_travel));
    handler.register_method("dev_setHead", async_handler!(dev_set_head));
}

async fn system_name(_: &Arc<DevChain>, params: Value) -> HandlerResult {
    require_no_params(&params)?;
    Ok(json!(NODE_NAME))
}

async fn chain_get_header(chain: &Arc<DevChain>, params: Value) -> HandlerResult {
    let hash: Option<BlockHash> = positional_param(&params, 0)?;
    Ok(match chain.header(hash).await {
        Some(header) => json!(header),
        None => Value::Null,
    })
}

async fn chain_get_block_hash(chain: &Arc<DevChain>, params: Value) -> HandlerResult {
    let number: Option<u64> = positional_param(&params, 0)?;
    Ok(match chain.hash_by_number(number).await {
        Some(hash) => json!(hash),
        None => Value::Null,
    })
}

async fn dev_new_block(chain: &Arc<DevChain>, params: Value) -> HandlerResult {
    let param: Option<NewBlockParams> = positional_param(&params, 0)?;
    let param = param.unwrap_or_default();
    let hash = chain.new_block(param.count, param.to).await?;
    Ok(json!(hash))
}

async fn dev_set_storage(chain: &Arc<DevChain>, params: Value) -> HandlerResult {
    let values: StorageValues = positional_param(&params, 0)?;
    let at: Option<BlockHash> = positional_param(&params, 1)?;
    let hash = chain.set_storage(values, at).await?;
    Ok(json!(hash))
}

async fn dev_time_travel(chain: &Arc<DevChain>, params: Value) -> HandlerResult {
    let spec: TimeSpec = positional_param(&params, 0)?;
    let timestamp = chain.time_travel(spec).await?;
    Ok(json!(timestamp))
}

async fn dev_set_head(chain: &Arc<DevChain>, params: Value) -> HandlerResult {
    let target: HashOrNumber = positional_param(&params, 0)?;
    let header = chain.set_head(target).await?;
    Ok(json!(header.hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::ChainConfig,
        types::Header,
    };

    fn node() -> RpcHandler<Arc<DevChain>> {
        let fork = Header::new(BlockHash::zero(), 100);
        let chain = Arc::new(DevChain::new(fork, ChainConfig::default(), None, None).unwrap());
        let mut handler = RpcHandler::new(chain);
        register_methods(&mut handler);
        handler
    }

    async fn call(handler: &RpcHandler<Arc<DevChain>>, body: &str) -> Value {
        handler.handle_request(body.as_bytes()).await.unwrap()
    }

    #[tokio::test]
    async fn dev_new_block_returns_last_hash() {
        let handler = node();
        let response = call(
            &handler,
            r#"{"jsonrpc":"2.0","id":1,"method":"dev_newBlock","params":[null]}"#,
        )
        .await;
        let hash = response["result"].as_str().unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(handler.get_data().head().await.number, 101);

        // count is honoured and the returned hash is the head hash
        let response = call(
            &handler,
            r#"{"jsonrpc":"2.0","id":2,"method":"dev_newBlock","params":[{"count":3}]}"#,
        )
        .await;
        let head = handler.get_data().head().await;
        assert_eq!(head.number, 104);
        assert_eq!(response["result"].as_str().unwrap(), head.hash.to_string());
    }

    #[tokio::test]
    async fn dev_set_storage_and_query() {
        let handler = node();
        let response = call(
            &handler,
            r#"{"jsonrpc":"2.0","id":1,"method":"dev_setStorage","params":[{"0xaa":"0x01"}]}"#,
        )
        .await;
        assert!(response["result"].as_str().unwrap().starts_with("0x"));
        assert_eq!(
            handler.get_data().storage("0xaa").await,
            Some(json!("0x01"))
        );
    }

    #[tokio::test]
    async fn dev_time_travel_round_trips() {
        let handler = node();
        let response = call(
            &handler,
            r#"{"jsonrpc":"2.0","id":1,"method":"dev_timeTravel","params":["2024-06-01T00:00:00Z"]}"#,
        )
        .await;
        let millis = response["result"].as_u64().unwrap();
        assert_eq!(handler.get_data().timestamp().await, millis);
    }

    #[tokio::test]
    async fn dev_set_head_rejects_unknown_block() {
        let handler = node();
        let error = handler
            .handle_request(
                br#"{"jsonrpc":"2.0","id":1,"method":"dev_setHead","params":[12345]}"#,
            )
            .await
            .unwrap_err();
        assert_eq!(error.to_json()["error"]["code"], -101);
    }

    #[tokio::test]
    async fn chain_queries_serve_fork_sources() {
        let handler = node();
        let response = call(&handler, r#"{"jsonrpc":"2.0","id":1,"method":"chain_getHeader"}"#).await;
        assert_eq!(response["result"]["number"], 100);

        let response = call(
            &handler,
            r#"{"jsonrpc":"2.0","id":2,"method":"chain_getBlockHash","params":[100]}"#,
        )
        .await;
        assert_eq!(
            response["result"].as_str().unwrap(),
            BlockHash::zero().to_string()
        );

        let response = call(
            &handler,
            r#"{"jsonrpc":"2.0","id":3,"method":"chain_getBlockHash","params":[101]}"#,
        )
        .await;
        assert_eq!(response["result"], Value::Null);
    }
}
