use std::{collections::HashMap, sync::Arc};

use actix_ws::{Message, MessageStream, Session};
use futures_util::StreamExt;
use log::{debug, warn};
use serde_json::{json, Value};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    chain::{ChainEvent, DevChain},
    config::JSON_RPC_VERSION,
    rpc::{
        handler::{positional_param, RpcHandler, RpcRequest},
        InternalRpcError, RpcResponseError,
    },
};

pub const SUBSCRIBE_NEW_HEADS: &str = "chain_subscribeNewHeads";
pub const UNSUBSCRIBE_NEW_HEADS: &str = "chain_unsubscribeNewHeads";
pub const NEW_HEAD_NOTIFICATION: &str = "chain_newHead";

/// One WebSocket connection: requests are dispatched through the shared
/// method registry; subscription management is serviced here because it owns
/// per-session state.
pub(super) async fn session_loop(
    handler: Arc<RpcHandler<Arc<DevChain>>>,
    mut session: Session,
    mut stream: MessageStream,
) {
    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let response =
                    dispatch(&handler, &mut subscriptions, &session, text.as_bytes()).await;
                if session.text(response.to_string()).await.is_err() {
                    break;
                }
            }
            Message::Ping(bytes) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Message::Close(reason) => {
                debug!("websocket session closed by peer: {:?}", reason);
                break;
            }
            _ => {}
        }
    }

    for (_, task) in subscriptions {
        task.abort();
    }
    let _ = session.close(None).await;
}

async fn dispatch(
    handler: &Arc<RpcHandler<Arc<DevChain>>>,
    subscriptions: &mut HashMap<String, JoinHandle<()>>,
    session: &Session,
    body: &[u8],
) -> Value {
    // intercept subscription management; anything else goes through the
    // regular registry (including malformed requests, for uniform errors)
    match serde_json::from_slice::<RpcRequest>(body) {
        Ok(request) if request.method == SUBSCRIBE_NEW_HEADS => {
            subscribe_new_heads(handler, subscriptions, session, request)
        }
        Ok(request) if request.method == UNSUBSCRIBE_NEW_HEADS => {
            unsubscribe_new_heads(subscriptions, request)
        }
        _ => match handler.handle_request(body).await {
            Ok(response) => response,
            Err(error) => error.to_json(),
        },
    }
}

fn subscribe_new_heads(
    handler: &Arc<RpcHandler<Arc<DevChain>>>,
    subscriptions: &mut HashMap<String, JoinHandle<()>>,
    session: &Session,
    request: RpcRequest,
) -> Value {
    if request.jsonrpc != JSON_RPC_VERSION {
        return RpcResponseError::new(request.id, InternalRpcError::InvalidVersion).to_json();
    }

    let subscription = format!("{:016x}", rand::random::<u64>());
    let mut events = handler.get_data().subscribe_events();
    let forward = {
        let mut session = session.clone();
        let subscription = subscription.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChainEvent::NewHead(header)) => {
                        let notification = json!({
                            "jsonrpc": JSON_RPC_VERSION,
                            "method": NEW_HEAD_NOTIFICATION,
                            "params": {
                                "subscription": subscription,
                                "result": header,
                            },
                        });
                        if session.text(notification.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("head subscription lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };
    subscriptions.insert(subscription.clone(), forward);

    json!({
        "jsonrpc": JSON_RPC_VERSION,
        "id": request.id,
        "result": subscription,
    })
}

fn unsubscribe_new_heads(
    subscriptions: &mut HashMap<String, JoinHandle<()>>,
    request: RpcRequest,
) -> Value {
    let subscription: Option<String> = match positional_param(&request.params, 0) {
        Ok(value) => value,
        Err(error) => return RpcResponseError::new(request.id, error).to_json(),
    };

    let removed = subscription
        .and_then(|id| subscriptions.remove(&id))
        .map(|task| {
            task.abort();
            true
        })
        .unwrap_or(false);

    json!({
        "jsonrpc": JSON_RPC_VERSION,
        "id": request.id,
        "result": removed,
    })
}
