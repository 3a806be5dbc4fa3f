//! WebSocket JSON-RPC client for the local dev node and WS fork sources.
//!
//! One background task reads the socket: responses are routed to pending
//! calls by numeric id, notifications to subscription channels by
//! subscription id. Calls carry no wrapping timeout; a hung server hangs the
//! awaiting caller.

mod error;
mod events;

pub use error::ClientError;
pub use events::HeadsSubscription;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::channel::mpsc as futures_mpsc;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite_wasm::{Message, WebSocketStream};

use crate::{
    config::JSON_RPC_VERSION,
    rpc::server::{SUBSCRIBE_NEW_HEADS, UNSUBSCRIBE_NEW_HEADS},
};

type PendingCalls = Arc<DashMap<u64, oneshot::Sender<Result<Value, ClientError>>>>;
type SubscriptionSinks = Arc<DashMap<String, futures_mpsc::UnboundedSender<Result<Value, ClientError>>>>;

#[derive(Serialize)]
struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
    data: Option<Value>,
}

#[derive(Deserialize)]
struct JsonRpcNotification {
    params: NotificationParams,
}

#[derive(Deserialize)]
struct NotificationParams {
    subscription: String,
    result: Value,
}

pub struct WsClient {
    sink: Mutex<SplitSink<WebSocketStream, Message>>,
    pending: PendingCalls,
    subscriptions: SubscriptionSinks,
    next_id: AtomicU64,
    online: Arc<AtomicBool>,
    read_task: JoinHandle<()>,
}

impl WsClient {
    /// Connect with the given connect timeout. When `idle_timeout` is set,
    /// a connection without inbound frames for that long is closed and every
    /// pending call fails with [`ClientError::IdleTimeout`].
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        idle_timeout: Option<Duration>,
    ) -> Result<Arc<Self>, ClientError> {
        let ws = timeout(connect_timeout, tokio_tungstenite_wasm::connect(url))
            .await
            .map_err(|_| ClientError::ConnectTimeout(connect_timeout))?
            .map_err(ClientError::from)?;
        debug!("websocket connected to {}", url);

        let (sink, stream) = ws.split();
        let pending: PendingCalls = Arc::new(DashMap::new());
        let subscriptions: SubscriptionSinks = Arc::new(DashMap::new());
        let online = Arc::new(AtomicBool::new(true));

        let read_task = tokio::spawn(read_loop(
            stream,
            pending.clone(),
            subscriptions.clone(),
            online.clone(),
            idle_timeout,
        ));

        Ok(Arc::new(Self {
            sink: Mutex::new(sink),
            pending,
            subscriptions,
            next_id: AtomicU64::new(0),
            online,
            read_task,
        }))
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Issue one JSON-RPC call and await its result.
    pub async fn call<P: Serialize>(&self, method: &str, params: P) -> Result<Value, ClientError> {
        if !self.is_online() {
            return Err(ClientError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let request = serde_json::to_string(&JsonRpcRequest {
            jsonrpc: JSON_RPC_VERSION,
            id,
            method,
            params,
        })
        .map_err(|e| ClientError::Json(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if log::log_enabled!(log::Level::Trace) {
            trace!("--> {}", request);
        }
        if let Err(error) = self.send_text(request).await {
            self.pending.remove(&id);
            return Err(error);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Subscribe to head changes of the connected node.
    pub async fn subscribe_new_heads(self: &Arc<Self>) -> Result<HeadsSubscription, ClientError> {
        let result = self.call(SUBSCRIBE_NEW_HEADS, Vec::<Value>::new()).await?;
        let id = result
            .as_str()
            .ok_or_else(|| ClientError::InvalidResponse("subscription id must be a string".into()))?
            .to_string();

        let (tx, rx) = futures_mpsc::unbounded();
        self.subscriptions.insert(id.clone(), tx);
        Ok(HeadsSubscription::new(id, rx, self.clone()))
    }

    pub(crate) async fn unsubscribe_new_heads(&self, id: &str) -> Result<bool, ClientError> {
        self.subscriptions.remove(id);
        let result = self.call(UNSUBSCRIBE_NEW_HEADS, (id,)).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    pub(crate) fn drop_subscription(&self, id: &str) {
        self.subscriptions.remove(id);
    }

    /// Close the connection. Idempotent: later calls are no-ops. Pending
    /// calls fail with [`ClientError::ConnectionClosed`]; subscription
    /// streams complete.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        if !self.online.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("disconnecting websocket client");
        self.read_task.abort();
        settle_all(&self.pending, &self.subscriptions, None);

        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), ClientError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into())).await.map_err(ClientError::from)
    }
}

async fn read_loop(
    mut stream: SplitStream<WebSocketStream>,
    pending: PendingCalls,
    subscriptions: SubscriptionSinks,
    online: Arc<AtomicBool>,
    idle_timeout: Option<Duration>,
) {
    let error = loop {
        let frame = match idle_timeout {
            Some(idle) => match timeout(idle, stream.next()).await {
                Ok(frame) => frame,
                Err(_) => break ClientError::IdleTimeout,
            },
            None => stream.next().await,
        };

        match frame {
            None => break ClientError::ConnectionClosed,
            Some(Err(error)) => break ClientError::from(error),
            Some(Ok(Message::Text(text))) => route_frame(&pending, &subscriptions, &text),
            Some(Ok(Message::Close(_))) => break ClientError::ConnectionClosed,
            Some(Ok(_)) => {}
        }
    };

    debug!("websocket read loop ended: {}", error);
    online.store(false, Ordering::SeqCst);
    settle_all(&pending, &subscriptions, Some(&error));
}

fn route_frame(pending: &PendingCalls, subscriptions: &SubscriptionSinks, text: &str) {
    if log::log_enabled!(log::Level::Trace) {
        trace!("<-- {}", text);
    }
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(error) => {
            warn!("discarding unparseable frame: {}", error);
            return;
        }
    };

    let is_response = value.get("id").map(|id| !id.is_null()).unwrap_or(false);
    if is_response {
        let response: JsonRpcResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(error) => {
                warn!("discarding malformed response: {}", error);
                return;
            }
        };
        let Some(id) = response.id else {
            return;
        };
        match pending.remove(&id) {
            Some((_, tx)) => {
                let result = match response.error {
                    Some(body) => Err(ClientError::Rpc {
                        code: body.code,
                        message: body.message,
                        data: body.data,
                    }),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(result);
            }
            None => debug!("response for unknown request id {}", id),
        }
    } else if value.get("method").is_some() {
        let notification: JsonRpcNotification = match serde_json::from_value(value) {
            Ok(notification) => notification,
            Err(error) => {
                warn!("discarding malformed notification: {}", error);
                return;
            }
        };
        if let Some(sink) = subscriptions.get(&notification.params.subscription) {
            let _ = sink.unbounded_send(Ok(notification.params.result));
        }
    }
}

/// Fail or complete everything outstanding. With an error, pending calls and
/// subscription streams receive it; without one (clean disconnect), pending
/// calls observe a closed connection and streams simply complete.
fn settle_all(
    pending: &PendingCalls,
    subscriptions: &SubscriptionSinks,
    error: Option<&ClientError>,
) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(error.cloned().unwrap_or(ClientError::ConnectionClosed)));
        }
    }
    subscriptions.retain(|_, sink| {
        if let Some(error) = error {
            let _ = sink.unbounded_send(Err(error.clone()));
        }
        false
    });
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}
