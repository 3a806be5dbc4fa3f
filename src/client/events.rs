use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{channel::mpsc::UnboundedReceiver, Stream};
use serde_json::Value;

use super::{ClientError, WsClient};
use crate::types::Header;

/// Live head-change subscription, consumable as a `Stream` of headers.
///
/// The stream errors when the connection fails and completes on clean
/// disconnect. Dropping the handle stops delivery without notifying the
/// server; use [`HeadsSubscription::unsubscribe`] for a clean cancel.
pub struct HeadsSubscription {
    id: String,
    receiver: UnboundedReceiver<Result<Value, ClientError>>,
    client: Arc<WsClient>,
}

impl HeadsSubscription {
    pub(super) fn new(
        id: String,
        receiver: UnboundedReceiver<Result<Value, ClientError>>,
        client: Arc<WsClient>,
    ) -> Self {
        Self {
            id,
            receiver,
            client,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancel on the server and stop the stream.
    pub async fn unsubscribe(self) -> Result<bool, ClientError> {
        self.client.unsubscribe_new_heads(&self.id).await
    }
}

impl Stream for HeadsSubscription {
    type Item = Result<Header, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.receiver).poll_next(cx) {
            Poll::Ready(Some(Ok(value))) => Poll::Ready(Some(
                serde_json::from_value(value)
                    .map_err(|e| ClientError::InvalidResponse(e.to_string())),
            )),
            Poll::Ready(Some(Err(error))) => Poll::Ready(Some(Err(error))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for HeadsSubscription {
    fn drop(&mut self) {
        self.client.drop_subscription(&self.id);
    }
}
