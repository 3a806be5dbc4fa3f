use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Shared handle on the value a slot will eventually carry. Cloneable so any
/// number of awaiters resolve together.
pub type SlotFuture<R> = Shared<BoxFuture<'static, R>>;

/// A single-slot, replace-on-resolve synchronization primitive.
///
/// At most one unresolved future exists at a time. `wait` hands out the
/// current one, creating it lazily. `fulfill` settles it and clears the slot,
/// so the next `wait` observes a fresh future that only resolves with a
/// *later* fulfillment. Values delivered while no future is outstanding are
/// dropped, never queued.
pub struct SingleSlot<R: Clone + Send + Sync + 'static> {
    inner: Mutex<Option<Pending<R>>>,
}

struct Pending<R: Clone + Send + Sync + 'static> {
    tx: oneshot::Sender<R>,
    shared: SlotFuture<R>,
}

impl<R: Clone + Send + Sync + 'static> SingleSlot<R> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Current outstanding future, created lazily if none exists.
    pub fn wait(&self) -> SlotFuture<R> {
        let mut guard = self.inner.lock();
        match guard.as_ref() {
            Some(pending) => pending.shared.clone(),
            None => {
                let (tx, rx) = oneshot::channel();
                // A dropped sender must not surface as an error: a cancelled
                // observation leaves its outstanding future pending forever.
                let shared = async move {
                    match rx.await {
                        Ok(value) => value,
                        Err(_) => futures::future::pending().await,
                    }
                }
                .boxed()
                .shared();
                *guard = Some(Pending {
                    tx,
                    shared: shared.clone(),
                });
                shared
            }
        }
    }

    /// Settle the outstanding future, if any, and clear the slot. Returns
    /// whether a future was fulfilled.
    pub fn fulfill(&self, value: R) -> bool {
        let taken = self.inner.lock().take();
        match taken {
            Some(pending) => {
                let _ = pending.tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<R: Clone + Send + Sync + 'static> Default for SingleSlot<R> {
    fn default() -> Self {
        Self::new()
    }
}
