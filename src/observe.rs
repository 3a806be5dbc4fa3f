use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::slot::{SingleSlot, SlotFuture};

/// Rejection delivered through an observer's pending-value future.
#[derive(Error, Debug, Clone)]
pub enum ObserveError<E> {
    /// The observed stream ended while a value was being awaited.
    #[error("subscription completed without a new value")]
    Completed,
    /// The observed stream failed.
    #[error("{0}")]
    Stream(E),
}

impl<E> ObserveError<E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Wraps a push stream in an awaitable, at-most-one-pending-value adapter.
///
/// Subscribes immediately: a background task drives the stream, appends every
/// delivered value to the emission log and settles the outstanding
/// pending-value future, if any. `Err` items and end-of-stream terminate the
/// observation, rejecting an outstanding future the way the stream ended.
pub fn observe<S, T, E>(stream: S) -> Observer<T, E>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let emissions = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));
    let slot = Arc::new(SingleSlot::new());

    let task = {
        let emissions = emissions.clone();
        let errors = errors.clone();
        let completions = completions.clone();
        let slot = slot.clone();
        tokio::spawn(async move {
            futures::pin_mut!(stream);
            loop {
                match stream.next().await {
                    Some(Ok(value)) => {
                        slot.fulfill(Ok(value.clone()));
                        emissions.lock().push(value);
                    }
                    Some(Err(error)) => {
                        slot.fulfill(Err(ObserveError::Stream(error.clone())));
                        errors.lock().push(error);
                        break;
                    }
                    None => {
                        // completion with nobody waiting is a silent no-op
                        slot.fulfill(Err(ObserveError::Completed));
                        completions.fetch_add(1, Ordering::SeqCst);
                        break;
                    }
                }
            }
        })
    };

    Observer {
        emissions,
        errors,
        completions,
        slot,
        task,
    }
}

/// Handle on one observed subscription. See [`observe`].
pub struct Observer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    emissions: Arc<Mutex<Vec<T>>>,
    errors: Arc<Mutex<Vec<E>>>,
    completions: Arc<AtomicUsize>,
    slot: Arc<SingleSlot<Result<T, ObserveError<E>>>>,
    task: JoinHandle<()>,
}

impl<T, E> Observer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Every value delivered so far, in delivery order.
    pub fn get_emissions(&self) -> Vec<T> {
        self.emissions.lock().clone()
    }

    /// Every error delivered so far (at most one for well-formed streams).
    pub fn get_errors(&self) -> Vec<E> {
        self.errors.lock().clone()
    }

    /// Number of values delivered, independent of the future mechanism.
    pub fn next_count(&self) -> usize {
        self.emissions.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn complete_count(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    /// The current outstanding pending-value future, created lazily.
    ///
    /// Resolves with the next delivered value, or rejects if the stream errors
    /// or completes first. Once settled, a later call waits for a *new*
    /// emission; the value just delivered is never replayed.
    pub fn next_value(&self) -> SlotFuture<Result<T, ObserveError<E>>> {
        self.slot.wait()
    }

    /// Cancel the observation. Nothing further is recorded; an outstanding
    /// pending-value future stays pending forever.
    pub fn unsubscribe(&self) {
        self.task.abort();
    }

    pub fn is_terminated(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T, E> Drop for Observer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{channel::mpsc, FutureExt};
    use tokio::task::yield_now;

    type Item = Result<u64, &'static str>;

    async fn settle() {
        // let the observer task drain what was pushed
        for _ in 0..8 {
            yield_now().await;
        }
    }

    #[tokio::test]
    async fn records_emissions_in_delivery_order() {
        let (tx, rx) = mpsc::unbounded::<Item>();
        let observer = observe(rx);

        for n in 0..5u64 {
            tx.unbounded_send(Ok(n)).unwrap();
        }
        settle().await;

        assert_eq!(observer.get_emissions(), vec![0, 1, 2, 3, 4]);
        assert_eq!(observer.next_count(), 5);
        assert_eq!(observer.error_count(), 0);
        assert_eq!(observer.complete_count(), 0);
    }

    #[tokio::test]
    async fn next_value_resolves_with_next_emission_only() {
        let (tx, rx) = mpsc::unbounded::<Item>();
        let observer = observe(rx);

        let pending = observer.next_value();
        tx.unbounded_send(Ok(1)).unwrap();
        assert_eq!(pending.await.unwrap(), 1);

        // no replay: a fresh future waits for a new emission
        let pending = observer.next_value();
        settle().await;
        assert!(pending.clone().now_or_never().is_none());
        tx.unbounded_send(Ok(2)).unwrap();
        assert_eq!(pending.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stream_error_rejects_outstanding_future() {
        let (tx, rx) = mpsc::unbounded::<Item>();
        let observer = observe(rx);

        let pending = observer.next_value();
        tx.unbounded_send(Err("boom")).unwrap();
        match pending.await {
            Err(ObserveError::Stream(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(observer.error_count(), 1);
        assert_eq!(observer.get_errors(), vec!["boom"]);
    }

    #[tokio::test]
    async fn completion_rejects_with_fixed_message() {
        let (tx, rx) = mpsc::unbounded::<Item>();
        let observer = observe(rx);

        let pending = observer.next_value();
        drop(tx);
        let error = pending.await.unwrap_err();
        assert!(error.is_completed());
        assert_eq!(
            error.to_string(),
            "subscription completed without a new value"
        );
        assert_eq!(observer.complete_count(), 1);
    }

    #[tokio::test]
    async fn completion_without_waiter_is_silent() {
        let (tx, rx) = mpsc::unbounded::<Item>();
        let observer = observe(rx);

        tx.unbounded_send(Ok(9)).unwrap();
        drop(tx);
        settle().await;

        assert_eq!(observer.get_emissions(), vec![9]);
        assert_eq!(observer.complete_count(), 1);
        assert!(observer.is_terminated());
    }

    #[tokio::test]
    async fn unsubscribe_stops_recording_and_leaves_future_pending() {
        let (tx, rx) = mpsc::unbounded::<Item>();
        let observer = observe(rx);

        tx.unbounded_send(Ok(1)).unwrap();
        settle().await;
        assert_eq!(observer.next_count(), 1);

        let orphan = observer.next_value();
        observer.unsubscribe();
        settle().await;

        tx.unbounded_send(Ok(2)).unwrap();
        settle().await;
        assert_eq!(observer.next_count(), 1);
        // the outstanding future never settles after cancellation
        assert!(orphan.now_or_never().is_none());
    }
}
