use std::sync::Arc;

use parking_lot::Mutex;

use crate::slot::{SingleSlot, SlotFuture};

/// Callback-to-future adapter for mock-callback assertions.
///
/// Every invocation records the argument tuple and settles the outstanding
/// `next()` future, then a fresh one takes its place (replace, never queue).
/// There is no error path: the adapter only ever resolves.
pub struct MockCallback<T: Clone + Send + Sync + 'static> {
    calls: Arc<Mutex<Vec<T>>>,
    slot: Arc<SingleSlot<T>>,
}

/// Build a fresh adapter. The argument type is whatever the caller passes,
/// typically a tuple; arity is erased behind it.
pub fn mock_callback<T: Clone + Send + Sync + 'static>() -> MockCallback<T> {
    MockCallback {
        calls: Arc::new(Mutex::new(Vec::new())),
        slot: Arc::new(SingleSlot::new()),
    }
}

impl<T: Clone + Send + Sync + 'static> MockCallback<T> {
    /// Invoke the callback with one argument tuple.
    pub fn call(&self, args: T) {
        self.slot.fulfill(args.clone());
        self.calls.lock().push(args);
    }

    /// A plain closure view of the callback, for handing to code that expects
    /// an `Fn` rather than this adapter.
    pub fn callback(&self) -> impl Fn(T) + Send + Sync + 'static {
        let calls = self.calls.clone();
        let slot = self.slot.clone();
        move |args: T| {
            slot.fulfill(args.clone());
            calls.lock().push(args);
        }
    }

    /// The current outstanding future; all concurrent awaiters resolve
    /// together with the next invocation's arguments.
    pub fn next(&self) -> SlotFuture<T> {
        self.slot.wait()
    }

    /// Recorded argument tuples, in call order.
    pub fn calls(&self) -> Vec<T> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for MockCallback<T> {
    fn clone(&self) -> Self {
        Self {
            calls: self.calls.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for MockCallback<T> {
    fn default() -> Self {
        mock_callback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn next_resolves_with_call_arguments() {
        let mock = mock_callback::<(u32, &'static str)>();
        let pending = mock.next();
        mock.call((7, "seven"));
        assert_eq!(pending.await, (7, "seven"));
        assert_eq!(mock.calls(), vec![(7, "seven")]);
    }

    #[tokio::test]
    async fn second_call_does_not_overwrite_pending_value() {
        let mock = mock_callback::<u32>();
        let first = mock.next();
        mock.call(1);
        mock.call(2);

        // the pending future got the first call's arguments
        assert_eq!(first.await, 1);
        assert_eq!(mock.call_count(), 2);

        // a subsequent next() waits for the following invocation
        let third = mock.next();
        assert!(third.clone().now_or_never().is_none());
        mock.call(3);
        assert_eq!(third.await, 3);
    }

    #[tokio::test]
    async fn concurrent_awaiters_resolve_together() {
        let mock = mock_callback::<u32>();
        let a = mock.next();
        let b = mock.next();
        mock.call(42);
        assert_eq!(a.await, 42);
        assert_eq!(b.await, 42);
    }

    #[tokio::test]
    async fn closure_view_feeds_the_same_adapter() {
        let mock = mock_callback::<Vec<u64>>();
        let callback = mock.callback();
        let pending = mock.next();
        callback(vec![1, 2, 3]);
        assert_eq!(pending.await, vec![1, 2, 3]);
        assert_eq!(mock.call_count(), 1);
    }
}
