//! Progress subscriptions.
//!
//! Every subscriber gets its own unbounded channel, so publishing never
//! waits on a slow consumer. Dropping a [`Subscription`] unsubscribes it;
//! other subscribers are unaffected.
//!
//! Callback-style consumers use [`Subscription::forward_to`], which drains
//! the channel on a spawned task and returns a [`SubscriptionHandle`].

use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fan-out registry for one kind of event.
pub(crate) struct Subscribers<T> {
    next_id: AtomicU64,
    senders: Mutex<Vec<(u64, mpsc::UnboundedSender<T>)>>,
}

impl<T: Clone + Send + 'static> Subscribers<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            senders: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn subscribe(self: &Arc<Self>) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push((id, tx));
        let registry: Weak<dyn Unsubscribe> = Arc::downgrade(self) as Weak<dyn Unsubscribe>;
        Subscription { id, rx, registry }
    }

    /// Send `event` to every live subscriber, pruning closed ones.
    pub(crate) fn publish(&self, event: &T) {
        self.lock().retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, mpsc::UnboundedSender<T>)>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }
}

trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

impl<T: Send> Unsubscribe for Subscribers<T> {
    fn unsubscribe(&self, id: u64) {
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(sid, _)| *sid != id);
    }
}

/// Receiving end of one subscriber's channel.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<dyn Unsubscribe>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Wait for the next event. `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next buffered event, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take every event buffered so far.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }

    /// Invoke `callback` for every event on a spawned task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn forward_to<F>(self, callback: F) -> SubscriptionHandle
    where
        F: Fn(T) + Send + 'static,
    {
        let task = tokio::spawn(self.into_stream().for_each(move |event| {
            callback(event);
            futures::future::ready(())
        }));
        SubscriptionHandle { task }
    }

    /// Stop receiving. Same as dropping.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Handle for a callback subscription. Dropping it leaves the callback
/// running; call [`unsubscribe`](Self::unsubscribe) to stop it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_each_subscriber_gets_every_event() {
        let subs = Subscribers::<u32>::new();
        let mut a = subs.subscribe();
        let mut b = subs.subscribe();
        subs.publish(&1);
        subs.publish(&2);
        assert_eq!(a.drain(), vec![1, 2]);
        assert_eq!(b.drain(), vec![1, 2]);
    }

    #[test]
    fn test_unsubscribe_is_independent() {
        let subs = Subscribers::<u32>::new();
        let a = subs.subscribe();
        let mut b = subs.subscribe();
        assert_eq!(subs.len(), 2);
        a.unsubscribe();
        assert_eq!(subs.len(), 1);
        subs.publish(&7);
        assert_eq!(b.try_recv(), Some(7));
        assert_eq!(b.try_recv(), None);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let subs = Subscribers::<String>::new();
        subs.publish(&"nobody".to_string());
        assert_eq!(subs.len(), 0);
    }

    #[tokio::test]
    async fn test_stream_ends_when_registry_dropped() {
        let subs = Subscribers::<u32>::new();
        let stream = subs.subscribe().into_stream();
        subs.publish(&1);
        subs.publish(&2);
        drop(subs);
        let collected: Vec<u32> = stream.collect().await;
        assert_eq!(collected, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_forward_to_callback_and_unsubscribe() {
        let subs = Subscribers::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handle = subs.subscribe().forward_to(move |n| {
            counter.fetch_add(n as usize, Ordering::SeqCst);
        });
        subs.publish(&3);
        subs.publish(&4);
        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.load(Ordering::SeqCst) < 7 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(handle.is_active());
        handle.unsubscribe();
        tokio::time::timeout(Duration::from_secs(1), async {
            while subs.len() > 0 {
                subs.publish(&100);
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(subs.len(), 0);
    }
}
