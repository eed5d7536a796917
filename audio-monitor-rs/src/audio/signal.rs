//! Zero-payload notifications with any number of subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`Notification::connect`], used to disconnect later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Default)]
struct Subscribers {
    connected: Vec<(SubscriptionId, Callback)>,
    /// Invocations currently executing, and the thread running each.
    running: Vec<(SubscriptionId, ThreadId)>,
}

/// A fire-and-forget notification.
///
/// Subscribers are invoked synchronously on whichever thread calls
/// [`emit`](Self::emit), so they must be `Send + Sync`. Once
/// [`disconnect`](Self::disconnect) or
/// [`disconnect_all`](Self::disconnect_all) returns, the removed subscribers
/// are not running on any other thread and will not be invoked again.
pub struct Notification {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
    idle: Condvar,
}

/// Marks one invocation as finished, even if the subscriber panics.
struct Running<'a> {
    notification: &'a Notification,
    id: SubscriptionId,
    thread: ThreadId,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut subscribers = self.notification.lock();
        if let Some(pos) = subscribers
            .running
            .iter()
            .position(|&(id, thread)| id == self.id && thread == self.thread)
        {
            subscribers.running.swap_remove(pos);
        }
        drop(subscribers);
        self.notification.idle.notify_all();
    }
}

impl Notification {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Subscribers::default()),
            idle: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Attach a subscriber.
    pub fn connect<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().connected.push((id, Arc::new(callback)));
        tracing::debug!(notification = self.name, id = id.0, "Subscriber connected");
        id
    }

    /// Detach a subscriber. Returns false if the id was not connected.
    ///
    /// Blocks while the subscriber is running on another thread. A subscriber
    /// may disconnect itself from inside its own callback.
    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.connected.len();
        subscribers.connected.retain(|(sid, _)| *sid != id);
        let removed = before != subscribers.connected.len();
        self.wait_until_idle(subscribers, |sid| sid == id);
        removed
    }

    /// Detach every subscriber, waiting out invocations on other threads.
    pub fn disconnect_all(&self) {
        let mut subscribers = self.lock();
        subscribers.connected.clear();
        self.wait_until_idle(subscribers, |_| true);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().connected.len()
    }

    /// Invoke every subscriber once.
    ///
    /// Subscribers connected during the emit are not invoked; subscribers
    /// disconnected before their turn are skipped.
    pub fn emit(&self) {
        let ids: Vec<SubscriptionId> = self.lock().connected.iter().map(|(id, _)| *id).collect();
        tracing::trace!(notification = self.name, subscribers = ids.len(), "Emitting");

        let thread = thread::current().id();
        for id in ids {
            let callback = {
                let mut subscribers = self.lock();
                let Some(callback) = subscribers
                    .connected
                    .iter()
                    .find(|(sid, _)| *sid == id)
                    .map(|(_, cb)| cb.clone())
                else {
                    continue;
                };
                subscribers.running.push((id, thread));
                callback
            };

            let _running = Running {
                notification: self,
                id,
                thread,
            };
            callback();
        }
    }

    fn wait_until_idle<P>(&self, mut subscribers: MutexGuard<'_, Subscribers>, matches: P)
    where
        P: Fn(SubscriptionId) -> bool,
    {
        let current = thread::current().id();
        while subscribers
            .running
            .iter()
            .any(|&(id, thread)| matches(id) && thread != current)
        {
            subscribers = self
                .idle
                .wait(subscribers)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
