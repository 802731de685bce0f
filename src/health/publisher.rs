use super::ConnectionState;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::warn;

type Listener = Arc<dyn Fn(&ConnectionState) + Send + Sync>;

struct Registry {
    next_id: AtomicU64,
    // Kept in subscription order
    listeners: RwLock<Vec<(u64, Listener)>>,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }
}

/// Fans connection state changes out to subscribers
pub struct StatusPublisher {
    current: watch::Sender<ConnectionState>,
    registry: Arc<Registry>,
}

impl StatusPublisher {
    pub fn new(initial: ConnectionState) -> Self {
        let (current, _) = watch::channel(initial);
        Self {
            current,
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a listener; it stays registered until the returned handle is
    /// dropped or [`Subscription::unsubscribe`] is called.
    ///
    /// Listeners run on the thread that mutated the state, while its state
    /// lock is held. They may read `snapshot()` but must not call back into
    /// the controller otherwise.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners.write().push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Receiver that observes every published state, for async consumers
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.current.subscribe()
    }

    /// Copy of the most recently published state
    pub fn current(&self) -> ConnectionState {
        self.current.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listeners.read().len()
    }

    pub fn publish(&self, state: ConnectionState) {
        self.current.send_replace(state.clone());

        // Snapshot the list so listeners may subscribe/unsubscribe re-entrantly
        let listeners: Vec<Listener> = self
            .registry
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&state))).is_err() {
                warn!(status = %state.status, "Status listener panicked");
            }
        }
    }
}

/// Handle returned by [`StatusPublisher::subscribe`]
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Status;
    use parking_lot::Mutex;

    fn state_with(status: Status) -> ConnectionState {
        let mut state = ConnectionState::new(5);
        state.status = status;
        state
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let publisher = StatusPublisher::new(ConnectionState::new(5));
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_a = Arc::clone(&log);
        let _a = publisher.subscribe(move |s| log_a.lock().push(("a", s.status)));
        let log_b = Arc::clone(&log);
        let _b = publisher.subscribe(move |s| log_b.lock().push(("b", s.status)));

        publisher.publish(state_with(Status::Checking));

        assert_eq!(
            *log.lock(),
            vec![("a", Status::Checking), ("b", Status::Checking)]
        );
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let publisher = StatusPublisher::new(ConnectionState::new(5));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _bad = publisher.subscribe(|_| panic!("listener failure"));
        let seen_clone = Arc::clone(&seen);
        let _good = publisher.subscribe(move |s| seen_clone.lock().push(s.status));

        publisher.publish(state_with(Status::Unavailable));
        publisher.publish(state_with(Status::Available));

        assert_eq!(*seen.lock(), vec![Status::Unavailable, Status::Available]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let publisher = StatusPublisher::new(ConnectionState::new(5));
        let count = Arc::new(AtomicU64::new(0));

        let count_clone = Arc::clone(&count);
        let sub = publisher.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(publisher.listener_count(), 1);

        publisher.publish(state_with(Status::Checking));
        sub.unsubscribe();
        assert_eq!(publisher.listener_count(), 0);

        publisher.publish(state_with(Status::Available));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_current_is_a_copy() {
        let publisher = StatusPublisher::new(ConnectionState::new(5));
        let mut copy = publisher.current();
        copy.status = Status::Exhausted;

        assert_eq!(publisher.current().status, Status::Unknown);

        publisher.publish(state_with(Status::Available));
        assert_eq!(publisher.current().status, Status::Available);
    }

    #[test]
    fn test_watch_wakes_on_publish() {
        let publisher = StatusPublisher::new(ConnectionState::new(5));
        let mut rx = publisher.watch();

        {
            let mut changed = tokio_test::task::spawn(rx.changed());
            tokio_test::assert_pending!(changed.poll());

            publisher.publish(state_with(Status::Unavailable));
            assert!(changed.is_woken());
            tokio_test::assert_ready_ok!(changed.poll());
        }
        assert_eq!(rx.borrow_and_update().status, Status::Unavailable);
    }
}
