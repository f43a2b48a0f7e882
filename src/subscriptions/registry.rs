//! Registry of live subscriber connections.

use crate::error::{ChatError, Result};
use crate::types::{MutationEvent, SubscriberId, Timestamp};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{
    DropReason, Notification, SubscriptionConfig, SubscriptionHandle, DEFAULT_BUFFER_SIZE,
};

/// Registry-wide limits.
#[derive(Clone, Copy, Debug)]
pub struct RegistryLimits {
    /// Queue capacity for subscriptions that don't pick their own.
    pub default_buffer_size: usize,
    /// Max concurrently registered subscribers.
    pub max_subscribers: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            max_subscribers: 10_000,
        }
    }
}

/// A live push channel.
///
/// The liveness flag and the queue are only touched together under `alive`,
/// so once the `Dropped` notice is enqueued nothing can follow it.
pub struct Subscriber {
    id: SubscriberId,
    registered_at: Timestamp,
    sender: Sender<Notification>,
    alive: Mutex<bool>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn registered_at(&self) -> Timestamp {
        self.registered_at
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.lock()
    }

    /// Enqueue an event without blocking.
    pub(crate) fn deliver(&self, event: MutationEvent) -> std::result::Result<(), DropReason> {
        let alive = self.alive.lock();
        if !*alive {
            return Err(DropReason::Disconnected);
        }
        match self.sender.try_send(Notification::Mutation(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DropReason::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Err(DropReason::Disconnected),
        }
    }

    fn close(&self, reason: DropReason) {
        let mut alive = self.alive.lock();
        if !*alive {
            return;
        }
        *alive = false;
        // Best effort; a full or closed queue just misses the notice.
        let _ = self.sender.try_send(Notification::Dropped { reason });
    }
}

/// Tracks active subscribers. Owns the subscriber set exclusively.
pub struct SubscriptionRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<Subscriber>>>,
    next_id: AtomicU64,
    limits: RegistryLimits,
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            limits,
            closed: AtomicBool::new(false),
        }
    }

    /// Register a new subscriber.
    pub fn register(self: &Arc<Self>, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        let buffer_size = config
            .buffer_size
            .unwrap_or(self.limits.default_buffer_size)
            .max(1);
        let (sender, receiver) = bounded(buffer_size);

        let mut subs = self.subscribers.write();
        // Checked under the write lock so a concurrent drain can't miss us.
        if self.closed.load(Ordering::Acquire) {
            return Err(ChatError::ShutDown);
        }
        if subs.len() >= self.limits.max_subscribers {
            return Err(ChatError::SubscriberUnavailable(format!(
                "subscriber limit {} reached",
                self.limits.max_subscribers
            )));
        }

        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        subs.insert(
            id,
            Arc::new(Subscriber {
                id,
                registered_at: Timestamp::now(),
                sender,
                alive: Mutex::new(true),
            }),
        );
        drop(subs);

        tracing::debug!(subscriber = %id, buffer_size, "subscriber registered");

        Ok(SubscriptionHandle {
            id,
            receiver,
            registry: Arc::downgrade(self),
        })
    }

    /// Remove a subscriber. Idempotent; returns whether it was still registered.
    pub fn unregister(&self, id: SubscriberId, reason: DropReason) -> bool {
        let removed = self.subscribers.write().remove(&id);
        match removed {
            Some(sub) => {
                sub.close(reason);
                tracing::debug!(subscriber = %id, ?reason, "subscriber unregistered");
                true
            }
            None => false,
        }
    }

    /// Stable copy of the live subscribers.
    ///
    /// The lock is released before returning, so callers may send freely.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .read()
            .values()
            .filter(|s| s.is_alive())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the registry and drop every subscriber with `Shutdown`.
    ///
    /// Returns the number of subscribers drained.
    pub fn drain(&self) -> usize {
        let drained: Vec<_> = {
            let mut subs = self.subscribers.write();
            self.closed.store(true, Ordering::Release);
            subs.drain().map(|(_, sub)| sub).collect()
        };
        for sub in &drained {
            sub.close(DropReason::Shutdown);
        }
        tracing::info!(count = drained.len(), "subscription registry drained");
        drained.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(RegistryLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;
    use std::time::Duration;

    fn registry() -> Arc<SubscriptionRegistry> {
        Arc::new(SubscriptionRegistry::default())
    }

    fn deleted(id: &str) -> MutationEvent {
        MutationEvent::Deleted {
            id: MessageId::from(id),
        }
    }

    #[test]
    fn test_register_unregister() {
        let registry = registry();

        let handle = registry.register(SubscriptionConfig::default()).unwrap();
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(handle.id, DropReason::Unsubscribed));
        assert_eq!(registry.len(), 0);

        let last = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            last,
            Notification::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = registry();
        let handle = registry.register(SubscriptionConfig::default()).unwrap();

        assert!(registry.unregister(handle.id, DropReason::Unsubscribed));
        assert!(!registry.unregister(handle.id, DropReason::Unsubscribed));
        drop(handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handle_drop_unregisters() {
        let registry = registry();
        let handle = registry.register(SubscriptionConfig::default()).unwrap();
        assert_eq!(registry.len(), 1);

        drop(handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = registry();
        let h1 = registry.register(SubscriptionConfig::default()).unwrap();
        let _h2 = registry.register(SubscriptionConfig::default()).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);

        // Mutating the registry doesn't affect an existing snapshot
        registry.unregister(h1.id, DropReason::Unsubscribed);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.snapshot().len(), 1);

        // The removed subscriber is no longer live
        let removed = snapshot.iter().find(|s| s.id() == h1.id).unwrap();
        assert!(!removed.is_alive());
        assert_eq!(removed.deliver(deleted("x")), Err(DropReason::Disconnected));
    }

    #[test]
    fn test_deliver_overflow() {
        let registry = registry();
        let handle = registry
            .register(SubscriptionConfig::with_buffer_size(1))
            .unwrap();
        let sub = registry.snapshot().pop().unwrap();

        assert_eq!(sub.deliver(deleted("a")), Ok(()));
        assert_eq!(sub.deliver(deleted("b")), Err(DropReason::BufferOverflow));

        assert_eq!(
            handle.try_recv().unwrap(),
            Notification::Mutation(deleted("a"))
        );
    }

    #[test]
    fn test_nothing_delivered_after_drop_notice() {
        let registry = registry();
        let handle = registry.register(SubscriptionConfig::default()).unwrap();
        let sub = registry.snapshot().pop().unwrap();

        assert_eq!(sub.deliver(deleted("a")), Ok(()));
        registry.unregister(handle.id, DropReason::Unsubscribed);
        // A publisher still holding an old snapshot is refused
        assert_eq!(sub.deliver(deleted("b")), Err(DropReason::Disconnected));
        sub.close(DropReason::Shutdown);

        assert_eq!(
            handle.drain(),
            vec![
                Notification::Mutation(deleted("a")),
                Notification::Dropped {
                    reason: DropReason::Unsubscribed
                },
            ]
        );
    }

    #[test]
    fn test_subscriber_limit() {
        let registry = Arc::new(SubscriptionRegistry::new(RegistryLimits {
            default_buffer_size: 4,
            max_subscribers: 1,
        }));
        let _h = registry.register(SubscriptionConfig::default()).unwrap();
        let result = registry.register(SubscriptionConfig::default());
        assert!(matches!(result, Err(ChatError::SubscriberUnavailable(_))));
    }

    #[test]
    fn test_drain_on_shutdown() {
        let registry = registry();
        let h1 = registry.register(SubscriptionConfig::default()).unwrap();
        let h2 = registry.register(SubscriptionConfig::default()).unwrap();

        assert_eq!(registry.drain(), 2);
        assert!(registry.is_empty());
        assert!(registry.is_closed());

        for h in [&h1, &h2] {
            assert_eq!(
                h.try_recv().unwrap(),
                Notification::Dropped {
                    reason: DropReason::Shutdown
                }
            );
        }

        let result = registry.register(SubscriptionConfig::default());
        assert!(matches!(result, Err(ChatError::ShutDown)));
    }
}
