//! Broadcast dispatcher: fans accepted mutations out to every subscriber.
//!
//! Publishes pass through a turnstile so that events reach each subscriber
//! queue in acceptance order. The store draws a numbered ticket while it
//! holds its write lock and waits for its turn only after releasing that
//! lock. Readers of the record set never wait on delivery. A mutator whose
//! event is queued behind a slow fan-out waits without holding the lock.

use crate::subscriptions::SubscriptionRegistry;
use crate::types::MutationEvent;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of a single publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the event was enqueued for.
    pub delivered: usize,
    /// Subscribers dropped because delivery failed.
    pub dropped: usize,
}

/// Delivers mutation events to the registry's subscribers.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    /// Next ticket number to hand out.
    issued: AtomicU64,
    /// Ticket number currently allowed to deliver.
    serving: Mutex<u64>,
    turn: Condvar,
}

/// A numbered place in the publish order.
///
/// Tickets are served strictly in the order they were drawn. A ticket dropped
/// without publishing still takes its turn, so later tickets never stall.
pub struct PublishTicket<'a> {
    dispatcher: &'a Dispatcher,
    number: u64,
}

impl PublishTicket<'_> {
    /// Wait for this ticket's turn, deliver the event, and pass the turn on.
    pub fn publish(self, event: MutationEvent) -> PublishReport {
        self.dispatcher.wait_turn(self.number);
        self.dispatcher.deliver(event)
    }

    pub fn number(&self) -> u64 {
        self.number
    }
}

impl Drop for PublishTicket<'_> {
    fn drop(&mut self) {
        // No-op wait when publish already held the turn.
        self.dispatcher.wait_turn(self.number);
        self.dispatcher.advance();
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            issued: AtomicU64::new(0),
            serving: Mutex::new(0),
            turn: Condvar::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Reserve the next publish slot. Never blocks.
    pub fn ticket(&self) -> PublishTicket<'_> {
        PublishTicket {
            dispatcher: self,
            number: self.issued.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Publish an event to every subscriber registered right now.
    pub fn publish(&self, event: MutationEvent) -> PublishReport {
        self.ticket().publish(event)
    }

    fn wait_turn(&self, number: u64) {
        let mut serving = self.serving.lock();
        while *serving != number {
            self.turn.wait(&mut serving);
        }
    }

    fn advance(&self) {
        *self.serving.lock() += 1;
        self.turn.notify_all();
    }

    fn deliver(&self, event: MutationEvent) -> PublishReport {
        let subscribers = self.registry.snapshot();
        let mut report = PublishReport::default();
        let mut failed = Vec::new();

        for sub in &subscribers {
            match sub.deliver(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(reason) => failed.push((sub.id(), reason)),
            }
        }

        // Registry lock is taken only after all sends are done.
        for (id, reason) in failed {
            if self.registry.unregister(id, reason) {
                report.dropped += 1;
                tracing::warn!(subscriber = %id, ?reason, "dropping unavailable subscriber");
            }
        }

        tracing::trace!(
            kind = event.kind(),
            id = %event.id(),
            delivered = report.delivered,
            dropped = report.dropped,
            "event published"
        );

        report
    }
}
