//! Subscription types for live chat updates.

use crate::types::{MutationEvent, SubscriberId};
use serde::{Deserialize, Serialize};
use std::sync::Weak;
use std::time::Duration;

use super::registry::SubscriptionRegistry;

/// Default per-subscriber queue capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Configuration for a subscription.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionConfig {
    /// Max queued notifications before the subscriber is dropped.
    /// `None` uses the registry default.
    pub buffer_size: Option<usize>,
}

impl SubscriptionConfig {
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: Some(buffer_size),
        }
    }
}

/// What a subscriber receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// An accepted store mutation.
    Mutation(MutationEvent),

    /// The subscription ended. Always the last notification, best effort.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiving side went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The core is shutting down.
    Shutdown,
}

/// Handle to a live subscription.
///
/// Dropping the handle unregisters the subscriber.
pub struct SubscriptionHandle {
    pub id: SubscriberId,
    /// Channel to receive notifications.
    pub receiver: crossbeam_channel::Receiver<Notification>,
    pub(super) registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    /// Receive the next notification (blocking).
    pub fn recv(&self) -> Result<Notification, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notification (non-blocking).
    pub fn try_recv(&self) -> Result<Notification, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Notification, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<Notification> {
        self.receiver.try_iter().collect()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id, DropReason::Disconnected);
        }
    }
}
