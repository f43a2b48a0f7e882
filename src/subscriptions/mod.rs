//! Subscription registry for live chat updates.
//!
//! Every real-time client connection registers here and receives the
//! mutations accepted by the store:
//! - Message creations, with the full canonical record
//! - Content edits
//! - Deletions
//!
//! Each subscriber owns a bounded queue. A subscriber whose queue is full or
//! whose receiver is gone is dropped instead of slowing down the publisher.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(SubscriptionRegistry::new(RegistryLimits::default()));
//! let handle = registry.register(SubscriptionConfig::default())?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(Notification::Mutation(event)) => println!("{:?}", event),
//!         Ok(Notification::Dropped { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod registry;
mod types;

pub use registry::{RegistryLimits, Subscriber, SubscriptionRegistry};
pub use types::{DropReason, Notification, SubscriptionConfig, SubscriptionHandle};
