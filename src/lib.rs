//! # Chatline
//!
//! The server-side core of a real-time chat: an ordered message store that
//! fans every accepted mutation out to live subscribers.
//!
//! ## Core Concepts
//!
//! - **Messages**: Records with a store-assigned id, a strictly increasing
//!   sequence, and a creation time
//! - **Mutations**: create, edit, and delete, applied atomically and
//!   authorized by a pluggable policy
//! - **Subscribers**: Live push channels with bounded queues; slow ones are
//!   dropped rather than slowing anyone down
//! - **Durability**: An optional checksummed append log, replayed on open
//!
//! ## Example
//!
//! ```ignore
//! use chatline::{ChatConfig, ChatCore, Notification, PushEnvelope, SubscriptionConfig};
//!
//! let core = ChatCore::open(ChatConfig::durable("./chat-data"))?;
//! let feed = core.subscribe(SubscriptionConfig::default())?;
//!
//! let msg = core.create("alice", "hi")?;
//! core.edit(&msg.id, "alice", "hi there")?;
//!
//! while let Ok(Notification::Mutation(event)) = feed.try_recv() {
//!     let json = PushEnvelope::from_event(&event)?.to_json()?;
//!     // write `json` to the client's socket
//! }
//! ```

pub mod allocator;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod policy;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod wire;

// Re-exports
pub use allocator::{Allocation, IdAllocator};
pub use chat::ChatCore;
pub use config::ChatConfig;
pub use dispatch::{Dispatcher, PublishReport, PublishTicket};
pub use error::{ChatError, ErrorKind, Result};
pub use policy::{Action, AuthorPolicy, SameAuthor};
pub use store::{FileLog, LogEntry, MemoryLog, MessageLog, MessageStore, StoreLimits};
pub use subscriptions::{
    DropReason, Notification, RegistryLimits, Subscriber, SubscriptionConfig,
    SubscriptionHandle, SubscriptionRegistry,
};
pub use types::*;
pub use wire::{
    snapshot_json, ClientRequest, CreateRequest, DeleteRequest, EditRequest, ErrorReply,
    PushEnvelope, PushKind, Reply, WireMessage, ENVELOPE_VERSION,
};
