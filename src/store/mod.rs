//! Message store and its persistence backends.

mod log;
mod messages;

pub use log::{FileLog, LogEntry, MemoryLog, MessageLog};
pub use messages::{MessageStore, StoreLimits};
