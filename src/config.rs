//! Chat core configuration.

use crate::store::StoreLimits;
use crate::subscriptions::RegistryLimits;
use std::path::PathBuf;

/// Chat core configuration.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Directory for the durable message log. `None` keeps messages in memory only.
    pub path: Option<PathBuf>,

    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,

    /// fsync after every log append.
    pub sync_every_write: bool,

    /// Default per-subscriber queue capacity.
    pub subscriber_buffer: usize,

    /// Max concurrently registered subscribers.
    pub max_subscribers: usize,

    /// Max message content length in bytes.
    pub max_content_len: usize,

    /// Page size of `list_recent`.
    pub recent_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
            sync_every_write: true,
            subscriber_buffer: 256,
            max_subscribers: 10_000,
            max_content_len: 4096,
            recent_limit: 50,
        }
    }
}

impl ChatConfig {
    /// Durable configuration rooted at `path`.
    pub fn durable(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub(crate) fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_content_len: self.max_content_len,
        }
    }

    pub(crate) fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            default_buffer_size: self.subscriber_buffer,
            max_subscribers: self.max_subscribers,
        }
    }
}
