//! Error types for the chat core.

use crate::types::MessageId;
use thiserror::Error;

/// Main error type for chat core operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message content is empty or invalid")]
    InvalidContent,

    #[error("Author is empty")]
    InvalidAuthor,

    #[error("Message not found: {0}")]
    NotFound(MessageId),

    #[error("Author {author} may not modify message {id}")]
    Forbidden { id: MessageId, author: String },

    #[error("Subscriber unavailable: {0}")]
    SubscriberUnavailable(String),

    #[error("Identity allocation failed: {0}")]
    AllocationFailure(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Message log is locked by another process")]
    Locked,

    #[error("Store not initialized at {0}")]
    NotInitialized(String),

    #[error("Chat core is shut down")]
    ShutDown,
}

/// Coarse error classification used to pick a transport status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidContent,
    InvalidAuthor,
    BadRequest,
    NotFound,
    Forbidden,
    SubscriberUnavailable,
    AllocationFailure,
    ShutDown,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable name.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidContent => "invalid_content",
            ErrorKind::InvalidAuthor => "invalid_author",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::SubscriberUnavailable => "subscriber_unavailable",
            ErrorKind::AllocationFailure => "allocation_failure",
            ErrorKind::ShutDown => "shut_down",
            ErrorKind::Internal => "internal",
        }
    }

    /// HTTP-style status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidContent | ErrorKind::InvalidAuthor | ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::ShutDown => 503,
            ErrorKind::SubscriberUnavailable | ErrorKind::AllocationFailure | ErrorKind::Internal => {
                500
            }
        }
    }
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::InvalidContent => ErrorKind::InvalidContent,
            ChatError::InvalidAuthor => ErrorKind::InvalidAuthor,
            ChatError::BadRequest(_) => ErrorKind::BadRequest,
            ChatError::NotFound(_) => ErrorKind::NotFound,
            ChatError::Forbidden { .. } => ErrorKind::Forbidden,
            ChatError::SubscriberUnavailable(_) => ErrorKind::SubscriberUnavailable,
            ChatError::AllocationFailure(_) => ErrorKind::AllocationFailure,
            ChatError::ShutDown => ErrorKind::ShutDown,
            ChatError::Io(_)
            | ChatError::Serialization(_)
            | ChatError::Deserialization(_)
            | ChatError::Corruption(_)
            | ChatError::InvalidFormat(_)
            | ChatError::ChecksumMismatch { .. }
            | ChatError::Locked
            | ChatError::NotInitialized(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ChatError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ChatError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        ChatError::Deserialization(e.to_string())
    }
}

/// Result type for chat core operations.
pub type Result<T> = std::result::Result<T, ChatError>;
