//! JSON wire formats shared with the gateway and browser clients.
//!
//! Inbound requests use `{"reqType": ..., "payload": {...}}`. Outbound pushes
//! use one versioned envelope, `{"version": 1, "msgType": ..., "payload": {...}}`,
//! always serialized exactly once as a JSON object.

use crate::error::{ChatError, Result};
use crate::types::{Message, MessageId, MutationEvent, Sequence, Timestamp};
use serde::{Deserialize, Serialize};

/// Version of the push envelope format.
pub const ENVELOPE_VERSION: u32 = 1;

/// A client operation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reqType", content = "payload", rename_all = "lowercase")]
pub enum ClientRequest {
    Create(CreateRequest),
    Edit(EditRequest),
    Delete(DeleteRequest),
}

impl ClientRequest {
    /// Decode a request body. Malformed input is a `BadRequest`.
    pub fn decode(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ChatError::BadRequest(e.to_string()))
    }
}

/// Any extra fields a client sends (its own id or time guess) are ignored;
/// the store assigns both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub author: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub msg_id: String,
    pub author: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub msg_id: String,
    pub author: String,
}

/// A message as clients see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub author: String,
    pub content: String,
    pub sequence: u64,
    /// Creation time, milliseconds since Unix epoch.
    pub time: i64,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.0.clone(),
            author: msg.author.clone(),
            content: msg.content.clone(),
            sequence: msg.sequence.0,
            time: msg.created_at.as_millis(),
        }
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            id: MessageId(wire.id),
            author: wire.author,
            content: wire.content,
            sequence: Sequence(wire.sequence),
            created_at: Timestamp(wire.time.saturating_mul(1000)),
        }
    }
}

/// Synchronous reply to a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "message", rename_all = "lowercase")]
pub enum Reply {
    /// The canonical record of a new message.
    Created(WireMessage),
    /// The updated record.
    Edited(WireMessage),
    Deleted,
}

impl Reply {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Failure reply. Carries the error kind so the gateway can pick a status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub status: u16,
    pub message: String,
}

impl From<&ChatError> for ErrorReply {
    fn from(err: &ChatError) -> Self {
        let kind = err.kind();
        Self {
            error: kind.name().to_string(),
            status: kind.status_code(),
            message: err.to_string(),
        }
    }
}

/// Push type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushKind {
    Create,
    Edit,
    Delete,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditPush {
    msg_id: String,
    content: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletePush {
    msg_id: String,
}

/// Outbound real-time notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    pub version: u32,
    pub msg_type: PushKind,
    pub payload: serde_json::Value,
}

impl PushEnvelope {
    pub fn from_event(event: &MutationEvent) -> Result<Self> {
        let (msg_type, payload) = match event {
            MutationEvent::Created(msg) => {
                (PushKind::Create, serde_json::to_value(WireMessage::from(msg))?)
            }
            MutationEvent::Edited { id, content } => (
                PushKind::Edit,
                serde_json::to_value(EditPush {
                    msg_id: id.0.clone(),
                    content: content.clone(),
                })?,
            ),
            MutationEvent::Deleted { id } => (
                PushKind::Delete,
                serde_json::to_value(DeletePush {
                    msg_id: id.0.clone(),
                })?,
            ),
        };

        Ok(Self {
            version: ENVELOPE_VERSION,
            msg_type,
            payload,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an envelope, rejecting versions this build doesn't speak.
    pub fn decode(text: &str) -> Result<Self> {
        let envelope: PushEnvelope =
            serde_json::from_str(text).map_err(|e| ChatError::Deserialization(e.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(ChatError::InvalidFormat(format!(
                "Unsupported envelope version: {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }

    /// Recover the event carried by this envelope.
    pub fn into_event(self) -> Result<MutationEvent> {
        let de = |e: serde_json::Error| ChatError::Deserialization(e.to_string());
        Ok(match self.msg_type {
            PushKind::Create => {
                let wire: WireMessage = serde_json::from_value(self.payload).map_err(de)?;
                MutationEvent::Created(wire.into())
            }
            PushKind::Edit => {
                let edit: EditPush = serde_json::from_value(self.payload).map_err(de)?;
                MutationEvent::Edited {
                    id: MessageId(edit.msg_id),
                    content: edit.content,
                }
            }
            PushKind::Delete => {
                let delete: DeletePush = serde_json::from_value(self.payload).map_err(de)?;
                MutationEvent::Deleted {
                    id: MessageId(delete.msg_id),
                }
            }
        })
    }
}

/// Poll/read response: all given messages as a JSON array, in sequence order.
pub fn snapshot_json(messages: &[Message]) -> Result<String> {
    let wire: Vec<WireMessage> = messages.iter().map(WireMessage::from).collect();
    Ok(serde_json::to_string(&wire)?)
}
