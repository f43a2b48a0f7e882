//! The message store: single writer of the message record set.

use crate::allocator::IdAllocator;
use crate::dispatch::Dispatcher;
use crate::error::{ChatError, Result};
use crate::policy::{Action, AuthorPolicy};
use crate::types::{Message, MessageId, MutationEvent, Sequence};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::log::{LogEntry, MessageLog};

/// Validation limits applied to incoming mutations.
#[derive(Clone, Copy, Debug)]
pub struct StoreLimits {
    /// Max content length in bytes.
    pub max_content_len: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_content_len: 4096,
        }
    }
}

#[derive(Default)]
struct Records {
    /// Live messages in creation order.
    by_sequence: BTreeMap<Sequence, Message>,
    /// Live id -> sequence.
    index: HashMap<MessageId, Sequence>,
}

impl Records {
    fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        let seq = self.index.get(id)?;
        self.by_sequence.get_mut(seq)
    }

    fn insert(&mut self, message: Message) {
        self.index.insert(message.id.clone(), message.sequence);
        self.by_sequence.insert(message.sequence, message);
    }

    fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let seq = self.index.remove(id)?;
        self.by_sequence.remove(&seq)
    }

    fn apply(&mut self, entry: LogEntry) {
        match entry {
            LogEntry::Created(message) => self.insert(message),
            LogEntry::Edited { id, content } => match self.get_mut(&id) {
                Some(message) => message.content = content,
                None => tracing::warn!(id = %id, "replayed edit for unknown message"),
            },
            LogEntry::Deleted { id } => {
                if self.remove(&id).is_none() {
                    tracing::warn!(id = %id, "replayed delete for unknown message");
                }
            }
        }
    }
}

/// Durable keyed record of messages.
///
/// Owns identity assignment and mutation application. All mutations run under
/// one write lock, so operations on the same id never interleave and sequence
/// order equals acceptance order. Accepted events are handed to the
/// dispatcher in that same order.
pub struct MessageStore {
    records: RwLock<Records>,
    allocator: IdAllocator,
    log: Box<dyn MessageLog>,
    policy: Box<dyn AuthorPolicy>,
    dispatcher: Arc<Dispatcher>,
    limits: StoreLimits,
    closed: AtomicBool,
}

impl MessageStore {
    /// Build a store on top of `log`, replaying whatever it already holds.
    pub fn open(
        log: Box<dyn MessageLog>,
        policy: Box<dyn AuthorPolicy>,
        dispatcher: Arc<Dispatcher>,
        limits: StoreLimits,
    ) -> Result<Self> {
        let allocator = IdAllocator::new();
        let mut records = Records::default();

        let entries = log.replay()?;
        let replayed = entries.len();
        for entry in entries {
            if let LogEntry::Created(ref message) = entry {
                allocator.advance_past(message.sequence)?;
            }
            records.apply(entry);
        }

        if replayed > 0 {
            tracing::info!(
                entries = replayed,
                live = records.by_sequence.len(),
                next_sequence = %allocator.peek_next(),
                "message store replayed"
            );
        }

        Ok(Self {
            records: RwLock::new(records),
            allocator,
            log,
            policy,
            dispatcher,
            limits,
            closed: AtomicBool::new(false),
        })
    }

    // --- Mutations ---

    /// Create a message. Returns the canonical record.
    pub fn create(&self, author: &str, content: &str) -> Result<Message> {
        validate_author(author)?;
        self.validate_content(content)?;

        let mut records = self.records.write();
        self.ensure_open()?;

        // Ids hash a never-repeated sequence, so a clash with a live id
        // means the allocator is broken.
        let alloc = self.allocator.allocate()?;
        if records.index.contains_key(&alloc.id) {
            return Err(ChatError::AllocationFailure(format!(
                "id {} already assigned",
                alloc.id
            )));
        }

        let message = Message {
            id: alloc.id,
            author: author.to_string(),
            content: content.to_string(),
            sequence: alloc.sequence,
            created_at: alloc.created_at,
        };

        self.log.append(&LogEntry::Created(message.clone()))?;
        records.insert(message.clone());

        let ticket = self.dispatcher.ticket();
        drop(records);

        tracing::debug!(id = %message.id, sequence = %message.sequence, author, "message created");
        ticket.publish(MutationEvent::Created(message.clone()));

        Ok(message)
    }

    /// Replace the content of an existing message. Returns the updated record.
    ///
    /// Checked in order: the id must be live, the author permitted, then the
    /// new content valid.
    pub fn edit(&self, id: &MessageId, author: &str, content: &str) -> Result<Message> {
        let mut records = self.records.write();
        self.ensure_open()?;

        let message = records
            .get_mut(id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;
        if !self.policy.permits(Action::Edit, author, message) {
            tracing::warn!(id = %id, author, "edit rejected by policy");
            return Err(ChatError::Forbidden {
                id: id.clone(),
                author: author.to_string(),
            });
        }
        self.validate_content(content)?;

        self.log.append(&LogEntry::Edited {
            id: id.clone(),
            content: content.to_string(),
        })?;
        message.content = content.to_string();
        let updated = message.clone();

        let ticket = self.dispatcher.ticket();
        drop(records);

        tracing::debug!(id = %id, sequence = %updated.sequence, "message edited");
        ticket.publish(MutationEvent::Edited {
            id: id.clone(),
            content: updated.content.clone(),
        });

        Ok(updated)
    }

    /// Remove a message. Its id is never reused.
    pub fn delete(&self, id: &MessageId, author: &str) -> Result<()> {
        let mut records = self.records.write();
        self.ensure_open()?;

        let permitted = match records.get_mut(id) {
            Some(message) => self.policy.permits(Action::Delete, author, message),
            None => return Err(ChatError::NotFound(id.clone())),
        };
        if !permitted {
            tracing::warn!(id = %id, author, "delete rejected by policy");
            return Err(ChatError::Forbidden {
                id: id.clone(),
                author: author.to_string(),
            });
        }

        self.log.append(&LogEntry::Deleted { id: id.clone() })?;
        records.remove(id);

        let ticket = self.dispatcher.ticket();
        drop(records);

        tracing::debug!(id = %id, "message deleted");
        ticket.publish(MutationEvent::Deleted { id: id.clone() });

        Ok(())
    }

    // --- Reads ---

    /// All live messages, ordered by sequence.
    pub fn list_all(&self) -> Vec<Message> {
        self.records.read().by_sequence.values().cloned().collect()
    }

    /// The newest `limit` live messages, ordered by sequence.
    pub fn list_recent(&self, limit: usize) -> Vec<Message> {
        let records = self.records.read();
        let mut recent: Vec<_> = records
            .by_sequence
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// Look up a live message.
    pub fn get(&self, id: &MessageId) -> Option<Message> {
        let records = self.records.read();
        let seq = records.index.get(id)?;
        records.by_sequence.get(seq).cloned()
    }

    /// Number of live messages.
    pub fn len(&self) -> usize {
        self.records.read().by_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Lifecycle ---

    /// Flush the backing log.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Reject all further mutations. Waits for in-flight ones to finish.
    pub fn close(&self) -> Result<()> {
        let _records = self.records.write();
        self.closed.store(true, Ordering::Release);
        self.log.sync()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(ChatError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() || content.len() > self.limits.max_content_len {
            return Err(ChatError::InvalidContent);
        }
        Ok(())
    }
}

fn validate_author(author: &str) -> Result<()> {
    if author.trim().is_empty() {
        return Err(ChatError::InvalidAuthor);
    }
    Ok(())
}
