//! Ordering and identity allocation.
//!
//! Produces `(id, sequence, created_at)` triples. The sequence counter is the
//! single global serialization point of the core, so the critical section only
//! bumps the counter and reads the clock. Hashing the id happens outside it.

use crate::error::{ChatError, Result};
use crate::types::{MessageId, Sequence, Timestamp};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Number of hash bytes kept in a message id (hex-encoded to twice this).
const ID_BYTES: usize = 12;

/// A freshly allocated identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub id: MessageId,
    pub sequence: Sequence,
    pub created_at: Timestamp,
}

struct Counter {
    /// Next sequence to hand out.
    next: Sequence,
    /// Last timestamp handed out; creation times never go backwards.
    last_created: Timestamp,
}

/// Allocates strictly increasing sequences and unique, unguessable ids.
pub struct IdAllocator {
    counter: Mutex<Counter>,
    /// Per-process salt mixed into ids so they can't be derived from the sequence.
    salt: [u8; 32],
}

impl IdAllocator {
    /// Create an allocator starting at sequence 1.
    pub fn new() -> Self {
        Self::starting_at(Sequence(1))
    }

    /// Create an allocator whose first sequence is `first`.
    pub fn starting_at(first: Sequence) -> Self {
        Self {
            counter: Mutex::new(Counter {
                next: first,
                last_created: Timestamp(0),
            }),
            salt: process_salt(),
        }
    }

    /// Allocate the next identity.
    pub fn allocate(&self) -> Result<Allocation> {
        let (sequence, created_at) = {
            let mut counter = self.counter.lock();
            let sequence = counter.next;
            counter.next = sequence
                .next()
                .ok_or_else(|| ChatError::AllocationFailure("sequence space exhausted".into()))?;
            let created_at = Timestamp::now().max(counter.last_created);
            counter.last_created = created_at;
            (sequence, created_at)
        };

        Ok(Allocation {
            id: self.derive_id(sequence),
            sequence,
            created_at,
        })
    }

    /// Ensure future allocations are strictly above `seen`.
    ///
    /// Used when replaying a durable log, so sequences of deleted messages
    /// are not handed out again.
    pub fn advance_past(&self, seen: Sequence) -> Result<()> {
        let mut counter = self.counter.lock();
        if seen >= counter.next {
            counter.next = seen
                .next()
                .ok_or_else(|| ChatError::AllocationFailure("sequence space exhausted".into()))?;
        }
        Ok(())
    }

    /// The sequence the next allocation will receive.
    pub fn peek_next(&self) -> Sequence {
        self.counter.lock().next
    }

    fn derive_id(&self, sequence: Sequence) -> MessageId {
        let mut hasher = Sha256::new();
        hasher.update(self.salt);
        hasher.update(sequence.0.to_le_bytes());
        let digest = hasher.finalize();
        MessageId(hex::encode(&digest[..ID_BYTES]))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn process_salt() -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(Timestamp::now().0.to_le_bytes());
    // Address of a fresh heap allocation adds some per-instance entropy.
    let marker = Box::new(0u8);
    hasher.update((&*marker as *const u8 as usize).to_le_bytes());
    hasher.finalize().into()
}
