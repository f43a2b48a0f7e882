//! Authorization policy applied ahead of every edit and delete.
//!
//! Authors are asserted by clients and never verified, so the default policy
//! is advisory only. A real credential check can be swapped in here without
//! touching the store.

use crate::types::Message;

/// Mutation being authorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Edit,
    Delete,
}

/// Decides whether `actor` may apply `action` to an existing message.
pub trait AuthorPolicy: Send + Sync {
    fn permits(&self, action: Action, actor: &str, message: &Message) -> bool;
}

/// Only the original author may edit or delete.
#[derive(Clone, Copy, Debug, Default)]
pub struct SameAuthor;

impl AuthorPolicy for SameAuthor {
    fn permits(&self, _action: Action, actor: &str, message: &Message) -> bool {
        actor == message.author
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageId, Sequence, Timestamp};

    #[test]
    fn test_same_author() {
        let msg = Message {
            id: MessageId::from("m1"),
            author: "alice".into(),
            content: "hi".into(),
            sequence: Sequence(1),
            created_at: Timestamp(0),
        };
        assert!(SameAuthor.permits(Action::Edit, "alice", &msg));
        assert!(!SameAuthor.permits(Action::Delete, "bob", &msg));
        // Comparison is exact
        assert!(!SameAuthor.permits(Action::Edit, "Alice", &msg));
    }
}
