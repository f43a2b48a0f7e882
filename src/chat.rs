//! `ChatCore` ties the store, registry, and dispatcher together.

use crate::config::ChatConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ChatError, Result};
use crate::policy::{AuthorPolicy, SameAuthor};
use crate::store::{FileLog, MemoryLog, MessageLog, MessageStore};
use crate::subscriptions::{DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionRegistry};
use crate::types::{Message, MessageId, SubscriberId};
use crate::wire::{ClientRequest, Reply, WireMessage};
use std::sync::Arc;

/// The real-time messaging core.
///
/// Request handlers call the mutation methods (or [`ChatCore::handle`]) and
/// get the canonical result back synchronously; push connections call
/// [`ChatCore::subscribe`] and read accepted mutations from their handle.
pub struct ChatCore {
    config: ChatConfig,
    store: MessageStore,
    registry: Arc<SubscriptionRegistry>,
}

impl ChatCore {
    /// Open with the default same-author policy.
    pub fn open(config: ChatConfig) -> Result<Self> {
        Self::with_policy(config, Box::new(SameAuthor))
    }

    /// In-memory core with default settings.
    pub fn in_memory() -> Result<Self> {
        Self::open(ChatConfig::default())
    }

    /// Open with a custom authorization policy.
    pub fn with_policy(config: ChatConfig, policy: Box<dyn AuthorPolicy>) -> Result<Self> {
        let log: Box<dyn MessageLog> = match &config.path {
            Some(path) => {
                if !path.exists() && !config.create_if_missing {
                    return Err(ChatError::NotInitialized(path.display().to_string()));
                }
                Box::new(FileLog::open(path, config.sync_every_write)?)
            }
            None => Box::new(MemoryLog),
        };

        let registry = Arc::new(SubscriptionRegistry::new(config.registry_limits()));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));
        let store = MessageStore::open(log, policy, dispatcher, config.store_limits())?;

        tracing::info!(
            durable = config.path.is_some(),
            messages = store.len(),
            "chat core opened"
        );

        Ok(Self {
            config,
            store,
            registry,
        })
    }

    // --- Operations ---

    pub fn create(&self, author: &str, content: &str) -> Result<Message> {
        self.store.create(author, content)
    }

    pub fn edit(&self, id: &MessageId, author: &str, content: &str) -> Result<Message> {
        self.store.edit(id, author, content)
    }

    pub fn delete(&self, id: &MessageId, author: &str) -> Result<()> {
        self.store.delete(id, author)
    }

    pub fn list_all(&self) -> Vec<Message> {
        self.store.list_all()
    }

    /// Newest messages, up to the configured page size.
    pub fn list_recent(&self) -> Vec<Message> {
        self.store.list_recent(self.config.recent_limit)
    }

    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.store.get(id)
    }

    /// Apply a decoded client request.
    pub fn handle(&self, request: ClientRequest) -> Result<Reply> {
        let result = match request {
            ClientRequest::Create(req) => self
                .create(&req.author, &req.content)
                .map(|msg| Reply::Created(WireMessage::from(&msg))),
            ClientRequest::Edit(req) => self
                .edit(&MessageId(req.msg_id), &req.author, &req.content)
                .map(|msg| Reply::Edited(WireMessage::from(&msg))),
            ClientRequest::Delete(req) => self
                .delete(&MessageId(req.msg_id), &req.author)
                .map(|()| Reply::Deleted),
        };

        if let Err(ref e) = result {
            tracing::debug!(error = %e, kind = e.kind().name(), "request rejected");
        }
        result
    }

    /// Decode and apply a JSON request body.
    pub fn handle_json(&self, body: &str) -> Result<Reply> {
        self.handle(ClientRequest::decode(body)?)
    }

    // --- Subscriptions ---

    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        self.registry.register(config)
    }

    /// Returns whether the subscriber was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.registry.unregister(id, DropReason::Unsubscribed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    // --- Lifecycle ---

    /// Stop accepting mutations, flush the log, and drain all subscribers.
    pub fn shutdown(&self) -> Result<()> {
        self.store.close()?;
        let drained = self.registry.drain();
        tracing::info!(subscribers = drained, "chat core shut down");
        Ok(())
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::Notification;
    use crate::types::MutationEvent;

    #[test]
    fn test_handle_round_trip() {
        let core = ChatCore::in_memory().unwrap();

        let reply = core
            .handle_json(r#"{"reqType":"create","payload":{"author":"alice","content":"hi"}}"#)
            .unwrap();
        let created = match reply {
            Reply::Created(msg) => msg,
            other => panic!("Expected Created, got {:?}", other),
        };
        assert_eq!(created.sequence, 1);

        let body = format!(
            r#"{{"reqType":"edit","payload":{{"msgId":"{}","author":"bob","content":"hack"}}}}"#,
            created.id
        );
        let err = core.handle_json(&body).unwrap_err();
        assert_eq!(err.kind().status_code(), 403);

        let body = format!(
            r#"{{"reqType":"delete","payload":{{"msgId":"{}","author":"alice"}}}}"#,
            created.id
        );
        assert_eq!(core.handle_json(&body).unwrap(), Reply::Deleted);
        assert!(core.list_all().is_empty());
    }

    #[test]
    fn test_custom_policy() {
        struct Moderated;
        impl AuthorPolicy for Moderated {
            fn permits(
                &self,
                _action: crate::policy::Action,
                actor: &str,
                message: &Message,
            ) -> bool {
                actor == "mod" || actor == message.author
            }
        }

        let core = ChatCore::with_policy(ChatConfig::default(), Box::new(Moderated)).unwrap();
        let msg = core.create("alice", "spam").unwrap();
        core.delete(&msg.id, "mod").unwrap();
        assert!(core.get(&msg.id).is_none());
    }

    #[test]
    fn test_shutdown_drains_and_rejects() {
        let core = ChatCore::in_memory().unwrap();
        let handle = core.subscribe(SubscriptionConfig::default()).unwrap();
        let msg = core.create("alice", "z").unwrap();

        core.shutdown().unwrap();

        assert_eq!(
            handle.drain(),
            vec![
                Notification::Mutation(MutationEvent::Created(msg)),
                Notification::Dropped {
                    reason: DropReason::Shutdown
                },
            ]
        );
        assert_eq!(core.subscriber_count(), 0);
        assert!(matches!(core.create("alice", "late"), Err(ChatError::ShutDown)));
        assert!(matches!(
            core.subscribe(SubscriptionConfig::default()),
            Err(ChatError::ShutDown)
        ));
    }

    #[test]
    fn test_list_recent_uses_config() {
        let core = ChatCore::open(ChatConfig {
            recent_limit: 2,
            ..Default::default()
        })
        .unwrap();
        for i in 0..5 {
            core.create("alice", &format!("m{}", i)).unwrap();
        }
        let recent: Vec<_> = core.list_recent().into_iter().map(|m| m.content).collect();
        assert_eq!(recent, vec!["m3", "m4"]);
    }
}
