//! Integration tests for the chat core.

use chatline::{
    snapshot_json, ChatConfig, ChatCore, ChatError, MutationEvent, Notification, PushEnvelope,
    PushKind, Reply, Sequence, SubscriptionConfig,
};
use std::time::Duration;
use tempfile::TempDir;

fn durable_config(dir: &TempDir) -> ChatConfig {
    ChatConfig::durable(dir.path().join("chat"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// --- Realistic Workflow Tests ---

#[test]
fn test_conversation_workflow() {
    init_tracing();
    let core = ChatCore::in_memory().unwrap();

    let x = core.create("alice", "hi").unwrap();
    assert_eq!(x.sequence, Sequence(1));
    let y = core.create("bob", "yo").unwrap();
    assert_eq!(y.sequence, Sequence(2));

    let ids: Vec<_> = core.list_all().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![x.id.clone(), y.id.clone()]);

    // Author edits their own message
    let edited = core.edit(&x.id, "alice", "hi there").unwrap();
    assert_eq!(edited.content, "hi there");

    // Someone else can't
    let result = core.edit(&x.id, "bob", "hack");
    assert!(matches!(result, Err(ChatError::Forbidden { .. })));
    assert_eq!(core.get(&x.id).unwrap().content, "hi there");

    // Delete, then delete again
    core.delete(&y.id, "bob").unwrap();
    assert!(matches!(core.delete(&y.id, "bob"), Err(ChatError::NotFound(_))));

    let remaining = core.list_all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, x.id);
}

#[test]
fn test_subscriber_sees_create_first() {
    let core = ChatCore::in_memory().unwrap();
    let feed = core.subscribe(SubscriptionConfig::default()).unwrap();

    let z = core.create("alice", "z").unwrap();
    core.edit(&z.id, "alice", "zz").unwrap();

    let first = feed.recv_timeout(Duration::from_millis(100)).unwrap();
    match first {
        Notification::Mutation(MutationEvent::Created(msg)) => assert_eq!(msg.id, z.id),
        other => panic!("Expected Created event, got {:?}", other),
    }

    let second = feed.recv_timeout(Duration::from_millis(100)).unwrap();
    assert_eq!(
        second,
        Notification::Mutation(MutationEvent::Edited {
            id: z.id.clone(),
            content: "zz".into()
        })
    );

    // Exactly one event per mutation
    assert!(feed.try_recv().is_err());
}

#[test]
fn test_late_subscriber_only_sees_later_events() {
    let core = ChatCore::in_memory().unwrap();
    core.create("alice", "before").unwrap();

    let feed = core.subscribe(SubscriptionConfig::default()).unwrap();
    let after = core.create("alice", "after").unwrap();

    let events = feed.drain();
    assert_eq!(
        events,
        vec![Notification::Mutation(MutationEvent::Created(after))]
    );
}

#[test]
fn test_push_envelopes_for_gateway() {
    let core = ChatCore::in_memory().unwrap();
    let feed = core.subscribe(SubscriptionConfig::default()).unwrap();

    let msg = core.create("alice", "hello").unwrap();
    core.delete(&msg.id, "alice").unwrap();

    let kinds: Vec<_> = feed
        .drain()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Mutation(event) => Some(event),
            _ => None,
        })
        .map(|event| {
            let text = PushEnvelope::from_event(&event).unwrap().to_json().unwrap();
            // Clients parse once; the envelope is an object, not a string
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert!(value.is_object());
            let key = if value["msgType"] == "create" { "id" } else { "msgId" };
            assert_eq!(value["payload"][key], msg.id.as_str());
            PushEnvelope::decode(&text).unwrap().msg_type
        })
        .collect();

    assert_eq!(kinds, vec![PushKind::Create, PushKind::Delete]);
}

#[test]
fn test_json_request_flow() {
    let core = ChatCore::in_memory().unwrap();

    let reply = core
        .handle_json(r#"{"reqType":"create","payload":{"author":"alice","content":"hi"}}"#)
        .unwrap();
    let created = match reply {
        Reply::Created(msg) => msg,
        other => panic!("Expected Created, got {:?}", other),
    };

    // Canonical record comes back on the same call
    assert_eq!(created.author, "alice");
    assert_eq!(created.sequence, 1);
    assert!(created.time > 0);

    let poll: serde_json::Value =
        serde_json::from_str(&snapshot_json(&core.list_all()).unwrap()).unwrap();
    assert_eq!(poll.as_array().unwrap().len(), 1);
    assert_eq!(poll[0]["id"], created.id.as_str());
}

// --- Durability Tests ---

#[test]
fn test_durable_restart_preserves_messages() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let (x, y) = {
        let core = ChatCore::open(durable_config(&dir)).unwrap();
        let x = core.create("alice", "hi").unwrap();
        let y = core.create("bob", "yo").unwrap();
        core.edit(&x.id, "alice", "hi there").unwrap();
        (x, y)
    };

    let core = ChatCore::open(durable_config(&dir)).unwrap();
    let all = core.list_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, x.id);
    assert_eq!(all[0].content, "hi there");
    assert_eq!(all[0].created_at, x.created_at);
    assert_eq!(all[1], y);
}

#[test]
fn test_sequences_not_reused_after_restart() {
    let dir = TempDir::new().unwrap();

    let deleted = {
        let core = ChatCore::open(durable_config(&dir)).unwrap();
        core.create("alice", "one").unwrap();
        let two = core.create("alice", "two").unwrap();
        core.delete(&two.id, "alice").unwrap();
        two
    };

    let core = ChatCore::open(durable_config(&dir)).unwrap();
    let three = core.create("alice", "three").unwrap();
    assert_eq!(three.sequence, Sequence(3));
    assert_ne!(three.id, deleted.id);

    // The deleted id stays gone
    assert!(matches!(
        core.edit(&deleted.id, "alice", "revive"),
        Err(ChatError::NotFound(_))
    ));
}

#[test]
fn test_shutdown_then_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let core = ChatCore::open(durable_config(&dir)).unwrap();
        core.create("alice", "persisted").unwrap();
        core.shutdown().unwrap();
        assert!(matches!(
            core.create("alice", "rejected"),
            Err(ChatError::ShutDown)
        ));
    }

    let core = ChatCore::open(durable_config(&dir)).unwrap();
    let all = core.list_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, "persisted");
}
