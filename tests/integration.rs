//! Integration tests for the relay: stream -> filter -> rooms, and commands.

use crossbeam_channel::{unbounded, Receiver, Sender};
use feed_relay::{
    Account, AccountDirectory, AccountId, ChannelPublisher, FeedEvent, FeedSource, FilterMode,
    MemoryStore, OutboundMessage, Relationship, Relay, RelayConfig, Result, Status,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Feed whose sessions are handed to the test as senders. With a gate,
/// every open after the first waits for a release from the test.
struct TestFeed {
    sessions: Sender<Sender<FeedEvent>>,
    gate: Option<Receiver<()>>,
    opens: AtomicUsize,
}

impl FeedSource for TestFeed {
    fn open_stream(&self) -> Result<Receiver<FeedEvent>> {
        if self.opens.fetch_add(1, Ordering::SeqCst) > 0 {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
        }
        let (tx, rx) = unbounded();
        let _ = self.sessions.send(tx);
        Ok(rx)
    }
}

/// Directory that knows one account and answers follows with a fixed
/// relationship.
struct TestDirectory {
    account: Account,
    relationship: Relationship,
    follows: Arc<Mutex<Vec<AccountId>>>,
}

impl AccountDirectory for TestDirectory {
    fn search_account(&self, query: &str) -> Result<Option<Account>> {
        if query == format!("@{}", self.account.acct) {
            Ok(Some(self.account.clone()))
        } else {
            Ok(None)
        }
    }

    fn follow_account(&self, id: &AccountId) -> Result<Relationship> {
        self.follows.lock().push(id.clone());
        Ok(self.relationship.clone())
    }
}

struct Harness {
    relay: Relay<TestDirectory>,
    sessions: Receiver<Sender<FeedEvent>>,
    outbound: Receiver<OutboundMessage>,
    follows: Arc<Mutex<Vec<AccountId>>>,
}

fn test_config() -> RelayConfig {
    RelayConfig {
        base_url: "https://example.social".to_string(),
        access_token: "token".to_string(),
        command_prefix: "!".to_string(),
        reconnect_backoff: Duration::from_millis(20),
        store_path: None,
    }
}

fn start_relay(relationship: Relationship) -> Harness {
    start_relay_with_gate(relationship, None)
}

fn start_relay_with_gate(relationship: Relationship, gate: Option<Receiver<()>>) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (sessions_tx, sessions) = unbounded();
    let (outbound_tx, outbound) = unbounded();
    let follows = Arc::new(Mutex::new(Vec::new()));

    let directory = TestDirectory {
        account: Account {
            id: AccountId("42".to_string()),
            acct: "user@example.social".to_string(),
            username: "user".to_string(),
            url: "https://example.social/@user".to_string(),
        },
        relationship,
        follows: Arc::clone(&follows),
    };

    let relay = Relay::start(
        &test_config(),
        Arc::new(MemoryStore::new()),
        TestFeed {
            sessions: sessions_tx,
            gate,
            opens: AtomicUsize::new(0),
        },
        ChannelPublisher::new(outbound_tx),
        directory,
    )
    .unwrap();

    Harness {
        relay,
        sessions,
        outbound,
        follows,
    }
}

fn following() -> Relationship {
    Relationship {
        following: true,
        ..Default::default()
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn status(value: serde_json::Value) -> Status {
    serde_json::from_value(value).unwrap()
}

// --- Stream to rooms ---

#[test]
fn test_post_is_relayed_to_subscribed_room() {
    let h = start_relay(following());
    h.relay.store().add_room("room1").unwrap();
    h.relay
        .store()
        .add_account("room1", "user@example.social", FilterMode::All)
        .unwrap();

    let session = h.sessions.recv_timeout(Duration::from_secs(2)).unwrap();
    session
        .send(FeedEvent::Update(status(json!({
            "id": "1",
            "account": {"id": "42", "acct": "user@example.social"},
            "url": "https://example.social/@user/1",
            "uri": "https://example.social/users/user/statuses/1"
        }))))
        .unwrap();

    let message = h.outbound.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(message.room, "room1");
    assert!(message.text.contains("post by"));
    assert!(message.text.contains("https://example.social/@user/1"));

    // Exactly one message for one room
    assert!(h.outbound.recv_timeout(Duration::from_millis(100)).is_err());

    h.relay.shutdown();
}

#[test]
fn test_repost_uses_alternate_uri() {
    let h = start_relay(following());
    h.relay.store().add_room("room1").unwrap();
    h.relay
        .store()
        .add_account("room1", "user@example.social", FilterMode::All)
        .unwrap();

    let session = h.sessions.recv_timeout(Duration::from_secs(2)).unwrap();
    session
        .send(FeedEvent::Update(status(json!({
            "id": "2",
            "account": {"id": "42", "acct": "user@example.social"},
            "url": "https://example.social/@user/2",
            "uri": "https://example.social/users/user/statuses/2",
            "reblog": {
                "id": "7",
                "account": {"id": "9", "acct": "someone@elsewhere.example"},
                "url": "",
                "uri": "tag:example.social,2024:/objects/1"
            }
        }))))
        .unwrap();

    let message = h.outbound.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(message.room, "room1");
    assert!(message.text.contains("repost by"));
    assert!(message.text.contains("tag:example.social,2024:/objects/1"));

    h.relay.shutdown();
}

#[test]
fn test_image_room_only_gets_media_posts() {
    let h = start_relay(following());
    h.relay.store().add_room("pics").unwrap();
    h.relay
        .store()
        .add_account("pics", "user@example.social", FilterMode::Image)
        .unwrap();

    let session = h.sessions.recv_timeout(Duration::from_secs(2)).unwrap();
    session
        .send(FeedEvent::Update(status(json!({
            "id": "1",
            "account": {"id": "42", "acct": "user@example.social"},
            "url": "https://example.social/@user/1",
            "uri": "u1"
        }))))
        .unwrap();
    session
        .send(FeedEvent::Update(status(json!({
            "id": "2",
            "account": {"id": "42", "acct": "user@example.social"},
            "url": "https://example.social/@user/2",
            "uri": "u2",
            "media_attachments": [{"id": "m", "type": "image", "url": "https://x/m.png"}]
        }))))
        .unwrap();

    let message = h.outbound.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(message.text.contains("https://example.social/@user/2"));
    assert!(h.outbound.recv_timeout(Duration::from_millis(100)).is_err());

    h.relay.shutdown();
}

#[test]
fn test_non_update_events_keep_session() {
    let h = start_relay(following());

    let session = h.sessions.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || h.relay.is_connected()));

    session.send(FeedEvent::Delete("1".to_string())).unwrap();
    session
        .send(FeedEvent::Notification(
            serde_json::from_value(json!({"id": "5", "type": "mention"})).unwrap(),
        ))
        .unwrap();

    // No new session is opened
    assert!(h.sessions.recv_timeout(Duration::from_millis(150)).is_err());
    assert!(h.relay.is_connected());

    h.relay.shutdown();
}

// --- Commands ---

#[test]
fn test_add_following_registers_subscription() {
    let h = start_relay(following());

    let reply = h
        .relay
        .handle_message("room1", "!mstdn add @user@example.social image")
        .unwrap();

    assert_eq!(reply, "added @user@example.social");
    assert_eq!(h.follows.lock().as_slice(), &[AccountId("42".to_string())]);
    assert!(h.relay.store().list_subscribed_rooms().unwrap().contains("room1"));
    assert_eq!(
        h.relay.store().lookup("room1", "user@example.social").unwrap(),
        Some(FilterMode::Image)
    );

    h.relay.shutdown();
}

#[test]
fn test_add_blocked_leaves_registry_untouched() {
    let h = start_relay(Relationship {
        blocking: true,
        ..Default::default()
    });

    let reply = h
        .relay
        .handle_message("room1", "!mstdn add @user@example.social image")
        .unwrap();

    assert_eq!(reply, "failed to add @user@example.social (blocked)");
    assert!(h.relay.store().list_subscribed_rooms().unwrap().is_empty());
    assert_eq!(
        h.relay.store().lookup("room1", "user@example.social").unwrap(),
        None
    );

    h.relay.shutdown();
}

#[test]
fn test_add_requested_and_unknown() {
    let h = start_relay(Relationship {
        requested: true,
        ..Default::default()
    });
    let reply = h
        .relay
        .handle_message("room1", "!mstdn add user@example.social all")
        .unwrap();
    assert_eq!(
        reply,
        "sent a follow request to @user@example.social (account is locked)"
    );
    h.relay.shutdown();

    let h = start_relay(Relationship::default());
    let reply = h
        .relay
        .handle_message("room1", "!mstdn add user@example.social all")
        .unwrap();
    assert_eq!(reply, "failed to add @user@example.social (unknown error)");
    assert!(h.relay.store().list_subscribed_rooms().unwrap().is_empty());
    h.relay.shutdown();
}

#[test]
fn test_add_unknown_account() {
    let h = start_relay(following());

    let reply = h
        .relay
        .handle_message("room1", "!mstdn add @ghost@example.social all")
        .unwrap();

    assert_eq!(reply, "@ghost@example.social does not exist in the fediverse");
    assert!(h.follows.lock().is_empty());

    h.relay.shutdown();
}

#[test]
fn test_add_from_profile_url() {
    let h = start_relay(following());

    let reply = h
        .relay
        .handle_message("room1", "!mstdn add https://example.social/@user ALL")
        .unwrap();

    assert_eq!(reply, "added @user@example.social");
    assert_eq!(
        h.relay.store().lookup("room1", "user@example.social").unwrap(),
        Some(FilterMode::All)
    );

    h.relay.shutdown();
}

#[test]
fn test_list_and_remove() {
    let h = start_relay(following());
    h.relay
        .handle_message("room1", "!mstdn add @user@example.social image")
        .unwrap();

    let listing = h.relay.handle_message("room1", "!mstdn list").unwrap();
    assert_eq!(listing, "\n```\nuser@example.social: image\n```");

    let reply = h
        .relay
        .handle_message("room1", "!mstdn remove @user@example.social")
        .unwrap();
    assert_eq!(reply, "removed @user@example.social");

    let listing = h.relay.handle_message("room1", "!mstdn list").unwrap();
    assert_eq!(listing, "\n```\n```");

    // The room stays known after its last subscription is gone
    assert!(h.relay.store().list_subscribed_rooms().unwrap().contains("room1"));

    h.relay.shutdown();
}

#[test]
fn test_status_and_reconnect() {
    let (release, gate) = unbounded();
    let h = start_relay_with_gate(following(), Some(gate));
    let _first = h.sessions.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || h.relay.is_connected()));

    let reply = h.relay.handle_message("room1", "!mstdn status").unwrap();
    assert_eq!(
        reply,
        "connected to `https://example.social/api/v1/streaming/?stream=user`"
    );

    let reply = h.relay.handle_message("room1", "!mstdn reconnect").unwrap();
    assert_eq!(
        reply,
        "reconnecting to `https://example.social/api/v1/streaming/?stream=user`"
    );

    // Down while the second open is held back
    assert!(wait_until(Duration::from_secs(2), || !h.relay.is_connected()));
    let reply = h.relay.handle_message("room1", "!mstdn status").unwrap();
    assert!(reply.starts_with("disconnected from"));

    // Released: a second session is opened without another request
    release.send(()).unwrap();
    let _second = h.sessions.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || h.relay.is_connected()));

    h.relay.shutdown();
    assert!(!h.relay.is_connected());
    let reply = h.relay.handle_message("room1", "!mstdn status").unwrap();
    assert!(reply.starts_with("disconnected from"));
}

#[test]
fn test_messages_for_others_are_ignored() {
    let h = start_relay(following());

    assert!(h.relay.handle_message("room1", "hello there").is_none());
    assert!(h.relay.handle_message("room1", "mstdn status").is_none());
    assert!(h.relay.handle_message("room1", "").is_none());
    assert_eq!(h.relay.help(), "!mstdn: mastodon\n");

    h.relay.shutdown();
}
