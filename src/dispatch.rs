//! Fan-out of matched statuses to chat rooms.

use crate::connection::UpdateHandler;
use crate::error::{RelayError, Result};
use crate::format::render;
use crate::subscriptions::{match_rooms, SubscriptionStore};
use crate::types::{OutboundMessage, Status};
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outbound side of the chat host. One call per message.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: OutboundMessage) -> Result<()>;
}

/// Publishes into a channel the chat host drains.
pub struct ChannelPublisher {
    sender: Sender<OutboundMessage>,
}

impl ChannelPublisher {
    pub fn new(sender: Sender<OutboundMessage>) -> Self {
        Self { sender }
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, message: OutboundMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| RelayError::Publish("outbound channel closed".into()))
    }
}

/// Filters a status against the registry and publishes one message per
/// matched room.
pub struct Dispatcher<P> {
    store: Arc<SubscriptionStore>,
    publisher: P,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(store: Arc<SubscriptionStore>, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Deliver `status` to every matching room, in sequence.
    ///
    /// A failed publish is logged and the remaining rooms are still tried.
    /// Returns the number of messages published.
    pub fn dispatch(&self, status: &Status) -> usize {
        let matches = match_rooms(status, &self.store);
        if matches.is_empty() {
            return 0;
        }

        let text = render(status);
        let mut delivered = 0;

        for (room, mode) in matches {
            let message = OutboundMessage {
                room: room.clone(),
                text: text.clone(),
            };

            match self.publisher.publish(message) {
                Ok(()) => {
                    debug!(room = %room, mode = %mode, status = %status.id, "relayed status");
                    delivered += 1;
                }
                Err(e) => warn!(room = %room, error = %e, "failed to publish status"),
            }
        }

        delivered
    }
}

impl<P: Publisher + 'static> UpdateHandler for Dispatcher<P> {
    fn on_update(&self, status: &Status) {
        self.dispatch(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::types::FilterMode;
    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Fails for one room, records the rest.
    struct FlakyPublisher {
        failing_room: String,
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl Publisher for FlakyPublisher {
        fn publish(&self, message: OutboundMessage) -> Result<()> {
            if message.room == self.failing_room {
                return Err(RelayError::Publish("room unavailable".into()));
            }
            self.sent.lock().push(message);
            Ok(())
        }
    }

    fn post_from(acct: &str) -> Status {
        serde_json::from_value(json!({
            "id": "1",
            "account": {"id": "1", "acct": acct},
            "url": "https://example.social/@user/1",
            "uri": "https://example.social/users/user/statuses/1"
        }))
        .unwrap()
    }

    fn store_with_rooms(rooms: &[&str]) -> Arc<SubscriptionStore> {
        let store = Arc::new(SubscriptionStore::new(Arc::new(MemoryStore::new())));
        for room in rooms {
            store.add_room(room).unwrap();
            store
                .add_account(room, "user@example.social", FilterMode::All)
                .unwrap();
        }
        store
    }

    #[test]
    fn test_channel_publisher_delivers() {
        let (tx, rx) = unbounded();
        let dispatcher = Dispatcher::new(store_with_rooms(&["room1"]), ChannelPublisher::new(tx));

        assert_eq!(dispatcher.dispatch(&post_from("user@example.social")), 1);

        let message = rx.try_recv().unwrap();
        assert_eq!(message.room, "room1");
        assert!(message.text.contains("post by"));
        assert!(message.text.contains("https://example.social/@user/1"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_failure_continues() {
        let publisher = FlakyPublisher {
            failing_room: "b".to_string(),
            sent: Mutex::new(Vec::new()),
        };
        let dispatcher = Dispatcher::new(store_with_rooms(&["a", "b", "c"]), publisher);

        assert_eq!(dispatcher.dispatch(&post_from("user@example.social")), 2);

        let rooms: Vec<_> = dispatcher
            .publisher
            .sent
            .lock()
            .iter()
            .map(|m| m.room.clone())
            .collect();
        assert_eq!(rooms, vec!["a", "c"]);
    }

    #[test]
    fn test_closed_channel_is_soft_failure() {
        let (tx, rx) = unbounded();
        drop(rx);
        let dispatcher = Dispatcher::new(store_with_rooms(&["room1"]), ChannelPublisher::new(tx));

        assert_eq!(dispatcher.dispatch(&post_from("user@example.social")), 0);
    }
}
