//! # Feed Relay
//!
//! Relays a Mastodon user stream into chat rooms. Each room subscribes to
//! accounts, either for every post or only for posts with media, and the
//! relay posts a link into the room whenever a subscribed account posts or
//! reblogs.
//!
//! ## Core Concepts
//!
//! - **Connection**: one background thread keeps the streaming session
//!   alive, reconnecting with a fixed backoff
//! - **Subscriptions**: room -> account -> mode, persisted in a key-value store
//! - **Dispatch**: statuses are matched against subscriptions and rendered
//!   into one message per room
//! - **Commands**: `<prefix>mstdn status|reconnect|list|add|remove|find`
//!
//! ## Example
//!
//! ```ignore
//! use feed_relay::{open_store, ChannelPublisher, Relay, RelayConfig};
//!
//! let config = RelayConfig::from_env()?;
//! let kv = open_store(&config)?;
//! let (tx, outbound) = crossbeam_channel::unbounded();
//!
//! let relay = Relay::start(&config, kv, my_stream, ChannelPublisher::new(tx), my_api)?;
//!
//! // Inbound chat message
//! if let Some(reply) = relay.handle_message("room1", "mstdn add @user@example.social image") {
//!     println!("{reply}");
//! }
//!
//! // Relayed statuses
//! for message in outbound.iter() {
//!     println!("[{}] {}", message.room, message.text);
//! }
//! ```

pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod kv;
pub mod relay;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use commands::{AccountDirectory, Command, CommandHandler, COMMAND_KEYWORD};
pub use config::RelayConfig;
pub use connection::{
    ConnectionHandle, ConnectionManager, ConnectionState, FeedSource, ReconnectPolicy, SessionEnd,
    UpdateHandler,
};
pub use dispatch::{ChannelPublisher, Dispatcher, Publisher};
pub use error::{RelayError, Result};
pub use format::render;
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use relay::{open_store, Relay};
pub use subscriptions::{
    escape_handle, match_rooms, normalize_handle, unescape_handle, SubscriptionStore,
};
pub use types::*;
