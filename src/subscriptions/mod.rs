//! Per-room account subscriptions.
//!
//! This module provides:
//! - [`SubscriptionStore`]: the persistent room -> account -> mode registry
//! - [`match_rooms`]: which rooms an incoming status should be relayed to
//! - handle escaping for storage sub-keys
//!
//! # Example
//!
//! ```ignore
//! let store = SubscriptionStore::new(Arc::new(MemoryStore::new()));
//!
//! store.add_room("room1")?;
//! store.add_account("room1", "user@example.social", FilterMode::Image)?;
//!
//! for (room, mode) in match_rooms(&status, &store) {
//!     println!("{room} wants this ({mode})");
//! }
//! ```

mod escape;
mod filter;
mod store;

pub use escape::{escape_handle, normalize_handle, unescape_handle, unescape_legacy_handle};
pub use filter::match_rooms;
pub use store::{SubscriptionStore, LEGACY_ROOM_KEY_PREFIX, ROOMS_KEY, ROOM_KEY_PREFIX};
