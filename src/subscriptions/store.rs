//! Persistent room -> account -> mode registry.

use crate::error::{RelayError, Result};
use crate::kv::KeyValueStore;
use crate::types::FilterMode;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::escape::{escape_handle, normalize_handle, unescape_handle, unescape_legacy_handle};

/// Key of the room index (`{ room_id: 1, ... }`).
pub const ROOMS_KEY: &str = "lxbot_mastodon_rooms";

/// Prefix of per-room subscription mappings.
pub const ROOM_KEY_PREFIX: &str = "lxbot_mastodon_subs_";

/// Prefix of per-room mappings written by the legacy format. Read only.
pub const LEGACY_ROOM_KEY_PREFIX: &str = "lxbot_mastodon_room_";

fn room_key(room: &str) -> String {
    format!("{ROOM_KEY_PREFIX}{room}")
}

fn legacy_room_key(room: &str) -> String {
    format!("{LEGACY_ROOM_KEY_PREFIX}{room}")
}

/// Decoded accounts of one room.
#[derive(Default)]
struct RoomAccounts {
    accounts: BTreeMap<String, FilterMode>,
    /// Loaded from the legacy key; not yet written in the current format.
    legacy: bool,
}

/// Subscription registry on top of a [`KeyValueStore`].
///
/// Each room's mapping is stored as one value and replaced as a whole, and
/// all mutations hold the write side of `lock`, so readers never observe a
/// half-applied update.
pub struct SubscriptionStore {
    kv: Arc<dyn KeyValueStore>,
    lock: RwLock<()>,
}

impl SubscriptionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            lock: RwLock::new(()),
        }
    }

    /// Mark a room as having subscriptions. Idempotent.
    pub fn add_room(&self, room: &str) -> Result<()> {
        let _guard = self.lock.write();

        let mut rooms = self.load_object(ROOMS_KEY)?;
        if rooms.contains_key(room) {
            return Ok(());
        }
        rooms.insert(room.to_string(), Value::from(1));
        self.kv.set(ROOMS_KEY, Value::Object(rooms))?;

        info!(room = %room, "room registered");
        Ok(())
    }

    /// Insert or overwrite the mode for `handle` in `room`.
    pub fn add_account(&self, room: &str, handle: &str, mode: FilterMode) -> Result<()> {
        let handle = normalize_handle(handle);
        let _guard = self.lock.write();

        let mut room_accounts = self.load_room(room)?;
        room_accounts.accounts.insert(handle.to_string(), mode);
        self.save_room(room, &room_accounts.accounts)?;

        info!(room = %room, handle = %handle, mode = %mode, "subscription added");
        Ok(())
    }

    /// Remove `handle` from `room`. Absent rooms and handles are a no-op.
    pub fn remove_account(&self, room: &str, handle: &str) -> Result<()> {
        let handle = normalize_handle(handle);
        let _guard = self.lock.write();

        let mut room_accounts = self.load_room(room)?;
        if room_accounts.accounts.remove(handle).is_none() {
            debug!(room = %room, handle = %handle, "remove of unknown subscription");
            return Ok(());
        }
        self.save_room(room, &room_accounts.accounts)?;

        info!(room = %room, handle = %handle, "subscription removed");
        Ok(())
    }

    /// Mode for `handle` in `room`, if subscribed.
    pub fn lookup(&self, room: &str, handle: &str) -> Result<Option<FilterMode>> {
        let handle = normalize_handle(handle);
        let _guard = self.lock.read();

        Ok(self.load_room(room)?.accounts.get(handle).copied())
    }

    /// All subscriptions of `room`, keyed by unescaped handle.
    ///
    /// A room still stored in the legacy format is rewritten in the current
    /// format as a side effect.
    pub fn list_accounts(&self, room: &str) -> Result<BTreeMap<String, FilterMode>> {
        let guard = self.lock.upgradable_read();

        let room_accounts = self.load_room(room)?;
        if room_accounts.legacy {
            let _guard = RwLockUpgradableReadGuard::upgrade(guard);
            self.save_room(room, &room_accounts.accounts)?;
            info!(
                room = %room,
                accounts = room_accounts.accounts.len(),
                "migrated legacy subscriptions"
            );
        }

        Ok(room_accounts.accounts)
    }

    /// Rooms that have ever had a subscription.
    pub fn list_subscribed_rooms(&self) -> Result<BTreeSet<String>> {
        let _guard = self.lock.read();

        Ok(self.load_object(ROOMS_KEY)?.into_iter().map(|(k, _)| k).collect())
    }

    // --- Persistence ---

    /// Load an object value; absent and null are empty.
    fn load_object(&self, key: &str) -> Result<Map<String, Value>> {
        match self.kv.get(key)? {
            Some(value) => into_object(key, value),
            None => Ok(Map::new()),
        }
    }

    fn load_room(&self, room: &str) -> Result<RoomAccounts> {
        let key = room_key(room);
        if let Some(value) = self.kv.get(&key)? {
            return Ok(RoomAccounts {
                accounts: decode_accounts(&key, value, unescape_handle)?,
                legacy: false,
            });
        }

        let legacy_key = legacy_room_key(room);
        if let Some(value) = self.kv.get(&legacy_key)? {
            return Ok(RoomAccounts {
                accounts: decode_accounts(&legacy_key, value, unescape_legacy_handle)?,
                legacy: true,
            });
        }

        Ok(RoomAccounts::default())
    }

    fn save_room(&self, room: &str, accounts: &BTreeMap<String, FilterMode>) -> Result<()> {
        let encoded: Map<String, Value> = accounts
            .iter()
            .map(|(handle, mode)| (escape_handle(handle), Value::from(mode.as_str())))
            .collect();
        self.kv.set(&room_key(room), Value::Object(encoded))
    }
}

fn into_object(key: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(RelayError::MalformedValue {
            key: key.to_string(),
            reason: format!("expected object, found {other}"),
        }),
    }
}

fn decode_accounts(
    key: &str,
    value: Value,
    decode: fn(&str) -> String,
) -> Result<BTreeMap<String, FilterMode>> {
    into_object(key, value)?
        .into_iter()
        .map(|(stored, value)| -> Result<(String, FilterMode)> {
            let mode = value
                .as_str()
                .and_then(|s| s.parse::<FilterMode>().ok())
                .ok_or_else(|| RelayError::MalformedValue {
                    key: key.to_string(),
                    reason: format!("invalid mode {value} for {stored}"),
                })?;
            Ok((decode(&stored), mode))
        })
        .collect()
}
