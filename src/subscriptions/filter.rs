//! Matching of incoming statuses against room subscriptions.

use crate::types::{FilterMode, Status};
use tracing::warn;

use super::store::SubscriptionStore;

/// Rooms that should receive `status`, with the mode that matched.
///
/// A room subscribed with [`FilterMode::Image`] only matches statuses that
/// carry media. Store errors skip the affected room and are logged.
pub fn match_rooms(status: &Status, store: &SubscriptionStore) -> Vec<(String, FilterMode)> {
    let rooms = match store.list_subscribed_rooms() {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!(error = %e, "failed to read room index");
            return Vec::new();
        }
    };

    let handle = status.account.acct.as_str();
    let mut matches = Vec::new();

    for room in rooms {
        let mode = match store.lookup(&room, handle) {
            Ok(Some(mode)) => mode,
            Ok(None) => continue,
            Err(e) => {
                warn!(room = %room, error = %e, "failed to read subscriptions");
                continue;
            }
        };

        if mode == FilterMode::Image && !status.has_media() {
            continue;
        }

        matches.push((room, mode));
    }

    matches
}
