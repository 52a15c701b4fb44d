//! Rendering of statuses into chat notifications.

use crate::types::Status;

/// Render `status` as a plain-text notification.
///
/// Reblogs link to the reblogged post; otherwise the post itself. Either
/// way the canonical URL is preferred and the URI is the fallback.
pub fn render(status: &Status) -> String {
    let handle = &status.account.acct;
    match &status.reblog {
        Some(original) => format!("repost by @{handle}: {}", original.link()),
        None => format!("post by @{handle}: {}", status.link()),
    }
}
