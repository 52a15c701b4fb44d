//! Core types for the relay.
//!
//! Feed payloads mirror the Mastodon REST/streaming entities closely enough
//! that a client implementation can decode frames straight into them.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-subscription delivery policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Every post from the account.
    All,
    /// Only posts carrying at least one media attachment.
    Image,
}

impl FilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::All => "all",
            FilterMode::Image => "image",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = RelayError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(FilterMode::All),
            "image" => Ok(FilterMode::Image),
            _ => Err(RelayError::InvalidFilterMode(s.to_string())),
        }
    }
}

/// Server-side account identifier.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fediverse account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Handle in `user@domain` form (bare `user` for local accounts).
    pub acct: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub url: String,
}

/// Media attached to a status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub url: String,
}

/// A post, possibly wrapping a reblogged post.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub account: Account,
    #[serde(default)]
    pub reblog: Option<Box<Status>>,
    /// Canonical HTML URL. Can be absent for remote or private posts.
    #[serde(default)]
    pub url: Option<String>,
    /// ActivityPub URI, always present.
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
}

impl Status {
    /// Canonical URL, falling back to the URI when the URL is empty.
    pub fn link(&self) -> &str {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => &self.uri,
        }
    }

    pub fn has_media(&self) -> bool {
        !self.media_attachments.is_empty()
    }
}

/// A notification for the authenticated user (mention, follow, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub account: Option<Account>,
}

/// Relationship returned by a follow request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub following: bool,
    #[serde(default)]
    pub requested: bool,
    #[serde(default)]
    pub blocking: bool,
}

/// Interpretation of a follow result, checked in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowOutcome {
    Following,
    Requested,
    Blocked,
    Unknown,
}

impl From<&Relationship> for FollowOutcome {
    fn from(rel: &Relationship) -> Self {
        if rel.following {
            FollowOutcome::Following
        } else if rel.requested {
            FollowOutcome::Requested
        } else if rel.blocking {
            FollowOutcome::Blocked
        } else {
            FollowOutcome::Unknown
        }
    }
}

/// Events delivered by the streaming session.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    /// A new status on the home timeline.
    Update(Status),
    /// A notification for the authenticated user.
    Notification(Notification),
    /// A status was deleted (payload is the status id).
    Delete(String),
    /// The upstream stream failed and must be re-established.
    Error(String),
}

impl FeedEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::Update(_) => "update",
            FeedEvent::Notification(_) => "notification",
            FeedEvent::Delete(_) => "delete",
            FeedEvent::Error(_) => "error",
        }
    }
}

/// A message to deliver into a chat room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub room: String,
    pub text: String,
}
