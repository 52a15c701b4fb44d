//! Relay configuration.

use crate::connection::ReconnectPolicy;
use crate::error::{RelayError, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const ENV_BASE_URL: &str = "LXBOT_MASTODON_BASE_URL";
pub const ENV_ACCESS_TOKEN: &str = "LXBOT_MASTODON_ACCESS_TOKEN";
pub const ENV_COMMAND_PREFIX: &str = "LXBOT_COMMAND_PREFIX";
pub const ENV_RECONNECT_SECS: &str = "LXBOT_MASTODON_RECONNECT_SECS";
pub const ENV_STORE_PATH: &str = "LXBOT_MASTODON_STORE_PATH";

/// Relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Base URL of the Mastodon instance, e.g. `https://example.social`.
    pub base_url: String,

    /// Access token for the streaming and REST APIs.
    pub access_token: String,

    /// Prefix of chat commands (`<prefix>mstdn ...`).
    pub command_prefix: String,

    /// Wait between failed connection attempts.
    /// Default: 10 seconds
    pub reconnect_backoff: Duration,

    /// Directory for the on-disk store. `None` keeps subscriptions in memory.
    pub store_path: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: String::new(),
            command_prefix: String::new(),
            reconnect_backoff: ReconnectPolicy::default().backoff,
            store_path: None,
        }
    }
}

impl RelayConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup` (key -> value).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RelayError::Config(format!("{ENV_BASE_URL} is not set")))?;
        Url::parse(&base_url)
            .map_err(|e| RelayError::Config(format!("{ENV_BASE_URL}: {e}")))?;

        let access_token = lookup(ENV_ACCESS_TOKEN)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RelayError::Config(format!("{ENV_ACCESS_TOKEN} is not set")))?;

        let mut config = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            command_prefix: lookup(ENV_COMMAND_PREFIX).unwrap_or_default(),
            ..Default::default()
        };

        if let Some(secs) = lookup(ENV_RECONNECT_SECS) {
            let secs: u64 = secs
                .parse()
                .map_err(|_| RelayError::Config(format!("{ENV_RECONNECT_SECS}: not a number")))?;
            config.reconnect_backoff = Duration::from_secs(secs);
        }

        config.store_path = lookup(ENV_STORE_PATH)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    /// User stream endpoint, as shown in status replies.
    pub fn stream_url(&self) -> String {
        format!("{}/api/v1/streaming/?stream=user", self.base_url)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            backoff: self.reconnect_backoff,
        }
    }
}
