//! Streaming-session lifecycle.
//!
//! A single background thread owns the upstream session:
//!
//! ```text
//! Disconnected -> Connecting -> Streaming -> Disconnected -> Connecting ...
//! ```
//!
//! - failed connection attempts are retried forever with a fixed backoff
//! - `Error` events, a closed upstream channel and reconnect requests end the
//!   session and start a new one immediately
//! - `Update` events are handed to an [`UpdateHandler`]
//!
//! Everything else talks to the thread through a [`ConnectionHandle`].
//!
//! # Example
//!
//! ```ignore
//! let handle = ConnectionManager::spawn(source, dispatcher, ReconnectPolicy::default())?;
//!
//! if !handle.is_connected() {
//!     handle.trigger_reconnect();
//! }
//!
//! handle.shutdown();
//! handle.join();
//! ```

mod manager;
mod types;

pub use manager::ConnectionManager;
pub use types::{ConnectionHandle, ConnectionState, ReconnectPolicy, SessionEnd};

use crate::error::Result;
use crate::types::{FeedEvent, Status};
use crossbeam_channel::Receiver;

/// Upstream feed client.
pub trait FeedSource: Send + 'static {
    /// Open a streaming session. Events arrive on the returned channel until
    /// the session ends, at which point the sender side is dropped.
    fn open_stream(&self) -> Result<Receiver<FeedEvent>>;
}

/// Consumer of status updates from the stream.
pub trait UpdateHandler: Send + 'static {
    fn on_update(&self, status: &Status);
}

impl<F> UpdateHandler for F
where
    F: Fn(&Status) + Send + 'static,
{
    fn on_update(&self, status: &Status) {
        self(status)
    }
}
