//! Connection state and the handle used to observe and steer it.

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Lifecycle state of the streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Streaming,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Why a streaming session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// A reconnect was requested through the handle.
    ReconnectRequested,
    /// The feed sent an error event.
    StreamError,
    /// The feed closed the event channel.
    Closed,
    /// Shutdown was requested, or the handle was dropped.
    Shutdown,
}

/// Retry policy for connection attempts.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Fixed wait after a failed attempt.
    /// Default: 10 seconds
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(10),
        }
    }
}

/// Handle to a running (or not yet started) connection manager.
///
/// Dropping the handle shuts the manager down.
pub struct ConnectionHandle {
    pub(super) state: Arc<RwLock<ConnectionState>>,
    pub(super) reconnect_tx: Sender<()>,
    pub(super) shutdown_tx: Sender<()>,
    pub(super) thread: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionHandle {
    /// Current state. May lag the session by one transition.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    /// Ask the manager to drop the current session and connect again.
    ///
    /// Never blocks. Returns false if a request is already pending (it
    /// absorbs this one) or the manager is gone.
    pub fn trigger_reconnect(&self) -> bool {
        match self.reconnect_tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("reconnect already pending");
                false
            }
            Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Stop the manager after its current step. Does not wait; see [`join`].
    ///
    /// [`join`]: ConnectionHandle::join
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.try_send(());
    }

    /// Wait for the manager thread to exit. No-op if it was never spawned
    /// or has already been joined.
    pub fn join(&self) {
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("stream thread panicked");
            }
        }
    }
}
