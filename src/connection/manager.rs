//! Connection manager: the reconnect loop around one streaming session.

use crate::error::Result;
use crate::types::FeedEvent;
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

use super::types::{ConnectionHandle, ConnectionState, ReconnectPolicy, SessionEnd};
use super::{FeedSource, UpdateHandler};

/// Name of the background thread.
const THREAD_NAME: &str = "feed-relay-stream";

/// Owns the upstream session and is the only writer of its state.
pub struct ConnectionManager<S, H> {
    source: S,
    handler: H,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ConnectionState>>,
    reconnect_rx: Receiver<()>,
    shutdown_rx: Receiver<()>,
}

impl<S: FeedSource, H: UpdateHandler> ConnectionManager<S, H> {
    /// Create a manager and its handle without starting it.
    pub fn new(source: S, handler: H, policy: ReconnectPolicy) -> (Self, ConnectionHandle) {
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        // Capacity one: a pending request absorbs any further ones.
        let (reconnect_tx, reconnect_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let manager = Self {
            source,
            handler,
            policy,
            state: Arc::clone(&state),
            reconnect_rx,
            shutdown_rx,
        };
        let handle = ConnectionHandle {
            state,
            reconnect_tx,
            shutdown_tx,
            thread: Mutex::new(None),
        };

        (manager, handle)
    }

    /// Start the manager on its own thread.
    pub fn spawn(source: S, handler: H, policy: ReconnectPolicy) -> Result<ConnectionHandle> {
        let (manager, handle) = Self::new(source, handler, policy);

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || manager.run())?;
        *handle.thread.lock() = Some(thread);

        Ok(handle)
    }

    /// Connect, stream, and reconnect until shut down.
    pub fn run(self) {
        info!("starting stream loop");

        while let Some(events) = self.connect() {
            let end = self.consume(&events);
            self.set_state(ConnectionState::Disconnected);
            info!(reason = ?end, "exited streaming loop");

            if end == SessionEnd::Shutdown {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("stream loop stopped");
    }

    /// Open a session, retrying with the fixed backoff until it succeeds.
    ///
    /// Returns `None` if shutdown is requested while waiting.
    fn connect(&self) -> Option<Receiver<FeedEvent>> {
        loop {
            // Requests raised before this attempt are satisfied by it.
            self.drain_reconnects();

            self.set_state(ConnectionState::Connecting);
            match self.source.open_stream() {
                Ok(events) => {
                    // So are requests raised while it was in flight.
                    self.drain_reconnects();
                    self.set_state(ConnectionState::Streaming);
                    info!("stream established");
                    return Some(events);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(
                        error = %e,
                        backoff_ms = self.policy.backoff.as_millis() as u64,
                        "failed to open stream, retrying"
                    );
                    match self.shutdown_rx.recv_timeout(self.policy.backoff) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return None,
                    }
                }
            }
        }
    }

    fn drain_reconnects(&self) {
        let absorbed = self.reconnect_rx.try_iter().count();
        if absorbed > 0 {
            debug!(absorbed, "dropped pending reconnect requests");
        }
    }

    /// Consume events until the session has to end.
    fn consume(&self, events: &Receiver<FeedEvent>) -> SessionEnd {
        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        if let Some(end) = self.on_event(event) {
                            return end;
                        }
                    }
                    Err(_) => {
                        warn!("upstream closed the stream");
                        return SessionEnd::Closed;
                    }
                },
                recv(self.reconnect_rx) -> request => {
                    return match request {
                        Ok(()) => SessionEnd::ReconnectRequested,
                        Err(_) => SessionEnd::Shutdown,
                    };
                },
                recv(self.shutdown_rx) -> _ => return SessionEnd::Shutdown,
            }
        }
    }

    /// Handle one event; `Some` ends the session.
    fn on_event(&self, event: FeedEvent) -> Option<SessionEnd> {
        debug!(kind = event.kind(), "stream event");
        match event {
            FeedEvent::Update(status) => {
                debug!(status = %status.id, account = %status.account.acct, "update event");
                self.handler.on_update(&status);
                None
            }
            FeedEvent::Notification(notification) => {
                debug!(id = %notification.id, kind = %notification.kind, "notification event");
                None
            }
            FeedEvent::Delete(id) => {
                debug!(status = %id, "delete event");
                None
            }
            FeedEvent::Error(reason) => {
                warn!(reason = %reason, "stream error event");
                Some(SessionEnd::StreamError)
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(state = %state, "connection state");
        *self.state.write() = state;
    }
}
