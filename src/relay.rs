//! Top-level relay wiring.

use crate::commands::{AccountDirectory, CommandHandler};
use crate::config::RelayConfig;
use crate::connection::{ConnectionHandle, ConnectionManager, FeedSource};
use crate::dispatch::{Dispatcher, Publisher};
use crate::error::Result;
use crate::kv::{FileStore, KeyValueStore, MemoryStore};
use crate::subscriptions::SubscriptionStore;
use std::sync::Arc;
use tracing::info;

/// A running relay: one stream thread plus the command surface.
pub struct Relay<D> {
    store: Arc<SubscriptionStore>,
    connection: Arc<ConnectionHandle>,
    commands: CommandHandler<D>,
}

/// Open the store the config points at, or an in-memory one.
pub fn open_store(config: &RelayConfig) -> Result<Arc<dyn KeyValueStore>> {
    let kv: Arc<dyn KeyValueStore> = match &config.store_path {
        Some(path) => {
            let store = FileStore::open(path)?;
            info!(path = %store.path().display(), "opened subscription store");
            Arc::new(store)
        }
        None => Arc::new(MemoryStore::new()),
    };
    Ok(kv)
}

impl<D: AccountDirectory> Relay<D> {
    /// Start streaming from `source` and relaying into `publisher`.
    pub fn start<S, P>(
        config: &RelayConfig,
        kv: Arc<dyn KeyValueStore>,
        source: S,
        publisher: P,
        directory: D,
    ) -> Result<Self>
    where
        S: FeedSource,
        P: Publisher + 'static,
    {
        let store = Arc::new(SubscriptionStore::new(kv));
        let dispatcher = Dispatcher::new(Arc::clone(&store), publisher);

        let connection = Arc::new(ConnectionManager::spawn(
            source,
            dispatcher,
            config.reconnect_policy(),
        )?);
        info!(stream = %config.stream_url(), "relay started");

        let commands = CommandHandler::new(
            config.command_prefix.clone(),
            config.stream_url(),
            Arc::clone(&store),
            Arc::clone(&connection),
            directory,
        );

        Ok(Self {
            store,
            connection,
            commands,
        })
    }

    /// Handle an inbound chat message. Returns the reply if the message was
    /// addressed to the relay.
    pub fn handle_message(&self, room: &str, text: &str) -> Option<String> {
        let argv: Vec<&str> = text.split_whitespace().collect();
        if argv.first() != Some(&self.commands.trigger().as_str()) {
            return None;
        }
        Some(self.commands.handle_command(room, &argv))
    }

    pub fn help(&self) -> String {
        self.commands.help()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.connection
    }

    /// Stop the stream thread and wait for it.
    pub fn shutdown(&self) {
        self.connection.shutdown();
        self.connection.join();
        info!("relay stopped");
    }
}
