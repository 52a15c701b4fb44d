//! Chat command surface: `<prefix>mstdn <subcommand> ...`.

use crate::connection::ConnectionHandle;
use crate::error::Result;
use crate::subscriptions::{normalize_handle, SubscriptionStore};
use crate::types::{Account, AccountId, FilterMode, FollowOutcome, Relationship};
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// Command word following the prefix.
pub const COMMAND_KEYWORD: &str = "mstdn";

/// Account lookups used by `add`.
pub trait AccountDirectory: Send + Sync {
    /// Resolve a handle (`@user@domain`) to an account, if it exists.
    fn search_account(&self, query: &str) -> Result<Option<Account>>;

    fn follow_account(&self, id: &AccountId) -> Result<Relationship>;
}

/// A parsed chat command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Status,
    Reconnect,
    List,
    Add { handle: String, mode: FilterMode },
    Remove { handle: String },
    /// Reserved.
    Find { handle: String },
    /// A known subcommand with the wrong arguments.
    Incomplete(&'static str),
    Unknown,
}

impl Command {
    /// Parse whitespace-split arguments. `argv[0]` is the command word.
    pub fn parse(argv: &[&str]) -> Command {
        match argv {
            [_, "status"] => Command::Status,
            [_, "reconnect"] => Command::Reconnect,
            [_, "list"] => Command::List,
            [_, "add"] | [_, "add", _] => Command::Incomplete("add"),
            [_, "remove"] => Command::Incomplete("remove"),
            [_, "find"] => Command::Incomplete("find"),
            [_, "remove", handle] => Command::Remove {
                handle: normalize_handle(handle).to_string(),
            },
            [_, "find", handle] => Command::Find {
                handle: normalize_handle(handle).to_string(),
            },
            [_, "add", target, mode] => match mode.parse::<FilterMode>() {
                Ok(mode) => Command::Add {
                    handle: account_from_target(target),
                    mode,
                },
                Err(_) => Command::Unknown,
            },
            _ => Command::Unknown,
        }
    }
}

/// Accept `@user@domain`, `user@domain` or a profile URL
/// (`https://domain/@user`) and return `user@domain`.
fn account_from_target(target: &str) -> String {
    if target.starts_with("https://") {
        if let Ok(url) = Url::parse(target) {
            let user = url
                .path_segments()
                .and_then(|mut segments| segments.next())
                .filter(|segment| !segment.is_empty());
            if let (Some(user), Some(host)) = (user, url.host_str()) {
                return format!("{}@{host}", normalize_handle(user));
            }
        }
    }
    normalize_handle(target).to_string()
}

/// Executes chat commands against the registry, the directory and the
/// connection.
pub struct CommandHandler<D> {
    prefix: String,
    stream_url: String,
    store: Arc<SubscriptionStore>,
    connection: Arc<ConnectionHandle>,
    directory: D,
}

impl<D: AccountDirectory> CommandHandler<D> {
    pub fn new(
        prefix: impl Into<String>,
        stream_url: impl Into<String>,
        store: Arc<SubscriptionStore>,
        connection: Arc<ConnectionHandle>,
        directory: D,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            stream_url: stream_url.into(),
            store,
            connection,
            directory,
        }
    }

    /// Full command word, e.g. `!mstdn`.
    pub fn trigger(&self) -> String {
        format!("{}{COMMAND_KEYWORD}", self.prefix)
    }

    /// One-line help entry.
    pub fn help(&self) -> String {
        format!("{}: mastodon\n", self.trigger())
    }

    /// Run a command from `room` and return the reply text.
    pub fn handle_command(&self, room: &str, argv: &[&str]) -> String {
        let command = Command::parse(argv);
        debug!(room = %room, command = ?command, "handling command");
        self.execute(room, command)
    }

    pub fn execute(&self, room: &str, command: Command) -> String {
        match command {
            Command::Status => self.status(),
            Command::Reconnect => self.reconnect(),
            Command::List => self.list(room),
            Command::Add { handle, mode } => self.add(room, &handle, mode),
            Command::Remove { handle } => self.remove(room, &handle),
            Command::Find { .. } => "not implemented yet".to_string(),
            Command::Incomplete(subcommand) => self.usage_for(subcommand),
            Command::Unknown => self.usage(),
        }
    }

    fn usage(&self) -> String {
        format!("{} [status|add|remove|list|find|reconnect]", self.trigger())
    }

    fn usage_for(&self, subcommand: &str) -> String {
        match subcommand {
            "add" => format!("{} add @screen_name@domain [all|image]", self.trigger()),
            other => format!("{} {other} @screen_name@domain", self.trigger()),
        }
    }

    fn status(&self) -> String {
        if self.connection.is_connected() {
            format!("connected to `{}`", self.stream_url)
        } else {
            format!("disconnected from `{}`", self.stream_url)
        }
    }

    fn reconnect(&self) -> String {
        self.connection.trigger_reconnect();
        format!("reconnecting to `{}`", self.stream_url)
    }

    fn list(&self, room: &str) -> String {
        let accounts = match self.store.list_accounts(room) {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(room = %room, error = %e, "failed to list subscriptions");
                return "failed to read subscriptions".to_string();
            }
        };

        let mut text = String::from("\n```\n");
        for (handle, mode) in accounts {
            text.push_str(&format!("{handle}: {mode}\n"));
        }
        text.push_str("```");
        text
    }

    fn add(&self, room: &str, handle: &str, mode: FilterMode) -> String {
        let account = match self.directory.search_account(&format!("@{handle}")) {
            Ok(Some(account)) => account,
            Ok(None) => return format!("@{handle} does not exist in the fediverse"),
            Err(e) => {
                warn!(handle = %handle, error = %e, "account search failed");
                return "account search API error".to_string();
            }
        };

        let relationship = match self.directory.follow_account(&account.id) {
            Ok(relationship) => relationship,
            Err(e) => {
                warn!(handle = %handle, error = %e, "account follow failed");
                return "account follow API error".to_string();
            }
        };

        match FollowOutcome::from(&relationship) {
            FollowOutcome::Following => {
                let saved = self
                    .store
                    .add_room(room)
                    .and_then(|()| self.store.add_account(room, handle, mode));
                if let Err(e) = saved {
                    error!(room = %room, handle = %handle, error = %e, "failed to save subscription");
                    return format!("failed to save subscription for @{handle}");
                }
                format!("added @{handle}")
            }
            FollowOutcome::Requested => {
                format!("sent a follow request to @{handle} (account is locked)")
            }
            FollowOutcome::Blocked => format!("failed to add @{handle} (blocked)"),
            FollowOutcome::Unknown => format!("failed to add @{handle} (unknown error)"),
        }
    }

    fn remove(&self, room: &str, handle: &str) -> String {
        if let Err(e) = self.store.remove_account(room, handle) {
            error!(room = %room, handle = %handle, error = %e, "failed to remove subscription");
            return format!("failed to remove @{handle}");
        }
        format!("removed @{handle}")
    }
}
