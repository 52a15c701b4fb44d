//! Key-value persistence used by the subscription store.
//!
//! The relay only needs `get`/`set` of whole structured values keyed by
//! string. Hosts with their own storage implement [`KeyValueStore`]; two
//! backends are provided:
//! - [`MemoryStore`]: process-local, for tests and ephemeral setups
//! - [`FileStore`]: a single checksummed file with an exclusive lock

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use serde_json::Value;

/// Opaque get/set storage.
///
/// Each `set` replaces the whole value; implementations must make a single
/// `set` visible atomically.
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value. Absent keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: Value) -> Result<()>;
}
