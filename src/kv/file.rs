//! Single-file key-value store.
//!
//! Layout of `kv.bin`:
//!
//! ```text
//! magic "RKV\0" | version u8 | body_len u64 LE | body (MessagePack) | crc32 u32 LE
//! ```
//!
//! The body is a map from key to the JSON text of the value. Every `set`
//! rewrites the file through a temporary sibling and a rename, so readers of
//! the file never see a torn write.

use super::KeyValueStore;
use crate::error::{RelayError, Result};
use fs2::FileExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for the store file.
const KV_MAGIC: &[u8; 4] = b"RKV\0";

/// Current store file format version.
const KV_VERSION: u8 = 1;

const DATA_FILE: &str = "kv.bin";
const LOCK_FILE: &str = "LOCK";

/// Sanity limit on the encoded body.
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// On-disk key-value store, exclusive to one process.
pub struct FileStore {
    /// Directory holding the data and lock files.
    dir: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// In-memory copy of every entry. Also serializes writers.
    entries: RwLock<HashMap<String, Value>>,
}

impl FileStore {
    /// Open the store in `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock_file = Self::acquire_lock(&dir)?;

        let data_path = dir.join(DATA_FILE);
        let entries = if data_path.exists() {
            Self::load_from_file(&data_path)?
        } else {
            HashMap::new()
        };
        debug!(path = %dir.display(), keys = entries.len(), "opened key-value store");

        Ok(Self {
            dir,
            _lock_file: lock_file,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the store directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_file = File::create(dir.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| RelayError::Locked)?;

        Ok(lock_file)
    }

    fn save(&self, entries: &HashMap<String, Value>) -> Result<()> {
        // Sorted so identical contents give identical files.
        let encoded_values = entries
            .iter()
            .map(|(k, v)| -> Result<(&str, String)> {
                Ok((k.as_str(), serde_json::to_string(v)?))
            })
            .collect::<Result<BTreeMap<&str, String>>>()?;
        let body = rmp_serde::to_vec(&encoded_values)?;

        let tmp_path = self.dir.join(format!("{DATA_FILE}.tmp"));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        file.write_all(KV_MAGIC)?;
        file.write_all(&[KV_VERSION])?;
        file.write_all(&(body.len() as u64).to_le_bytes())?;
        file.write_all(&body)?;
        file.write_all(&crc32fast::hash(&body).to_le_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, self.dir.join(DATA_FILE))?;
        Ok(())
    }

    fn load_from_file(path: &Path) -> Result<HashMap<String, Value>> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != KV_MAGIC {
            return Err(RelayError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != KV_VERSION {
            return Err(RelayError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;
        if len > MAX_BODY_LEN {
            return Err(RelayError::Corruption("Store body too large".into()));
        }

        let mut body = vec![0u8; len];
        file.read_exact(&mut body)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        if u32::from_le_bytes(checksum_bytes) != crc32fast::hash(&body) {
            return Err(RelayError::Corruption("Store checksum mismatch".into()));
        }

        let encoded_values: BTreeMap<String, String> = rmp_serde::from_slice(&body)?;
        encoded_values
            .into_iter()
            .map(|(k, v)| -> Result<(String, Value)> {
                let value = serde_json::from_str(&v)
                    .map_err(|e| RelayError::Deserialization(e.to_string()))?;
                Ok((k, value))
            })
            .collect()
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_string(), value);

        if let Err(e) = self.save(&entries) {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}
