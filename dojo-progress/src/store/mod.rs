//! Persistent key-value store adapter
//!
//! Thin wrapper over whatever durable storage the current context offers.
//! No operation ever returns an error or panics: quota problems, I/O errors
//! and a missing backend are logged and turned into no-ops or `None`, so
//! storage can never be the reason the caller fails.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Failure-tolerant string key-value store
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` if absent or unreadable
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a value; failures are absorbed
    fn set(&self, key: &str, value: &str);

    /// Removes a value; removing an absent key is a no-op
    fn remove(&self, key: &str);
}

/// Store for contexts without a durable backend
///
/// Reads always miss and writes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

impl KeyValueStore for DisabledStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) {}

    fn remove(&self, _key: &str) {}
}

/// Opens the durable store for `dir`, degrading to [`DisabledStore`]
///
/// # Arguments
/// * `dir` - Directory holding the store file; `None` means no durable storage
pub fn open_store(dir: Option<&Path>) -> Arc<dyn KeyValueStore> {
    let Some(dir) = dir else {
        info!("No store directory configured, progress will not be saved");
        return Arc::new(DisabledStore);
    };

    match FileStore::open(dir) {
        Ok(store) => {
            info!("Using progress store at {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            warn!("Progress store unavailable, progress will not be saved: {}", e);
            Arc::new(DisabledStore)
        }
    }
}
