//! Progress cache
//!
//! Namespaced read-through/write-through cache over a [`KeyValueStore`].
//! The in-memory mirror caches misses too, so "read and absent" is not
//! confused with "not read yet".
//!
//! Legacy keys are migrated lazily: the first read of a key that is absent
//! under the current scheme pulls the legacy value over, seeds the mirror and
//! deletes the legacy key. Because the mirror answers every later read, a
//! key migrates at most once per process. Writes always go to the current
//! scheme and delete any stray legacy key, so legacy keys decay even without
//! reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::bus::{ChangeBus, ChangeEvent, ExternalChange, ExternalScope};
use crate::keys::{KeyKind, KeyScheme};
use crate::store::KeyValueStore;

/// The only status value with a meaning
pub const SOLVED: &str = "solved";

type Mirror = HashMap<String, Option<String>>;

/// Solved status and saved code per `(course, item)`
///
/// Owns the mirror; nothing else writes the underlying store.
pub struct ProgressCache {
    store: Arc<dyn KeyValueStore>,
    keys: KeyScheme,
    bus: ChangeBus,
    mirror: Mutex<Mirror>,
}

impl ProgressCache {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeyScheme, bus: ChangeBus) -> Self {
        Self {
            store,
            keys,
            bus,
            mirror: Mutex::new(Mirror::new()),
        }
    }

    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    // =============================================================================
    // Reads
    // =============================================================================

    pub fn get_status(&self, course_id: &str, item_id: &str) -> Option<String> {
        self.read(KeyKind::Status, course_id, item_id)
    }

    pub fn is_solved(&self, course_id: &str, item_id: &str) -> bool {
        self.get_status(course_id, item_id).as_deref() == Some(SOLVED)
    }

    /// Subset of `item_ids` that are solved, in input order
    pub fn solved_items<S: AsRef<str>>(&self, course_id: &str, item_ids: &[S]) -> Vec<String> {
        item_ids
            .iter()
            .map(|item_id| item_id.as_ref())
            .filter(|item_id| self.is_solved(course_id, item_id))
            .map(|item_id| item_id.to_string())
            .collect()
    }

    pub fn get_payload(&self, course_id: &str, item_id: &str) -> Option<String> {
        self.read(KeyKind::Code, course_id, item_id)
    }

    // =============================================================================
    // Writes
    // =============================================================================

    pub fn mark_solved(&self, course_id: &str, item_id: &str) {
        self.write(KeyKind::Status, course_id, item_id, Some(SOLVED));
        self.bus.emit(ChangeEvent::item(course_id, item_id));
    }

    /// Marks several items at once and emits a single event
    ///
    /// Does nothing, not even emit, for an empty list.
    pub fn mark_many_solved<S: AsRef<str>>(&self, course_id: &str, item_ids: &[S]) {
        if item_ids.is_empty() {
            return;
        }

        let item_ids: Vec<String> = item_ids.iter().map(|id| id.as_ref().to_string()).collect();
        for item_id in &item_ids {
            self.write(KeyKind::Status, course_id, item_id, Some(SOLVED));
        }
        self.bus.emit(ChangeEvent::items(course_id, item_ids));
    }

    pub fn set_payload(&self, course_id: &str, item_id: &str, payload: &str) {
        self.write(KeyKind::Code, course_id, item_id, Some(payload));
        self.bus.emit(ChangeEvent::item(course_id, item_id));
    }

    pub fn remove_payload(&self, course_id: &str, item_id: &str) {
        self.write(KeyKind::Code, course_id, item_id, None);
        self.bus.emit(ChangeEvent::item(course_id, item_id));
    }

    /// Forgets status and payload of one item
    pub fn reset_item(&self, course_id: &str, item_id: &str) {
        self.write(KeyKind::Status, course_id, item_id, None);
        self.write(KeyKind::Code, course_id, item_id, None);
        self.bus.emit(ChangeEvent::item(course_id, item_id));
    }

    // =============================================================================
    // Invalidation
    // =============================================================================

    /// Drops the mirror; the store is untouched
    pub fn clear_cache(&self) {
        self.lock_mirror().clear();
    }

    /// Handles a store mutation made by another context
    ///
    /// This crate never watches the store itself. The host that shares the
    /// store between contexts (a second process, a browser tab, a sync
    /// daemon) reports each foreign mutation here as a raw key and value.
    ///
    /// The mirror is invalidated before the event goes out, so subscribers
    /// that recompute on it read through to the store. Returns whether the
    /// change was relevant.
    pub fn apply_external_change(&self, change: &ExternalChange) -> bool {
        match ExternalScope::classify(&self.keys, change) {
            ExternalScope::Everything => {
                self.clear_cache();
                self.bus.emit(ChangeEvent::broad());
            }
            ExternalScope::StatusKey { key, event } => {
                self.lock_mirror().remove(&key);
                self.bus.emit(event);
            }
            ExternalScope::LegacyStatusKey { event } => {
                self.clear_cache();
                self.bus.emit(event);
            }
            ExternalScope::Ignored => {
                debug!("Ignoring external change to {:?}", change.key);
                return false;
            }
        }
        true
    }

    // =============================================================================
    // Migration
    // =============================================================================

    /// Moves `legacy_key` to `key` if `key` is absent in the store
    ///
    /// Returns the migrated value, or `None` when there was nothing to move.
    pub fn migrate(&self, key: &str, legacy_key: &str) -> Option<String> {
        let mut mirror = self.lock_mirror();
        if self.store.get(key).is_some() {
            return None;
        }
        self.migrate_locked(&mut mirror, key, legacy_key)
    }

    /// Caller holds the mirror lock and knows `key` is absent
    fn migrate_locked(&self, mirror: &mut Mirror, key: &str, legacy_key: &str) -> Option<String> {
        let value = self.store.get(legacy_key)?;

        mirror.insert(key.to_string(), Some(value.clone()));
        self.store.set(key, &value);

        // The legacy value is the only copy until the new key reads back
        if self.store.get(key).as_deref() == Some(value.as_str()) {
            self.store.remove(legacy_key);
            debug!("Migrated {} to {}", legacy_key, key);
        } else {
            warn!("Could not persist {}, keeping {}", key, legacy_key);
        }
        Some(value)
    }

    // =============================================================================
    // Internals
    // =============================================================================

    fn lock_mirror(&self) -> MutexGuard<'_, Mirror> {
        self.mirror
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Holds the mirror lock across the whole miss path so no reader sees
    /// a half-migrated key
    fn read(&self, kind: KeyKind, course_id: &str, item_id: &str) -> Option<String> {
        let key = self.keys.key(kind, course_id, item_id);
        let mut mirror = self.lock_mirror();

        if let Some(cached) = mirror.get(&key) {
            return cached.clone();
        }

        let value = match self.store.get(&key) {
            Some(value) => Some(value),
            None => {
                let legacy_key = self.keys.legacy_key(kind, item_id);
                self.migrate_locked(&mut mirror, &key, &legacy_key)
            }
        };

        mirror.insert(key, value.clone());
        value
    }

    fn write(&self, kind: KeyKind, course_id: &str, item_id: &str, value: Option<&str>) {
        let key = self.keys.key(kind, course_id, item_id);
        let legacy_key = self.keys.legacy_key(kind, item_id);
        let mut mirror = self.lock_mirror();

        mirror.insert(key.clone(), value.map(str::to_string));
        match value {
            Some(value) => self.store.set(&key, value),
            None => self.store.remove(&key),
        }
        self.store.remove(&legacy_key);
    }
}
