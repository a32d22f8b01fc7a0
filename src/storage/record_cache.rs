// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process cache of live records.
//!
//! The cache never owns a record. It keeps a weak reference to the handle
//! most recently loaded or created for an id, so every caller that is still
//! holding the record shares that one instance. Once the last handle is
//! dropped the entry dies and the next lookup goes back to disk.
//!
//! Handles wrap the record in an async mutex. Callers lock it across their
//! whole read-modify-write span, which serializes concurrent writers of the
//! same id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Mutex as AsyncMutex;

/// Shared, lockable reference to a live record.
pub type RecordHandle<T> = Arc<AsyncMutex<T>>;

/// Weak id -> record map.
pub struct RecordCache<T> {
    entries: Mutex<HashMap<String, Weak<AsyncMutex<T>>>>,
}

impl<T> Default for RecordCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> RecordCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live handle for an id.
    ///
    /// Returns `None` if nothing in the process references the record anymore.
    pub fn get(&self, id: &str) -> Option<RecordHandle<T>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(id).and_then(Weak::upgrade) {
            Some(handle) => Some(handle),
            None => {
                entries.remove(id);
                None
            }
        }
    }

    /// Publish a record and return its shared handle.
    ///
    /// If another task published the same id in the meantime and its handle is
    /// still alive, that handle wins and `record` is discarded.
    pub fn insert(&self, id: &str, record: T) -> RecordHandle<T> {
        let fresh = Arc::new(AsyncMutex::new(record));
        let Ok(mut entries) = self.entries.lock() else {
            return fresh;
        };
        if let Some(live) = entries.get(id).and_then(Weak::upgrade) {
            return live;
        }
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.insert(id.to_string(), Arc::downgrade(&fresh));
        fresh
    }

    /// Number of ids whose record is still referenced somewhere.
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .values()
                    .filter(|weak| weak.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }
}
