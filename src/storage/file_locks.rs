// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Exclusive access to payload files.
//!
//! At most one reader or writer touches a backing file at a time. Locks are
//! created on demand and vanish with their last guard; different files never
//! contend.

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::OwnedMutexGuard;

use super::record_cache::RecordCache;

pub type FileGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct FileLocks {
    locks: RecordCache<()>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`.
    pub async fn acquire(&self, path: &Path) -> FileGuard {
        let key = path.to_string_lossy();
        let lock = match self.locks.get(&key) {
            Some(lock) => lock,
            None => self.locks.insert(&key, ()),
        };
        lock.lock_owned().await
    }
}

/// Stream that keeps a file guard alive until it is dropped.
pub struct GuardedStream<S> {
    inner: S,
    _guard: FileGuard,
}

impl<S> GuardedStream<S> {
    pub fn new(inner: S, guard: FileGuard) -> Self {
        Self {
            inner,
            _guard: guard,
        }
    }
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
