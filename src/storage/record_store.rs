// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Generic file-backed record store.
//!
//! Every persisted entity kind (tokens, containers, reports) goes through a
//! [`RecordStore`]: JSON on disk is the source of truth, live instances are
//! shared in-process through a weak [`RecordCache`].
//!
//! ## Layouts
//!
//! ```text
//! Flat:       {dir}/{id}.json
//! Directory:  {dir}/{id}/{info}        + optional {dir}/{id}/{sidecar}
//! ```
//!
//! Saves overwrite the file in place and then truncate it to the written
//! length. Transient I/O failures are retried with a fixed delay up to the
//! configured attempt ceiling, after which [`StorageError::Busy`] surfaces.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use futures::{stream, Stream};
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs::{self, OpenOptions, ReadDir};
use tokio::io::AsyncWriteExt;

use super::record_cache::{RecordCache, RecordHandle};
use super::{StorageError, StorageResult};
use crate::crypto::fill_random;

/// Where a record kind keeps its files.
#[derive(Debug, Clone, Copy)]
pub enum Layout {
    /// `{dir}/{id}.json`
    Flat,
    /// `{dir}/{id}/{info}`, with an optional second file for the sidecar
    Directory {
        info: &'static str,
        sidecar: Option<&'static str>,
    },
}

/// A persisted entity kind.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Random bytes behind a generated id (before base64).
    const ID_BYTES: usize;
    const LAYOUT: Layout;
    /// Extra document persisted in its own file next to the record.
    type Sidecar: Serialize + DeserializeOwned + Send + Sync;

    fn id(&self) -> &str;

    fn sidecar(&self) -> Option<&Self::Sidecar> {
        None
    }

    fn attach_sidecar(&mut self, _sidecar: Self::Sidecar) {}
}

// ========== Identifiers ==========

/// Random URL-safe identifier: `len` random bytes, base64url without padding.
pub fn random_key(len: usize) -> StorageResult<String> {
    let mut bytes = vec![0u8; len];
    fill_random(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// `[A-Za-z0-9_-]+`. Anything else never reaches the filesystem.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

// ========== Retry ==========

/// Bounded retry for I/O that failed because something else held the file.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 50,
            delay: Duration::from_millis(5),
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::TimedOut
    )
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    if attempt >= self.attempts {
                        tracing::warn!(attempts = attempt, error = %e, "Storage stayed busy, giving up");
                        return Err(StorageError::Busy { attempts: attempt });
                    }
                    tracing::debug!(attempt, error = %e, "Transient storage conflict, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ========== Store ==========

/// Cached, file-backed store for one record kind under one directory.
pub struct RecordStore<T: Record> {
    dir: PathBuf,
    retry: RetryPolicy,
    cache: Arc<RecordCache<T>>,
}

impl<T: Record> RecordStore<T> {
    pub fn new(dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self::with_cache(dir, retry, Arc::new(RecordCache::new()))
    }

    /// Store over `dir` sharing an existing cache, for kinds split across
    /// several directories.
    pub fn with_cache(dir: impl Into<PathBuf>, retry: RetryPolicy, cache: Arc<RecordCache<T>>) -> Self {
        Self {
            dir: dir.into(),
            retry,
            cache,
        }
    }

    /// Canonical file of a record.
    pub fn record_path(&self, id: &str) -> PathBuf {
        match T::LAYOUT {
            Layout::Flat => self.dir.join(format!("{id}.json")),
            Layout::Directory { info, .. } => self.dir.join(id).join(info),
        }
    }

    fn sidecar_path(&self, id: &str) -> Option<PathBuf> {
        match T::LAYOUT {
            Layout::Directory {
                sidecar: Some(name),
                ..
            } => Some(self.dir.join(id).join(name)),
            _ => None,
        }
    }

    /// Load a record, sharing the live instance if one exists.
    ///
    /// Invalid ids and missing files both yield `Ok(None)`.
    pub async fn get(&self, id: &str) -> StorageResult<Option<RecordHandle<T>>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        if let Some(handle) = self.cache.get(id) {
            return Ok(Some(handle));
        }

        let path = self.record_path(id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let mut record: T = self.read_json(&path).await?;
        if let Some(sidecar_path) = self.sidecar_path(id) {
            if fs::try_exists(&sidecar_path).await? {
                record.attach_sidecar(self.read_json(&sidecar_path).await?);
            }
        }
        Ok(Some(self.cache.insert(id, record)))
    }

    /// Persist a record (and its sidecar) over its canonical files.
    pub async fn save(&self, record: &T) -> StorageResult<()> {
        let id = record.id();
        self.write_json(&self.record_path(id), record).await?;

        if let Some(sidecar_path) = self.sidecar_path(id) {
            match record.sidecar() {
                Some(sidecar) => self.write_json(&sidecar_path, sidecar).await?,
                None => match fs::remove_file(&sidecar_path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        Ok(())
    }

    /// Generate an unused id, build the record from it, save and cache it.
    pub async fn create(&self, init: impl FnOnce(String) -> T) -> StorageResult<RecordHandle<T>> {
        let id = loop {
            let id = random_key(T::ID_BYTES)?;
            if !fs::try_exists(self.record_path(&id)).await? {
                break id;
            }
        };
        let record = init(id.clone());
        self.save(&record).await?;
        Ok(self.cache.insert(&id, record))
    }

    /// Lazily enumerate every record under the directory, one load per item.
    pub fn list(&self) -> impl Stream<Item = StorageResult<RecordHandle<T>>> + Send + '_ {
        stream::try_unfold(None::<ReadDir>, move |entries| async move {
            let mut entries = match entries {
                Some(entries) => entries,
                None => match fs::read_dir(&self.dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Ok::<_, StorageError>(None)
                    }
                    Err(e) => return Err(e.into()),
                },
            };
            while let Some(entry) = entries.next_entry().await? {
                let Some(id) = Self::id_from_entry(&entry).await? else {
                    continue;
                };
                if let Some(handle) = self.get(&id).await? {
                    return Ok(Some((handle, Some(entries))));
                }
            }
            Ok(None)
        })
    }

    async fn id_from_entry(entry: &fs::DirEntry) -> StorageResult<Option<String>> {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            return Ok(None);
        };
        let id = match T::LAYOUT {
            Layout::Flat => name.strip_suffix(".json"),
            Layout::Directory { .. } => entry.file_type().await?.is_dir().then_some(name),
        };
        Ok(id.filter(|id| is_valid_id(id)).map(str::to_string))
    }

    async fn read_json<V: DeserializeOwned>(&self, path: &Path) -> StorageResult<V> {
        let bytes = self.retry.run(|| fs::read(path)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_json<V: Serialize + ?Sized>(&self, path: &Path, value: &V) -> StorageResult<()> {
        let data = serde_json::to_vec_pretty(value)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.retry.run(|| overwrite(path, &data)).await
    }
}

/// Write `data` over the start of the file, then cut off whatever a previous,
/// longer version left behind.
async fn overwrite(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.set_len(data.len() as u64).await?;
    file.sync_data().await
}
