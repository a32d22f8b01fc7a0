// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Container repository: quota-scoped buckets of files.
//!
//! ## Storage Layout
//!
//! ```text
//! {data}/container/{container_id}/
//!   info.json        # Container metadata and file list
//!   encryption.json  # Verifier, content-key salt and IVs (encrypted containers only)
//!   files/{file_id}  # Payloads
//!   reports/         # Abuse reports
//! ```
//!
//! ## Access Rule
//!
//! | Container   | No password        | Correct password | Wrong password |
//! |-------------|--------------------|------------------|----------------|
//! | unencrypted | full               | 403              | 403            |
//! | encrypted   | public view only   | full             | 403            |

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::file_locks::FileLocks;
use super::super::record_cache::RecordHandle;
use super::super::record_store::{random_key, Layout, Record, RecordStore, RetryPolicy};
use super::super::{StoragePaths, StorageError, StorageResult};
use super::tokens::TokenRepository;
use crate::crypto::{ContentKey, Encryption};

/// Random bytes behind a container id.
pub const CONTAINER_ID_BYTES: usize = 15;

/// Random bytes behind a container-local file id.
pub const FILE_ID_BYTES: usize = 3;

/// Maximum number of distinct paths in one container.
pub const MAX_FILES_PER_CONTAINER: usize = 1024;

/// Every stored file is accounted at least this many bytes.
pub const MIN_ACCOUNTED_FILE_SIZE: u64 = 1024;

/// Metadata of one stored file.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct FileMeta {
    /// Container-local id, also the payload's file name
    pub id: String,
    /// Client-chosen logical key
    pub path: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Declared length of the last upload
    pub size: u64,
    pub mime: String,
}

/// Container stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Fixed at creation from the spending token
    pub storage_limit: u64,
    #[serde(default)]
    pub files: Vec<FileMeta>,
    /// Persisted separately as `encryption.json`
    #[serde(skip)]
    pub encryption: Option<Encryption>,
}

impl Record for Container {
    const ID_BYTES: usize = CONTAINER_ID_BYTES;
    const LAYOUT: Layout = Layout::Directory {
        info: "info.json",
        sidecar: Some("encryption.json"),
    };
    type Sidecar = Encryption;

    fn id(&self) -> &str {
        &self.id
    }

    fn sidecar(&self) -> Option<&Encryption> {
        self.encryption.as_ref()
    }

    fn attach_sidecar(&mut self, sidecar: Encryption) {
        self.encryption = Some(sidecar);
    }
}

impl Container {
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn file_by_path(&self, path: &str) -> Option<&FileMeta> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Bytes accounted to every file except the one at `path`.
    pub fn usage_excluding(&self, path: &str) -> Option<u64> {
        self.files
            .iter()
            .filter(|f| f.path != path)
            .try_fold(0u64, |total, f| {
                total.checked_add(f.size.max(MIN_ACCOUNTED_FILE_SIZE))
            })
    }

    /// Check the quotas for writing `size` bytes at `path` and create or
    /// update its metadata. An existing path keeps its id.
    pub fn reserve_file(&mut self, path: &str, size: u64, mime: String) -> StorageResult<FileMeta> {
        let existing = self.files.iter().position(|f| f.path == path);
        if existing.is_none() && self.files.len() >= MAX_FILES_PER_CONTAINER {
            return Err(StorageError::insufficient_storage(format!(
                "Container {} already holds {MAX_FILES_PER_CONTAINER} files",
                self.id
            )));
        }

        let projected = self
            .usage_excluding(path)
            .and_then(|used| used.checked_add(size));
        if projected.is_none_or(|total| total > self.storage_limit) {
            return Err(StorageError::insufficient_storage(format!(
                "Container {} cannot fit {size} more bytes",
                self.id
            )));
        }

        let now = Utc::now();
        let meta = match existing {
            Some(index) => {
                let meta = &mut self.files[index];
                meta.modified = now;
                meta.size = size;
                meta.mime = mime;
                meta.clone()
            }
            None => {
                let id = loop {
                    let id = random_key(FILE_ID_BYTES)?;
                    if !self.files.iter().any(|f| f.id == id) {
                        break id;
                    }
                };
                let meta = FileMeta {
                    id,
                    path: path.to_string(),
                    created: now,
                    modified: now,
                    size,
                    mime,
                };
                self.files.push(meta.clone());
                meta
            }
        };
        self.modified = now;
        Ok(meta)
    }

    /// Drop the entry at `path` and its IV.
    pub fn remove_file(&mut self, path: &str) -> Option<FileMeta> {
        let index = self.files.iter().position(|f| f.path == path)?;
        let meta = self.files.remove(index);
        if let Some(encryption) = self.encryption.as_mut() {
            encryption.forget_iv(&meta.id);
        }
        self.modified = Utc::now();
        Some(meta)
    }
}

/// A container that passed the access rule with full rights.
pub struct UnlockedContainer {
    pub id: String,
    pub handle: RecordHandle<Container>,
    /// Content key of an encrypted container, derived from the verified password
    pub key: Option<ContentKey>,
}

/// Outcome of opening a container.
pub enum ContainerAccess {
    /// Encrypted container opened without a password: only its id may be shown
    Locked { id: String },
    Unlocked(UnlockedContainer),
}

/// Repository for container operations.
pub struct ContainerRepository {
    store: RecordStore<Container>,
    paths: StoragePaths,
    file_locks: FileLocks,
}

impl ContainerRepository {
    pub fn new(paths: &StoragePaths, retry: RetryPolicy) -> Self {
        Self {
            store: RecordStore::new(paths.containers_dir(), retry),
            paths: paths.clone(),
            file_locks: FileLocks::new(),
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn file_locks(&self) -> &FileLocks {
        &self.file_locks
    }

    /// Get a container by ID without any access check.
    pub async fn get(&self, container_id: &str) -> StorageResult<Option<RecordHandle<Container>>> {
        self.store.get(container_id).await
    }

    pub async fn save(&self, container: &Container) -> StorageResult<()> {
        self.store.save(container).await
    }

    /// Lazily enumerate all containers.
    pub fn list(&self) -> impl Stream<Item = StorageResult<RecordHandle<Container>>> + Send + '_ {
        self.store.list()
    }

    /// Create a container paid for by `token_id`.
    ///
    /// The token stays locked until it has been charged.
    pub async fn create(
        &self,
        tokens: &TokenRepository,
        token_id: &str,
        password: Option<&str>,
    ) -> StorageResult<Container> {
        let token_handle = tokens
            .get(token_id)
            .await?
            .ok_or_else(|| StorageError::forbidden(format!("Token {token_id} does not exist")))?;
        let mut token = token_handle.lock().await;
        let storage_limit = token.check_spend()?;
        let encryption = password.map(Encryption::create).transpose()?;

        let handle = self
            .store
            .create(|id| {
                let now = Utc::now();
                Container {
                    id,
                    created: now,
                    modified: now,
                    storage_limit,
                    files: Vec::new(),
                    encryption,
                }
            })
            .await?;
        let container = handle.lock().await.clone();
        tokens.spend_for_container(&mut token, &container.id).await?;

        tracing::info!(
            container = %container.id,
            token = %token.id,
            storage_limit,
            encrypted = container.is_encrypted(),
            "Created container"
        );
        Ok(container)
    }

    /// Apply the access rule.
    ///
    /// Password checks run on the blocking pool against a copy of the
    /// encryption metadata, so the container stays unlocked meanwhile.
    pub async fn open(&self, container_id: &str, password: Option<&str>) -> StorageResult<ContainerAccess> {
        let handle = self
            .get(container_id)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("Container {container_id}")))?;
        let (id, encryption) = {
            let container = handle.lock().await;
            (container.id.clone(), container.encryption.clone())
        };
        let key = match (encryption, password) {
            (None, None) => None,
            (None, Some(_)) => {
                tracing::debug!(container = %id, "Password given for unencrypted container");
                return Err(StorageError::forbidden("Container is not encrypted"));
            }
            (Some(_), None) => return Ok(ContainerAccess::Locked { id }),
            (Some(encryption), Some(password)) => {
                let password = password.to_string();
                let key = tokio::task::spawn_blocking(move || {
                    encryption
                        .verify(&password)
                        .then(|| encryption.content_key(&password))
                })
                .await
                .map_err(std::io::Error::other)?;
                let Some(key) = key else {
                    tracing::debug!(container = %id, "Wrong container password");
                    return Err(StorageError::forbidden("Wrong password"));
                };
                Some(key)
            }
        };
        Ok(ContainerAccess::Unlocked(UnlockedContainer { id, handle, key }))
    }

    /// Apply the access rule for file operations: a locked container is
    /// forbidden rather than partially visible.
    pub async fn open_for_files(&self, container_id: &str, password: Option<&str>) -> StorageResult<UnlockedContainer> {
        match self.open(container_id, password).await? {
            ContainerAccess::Unlocked(unlocked) => Ok(unlocked),
            ContainerAccess::Locked { .. } => Err(StorageError::forbidden("Container requires a password")),
        }
    }
}
