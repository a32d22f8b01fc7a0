// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! File-backed persistence for tokens, containers, file payloads and abuse
//! reports. JSON documents on disk are the source of truth; live records are
//! shared in-process through a weak cache and serialized per id.
//!
//! ## Storage Layout
//!
//! ```text
//! {data}/
//!   root-token.txt                 # Id of the root token
//!   token/
//!     {token_id}.json
//!   container/{container_id}/
//!     info.json                    # Limits and file list
//!     encryption.json              # Only for password-protected containers
//!     files/{file_id}              # Payloads (AES-256-CBC when encrypted)
//!     reports/{report_id}.json
//!     report-pw.txt                # Password left by a reporter
//! ```
//!
//! ## Concurrency
//!
//! - Every loaded record is an `Arc<tokio::sync::Mutex<_>>`; callers hold the
//!   lock across read-modify-write
//! - Payload reads and writes take a per-file exclusive lock instead of the
//!   container lock
//! - Transient I/O conflicts are retried a bounded number of times

pub mod bounded;
pub mod error;
pub mod file_locks;
pub mod paths;
pub mod record_cache;
pub mod record_store;
pub mod repository;

use tokio::fs;

pub use error::{StorageError, StorageResult};
pub use paths::StoragePaths;
pub use record_store::RetryPolicy;
pub use repository::{
    Container, ContainerAccess, ContainerRepository, FileDownload, FileMeta, FileRepository,
    Report, ReportInfo, ReportRepository, Token, TokenRepository, UnlockedContainer,
};

/// All repositories over one data directory.
pub struct Storage {
    paths: StoragePaths,
    pub tokens: TokenRepository,
    pub containers: ContainerRepository,
    pub reports: ReportRepository,
}

impl Storage {
    /// Open the data directory, creating its top-level layout.
    ///
    /// Safe to call on an existing directory.
    pub async fn open(paths: StoragePaths, retry: RetryPolicy) -> StorageResult<Self> {
        for dir in [paths.tokens_dir(), paths.containers_dir()] {
            fs::create_dir_all(&dir).await?;
        }
        Ok(Self {
            tokens: TokenRepository::new(&paths, retry),
            containers: ContainerRepository::new(&paths, retry),
            reports: ReportRepository::new(&paths, retry),
            paths,
        })
    }

    pub fn files(&self) -> FileRepository<'_> {
        FileRepository::new(&self.containers)
    }

    /// Write-read-delete probe of the data directory.
    pub async fn health_check(&self) -> StorageResult<()> {
        let probe = self.paths.root().join(".health_check");
        let data = b"health_check_data";

        fs::write(&probe, data).await?;
        let read_back = fs::read(&probe).await?;
        fs::remove_file(&probe).await?;

        if read_back != data {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Health check data mismatch",
            )));
        }
        Ok(())
    }
}
