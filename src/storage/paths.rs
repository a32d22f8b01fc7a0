// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk storage layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent storage.
pub const DATA_ROOT: &str = "./data";

/// File holding the id of the root token.
pub const ROOT_TOKEN_MARKER: &str = "root-token.txt";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Marker file storing the root token id.
    pub fn root_token_marker(&self) -> PathBuf {
        self.root.join(ROOT_TOKEN_MARKER)
    }

    // ========== Token Paths ==========

    /// Directory containing all tokens.
    pub fn tokens_dir(&self) -> PathBuf {
        self.root.join("token")
    }

    /// Path to a specific token file.
    pub fn token(&self, token_id: &str) -> PathBuf {
        self.tokens_dir().join(format!("{token_id}.json"))
    }

    // ========== Container Paths ==========

    /// Directory containing all containers.
    pub fn containers_dir(&self) -> PathBuf {
        self.root.join("container")
    }

    /// Directory for a specific container.
    pub fn container_dir(&self, container_id: &str) -> PathBuf {
        self.containers_dir().join(container_id)
    }

    /// Path to container metadata file.
    pub fn container_info(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join("info.json")
    }

    /// Path to the container's encryption sidecar.
    pub fn container_encryption(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join("encryption.json")
    }

    /// Directory holding the payloads of a container, one file per file id.
    pub fn container_files_dir(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join("files")
    }

    /// Backing file for a stored payload.
    pub fn container_file(&self, container_id: &str, file_id: &str) -> PathBuf {
        self.container_files_dir(container_id).join(file_id)
    }

    // ========== Report Paths ==========

    /// Directory with the abuse reports filed against a container.
    pub fn reports_dir(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join("reports")
    }

    /// Path to a specific report file.
    pub fn report(&self, container_id: &str, report_id: &str) -> PathBuf {
        self.reports_dir(container_id)
            .join(format!("{report_id}.json"))
    }

    /// Plaintext password left by a reporter so moderators can open the container.
    pub fn report_password(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join("report-pw.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("./data"));
        assert_eq!(
            paths.root_token_marker(),
            PathBuf::from("./data/root-token.txt")
        );
    }

    #[test]
    fn token_paths_are_correct() {
        let paths = StoragePaths::new("/srv/vault");
        assert_eq!(paths.tokens_dir(), PathBuf::from("/srv/vault/token"));
        assert_eq!(
            paths.token("abc_-"),
            PathBuf::from("/srv/vault/token/abc_-.json")
        );
    }

    #[test]
    fn container_paths_are_correct() {
        let paths = StoragePaths::new("/srv/vault");
        assert_eq!(
            paths.container_info("c1"),
            PathBuf::from("/srv/vault/container/c1/info.json")
        );
        assert_eq!(
            paths.container_encryption("c1"),
            PathBuf::from("/srv/vault/container/c1/encryption.json")
        );
        assert_eq!(
            paths.container_file("c1", "f9"),
            PathBuf::from("/srv/vault/container/c1/files/f9")
        );
    }

    #[test]
    fn report_paths_are_correct() {
        let paths = StoragePaths::new("/srv/vault");
        assert_eq!(
            paths.report("c1", "r1"),
            PathBuf::from("/srv/vault/container/c1/reports/r1.json")
        );
        assert_eq!(
            paths.report_password("c1"),
            PathBuf::from("/srv/vault/container/c1/report-pw.txt")
        );
    }
}
