// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::io;

use crate::crypto::CryptoError;

/// Error type for storage, token and container operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Entity, file or path not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Wrong password, password where none is expected, or token policy violation
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Storage quota, file-count cap or mint budget exceeded
    #[error("Insufficient storage: {0}")]
    InsufficientStorage(String),
    /// Malformed client payload
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Upload without a declared length
    #[error("Length required")]
    LengthRequired,
    /// Record file stayed locked for the whole retry budget
    #[error("Storage busy after {attempts} attempts")]
    Busy { attempts: u32 },
    /// Randomness, stored key material or cipher failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl StorageError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn insufficient_storage(what: impl Into<String>) -> Self {
        Self::InsufficientStorage(what.into())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
