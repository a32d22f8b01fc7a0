// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-container encryption metadata, persisted as `encryption.json`.

use std::collections::BTreeMap;
use std::fmt;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::cipher::{ContentKey, IV_LEN};
use super::kdf::{derive_key, verify_key, SALT_LEN};
use super::{random_array, CryptoError};

/// Byte string stored as standard base64 in JSON.
#[derive(Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64::decode_vec(&encoded)
            .map(Base64Bytes)
            .map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Base64Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} bytes>", self.0.len())
    }
}

/// Password verifier, content-key salt and per-file IVs of a container.
///
/// The password and the content key are never part of this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encryption {
    pub hash_salt: Base64Bytes,
    pub hash_result: Base64Bytes,
    pub encryption_salt: Base64Bytes,
    /// file id -> IV, written on the file's first encrypted upload
    #[serde(default)]
    pub file_iv: BTreeMap<String, Base64Bytes>,
}

impl Encryption {
    /// Fresh metadata for `password` with two independent random salts.
    pub fn create(password: &str) -> Result<Self, CryptoError> {
        let hash_salt: [u8; SALT_LEN] = random_array()?;
        let encryption_salt: [u8; SALT_LEN] = random_array()?;
        Ok(Self {
            hash_result: Base64Bytes(derive_key(password, &hash_salt).to_vec()),
            hash_salt: Base64Bytes(hash_salt.to_vec()),
            encryption_salt: Base64Bytes(encryption_salt.to_vec()),
            file_iv: BTreeMap::new(),
        })
    }

    pub fn verify(&self, password: &str) -> bool {
        verify_key(password, &self.hash_salt.0, &self.hash_result.0)
    }

    pub fn content_key(&self, password: &str) -> ContentKey {
        ContentKey::derive(password, &self.encryption_salt.0)
    }

    /// Stored IV of a file, if it was ever written encrypted.
    pub fn iv(&self, file_id: &str) -> Result<Option<[u8; IV_LEN]>, CryptoError> {
        self.file_iv
            .get(file_id)
            .map(|iv| {
                <[u8; IV_LEN]>::try_from(iv.0.as_slice()).map_err(|_| CryptoError::InvalidLength {
                    what: "file IV",
                    actual: iv.0.len(),
                    expected: IV_LEN,
                })
            })
            .transpose()
    }

    /// Existing IV of a file, or a new random one. The flag is `true` when
    /// the IV was just created and the metadata needs saving.
    ///
    /// Overwrites of a file reuse its IV.
    pub fn ensure_iv(&mut self, file_id: &str) -> Result<([u8; IV_LEN], bool), CryptoError> {
        if let Some(iv) = self.iv(file_id)? {
            return Ok((iv, false));
        }
        let iv: [u8; IV_LEN] = random_array()?;
        self.file_iv
            .insert(file_id.to_string(), Base64Bytes(iv.to_vec()));
        Ok((iv, true))
    }

    pub fn forget_iv(&mut self, file_id: &str) -> bool {
        self.file_iv.remove(file_id).is_some()
    }
}
