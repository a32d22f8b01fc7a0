// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Password-Derived Encryption
//!
//! Containers created with a password get an [`Encryption`] record. Two keys
//! are derived from the password with PBKDF2-HMAC-SHA512 under independent
//! salts:
//!
//! - the **verifier** (`hash_result`), stored, used only to check a password
//! - the **content key**, never stored, used to encrypt file payloads
//!
//! Payloads are AES-256-CBC with PKCS#7 padding and a per-file 16-byte IV,
//! processed in streaming fashion by [`StreamEncryptor`] / [`StreamDecryptor`].

pub mod cipher;
pub mod encryption;
pub mod kdf;

pub use cipher::{decrypt_stream, ContentKey, StreamDecryptor, StreamEncryptor, IV_LEN};
pub use encryption::{Base64Bytes, Encryption};

use ring::rand::{SecureRandom, SystemRandom};

/// Error type for key derivation and cipher operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("system randomness unavailable")]
    Randomness,
    #[error("stored {what} has length {actual}, expected {expected}")]
    InvalidLength {
        what: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("ciphertext is truncated or wrongly padded")]
    Padding,
}

/// Fill `buf` from the operating system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::Randomness)
}

/// Fresh random byte array.
pub fn random_array<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    fill_random(&mut out)?;
    Ok(out)
}
