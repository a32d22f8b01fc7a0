// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Streaming AES-256-CBC with PKCS#7 padding.
//!
//! Input arrives in arbitrary chunk sizes. Complete blocks are processed as
//! soon as they are available; the encryptor buffers the partial tail until
//! [`StreamEncryptor::finish`] pads it, the decryptor always holds back the
//! last full block because only the end of the stream may carry padding.

use std::fmt;
use std::io;

use aes::Aes256;
use bytes::Bytes;
use cbc::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
    KeyIvInit,
};
use futures::{stream, Stream, StreamExt};

use super::kdf::{derive_key, KEY_LEN};
use super::CryptoError;

pub const BLOCK_LEN: usize = 16;
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Symmetric key for file payloads. Derived on demand, never persisted.
pub struct ContentKey([u8; KEY_LEN]);

impl ContentKey {
    pub fn derive(password: &str, encryption_salt: &[u8]) -> Self {
        Self(derive_key(password, encryption_salt))
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

/// Incremental encryptor.
pub struct StreamEncryptor {
    cipher: Aes256CbcEnc,
    pending: Vec<u8>,
}

impl StreamEncryptor {
    pub fn new(key: &ContentKey, iv: &[u8; IV_LEN]) -> Self {
        Self {
            cipher: Aes256CbcEnc::new(GenericArray::from_slice(&key.0), GenericArray::from_slice(iv)),
            pending: Vec::with_capacity(BLOCK_LEN),
        }
    }

    /// Feed plaintext, get back the ciphertext of every block completed so far.
    pub fn update(&mut self, plaintext: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(plaintext);
        let ready = self.pending.len() - self.pending.len() % BLOCK_LEN;
        let mut out: Vec<u8> = self.pending.drain(..ready).collect();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        out
    }

    /// Pad and encrypt the buffered tail. Always yields exactly one block.
    pub fn finish(self) -> Result<Vec<u8>, CryptoError> {
        let Self { cipher, pending } = self;
        let mut block = [0u8; BLOCK_LEN];
        block[..pending.len()].copy_from_slice(&pending);
        let out = cipher
            .encrypt_padded_mut::<Pkcs7>(&mut block, pending.len())
            .map_err(|_| CryptoError::Padding)?;
        Ok(out.to_vec())
    }
}

/// Incremental decryptor.
pub struct StreamDecryptor {
    cipher: Aes256CbcDec,
    pending: Vec<u8>,
}

impl StreamDecryptor {
    pub fn new(key: &ContentKey, iv: &[u8; IV_LEN]) -> Self {
        Self {
            cipher: Aes256CbcDec::new(GenericArray::from_slice(&key.0), GenericArray::from_slice(iv)),
            pending: Vec::with_capacity(2 * BLOCK_LEN),
        }
    }

    /// Feed ciphertext, get back plaintext of every block that cannot be the last one.
    pub fn update(&mut self, ciphertext: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(ciphertext);
        let len = self.pending.len();
        if len <= BLOCK_LEN {
            return Vec::new();
        }
        let held = match len % BLOCK_LEN {
            0 => BLOCK_LEN,
            partial => partial,
        };
        let mut out: Vec<u8> = self.pending.drain(..len - held).collect();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        out
    }

    /// Decrypt the final block and strip its padding.
    pub fn finish(self) -> Result<Vec<u8>, CryptoError> {
        let Self { cipher, mut pending } = self;
        if pending.len() != BLOCK_LEN {
            return Err(CryptoError::Padding);
        }
        let out = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut pending)
            .map_err(|_| CryptoError::Padding)?;
        Ok(out.to_vec())
    }
}

/// Pipe a ciphertext byte stream through a decryptor.
///
/// Plaintext chunks are emitted as ciphertext arrives; a padding failure at
/// the end surfaces as an `InvalidData` I/O error on the last item.
pub fn decrypt_stream<S>(
    ciphertext: S,
    decryptor: StreamDecryptor,
) -> impl Stream<Item = io::Result<Bytes>> + Send
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
{
    stream::try_unfold(Some((ciphertext, decryptor)), |state| async move {
        let Some((mut source, mut decryptor)) = state else {
            return Ok::<_, io::Error>(None);
        };
        while let Some(chunk) = source.next().await {
            let plaintext = decryptor.update(&chunk?);
            if !plaintext.is_empty() {
                return Ok(Some((Bytes::from(plaintext), Some((source, decryptor)))));
            }
        }
        let tail = decryptor
            .finish()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if tail.is_empty() {
            Ok(None)
        } else {
            Ok(Some((Bytes::from(tail), None)))
        }
    })
}
