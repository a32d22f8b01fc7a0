// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PBKDF2 key stretching.

use std::num::NonZeroU32;

use ring::pbkdf2;

/// Output length of every derived key.
pub const KEY_LEN: usize = 32;

/// Length of the verifier and content-key salts.
pub const SALT_LEN: usize = 32;

pub const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(10_000) {
    Some(iterations) => iterations,
    None => panic!("iteration count must be non-zero"),
};

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA512;

/// Derive a 32-byte key from `password` under `salt`.
pub fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(
        ALGORITHM,
        PBKDF2_ITERATIONS,
        salt,
        password.as_bytes(),
        &mut out,
    );
    out
}

/// Check `password` against a previously derived key in constant time.
///
/// A stored verifier must be exactly [`KEY_LEN`] bytes; PBKDF2 output is
/// prefix-stable, so a truncated verifier would otherwise still match.
pub fn verify_key(password: &str, salt: &[u8], expected: &[u8]) -> bool {
    expected.len() == KEY_LEN
        && pbkdf2::verify(
            ALGORITHM,
            PBKDF2_ITERATIONS,
            salt,
            password.as_bytes(),
            expected,
        )
        .is_ok()
}
