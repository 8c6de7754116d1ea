// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content hashing — SHA-256 fingerprints of stored page images.

use bulkscan_core::error::{BulkscanError, Result};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`, as stored in `img_hash_sha256`.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check `data` against a stored hex digest.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(BulkscanError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}
