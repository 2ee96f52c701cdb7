// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document integrity — SHA-256 fingerprints of submitted documents.

use sha2::{Digest, Sha256};

use crate::error::{AnalysisError, Result};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
///
/// Embedded in every analysis report so a verdict can be tied back to the
/// exact bytes that were examined.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that `data` matches the expected SHA-256 hex digest.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(AnalysisError::InvalidMetadata(format!(
            "document fingerprint mismatch: expected {expected_hex}, got {actual}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
    }

    #[test]
    fn verify_accepts_uppercase_digest() {
        let upper = hash_bytes(b"verifdoc").to_ascii_uppercase();
        assert!(verify_hash(b"verifdoc", &upper).is_ok());
    }

    #[test]
    fn verify_mismatched_hash() {
        let err = verify_hash(b"a", "0000").unwrap_err();
        assert!(err.to_string().contains("expected 0000"));
    }
}
