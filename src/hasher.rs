//! One-way hashing of per-tier challenge passwords.
//!
//! Tier passwords live inside the policy document, which is itself sealed
//! under the master password. The hash is SHA-256, hex encoded, so the
//! stored form matches the `password_hash` field of the document format.

use ring::digest::{self, SHA256};

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Hash a password to 64 lowercase hex characters.
pub fn hash_password(password: &str) -> String {
    hex::encode(digest::digest(&SHA256, password.as_bytes()))
}

/// Check `password` against a stored hex digest.
///
/// The digest bytes are compared without early exit. A stored value that is
/// not a valid 32-byte hex digest never verifies.
pub fn verify_password(password: &str, stored_hex: &str) -> bool {
    let Ok(stored) = hex::decode(stored_hex) else {
        return false;
    };
    let candidate = digest::digest(&SHA256, password.as_bytes());
    let candidate = candidate.as_ref();
    if stored.len() != candidate.len() {
        return false;
    }
    stored
        .iter()
        .zip(candidate)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
