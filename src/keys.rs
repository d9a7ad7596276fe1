//! Password-based key derivation and key ownership.
//!
//! This module owns two responsibilities:
//! 1. Stretching a human password and a random salt into a 256-bit key
//!    using PBKDF2-HMAC-SHA256.
//! 2. Holding derived key material in a type that is opaque, non-cloneable,
//!    and zeroised on drop.
//!
//! ## Derivation structure
//!
//! ```text
//! PBKDF2-HMAC-SHA256(
//!     password   = utf8(password),
//!     salt       = 16 random bytes, stored next to the ciphertext,
//!     iterations = 100_000,
//!     length     = 32
//! )
//! ```
//!
//! The iteration count is the work factor against offline guessing. Same
//! password and salt always give the same key; a fresh salt gives an
//! unrelated one.

use std::num::NonZeroU32;

use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN, SALT_LEN};
use crate::error::ObsGuardError;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const ITERATIONS: NonZeroU32 = match NonZeroU32::new(PBKDF2_ITERATIONS) {
    Some(n) => n,
    None => panic!("PBKDF2 iteration count must be non-zero"),
};

static PBKDF2_ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

// ---------------------------------------------------------------------------
// Salt
// ---------------------------------------------------------------------------

/// The random salt stored alongside a sealed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Draw a fresh salt from the system RNG.
    pub fn generate() -> Result<Self, ObsGuardError> {
        Ok(Self(crypto::generate_salt()?))
    }

    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a salt read back from disk. Anything other than exactly
    /// `SALT_LEN` bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A symmetric key derived from a password.
///
/// - Not `Clone`. Each key is scoped to one seal or unseal call.
/// - Zeroised on drop.
/// - Raw bytes are `pub(crate)`; they never leave the crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive a key for `password` under an existing `salt`.
///
/// Pure and infallible: the same inputs always produce the same key.
pub fn derive_with_salt(password: &str, salt: &Salt) -> DerivedKey {
    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::derive(
        PBKDF2_ALGORITHM,
        ITERATIONS,
        salt.as_bytes(),
        password.as_bytes(),
        &mut bytes,
    );
    DerivedKey { bytes }
}

/// Derive a key for `password`, generating a salt when none is supplied.
///
/// Returns the key together with the salt that produced it so the caller
/// can persist the salt. The only failure is the RNG refusing to produce
/// a fresh salt.
pub fn derive(password: &str, salt: Option<Salt>) -> Result<(DerivedKey, Salt), ObsGuardError> {
    let salt = match salt {
        Some(salt) => salt,
        None => Salt::generate()?,
    };
    Ok((derive_with_salt(password, &salt), salt))
}
