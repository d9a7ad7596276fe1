//! Low-level cryptographic operations.
//!
//! This module and `keys` are the only places that import `ring`'s
//! AEAD and randomness APIs. Everything else seals and opens payloads
//! through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//! - **Salt size**: 128 bits (16 bytes), generated fresh per seal

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::ObsGuardError;

/// The AEAD algorithm used for every sealed document.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of a key-derivation salt in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// A nonce generated for a single encryption operation.
/// Newtype to prevent accidental reuse. Each `Nonce` is consumed on use.
struct OwnedNonce(Nonce);

fn generate_nonce() -> Result<OwnedNonce, ObsGuardError> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; NONCE_LEN];
    rng.fill(&mut buf).map_err(|_| ObsGuardError::RandomnessFailure)?;
    Ok(OwnedNonce(Nonce::assume_unique_for_key(buf)))
}

/// Encrypt a plaintext payload using AES-256-GCM.
///
/// # Layout of returned bytes
/// ```text
/// [ nonce (12 bytes) ][ ciphertext + GCM tag ]
/// ```
pub fn encrypt(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, ObsGuardError> {
    let unbound =
        UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| ObsGuardError::EncryptionFailure)?;
    let key = LessSafeKey::new(unbound);

    let nonce = generate_nonce()?;
    let aad = aead::Aad::empty();

    let mut body = plaintext.to_vec();
    let nonce_bytes: [u8; NONCE_LEN] = *nonce.0.as_ref();
    key.seal_in_place_append_tag(nonce.0, aad, &mut body)
        .map_err(|_| ObsGuardError::EncryptionFailure)?;

    let mut output = Vec::with_capacity(NONCE_LEN + body.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&body);
    Ok(output)
}

/// Decrypt a payload produced by [`encrypt`].
///
/// A wrong key, a truncated input and a tampered ciphertext all fail the
/// same way. The caller receives no partial plaintext.
pub fn decrypt(key_bytes: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, ObsGuardError> {
    if ciphertext.len() < NONCE_LEN + ALGORITHM.tag_len() {
        return Err(ObsGuardError::Authentication);
    }

    let nonce_bytes: [u8; NONCE_LEN] = ciphertext[..NONCE_LEN]
        .try_into()
        .map_err(|_| ObsGuardError::Authentication)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound =
        UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| ObsGuardError::Authentication)?;
    let key = LessSafeKey::new(unbound);

    let aad = aead::Aad::empty();
    let mut payload = ciphertext[NONCE_LEN..].to_vec();

    let plaintext = key
        .open_in_place(nonce, aad, &mut payload)
        .map_err(|_| ObsGuardError::Authentication)?;

    Ok(plaintext.to_vec())
}

/// Generate a fresh random salt for key derivation.
pub fn generate_salt() -> Result<[u8; SALT_LEN], ObsGuardError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).map_err(|_| ObsGuardError::RandomnessFailure)?;
    Ok(salt)
}
