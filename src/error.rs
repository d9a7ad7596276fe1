//! Error types for obsguard.
//!
//! Each variant is a distinct failure class the operator must be able to tell
//! apart: a broken seal, a refused operation, an invalid configuration, or a
//! failing storage call. Messages for the cryptographic variants are
//! intentionally minimal. They say *what* failed without revealing *why*,
//! so a wrong password and a tampered file look identical.

use thiserror::Error;

/// The single error type for all obsguard operations.
#[derive(Debug, Error)]
pub enum ObsGuardError {
    /// A sealed document could not be opened. Covers a wrong master
    /// password, a tampered or truncated ciphertext and a payload that does
    /// not parse after decryption.
    #[error("authentication failed: invalid master password or corrupted document")]
    Authentication,

    /// The security gate refused an operation.
    #[error("access denied for operation '{operation}': {reason}")]
    AuthorizationDenied { operation: String, reason: String },

    /// Required configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The storage backend failed for a single object or listing call.
    #[error("storage operation failed for '{key}': {reason}")]
    StorageOperation { key: String, reason: String },

    /// A file or prompt could not be read or written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// Encryption failed. The underlying `ring` operation returned an error.
    #[error("encryption failed")]
    EncryptionFailure,
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, ObsGuardError>;
