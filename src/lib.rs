//! # obsguard
//!
//! Multi-level security gate and sealed credential storage for bulk
//! object-storage operations.
//!
//! Every storage operation maps to one of four privilege tiers. A tier may
//! carry its own password; protected tiers challenge the operator before the
//! operation runs, and sensitive tiers additionally ask for confirmation.
//! The tier map, and the storage credentials, are persisted as documents
//! sealed with AES-256-GCM under a PBKDF2-derived key.
//!
//! ## Public API
//!
//! - [`gate::SecurityPolicy`]: load, configure, authorize, list tiers.
//! - [`credentials::CredentialConfig`]: load, seal and reseal credentials.
//! - [`manager::SecureManager`]: gated bulk operations over any
//!   [`storage::StorageClient`].
//! - [`store`]: the generic seal/unseal codec and its file pair.
//!
//! Key material never leaves the crate. The AEAD primitives in `crypto` are
//! internal, and [`keys::DerivedKey`] exposes no raw bytes.

pub mod audit;
pub mod challenge;
pub mod credentials;
pub(crate) mod crypto;
pub mod error;
pub mod gate;
pub mod hasher;
pub mod keys;
pub mod manager;
pub mod policy;
pub mod storage;
pub mod store;

pub use challenge::{ChallengeProvider, ScriptedChallenge, TerminalChallenge};
pub use credentials::{CredentialConfig, Credentials};
pub use error::ObsGuardError;
pub use gate::{AccessDecision, DenialReason, SecurityPolicy};
pub use manager::{AccessGate, BatchReport, SecureManager};
pub use policy::{PolicyDocument, SecurityProfile, SecurityTier};
pub use store::{EncryptedFile, SealedDocument};
