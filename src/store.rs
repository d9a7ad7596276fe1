//! Password-sealed document persistence.
//!
//! A document is serialized to JSON, encrypted under a key derived from the
//! master password with a fresh salt, and stored as two companion files:
//!
//! ```text
//! <name>.enc   nonce || AES-256-GCM ciphertext || tag
//! <name>.salt  16 raw salt bytes
//! ```
//!
//! Opening a sealed document fails with [`ObsGuardError::Authentication`]
//! for every cause (wrong password, tampering, unparsable payload), so the
//! error itself is no oracle. The detailed cause is only logged at debug.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::challenge::ChallengeProvider;
use crate::crypto;
use crate::error::ObsGuardError;
use crate::keys::{self, Salt};

/// Ciphertext plus the salt its key was derived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedDocument {
    pub ciphertext: Vec<u8>,
    pub salt: Salt,
}

/// Seal a serializable document under `password`.
///
/// A new salt is drawn on every call, so sealing the same document twice
/// (or re-sealing after a password change) never reuses a salt.
pub fn seal<T: Serialize + ?Sized>(
    document: &T,
    password: &str,
) -> Result<SealedDocument, ObsGuardError> {
    let plaintext = serde_json::to_vec_pretty(document)
        .map_err(|e| ObsGuardError::Configuration(format!("document is not serializable: {e}")))?;
    let (key, salt) = keys::derive(password, None)?;
    let ciphertext = crypto::encrypt(key.as_bytes(), &plaintext)?;
    Ok(SealedDocument { ciphertext, salt })
}

/// Open a sealed document with `password` and parse it.
pub fn unseal<T: DeserializeOwned>(
    sealed: &SealedDocument,
    password: &str,
) -> Result<T, ObsGuardError> {
    let key = keys::derive_with_salt(password, &sealed.salt);
    let plaintext = crypto::decrypt(key.as_bytes(), &sealed.ciphertext).map_err(|e| {
        debug!(error = %e, "sealed document failed authentication");
        ObsGuardError::Authentication
    })?;
    serde_json::from_slice(&plaintext).map_err(|e| {
        debug!(error = %e, "sealed document decrypted but did not parse");
        ObsGuardError::Authentication
    })
}

// ---------------------------------------------------------------------------
// File pair
// ---------------------------------------------------------------------------

/// The `<name>.enc` / `<name>.salt` pair backing one sealed document.
#[derive(Debug, Clone)]
pub struct EncryptedFile {
    base: PathBuf,
}

impl EncryptedFile {
    /// Create a handle for the pair derived from `base` (the plaintext
    /// file name, e.g. `obs_config.json`).
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The legacy plaintext path the pair is named after.
    pub fn plaintext_path(&self) -> &Path {
        &self.base
    }

    pub fn ciphertext_path(&self) -> PathBuf {
        with_suffix(&self.base, ".enc")
    }

    pub fn salt_path(&self) -> PathBuf {
        with_suffix(&self.base, ".salt")
    }

    /// True only when both companions are present.
    pub fn exists(&self) -> bool {
        self.ciphertext_path().is_file() && self.salt_path().is_file()
    }

    /// Write both companions with owner-only permissions.
    ///
    /// Each file is written to a temporary sibling, restricted, then renamed
    /// into place. The salt is renamed last: until it lands, a reader sees
    /// either the previous complete pair or a pair that fails to open,
    /// never a silently mismatched one that parses.
    pub fn write(&self, sealed: &SealedDocument) -> Result<(), ObsGuardError> {
        let enc_path = self.ciphertext_path();
        let salt_path = self.salt_path();
        let enc_tmp = with_suffix(&enc_path, ".tmp");
        let salt_tmp = with_suffix(&salt_path, ".tmp");

        write_restricted(&enc_tmp, &sealed.ciphertext)?;
        write_restricted(&salt_tmp, sealed.salt.as_bytes())?;
        fs::rename(&enc_tmp, &enc_path)?;
        fs::rename(&salt_tmp, &salt_path)?;

        info!(path = %enc_path.display(), "sealed document written");
        Ok(())
    }

    /// Read both companions back.
    pub fn read(&self) -> Result<SealedDocument, ObsGuardError> {
        if !self.exists() {
            return Err(ObsGuardError::Configuration(format!(
                "encrypted document {} is missing its ciphertext or salt",
                self.base.display()
            )));
        }
        let ciphertext = fs::read(self.ciphertext_path())?;
        let salt_bytes = fs::read(self.salt_path())?;
        let salt = Salt::from_slice(&salt_bytes).ok_or_else(|| {
            ObsGuardError::Configuration(format!(
                "salt file {} has {} bytes, expected {}",
                self.salt_path().display(),
                salt_bytes.len(),
                crypto::SALT_LEN
            ))
        })?;
        Ok(SealedDocument { ciphertext, salt })
    }

    /// Seal `document` and write it in one step.
    pub fn save<T: Serialize + ?Sized>(
        &self,
        document: &T,
        password: &str,
    ) -> Result<(), ObsGuardError> {
        self.write(&seal(document, password)?)
    }

    /// Read and open the pair in one step.
    pub fn load<T: DeserializeOwned>(&self, password: &str) -> Result<T, ObsGuardError> {
        unseal(&self.read()?, password)
    }

    /// Delete both companions. Missing files are not an error.
    pub fn remove(&self) -> Result<(), ObsGuardError> {
        for path in [self.ciphertext_path(), self.salt_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_restricted(path: &Path, bytes: &[u8]) -> Result<(), ObsGuardError> {
    fs::write(path, bytes)?;
    restrict_permissions(path);
    Ok(())
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Best-effort chmod 0600. Returns whether the mode was applied; platforms
/// without POSIX permission bits always report `false`.
#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not restrict file permissions");
            false
        }
    }
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> bool {
    false
}

/// True when group or other permission bits are set on `path`.
#[cfg(unix)]
pub fn has_loose_permissions(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o077 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn has_loose_permissions(_path: &Path) -> bool {
    false
}

/// When `path` is readable by group or others, offer to restrict it.
/// Returns whether the mode was changed.
pub(crate) fn offer_permission_fix<C>(path: &Path, challenge: &mut C) -> io::Result<bool>
where
    C: ChallengeProvider + ?Sized,
{
    if !has_loose_permissions(path) {
        return Ok(false);
    }
    let prompt = format!(
        "{} is readable by group or others. Fix file permissions now?",
        path.display()
    );
    if !challenge.ask_confirmation(&prompt)? {
        return Ok(false);
    }
    let fixed = restrict_permissions(path);
    if fixed {
        info!(path = %path.display(), "file permissions restricted to 0600");
    }
    Ok(fixed)
}

/// Emit the standard warning for a plaintext file readable by others.
pub(crate) fn warn_if_loose(path: &Path) {
    if has_loose_permissions(path) {
        warn!(
            path = %path.display(),
            "plaintext file is readable by group or others; restrict it to 0600 or encrypt it"
        );
    }
}
