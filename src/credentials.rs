//! Storage credentials and their protected persistence.
//!
//! Credentials are loaded from the first source that exists:
//!
//! 1. the sealed pair `<name>.enc` / `<name>.salt` (asks for its password),
//! 2. the plaintext `<name>` JSON file (warns on loose permissions),
//! 3. nothing, i.e. built-in defaults.
//!
//! Environment variables are applied on top of whichever source ran.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::challenge::ChallengeProvider;
use crate::error::ObsGuardError;
use crate::store::{self, EncryptedFile};

pub const DEFAULT_SERVER: &str = "https://obs.sa-peru-1.myhuaweicloud.com/";
pub const DEFAULT_REGION: &str = "sa-peru-1";
pub const DEFAULT_MAX_KEYS: u32 = 1000;
pub const DEFAULT_RESTORE_DAYS: u32 = 30;
pub const DEFAULT_RESTORE_TIER: &str = "Expedited";

/// Environment variable names read by [`CredentialConfig::load`].
pub mod env_var {
    pub const ACCESS_KEY_ID: &str = "OBS_ACCESS_KEY_ID";
    pub const SECRET_ACCESS_KEY: &str = "OBS_SECRET_ACCESS_KEY";
    pub const SERVER: &str = "OBS_SERVER";
    pub const REGION: &str = "OBS_REGION";
    pub const MAX_KEYS: &str = "OBS_MAX_KEYS";
    pub const RESTORE_DAYS: &str = "OBS_RESTORE_DAYS";
    pub const RESTORE_TIER: &str = "OBS_RESTORE_TIER";
}

/// Access keys plus client tuning knobs.
///
/// The secret is redacted from `Debug` and wiped on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_max_keys")]
    pub max_keys: u32,
    #[serde(default = "default_restore_days")]
    pub restore_days: u32,
    #[serde(default = "default_restore_tier")]
    pub restore_tier: String,
}

// Field-level defaults: `Credentials` implements `Drop`, so serde cannot
// move fields out of a container-level default.
fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_max_keys() -> u32 {
    DEFAULT_MAX_KEYS
}

fn default_restore_days() -> u32 {
    DEFAULT_RESTORE_DAYS
}

fn default_restore_tier() -> String {
    DEFAULT_RESTORE_TIER.to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            server: default_server(),
            region: default_region(),
            max_keys: default_max_keys(),
            restore_days: default_restore_days(),
            restore_tier: default_restore_tier(),
        }
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.secret_access_key.zeroize();
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("server", &self.server)
            .field("region", &self.region)
            .field("max_keys", &self.max_keys)
            .field("restore_days", &self.restore_days)
            .field("restore_tier", &self.restore_tier)
            .finish()
    }
}

impl Credentials {
    /// Placeholder values written by [`CredentialConfig::write_sample`].
    pub fn sample() -> Self {
        let mut sample = Self::default();
        sample.access_key_id = "YOUR_ACCESS_KEY_HERE".to_string();
        sample.secret_access_key = "YOUR_SECRET_KEY_HERE".to_string();
        sample
    }

    /// Access key, secret and server must all be non-empty.
    pub fn validate(&self) -> Result<(), ObsGuardError> {
        let required = [
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("server", &self.server),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(ObsGuardError::Configuration(format!(
                "missing required credential field '{field}'"
            ))),
            None => Ok(()),
        }
    }

    /// Overlay values from the environment. `env` maps a variable name to
    /// its value, e.g. `|name| std::env::var(name).ok()`.
    pub fn apply_env<F>(&mut self, env: F) -> Result<(), ObsGuardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env(env_var::ACCESS_KEY_ID) {
            self.access_key_id = v;
        }
        if let Some(v) = env(env_var::SECRET_ACCESS_KEY) {
            self.secret_access_key.zeroize();
            self.secret_access_key = v;
        }
        if let Some(v) = env(env_var::SERVER) {
            self.server = v;
        }
        if let Some(v) = env(env_var::REGION) {
            self.region = v;
        }
        if let Some(v) = env(env_var::MAX_KEYS) {
            self.max_keys = parse_number(env_var::MAX_KEYS, &v)?;
        }
        if let Some(v) = env(env_var::RESTORE_DAYS) {
            self.restore_days = parse_number(env_var::RESTORE_DAYS, &v)?;
        }
        if let Some(v) = env(env_var::RESTORE_TIER) {
            self.restore_tier = v;
        }
        Ok(())
    }
}

fn parse_number(name: &str, value: &str) -> Result<u32, ObsGuardError> {
    value.trim().parse().map_err(|_| {
        ObsGuardError::Configuration(format!("{name} must be a non-negative integer, got '{value}'"))
    })
}

/// Where the loaded credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Encrypted,
    Plaintext,
    Environment,
}

/// Credential storage rooted at one plaintext path.
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    file: EncryptedFile,
}

impl CredentialConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: EncryptedFile::new(path),
        }
    }

    pub fn plaintext_path(&self) -> &Path {
        self.file.plaintext_path()
    }

    pub fn encrypted_file(&self) -> &EncryptedFile {
        &self.file
    }

    pub fn is_encrypted(&self) -> bool {
        self.file.exists()
    }

    /// Load from the first available source, then apply `env` overrides.
    ///
    /// The result is not validated; call [`Credentials::validate`] before
    /// handing it to a storage client.
    pub fn load<C, F>(
        &self,
        challenge: &mut C,
        env: F,
    ) -> Result<(Credentials, CredentialSource), ObsGuardError>
    where
        C: ChallengeProvider + ?Sized,
        F: Fn(&str) -> Option<String>,
    {
        let (mut credentials, source) = if self.is_encrypted() {
            info!("loading encrypted configuration");
            let password =
                Zeroizing::new(challenge.ask_secret("Enter password to decrypt configuration: ")?);
            (self.decrypt(&password)?, CredentialSource::Encrypted)
        } else if self.plaintext_path().is_file() {
            store::offer_permission_fix(self.plaintext_path(), challenge)?;
            (self.read_plaintext()?, CredentialSource::Plaintext)
        } else {
            info!("no configuration file found, reading credentials from the environment");
            (Credentials::default(), CredentialSource::Environment)
        };

        credentials.apply_env(env)?;
        Ok((credentials, source))
    }

    fn read_plaintext(&self) -> Result<Credentials, ObsGuardError> {
        let path = self.plaintext_path();
        store::warn_if_loose(path);
        let contents = fs::read_to_string(path)?;
        let credentials = serde_json::from_str(&contents).map_err(|e| {
            ObsGuardError::Configuration(format!("malformed configuration {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "configuration loaded");
        Ok(credentials)
    }

    /// Open the sealed pair.
    pub fn decrypt(&self, password: &str) -> Result<Credentials, ObsGuardError> {
        let credentials = self.file.load(password)?;
        info!("configuration decrypted");
        Ok(credentials)
    }

    /// Seal `credentials` into the pair, replacing any previous one.
    pub fn create_encrypted(
        &self,
        credentials: &Credentials,
        password: &str,
    ) -> Result<(), ObsGuardError> {
        if password.is_empty() {
            return Err(ObsGuardError::Configuration(
                "encryption password must not be empty".into(),
            ));
        }
        self.file.save(credentials, password)?;
        info!(path = %self.file.ciphertext_path().display(), "encrypted configuration created");
        Ok(())
    }

    /// Seal the existing plaintext file. The plaintext is left in place;
    /// see [`Self::remove_plaintext`].
    pub fn encrypt_plaintext(&self, password: &str) -> Result<(), ObsGuardError> {
        if !self.plaintext_path().is_file() {
            return Err(ObsGuardError::Configuration(format!(
                "configuration file {} not found",
                self.plaintext_path().display()
            )));
        }
        let credentials = self.read_plaintext()?;
        self.create_encrypted(&credentials, password)
    }

    /// Re-seal under a new password. A fresh salt is drawn.
    pub fn change_password(&self, old: &str, new: &str) -> Result<(), ObsGuardError> {
        let credentials = self.decrypt(old)?;
        self.create_encrypted(&credentials, new)
    }

    pub fn remove_plaintext(&self) -> Result<(), ObsGuardError> {
        let path = self.plaintext_path();
        if path.is_file() {
            fs::remove_file(path)?;
            info!(path = %path.display(), "original unencrypted file removed");
        }
        Ok(())
    }

    /// chmod 0600 the plaintext file. Returns whether anything was changed.
    pub fn secure_file_permissions(&self) -> bool {
        let path = self.plaintext_path();
        if !path.is_file() {
            warn!(path = %path.display(), "configuration file not found");
            return false;
        }
        let applied = store::restrict_permissions(path);
        if applied {
            info!(path = %path.display(), "set secure permissions");
        }
        applied
    }

    /// Write `<name>.sample` with placeholder credentials.
    pub fn write_sample(&self) -> Result<PathBuf, ObsGuardError> {
        let mut name = self.plaintext_path().as_os_str().to_owned();
        name.push(".sample");
        let path = PathBuf::from(name);
        let json = serde_json::to_string_pretty(&Credentials::sample())
            .map_err(|e| ObsGuardError::Configuration(e.to_string()))?;
        fs::write(&path, json)?;
        store::restrict_permissions(&path);
        info!(path = %path.display(), "sample configuration created");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_environment_defaults() {
        let mut creds = Credentials::default();
        creds.apply_env(env_from(&[])).unwrap();
        assert_eq!(creds.server, DEFAULT_SERVER);
        assert_eq!(creds.region, "sa-peru-1");
        assert_eq!(creds.max_keys, 1000);
        assert_eq!(creds.restore_days, 30);
        assert_eq!(creds.restore_tier, "Expedited");
        assert!(creds.validate().is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let mut creds = Credentials::default();
        creds
            .apply_env(env_from(&[
                (env_var::ACCESS_KEY_ID, "AK"),
                (env_var::SECRET_ACCESS_KEY, "SK"),
                (env_var::MAX_KEYS, " 250 "),
                (env_var::RESTORE_TIER, "Standard"),
            ]))
            .unwrap();
        assert_eq!(creds.access_key_id, "AK");
        assert_eq!(creds.max_keys, 250);
        assert_eq!(creds.restore_tier, "Standard");
        creds.validate().unwrap();
    }

    #[test]
    fn test_bad_number_is_configuration_error() {
        let mut creds = Credentials::default();
        let result = creds.apply_env(env_from(&[(env_var::RESTORE_DAYS, "thirty")]));
        assert!(matches!(result, Err(ObsGuardError::Configuration(_))));
    }

    #[test]
    fn test_validate_names_missing_field() {
        let mut creds = Credentials::sample();
        creds.server.clear();
        let err = creds.validate().unwrap_err().to_string();
        assert!(err.contains("server"), "{err}");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::sample();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("YOUR_SECRET_KEY_HERE"));
        assert!(rendered.contains("<redacted>"));
    }
}
