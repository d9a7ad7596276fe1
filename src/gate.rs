//! The multi-level security engine.
//!
//! A [`SecurityPolicy`] owns the policy document for the lifetime of the
//! process and answers one question: may this operation proceed?
//!
//! ```text
//! operation -> tier -> [session valid?] -> [password, 3 attempts] -> [confirmation] -> decision
//! ```
//!
//! Lifecycle:
//! - `load` finds an encrypted pair (asks for the master password), a legacy
//!   plaintext document, or nothing (stock document, every tier open).
//! - `configure` walks every tier, then seals and persists the result.
//!   `apply_profile` does the same for a preset set of tiers.
//! - `authorize` may be called any number of times; a denial is a value,
//!   not an error.

use std::fmt;
use std::fs;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::audit::{AuditLog, AuditOutcome, AuditRecord, AuditSink};
use crate::challenge::ChallengeProvider;
use crate::error::ObsGuardError;
use crate::hasher;
use crate::policy::{PolicyDocument, PolicySettings, SecurityProfile, SecurityTier, TierPolicy};
use crate::store::{self, EncryptedFile};

/// Password attempts offered per `authorize` call.
pub const MAX_PASSWORD_ATTEMPTS: usize = 3;

/// Where the in-memory document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    /// No persisted document was found; the stock document is in use.
    Default,
    /// Read from a legacy unencrypted JSON file.
    Plaintext,
    /// Unsealed from the encrypted pair with the master password.
    Encrypted,
    /// Supplied directly by the caller.
    InMemory,
}

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    InvalidPassword,
    ConfirmationDeclined,
    SessionExpired,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPassword => write!(f, "maximum password attempts exceeded"),
            Self::ConfirmationDeclined => write!(f, "operation not confirmed"),
            Self::SessionExpired => write!(f, "security session expired, reload the policy"),
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Read-only view of one tier, as shown by `list_levels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSummary {
    pub tier: SecurityTier,
    pub protected: bool,
    pub operations: Vec<String>,
    pub description: String,
}

/// The authorization engine.
pub struct SecurityPolicy<C> {
    document: PolicyDocument,
    file: Option<EncryptedFile>,
    source: PolicySource,
    challenge: C,
    audit: AuditLog,
    session_started: Instant,
}

impl<C> fmt::Debug for SecurityPolicy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityPolicy")
            .field("source", &self.source)
            .field("file", &self.file)
            .field("levels", &self.list_levels())
            .field("settings", &self.document.settings)
            .finish()
    }
}

impl<C: ChallengeProvider> SecurityPolicy<C> {
    /// Load the policy backed by `file`.
    ///
    /// An encrypted pair takes precedence and requires the master password.
    /// A wrong password is fatal.
    pub fn load(file: EncryptedFile, mut challenge: C) -> Result<Self, ObsGuardError> {
        let (document, source) = if file.exists() {
            let password = Zeroizing::new(
                challenge.ask_secret("Enter master password for security levels: ")?,
            );
            let document: PolicyDocument = file.load(&password)?;
            document.validate()?;
            info!(path = %file.ciphertext_path().display(), "encrypted security policy loaded");
            (document, PolicySource::Encrypted)
        } else if file.plaintext_path().is_file() {
            let path = file.plaintext_path();
            store::warn_if_loose(path);
            let document = PolicyDocument::from_json(&fs::read_to_string(path)?)?;
            warn!(path = %path.display(), "security policy loaded from an unencrypted file");
            (document, PolicySource::Plaintext)
        } else {
            info!("no security policy found, every tier is unrestricted");
            (PolicyDocument::default(), PolicySource::Default)
        };

        Ok(Self {
            document,
            file: Some(file),
            source,
            challenge,
            audit: AuditLog::new(),
            session_started: Instant::now(),
        })
    }

    /// Wrap a document that is not backed by any file.
    pub fn in_memory(document: PolicyDocument, challenge: C) -> Result<Self, ObsGuardError> {
        document.validate()?;
        Ok(Self {
            document,
            file: None,
            source: PolicySource::InMemory,
            challenge,
            audit: AuditLog::new(),
            session_started: Instant::now(),
        })
    }

    /// Back an in-memory policy with a file pair so `save` and `configure`
    /// can persist it.
    pub fn with_file(mut self, file: EncryptedFile) -> Self {
        self.file = Some(file);
        self
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Interactively set or clear every tier's password, then seal and
    /// persist the document under a new master password.
    ///
    /// An empty answer for a tier leaves it unrestricted. The live document
    /// only changes once the sealed pair is written.
    pub fn configure(&mut self) -> Result<(), ObsGuardError> {
        self.require_file()?;

        let master = Zeroizing::new(
            self.challenge
                .ask_secret("Create master password for security system: ")?,
        );
        let confirm = Zeroizing::new(self.challenge.ask_secret("Confirm master password: ")?);
        if master.is_empty() {
            return Err(ObsGuardError::Configuration(
                "master password must not be empty".into(),
            ));
        }
        if *master != *confirm {
            return Err(ObsGuardError::Configuration(
                "master passwords do not match".into(),
            ));
        }

        let mut document = self.document.clone();
        for tier in SecurityTier::ALL {
            let operations = document
                .tier(tier)
                .map(|p| p.operations.iter().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            let prompt = format!(
                "Set password for {tier} level [{operations}] (or ENTER to leave unrestricted): "
            );
            let password = Zeroizing::new(self.challenge.ask_secret(&prompt)?);
            let password = (!password.is_empty()).then_some(password.as_str());
            document.set_password(tier, password);
        }

        self.commit(document, &master)
    }

    /// Apply a preset profile: protect exactly the tiers it names, clear the
    /// rest, and seal under `master_password`.
    ///
    /// Each protected tier needs a non-empty password; an empty answer is
    /// asked again, up to [`MAX_PASSWORD_ATTEMPTS`] times.
    pub fn apply_profile(
        &mut self,
        profile: SecurityProfile,
        master_password: &str,
    ) -> Result<(), ObsGuardError> {
        self.require_file()?;
        if master_password.is_empty() {
            return Err(ObsGuardError::Configuration(
                "master password must not be empty".into(),
            ));
        }

        let mut document = self.document.clone();
        for tier in SecurityTier::ALL {
            document.set_password(tier, None);
        }
        for &tier in profile.protected_tiers() {
            let password = self.ask_required_secret(&format!("Password for {tier} operations: "))?;
            document.set_password(tier, Some(password.as_str()));
        }

        self.commit(document, master_password)?;
        info!(%profile, "security profile applied");
        Ok(())
    }

    /// Set (`Some`) or clear (`None`) the password for one tier.
    pub fn set_tier_password(&mut self, tier: SecurityTier, password: Option<&str>) {
        self.document.set_password(tier, password);
        match password {
            Some(_) => info!(%tier, "tier password set"),
            None => info!(%tier, "tier left unrestricted"),
        }
    }

    /// Seal the current document under `master_password` and write it.
    pub fn save(&self, master_password: &str) -> Result<(), ObsGuardError> {
        self.require_file()?.save(&self.document, master_password)
    }

    fn require_file(&self) -> Result<&EncryptedFile, ObsGuardError> {
        self.file.as_ref().ok_or_else(|| {
            ObsGuardError::Configuration("no policy file configured".into())
        })
    }

    fn ask_required_secret(&mut self, prompt: &str) -> Result<Zeroizing<String>, ObsGuardError> {
        for _ in 0..MAX_PASSWORD_ATTEMPTS {
            let answer = Zeroizing::new(self.challenge.ask_secret(prompt)?);
            if !answer.is_empty() {
                return Ok(answer);
            }
            warn!("password must not be empty");
        }
        Err(ObsGuardError::Configuration(
            "tier password must not be empty".into(),
        ))
    }

    /// Persist `document`, then make it live and restart the session.
    fn commit(
        &mut self,
        document: PolicyDocument,
        master_password: &str,
    ) -> Result<(), ObsGuardError> {
        let file = self.require_file()?;
        file.save(&document, master_password)?;
        let plaintext = file.plaintext_path().to_path_buf();

        for tier in SecurityTier::ALL {
            let status = if document.is_protected(tier) { "protected" } else { "unrestricted" };
            info!(%tier, status, "tier configured");
        }
        self.document = document;
        self.source = PolicySource::Encrypted;
        self.session_started = Instant::now();

        if plaintext.is_file() {
            fs::remove_file(&plaintext)?;
            info!(path = %plaintext.display(), "unencrypted security policy removed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Authorization
    // -----------------------------------------------------------------------

    /// The tier governing `operation`.
    pub fn resolve_tier(&self, operation: &str) -> SecurityTier {
        self.document.resolve_tier(operation)
    }

    /// Decide whether `operation` may proceed, challenging the operator as
    /// the tier requires. `details` is shown in the confirmation prompt.
    ///
    /// Prompt I/O failures propagate as errors and never become a grant.
    pub fn authorize(
        &mut self,
        operation: &str,
        details: Option<&str>,
    ) -> Result<AccessDecision, ObsGuardError> {
        let tier = self.resolve_tier(operation);

        if self.session_expired() {
            return Ok(self.record(operation, tier, false, AuditOutcome::SessionExpired));
        }

        let Some(stored_hash) = self
            .document
            .tier(tier)
            .and_then(|p| p.password_hash.clone())
        else {
            debug!(operation, %tier, "no password required");
            return Ok(self.record(operation, tier, false, AuditOutcome::Granted));
        };

        if !self.challenge_password(tier, &stored_hash)? {
            return Ok(self.record(operation, tier, true, AuditOutcome::InvalidPassword));
        }

        if self.document.settings.require_confirmation && tier.requires_confirmation() {
            let mut prompt = format!("Operation '{operation}' requires {tier} access.");
            if let Some(details) = details {
                prompt.push_str(&format!(" {details}."));
            }
            prompt.push_str(" Do you want to proceed?");
            if !self.challenge.ask_confirmation(&prompt)? {
                return Ok(self.record(operation, tier, true, AuditOutcome::ConfirmationDeclined));
            }
        }

        Ok(self.record(operation, tier, true, AuditOutcome::Granted))
    }

    fn challenge_password(
        &mut self,
        tier: SecurityTier,
        stored_hash: &str,
    ) -> Result<bool, ObsGuardError> {
        let prompt = format!("Enter password for {tier} level: ");
        for attempt in 1..=MAX_PASSWORD_ATTEMPTS {
            let candidate = Zeroizing::new(self.challenge.ask_secret(&prompt)?);
            if hasher::verify_password(&candidate, stored_hash) {
                return Ok(true);
            }
            debug!(
                %tier,
                remaining = MAX_PASSWORD_ATTEMPTS - attempt,
                "invalid tier password"
            );
        }
        Ok(false)
    }

    fn record(
        &mut self,
        operation: &str,
        tier: SecurityTier,
        challenged: bool,
        outcome: AuditOutcome,
    ) -> AccessDecision {
        let decision = match outcome {
            AuditOutcome::Granted => {
                info!(operation, %tier, challenged, "access granted");
                AccessDecision::Granted
            }
            AuditOutcome::InvalidPassword => {
                warn!(operation, %tier, "access denied: invalid password");
                AccessDecision::Denied(DenialReason::InvalidPassword)
            }
            AuditOutcome::ConfirmationDeclined => {
                info!(operation, %tier, "operation cancelled by operator");
                AccessDecision::Denied(DenialReason::ConfirmationDeclined)
            }
            AuditOutcome::SessionExpired => {
                warn!(operation, %tier, "access denied: security session expired");
                AccessDecision::Denied(DenialReason::SessionExpired)
            }
        };

        if self.document.settings.log_all_operations {
            self.audit.append(AuditRecord {
                operation: operation.to_string(),
                tier,
                outcome,
                challenged,
                timestamp: Utc::now(),
            });
        }
        decision
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Time left before a loaded encrypted policy must be reloaded.
    /// `None` when expiry does not apply (no master password was proven, or
    /// the timeout is disabled).
    pub fn session_remaining(&self) -> Option<Duration> {
        if self.source != PolicySource::Encrypted || self.document.settings.session_timeout == 0 {
            return None;
        }
        let timeout = Duration::from_secs(self.document.settings.session_timeout);
        Some(timeout.saturating_sub(self.session_started.elapsed()))
    }

    fn session_expired(&self) -> bool {
        self.session_remaining().is_some_and(|left| left.is_zero())
    }
}

impl<C> SecurityPolicy<C> {
    /// Every tier in order with its protection status. No prompts.
    pub fn list_levels(&self) -> Vec<TierSummary> {
        let empty = TierPolicy::default();
        SecurityTier::ALL
            .iter()
            .map(|tier| {
                let policy = self.document.tier(*tier).unwrap_or(&empty);
                TierSummary {
                    tier: *tier,
                    protected: policy.is_protected(),
                    operations: policy.operations.iter().cloned().collect(),
                    description: policy.description.clone(),
                }
            })
            .collect()
    }

    pub fn settings(&self) -> &PolicySettings {
        &self.document.settings
    }

    pub fn settings_mut(&mut self) -> &mut PolicySettings {
        &mut self.document.settings
    }

    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn source(&self) -> PolicySource {
        self.source
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn add_audit_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.audit.add_forward_sink(sink);
    }

    pub fn challenge(&self) -> &C {
        &self.challenge
    }

    pub fn challenge_mut(&mut self) -> &mut C {
        &mut self.challenge
    }
}
