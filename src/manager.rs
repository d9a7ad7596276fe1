//! Gated bulk operations.
//!
//! Every public operation on [`SecureManager`] asks the [`AccessGate`]
//! first and only then touches the storage client. Batches run object by
//! object: a failure is counted in the [`BatchReport`] and the batch moves on.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::challenge::ChallengeProvider;
use crate::credentials::Credentials;
use crate::error::ObsGuardError;
use crate::gate::{AccessDecision, DenialReason, SecurityPolicy};
use crate::storage::{ObjectSummary, StorageClass, StorageClient};

/// Token the operator must type before a delete runs.
pub const DELETE_TOKEN: &str = "DELETE";

// ---------------------------------------------------------------------------
// Gate switch
// ---------------------------------------------------------------------------

/// Whether the multi-level gate is in force. Chosen once at startup.
///
/// A disabled gate still carries a challenge provider: tier checks are
/// skipped, but destructive operations keep their typed confirmation.
#[derive(Debug)]
pub enum AccessGate<C> {
    /// Every tier check passes without prompts.
    Disabled(C),
    Enabled(SecurityPolicy<C>),
}

impl<C: ChallengeProvider> AccessGate<C> {
    pub fn check(
        &mut self,
        operation: &str,
        details: Option<&str>,
    ) -> Result<AccessDecision, ObsGuardError> {
        match self {
            Self::Disabled(_) => {
                debug!(operation, "security gate disabled");
                Ok(AccessDecision::Granted)
            }
            Self::Enabled(policy) => policy.authorize(operation, details),
        }
    }
}

impl<C> AccessGate<C> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    pub fn policy(&self) -> Option<&SecurityPolicy<C>> {
        match self {
            Self::Disabled(_) => None,
            Self::Enabled(policy) => Some(policy),
        }
    }

    pub fn challenge(&self) -> &C {
        match self {
            Self::Disabled(challenge) => challenge,
            Self::Enabled(policy) => policy.challenge(),
        }
    }

    pub fn challenge_mut(&mut self) -> &mut C {
        match self {
            Self::Disabled(challenge) => challenge,
            Self::Enabled(policy) => policy.challenge_mut(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A single object that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of a batch operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<ObjectFailure>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A search hit, qualified by bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub bucket: String,
    pub object: ObjectSummary,
}

enum Step {
    Done,
    Skipped,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Storage operations behind the security gate.
pub struct SecureManager<S, C> {
    client: S,
    gate: AccessGate<C>,
    max_keys: u32,
    restore_days: u32,
    restore_tier: String,
}

impl<S: StorageClient, C: ChallengeProvider> SecureManager<S, C> {
    /// Build a manager. Credentials are validated here, before any storage
    /// call can be made.
    pub fn new(
        client: S,
        gate: AccessGate<C>,
        credentials: &Credentials,
    ) -> Result<Self, ObsGuardError> {
        credentials.validate()?;
        if credentials.max_keys == 0 {
            return Err(ObsGuardError::Configuration(
                "max_keys must be greater than zero".into(),
            ));
        }
        info!(
            server = %credentials.server,
            region = %credentials.region,
            gate = gate.is_enabled(),
            "storage manager initialized"
        );
        Ok(Self {
            client,
            gate,
            max_keys: credentials.max_keys,
            restore_days: credentials.restore_days,
            restore_tier: credentials.restore_tier.clone(),
        })
    }

    pub fn gate(&self) -> &AccessGate<C> {
        &self.gate
    }

    pub fn client(&self) -> &S {
        &self.client
    }

    /// List every object under `prefix`.
    pub fn list_objects(
        &mut self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, ObsGuardError> {
        let bucket = validate_bucket(bucket)?;
        self.require("list", &format!("List objects in bucket '{bucket}'"))?;
        let objects = self.collect_objects(&bucket, prefix)?;
        info!(bucket = %bucket, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    /// Case-insensitive substring search over object keys, in one bucket or
    /// in every bucket.
    pub fn search_objects(
        &mut self,
        text: &str,
        bucket: Option<&str>,
        prefix: &str,
    ) -> Result<Vec<SearchHit>, ObsGuardError> {
        if text.trim().is_empty() {
            return Err(ObsGuardError::Configuration(
                "search text must not be empty".into(),
            ));
        }
        let scope = match bucket {
            Some(b) => format!("in bucket '{}'", b.trim()),
            None => "in all buckets".to_string(),
        };
        self.require("search", &format!("Search for objects containing '{text}' {scope}"))?;

        let buckets = match bucket {
            Some(b) => vec![validate_bucket(b)?],
            None => self.client.list_buckets()?,
        };

        let needle = text.to_lowercase();
        let mut hits = Vec::new();
        for bucket in buckets {
            match self.collect_objects(&bucket, prefix) {
                Ok(objects) => hits.extend(
                    objects
                        .into_iter()
                        .filter(|o| o.key.to_lowercase().contains(&needle))
                        .map(|object| SearchHit {
                            bucket: bucket.clone(),
                            object,
                        }),
                ),
                Err(e) => error!(bucket = %bucket, error = %e, "search skipped bucket"),
            }
        }
        info!(count = hits.len(), "search finished");
        Ok(hits)
    }

    /// Move objects under `prefix` into `class`. Objects already in the
    /// target class are skipped.
    pub fn change_storage_class(
        &mut self,
        bucket: &str,
        prefix: &str,
        class: StorageClass,
    ) -> Result<BatchReport, ObsGuardError> {
        let bucket = validate_bucket(bucket)?;
        let operation = class.transition_operation();
        self.require(
            operation,
            &describe(
                &format!("Change storage class to {class} for objects in bucket '{bucket}'"),
                prefix,
            ),
        )?;

        let objects = self.collect_objects(&bucket, prefix)?;
        let report = self.run_batch(operation, &objects, |client, object| {
            if object.storage_class == class {
                return Ok(Step::Skipped);
            }
            client.set_storage_class(&bucket, &object.key, class)?;
            Ok(Step::Done)
        });
        Ok(report)
    }

    /// Start restoring archived (`COLD`) objects. Other objects are skipped.
    /// `days` and `tier` default to the configured values.
    pub fn restore_objects(
        &mut self,
        bucket: &str,
        prefix: &str,
        days: Option<u32>,
        tier: Option<&str>,
    ) -> Result<BatchReport, ObsGuardError> {
        let bucket = validate_bucket(bucket)?;
        let days = days.unwrap_or(self.restore_days);
        let tier = tier.unwrap_or(self.restore_tier.as_str()).to_string();
        self.require(
            "restore",
            &format!(
                "{} for {days} days using {tier} tier",
                describe(&format!("Restore objects in bucket '{bucket}'"), prefix)
            ),
        )?;

        let objects = self.collect_objects(&bucket, prefix)?;
        let report = self.run_batch("restore", &objects, |client, object| {
            if object.storage_class != StorageClass::Cold {
                return Ok(Step::Skipped);
            }
            client.restore_object(&bucket, &object.key, days, &tier)?;
            Ok(Step::Done)
        });
        Ok(report)
    }

    /// Download objects under `prefix`, mirroring their key layout below
    /// `dest` (default `./downloads_<bucket>`).
    pub fn download_objects(
        &mut self,
        bucket: &str,
        prefix: &str,
        dest: Option<&Path>,
    ) -> Result<BatchReport, ObsGuardError> {
        let bucket = validate_bucket(bucket)?;
        let root = dest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("./downloads_{bucket}")));
        self.require(
            "download",
            &format!(
                "{} to '{}'",
                describe(&format!("Download objects from bucket '{bucket}'"), prefix),
                root.display()
            ),
        )?;

        fs::create_dir_all(&root)?;
        let objects = self.collect_objects(&bucket, prefix)?;
        let report = self.run_batch("download", &objects, |client, object| {
            let local = local_path(&root, &object.key)?;
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent)?;
            }
            client.download_object(&bucket, &object.key, &local)?;
            Ok(Step::Done)
        });
        Ok(report)
    }

    /// Delete every object under `prefix`.
    ///
    /// After the gate grants access the operator must type
    /// [`DELETE_TOKEN`], unless the caller passes `confirmed`. This holds
    /// whether the gate is enabled or not.
    pub fn delete_objects(
        &mut self,
        bucket: &str,
        prefix: &str,
        confirmed: bool,
    ) -> Result<BatchReport, ObsGuardError> {
        let bucket = validate_bucket(bucket)?;
        let description = describe(&format!("DELETE objects from bucket '{bucket}'"), prefix);
        self.require(
            "delete",
            &format!("{description} - THIS ACTION CANNOT BE UNDONE"),
        )?;
        if !confirmed {
            self.confirm_deletion(&description)?;
        }

        let objects = self.collect_objects(&bucket, prefix)?;
        warn!(bucket = %bucket, prefix, count = objects.len(), "deleting objects");
        let report = self.run_batch("delete", &objects, |client, object| {
            client.delete_object(&bucket, &object.key)?;
            Ok(Step::Done)
        });
        Ok(report)
    }

    fn confirm_deletion(&mut self, description: &str) -> Result<(), ObsGuardError> {
        let prompt = format!("{description}. Type '{DELETE_TOKEN}' to confirm: ");
        let answer = self.gate.challenge_mut().ask_text(&prompt)?;
        if answer.trim() == DELETE_TOKEN {
            return Ok(());
        }
        warn!("deletion cancelled, confirmation token not entered");
        Err(ObsGuardError::AuthorizationDenied {
            operation: "delete".to_string(),
            reason: DenialReason::ConfirmationDeclined.to_string(),
        })
    }

    fn require(&mut self, operation: &str, details: &str) -> Result<(), ObsGuardError> {
        match self.gate.check(operation, Some(details))? {
            AccessDecision::Granted => Ok(()),
            AccessDecision::Denied(reason) => Err(ObsGuardError::AuthorizationDenied {
                operation: operation.to_string(),
                reason: reason.to_string(),
            }),
        }
    }

    fn collect_objects(
        &mut self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, ObsGuardError> {
        let mut objects = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects(bucket, prefix, marker.as_deref(), self.max_keys)?;
            objects.extend(page.objects);
            match page.next_marker {
                Some(next) if marker.as_deref() == Some(next.as_str()) => {
                    warn!(bucket, marker = %next, "listing returned the same marker twice, stopping");
                    break;
                }
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(objects)
    }

    fn run_batch<F>(
        &mut self,
        operation: &str,
        objects: &[ObjectSummary],
        mut step: F,
    ) -> BatchReport
    where
        F: FnMut(&mut S, &ObjectSummary) -> Result<Step, ObsGuardError>,
    {
        let mut report = BatchReport::default();
        for object in objects {
            match step(&mut self.client, object) {
                Ok(Step::Done) => {
                    debug!(operation, key = %object.key, "processed");
                    report.processed += 1;
                }
                Ok(Step::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(operation, key = %object.key, error = %e, "object failed");
                    report.failures.push(ObjectFailure {
                        key: object.key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            operation,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed(),
            "batch finished"
        );
        report
    }
}

fn validate_bucket(bucket: &str) -> Result<String, ObsGuardError> {
    let bucket = bucket.trim();
    if bucket.is_empty() {
        return Err(ObsGuardError::Configuration(
            "bucket name must be a non-empty string".into(),
        ));
    }
    Ok(bucket.to_string())
}

fn describe(base: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{base} with prefix '{prefix}'")
    }
}

/// Map an object key below `root`, refusing keys that would escape it.
fn local_path(root: &Path, key: &str) -> Result<PathBuf, ObsGuardError> {
    let relative = Path::new(key.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || relative.as_os_str().is_empty() {
        return Err(ObsGuardError::StorageOperation {
            key: key.to_string(),
            reason: "object key is not a safe local path".into(),
        });
    }
    Ok(root.join(relative))
}
