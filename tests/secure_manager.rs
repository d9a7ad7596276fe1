use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{TimeZone, Utc};
use obsguard::hasher::hash_password;
use obsguard::storage::{ObjectPage, ObjectSummary, StorageClass, StorageClient};
use obsguard::{
    AccessGate, Credentials, ObsGuardError, PolicyDocument, ScriptedChallenge, SecureManager,
    SecurityPolicy, SecurityTier,
};

/// In-memory backend with failure injection and call counting.
#[derive(Default)]
struct MemoryStorage {
    buckets: BTreeMap<String, Vec<ObjectSummary>>,
    failing_keys: HashSet<String>,
    list_calls: usize,
    broken_bucket: Option<String>,
}

impl MemoryStorage {
    fn with_objects(bucket: &str, objects: &[(&str, StorageClass)]) -> Self {
        let mut storage = Self::default();
        storage.add_bucket(bucket, objects);
        storage
    }

    fn add_bucket(&mut self, bucket: &str, objects: &[(&str, StorageClass)]) {
        let summaries = objects
            .iter()
            .map(|(key, class)| ObjectSummary {
                key: key.to_string(),
                size: 42,
                storage_class: *class,
                last_modified: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            })
            .collect();
        self.buckets.insert(bucket.to_string(), summaries);
    }

    fn fail_on(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    fn object(&self, bucket: &str, key: &str) -> Option<&ObjectSummary> {
        self.buckets.get(bucket)?.iter().find(|o| o.key == key)
    }

    fn check(&self, key: &str) -> Result<(), ObsGuardError> {
        if self.failing_keys.contains(key) {
            return Err(ObsGuardError::StorageOperation {
                key: key.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

impl StorageClient for MemoryStorage {
    fn list_buckets(&mut self) -> Result<Vec<String>, ObsGuardError> {
        Ok(self.buckets.keys().cloned().collect())
    }

    fn list_objects(
        &mut self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: u32,
    ) -> Result<ObjectPage, ObsGuardError> {
        self.list_calls += 1;
        if self.broken_bucket.as_deref() == Some(bucket) {
            return Err(ObsGuardError::StorageOperation {
                key: bucket.to_string(),
                reason: "listing unavailable".into(),
            });
        }
        let objects = self.buckets.get(bucket).cloned().unwrap_or_default();
        let remaining: Vec<_> = objects
            .into_iter()
            .filter(|o| o.key.starts_with(prefix))
            .filter(|o| marker.map_or(true, |m| o.key.as_str() > m))
            .collect();
        let page: Vec<_> = remaining.iter().take(max_keys as usize).cloned().collect();
        let next_marker = (remaining.len() > page.len())
            .then(|| page.last().map(|o| o.key.clone()))
            .flatten();
        Ok(ObjectPage {
            objects: page,
            next_marker,
        })
    }

    fn set_storage_class(
        &mut self,
        bucket: &str,
        key: &str,
        class: StorageClass,
    ) -> Result<(), ObsGuardError> {
        self.check(key)?;
        if let Some(object) = self
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.iter_mut().find(|o| o.key == key))
        {
            object.storage_class = class;
        }
        Ok(())
    }

    fn restore_object(
        &mut self,
        _bucket: &str,
        key: &str,
        days: u32,
        tier: &str,
    ) -> Result<(), ObsGuardError> {
        self.check(key)?;
        assert!(days > 0);
        assert!(!tier.is_empty());
        Ok(())
    }

    fn download_object(
        &mut self,
        _bucket: &str,
        key: &str,
        dest: &Path,
    ) -> Result<(), ObsGuardError> {
        self.check(key)?;
        std::fs::write(dest, key)?;
        Ok(())
    }

    fn delete_object(&mut self, bucket: &str, key: &str) -> Result<(), ObsGuardError> {
        self.check(key)?;
        if let Some(objects) = self.buckets.get_mut(bucket) {
            objects.retain(|o| o.key != key);
        }
        Ok(())
    }
}

fn credentials(max_keys: u32) -> Credentials {
    let mut creds = Credentials::default();
    creds.access_key_id = "AK".into();
    creds.secret_access_key = "SK".into();
    creds.max_keys = max_keys;
    creds
}

fn open_manager(storage: MemoryStorage) -> SecureManager<MemoryStorage, ScriptedChallenge> {
    SecureManager::new(storage, AccessGate::Disabled(ScriptedChallenge::new()), &credentials(2))
        .unwrap()
}

#[test]
fn test_invalid_credentials_rejected_before_storage() {
    let mut creds = credentials(10);
    creds.secret_access_key.clear();
    let result = SecureManager::new(
        MemoryStorage::default(),
        AccessGate::Disabled(ScriptedChallenge::new()),
        &creds,
    );
    assert!(matches!(result, Err(ObsGuardError::Configuration(_))));
}

#[test]
fn test_listing_follows_markers() {
    let storage = MemoryStorage::with_objects(
        "media",
        &[
            ("a.mp4", StorageClass::Standard),
            ("b.mp4", StorageClass::Standard),
            ("c.mp4", StorageClass::Cold),
            ("d.mp4", StorageClass::Warm),
            ("e.mp4", StorageClass::Standard),
        ],
    );
    let mut manager = open_manager(storage);

    let objects = manager.list_objects("media", "").unwrap();
    let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["a.mp4", "b.mp4", "c.mp4", "d.mp4", "e.mp4"]);
    assert_eq!(manager.client().list_calls, 3);
}

#[test]
fn test_archive_skips_and_continues_past_failures() {
    let storage = MemoryStorage::with_objects(
        "logs",
        &[
            ("2024/01.log", StorageClass::Standard),
            ("2024/02.log", StorageClass::Cold),
            ("2024/03.log", StorageClass::Standard),
            ("2024/04.log", StorageClass::Warm),
        ],
    )
    .fail_on("2024/03.log");
    let mut manager = open_manager(storage);

    let report = manager
        .change_storage_class("logs", "2024/", StorageClass::Cold)
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].key, "2024/03.log");

    let client = manager.client();
    assert_eq!(client.object("logs", "2024/04.log").unwrap().storage_class, StorageClass::Cold);
    assert_eq!(
        client.object("logs", "2024/03.log").unwrap().storage_class,
        StorageClass::Standard
    );
}

#[test]
fn test_restore_only_cold_objects() {
    let storage = MemoryStorage::with_objects(
        "archive",
        &[
            ("x", StorageClass::Cold),
            ("y", StorageClass::Standard),
            ("z", StorageClass::Cold),
        ],
    );
    let mut manager = open_manager(storage);

    let report = manager.restore_objects("archive", "", None, None).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert!(report.is_clean());
}

#[test]
fn test_search_across_buckets_is_case_insensitive() {
    let mut storage = MemoryStorage::with_objects(
        "photos",
        &[("Holiday/IMG_1.jpg", StorageClass::Standard), ("work/doc.pdf", StorageClass::Standard)],
    );
    storage.add_bucket("backup", &[("old/holiday.zip", StorageClass::Cold)]);
    storage.add_bucket("broken", &[("holiday.txt", StorageClass::Standard)]);
    storage.broken_bucket = Some("broken".into());
    let mut manager = open_manager(storage);

    let hits = manager.search_objects("HOLIDAY", None, "").unwrap();
    let found: Vec<_> = hits
        .iter()
        .map(|h| format!("{}/{}", h.bucket, h.object.key))
        .collect();
    assert_eq!(found, ["backup/old/holiday.zip", "photos/Holiday/IMG_1.jpg"]);

    assert!(matches!(
        manager.search_objects("  ", None, ""),
        Err(ObsGuardError::Configuration(_))
    ));
}

#[test]
fn test_download_mirrors_layout_and_rejects_escapes() {
    let dir = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::with_objects(
        "data",
        &[
            ("../escape.txt", StorageClass::Standard),
            ("reports/q1.csv", StorageClass::Standard),
            ("top.txt", StorageClass::Standard),
        ],
    );
    let mut manager = open_manager(storage);

    let report = manager
        .download_objects("data", "", Some(dir.path()))
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failures[0].key, "../escape.txt");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("reports/q1.csv")).unwrap(),
        "reports/q1.csv"
    );
    assert!(dir.path().join("top.txt").exists());
}

#[test]
fn test_listing_failure_aborts_batch() {
    let mut storage = MemoryStorage::with_objects("b", &[("k", StorageClass::Standard)]);
    storage.broken_bucket = Some("b".into());
    let mut manager = open_manager(storage);

    assert!(matches!(
        manager.delete_objects("b", "", true),
        Err(ObsGuardError::StorageOperation { .. })
    ));
}

#[test]
fn test_empty_bucket_name_rejected() {
    let mut manager = open_manager(MemoryStorage::default());
    assert!(matches!(
        manager.list_objects(" ", ""),
        Err(ObsGuardError::Configuration(_))
    ));
}

// ---------------------------------------------------------------------------
// Gate enabled
// ---------------------------------------------------------------------------

fn gated_manager(challenge: ScriptedChallenge) -> SecureManager<MemoryStorage, ScriptedChallenge> {
    let mut document = PolicyDocument::default();
    document.tier_mut(SecurityTier::Destructive).password_hash = Some(hash_password("rm -rf"));
    let policy = SecurityPolicy::in_memory(document, challenge).unwrap();
    let storage = MemoryStorage::with_objects(
        "tmp",
        &[("a", StorageClass::Standard), ("b", StorageClass::Standard)],
    );
    SecureManager::new(storage, AccessGate::Enabled(policy), &credentials(100)).unwrap()
}

#[test]
fn test_denied_delete_touches_nothing() {
    let challenge = ScriptedChallenge::new().with_secrets(["no", "nope", "never"]);
    let mut manager = gated_manager(challenge);

    match manager.delete_objects("tmp", "", false) {
        Err(ObsGuardError::AuthorizationDenied { operation, .. }) => assert_eq!(operation, "delete"),
        other => panic!("expected denial, got {other:?}"),
    }
    assert_eq!(manager.client().list_calls, 0);
    assert_eq!(manager.client().buckets["tmp"].len(), 2);
}

#[test]
fn test_authorized_delete_runs() {
    let challenge = ScriptedChallenge::new()
        .with_secrets(["rm -rf"])
        .with_confirmations([true])
        .with_texts(["DELETE"]);
    let mut manager = gated_manager(challenge);

    let report = manager.delete_objects("tmp", "", false).unwrap();
    assert_eq!(report.processed, 2);
    assert!(manager.client().buckets["tmp"].is_empty());

    let policy = manager.gate().policy().unwrap();
    let prompts = policy.challenge().prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("CANNOT BE UNDONE"));
    assert!(prompts[2].contains("Type 'DELETE'"));
    assert_eq!(policy.audit_log().len(), 1);
}

fn stock_objects() -> MemoryStorage {
    MemoryStorage::with_objects(
        "tmp",
        &[("a", StorageClass::Standard), ("b", StorageClass::Standard)],
    )
}

#[test]
fn test_delete_on_unprotected_tier_still_needs_token() {
    let challenge = ScriptedChallenge::new().with_texts(["delete"]);
    let policy = SecurityPolicy::in_memory(PolicyDocument::default(), challenge).unwrap();
    let mut manager =
        SecureManager::new(stock_objects(), AccessGate::Enabled(policy), &credentials(100)).unwrap();

    match manager.delete_objects("tmp", "", false) {
        Err(ObsGuardError::AuthorizationDenied { operation, .. }) => assert_eq!(operation, "delete"),
        other => panic!("expected refusal, got {other:?}"),
    }
    assert_eq!(manager.client().list_calls, 0);
    assert_eq!(manager.client().buckets["tmp"].len(), 2);
    assert_eq!(manager.gate().challenge().prompt_count(), 1);
}

#[test]
fn test_delete_with_disabled_gate_needs_token() {
    let challenge = ScriptedChallenge::new().with_texts(["no thanks", " DELETE "]);
    let mut manager =
        SecureManager::new(stock_objects(), AccessGate::Disabled(challenge), &credentials(100))
            .unwrap();

    assert!(matches!(
        manager.delete_objects("tmp", "", false),
        Err(ObsGuardError::AuthorizationDenied { .. })
    ));
    assert_eq!(manager.client().buckets["tmp"].len(), 2);

    let report = manager.delete_objects("tmp", "", false).unwrap();
    assert_eq!(report.processed, 2);
    assert!(manager.client().buckets["tmp"].is_empty());
}

#[test]
fn test_preconfirmed_delete_skips_token() {
    let mut manager = SecureManager::new(
        stock_objects(),
        AccessGate::Disabled(ScriptedChallenge::new()),
        &credentials(100),
    )
    .unwrap();

    let report = manager.delete_objects("tmp", "a", true).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(manager.gate().challenge().prompt_count(), 0);
}

#[test]
fn test_unprotected_operations_pass_through_enabled_gate() {
    let mut manager = gated_manager(ScriptedChallenge::new());
    assert_eq!(manager.list_objects("tmp", "").unwrap().len(), 2);
    assert!(manager.gate().is_enabled());
}
