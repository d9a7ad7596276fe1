//! Tests for the pluggable AuditSink / forward sink functionality.

use std::sync::{Arc, Mutex};

use obsguard::audit::{AuditOutcome, AuditRecord, AuditSink};
use obsguard::hasher::hash_password;
use obsguard::{PolicyDocument, ScriptedChallenge, SecurityPolicy, SecurityTier};

/// A test sink that collects records into a shared Vec.
struct SharedVecSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl SharedVecSink {
    fn new(records: Arc<Mutex<Vec<AuditRecord>>>) -> Self {
        Self { records }
    }
}

impl AuditSink for SharedVecSink {
    fn append(&mut self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

#[test]
fn test_forward_sink_receives_records() {
    let mut document = PolicyDocument::default();
    document.tier_mut(SecurityTier::Destructive).password_hash = Some(hash_password("rm"));
    let challenge = ScriptedChallenge::new()
        .with_secrets(["rm"])
        .with_confirmations([false]);
    let mut policy = SecurityPolicy::in_memory(document, challenge).unwrap();

    let records = Arc::new(Mutex::new(Vec::new()));
    policy.add_audit_sink(Box::new(SharedVecSink::new(Arc::clone(&records))));

    policy.authorize("search", None).unwrap();
    policy.authorize("purge", None).unwrap();

    // Primary log has the records
    assert_eq!(policy.audit_log().len(), 2);

    // Forward sink also received them
    let collected = records.lock().unwrap();
    assert_eq!(collected.len(), 2);
    assert_eq!(collected[0].operation, "search");
    assert_eq!(collected[0].outcome, AuditOutcome::Granted);
    assert_eq!(collected[1].tier, SecurityTier::Destructive);
    assert_eq!(collected[1].outcome, AuditOutcome::ConfirmationDeclined);
    assert!(collected[1].challenged);
}
