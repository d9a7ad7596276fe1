use obsguard::store::{self, EncryptedFile};
use obsguard::ObsGuardError;
use serde_json::json;

#[test]
fn test_roundtrip_for_varied_documents() {
    let documents = [
        json!({}),
        json!({"levels": {"admin": {"password_hash": null, "operations": ["purge"]}}}),
        json!(["nested", {"deep": [1, 2, 3]}, null, 4.5]),
        json!({"unicode": "contraseña ✓", "empty": ""}),
    ];
    for (i, doc) in documents.iter().enumerate() {
        let password = format!("pw-{i}");
        let sealed = store::seal(doc, &password).unwrap();
        let opened: serde_json::Value = store::unseal(&sealed, &password).unwrap();
        assert_eq!(&opened, doc);
    }
}

#[test]
fn test_wrong_password_rejected() {
    // Threat: offline guessing. A wrong password must never yield a document.
    let sealed = store::seal(&json!({"secret": true}), "correct horse").unwrap();
    for wrong in ["", "correct horse ", "Correct horse", "battery staple"] {
        let result: Result<serde_json::Value, _> = store::unseal(&sealed, wrong);
        assert!(
            matches!(result, Err(ObsGuardError::Authentication)),
            "unsealed with {wrong:?}"
        );
    }
}

#[test]
fn test_salt_and_ciphertext_fresh_per_seal() {
    let doc = json!({"same": "document"});
    let a = store::seal(&doc, "pw").unwrap();
    let b = store::seal(&doc, "pw").unwrap();
    assert_ne!(a.salt, b.salt);
    assert_ne!(a.ciphertext, b.ciphertext);
}

#[test]
fn test_file_pair_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let file = EncryptedFile::new(dir.path().join("obs_config.json"));
    assert!(!file.exists());

    file.save(&json!({"access_key_id": "AK"}), "pw").unwrap();
    assert!(file.exists());
    assert_eq!(std::fs::read(file.salt_path()).unwrap().len(), 16);
    assert!(!dir.path().join("obs_config.json.enc.tmp").exists());

    let opened: serde_json::Value = file.load("pw").unwrap();
    assert_eq!(opened["access_key_id"], "AK");

    file.remove().unwrap();
    assert!(!file.exists());
    file.remove().unwrap();
}

#[cfg(unix)]
#[test]
fn test_file_pair_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let file = EncryptedFile::new(dir.path().join("levels.json"));
    file.save(&json!({"k": "v"}), "pw").unwrap();

    for path in [file.ciphertext_path(), file.salt_path()] {
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        assert!(!store::has_loose_permissions(&path));
    }
}

#[test]
fn test_missing_companion_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = EncryptedFile::new(dir.path().join("levels.json"));
    file.save(&json!({}), "pw").unwrap();
    std::fs::remove_file(file.salt_path()).unwrap();

    assert!(!file.exists());
    assert!(matches!(file.read(), Err(ObsGuardError::Configuration(_))));
}

#[test]
fn test_truncated_salt_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = EncryptedFile::new(dir.path().join("levels.json"));
    file.save(&json!({}), "pw").unwrap();
    std::fs::write(file.salt_path(), [0u8; 8]).unwrap();

    assert!(matches!(file.read(), Err(ObsGuardError::Configuration(_))));
}
