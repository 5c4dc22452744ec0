//! Integration tests for the untyped `GenericVault` adapter and for
//! running the vault over a non-file backend.

use configvault::{GenericVault, MasterSecret, MemoryStorage, Vault, VaultError, VaultSettings};
use serde_json::json;

fn settings() -> VaultSettings {
    VaultSettings {
        lock_timeout_ms: 100,
        argon2_memory_kib: 8_192,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..VaultSettings::default()
    }
}

fn open(storage: &MemoryStorage) -> Vault<MemoryStorage> {
    Vault::open(
        storage.clone(),
        MasterSecret::from_bytes(b"memory-secret"),
        &settings(),
    )
    .expect("open vault")
}

#[test]
fn untyped_put_is_readable_through_typed_getters() {
    let storage = MemoryStorage::new();
    let vault = open(&storage);

    vault.put_value("api", Some("token"), json!("secret123")).unwrap();
    vault.put_value("limits", Some("maxRetries"), json!(5)).unwrap();
    vault.put_value("limits", Some("ratio"), json!(0.5)).unwrap();
    vault.put_value("flags", Some("beta"), json!(true)).unwrap();

    assert_eq!(
        vault.get_string("api", "token").unwrap().as_deref(),
        Some("secret123")
    );
    assert_eq!(vault.get_int("limits", "maxRetries").unwrap(), Some(5));
    assert_eq!(vault.get_float("limits", "ratio").unwrap(), Some(0.5));
    assert_eq!(vault.get_bool("flags", "beta").unwrap(), Some(true));
}

#[test]
fn untyped_reads_return_null_and_objects() {
    let storage = MemoryStorage::new();
    let vault = open(&storage);
    vault.put_int("limits", "maxRetries", 5).unwrap();
    vault.put_string("limits", "mode", "fast").unwrap();

    assert_eq!(vault.get_value("limits", Some("missing")).unwrap(), json!(null));
    assert_eq!(vault.get_value("limits", Some("maxRetries")).unwrap(), json!(5));
    assert_eq!(
        vault.get_value("limits", None).unwrap(),
        json!({"maxRetries": 5, "mode": "fast"})
    );
    assert_eq!(vault.get_value("nothing", None).unwrap(), json!({}));
}

#[test]
fn object_without_key_replaces_domain() {
    let storage = MemoryStorage::new();
    let vault = open(&storage);
    vault.put_string("db", "host", "old").unwrap();
    vault.put_int("db", "port", 5432).unwrap();

    vault
        .put_value("db", None, json!({"host": "new", "tls": true, "skip": null}))
        .unwrap();

    assert_eq!(
        vault.get_value("db", None).unwrap(),
        json!({"host": "new", "tls": true})
    );
}

#[test]
fn null_and_unset_remove_entries() {
    let storage = MemoryStorage::new();
    let vault = open(&storage);
    vault.put_string("api", "token", "t").unwrap();
    vault.put_string("api", "url", "u").unwrap();
    vault.put_string("old", "k", "v").unwrap();

    vault.put_value("api", Some("token"), json!(null)).unwrap();
    assert_eq!(vault.get_string("api", "token").unwrap(), None);

    vault.unset("api", Some("url")).unwrap();
    assert!(vault.get_domain("api").unwrap().is_empty());

    vault.unset("old", None).unwrap();
    assert!(vault.domains().unwrap().is_empty());
}

#[test]
fn non_scalar_values_are_rejected_and_nothing_is_written() {
    let storage = MemoryStorage::new();
    let vault = open(&storage);
    let before = storage.blob();

    assert!(matches!(
        vault.put_value("api", Some("list"), json!([1, 2, 3])),
        Err(VaultError::UnsupportedValue(_))
    ));
    assert!(matches!(
        vault.put_value("api", None, json!("not an object")),
        Err(VaultError::UnsupportedValue(_))
    ));
    assert!(matches!(
        vault.put_value("api", None, json!({"nested": {"a": 1}})),
        Err(VaultError::UnsupportedValue(_))
    ));

    assert_eq!(storage.blob(), before);
    assert!(!vault.is_dirty());
}

#[test]
fn memory_backend_persists_across_handles() {
    let storage = MemoryStorage::new();
    open(&storage).put_string("api", "token", "abc").unwrap();

    let reopened = open(&storage);
    assert_eq!(
        reopened.get_string("api", "token").unwrap().as_deref(),
        Some("abc")
    );

    let wrong = Vault::open(
        storage.clone(),
        MasterSecret::from_bytes(b"not-the-secret"),
        &settings(),
    );
    assert!(matches!(wrong, Err(VaultError::Corruption(_))));
}
