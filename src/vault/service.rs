//! The vault handle applications hold.
//!
//! `Vault` wraps the domain store, the crypto engine, and a storage
//! backend so the rest of an application can work with calls like
//! `vault.put_string("api", "token", "...")` and
//! `vault.get_int("limits", "maxRetries")`.
//!
//! Every mutating call commits before it returns:
//!
//! 1. Take the backend's writer lock (bounded wait).
//! 2. Load and open the current blob, picking up other writers' commits.
//! 3. Replay this handle's pending mutations onto it.
//! 4. Encode, seal under a fresh nonce, atomically save.
//!
//! If any step fails the mutation stays pending (the handle is *dirty*)
//! and is retried by the next mutation, `flush`, or `reload`.  Reads are
//! always served from the last committed state, never from the journal.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::codec::{decode_payload, encode_payload};
use super::format::{VaultBlob, VaultHeader};
use super::store::{DomainMap, DomainStore, Mutation};
use super::value::{Primitive, Value};
use crate::config::VaultSettings;
use crate::crypto::{generate_salt, Argon2Params, CryptoEngine};
use crate::errors::{Result, VaultError};
use crate::secret::MasterSecret;
use crate::storage::{FileStorage, Persistence};

#[cfg(feature = "audit-log")]
use crate::audit::AuditLog;

/// Observable state of a vault handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultPhase {
    /// Memory matches the last commit.
    Clean,
    /// Some mutations have been applied in memory but not yet committed.
    Dirty,
    /// An integrity failure was observed; the handle refuses all calls.
    Poisoned,
}

struct VaultState {
    crypto: CryptoEngine,
    /// Last committed contents; what reads observe.
    store: DomainStore,
    /// Mutations not yet durable, replayed onto the blob by each commit.
    pending: Vec<Mutation>,
    poisoned: bool,
    #[cfg(feature = "audit-log")]
    audit: Option<AuditLog>,
}

/// An open configuration vault.
///
/// All methods take `&self`; one internal lock serializes them, so a
/// `Vault` can be shared behind an `Arc`.
pub struct Vault<S: Persistence = FileStorage> {
    storage: S,
    lock_timeout: Duration,
    argon2_params: Argon2Params,
    state: Mutex<VaultState>,
}

impl Vault<FileStorage> {
    /// Open (or create) the vault file at `path`.
    pub fn open_path(
        path: impl Into<PathBuf>,
        secret: MasterSecret,
        settings: &VaultSettings,
    ) -> Result<Self> {
        Self::open(FileStorage::new(path), secret, settings)
    }

    /// Open the vault configured by `<dir>/.configvault.toml`.
    pub fn open_dir(dir: &Path, secret: MasterSecret) -> Result<Self> {
        let settings = VaultSettings::load(dir)?;
        Self::open_path(settings.vault_path(dir), secret, &settings)
    }
}

impl<S: Persistence> Vault<S> {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Open the vault held by `storage`, initializing an empty one if
    /// the backend has no blob yet.
    ///
    /// `secret` is consumed: once the working key is derived it is
    /// zeroized and dropped.
    pub fn open(storage: S, secret: MasterSecret, settings: &VaultSettings) -> Result<Self> {
        let argon2_params = settings.argon2_params();
        let lock_timeout = settings.lock_timeout();

        let (crypto, store) = {
            let _lock = storage.lock(lock_timeout)?;
            match storage.load()? {
                Some(bytes) => {
                    let blob = VaultBlob::parse(&bytes)?;
                    let crypto = CryptoEngine::derive(&secret, blob.header.salt, &argon2_params)?;
                    let store = unseal(&crypto, &blob)?;
                    debug!(domains = store.len(), "vault opened");
                    (crypto, store)
                }
                None => {
                    let crypto = CryptoEngine::derive(&secret, generate_salt(), &argon2_params)?;
                    let store = DomainStore::new();
                    storage.save(&seal_store(&crypto, &store)?)?;
                    info!("initialized empty vault");
                    (crypto, store)
                }
            }
        };
        drop(secret);

        Ok(Self {
            storage,
            lock_timeout,
            argon2_params,
            state: Mutex::new(VaultState {
                crypto,
                store,
                pending: Vec::new(),
                poisoned: false,
                #[cfg(feature = "audit-log")]
                audit: open_audit(settings),
            }),
        })
    }

    // ------------------------------------------------------------------
    // Typed reads
    // ------------------------------------------------------------------

    pub fn get_bool(&self, domain: &str, key: &str) -> Result<Option<bool>> {
        self.get_typed(domain, key)
    }

    pub fn get_int(&self, domain: &str, key: &str) -> Result<Option<i64>> {
        self.get_typed(domain, key)
    }

    pub fn get_float(&self, domain: &str, key: &str) -> Result<Option<f64>> {
        self.get_typed(domain, key)
    }

    pub fn get_string(&self, domain: &str, key: &str) -> Result<Option<String>> {
        self.get_typed(domain, key)
    }

    /// All key-value pairs of `domain`; empty if the domain does not exist.
    pub fn get_domain(&self, domain: &str) -> Result<DomainMap> {
        Ok(self.lock_state()?.store.domain_snapshot(domain))
    }

    /// Names of all domains, sorted.
    pub fn domains(&self) -> Result<Vec<String>> {
        Ok(self.lock_state()?.store.domain_names())
    }

    /// Untyped read, used by the compatibility adapter.
    pub(crate) fn get(&self, domain: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.lock_state()?.store.get(domain, key).cloned())
    }

    fn get_typed<T: Primitive>(&self, domain: &str, key: &str) -> Result<Option<T>> {
        match self.get(domain, key)? {
            Some(value) => T::from_value(value).map(Some),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Typed writes
    // ------------------------------------------------------------------

    pub fn put_bool(&self, domain: &str, key: &str, value: bool) -> Result<()> {
        self.put(domain, key, Value::Boolean(value))
    }

    pub fn put_int(&self, domain: &str, key: &str, value: i64) -> Result<()> {
        self.put(domain, key, Value::Integer(value))
    }

    pub fn put_float(&self, domain: &str, key: &str, value: f64) -> Result<()> {
        self.put(domain, key, Value::Float(value))
    }

    pub fn put_string(&self, domain: &str, key: &str, value: impl Into<String>) -> Result<()> {
        self.put(domain, key, Value::String(value.into()))
    }

    /// Replace every key of `domain` with `entries` in one commit.
    ///
    /// Readers see either the old mapping or the new one, never a mix.
    /// An empty `entries` removes the domain.
    pub fn put_domain(&self, domain: &str, entries: DomainMap) -> Result<()> {
        validate_name("domain", domain)?;
        for key in entries.keys() {
            validate_name("key", key)?;
        }
        debug!(domain, keys = entries.len(), "replace domain");
        self.mutate(Mutation::ReplaceDomain {
            domain: domain.to_string(),
            entries,
        })
    }

    pub(crate) fn put(&self, domain: &str, key: &str, value: Value) -> Result<()> {
        validate_name("domain", domain)?;
        validate_name("key", key)?;
        debug!(domain, key, value_type = %value.value_type(), "put");
        self.mutate(Mutation::Put {
            domain: domain.to_string(),
            key: key.to_string(),
            value,
        })
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove one key.  Missing keys are a no-op and never fail.
    ///
    /// "Missing" is judged against this handle's view; call `reload`
    /// first to remove a key another process has just added.
    pub fn unset_key(&self, domain: &str, key: &str) -> Result<()> {
        if domain.is_empty() || key.is_empty() {
            return Ok(());
        }
        let mut state = self.lock_state()?;
        if state.store.get(domain, key).is_none() && !has_pending(&state, domain) {
            return Ok(());
        }
        debug!(domain, key, "unset key");
        self.journal(
            &mut state,
            Mutation::RemoveKey {
                domain: domain.to_string(),
                key: key.to_string(),
            },
        )
    }

    /// Remove a whole domain.  Missing domains are a no-op and never fail.
    pub fn unset_domain(&self, domain: &str) -> Result<()> {
        if domain.is_empty() {
            return Ok(());
        }
        let mut state = self.lock_state()?;
        if !state.store.contains_domain(domain) && !has_pending(&state, domain) {
            return Ok(());
        }
        debug!(domain, "unset domain");
        self.journal(
            &mut state,
            Mutation::RemoveDomain {
                domain: domain.to_string(),
            },
        )
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn phase(&self) -> VaultPhase {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.poisoned {
            VaultPhase::Poisoned
        } else if state.pending.is_empty() {
            VaultPhase::Clean
        } else {
            VaultPhase::Dirty
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.phase() == VaultPhase::Dirty
    }

    /// Retry committing pending mutations.  No-op when clean.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        self.commit(&mut state)
    }

    /// Pick up commits made by other handles or processes.
    ///
    /// A dirty handle commits instead, which reloads as part of the commit.
    pub fn reload(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        if !state.pending.is_empty() {
            return self.commit(&mut state);
        }

        let result = self
            .storage
            .lock(self.lock_timeout)
            .and_then(|_lock| self.load_current(&state.crypto));
        let fresh = track_corruption(&mut state, result)?;
        debug!(domains = fresh.len(), "vault reloaded");
        state.store = fresh;
        Ok(())
    }

    /// Re-encrypt the vault under `new_secret` with a fresh salt.
    ///
    /// Other handles still holding the old key will refuse the new blob
    /// and must be reopened.
    pub fn rekey(&self, new_secret: MasterSecret) -> Result<()> {
        let mut state = self.lock_state()?;
        let crypto = CryptoEngine::derive(&new_secret, generate_salt(), &self.argon2_params)?;
        drop(new_secret);

        let result = self.write_through(&state, &crypto);
        let fresh = track_corruption(&mut state, result)?;

        state.crypto = crypto;
        state.store = fresh;
        let committed = std::mem::take(&mut state.pending);
        record(&state, &committed);
        record_rekey(&state);
        info!("vault re-keyed");
        Ok(())
    }

    /// Commit anything pending and release the handle.
    ///
    /// If the final commit fails the handle comes back with the error,
    /// still dirty, so the caller can retry or close it again.
    pub fn close(self) -> std::result::Result<(), (Self, VaultError)> {
        if let Err(e) = self.flush() {
            return Err((self, e));
        }
        debug!("vault closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit pipeline
    // ------------------------------------------------------------------

    fn lock_state(&self) -> Result<MutexGuard<'_, VaultState>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.poisoned {
            return Err(VaultError::Corruption(
                "vault handle is unusable after an earlier integrity failure".into(),
            ));
        }
        Ok(state)
    }

    fn mutate(&self, mutation: Mutation) -> Result<()> {
        let mut state = self.lock_state()?;
        self.journal(&mut state, mutation)
    }

    /// Queue `mutation` and commit.  `state.store` only changes once the
    /// commit is durable.
    fn journal(&self, state: &mut VaultState, mutation: Mutation) -> Result<()> {
        state.pending.push(mutation);
        self.commit(state)
    }

    fn commit(&self, state: &mut VaultState) -> Result<()> {
        if state.pending.is_empty() {
            return Ok(());
        }

        let result = self.write_through(&*state, &state.crypto);
        let fresh = match track_corruption(state, result) {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, pending = state.pending.len(), "commit failed; vault is dirty");
                return Err(e);
            }
        };

        state.store = fresh;
        let committed = std::mem::take(&mut state.pending);
        debug!(mutations = committed.len(), "vault committed");
        record(state, &committed);
        Ok(())
    }

    /// Under the writer lock: reload, replay pending mutations, and save
    /// the result sealed by `crypto`.  Returns the committed store.
    fn write_through(&self, state: &VaultState, crypto: &CryptoEngine) -> Result<DomainStore> {
        let _lock = self.storage.lock(self.lock_timeout)?;

        let mut fresh = self.load_current(&state.crypto)?;
        for mutation in &state.pending {
            mutation.apply(&mut fresh);
        }

        self.storage.save(&seal_store(crypto, &fresh)?)?;
        Ok(fresh)
    }

    /// Open the backend's current blob with `crypto`; empty if none.
    fn load_current(&self, crypto: &CryptoEngine) -> Result<DomainStore> {
        match self.storage.load()? {
            Some(bytes) => unseal(crypto, &VaultBlob::parse(&bytes)?),
            None => Ok(DomainStore::new()),
        }
    }
}

impl<S: Persistence> std::fmt::Debug for Vault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("phase", &self.phase())
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether an uncommitted mutation touches `domain`.
fn has_pending(state: &VaultState, domain: &str) -> bool {
    state.pending.iter().any(|m| m.domain() == domain)
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidName(format!("{what} name cannot be empty")));
    }
    Ok(())
}

/// Poison the handle if `result` is an integrity failure.
fn track_corruption<T>(state: &mut VaultState, result: Result<T>) -> Result<T> {
    if let Err(VaultError::Corruption(reason)) = &result {
        warn!(%reason, "integrity failure; vault handle poisoned");
        state.poisoned = true;
    }
    result
}

fn seal_store(crypto: &CryptoEngine, store: &DomainStore) -> Result<Vec<u8>> {
    let header = VaultHeader::new(*crypto.salt());
    let plaintext = Zeroizing::new(encode_payload(store));
    let sealed = crypto.seal(&header.to_bytes(), &plaintext)?;
    Ok(VaultBlob { header, sealed }.to_bytes())
}

fn unseal(crypto: &CryptoEngine, blob: &VaultBlob) -> Result<DomainStore> {
    if &blob.header.salt != crypto.salt() {
        return Err(VaultError::Corruption(
            "vault was re-keyed by another writer; reopen it".into(),
        ));
    }
    let plaintext = Zeroizing::new(crypto.open(&blob.header.to_bytes(), &blob.sealed)?);
    decode_payload(&plaintext)
}

#[cfg(feature = "audit-log")]
fn open_audit(settings: &VaultSettings) -> Option<AuditLog> {
    let path = settings.audit_db.as_deref()?;
    match AuditLog::open(path) {
        Ok(audit) => Some(audit),
        Err(e) => {
            warn!(error = %e, "audit log unavailable; continuing without it");
            None
        }
    }
}

#[cfg(feature = "audit-log")]
fn record(state: &VaultState, committed: &[Mutation]) {
    if let Some(audit) = &state.audit {
        for mutation in committed {
            if let Err(e) = audit.log(mutation.operation(), mutation.domain(), mutation.key()) {
                warn!(error = %e, "failed to write audit entry");
            }
        }
    }
}

#[cfg(feature = "audit-log")]
fn record_rekey(state: &VaultState) {
    if let Some(audit) = &state.audit {
        if let Err(e) = audit.log("rekey", "*", None) {
            warn!(error = %e, "failed to write audit entry");
        }
    }
}

#[cfg(not(feature = "audit-log"))]
fn record(_state: &VaultState, _committed: &[Mutation]) {}

#[cfg(not(feature = "audit-log"))]
fn record_rekey(_state: &VaultState) {}
