use thiserror::Error;

use crate::vault::ValueType;

/// All errors that can occur in ConfigVault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Typed access errors ---
    #[error("Type mismatch: expected {expected} but the stored value is {found}")]
    TypeMismatch { expected: ValueType, found: ValueType },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    // --- Integrity errors ---
    /// Authentication failure or a malformed blob.  Fatal for the vault
    /// handle that observed it.
    #[error("Vault data is corrupted: {0}")]
    Corruption(String),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Storage errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vault is locked by another writer (gave up after {timeout_ms} ms)")]
    ConcurrentModification { timeout_ms: u64 },

    // --- Master secret sources ---
    #[error("Master secret error: {0}")]
    MasterSecret(String),

    #[error("Keyfile error: {0}")]
    Keyfile(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- Audit errors ---
    #[error("Audit error: {0}")]
    Audit(String),
}

impl VaultError {
    /// The single error every failed authentication maps to, so a wrong
    /// secret and a tampered blob look the same to the caller.
    pub(crate) fn authentication_failed() -> Self {
        Self::Corruption("authentication failed: wrong master secret or tampered data".into())
    }

    /// Returns `true` for errors a caller may simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConcurrentModification { .. })
    }
}

/// Convenience type alias for ConfigVault results.
pub type Result<T> = std::result::Result<T, VaultError>;
