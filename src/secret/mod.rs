//! The caller-supplied master secret.
//!
//! `MasterSecret` owns the raw key material only until the vault has
//! derived its working key from it.  The bytes are zeroized on drop and
//! never appear in `Debug` output.
//!
//! Hosts usually obtain the secret from one of:
//! - an environment variable (`from_env`)
//! - a secret file, e.g. a mounted container secret (`from_file`)
//! - the OS keyring (`from_keyring`, `keyring-store` feature)
//!
//! and may harden it with a keyfile second factor (`with_keyfile`).

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use crate::crypto::keyfile;
use crate::errors::{Result, VaultError};

/// Prefix marking an environment value as base64-encoded binary material.
const BASE64_PREFIX: &str = "base64:";

pub struct MasterSecret {
    bytes: Zeroizing<Vec<u8>>,
}

impl MasterSecret {
    /// Wrap raw secret bytes.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.as_ref().to_vec()),
        }
    }

    /// Read the secret from the environment variable `var`.
    ///
    /// A value of the form `base64:<data>` is decoded, so binary key
    /// material can travel through the environment.
    pub fn from_env(var: &str) -> Result<Self> {
        let value = Zeroizing::new(std::env::var(var).map_err(|e| {
            VaultError::MasterSecret(format!("environment variable {var}: {e}"))
        })?);

        match value.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => {
                let decoded = BASE64.decode(encoded.trim()).map_err(|e| {
                    VaultError::MasterSecret(format!("{var} is not valid base64: {e}"))
                })?;
                Self::from_owned(decoded)
            }
            None => Self::from_owned(value.as_bytes().to_vec()),
        }
    }

    /// Read the secret from a file.  A single trailing newline is ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut data = std::fs::read(path).map_err(|e| {
            VaultError::MasterSecret(format!("cannot read {}: {e}", path.display()))
        })?;

        if data.last() == Some(&b'\n') {
            data.pop();
            if data.last() == Some(&b'\r') {
                data.pop();
            }
        }
        Self::from_owned(data)
    }

    /// Combine this secret with a keyfile: both are then required.
    pub fn with_keyfile(self, keyfile_bytes: &[u8]) -> Result<Self> {
        let combined = keyfile::combine_secret_keyfile(&self.bytes, keyfile_bytes)?;
        Ok(Self {
            bytes: Zeroizing::new(combined),
        })
    }

    /// Read the secret stored in the OS keyring for `vault_id`.
    #[cfg(feature = "keyring-store")]
    pub fn from_keyring(vault_id: &str) -> Result<Self> {
        match crate::keyring::get_secret(vault_id)? {
            Some(bytes) => Self::from_owned(bytes),
            None => Err(VaultError::MasterSecret(format!(
                "no master secret stored in the keyring for {vault_id}"
            ))),
        }
    }

    /// Store this secret in the OS keyring under `vault_id`.
    #[cfg(feature = "keyring-store")]
    pub fn store_in_keyring(&self, vault_id: &str) -> Result<()> {
        crate::keyring::store_secret(vault_id, &self.bytes)
    }

    /// Remove the keyring entry for `vault_id`.  Missing entries are fine.
    #[cfg(feature = "keyring-store")]
    pub fn delete_from_keyring(vault_id: &str) -> Result<()> {
        crate::keyring::delete_secret(vault_id)
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }

    fn from_owned(bytes: Vec<u8>) -> Result<Self> {
        let bytes = Zeroizing::new(bytes);
        if bytes.is_empty() {
            return Err(VaultError::MasterSecret("master secret is empty".into()));
        }
        Ok(Self { bytes })
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}
