//! OS keyring storage for master secrets.
//!
//! Stores and retrieves a vault's master secret from the operating
//! system's secure credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Secrets are stored base64-encoded so binary key material survives
//! the keyring's string-only API.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};

/// Service name used in the OS keyring.
const SERVICE_NAME: &str = "configvault";

fn entry(vault_id: &str) -> Result<keyring::Entry> {
    keyring::Entry::new(SERVICE_NAME, &format!("vault:{vault_id}"))
        .map_err(|e| VaultError::Keyring(format!("failed to create keyring entry: {e}")))
}

/// Store a master secret in the OS keyring for a specific vault.
pub fn store_secret(vault_id: &str, secret: &[u8]) -> Result<()> {
    let encoded = Zeroizing::new(BASE64.encode(secret));
    entry(vault_id)?
        .set_password(&encoded)
        .map_err(|e| VaultError::Keyring(format!("failed to store secret in keyring: {e}")))
}

/// Retrieve a master secret from the OS keyring.
///
/// Returns `None` if nothing is stored (rather than an error).
pub fn get_secret(vault_id: &str) -> Result<Option<Vec<u8>>> {
    match entry(vault_id)?.get_password() {
        Ok(encoded) => {
            let encoded = Zeroizing::new(encoded);
            let bytes = BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| VaultError::Keyring(format!("stored secret is not base64: {e}")))?;
            Ok(Some(bytes))
        }
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(VaultError::Keyring(format!(
            "failed to read from keyring: {e}"
        ))),
    }
}

/// Delete a stored master secret from the OS keyring.
pub fn delete_secret(vault_id: &str) -> Result<()> {
    match entry(vault_id)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(VaultError::Keyring(format!(
            "failed to delete from keyring: {e}"
        ))),
    }
}
