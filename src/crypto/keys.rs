//! Key derivation helpers using HKDF-SHA256.
//!
//! From the Argon2id master key we derive a dedicated **payload key**
//! that seals the serialized vault.  Keeping the Argon2 output out of
//! the cipher directly lets later format versions add sub-keys without
//! touching the KDF.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

/// Length of derived sub-keys (256 bits).
const KEY_LEN: usize = 32;

/// HKDF `info` for the payload sealing key.
const PAYLOAD_KEY_INFO: &[u8] = b"configvault-payload-key-v1";

/// Derive the payload sealing key from the master key.
pub fn derive_payload_key(master_key: &[u8]) -> Result<[u8; KEY_LEN]> {
    hkdf_derive(master_key, PAYLOAD_KEY_INFO)
}

/// Run HKDF-SHA256 expand with the given `info`.
///
/// The extract step gets no salt: the master key already has high
/// entropy (it came from Argon2id).
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// A wrapper around a 32-byte master key that automatically zeroes
/// its memory when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Derive the payload sealing key from this master key.
    pub fn derive_payload_key(&self) -> Result<[u8; KEY_LEN]> {
        derive_payload_key(&self.bytes)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
