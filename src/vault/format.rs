//! Binary vault file format.
//!
//! A `.vault` blob has this layout:
//!
//! ```text
//! [CVLT: 4][version: 1][salt: 16][nonce: 12][ciphertext: n][auth tag: 16]
//! ```
//!
//! - **Magic** (`CVLT`): identifies the blob as a ConfigVault vault.
//! - **Version**: format version (currently `1`).
//! - **Salt**: Argon2id salt, generated once when the vault is created.
//! - **Nonce**: AES-256-GCM nonce, fresh on every write.
//! - **Ciphertext + tag**: the sealed payload (see `codec`).
//!
//! Magic, version, and salt are passed to the cipher as associated data,
//! so they are covered by the auth tag along with the payload.

use crate::crypto::{Sealed, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::errors::{Result, VaultError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every vault blob.
const MAGIC: &[u8; 4] = b"CVLT";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Authenticated header: 4 (magic) + 1 (version) + 16 (salt).
pub const HEADER_LEN: usize = 4 + 1 + SALT_LEN;

/// Smallest valid blob: header + nonce + empty ciphertext + tag.
const MIN_BLOB_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// VaultHeader
// ---------------------------------------------------------------------------

/// The unencrypted prefix of a vault blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultHeader {
    pub version: u8,
    pub salt: [u8; SALT_LEN],
}

impl VaultHeader {
    /// Header for a blob written by this version of the crate.
    pub fn new(salt: [u8; SALT_LEN]) -> Self {
        Self {
            version: CURRENT_VERSION,
            salt,
        }
    }

    /// Serialized header; also the AEAD associated data.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(MAGIC);
        out[4] = self.version;
        out[5..].copy_from_slice(&self.salt);
        out
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A parsed vault blob.  Nothing in it is trusted until the sealed part
/// has been opened with the header bytes as AAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultBlob {
    pub header: VaultHeader,
    pub sealed: Sealed,
}

impl VaultBlob {
    /// Assemble the on-disk bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_BLOB_LEN + self.sealed.ciphertext.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.sealed.nonce);
        buf.extend_from_slice(&self.sealed.ciphertext);
        buf.extend_from_slice(&self.sealed.tag);
        buf
    }

    /// Split on-disk bytes into header and sealed payload.
    ///
    /// Fails with `Corruption` when the blob is too short, lacks the magic
    /// bytes, or carries an unknown version.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_BLOB_LEN {
            return Err(VaultError::Corruption(
                "blob too small to be a valid vault".into(),
            ));
        }

        if &data[0..4] != MAGIC {
            return Err(VaultError::Corruption("missing CVLT magic bytes".into()));
        }

        let version = data[4];
        if version != CURRENT_VERSION {
            return Err(VaultError::Corruption(format!(
                "unsupported version {version}, expected {CURRENT_VERSION}"
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[5..HEADER_LEN]);

        let nonce_end = HEADER_LEN + NONCE_LEN;
        let tag_start = data.len() - TAG_LEN;

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[HEADER_LEN..nonce_end]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&data[tag_start..]);

        Ok(Self {
            header: VaultHeader { version, salt },
            sealed: Sealed {
                nonce,
                ciphertext: data[nonce_end..tag_start].to_vec(),
                tag,
            },
        })
    }
}
