//! AES-256-GCM authenticated encryption with a detached tag.
//!
//! Each call to `seal` generates a fresh random 12-byte nonce.  The nonce,
//! ciphertext, and 16-byte auth tag are returned separately so the blob
//! layer can place them where the vault file format wants them:
//!
//! ```text
//! [ ... header (AAD) ... | nonce | ciphertext | tag ]
//! ```

use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce, Tag};

use crate::errors::{Result, VaultError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Output of a single `seal` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` with a 32-byte `key`, authenticating `aad` alongside it.
pub fn seal(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Sealed> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    // Never reuse a nonce: every seal draws a new one from the OS.
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, aad, &mut buffer)
        .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut sealed = Sealed {
        nonce: [0u8; NONCE_LEN],
        ciphertext: buffer,
        tag: [0u8; TAG_LEN],
    };
    sealed.nonce.copy_from_slice(&nonce);
    sealed.tag.copy_from_slice(&tag);
    Ok(sealed)
}

/// Decrypt and verify data produced by `seal`.
///
/// Every failure (bad key, wrong AAD, flipped bit) returns the same
/// `Corruption` error.
pub fn open(key: &[u8], aad: &[u8], sealed: &Sealed) -> Result<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::authentication_failed())?;

    let mut buffer = sealed.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&sealed.nonce),
            aad,
            &mut buffer,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| VaultError::authentication_failed())?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aad_is_authenticated() {
        let key = [0x5Au8; 32];
        let sealed = seal(&key, b"header-a", b"payload").unwrap();

        assert_eq!(open(&key, b"header-a", &sealed).unwrap(), b"payload");
        assert!(open(&key, b"header-b", &sealed).is_err());
    }

    #[test]
    fn flipped_tag_bit_is_rejected() {
        let key = [0x11u8; 32];
        let mut sealed = seal(&key, b"", b"value").unwrap();
        sealed.tag[0] ^= 0x01;

        let err = open(&key, b"", &sealed).unwrap_err();
        assert!(matches!(err, VaultError::Corruption(_)));
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = [0x22u8; 32];
        let sealed = seal(&key, b"aad", b"").unwrap();
        assert!(sealed.ciphertext.is_empty());
        assert_eq!(open(&key, b"aad", &sealed).unwrap(), b"");
    }
}
