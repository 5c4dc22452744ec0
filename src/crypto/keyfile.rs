//! Keyfile second factor.
//!
//! A keyfile is a 32-byte random file.  When one is in use, the master
//! secret fed into Argon2id is `HMAC-SHA256(keyfile_bytes, secret_bytes)`,
//! so both the secret and the keyfile are required to open the vault.

use std::fs;
use std::path::Path;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::errors::{Result, VaultError};

/// Expected length of a keyfile in bytes (256 bits).
pub const KEYFILE_LEN: usize = 32;

/// Generate a new random keyfile and write it to `path`.
///
/// The file is written with restrictive permissions (owner-only read).
/// Returns the raw keyfile bytes so the caller can use them immediately.
pub fn generate_keyfile(path: &Path) -> Result<Vec<u8>> {
    if path.exists() {
        return Err(VaultError::Keyfile(format!(
            "keyfile already exists at {}",
            path.display()
        )));
    }

    let mut keyfile = vec![0u8; KEYFILE_LEN];
    rand::rng().fill_bytes(&mut keyfile);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                VaultError::Keyfile(format!("cannot create keyfile directory: {e}"))
            })?;
        }
    }

    fs::write(path, &keyfile)
        .map_err(|e| VaultError::Keyfile(format!("failed to write keyfile: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).map_err(|e| {
            VaultError::Keyfile(format!("failed to set keyfile permissions: {e}"))
        })?;
    }

    Ok(keyfile)
}

/// Load a keyfile from disk and validate its length.
pub fn load_keyfile(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(VaultError::Keyfile(format!(
            "keyfile not found at {}",
            path.display()
        )));
    }

    let data = fs::read(path)
        .map_err(|e| VaultError::Keyfile(format!("failed to read keyfile: {e}")))?;

    if data.len() != KEYFILE_LEN {
        return Err(VaultError::Keyfile(format!(
            "keyfile must be exactly {} bytes, got {}",
            KEYFILE_LEN,
            data.len()
        )));
    }

    Ok(data)
}

/// Combine a secret and keyfile: `HMAC-SHA256(keyfile, secret)`.
pub fn combine_secret_keyfile(secret: &[u8], keyfile_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(keyfile_bytes)
        .map_err(|e| VaultError::Keyfile(format!("HMAC init failed: {e}")))?;

    mac.update(secret);

    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generate_and_load_keyfile_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.keyfile");

        let generated = generate_keyfile(&path).unwrap();
        assert_eq!(generated.len(), KEYFILE_LEN);

        let loaded = load_keyfile(&path).unwrap();
        assert_eq!(generated, loaded);
    }

    #[test]
    fn generate_keyfile_fails_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.keyfile");

        generate_keyfile(&path).unwrap();
        assert!(generate_keyfile(&path).is_err());
    }

    #[test]
    fn load_keyfile_fails_on_wrong_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.keyfile");
        fs::write(&path, [0u8; 16]).unwrap();

        assert!(matches!(load_keyfile(&path), Err(VaultError::Keyfile(_))));
    }

    #[test]
    fn combine_depends_on_both_inputs() {
        let a = combine_secret_keyfile(b"secret", &[0xAB; 32]).unwrap();
        let b = combine_secret_keyfile(b"secret", &[0xCD; 32]).unwrap();
        let c = combine_secret_keyfile(b"other", &[0xAB; 32]).unwrap();

        assert_eq!(a, combine_secret_keyfile(b"secret", &[0xAB; 32]).unwrap());
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[cfg(unix)]
    #[test]
    fn keyfile_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.keyfile");
        generate_keyfile(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
