//! The sealing engine a vault handle holds for its lifetime.
//!
//! Built once from the caller's master secret and the vault salt.  Only
//! the HKDF-derived payload key survives construction; the secret and
//! the Argon2id output are zeroized before `derive` returns.

use zeroize::{Zeroize, Zeroizing};

use super::encryption::{self, Sealed};
use super::kdf::{derive_master_key, Argon2Params, SALT_LEN};
use super::keys::MasterKey;
use crate::errors::Result;
use crate::secret::MasterSecret;

pub struct CryptoEngine {
    payload_key: Zeroizing<[u8; 32]>,
    salt: [u8; SALT_LEN],
}

impl CryptoEngine {
    /// Derive the working key for `salt` from `secret`.
    pub fn derive(
        secret: &MasterSecret,
        salt: [u8; SALT_LEN],
        params: &Argon2Params,
    ) -> Result<Self> {
        let mut master_bytes = derive_master_key(secret.expose(), &salt, params)?;
        let master_key = MasterKey::new(master_bytes);
        master_bytes.zeroize();

        let payload_key = Zeroizing::new(master_key.derive_payload_key()?);
        Ok(Self { payload_key, salt })
    }

    /// The salt this engine's key was derived with.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Seal `plaintext` under a fresh nonce, authenticating `aad`.
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Sealed> {
        encryption::seal(&self.payload_key[..], aad, plaintext)
    }

    /// Open a sealed payload.  Fails with `Corruption` on any auth failure.
    pub fn open(&self, aad: &[u8], sealed: &Sealed) -> Result<Vec<u8>> {
        encryption::open(&self.payload_key[..], aad, sealed)
    }
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("payload_key", &"[REDACTED]")
            .field("salt", &self.salt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::generate_salt;

    fn fast() -> Argon2Params {
        Argon2Params {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn same_secret_and_salt_open_each_others_output() {
        let salt = generate_salt();
        let a = CryptoEngine::derive(&MasterSecret::from_bytes(b"s3cret"), salt, &fast()).unwrap();
        let b = CryptoEngine::derive(&MasterSecret::from_bytes(b"s3cret"), salt, &fast()).unwrap();

        let sealed = a.seal(b"hdr", b"payload").unwrap();
        assert_eq!(b.open(b"hdr", &sealed).unwrap(), b"payload");
    }

    #[test]
    fn wrong_secret_cannot_open() {
        let salt = generate_salt();
        let a = CryptoEngine::derive(&MasterSecret::from_bytes(b"right"), salt, &fast()).unwrap();
        let b = CryptoEngine::derive(&MasterSecret::from_bytes(b"wrong"), salt, &fast()).unwrap();

        let sealed = a.seal(b"", b"payload").unwrap();
        assert!(b.open(b"", &sealed).is_err());
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let engine =
            CryptoEngine::derive(&MasterSecret::from_bytes(b"pw"), generate_salt(), &fast())
                .unwrap();
        let one = engine.seal(b"", b"same").unwrap();
        let two = engine.seal(b"", b"same").unwrap();
        assert_ne!(one.nonce, two.nonce);
        assert_ne!(one, two);
    }

    #[test]
    fn debug_output_hides_key() {
        let engine =
            CryptoEngine::derive(&MasterSecret::from_bytes(b"pw"), generate_salt(), &fast())
                .unwrap();
        assert!(format!("{engine:?}").contains("[REDACTED]"));
    }
}
