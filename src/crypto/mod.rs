//! Cryptographic primitives for ConfigVault.
//!
//! This module provides:
//! - AES-256-GCM detached sealing and opening (`encryption`)
//! - Argon2id key derivation from the master secret (`kdf`)
//! - HKDF payload-key derivation (`keys`)
//! - The per-vault `CryptoEngine` combining the three (`engine`)
//! - Keyfile second factor (`keyfile`)

pub mod encryption;
pub mod engine;
pub mod kdf;
pub mod keyfile;
pub mod keys;

pub use encryption::{open, seal, Sealed, NONCE_LEN, TAG_LEN};
pub use engine::CryptoEngine;
pub use kdf::{derive_master_key, generate_salt, Argon2Params, SALT_LEN};
pub use keyfile::{combine_secret_keyfile, generate_keyfile, load_keyfile};
pub use keys::{derive_payload_key, MasterKey};
