//! ConfigVault: encrypted storage for sensitive configuration.
//!
//! Values (booleans, integers, floats, strings) live under keys grouped
//! into named domains.  The whole vault is sealed with AES-256-GCM under
//! a key derived from a caller-supplied master secret, and every write is
//! committed atomically before the call returns.
//!
//! ```no_run
//! use configvault::{MasterSecret, Vault, VaultSettings};
//!
//! # fn main() -> configvault::Result<()> {
//! let secret = MasterSecret::from_env("APP_VAULT_SECRET")?;
//! let vault = Vault::open_path("config.vault", secret, &VaultSettings::default())?;
//!
//! vault.put_string("api", "token", "secret123")?;
//! assert_eq!(vault.get_string("api", "token")?.as_deref(), Some("secret123"));
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "audit-log")]
pub mod audit;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod secret;
pub mod storage;
pub mod vault;

#[cfg(feature = "keyring-store")]
pub mod keyring;

pub use config::VaultSettings;
pub use errors::{Result, VaultError};
pub use secret::MasterSecret;
pub use storage::{FileStorage, MemoryStorage, Persistence};
pub use vault::{DomainMap, GenericVault, Value, ValueType, Vault, VaultPhase};
