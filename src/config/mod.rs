//! Vault configuration loaded from `.configvault.toml`.

pub mod settings;

pub use settings::VaultSettings;
