//! Vault module: the encrypted domain/key/value store.
//!
//! This module provides:
//! - Tagged `Value`s and their type tags (`value`)
//! - Value and payload byte encoding (`codec`)
//! - The in-memory `DomainStore` (`store`)
//! - Binary vault blob layout (`format`)
//! - The `Vault` handle with typed accessors (`service`)
//! - An untyped adapter over `Vault` (`compat`)

pub mod codec;
pub mod compat;
pub mod format;
pub mod service;
pub mod store;
pub mod value;

// Re-export the most commonly used items.
pub use compat::GenericVault;
pub use format::{VaultBlob, VaultHeader};
pub use service::{Vault, VaultPhase};
pub use store::{DomainMap, DomainStore, Mutation};
pub use value::{Primitive, Value, ValueType};
