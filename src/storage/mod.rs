//! Durable storage of the sealed vault blob.
//!
//! The vault engine only ever talks to a `Persistence` implementation, so
//! swapping the local file for another backend means implementing this
//! trait and nothing else.
//!
//! - `FileStorage`: a single file, atomic replace, advisory lock file
//! - `MemoryStorage`: a shared in-process buffer

pub mod file;
pub mod memory;

use std::time::Duration;

use crate::errors::{Result, VaultError};

pub use file::{FileLock, FileStorage};
pub use memory::{MemoryLock, MemoryStorage};

/// Backend holding the current vault blob.
pub trait Persistence: Send + Sync {
    /// Guard returned by `lock`; the lock is released when it drops.
    type Lock;

    /// Return the persisted blob, or `None` if nothing has been stored yet.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the persisted blob.  After a crash at any point the backend
    /// holds either the previous blob or `blob`, never a mix.
    fn save(&self, blob: &[u8]) -> Result<()>;

    /// Take the writer lock, waiting at most `timeout`.
    ///
    /// Fails with `ConcurrentModification` when the wait runs out.
    fn lock(&self, timeout: Duration) -> Result<Self::Lock>;
}

pub(crate) fn lock_timeout_error(timeout: Duration) -> VaultError {
    VaultError::ConcurrentModification {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}
