//! In-process storage backend.
//!
//! Clones share the same buffer and lock, so two vault handles opened on
//! clones of one `MemoryStorage` behave like two processes sharing a file.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{lock_timeout_error, Persistence};
use crate::errors::Result;

#[derive(Debug, Default)]
struct Shared {
    blob: Mutex<Option<Vec<u8>>>,
    locked: Mutex<bool>,
    released: Condvar,
    read_only: Mutex<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    shared: Arc<Shared>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current blob, if any.
    pub fn blob(&self) -> Option<Vec<u8>> {
        relock(&self.shared.blob).clone()
    }

    /// Overwrite the blob directly, bypassing the lock.
    pub fn set_blob(&self, blob: Option<Vec<u8>>) {
        *relock(&self.shared.blob) = blob;
    }

    /// While read-only, every `save` fails with `PermissionDenied`.
    pub fn set_read_only(&self, read_only: bool) {
        *relock(&self.shared.read_only) = read_only;
    }
}

impl Persistence for MemoryStorage {
    type Lock = MemoryLock;

    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob())
    }

    fn save(&self, blob: &[u8]) -> Result<()> {
        if *relock(&self.shared.read_only) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "memory storage is read-only",
            )
            .into());
        }
        *relock(&self.shared.blob) = Some(blob.to_vec());
        Ok(())
    }

    fn lock(&self, timeout: Duration) -> Result<MemoryLock> {
        let guard = relock(&self.shared.locked);
        let (mut locked, _) = self
            .shared
            .released
            .wait_timeout_while(guard, timeout, |locked| *locked)
            .unwrap_or_else(PoisonError::into_inner);

        if *locked {
            return Err(lock_timeout_error(timeout));
        }
        *locked = true;
        Ok(MemoryLock {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Held lock on a `MemoryStorage`.  Released on drop.
#[derive(Debug)]
pub struct MemoryLock {
    shared: Arc<Shared>,
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        *relock(&self.shared.locked) = false;
        self.shared.released.notify_one();
    }
}

/// The guarded data is plain bytes and flags, valid even after a panic.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
