//! Single-file storage with atomic replace and an advisory lock.
//!
//! Writes go to `.<name>.tmp` next to the vault, are flushed with
//! `fsync`, then renamed over the vault file; the directory is synced
//! afterwards so the rename itself is durable.
//!
//! Writers across processes serialize on `<name>.lock`.  The lock lives
//! in its own file because the vault file's inode changes on every save.
//!
//! On Unix the lock is `flock(2)`, which the kernel drops when the holder
//! exits.  Elsewhere the lock file's existence is the lock: a holder that
//! crashes leaves it behind and every later writer times out until it is
//! deleted by hand.  The file records the holder's process id so a stale
//! lock can be identified.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{lock_timeout_error, Persistence};
use crate::errors::Result;

/// How long to sleep between lock attempts.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A vault stored in one file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the vault file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path to the advisory lock file (`<vault>.lock`).
    pub fn lock_path(&self) -> PathBuf {
        self.sibling(&format!("{}.lock", self.file_name()))
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(&format!(".{}.tmp", self.file_name()))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    fn parent(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.parent().join(name)
    }
}

impl Persistence for FileStorage {
    type Lock = FileLock;

    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, blob: &[u8]) -> Result<()> {
        let parent = self.parent();
        fs::create_dir_all(parent)?;

        let tmp_path = self.temp_path();
        if let Err(e) = write_synced(&tmp_path, blob) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        sync_dir(parent)?;
        debug!(path = %self.path.display(), bytes = blob.len(), "vault file replaced");
        Ok(())
    }

    fn lock(&self, timeout: Duration) -> Result<FileLock> {
        fs::create_dir_all(self.parent())?;
        let deadline = Instant::now() + timeout;
        let lock_path = self.lock_path();

        loop {
            if let Some(lock) = FileLock::try_acquire(&lock_path)? {
                return Ok(lock);
            }
            let now = Instant::now();
            if now >= deadline {
                if let Some(holder) = lock_holder(&lock_path) {
                    warn!(lock = %lock_path.display(), holder, "vault lock still held");
                }
                return Err(lock_timeout_error(timeout));
            }
            thread::sleep(LOCK_POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Process id recorded in a lock file, if any.
fn lock_holder(lock_path: &Path) -> Option<u32> {
    fs::read_to_string(lock_path).ok()?.trim().parse().ok()
}

/// Write `data` to a fresh file at `path` and flush it to disk.
fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Held advisory lock.  Released on drop.
#[derive(Debug)]
pub struct FileLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
    #[cfg(not(unix))]
    path: PathBuf,
}

#[cfg(unix)]
impl FileLock {
    fn try_acquire(path: &Path) -> Result<Option<Self>> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)?;

        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            file.set_len(0)?;
            write!(file, "{}", std::process::id())?;
            return Ok(Some(Self { file }));
        }

        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::WouldBlock {
            Ok(None)
        } else {
            Err(err.into())
        }
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor is still open; closing it would also unlock.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(not(unix))]
impl FileLock {
    // Without flock, the lock file's existence is the lock.
    fn try_acquire(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                write!(file, "{}", std::process::id())?;
                Ok(Some(Self {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(not(unix))]
impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VaultError;
    use tempfile::TempDir;

    #[test]
    fn load_returns_none_when_missing() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("config.vault"));
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn save_replaces_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("config.vault"));

        storage.save(b"first").unwrap();
        storage.save(b"second").unwrap();

        assert_eq!(storage.load().unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!storage.temp_path().exists());
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("nested/deeper/config.vault"));
        storage.save(b"blob").unwrap();
        assert!(storage.path().exists());
    }

    #[test]
    fn second_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("config.vault"));

        let _held = storage.lock(Duration::from_millis(100)).unwrap();
        let err = storage.lock(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(
            err,
            VaultError::ConcurrentModification { timeout_ms: 30 }
        ));
    }

    #[test]
    fn lock_file_records_the_holder() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("config.vault"));

        let _held = storage.lock(Duration::from_millis(100)).unwrap();
        assert_eq!(lock_holder(&storage.lock_path()), Some(std::process::id()));
    }

    #[cfg(not(unix))]
    #[test]
    fn leftover_lock_file_blocks_writers_until_removed() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("config.vault"));
        fs::write(storage.lock_path(), "4242").unwrap();

        assert!(matches!(
            storage.lock(Duration::from_millis(30)),
            Err(VaultError::ConcurrentModification { .. })
        ));
        assert_eq!(lock_holder(&storage.lock_path()), Some(4242));

        fs::remove_file(storage.lock_path()).unwrap();
        assert!(storage.lock(Duration::from_millis(30)).is_ok());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("config.vault"));

        drop(storage.lock(Duration::from_millis(100)).unwrap());
        assert!(storage.lock(Duration::from_millis(100)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn vault_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("config.vault"));
        storage.save(b"blob").unwrap();

        let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
