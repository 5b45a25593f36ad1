//! Cross-process advisory locking for the download critical section.
//!
//! Contenders poll a non-blocking exclusive lock with capped backoff until a
//! deadline, so a stuck holder surfaces as [`ProvisionError::LockTimeout`]
//! rather than a hang. On Unix the lock is `flock(2)`; on Windows it is
//! `LockFileEx` via [`std::fs::File::try_lock`].

use std::fs::{File, OpenOptions};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};
use crate::observability::LOCK_TARGET;

const INITIAL_BACKOFF: Duration = Duration::from_millis(25);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Guard holding an exclusive lock on a lock file until dropped.
///
/// Dropping the guard deletes the lock file and releases the lock. Waiters
/// that were blocked on the deleted file notice the replacement and retry.
#[derive(Debug)]
pub struct AdvisoryLock {
    file: File,
    path: Utf8PathBuf,
}

impl AdvisoryLock {
    /// Acquires an exclusive lock on `lock_path`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::LockTimeout`] when the deadline passes and
    /// [`ProvisionError::Io`] when the lock file cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use camino::Utf8Path;
    /// use yq_provision::lock::AdvisoryLock;
    ///
    /// let guard = AdvisoryLock::acquire(
    ///     Utf8Path::new("/tmp/yq-linux-amd64-v4.52.2.lock"),
    ///     Duration::from_secs(5),
    /// )?;
    /// // Exclusive access to the download target until `guard` drops.
    /// drop(guard);
    /// # Ok::<(), yq_provision::ProvisionError>(())
    /// ```
    pub fn acquire(lock_path: &Utf8Path, timeout: Duration) -> ProvisionResult<Self> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let file = open_lock_file(lock_path)?;
            loop {
                if try_lock(&file).map_err(|err| ProvisionError::io("lock", lock_path, err))? {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(ProvisionError::LockTimeout {
                        lock_path: lock_path.to_path_buf(),
                        waited: now.duration_since(started),
                    });
                }
                thread::sleep(backoff.min(deadline - now));
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }

            if still_names_locked_file(lock_path, &file) {
                debug!(
                    target: LOCK_TARGET,
                    path = %lock_path,
                    waited_ms = started.elapsed().as_millis(),
                    "download lock acquired"
                );
                return Ok(Self {
                    file,
                    path: lock_path.to_path_buf(),
                });
            }
            debug!(target: LOCK_TARGET, path = %lock_path, "lock file replaced while waiting; retrying");
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        // Unlink while still holding the lock so no newcomer can lock the
        // old inode after it has been orphaned.
        #[cfg(unix)]
        remove_lock_file(&self.path);
        if let Err(err) = unlock(&self.file) {
            debug!(target: LOCK_TARGET, path = %self.path, error = %err, "failed to release download lock");
        }
        #[cfg(not(unix))]
        remove_lock_file(&self.path);
        debug!(target: LOCK_TARGET, path = %self.path, "download lock released");
    }
}

fn open_lock_file(path: &Utf8Path) -> ProvisionResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|err| ProvisionError::io("open lock file", path, err))
}

fn remove_lock_file(path: &Utf8Path) {
    if let Err(err) = std::fs::remove_file(path)
        && err.kind() != io::ErrorKind::NotFound
    {
        debug!(target: LOCK_TARGET, path = %path, error = %err, "failed to remove lock file");
    }
}

/// Attempts a non-blocking exclusive lock; `Ok(false)` means contended.
#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: The descriptor comes from a `File` borrowed for the duration of
    // the call, so it stays open and valid while `flock` runs.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EINTR) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn try_lock(file: &File) -> io::Result<bool> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(std::fs::TryLockError::WouldBlock) => Ok(false),
        Err(std::fs::TryLockError::Error(err)) => Err(err),
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: As in `try_lock`, the descriptor is owned by `file` for the
    // whole call.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn unlock(file: &File) -> io::Result<()> {
    file.unlock()
}

/// Confirms `path` still refers to the inode behind `file`.
#[cfg(unix)]
fn still_names_locked_file(path: &Utf8Path, file: &File) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (std::fs::metadata(path), file.metadata()) {
        (Ok(on_disk), Ok(held)) => on_disk.dev() == held.dev() && on_disk.ino() == held.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
const fn still_names_locked_file(_path: &Utf8Path, _file: &File) -> bool {
    true
}
