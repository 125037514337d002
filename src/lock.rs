// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Cross-process advisory lock backed by an OS lock file, used to serialise
// shared-tail advancement between competing consumers.
//
// The lock is advisory and process-scoped: the OS releases it when the
// holding process dies (no stuck-lock recovery needed), but two threads of
// the same process that both open the lock file are NOT mutually excluded.
// Endpoints keep at most one consumer path per handle, so that caveat only
// bites callers who clone their own plumbing.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, ShmError};

/// Sleep between lock retries under contention.
const LOCK_RETRY_SLEEP: Duration = Duration::from_micros(50);

/// Absolute path of the lock file for `name`, under the system temp
/// directory. Slashes in channel names are flattened to underscores.
fn lock_path(name: &str) -> PathBuf {
    let safe = name.replace(['/', '\\'], "_");
    std::env::temp_dir().join(format!("shmcomm_{safe}.lock"))
}

// ---------------------------------------------------------------------------
// OS lock primitives
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn os_try_lock(file: &File) -> Result<bool> {
    use std::os::unix::io::AsRawFd;

    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EWOULDBLOCK) | Some(libc::EINTR) => Ok(false),
        _ => Err(ShmError::Connection(format!("flock failed: {err}"))),
    }
}

#[cfg(unix)]
fn os_unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

#[cfg(windows)]
fn os_try_lock(file: &File) -> Result<bool> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::{ERROR_IO_PENDING, ERROR_LOCK_VIOLATION};
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };

    let mut overlapped: windows_sys::Win32::System::IO::OVERLAPPED =
        unsafe { std::mem::zeroed() };
    let ok = unsafe {
        LockFileEx(
            file.as_raw_handle() as _,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1, // one byte at offset 0
            0,
            &mut overlapped,
        )
    };
    if ok != 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error().map(|e| e as u32) {
        Some(ERROR_LOCK_VIOLATION) | Some(ERROR_IO_PENDING) => Ok(false),
        _ => Err(ShmError::Connection(format!("LockFileEx failed: {err}"))),
    }
}

#[cfg(windows)]
fn os_unlock(file: &File) {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Storage::FileSystem::UnlockFile;

    unsafe { UnlockFile(file.as_raw_handle() as _, 0, 0, 1, 0) };
}

// ---------------------------------------------------------------------------
// FileLock / FileLockGuard
// ---------------------------------------------------------------------------

/// A named cross-process advisory lock.
///
/// Acquisition is scoped: `acquire` hands back a [`FileLockGuard`] that
/// releases the OS lock on every exit path, including panics.
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Create a handle for the lock named `name`, ensuring the lock file
    /// exists.
    pub fn new(name: &str) -> Result<Self> {
        let path = lock_path(name);
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                ShmError::Connection(format!(
                    "cannot create lock file '{}': {e}",
                    path.display()
                ))
            })?;
        Ok(Self { path })
    }

    /// Path of the backing lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, retrying every 50 µs until it is free or `timeout`
    /// elapses. `None` spins indefinitely.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<FileLockGuard> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| {
                ShmError::Connection(format!(
                    "cannot open lock file '{}': {e}",
                    self.path.display()
                ))
            })?;

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if os_try_lock(&file)? {
                debug!(lock = %self.path.display(), "acquired file lock");
                return Ok(FileLockGuard {
                    file: Some(file),
                    path: self.path.clone(),
                });
            }
            if let Some(dl) = deadline {
                if Instant::now() >= dl {
                    return Err(ShmError::Timeout(format!(
                        "could not acquire lock '{}' within {:.3}s",
                        self.path.display(),
                        timeout.unwrap_or(Duration::ZERO).as_secs_f64()
                    )));
                }
            }
            std::thread::sleep(LOCK_RETRY_SLEEP);
        }
    }
}

/// Holds the OS lock; releasing it (and closing the descriptor) happens on
/// drop or through an explicit, idempotent [`release`](Self::release).
#[derive(Debug)]
pub struct FileLockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl FileLockGuard {
    /// Release the lock now instead of at end of scope. Safe to call twice.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            os_unlock(&file);
            debug!(lock = %self.path.display(), "released file lock");
        }
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
