// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// POSIX shared memory mapping: shm_open + mmap.
// Segment lifetime is explicit — the owning endpoint unlinks on destroy;
// dropping a mapping only unmaps it.

use std::ffi::CString;
use std::io;
use std::ptr;

/// POSIX shm object names need a leading '/'.
fn posix_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(posix_name(name).into_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// A named, inter-process shared memory mapping.
#[derive(Debug)]
pub struct ShmMapping {
    mem: *mut u8,
    len: usize,
    os_name: String, // POSIX name (with leading '/')
}

// Safety: the mapped region is process-shared by design; access discipline
// is enforced one layer up (atomic header cells, producer/consumer roles).
unsafe impl Send for ShmMapping {}
unsafe impl Sync for ShmMapping {}

impl ShmMapping {
    /// Create a fresh named mapping of exactly `size` bytes.
    ///
    /// A stale object with the same name (left by a crashed owner) is
    /// unlinked first, best-effort.
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let c = c_name(name)?;
        let perms: libc::mode_t = 0o666;

        // Best-effort stale cleanup so create always starts from zeroed pages.
        unsafe { libc::shm_unlink(c.as_ptr()) };

        let fd = unsafe {
            libc::shm_open(
                c.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                perms as libc::c_uint,
            )
        };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        unsafe { libc::fchmod(fd, perms) };

        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c.as_ptr());
            }
            return Err(err);
        }

        Self::mmap_and_finish(fd, size, posix_name(name))
    }

    /// Open an existing named mapping, discovering its size via fstat.
    ///
    /// A missing object surfaces as `io::ErrorKind::NotFound` so attach
    /// loops can distinguish "not yet created" from hard failures.
    pub fn open(name: &str) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }

        let c = c_name(name)?;
        let fd = unsafe { libc::shm_open(c.as_ptr(), libc::O_RDWR, 0o666 as libc::c_uint) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        Self::mmap_and_finish(fd, st.st_size as usize, posix_name(name))
    }

    fn mmap_and_finish(fd: i32, len: usize, os_name: String) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            mem: mem as *mut u8,
            len,
            os_name,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Total mapped size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Remove the OS-level name. The mapping itself stays valid until drop;
    /// already-attached readers keep working.
    pub fn unlink(&self) {
        if let Ok(c) = CString::new(self.os_name.as_bytes()) {
            unsafe { libc::shm_unlink(c.as_ptr()) };
        }
    }

    /// Unlink a named object without an open handle.
    /// Returns `true` iff the object existed and was removed.
    pub fn unlink_by_name(name: &str) -> bool {
        match c_name(name) {
            Ok(c) => unsafe { libc::shm_unlink(c.as_ptr()) == 0 },
            Err(_) => false,
        }
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        if !self.mem.is_null() {
            unsafe { libc::munmap(self.mem as *mut libc::c_void, self.len) };
        }
    }
}
