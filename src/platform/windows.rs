// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Windows shared memory mapping via pagefile-backed file mappings.
// There is no unlink concept: a mapping object disappears when the last
// handle closes, so stale-segment cleanup and force-unlink are no-ops.

use std::io;
use std::ptr;

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// A named, inter-process shared memory mapping.
#[derive(Debug)]
pub struct ShmMapping {
    handle: windows_sys::Win32::Foundation::HANDLE,
    mem: *mut u8,
    len: usize,
}

unsafe impl Send for ShmMapping {}
unsafe impl Sync for ShmMapping {}

impl ShmMapping {
    /// Create a named mapping of exactly `size` bytes.
    ///
    /// An existing object cannot be unlinked on Windows, and reusing one
    /// would leave `len` describing a view the backing allocation may not
    /// cover, so creation fails with `AlreadyExists` instead of reusing.
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        use windows_sys::Win32::Foundation::{
            CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, INVALID_HANDLE_VALUE,
        };
        use windows_sys::Win32::System::Memory::{
            CreateFileMappingW, PAGE_READWRITE, SEC_COMMIT,
        };

        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let wide_name = to_wide(name);
        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                ptr::null(),
                PAGE_READWRITE | SEC_COMMIT,
                (size as u64 >> 32) as u32,
                size as u32,
                wide_name.as_ptr(),
            )
        };
        let err = unsafe { GetLastError() };
        if err == ERROR_ALREADY_EXISTS {
            // CreateFileMappingW opened the existing object; its size is
            // whatever the first creator asked for, not ours.
            if handle != 0 {
                unsafe { CloseHandle(handle) };
            }
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "shm already exists",
            ));
        }
        if handle == 0 {
            return Err(io::Error::last_os_error());
        }

        Self::map_view(handle, size)
    }

    /// Open an existing named mapping, discovering its size via VirtualQuery.
    pub fn open(name: &str) -> io::Result<Self> {
        use windows_sys::Win32::System::Memory::{OpenFileMappingW, FILE_MAP_ALL_ACCESS};

        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }

        let wide_name = to_wide(name);
        let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide_name.as_ptr()) };
        if handle == 0 {
            // ERROR_FILE_NOT_FOUND maps to NotFound; attach loops retry it.
            return Err(io::Error::last_os_error());
        }

        Self::map_view(handle, 0)
    }

    fn map_view(
        handle: windows_sys::Win32::Foundation::HANDLE,
        known_size: usize,
    ) -> io::Result<Self> {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Memory::{
            MapViewOfFile, UnmapViewOfFile, VirtualQuery, FILE_MAP_ALL_ACCESS,
            MEMORY_BASIC_INFORMATION,
        };

        let mem = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if mem.is_null() {
            let e = io::Error::last_os_error();
            unsafe { CloseHandle(handle) };
            return Err(e);
        }

        let len = if known_size != 0 {
            known_size
        } else {
            let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
            let ret = unsafe {
                VirtualQuery(
                    mem as *const _,
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if ret == 0 {
                let e = io::Error::last_os_error();
                unsafe {
                    UnmapViewOfFile(mem);
                    CloseHandle(handle);
                }
                return Err(e);
            }
            info.RegionSize
        };

        Ok(Self {
            handle,
            mem: mem as *mut u8,
            len,
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

    /// No unlink concept on Windows — the object dies with its last handle.
    pub fn unlink(&self) {}

    /// No unlink concept on Windows; reports nothing removed.
    pub fn unlink_by_name(_name: &str) -> bool {
        false
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Memory::UnmapViewOfFile;

        if !self.mem.is_null() {
            unsafe { UnmapViewOfFile(self.mem as *const _) };
        }
        if self.handle != 0 {
            unsafe { CloseHandle(self.handle) };
        }
    }
}
