//! Windows backend using pagefile-backed sections.
//!
//! Windows has no way to overlay a view on top of a reserved range, so the
//! reservation is a probe: `VirtualAlloc(MEM_RESERVE)` finds a free range
//! aligned to the 64KiB allocation granularity and `VirtualFree` gives it
//! straight back. The views are then placed there with `MapViewOfFileEx`.
//! Another thread can take the range in between; the setup protocol treats
//! that as a lost race and probes again.

use super::{AliasBackend, NativeError, Win32Error};
use std::ffi::c_void;
use std::ptr::NonNull;

#[allow(non_snake_case, clippy::upper_case_acronyms)]
mod ffi {
    use std::ffi::c_void;

    pub type HANDLE = *mut c_void;
    pub type BOOL = i32;

    pub const INVALID_HANDLE_VALUE: HANDLE = -1isize as HANDLE;
    pub const PAGE_NOACCESS: u32 = 0x01;
    pub const PAGE_READWRITE: u32 = 0x04;
    pub const MEM_RESERVE: u32 = 0x2000;
    pub const MEM_RELEASE: u32 = 0x8000;
    pub const FILE_MAP_WRITE: u32 = 0x0002;
    pub const FILE_MAP_READ: u32 = 0x0004;

    #[link(name = "kernel32")]
    unsafe extern "system" {
        pub fn CreateFileMappingW(
            hFile: HANDLE,
            lpFileMappingAttributes: *const c_void,
            flProtect: u32,
            dwMaximumSizeHigh: u32,
            dwMaximumSizeLow: u32,
            lpName: *const u16,
        ) -> HANDLE;

        pub fn MapViewOfFileEx(
            hFileMappingObject: HANDLE,
            dwDesiredAccess: u32,
            dwFileOffsetHigh: u32,
            dwFileOffsetLow: u32,
            dwNumberOfBytesToMap: usize,
            lpBaseAddress: *mut c_void,
        ) -> *mut c_void;

        pub fn UnmapViewOfFile(lpBaseAddress: *const c_void) -> BOOL;

        pub fn VirtualAlloc(
            lpAddress: *mut c_void,
            dwSize: usize,
            flAllocationType: u32,
            flProtect: u32,
        ) -> *mut c_void;

        pub fn VirtualFree(lpAddress: *mut c_void, dwSize: usize, dwFreeType: u32) -> BOOL;

        pub fn CloseHandle(hObject: HANDLE) -> BOOL;

        pub fn GetLastError() -> u32;
    }
}

fn last_error() -> NativeError {
    NativeError::Win32(Win32Error(unsafe { ffi::GetLastError() }))
}

/// An unnamed section object backed by the paging file.
#[derive(Debug)]
pub struct SectionHandle(ffi::HANDLE);

impl Drop for SectionHandle {
    fn drop(&mut self) {
        if unsafe { ffi::CloseHandle(self.0) } == 0 {
            tracing::warn!(error = %last_error(), "CloseHandle on section failed");
        }
    }
}

// SAFETY: a section handle is a kernel object reference that any thread of
// the process may use or close; the wrapper only closes it once, on drop.
unsafe impl Send for SectionHandle {}
// SAFETY: `&SectionHandle` only exposes the handle to MapViewOfFileEx, which
// is safe to call concurrently on the same section.
unsafe impl Sync for SectionHandle {}

/// Backend for Windows hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl AliasBackend for WindowsBackend {
    type Store = SectionHandle;

    const HOLDS_RESERVATION: bool = false;

    fn reserve(&self, len: usize) -> Result<NonNull<u8>, NativeError> {
        let ptr = unsafe {
            ffi::VirtualAlloc(std::ptr::null_mut(), len, ffi::MEM_RESERVE, ffi::PAGE_NOACCESS)
        };
        let base = NonNull::new(ptr.cast::<u8>()).ok_or_else(last_error)?;

        // Views cannot be placed over a reservation; hand the range back and
        // remember where it was.
        if unsafe { ffi::VirtualFree(ptr, 0, ffi::MEM_RELEASE) } == 0 {
            return Err(last_error());
        }

        Ok(base)
    }

    unsafe fn release(&self, _base: NonNull<u8>, _len: usize) -> Result<(), NativeError> {
        // The probe was already released in `reserve`.
        Ok(())
    }

    fn create_backing_store(&self, _name: &str, len: usize) -> Result<SectionHandle, NativeError> {
        let size = len as u64;
        let handle = unsafe {
            ffi::CreateFileMappingW(
                ffi::INVALID_HANDLE_VALUE,
                std::ptr::null(),
                ffi::PAGE_READWRITE,
                (size >> 32) as u32,
                size as u32,
                std::ptr::null(),
            )
        };

        // Failure is NULL here, not INVALID_HANDLE_VALUE.
        if handle.is_null() {
            return Err(last_error());
        }

        Ok(SectionHandle(handle))
    }

    unsafe fn map_fixed(
        &self,
        store: &SectionHandle,
        target: NonNull<u8>,
        len: usize,
    ) -> Result<NonNull<u8>, NativeError> {
        let ptr = unsafe {
            ffi::MapViewOfFileEx(
                store.0,
                ffi::FILE_MAP_READ | ffi::FILE_MAP_WRITE,
                0,
                0,
                len,
                target.as_ptr().cast::<c_void>(),
            )
        };

        NonNull::new(ptr.cast::<u8>()).ok_or_else(last_error)
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, _len: usize) -> Result<(), NativeError> {
        if unsafe { ffi::UnmapViewOfFile(addr.as_ptr().cast::<c_void>()) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }
}
