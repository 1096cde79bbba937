//! POSIX backend using memfd / POSIX shared memory and `mmap`.
//!
//! The reservation is a `PROT_NONE` private anonymous mapping that stays in
//! place as a placeholder; the three shared mappings are laid over it with
//! `MAP_FIXED`, which replaces the placeholder pages atomically. Nothing else
//! can be mapped into the range in between.
//!
//! The backing object is a memfd where the kernel has one, and a POSIX
//! shared memory object otherwise. The shared memory name is unlinked as soon
//! as the object exists, so its lifetime is governed by open descriptors and
//! live mappings only.

use super::{AliasBackend, NativeError};
use rustix::fd::OwnedFd;
use rustix::mm::{MapFlags, ProtFlags};
use std::ptr::NonNull;

/// Backend for Linux and other unix hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixBackend;

impl PosixBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn create_memfd(name: &str) -> Result<OwnedFd, NativeError> {
        let fd = rustix::fs::memfd_create(name, rustix::fs::MemfdFlags::CLOEXEC)?;
        Ok(fd)
    }

    fn create_shm(name: &str) -> Result<OwnedFd, NativeError> {
        use rustix::fs::Mode;
        use rustix::shm;

        // Portable shm names are a single path component with a leading slash.
        let path = format!("/{name}");
        let fd = shm::open(
            path.as_str(),
            shm::OFlags::CREATE | shm::OFlags::EXCL | shm::OFlags::RDWR,
            Mode::RUSR | Mode::WUSR,
        )?;

        if let Err(errno) = shm::unlink(path.as_str()) {
            // A name we cannot remove would outlive the process.
            tracing::warn!(name = %path, error = %errno, "shm_unlink failed");
            return Err(errno.into());
        }

        Ok(fd)
    }
}

impl AliasBackend for PosixBackend {
    type Store = OwnedFd;

    const HOLDS_RESERVATION: bool = true;

    fn reserve(&self, len: usize) -> Result<NonNull<u8>, NativeError> {
        let ptr = unsafe {
            rustix::mm::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::empty(),
                MapFlags::PRIVATE,
            )?
        };

        NonNull::new(ptr.cast::<u8>()).ok_or(rustix::io::Errno::NOMEM.into())
    }

    unsafe fn release(&self, base: NonNull<u8>, len: usize) -> Result<(), NativeError> {
        unsafe { rustix::mm::munmap(base.as_ptr().cast(), len)? };
        Ok(())
    }

    fn create_backing_store(&self, name: &str, len: usize) -> Result<OwnedFd, NativeError> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let fd = match Self::create_memfd(name) {
            Ok(fd) => fd,
            Err(err) => {
                tracing::debug!(error = %err, "memfd_create unavailable, using shm_open");
                Self::create_shm(name)?
            }
        };

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let fd = Self::create_shm(name)?;

        // fd closes on drop if sizing fails.
        rustix::fs::ftruncate(&fd, len as u64)?;

        Ok(fd)
    }

    unsafe fn map_fixed(
        &self,
        store: &OwnedFd,
        target: NonNull<u8>,
        len: usize,
    ) -> Result<NonNull<u8>, NativeError> {
        let ptr = unsafe {
            rustix::mm::mmap(
                target.as_ptr().cast(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED | MapFlags::FIXED,
                store,
                0,
            )?
        };

        NonNull::new(ptr.cast::<u8>()).ok_or(NativeError::Misplaced {
            requested: target.as_ptr() as usize,
            actual: 0,
        })
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, len: usize) -> Result<(), NativeError> {
        unsafe { rustix::mm::munmap(addr.as_ptr().cast(), len)? };
        Ok(())
    }
}
