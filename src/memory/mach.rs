//! Mach backend for macOS and iOS.
//!
//! XNU can share pages between two ranges of the same task directly with
//! `vm_remap(copy = false)`. The backing object is an anonymous region from
//! `vm_allocate`; each window is remapped from it with
//! `VM_FLAGS_FIXED | VM_FLAGS_OVERWRITE` over the placeholder reservation.
//! Once all three windows exist the source region can go away: the windows
//! keep the VM object alive.

use super::{AliasBackend, KernReturn, NativeError};
use std::ptr::NonNull;

#[allow(non_camel_case_types)]
mod ffi {
    pub type kern_return_t = i32;
    pub type mach_port_t = u32;
    pub type vm_map_t = mach_port_t;
    pub type vm_address_t = usize;
    pub type vm_size_t = usize;
    pub type vm_prot_t = i32;
    pub type vm_inherit_t = u32;
    pub type boolean_t = u32;

    pub const VM_FLAGS_FIXED: i32 = 0x0000;
    pub const VM_FLAGS_ANYWHERE: i32 = 0x0001;
    pub const VM_FLAGS_OVERWRITE: i32 = 0x4000;
    pub const VM_PROT_NONE: vm_prot_t = 0x00;
    pub const VM_INHERIT_NONE: vm_inherit_t = 2;
    pub const FALSE: boolean_t = 0;

    unsafe extern "C" {
        pub static mach_task_self_: mach_port_t;

        pub fn vm_allocate(
            target_task: vm_map_t,
            address: *mut vm_address_t,
            size: vm_size_t,
            flags: i32,
        ) -> kern_return_t;

        pub fn vm_deallocate(
            target_task: vm_map_t,
            address: vm_address_t,
            size: vm_size_t,
        ) -> kern_return_t;

        pub fn vm_remap(
            target_task: vm_map_t,
            target_address: *mut vm_address_t,
            size: vm_size_t,
            mask: vm_address_t,
            flags: i32,
            src_task: vm_map_t,
            src_address: vm_address_t,
            copy: boolean_t,
            cur_protection: *mut vm_prot_t,
            max_protection: *mut vm_prot_t,
            inheritance: vm_inherit_t,
        ) -> kern_return_t;
    }

    #[inline]
    pub fn mach_task_self() -> mach_port_t {
        // SAFETY: initialised by libsystem before main and never written again.
        unsafe { mach_task_self_ }
    }
}

fn check(kr: ffi::kern_return_t) -> Result<(), NativeError> {
    let kr = KernReturn(kr);
    if kr.is_success() {
        Ok(())
    } else {
        Err(NativeError::Kern(kr))
    }
}

/// The anonymous VM region every window is remapped from.
///
/// Deallocating it drops this region's reference to the VM object only;
/// remapped windows keep their pages.
#[derive(Debug)]
pub struct MemoryEntry {
    addr: ffi::vm_address_t,
    len: usize,
}

impl Drop for MemoryEntry {
    fn drop(&mut self) {
        let kr = unsafe { ffi::vm_deallocate(ffi::mach_task_self(), self.addr, self.len) };
        if let Err(err) = check(kr) {
            tracing::warn!(addr = self.addr, error = %err, "vm_deallocate of backing region failed");
        }
    }
}

/// Backend for Apple hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachBackend;

impl MachBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl AliasBackend for MachBackend {
    type Store = MemoryEntry;

    const HOLDS_RESERVATION: bool = true;

    fn reserve(&self, len: usize) -> Result<NonNull<u8>, NativeError> {
        let mut addr: ffi::vm_address_t = 0;
        check(unsafe {
            ffi::vm_allocate(ffi::mach_task_self(), &mut addr, len, ffi::VM_FLAGS_ANYWHERE)
        })?;

        NonNull::new(addr as *mut u8).ok_or(NativeError::Kern(KernReturn::NO_SPACE))
    }

    unsafe fn release(&self, base: NonNull<u8>, len: usize) -> Result<(), NativeError> {
        check(unsafe { ffi::vm_deallocate(ffi::mach_task_self(), base.as_ptr() as usize, len) })
    }

    fn create_backing_store(&self, _name: &str, len: usize) -> Result<MemoryEntry, NativeError> {
        // Mach VM objects are anonymous; there is no name to publish.
        let mut addr: ffi::vm_address_t = 0;
        check(unsafe {
            ffi::vm_allocate(ffi::mach_task_self(), &mut addr, len, ffi::VM_FLAGS_ANYWHERE)
        })?;

        Ok(MemoryEntry { addr, len })
    }

    unsafe fn map_fixed(
        &self,
        store: &MemoryEntry,
        target: NonNull<u8>,
        len: usize,
    ) -> Result<NonNull<u8>, NativeError> {
        let task = ffi::mach_task_self();
        let mut addr = target.as_ptr() as ffi::vm_address_t;
        let mut cur_prot = ffi::VM_PROT_NONE;
        let mut max_prot = ffi::VM_PROT_NONE;

        check(unsafe {
            ffi::vm_remap(
                task,
                &mut addr,
                len,
                0,
                ffi::VM_FLAGS_FIXED | ffi::VM_FLAGS_OVERWRITE,
                task,
                store.addr,
                ffi::FALSE,
                &mut cur_prot,
                &mut max_prot,
                ffi::VM_INHERIT_NONE,
            )
        })?;

        NonNull::new(addr as *mut u8).ok_or(NativeError::Misplaced {
            requested: target.as_ptr() as usize,
            actual: 0,
        })
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, len: usize) -> Result<(), NativeError> {
        check(unsafe { ffi::vm_deallocate(ffi::mach_task_self(), addr.as_ptr() as usize, len) })
    }
}
