//! Host capability interface for virtual memory aliasing.
//!
//! A backend knows how to do five things on its host: reserve a range of
//! address space, create one anonymous shareable memory object, map that
//! object at an exact address, unmap a range, and release the reservation.
//! The aliasing protocol in [`setup`](super::setup) is written once against
//! this trait; the host implementation is picked at build time and exported
//! as [`HostBackend`](super::HostBackend).

use super::NativeError;
use super::layout::{BANK_SIZE, PRIMARY_LEN};
use std::ptr::NonNull;

/// Virtual memory primitives needed to build an aliased bank region.
///
/// # Safety contract
///
/// The `unsafe` methods operate on raw address ranges. Callers must only
/// pass ranges that lie inside a reservation obtained from [`reserve`] on the
/// same backend, and must not touch memory in a range after unmapping or
/// releasing it.
///
/// [`reserve`]: AliasBackend::reserve
pub trait AliasBackend {
    /// Handle to the backing object. Dropping it closes the handle; mappings
    /// already made from it stay valid.
    type Store;

    /// Whether [`reserve`](Self::reserve) leaves a placeholder mapping in
    /// place (true), or only probes for a free range and gives it back
    /// (false). Probed ranges can be lost to another thread before the
    /// primary window lands.
    const HOLDS_RESERVATION: bool;

    /// Find a free range of `len` bytes.
    fn reserve(&self, len: usize) -> Result<NonNull<u8>, NativeError>;

    /// Release a reservation made by [`reserve`](Self::reserve).
    ///
    /// When [`HOLDS_RESERVATION`](Self::HOLDS_RESERVATION) is true this also
    /// removes every window mapped inside the range.
    ///
    /// # Safety
    ///
    /// `base` and `len` must describe a range returned by `reserve`.
    unsafe fn release(&self, base: NonNull<u8>, len: usize) -> Result<(), NativeError>;

    /// Create an anonymous, shareable memory object of `len` bytes.
    ///
    /// `name` is a debug name. Backends that must publish a name in a global
    /// namespace remove it again before returning.
    fn create_backing_store(&self, name: &str, len: usize) -> Result<Self::Store, NativeError>;

    /// Map `len` bytes from offset 0 of `store` read/write at exactly
    /// `target`, replacing whatever placeholder occupies that range.
    ///
    /// Returns the address the host reports. The caller checks that it
    /// equals `target`.
    ///
    /// # Safety
    ///
    /// `target..target + len` must lie inside this backend's reservation.
    unsafe fn map_fixed(
        &self,
        store: &Self::Store,
        target: NonNull<u8>,
        len: usize,
    ) -> Result<NonNull<u8>, NativeError>;

    /// Unmap a range made by [`map_fixed`](Self::map_fixed).
    ///
    /// # Safety
    ///
    /// No references into the range may outlive this call.
    unsafe fn unmap(&self, addr: NonNull<u8>, len: usize) -> Result<(), NativeError>;

    /// Map the full bank set at the reservation base.
    ///
    /// # Safety
    ///
    /// See [`map_fixed`](Self::map_fixed).
    unsafe fn map_primary(
        &self,
        store: &Self::Store,
        base: NonNull<u8>,
    ) -> Result<NonNull<u8>, NativeError> {
        unsafe { self.map_fixed(store, base, PRIMARY_LEN) }
    }

    /// Map bank 0 of the store again at `target`.
    ///
    /// # Safety
    ///
    /// See [`map_fixed`](Self::map_fixed).
    unsafe fn map_alias(
        &self,
        store: &Self::Store,
        target: NonNull<u8>,
    ) -> Result<NonNull<u8>, NativeError> {
        unsafe { self.map_fixed(store, target, BANK_SIZE) }
    }
}
