//! Owning handle for an aliased bank region.

use super::config::BankMemoryConfig;
use super::layout::TOTAL_LEN;
use super::setup::{self, Region};
use super::{AliasBackend, HostBackend};
use crate::error::Result;
use std::fmt;

/// 256 banks of 64KiB followed by two live aliases of bank 0.
///
/// `primary_ptr()[bank * 0x10000 + offset]` addresses bank storage directly.
/// The 128KiB at `alias_ptr()` are bank 0 twice over, so bank-crossing and
/// zero-page-crossing accesses that run past bank 255 read and write bank 0
/// without any masking.
///
/// The handle owns the mappings and the backing object. It cannot be cloned;
/// moving it moves ownership, and `std::mem::take` moves the region out and
/// leaves a torn-down handle behind.
///
/// # Example
///
/// ```rust,no_run
/// use bank_memory::BankMemory;
///
/// let memory = BankMemory::new()?;
/// unsafe {
///     *memory.primary_ptr() = 0xAA;
///     assert_eq!(*memory.alias_ptr(), 0xAA);
///     assert_eq!(*memory.alias_ptr().add(0x1_0000), 0xAA);
/// }
/// # Ok::<(), bank_memory::Error>(())
/// ```
pub struct BankMemory<B: AliasBackend = HostBackend> {
    backend: B,
    region: Option<Region<B::Store>>,
}

impl BankMemory<HostBackend> {
    /// Build a region on the host backend with default options.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the setup sequence; everything set up
    /// before it has already been released.
    pub fn new() -> Result<Self> {
        Self::with_config(&BankMemoryConfig::default())
    }

    /// Build a region on the host backend.
    pub fn with_config(config: &BankMemoryConfig) -> Result<Self> {
        Self::with_backend(HostBackend::default(), config)
    }
}

impl<B: AliasBackend> BankMemory<B> {
    /// Build a region with an explicit backend.
    pub fn with_backend(backend: B, config: &BankMemoryConfig) -> Result<Self> {
        let region = setup::establish(&backend, config)?;
        Ok(Self {
            backend,
            region: Some(region),
        })
    }

    /// A handle that owns nothing.
    pub fn torn_down(backend: B) -> Self {
        Self {
            backend,
            region: None,
        }
    }

    /// Start of the 256 primary banks, or null once torn down.
    #[inline]
    pub fn primary_ptr(&self) -> *mut u8 {
        self.region
            .as_ref()
            .map_or(std::ptr::null_mut(), |region| region.base.as_ptr())
    }

    /// Start of the alias window pair, or null once torn down.
    ///
    /// Always `primary_ptr() + 256 * 0x10000` while live.
    #[inline]
    pub fn alias_ptr(&self) -> *mut u8 {
        self.region
            .as_ref()
            .map_or(std::ptr::null_mut(), |region| region.alias.as_ptr())
    }

    /// Whether the region is mapped.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.region.is_some()
    }

    /// Bytes addressable from `primary_ptr()`, alias windows included.
    #[inline]
    pub fn len(&self) -> usize {
        if self.is_live() { TOTAL_LEN } else { 0 }
    }

    /// Returns true once torn down.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.is_live()
    }

    /// The backend this region was built with.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The whole 258-bank span as a byte slice.
    ///
    /// The last 128KiB repeat bank 0.
    ///
    /// # Safety
    ///
    /// The caller must ensure no mutable references to the region exist.
    /// Note that the alias windows make the slice overlap itself.
    pub unsafe fn as_slice(&self) -> &[u8] {
        match &self.region {
            // SAFETY: TOTAL_LEN bytes are mapped at base while live.
            Some(region) => unsafe { std::slice::from_raw_parts(region.base.as_ptr(), TOTAL_LEN) },
            None => &[],
        }
    }

    /// The whole 258-bank span as a mutable byte slice.
    ///
    /// # Safety
    ///
    /// No raw pointer obtained from [`primary_ptr`](Self::primary_ptr) or
    /// [`alias_ptr`](Self::alias_ptr) may be used while the slice is alive,
    /// and writes through one alias are visible through the others.
    pub unsafe fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        self.region
            .as_ref()
            .map(|region| unsafe { std::slice::from_raw_parts_mut(region.base.as_ptr(), TOTAL_LEN) })
    }

    /// Unmap everything and free the backing object.
    ///
    /// Idempotent: calling it on a torn-down handle does nothing. Failures of
    /// individual steps are logged and never stop the remaining steps.
    pub fn teardown(&mut self) {
        if let Some(region) = self.region.take() {
            let failed = region.teardown(&self.backend);
            if failed == 0 {
                tracing::debug!("bank memory torn down");
            } else {
                tracing::warn!(failed, "bank memory torn down with cleanup errors");
            }
        }
    }
}

impl<B: AliasBackend + Default> Default for BankMemory<B> {
    /// The torn-down state.
    fn default() -> Self {
        Self::torn_down(B::default())
    }
}

impl<B: AliasBackend> Drop for BankMemory<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<B: AliasBackend> fmt::Debug for BankMemory<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankMemory")
            .field("primary", &self.primary_ptr())
            .field("alias", &self.alias_ptr())
            .field("live", &self.is_live())
            .finish()
    }
}
