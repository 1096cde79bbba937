//! Aliased bank memory.
//!
//! This module builds the 258-bank region that [`BankMemory`] owns.
//!
//! # Architecture
//!
//! - [`AliasBackend`]: The five host primitives (reserve, create backing
//!   store, map primary, map alias, release), one implementation per host,
//!   exported as [`HostBackend`]
//! - `setup`: The reservation → backing store → alias mapping sequence, with
//!   an undo list that unwinds on any failure
//! - [`BankMemory`]: Move-only owner of the result
//! - [`NativeError`]: Mach, Win32 and errno failures, kept verbatim
//!
//! # Example
//!
//! ```rust,ignore
//! use bank_memory::memory::{BankMemory, BANK_SIZE};
//!
//! let memory = BankMemory::new()?;
//!
//! // A 16-bit access at bank 0xFF, offset 0xFFFF straddles into "bank 256",
//! // which is bank 0.
//! unsafe {
//!     let p = memory.primary_ptr().add(0xFF * BANK_SIZE + 0xFFFF);
//!     p.cast::<[u8; 2]>().write([0x34, 0x12]);
//!     assert_eq!(*memory.primary_ptr(), 0x12);
//! }
//! ```

mod backend;
mod bank;
mod config;
mod kern;
pub mod layout;
mod native;
mod rollback;
mod setup;

#[cfg(all(
    unix,
    not(all(any(target_os = "macos", target_os = "ios"), not(feature = "posix-shm")))
))]
mod posix;
#[cfg(all(
    unix,
    not(all(any(target_os = "macos", target_os = "ios"), not(feature = "posix-shm")))
))]
pub use posix::PosixBackend as HostBackend;

#[cfg(all(any(target_os = "macos", target_os = "ios"), not(feature = "posix-shm")))]
mod mach;
#[cfg(all(any(target_os = "macos", target_os = "ios"), not(feature = "posix-shm")))]
pub use mach::{MachBackend as HostBackend, MemoryEntry};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{SectionHandle, WindowsBackend as HostBackend};

#[cfg(not(any(unix, windows)))]
compile_error!("bank-memory needs a host with shared memory remapping (unix or windows)");

pub use backend::AliasBackend;
pub use bank::BankMemory;
pub use config::{BankMemoryConfig, DEFAULT_NAME_PREFIX, DEFAULT_PROBE_ATTEMPTS};
pub use kern::KernReturn;
pub use layout::{ALIAS_LEN, ALIAS_WINDOWS, BANK_COUNT, BANK_SIZE, PRIMARY_LEN, TOTAL_LEN, Window};
pub use native::{NativeError, Win32Error};
