//! # bank-memory
//!
//! Bank-switched RAM for 8/16-bit emulators, with wraparound done by the MMU.
//!
//! A region is 256 banks of 64KiB laid out contiguously, followed by two more
//! 64KiB windows ("bank 256" and "bank 257") that are live aliases of bank 0.
//! An emulator can form `base + (bank << 16) + offset` and let a 16-bit or
//! 24-bit access run off the end: it lands in bank 0 with no modulo, no bounds
//! check and no branch.
//!
//! ## Features
//!
//! - **One backing object**: a single anonymous shared memory object holds
//!   all storage; the alias windows map its first bank again
//! - **All-or-nothing construction**: every setup step is undone if a later
//!   one fails
//! - **Host backends**: memfd/shm + `mmap` on Linux and unix, `vm_remap` on
//!   macOS, sections + `MapViewOfFileEx` on Windows
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bank_memory::prelude::*;
//!
//! let memory = BankMemory::new()?;
//! unsafe {
//!     *memory.alias_ptr().add(10) = 0x42;
//!     assert_eq!(*memory.primary_ptr().add(10), 0x42);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod memory;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::memory::{
        AliasBackend, BANK_SIZE, BankMemory, BankMemoryConfig, HostBackend, NativeError,
    };
}

pub use error::{Error, ErrorKind, Result};
pub use memory::{BankMemory, BankMemoryConfig};
