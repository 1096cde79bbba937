//! Error types for bank memory.

use crate::memory::{NativeError, Window};
use thiserror::Error;

/// Result type alias using this crate's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], independent of the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No contiguous virtual range of the required size was available.
    ReservationFailed,
    /// The host refused to create the shared backing object.
    BackingStoreCreationFailed,
    /// The primary fixed-address mapping failed.
    MappingFailed,
    /// One of the alias windows failed to map.
    AliasMappingFailed,
    /// A rollback or teardown step failed. Logged, never returned.
    CleanupError,
}

/// Main error type for bank memory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No free virtual range of `len` bytes could be reserved.
    ///
    /// `lost_race` is set when the range was found but another mapping took
    /// it before the primary window could be placed there.
    #[error("could not reserve {len:#x} bytes of address space: {source}")]
    ReservationFailed {
        /// Requested reservation size.
        len: usize,
        /// Whether the reserved range was claimed by someone else.
        lost_race: bool,
        /// Native cause.
        #[source]
        source: NativeError,
    },

    /// The anonymous shared backing object could not be created.
    #[error("could not create backing store `{name}`: {source}")]
    BackingStoreCreationFailed {
        /// Debug name given to the object.
        name: String,
        /// Native cause.
        #[source]
        source: NativeError,
    },

    /// The primary window could not be mapped at the reserved base.
    #[error("primary mapping at {target:#x} failed: {source}")]
    MappingFailed {
        /// Requested address.
        target: usize,
        /// Native cause.
        #[source]
        source: NativeError,
    },

    /// An alias window could not be mapped directly after the primary one.
    #[error("{window} mapping at {target:#x} failed: {source}")]
    AliasMappingFailed {
        /// Which alias window.
        window: Window,
        /// Requested address.
        target: usize,
        /// Native cause.
        #[source]
        source: NativeError,
    },

    /// A rollback or teardown step failed.
    #[error("cleanup step `{step}` failed: {source}")]
    CleanupFailed {
        /// Label of the step.
        step: &'static str,
        /// Native cause.
        #[source]
        source: NativeError,
    },
}

impl Error {
    /// The platform-independent classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ReservationFailed { .. } => ErrorKind::ReservationFailed,
            Error::BackingStoreCreationFailed { .. } => ErrorKind::BackingStoreCreationFailed,
            Error::MappingFailed { .. } => ErrorKind::MappingFailed,
            Error::AliasMappingFailed { .. } => ErrorKind::AliasMappingFailed,
            Error::CleanupFailed { .. } => ErrorKind::CleanupError,
        }
    }

    /// The native error that caused this failure.
    pub fn native(&self) -> NativeError {
        match self {
            Error::ReservationFailed { source, .. }
            | Error::BackingStoreCreationFailed { source, .. }
            | Error::MappingFailed { source, .. }
            | Error::AliasMappingFailed { source, .. }
            | Error::CleanupFailed { source, .. } => *source,
        }
    }

    /// Build the mapping error matching `window`.
    pub(crate) fn mapping(window: Window, target: usize, source: NativeError) -> Self {
        if window.is_alias() {
            Error::AliasMappingFailed {
                window,
                target,
                source,
            }
        } else {
            Error::MappingFailed { target, source }
        }
    }
}
