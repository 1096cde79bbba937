//! Native error values from the three host error domains.
//!
//! Every backend reports failures in its own vocabulary: Mach kernel calls
//! return a `kern_return_t`, Win32 calls leave a code in `GetLastError()`,
//! and POSIX calls set `errno`. [`NativeError`] keeps the original value
//! intact so it can be logged with its symbolic name, and offers a portable
//! [`io::ErrorKind`] for callers that only want a coarse classification.

use super::kern::KernReturn;
use std::fmt;
use std::io;

/// A Win32 error code as returned by `GetLastError()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Win32Error(pub u32);

impl Win32Error {
    /// `ERROR_ACCESS_DENIED`
    pub const ACCESS_DENIED: Win32Error = Win32Error(5);
    /// `ERROR_INVALID_HANDLE`
    pub const INVALID_HANDLE: Win32Error = Win32Error(6);
    /// `ERROR_NOT_ENOUGH_MEMORY`
    pub const NOT_ENOUGH_MEMORY: Win32Error = Win32Error(8);
    /// `ERROR_OUTOFMEMORY`
    pub const OUTOFMEMORY: Win32Error = Win32Error(14);
    /// `ERROR_NOT_SUPPORTED`
    pub const NOT_SUPPORTED: Win32Error = Win32Error(50);
    /// `ERROR_INVALID_PARAMETER`
    pub const INVALID_PARAMETER: Win32Error = Win32Error(87);
    /// `ERROR_ALREADY_EXISTS`
    pub const ALREADY_EXISTS: Win32Error = Win32Error(183);
    /// `ERROR_INVALID_ADDRESS`
    pub const INVALID_ADDRESS: Win32Error = Win32Error(487);
    /// `ERROR_MAPPED_ALIGNMENT`
    pub const MAPPED_ALIGNMENT: Win32Error = Win32Error(1132);
    /// `ERROR_NO_SYSTEM_RESOURCES`
    pub const NO_SYSTEM_RESOURCES: Win32Error = Win32Error(1450);
    /// `ERROR_COMMITMENT_LIMIT`
    pub const COMMITMENT_LIMIT: Win32Error = Win32Error(1455);

    /// Symbolic name for the codes the Windows backend can run into.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Win32Error::ACCESS_DENIED => "ERROR_ACCESS_DENIED",
            Win32Error::INVALID_HANDLE => "ERROR_INVALID_HANDLE",
            Win32Error::NOT_ENOUGH_MEMORY => "ERROR_NOT_ENOUGH_MEMORY",
            Win32Error::OUTOFMEMORY => "ERROR_OUTOFMEMORY",
            Win32Error::NOT_SUPPORTED => "ERROR_NOT_SUPPORTED",
            Win32Error::INVALID_PARAMETER => "ERROR_INVALID_PARAMETER",
            Win32Error::ALREADY_EXISTS => "ERROR_ALREADY_EXISTS",
            Win32Error::INVALID_ADDRESS => "ERROR_INVALID_ADDRESS",
            Win32Error::MAPPED_ALIGNMENT => "ERROR_MAPPED_ALIGNMENT",
            Win32Error::NO_SYSTEM_RESOURCES => "ERROR_NO_SYSTEM_RESOURCES",
            Win32Error::COMMITMENT_LIMIT => "ERROR_COMMITMENT_LIMIT",
            _ => return None,
        };
        Some(name)
    }

    fn generic_kind(self) -> io::ErrorKind {
        use io::ErrorKind;

        match self {
            Win32Error::ACCESS_DENIED => ErrorKind::PermissionDenied,
            Win32Error::NOT_ENOUGH_MEMORY
            | Win32Error::OUTOFMEMORY
            | Win32Error::NO_SYSTEM_RESOURCES
            | Win32Error::COMMITMENT_LIMIT => ErrorKind::OutOfMemory,
            Win32Error::INVALID_HANDLE
            | Win32Error::INVALID_PARAMETER
            | Win32Error::INVALID_ADDRESS
            | Win32Error::MAPPED_ALIGNMENT => ErrorKind::InvalidInput,
            Win32Error::ALREADY_EXISTS => ErrorKind::AlreadyExists,
            Win32Error::NOT_SUPPORTED => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for Win32Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "win32 error {}", self.0),
        }
    }
}

/// A failure reported by the host, in the host's own terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeError {
    /// Mach kernel call return code.
    Kern(KernReturn),
    /// Win32 last-error code.
    Win32(Win32Error),
    /// C library `errno` value.
    Errno(i32),
    /// A fixed-address mapping landed somewhere other than requested.
    Misplaced {
        /// Address that was asked for.
        requested: usize,
        /// Address the host returned.
        actual: usize,
    },
}

impl NativeError {
    /// Portable classification of the native code.
    pub fn generic_kind(&self) -> io::ErrorKind {
        match *self {
            NativeError::Kern(code) => code.generic_kind().unwrap_or(io::ErrorKind::Other),
            NativeError::Win32(code) => code.generic_kind(),
            NativeError::Errno(code) => io::Error::from_raw_os_error(code).kind(),
            NativeError::Misplaced { .. } => io::ErrorKind::AddrNotAvailable,
        }
    }

    /// Symbolic name of the native code, when one is known.
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            NativeError::Kern(code) => code.name(),
            NativeError::Win32(code) => code.name(),
            NativeError::Errno(code) => errno_name(code),
            NativeError::Misplaced { .. } => None,
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            NativeError::Kern(code) => code.fmt(f),
            NativeError::Win32(code) => code.fmt(f),
            NativeError::Errno(code) => {
                let description = io::Error::from_raw_os_error(code);
                match errno_name(code) {
                    Some(name) => write!(f, "{name}: {description}"),
                    None => write!(f, "{description}"),
                }
            }
            NativeError::Misplaced { requested, actual } => write!(
                f,
                "fixed mapping requested at {requested:#x} landed at {actual:#x}"
            ),
        }
    }
}

impl std::error::Error for NativeError {}

impl From<KernReturn> for NativeError {
    fn from(code: KernReturn) -> Self {
        NativeError::Kern(code)
    }
}

impl From<Win32Error> for NativeError {
    fn from(code: Win32Error) -> Self {
        NativeError::Win32(code)
    }
}

#[cfg(unix)]
impl From<rustix::io::Errno> for NativeError {
    fn from(errno: rustix::io::Errno) -> Self {
        NativeError::Errno(errno.raw_os_error())
    }
}

#[cfg(unix)]
fn errno_name(code: i32) -> Option<&'static str> {
    use rustix::io::Errno;

    const NAMES: &[(Errno, &str)] = &[
        (Errno::PERM, "EPERM"),
        (Errno::NOENT, "ENOENT"),
        (Errno::INTR, "EINTR"),
        (Errno::IO, "EIO"),
        (Errno::BADF, "EBADF"),
        (Errno::AGAIN, "EAGAIN"),
        (Errno::NOMEM, "ENOMEM"),
        (Errno::ACCESS, "EACCES"),
        (Errno::BUSY, "EBUSY"),
        (Errno::EXIST, "EEXIST"),
        (Errno::INVAL, "EINVAL"),
        (Errno::NFILE, "ENFILE"),
        (Errno::MFILE, "EMFILE"),
        (Errno::FBIG, "EFBIG"),
        (Errno::NOSPC, "ENOSPC"),
        (Errno::NAMETOOLONG, "ENAMETOOLONG"),
        (Errno::NOSYS, "ENOSYS"),
    ];

    NAMES
        .iter()
        .find(|(errno, _)| errno.raw_os_error() == code)
        .map(|&(_, name)| name)
}

#[cfg(not(unix))]
fn errno_name(_code: i32) -> Option<&'static str> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kern_display_uses_symbolic_name() {
        let err = NativeError::from(KernReturn::NO_SPACE);
        assert_eq!(err.to_string(), "KERN_NO_SPACE (3)");
        assert_eq!(err.name(), Some("KERN_NO_SPACE"));
        assert_eq!(err.generic_kind(), io::ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_unknown_kern_is_generic() {
        let err = NativeError::Kern(KernReturn(4242));
        assert_eq!(err.to_string(), "kern error 4242");
        assert_eq!(err.name(), None);
        assert_eq!(err.generic_kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_win32_display() {
        let err = NativeError::from(Win32Error::NOT_ENOUGH_MEMORY);
        assert_eq!(err.to_string(), "ERROR_NOT_ENOUGH_MEMORY (8)");
        assert_eq!(err.generic_kind(), io::ErrorKind::OutOfMemory);

        let err = NativeError::Win32(Win32Error(31337));
        assert_eq!(err.to_string(), "win32 error 31337");
        assert_eq!(err.generic_kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_misplaced_display() {
        let err = NativeError::Misplaced {
            requested: 0x1000_0000,
            actual: 0x2000_0000,
        };
        assert_eq!(
            err.to_string(),
            "fixed mapping requested at 0x10000000 landed at 0x20000000"
        );
        assert_eq!(err.generic_kind(), io::ErrorKind::AddrNotAvailable);
    }

    #[cfg(unix)]
    #[test]
    fn test_errno_display() {
        let err = NativeError::from(rustix::io::Errno::NOMEM);
        assert_eq!(err.name(), Some("ENOMEM"));
        assert!(err.to_string().starts_with("ENOMEM: "));
        assert_eq!(err.generic_kind(), io::ErrorKind::OutOfMemory);
    }

    #[cfg(unix)]
    #[test]
    fn test_errno_without_name_falls_back_to_description() {
        let err = NativeError::Errno(rustix::io::Errno::NOTTY.raw_os_error());
        assert_eq!(err.name(), None);
        assert!(!err.to_string().is_empty());
    }
}
