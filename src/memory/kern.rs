//! Mach kernel return codes.
//!
//! `kern_return_t` is a plain integer on the host, so it gets a newtype here
//! with the symbolic names from `<mach/kern_return.h>` and the translation to
//! a portable [`io::ErrorKind`] that the BSD layer of XNU applies when it
//! converts Mach failures to errno values.
//!
//! The table is pure data and is available on every host.

use std::fmt;
use std::io;

/// A Mach `kern_return_t`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernReturn(pub i32);

macro_rules! kern_codes {
    ($($name:ident = $value:literal,)*) => {
        impl KernReturn {
            $(
                #[allow(missing_docs)]
                pub const $name: KernReturn = KernReturn($value);
            )*

            /// Symbolic name of this code, e.g. `"KERN_NO_SPACE"`.
            ///
            /// Returns `None` for values outside the known table.
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(concat!("KERN_", stringify!($name))),)*
                    _ => None,
                }
            }
        }
    };
}

kern_codes! {
    SUCCESS = 0,
    INVALID_ADDRESS = 1,
    PROTECTION_FAILURE = 2,
    NO_SPACE = 3,
    INVALID_ARGUMENT = 4,
    FAILURE = 5,
    RESOURCE_SHORTAGE = 6,
    NOT_RECEIVER = 7,
    NO_ACCESS = 8,
    MEMORY_FAILURE = 9,
    MEMORY_ERROR = 10,
    ALREADY_IN_SET = 11,
    NOT_IN_SET = 12,
    NAME_EXISTS = 13,
    ABORTED = 14,
    INVALID_NAME = 15,
    INVALID_TASK = 16,
    INVALID_RIGHT = 17,
    INVALID_VALUE = 18,
    UREFS_OVERFLOW = 19,
    INVALID_CAPABILITY = 20,
    RIGHT_EXISTS = 21,
    INVALID_HOST = 22,
    MEMORY_PRESENT = 23,
    MEMORY_DATA_MOVED = 24,
    MEMORY_RESTART_COPY = 25,
    INVALID_PROCESSOR_SET = 26,
    POLICY_LIMIT = 27,
    INVALID_POLICY = 28,
    INVALID_OBJECT = 29,
    ALREADY_WAITING = 30,
    DEFAULT_SET = 31,
    EXCEPTION_PROTECTED = 32,
    INVALID_LEDGER = 33,
    INVALID_MEMORY_CONTROL = 34,
    INVALID_SECURITY = 35,
    NOT_DEPRESSED = 36,
    TERMINATED = 37,
    LOCK_SET_DESTROYED = 38,
    LOCK_UNSTABLE = 39,
    LOCK_OWNED = 40,
    LOCK_OWNED_SELF = 41,
    SEMAPHORE_DESTROYED = 42,
    RPC_SERVER_TERMINATED = 43,
    RPC_TERMINATE_ORPHAN = 44,
    RPC_CONTINUE_ORPHAN = 45,
    NOT_SUPPORTED = 46,
    NODE_DOWN = 47,
    NOT_WAITING = 48,
    OPERATION_TIMED_OUT = 49,
    CODESIGN_ERROR = 50,
    POLICY_STATIC = 51,
    INSUFFICIENT_BUFFER_SIZE = 52,
    RETURN_MAX = 0x100,
}

impl KernReturn {
    /// Whether this is `KERN_SUCCESS`.
    #[inline]
    pub fn is_success(self) -> bool {
        self == KernReturn::SUCCESS
    }

    /// Portable classification of this code.
    ///
    /// Mirrors XNU's Mach-to-BSD errno table. Codes with no BSD counterpart
    /// (and `KERN_SUCCESS`) return `None`.
    pub fn generic_kind(self) -> Option<io::ErrorKind> {
        use io::ErrorKind;

        let kind = match self {
            KernReturn::INVALID_ADDRESS
            | KernReturn::INVALID_ARGUMENT
            | KernReturn::NOT_IN_SET
            | KernReturn::INVALID_NAME
            | KernReturn::INVALID_TASK
            | KernReturn::INVALID_RIGHT
            | KernReturn::INVALID_VALUE
            | KernReturn::INVALID_CAPABILITY
            | KernReturn::INVALID_HOST
            | KernReturn::MEMORY_PRESENT
            | KernReturn::INVALID_PROCESSOR_SET
            | KernReturn::INVALID_POLICY
            | KernReturn::ALREADY_WAITING
            | KernReturn::DEFAULT_SET
            | KernReturn::EXCEPTION_PROTECTED
            | KernReturn::INVALID_LEDGER
            | KernReturn::INVALID_MEMORY_CONTROL
            | KernReturn::INVALID_SECURITY
            | KernReturn::NOT_DEPRESSED
            | KernReturn::LOCK_OWNED
            | KernReturn::LOCK_OWNED_SELF => ErrorKind::InvalidInput,

            // EACCES and EPERM both land here.
            KernReturn::PROTECTION_FAILURE
            | KernReturn::NOT_RECEIVER
            | KernReturn::NO_ACCESS
            | KernReturn::POLICY_STATIC
            | KernReturn::MEMORY_FAILURE
            | KernReturn::POLICY_LIMIT
            | KernReturn::CODESIGN_ERROR => ErrorKind::PermissionDenied,

            KernReturn::NO_SPACE
            | KernReturn::RESOURCE_SHORTAGE
            | KernReturn::UREFS_OVERFLOW
            | KernReturn::INVALID_OBJECT => ErrorKind::OutOfMemory,

            KernReturn::FAILURE => ErrorKind::Other,
            KernReturn::MEMORY_ERROR => ErrorKind::ResourceBusy,

            KernReturn::ALREADY_IN_SET | KernReturn::NAME_EXISTS | KernReturn::RIGHT_EXISTS => {
                ErrorKind::AlreadyExists
            }

            KernReturn::ABORTED => ErrorKind::Interrupted,

            KernReturn::TERMINATED
            | KernReturn::LOCK_SET_DESTROYED
            | KernReturn::LOCK_UNSTABLE
            | KernReturn::SEMAPHORE_DESTROYED
            | KernReturn::NOT_WAITING => ErrorKind::NotFound,

            KernReturn::RPC_SERVER_TERMINATED => ErrorKind::ConnectionReset,
            KernReturn::NOT_SUPPORTED => ErrorKind::Unsupported,
            KernReturn::NODE_DOWN => ErrorKind::NetworkDown,
            KernReturn::OPERATION_TIMED_OUT => ErrorKind::TimedOut,

            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Debug for KernReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "KernReturn({})", self.0),
        }
    }
}

impl fmt::Display for KernReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "kern error {}", self.0),
        }
    }
}
