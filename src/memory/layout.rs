//! Bank geometry.
//!
//! The region is 256 banks of 64KiB storage followed by two 64KiB alias
//! windows. Both windows are re-projections of bank 0, so an address that
//! runs off the end of bank 255 (or off the end of the zero page) lands back
//! in bank 0 without any masking.
//!
//! ```text
//! offset 0x00_0000 ┌──────────────────────────┐
//!                  │ bank 0 ◄──────────────┐  │
//!                  │ bank 1                │  │
//!                  │ ...                   │  │  PRIMARY_LEN
//!                  │ bank 255              │  │
//! offset 0x100_0000├───────────────────────┼──┤
//!                  │ first alias  ─────────┤  │  ALIAS_LEN
//!                  │ second alias ─────────┘  │
//! offset 0x102_0000└──────────────────────────┘
//! ```

use std::fmt;

/// Size of one bank in bytes.
pub const BANK_SIZE: usize = 0x1_0000;

/// Number of independent storage banks.
pub const BANK_COUNT: usize = 256;

/// Number of alias windows that follow the primary banks.
pub const ALIAS_WINDOWS: usize = 2;

/// Size of the primary mapping, and of the backing object.
pub const PRIMARY_LEN: usize = BANK_COUNT * BANK_SIZE;

/// Size of the alias window pair.
pub const ALIAS_LEN: usize = ALIAS_WINDOWS * BANK_SIZE;

/// Size of the whole reservation.
pub const TOTAL_LEN: usize = PRIMARY_LEN + ALIAS_LEN;

const _: () = assert!(TOTAL_LEN == 258 * 0x1_0000);
const _: () = assert!(BANK_COUNT - 1 == u8::MAX as usize);
const _: () = assert!(Window::FirstAlias.offset() == PRIMARY_LEN);

/// Offset of the first byte of `bank` inside the primary window.
#[inline]
pub const fn bank_offset(bank: u8) -> usize {
    bank as usize * BANK_SIZE
}

/// One of the three fixed-address mappings that make up a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    /// Banks 0..=255, mapped from offset 0 of the backing object.
    Primary,
    /// "Bank 256": bank 0 again, directly after the primary window.
    FirstAlias,
    /// "Bank 257": bank 0 a third time, directly after the first alias.
    SecondAlias,
}

impl Window {
    /// All windows in mapping order.
    pub const ALL: [Window; 3] = [Window::Primary, Window::FirstAlias, Window::SecondAlias];

    /// Offset of this window from the start of the reservation.
    #[inline]
    pub const fn offset(self) -> usize {
        match self {
            Window::Primary => 0,
            Window::FirstAlias => PRIMARY_LEN,
            Window::SecondAlias => PRIMARY_LEN + BANK_SIZE,
        }
    }

    /// Length of this window in bytes.
    #[inline]
    pub const fn len(self) -> usize {
        match self {
            Window::Primary => PRIMARY_LEN,
            Window::FirstAlias | Window::SecondAlias => BANK_SIZE,
        }
    }

    /// Whether this window re-projects bank 0 rather than owning storage.
    #[inline]
    pub const fn is_alias(self) -> bool {
        !matches!(self, Window::Primary)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Primary => write!(f, "primary"),
            Window::FirstAlias => write!(f, "first alias"),
            Window::SecondAlias => write!(f, "second alias"),
        }
    }
}
