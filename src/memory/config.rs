//! Construction options for [`BankMemory`](super::BankMemory).

/// Default debug name prefix for the backing object.
pub const DEFAULT_NAME_PREFIX: &str = "bank_memory";

/// Default number of probes on hosts whose reservation can be lost to a race.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 3;

/// Configuration for building a bank region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankMemoryConfig {
    /// Prefix of the backing object's debug name. The full name is
    /// `<prefix>-<pid>-<sequence>`, unique within the process.
    pub name_prefix: String,

    /// How many times to probe for a fresh range when the primary mapping
    /// loses its probed address to another mapping. Only consulted by
    /// backends that cannot hold a placeholder reservation; values below 1
    /// are treated as 1.
    pub probe_attempts: u32,

    /// Touch every page of the primary window after construction so the
    /// first emulated accesses do not fault.
    pub prefault: bool,
}

impl Default for BankMemoryConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            probe_attempts: DEFAULT_PROBE_ATTEMPTS,
            prefault: false,
        }
    }
}

impl BankMemoryConfig {
    /// Default configuration with prefaulting enabled.
    pub fn prefaulted() -> Self {
        Self {
            prefault: true,
            ..Self::default()
        }
    }

    /// Use a different debug name prefix.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Effective probe budget.
    pub(crate) fn attempts(&self) -> u32 {
        self.probe_attempts.max(1)
    }
}
