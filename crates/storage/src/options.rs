//! Store configuration.
//!
//! This module provides configuration for an on-disk store instance.

use thiserror::Error;

/// Default file growth granularity (4KB).
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Default log-to-live-bytes ratio that triggers compaction.
pub const DEFAULT_COMPACTION_RATIO: u32 = 2;

/// Default minimum log size before compaction is considered (64KB).
pub const DEFAULT_MIN_COMPACTION_BYTES: u64 = 64 * 1024;

/// Smallest accepted page size.
pub const MIN_PAGE_SIZE: u64 = 64;

/// When mutations reach stable storage.
///
/// | Mode | fsync | Data loss window |
/// |------|-------|------------------|
/// | Always | Every mutation | Zero |
/// | OnClose | Close, clear, compaction | Writes since the last barrier |
///
/// Either way the log framing guarantees a crash never corrupts data that
/// was already synced; `OnClose` only widens how much of the tail can be
/// lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync after every mutation (the default)
    ///
    /// Each successful put or delete survives an immediately following
    /// crash. Expect per-write latency to be dominated by the fsync.
    Always,

    /// fsync only at lifecycle barriers
    ///
    /// Mutations are handed to the OS immediately but forced to disk on
    /// close, clear and compaction. Use for bulk-load or cache-like data.
    OnClose,
}

impl DurabilityMode {
    /// Check if this mode requires a sync after every mutation.
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Human-readable description of the mode.
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "Always sync (every write durable)",
            DurabilityMode::OnClose => "Sync on close (fast, tail may be lost on crash)",
        }
    }
}

/// Store configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// When mutations are fsynced (default: Always).
    pub durability: DurabilityMode,

    /// Compaction triggers once the log exceeds this multiple of the live
    /// data size (default: 2).
    pub compaction_ratio: u32,

    /// Logs smaller than this are never compacted, whatever the ratio
    /// says (default: 64KB). Keeps small stores from rewriting a file
    /// over a handful of overwrites.
    pub min_compaction_bytes: u64,

    /// File growth granularity in bytes (default: 4KB). The data file is
    /// padded with zeroes up to the next multiple of this size.
    pub page_size: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            durability: DurabilityMode::Always,
            compaction_ratio: DEFAULT_COMPACTION_RATIO,
            min_compaction_bytes: DEFAULT_MIN_COMPACTION_BYTES,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl StoreOptions {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set durability mode (builder pattern).
    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Set compaction ratio (builder pattern).
    pub fn with_compaction_ratio(mut self, ratio: u32) -> Self {
        self.compaction_ratio = ratio;
        self
    }

    /// Set minimum compaction size (builder pattern).
    pub fn with_min_compaction_bytes(mut self, bytes: u64) -> Self {
        self.min_compaction_bytes = bytes;
        self
    }

    /// Set page size (builder pattern).
    pub fn with_page_size(mut self, bytes: u64) -> Self {
        self.page_size = bytes;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.compaction_ratio == 0 {
            return Err(OptionsError::ZeroCompactionRatio);
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err(OptionsError::PageSizeTooSmall {
                min: MIN_PAGE_SIZE,
                got: self.page_size,
            });
        }
        if !self.page_size.is_power_of_two() {
            return Err(OptionsError::PageSizeNotPowerOfTwo(self.page_size));
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small sizes so
    /// compaction and file growth trigger quickly).
    pub fn for_testing() -> Self {
        StoreOptions {
            durability: DurabilityMode::Always,
            compaction_ratio: 2,
            min_compaction_bytes: 256,
            page_size: 512,
        }
    }
}

/// Store configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// Compaction ratio of zero would compact after every write.
    #[error("compaction ratio must be at least 1")]
    ZeroCompactionRatio,

    /// Page size below the supported minimum.
    #[error("page size must be at least {min} bytes, got {got}")]
    PageSizeTooSmall {
        /// Smallest accepted page size
        min: u64,
        /// Configured page size
        got: u64,
    },

    /// Page size must be a power of two.
    #[error("page size must be a power of two, got {0}")]
    PageSizeNotPowerOfTwo(u64),
}
