//! Validated configuration values for ferrosync
//!
//! Newtypes that can only hold values the mirror engine accepts.

use std::time::Duration;

/// Read buffer size used when hashing file contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferSize(usize);

impl BufferSize {
    /// Minimum buffer size (4KB)
    pub const MIN: usize = 4 * 1024;
    /// Maximum buffer size (64MB)
    pub const MAX: usize = 64 * 1024 * 1024;
    /// Default buffer size (64KB)
    pub const DEFAULT: usize = 64 * 1024;

    /// Create a new buffer size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Buffer size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Buffer size {} exceeds maximum {}", size, Self::MAX))
        } else if !size.is_power_of_two() {
            Err(format!("Buffer size {} must be a power of two", size))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the buffer size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Pause between the end of one tick and the start of the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SyncInterval(Duration);

impl SyncInterval {
    /// Default interval (one minute)
    pub const DEFAULT_SECS: u64 = 60;

    /// Create an interval from whole seconds, rejecting zero
    pub fn from_secs(secs: u64) -> Result<Self, String> {
        if secs == 0 {
            Err("Sync interval must be a positive number of seconds".to_string())
        } else {
            Ok(Self(Duration::from_secs(secs)))
        }
    }

    /// Get the interval as a duration
    pub fn get(self) -> Duration {
        self.0
    }
}

impl Default for SyncInterval {
    fn default() -> Self {
        Self(Duration::from_secs(Self::DEFAULT_SECS))
    }
}
