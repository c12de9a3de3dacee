//! Error types and handling for ferrosync
//!
//! Two tiers of failure exist. Structural errors ([`Error`]) abort a tick and,
//! when [`Error::is_fatal`] holds, the whole run. Per-entry failures are
//! recorded as [`EntryError`](crate::EntryError) values inside a tick report
//! and never escape as `Err`.

use std::fmt;
use std::path::PathBuf;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - reported as a warning, the tick result is unaffected
    Low,
    /// Medium severity - the entry is left stale until the next tick
    Medium,
    /// High severity - the operation cannot start with the given input
    High,
    /// Critical severity - the whole run must stop
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Which side of the mirror a root path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RootRole {
    /// The authoritative tree
    Source,
    /// The tree kept in sync with the source
    Replica,
}

impl fmt::Display for RootRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Replica => f.write_str("replica"),
        }
    }
}

/// Main error type for ferrosync operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// A tree root is missing or is not a directory
    #[error("Invalid {role} root '{}': {reason}", .path.display())]
    InvalidRoot {
        /// Side of the mirror the root belongs to
        role: RootRole,
        /// Offending root path
        path: PathBuf,
        /// Why the root cannot be used
        reason: String,
    },

    /// Source and replica are the same directory or nested in one another
    #[error(
        "Source root '{}' and replica root '{}' overlap",
        .source_root.display(),
        .replica_root.display()
    )]
    OverlappingRoots {
        /// Source root as resolved on disk
        source_root: PathBuf,
        /// Replica root as resolved on disk
        replica_root: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors
    Io,
    /// Structural precondition on the tree roots
    InvalidRoot,
    /// Configuration errors
    Config,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::InvalidRoot { .. } | Self::OverlappingRoots { .. } => ErrorKind::InvalidRoot,
            Self::Config { .. } => ErrorKind::Config,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::InvalidRoot { .. } | Self::OverlappingRoots { .. } => ErrorSeverity::Critical,
            Self::Config { .. } => ErrorSeverity::High,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Whether the run must stop instead of waiting for the next tick
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Check if retrying on the next tick may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::Other { .. } => true,
            Self::InvalidRoot { .. }
            | Self::OverlappingRoots { .. }
            | Self::Config { .. } => false,
        }
    }

    /// Create a new invalid root error
    pub fn invalid_root<P: Into<PathBuf>, S: Into<String>>(
        role: RootRole,
        path: P,
        reason: S,
    ) -> Self {
        Self::InvalidRoot {
            role,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
