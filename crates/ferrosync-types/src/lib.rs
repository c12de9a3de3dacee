//! Core type system and error handling for ferrosync
//!
//! This crate provides the foundational types shared by the ferrosync crates:
//!
//! - **Error handling**: structural errors with severity levels, and per-entry
//!   errors recorded inside tick reports
//! - **Core types**: entry metadata, path mapping, actions and tick reports
//! - **Traits**: the [`EventSink`] a mirror run reports through
//! - **Configuration**: validated values such as [`SyncInterval`]
//!
//! # Features
//!
//! - `std` (default): Enable standard library features
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use ferrosync_types::{Action, MirrorStats};
//! use std::path::PathBuf;
//!
//! let mut stats = MirrorStats::new();
//! stats.record(&Action::CreateDir { path: PathBuf::from("/replica/a") });
//! assert_eq!(stats.directories_created, 1);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{BufferSize, SyncInterval};
pub use error::{Error, ErrorKind, ErrorSeverity, RootRole};
pub use result::Result;
pub use traits::*;
pub use types::*;
