//! One-way periodic directory mirroring for ferrosync
//!
//! This crate keeps a replica directory tree identical to a source tree:
//!
//! - **Tree Comparator**: creates missing directories and copies missing or
//!   changed files into the replica
//! - **Reconciler**: removes replica entries that no longer exist in the source
//! - **Content Equality Oracle**: streamed BLAKE3 or SHA-256 digests decide
//!   whether two files hold the same bytes
//! - **Tick Driver**: runs comparator then reconciler, sleeps, and repeats
//!   until shutdown or a structural failure
//!
//! Diffing is a pure function of two [`TreeSnapshot`]s producing an
//! [`ActionPlan`]; only the [`Applier`] writes, and it does so through the
//! [`FileSystem`] trait so the whole engine can run against [`MemoryFs`].
//!
//! # Examples
//!
//! ```rust
//! use ferrosync_mirror::{CollectingSink, MemoryFs, MirrorEngine};
//! use ferrosync_types::PathMapping;
//! use std::sync::Arc;
//!
//! let fs = MemoryFs::new();
//! fs.add_file("/src/a/x.txt", "1").add_file("/dst/stale.txt", "old");
//!
//! let engine = MirrorEngine::new(fs, PathMapping::new("/src", "/dst"), Arc::new(CollectingSink::new()));
//! let report = engine.tick()?;
//! assert_eq!(report.action_count(), 3);
//! assert!(engine.tick()?.is_clean());
//! # Ok::<(), ferrosync_types::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod apply;
pub mod comparator;
pub mod engine;
pub mod fs;
pub mod memfs;
pub mod oracle;
pub mod plan;
pub mod pruner;
pub mod scheduler;
pub mod sink;
pub mod snapshot;


pub use apply::Applier;
pub use comparator::Comparator;
pub use engine::{MirrorEngine, MirrorOptions};
pub use fs::{CopyOptions, FileSystem, LocalFs, WalkEntry, WalkError};
pub use memfs::{Fault, MemoryEntry, MemoryFs};
pub use oracle::{ContentOracle, DigestOracle, VerificationOptions};
pub use plan::{plan_additions, plan_removals, ActionPlan};
pub use pruner::Pruner;
pub use scheduler::{Clock, DriverState, DriverSummary, ManualClock, TickDriver, TokioClock};
pub use sink::{CollectingSink, FanoutSink, SinkEvent, TracingSink};
pub use snapshot::TreeSnapshot;
