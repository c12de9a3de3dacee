//! ferrosync testing suite
//!
//! Integration tests and benchmarks that run the mirror engine against real
//! directories, plus the fixtures they share.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Shared fixtures and tree helpers
///
/// Used by both the integration tests and the benchmarks so they build and
/// inspect directory trees the same way.
pub mod test_utils;

pub use test_utils::{
    generate_test_data, generate_tree, make_dir, read_tree, write_file, MirrorFixture,
};
