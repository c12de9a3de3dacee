//! Fixtures for tests and benchmarks running on the local filesystem

use ferrosync_mirror::{CollectingSink, LocalFs, MemoryEntry, MirrorEngine, MirrorOptions};
use ferrosync_types::PathMapping;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Generate deterministic test data of `size` bytes
pub fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i * 7 + 13) % 256) as u8).collect()
}

/// Write a file below `root`, creating missing parents
pub fn write_file(root: &Path, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Create a directory below `root`, including missing parents
pub fn make_dir(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(&path).expect("Failed to create test directory");
    path
}

/// Read every entry below `root`, keyed by relative path
///
/// Symbolic links are reported as links and never followed.
pub fn read_tree(root: &Path) -> BTreeMap<PathBuf, MemoryEntry> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .map(|entry| {
            let entry = entry.expect("Failed to walk test tree");
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("Walked outside the test tree")
                .to_path_buf();
            let file_type = entry.file_type();
            let contents = if file_type.is_symlink() {
                MemoryEntry::Symlink(fs::read_link(entry.path()).expect("Failed to read link"))
            } else if file_type.is_dir() {
                MemoryEntry::Directory
            } else {
                MemoryEntry::File(fs::read(entry.path()).expect("Failed to read test file"))
            };
            (relative, contents)
        })
        .collect()
}

/// Fill `root` with `dirs` directories of `files_per_dir` files each
///
/// Returns the number of files written.
pub fn generate_tree(root: &Path, dirs: usize, files_per_dir: usize, file_size: usize) -> usize {
    let data = generate_test_data(file_size);
    for dir in 0..dirs {
        for file in 0..files_per_dir {
            write_file(root, &format!("dir_{dir:03}/file_{file:03}.dat"), &data);
        }
    }
    dirs * files_per_dir
}

/// A source and a replica directory inside one temporary directory
#[derive(Debug)]
pub struct MirrorFixture {
    /// Keeps both trees alive
    pub temp_dir: TempDir,
    /// Source root
    pub source: PathBuf,
    /// Replica root
    pub replica: PathBuf,
}

impl MirrorFixture {
    /// Create empty source and replica roots
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = make_dir(temp_dir.path(), "source");
        let replica = make_dir(temp_dir.path(), "replica");
        Self {
            temp_dir,
            source,
            replica,
        }
    }

    /// Mapping between the two roots
    pub fn mapping(&self) -> PathMapping {
        PathMapping::new(&self.source, &self.replica)
    }

    /// Engine over the local filesystem recording into a collecting sink
    pub fn engine(&self) -> (MirrorEngine<LocalFs>, Arc<CollectingSink>) {
        self.engine_with(MirrorOptions::default())
    }

    /// Same as [`MirrorFixture::engine`] with explicit options
    pub fn engine_with(&self, options: MirrorOptions) -> (MirrorEngine<LocalFs>, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let engine =
            MirrorEngine::new(LocalFs::new(), self.mapping(), sink.clone()).with_options(options);
        (engine, sink)
    }

    /// Source tree contents
    pub fn source_tree(&self) -> BTreeMap<PathBuf, MemoryEntry> {
        read_tree(&self.source)
    }

    /// Replica tree contents
    pub fn replica_tree(&self) -> BTreeMap<PathBuf, MemoryEntry> {
        read_tree(&self.replica)
    }
}

impl Default for MirrorFixture {
    fn default() -> Self {
        Self::new()
    }
}
