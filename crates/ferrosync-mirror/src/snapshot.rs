//! Point-in-time view of one directory tree

use crate::fs::FileSystem;
use ferrosync_types::{EntryError, EntryMetadata, EventSink, Operation, StageReport};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Every entry below a root, keyed by path relative to that root
///
/// A snapshot is taken afresh each tick and never persisted. Directories
/// whose listing failed are remembered in the unreadable set, so callers
/// know which parts of the tree they cannot reason about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    root: PathBuf,
    entries: BTreeMap<PathBuf, EntryMetadata>,
    order: Vec<PathBuf>,
    unreadable: BTreeSet<PathBuf>,
}

impl TreeSnapshot {
    /// Walk `root` and record everything below it
    ///
    /// Failures never abort the walk: each one is returned as a
    /// [`EntryError`] with [`Operation::Scan`] and the failing path is added
    /// to the unreadable set.
    pub fn scan<F: FileSystem + ?Sized>(fs: &F, root: &Path) -> (Self, Vec<EntryError>) {
        let mut entries = BTreeMap::new();
        let mut unreadable = BTreeSet::new();
        let mut errors = Vec::new();

        for item in fs.walk(root) {
            match item {
                Ok(entry) => {
                    if let Ok(relative) = entry.path.strip_prefix(root) {
                        entries.insert(relative.to_path_buf(), entry.metadata);
                    }
                }
                Err(failure) => {
                    let relative = failure
                        .path
                        .strip_prefix(root)
                        .map_or_else(|_| PathBuf::new(), Path::to_path_buf);
                    errors.push(EntryError::from_io(
                        Operation::Scan,
                        &failure.path,
                        &failure.error,
                    ));
                    unreadable.insert(relative);
                }
            }
        }

        debug!(
            "Scanned {}: {} entries, {} unreadable",
            root.display(),
            entries.len(),
            unreadable.len()
        );
        (
            Self::from_entries(root, entries).with_unreadable(unreadable),
            errors,
        )
    }

    /// Build a snapshot from known entries
    pub fn from_entries<P, I>(root: P, entries: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = (PathBuf, EntryMetadata)>,
    {
        let entries: BTreeMap<PathBuf, EntryMetadata> = entries.into_iter().collect();
        let mut order: Vec<PathBuf> = entries.keys().cloned().collect();
        order.sort_by_cached_key(|path| walk_key(path, &entries));

        Self {
            root: root.into(),
            entries,
            order,
            unreadable: BTreeSet::new(),
        }
    }

    /// Mark relative paths whose contents are unknown
    pub fn with_unreadable<I: IntoIterator<Item = PathBuf>>(mut self, unreadable: I) -> Self {
        self.unreadable.extend(unreadable);
        self
    }

    /// Root the snapshot was taken from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata of the entry at a relative path
    pub fn get(&self, relative: &Path) -> Option<&EntryMetadata> {
        self.entries.get(relative)
    }

    /// Entries in traversal order: top-down, depth-first, directories
    /// before files within each directory
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &EntryMetadata)> {
        self.order
            .iter()
            .filter_map(|path| self.entries.get(path).map(|meta| (path.as_path(), meta)))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the tree holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the root itself could not be listed
    pub fn is_root_unreadable(&self) -> bool {
        self.unreadable.contains(Path::new(""))
    }

    /// Whether `relative` lies at or below a path that could not be read
    pub fn is_unreadable_under(&self, relative: &Path) -> bool {
        self.unreadable
            .iter()
            .any(|failed| relative.starts_with(failed))
    }
}

// Sort key placing each directory's subdirectories before its files
fn walk_key(path: &Path, entries: &BTreeMap<PathBuf, EntryMetadata>) -> Vec<(bool, OsString)> {
    let is_dir = entries.get(path).is_some_and(EntryMetadata::is_dir);
    let count = path.components().count();
    path.components()
        .enumerate()
        .map(|(index, component)| {
            let last = index + 1 == count;
            (last && !is_dir, component.as_os_str().to_os_string())
        })
        .collect()
}

/// Scan a tree, recording and reporting every failure
pub(crate) fn scan_into<F: FileSystem + ?Sized>(
    fs: &F,
    root: &Path,
    sink: &dyn EventSink,
    report: &mut StageReport,
) -> TreeSnapshot {
    let (snapshot, errors) = TreeSnapshot::scan(fs, root);
    for error in errors {
        sink.report_error(&error);
        report.push_error(error);
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::{Fault, MemoryFs};

    #[test]
    fn test_scan_uses_relative_keys() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/x.txt", "1").add_file("/src/b.txt", "22");

        let (snapshot, errors) = TreeSnapshot::scan(&fs, Path::new("/src"));

        assert!(errors.is_empty());
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.get(Path::new("a")).unwrap().is_dir());
        assert_eq!(snapshot.get(Path::new("b.txt")).unwrap().size, 2);
        assert!(snapshot.get(Path::new("/src/b.txt")).is_none());
    }

    #[test]
    fn test_iteration_order_directories_first() {
        let snapshot = TreeSnapshot::from_entries(
            "/src",
            vec![
                (PathBuf::from("a.txt"), EntryMetadata::file(1)),
                (PathBuf::from("z"), EntryMetadata::directory()),
                (PathBuf::from("z/y.txt"), EntryMetadata::file(1)),
                (PathBuf::from("b"), EntryMetadata::directory()),
                (PathBuf::from("z/inner"), EntryMetadata::directory()),
            ],
        );

        let order: Vec<&Path> = snapshot.iter().map(|(path, _)| path).collect();
        assert_eq!(
            order,
            vec![
                Path::new("b"),
                Path::new("z"),
                Path::new("z/inner"),
                Path::new("z/y.txt"),
                Path::new("a.txt"),
            ]
        );
    }

    #[test]
    fn test_list_failure_marks_subtree_unreadable() {
        let fs = MemoryFs::new();
        fs.add_file("/src/locked/secret", "x").add_file("/src/open/file", "y");
        fs.fail("/src/locked", Fault::List);

        let (snapshot, errors) = TreeSnapshot::scan(&fs, Path::new("/src"));

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, Operation::Scan);
        assert!(snapshot.is_unreadable_under(Path::new("locked/secret")));
        assert!(snapshot.is_unreadable_under(Path::new("locked")));
        assert!(!snapshot.is_unreadable_under(Path::new("open/file")));
        assert!(!snapshot.is_root_unreadable());
    }

    #[test]
    fn test_unreadable_root_covers_everything() {
        let fs = MemoryFs::new();
        fs.add_dir("/src");
        fs.fail("/src", Fault::List);

        let (snapshot, errors) = TreeSnapshot::scan(&fs, Path::new("/src"));

        assert_eq!(errors.len(), 1);
        assert!(snapshot.is_empty());
        assert!(snapshot.is_root_unreadable());
        assert!(snapshot.is_unreadable_under(Path::new("anything/below")));
    }
}
