//! Core data types for ferrosync
//!
//! This module provides the vocabulary shared by every ferrosync crate: how an
//! entry on disk is described, how source paths map onto replica paths, the
//! actions a tick performs and the reports it produces.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::ErrorSeverity;

/// Unique identifier for a tick
pub type TickId = uuid::Uuid;

/// Kind of a filesystem entry as observed by a tree walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link, socket, fifo or device node
    Other,
}

impl EntryKind {
    /// Short human readable label
    pub fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "folder",
            Self::Other => "special file",
        }
    }
}

/// Digest used to compare file contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DigestAlgorithm {
    /// BLAKE3
    #[default]
    Blake3,
    /// SHA-256
    Sha256,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => f.write_str("blake3"),
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

/// Metadata captured for one entry of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryMetadata {
    /// Entry kind
    pub kind: EntryKind,
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// Last modification time, when the platform reports one
    pub modified: Option<SystemTime>,
    /// Last access time, when the platform reports one
    pub accessed: Option<SystemTime>,
    /// Permission bits
    pub permissions: u32,
}

impl EntryMetadata {
    /// Metadata for a directory
    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
            modified: None,
            accessed: None,
            permissions: 0o755,
        }
    }

    /// Metadata for a regular file of the given size
    pub fn file(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            modified: None,
            accessed: None,
            permissions: 0o644,
        }
    }

    /// Check whether this entry is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Check whether this entry is a regular file
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Root-prefix substitution between the source and the replica tree
///
/// `replica_path = replica_root + relative(path, source_root)` and its
/// inverse. Prefixes are matched component-wise, never as raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathMapping {
    source_root: PathBuf,
    replica_root: PathBuf,
}

impl PathMapping {
    /// Create a mapping between two roots
    pub fn new<S: Into<PathBuf>, R: Into<PathBuf>>(source_root: S, replica_root: R) -> Self {
        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
        }
    }

    /// Root of the source tree
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Root of the replica tree
    pub fn replica_root(&self) -> &Path {
        &self.replica_root
    }

    /// Absolute source path for a path relative to the roots
    pub fn source_for(&self, relative: &Path) -> PathBuf {
        join_relative(&self.source_root, relative)
    }

    /// Absolute replica path for a path relative to the roots
    pub fn replica_for(&self, relative: &Path) -> PathBuf {
        join_relative(&self.replica_root, relative)
    }

    /// Map a path inside the source tree to its replica counterpart
    pub fn to_replica(&self, source_path: &Path) -> Option<PathBuf> {
        source_path
            .strip_prefix(&self.source_root)
            .ok()
            .map(|relative| self.replica_for(relative))
    }

    /// Map a path inside the replica tree back to its source counterpart
    pub fn to_source(&self, replica_path: &Path) -> Option<PathBuf> {
        replica_path
            .strip_prefix(&self.replica_root)
            .ok()
            .map(|relative| self.source_for(relative))
    }
}

fn join_relative(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Kind of operation an action or an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operation {
    /// Listing a directory or reading entry metadata
    Scan,
    /// Comparing file contents
    Compare,
    /// Creating a directory
    CreateDir,
    /// Copying a file
    CopyFile,
    /// Removing a file
    RemoveFile,
    /// Removing a directory tree
    RemoveDir,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scan => "scanning",
            Self::Compare => "comparing",
            Self::CreateDir => "creating folder",
            Self::CopyFile => "copying file",
            Self::RemoveFile => "removing file",
            Self::RemoveDir => "removing folder",
        };
        f.write_str(label)
    }
}

/// Why a file is copied into the replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CopyReason {
    /// No file exists at the replica path
    Missing,
    /// The replica file differs in content
    ContentChanged,
    /// The contents could not be compared, the copy is made to be safe
    Unverified,
}

/// One change applied to the replica tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Action {
    /// Create a directory and any missing parents
    CreateDir {
        /// Replica directory path
        path: PathBuf,
    },
    /// Copy a source file over its replica counterpart
    CopyFile {
        /// Source file path
        from: PathBuf,
        /// Replica file path
        to: PathBuf,
        /// Why the copy is needed
        reason: CopyReason,
        /// Size of the source file in bytes
        size: u64,
    },
    /// Remove a single replica entry that is not a directory
    RemoveFile {
        /// Replica path
        path: PathBuf,
    },
    /// Remove a replica directory and everything below it
    RemoveDir {
        /// Replica directory path
        path: PathBuf,
    },
}

impl Action {
    /// Operation performed by this action
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateDir { .. } => Operation::CreateDir,
            Self::CopyFile { .. } => Operation::CopyFile,
            Self::RemoveFile { .. } => Operation::RemoveFile,
            Self::RemoveDir { .. } => Operation::RemoveDir,
        }
    }

    /// Replica path written or removed by this action
    pub fn target(&self) -> &Path {
        match self {
            Self::CreateDir { path } | Self::RemoveFile { path } | Self::RemoveDir { path } => path,
            Self::CopyFile { to, .. } => to,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir { path } => write!(f, "Creating folder {}", path.display()),
            Self::CopyFile { from, to, .. } => {
                write!(f, "Copying file {} to {}", from.display(), to.display())
            }
            Self::RemoveFile { path } => write!(f, "Removing file {}", path.display()),
            Self::RemoveDir { path } => write!(f, "Removing folder {}", path.display()),
        }
    }
}

/// A recoverable failure tied to a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryError {
    /// Operation that failed
    pub operation: Operation,
    /// Path the failure refers to
    pub path: PathBuf,
    /// Human readable description, usually the OS error
    pub message: String,
    /// Underlying I/O error kind, if any
    #[cfg_attr(feature = "serde", serde(skip))]
    pub io_kind: Option<std::io::ErrorKind>,
    /// How serious the failure is
    pub severity: ErrorSeverity,
}

impl EntryError {
    /// Record a failed I/O operation
    pub fn from_io<P: Into<PathBuf>>(operation: Operation, path: P, error: &std::io::Error) -> Self {
        Self {
            operation,
            path: path.into(),
            message: error.to_string(),
            io_kind: Some(error.kind()),
            severity: ErrorSeverity::Medium,
        }
    }

    /// Record a condition that is reported but does not count as a failure
    pub fn warning<P: Into<PathBuf>, S: Into<String>>(
        operation: Operation,
        path: P,
        message: S,
    ) -> Self {
        Self {
            operation,
            path: path.into(),
            message: message.into(),
            io_kind: None,
            severity: ErrorSeverity::Low,
        }
    }

    /// Whether this entry is only a warning
    pub fn is_warning(&self) -> bool {
        self.severity == ErrorSeverity::Low
    }
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error {} {}: {}",
            self.operation,
            self.path.display(),
            self.message
        )
    }
}

/// Outcome of one component (comparator or pruner) within a tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StageReport {
    /// Actions taken, in the order they were applied
    pub actions: Vec<Action>,
    /// Per-entry errors and warnings
    pub errors: Vec<EntryError>,
}

impl StageReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an action
    pub fn push_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Record an error
    pub fn push_error(&mut self, error: EntryError) {
        self.errors.push(error);
    }

    /// Append another report
    pub fn extend(&mut self, other: StageReport) {
        self.actions.extend(other.actions);
        self.errors.extend(other.errors);
    }

    /// Errors that count as failures (everything above warning level)
    pub fn failures(&self) -> impl Iterator<Item = &EntryError> {
        self.errors.iter().filter(|error| !error.is_warning())
    }

    /// Errors reported as warnings
    pub fn warnings(&self) -> impl Iterator<Item = &EntryError> {
        self.errors.iter().filter(|error| error.is_warning())
    }

    /// True when nothing was done and nothing failed
    pub fn is_clean(&self) -> bool {
        self.actions.is_empty() && self.failures().next().is_none()
    }
}

/// Counters summarizing a tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MirrorStats {
    /// Number of directories created
    pub directories_created: u64,
    /// Number of files copied
    pub files_copied: u64,
    /// Total bytes copied
    pub bytes_copied: u64,
    /// Number of files (and special entries) removed
    pub files_removed: u64,
    /// Number of directory trees removed
    pub directories_removed: u64,
    /// Number of entries skipped with a warning
    pub entries_skipped: u64,
    /// Number of failed entries
    pub errors: u64,
}

impl MirrorStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one applied action
    pub fn record(&mut self, action: &Action) {
        match action {
            Action::CreateDir { .. } => self.directories_created += 1,
            Action::CopyFile { size, .. } => {
                self.files_copied += 1;
                self.bytes_copied += size;
            }
            Action::RemoveFile { .. } => self.files_removed += 1,
            Action::RemoveDir { .. } => self.directories_removed += 1,
        }
    }

    /// Build statistics from a stage report
    pub fn from_stage(report: &StageReport) -> Self {
        let mut stats = Self::new();
        for action in &report.actions {
            stats.record(action);
        }
        stats.entries_skipped = report.warnings().count() as u64;
        stats.errors = report.failures().count() as u64;
        stats
    }

    /// Total number of actions counted
    pub fn total_actions(&self) -> u64 {
        self.directories_created + self.files_copied + self.files_removed + self.directories_removed
    }

    /// Merge statistics from another instance
    pub fn merge(&mut self, other: &MirrorStats) {
        self.directories_created += other.directories_created;
        self.files_copied += other.files_copied;
        self.bytes_copied += other.bytes_copied;
        self.files_removed += other.files_removed;
        self.directories_removed += other.directories_removed;
        self.entries_skipped += other.entries_skipped;
        self.errors += other.errors;
    }
}

/// Everything one completed tick did
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickReport {
    /// Tick identifier
    pub tick_id: TickId,
    /// Wall clock time the tick started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Time the tick took
    pub duration: Duration,
    /// Whether actions were only planned and logged
    pub dry_run: bool,
    /// Comparator outcome
    pub additions: StageReport,
    /// Pruner outcome
    pub removals: StageReport,
}

impl TickReport {
    /// Create an empty report for a tick starting now
    pub fn new(tick_id: TickId) -> Self {
        Self {
            tick_id,
            started_at: chrono::Utc::now(),
            duration: Duration::default(),
            dry_run: false,
            additions: StageReport::new(),
            removals: StageReport::new(),
        }
    }

    /// All actions, additions first
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.additions.actions.iter().chain(&self.removals.actions)
    }

    /// All errors and warnings, additions first
    pub fn errors(&self) -> impl Iterator<Item = &EntryError> {
        self.additions.errors.iter().chain(&self.removals.errors)
    }

    /// Number of actions taken
    pub fn action_count(&self) -> usize {
        self.additions.actions.len() + self.removals.actions.len()
    }

    /// Number of failed entries
    pub fn failure_count(&self) -> usize {
        self.additions.failures().count() + self.removals.failures().count()
    }

    /// True when the tick changed nothing and nothing failed
    pub fn is_clean(&self) -> bool {
        self.additions.is_clean() && self.removals.is_clean()
    }

    /// Aggregate statistics
    pub fn stats(&self) -> MirrorStats {
        let mut stats = MirrorStats::from_stage(&self.additions);
        stats.merge(&MirrorStats::from_stage(&self.removals));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/src/a/x.txt", Some("/dst/a/x.txt"))]
    #[case("/src", Some("/dst"))]
    #[case("/srcfoo/x.txt", None)]
    #[case("/other/x.txt", None)]
    fn test_to_replica(#[case] input: &str, #[case] expected: Option<&str>) {
        let mapping = PathMapping::new("/src", "/dst");
        assert_eq!(mapping.to_replica(Path::new(input)), expected.map(PathBuf::from));
    }

    #[test]
    fn test_mapping_round_trip_for_nested_root_names() {
        // Root names occurring again deeper in the tree must not be substituted
        let mapping = PathMapping::new("/data/src", "/backup/dst");
        let source = Path::new("/data/src/src/data/src.txt");

        let replica = mapping.to_replica(source).unwrap();
        assert_eq!(replica, PathBuf::from("/backup/dst/src/data/src.txt"));
        assert_eq!(mapping.to_source(&replica).unwrap(), source);
    }

    #[test]
    fn test_action_display() {
        let copy = Action::CopyFile {
            from: PathBuf::from("/src/b.txt"),
            to: PathBuf::from("/dst/b.txt"),
            reason: CopyReason::ContentChanged,
            size: 1,
        };
        assert_eq!(copy.to_string(), "Copying file /src/b.txt to /dst/b.txt");
        assert_eq!(copy.target(), Path::new("/dst/b.txt"));
        assert_eq!(copy.operation(), Operation::CopyFile);

        let remove = Action::RemoveDir {
            path: PathBuf::from("/dst/old"),
        };
        assert_eq!(remove.to_string(), "Removing folder /dst/old");
    }

    #[test]
    fn test_entry_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = EntryError::from_io(Operation::RemoveFile, "/dst/c.txt", &io_error);

        assert_eq!(error.io_kind, Some(std::io::ErrorKind::PermissionDenied));
        assert!(!error.is_warning());
        assert_eq!(error.to_string(), "Error removing file /dst/c.txt: denied");
    }

    #[test]
    fn test_stage_report_failures_exclude_warnings() {
        let mut report = StageReport::new();
        report.push_error(EntryError::warning(Operation::Scan, "/src/link", "skipped"));
        assert!(report.is_clean());

        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        report.push_error(EntryError::from_io(Operation::CopyFile, "/dst/a", &io_error));
        assert!(!report.is_clean());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_tick_report_stats() {
        let mut report = TickReport::new(TickId::new_v4());
        report.additions.push_action(Action::CreateDir {
            path: PathBuf::from("/dst/a"),
        });
        report.additions.push_action(Action::CopyFile {
            from: PathBuf::from("/src/a/x"),
            to: PathBuf::from("/dst/a/x"),
            reason: CopyReason::Missing,
            size: 10,
        });
        report.removals.push_action(Action::RemoveFile {
            path: PathBuf::from("/dst/c"),
        });

        let stats = report.stats();
        assert_eq!(stats.directories_created, 1);
        assert_eq!(stats.files_copied, 1);
        assert_eq!(stats.bytes_copied, 10);
        assert_eq!(stats.files_removed, 1);
        assert_eq!(stats.total_actions(), 3);
        assert_eq!(report.action_count(), 3);
        assert!(!report.is_clean());
    }
}
