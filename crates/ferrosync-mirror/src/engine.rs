//! Mirror engine running one tick: comparator, then pruner

use crate::comparator::Comparator;
use crate::fs::{CopyOptions, FileSystem};
use crate::oracle::VerificationOptions;
use crate::pruner::Pruner;
use crate::snapshot::scan_into;
use ferrosync_types::{
    Error, EventSink, PathMapping, Result, RootRole, StageReport, TickId, TickReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Options applied to every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MirrorOptions {
    /// Plan and report actions without touching the replica
    pub dry_run: bool,
    /// Metadata preserved on copied files
    pub copy: CopyOptions,
    /// How file contents are compared
    pub verification: VerificationOptions,
}

impl MirrorOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set copy options
    pub fn with_copy(mut self, copy: CopyOptions) -> Self {
        self.copy = copy;
        self
    }

    /// Set content verification options
    pub fn with_verification(mut self, verification: VerificationOptions) -> Self {
        self.verification = verification;
        self
    }
}

/// Mirrors one source tree onto one replica tree
pub struct MirrorEngine<F: FileSystem> {
    fs: F,
    mapping: PathMapping,
    options: MirrorOptions,
    sink: Arc<dyn EventSink>,
}

impl<F: FileSystem> MirrorEngine<F> {
    /// Create an engine for `mapping` reporting to `sink`
    pub fn new(fs: F, mapping: PathMapping, sink: Arc<dyn EventSink>) -> Self {
        Self {
            fs,
            mapping,
            options: MirrorOptions::default(),
            sink,
        }
    }

    /// Set engine options
    pub fn with_options(mut self, options: MirrorOptions) -> Self {
        self.options = options;
        self
    }

    /// Filesystem the engine operates on
    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Source and replica roots
    pub fn mapping(&self) -> &PathMapping {
        &self.mapping
    }

    /// Engine options
    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    /// Check that both roots are existing, disjoint directories
    ///
    /// Any failure here is structural: the run cannot continue.
    pub fn validate_roots(&self) -> Result<()> {
        let source = self.resolve_root(RootRole::Source, self.mapping.source_root())?;
        let replica = self.resolve_root(RootRole::Replica, self.mapping.replica_root())?;

        if source.starts_with(&replica) || replica.starts_with(&source) {
            return Err(Error::OverlappingRoots {
                source_root: source,
                replica_root: replica,
            });
        }
        Ok(())
    }

    fn resolve_root(&self, role: RootRole, path: &Path) -> Result<PathBuf> {
        let canonical = self
            .fs
            .canonicalize(path)
            .map_err(|e| Error::invalid_root(role, path, e.to_string()))?;
        let metadata = self
            .fs
            .metadata(&canonical)
            .map_err(|e| Error::invalid_root(role, path, e.to_string()))?;
        if !metadata.is_dir() {
            return Err(Error::invalid_root(role, path, "not a directory"));
        }
        Ok(canonical)
    }

    /// Run one complete tick
    ///
    /// Returns `Err` only for structural failures found before any change is
    /// made. Per-entry failures are part of the returned report.
    pub fn tick(&self) -> Result<TickReport> {
        self.validate_roots()?;

        let started = Instant::now();
        let mut report = TickReport::new(TickId::new_v4());
        report.dry_run = self.options.dry_run;
        self.sink.report_start(report.tick_id, &self.mapping);
        let sink = self.sink.as_ref();

        // One source walk per tick, shared by both stages
        let mut additions = StageReport::new();
        let source = scan_into(&self.fs, self.mapping.source_root(), sink, &mut additions);
        debug!("Source snapshot holds {} entries", source.len());

        let comparator = Comparator::new(&self.fs, sink, &self.options);
        additions.extend(comparator.reconcile_from(&self.mapping, &source));

        let mut pruner = Pruner::new(&self.fs, sink, &self.options);
        if self.options.dry_run {
            pruner = pruner.with_already_removed(&additions.actions);
        }
        let removals = pruner.prune_from(&self.mapping, &source);

        report.additions = additions;
        report.removals = removals;
        report.duration = started.elapsed();
        self.sink.report_completion(&report);
        Ok(report)
    }
}

impl<F: FileSystem + std::fmt::Debug> std::fmt::Debug for MirrorEngine<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorEngine")
            .field("fs", &self.fs)
            .field("mapping", &self.mapping)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::{Fault, MemoryEntry, MemoryFs};
    use crate::sink::{CollectingSink, SinkEvent};
    use ferrosync_types::{Action, ErrorKind};
    use std::collections::BTreeMap;

    fn engine(fs: MemoryFs) -> (MirrorEngine<MemoryFs>, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let engine = MirrorEngine::new(fs, PathMapping::new("/src", "/dst"), sink.clone());
        (engine, sink)
    }

    fn file(contents: &str) -> MemoryEntry {
        MemoryEntry::File(contents.as_bytes().to_vec())
    }

    #[test]
    fn test_reference_scenario() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/x.txt", "1")
            .add_file("/src/b.txt", "2")
            .add_file("/dst/a/x.txt", "1")
            .add_file("/dst/b.txt", "OLD")
            .add_file("/dst/c.txt", "3");
        let (engine, sink) = engine(fs);

        let report = engine.tick().unwrap();

        let expected: BTreeMap<PathBuf, MemoryEntry> = [
            (PathBuf::from("a"), MemoryEntry::Directory),
            (PathBuf::from("a/x.txt"), file("1")),
            (PathBuf::from("b.txt"), file("2")),
        ]
        .into_iter()
        .collect();
        assert_eq!(engine.fs().entries_under("/dst"), expected);
        assert_eq!(
            report.actions().map(|action| action.target()).collect::<Vec<_>>(),
            vec![Path::new("/dst/b.txt"), Path::new("/dst/c.txt")]
        );
        assert_eq!(report.failure_count(), 0);
        assert_eq!(sink.completed_ticks(), 1);
    }

    #[test]
    fn test_second_tick_is_idle() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/b/c.txt", "deep")
            .add_file("/src/top.txt", "top")
            .add_dir("/src/empty")
            .add_file("/dst/stray/file", "x");
        let (engine, _) = engine(fs);

        let first = engine.tick().unwrap();
        assert!(!first.is_clean());

        let second = engine.tick().unwrap();
        assert_eq!(second.action_count(), 0);
        assert!(second.is_clean());
    }

    #[test]
    fn test_empty_source_clears_replica() {
        let fs = MemoryFs::new();
        fs.add_dir("/src").add_file("/dst/n1/n2/n3/file", "x");
        let (engine, _) = engine(fs);

        let report = engine.tick().unwrap();

        assert!(engine.fs().entries_under("/dst").is_empty());
        assert_eq!(
            report.removals.actions,
            vec![Action::RemoveDir {
                path: PathBuf::from("/dst/n1")
            }]
        );
    }

    #[test]
    fn test_both_empty() {
        let fs = MemoryFs::new();
        fs.add_dir("/src").add_dir("/dst");
        let (engine, sink) = engine(fs);

        let report = engine.tick().unwrap();

        assert_eq!(report.action_count(), 0);
        assert_eq!(report.errors().count(), 0);
        assert!(matches!(
            sink.events()[..],
            [SinkEvent::Started { .. }, SinkEvent::Completed(_)]
        ));
    }

    #[test]
    fn test_missing_replica_root_is_fatal() {
        let fs = MemoryFs::new();
        fs.add_file("/src/f", "x");
        let (engine, sink) = engine(fs);

        let error = engine.tick().unwrap_err();

        assert!(error.is_fatal());
        assert!(matches!(
            error,
            Error::InvalidRoot {
                role: RootRole::Replica,
                ..
            }
        ));
        assert!(sink.events().is_empty());
        assert_eq!(engine.fs().kind("/dst"), None);
    }

    #[test]
    fn test_file_as_source_root_is_fatal() {
        let fs = MemoryFs::new();
        fs.add_file("/src", "not a dir").add_dir("/dst");
        let (engine, _) = engine(fs);

        let error = engine.tick().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidRoot);
        assert!(error.to_string().contains("not a directory"));
    }

    #[test]
    fn test_nested_roots_are_fatal() {
        let fs = MemoryFs::new();
        fs.add_dir("/src/dst");
        let sink = Arc::new(CollectingSink::new());
        let engine = MirrorEngine::new(fs, PathMapping::new("/src", "/src/dst"), sink);

        let error = engine.tick().unwrap_err();
        assert!(matches!(error, Error::OverlappingRoots { .. }));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_per_entry_failures_do_not_fail_the_tick() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a", "1")
            .add_file("/src/b", "2")
            .add_file("/dst/orphan", "3");
        fs.fail("/dst/a", Fault::Copy);
        fs.fail("/dst/orphan", Fault::RemoveFile);
        let (engine, sink) = engine(fs);

        let report = engine.tick().unwrap();

        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.action_count(), 1);
        assert_eq!(sink.errors().len(), 2);

        engine.fs().clear_faults();
        let retry = engine.tick().unwrap();
        assert_eq!(retry.failure_count(), 0);
        assert_eq!(retry.action_count(), 2);
    }

    #[test]
    fn test_source_is_never_modified() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/x", "1")
            .add_symlink("/src/link", "/src/a/x")
            .add_file("/dst/a", "conflict")
            .add_file("/dst/z", "orphan");
        let before = fs.entries_under("/src");
        let (engine, _) = engine(fs);

        engine.tick().unwrap();

        assert_eq!(engine.fs().entries_under("/src"), before);
    }

    #[test]
    fn test_dry_run_reports_type_mismatch_once() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/inner", "x")
            .add_file("/dst/a", "file where a folder belongs")
            .add_file("/src/b", "y")
            .add_file("/dst/b/old/deep", "z");
        let sink = Arc::new(CollectingSink::new());
        let engine = MirrorEngine::new(fs, PathMapping::new("/src", "/dst"), sink.clone())
            .with_options(MirrorOptions::new().with_dry_run(true));

        let report = engine.tick().unwrap();

        assert!(report.removals.actions.is_empty());
        let removed: Vec<&Path> = report
            .actions()
            .filter(|action| {
                matches!(action, Action::RemoveFile { .. } | Action::RemoveDir { .. })
            })
            .map(Action::target)
            .collect();
        assert_eq!(removed, vec![Path::new("/dst/a"), Path::new("/dst/b")]);
        assert_eq!(sink.actions().len(), report.action_count());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let fs = MemoryFs::new();
        fs.add_file("/src/new", "1").add_file("/dst/old", "2");
        let before = fs.entries_under("/dst");
        let sink = Arc::new(CollectingSink::new());
        let engine = MirrorEngine::new(fs, PathMapping::new("/src", "/dst"), sink)
            .with_options(MirrorOptions::new().with_dry_run(true));

        let report = engine.tick().unwrap();

        assert!(report.dry_run);
        assert_eq!(report.action_count(), 2);
        assert_eq!(engine.fs().entries_under("/dst"), before);
    }
}
