//! Tree comparator: brings every source entry into the replica

use crate::apply::Applier;
use crate::engine::MirrorOptions;
use crate::fs::FileSystem;
use crate::oracle::DigestOracle;
use crate::plan::plan_additions;
use crate::snapshot::{scan_into, TreeSnapshot};
use ferrosync_types::{EventSink, PathMapping, StageReport};
use tracing::debug;

/// Creates missing directories and copies missing or changed files
pub struct Comparator<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    sink: &'a dyn EventSink,
    options: &'a MirrorOptions,
}

impl<'a, F: FileSystem + ?Sized> Comparator<'a, F> {
    /// Create a comparator over `fs`
    pub fn new(fs: &'a F, sink: &'a dyn EventSink, options: &'a MirrorOptions) -> Self {
        Self { fs, sink, options }
    }

    /// Walk the source tree and update the replica to contain all of it
    ///
    /// Per-entry failures are recorded in the returned report and never stop
    /// the walk.
    pub fn reconcile_additions(&self, mapping: &PathMapping) -> StageReport {
        let mut report = StageReport::new();
        let source = scan_into(self.fs, mapping.source_root(), self.sink, &mut report);
        report.extend(self.reconcile_from(mapping, &source));
        report
    }

    /// Same as [`reconcile_additions`](Self::reconcile_additions), starting
    /// from an already taken source snapshot
    pub fn reconcile_from(&self, mapping: &PathMapping, source: &TreeSnapshot) -> StageReport {
        let mut report = StageReport::new();

        // Reported by the pruner, which walks the replica again. Unlisted
        // replica subtrees get no additions this tick.
        let (replica, replica_errors) = TreeSnapshot::scan(self.fs, mapping.replica_root());
        for error in &replica_errors {
            debug!("{error}");
        }

        let oracle = DigestOracle::new(self.fs, self.options.verification);
        let (plan, warnings) = plan_additions(source, &replica, mapping, &oracle);
        for warning in warnings {
            self.sink.report_error(&warning);
            report.push_error(warning);
        }
        debug!("Planned {} additions", plan.len());

        let applied = Applier::new(self.fs, self.sink)
            .with_copy_options(self.options.copy)
            .with_dry_run(self.options.dry_run)
            .apply(plan);
        report.extend(applied);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::{Fault, MemoryFs, MemoryEntry};
    use crate::sink::CollectingSink;
    use ferrosync_types::{Action, CopyReason, EntryKind, Operation};
    use std::path::{Path, PathBuf};

    fn mapping() -> PathMapping {
        PathMapping::new("/src", "/dst")
    }

    #[test]
    fn test_copies_missing_and_changed_files() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/x.txt", "1")
            .add_file("/src/b.txt", "2")
            .add_file("/dst/a/x.txt", "1")
            .add_file("/dst/b.txt", "OLD");
        let sink = CollectingSink::new();
        let options = MirrorOptions::default();

        let report = Comparator::new(&fs, &sink, &options).reconcile_additions(&mapping());

        assert!(report.errors.is_empty());
        assert_eq!(report.actions.len(), 1);
        assert!(matches!(
            &report.actions[0],
            Action::CopyFile { to, reason: CopyReason::ContentChanged, .. } if to == Path::new("/dst/b.txt")
        ));
        assert_eq!(fs.read("/dst/b.txt"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_creates_nested_directories() {
        let fs = MemoryFs::new();
        fs.add_dir("/src/a/b/c").add_dir("/dst");
        let sink = CollectingSink::new();
        let options = MirrorOptions::default();

        let report = Comparator::new(&fs, &sink, &options).reconcile_additions(&mapping());

        assert_eq!(report.actions.len(), 3);
        assert_eq!(fs.kind("/dst/a/b/c"), Some(EntryKind::Directory));
    }

    #[test]
    fn test_oracle_failure_recopies() {
        let fs = MemoryFs::new();
        fs.add_file("/src/f", "same").add_file("/dst/f", "same");
        fs.fail("/dst/f", Fault::Read);
        let sink = CollectingSink::new();
        let options = MirrorOptions::default();

        let report = Comparator::new(&fs, &sink, &options).reconcile_additions(&mapping());

        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.failures().count(), 0);
        assert!(matches!(
            report.actions[..],
            [Action::CopyFile {
                reason: CopyReason::Unverified,
                ..
            }]
        ));
    }

    #[test]
    fn test_unreadable_source_directory_is_reported() {
        let fs = MemoryFs::new();
        fs.add_file("/src/locked/f", "x")
            .add_file("/src/open/g", "y")
            .add_dir("/dst");
        fs.fail("/src/locked", Fault::List);
        let sink = CollectingSink::new();
        let options = MirrorOptions::default();

        let report = Comparator::new(&fs, &sink, &options).reconcile_additions(&mapping());

        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.errors[0].operation, Operation::Scan);
        assert_eq!(fs.kind("/dst/locked"), Some(EntryKind::Directory));
        assert_eq!(fs.read("/dst/open/g"), Some(b"y".to_vec()));
        assert_eq!(sink.errors().len(), 1);
    }

    #[test]
    fn test_unlistable_replica_directory_is_left_alone() {
        let fs = MemoryFs::new();
        fs.add_file("/src/locked/f", "x")
            .add_file("/src/g", "y")
            .add_file("/dst/locked/f", "x");
        fs.fail("/dst/locked", Fault::List);
        let sink = CollectingSink::new();
        let options = MirrorOptions::default();
        let comparator = Comparator::new(&fs, &sink, &options);

        let first = comparator.reconcile_additions(&mapping());
        let second = comparator.reconcile_additions(&mapping());

        assert_eq!(first.actions.len(), 1);
        assert!(second.actions.is_empty());
        assert!(sink
            .actions()
            .iter()
            .all(|action| !action.target().starts_with("/dst/locked")));
    }

    #[test]
    fn test_dry_run_leaves_replica_untouched() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/x", "1").add_dir("/dst");
        let sink = CollectingSink::new();
        let options = MirrorOptions::default().with_dry_run(true);

        let report = Comparator::new(&fs, &sink, &options).reconcile_additions(&mapping());

        assert_eq!(report.actions.len(), 2);
        assert!(fs.entries_under("/dst").is_empty());
    }

    #[test]
    fn test_replaces_file_with_directory() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a/inner", "x").add_file("/dst/a", "i am a file");
        let sink = CollectingSink::new();
        let options = MirrorOptions::default();

        let report = Comparator::new(&fs, &sink, &options).reconcile_additions(&mapping());

        assert!(report.errors.is_empty());
        assert_eq!(
            fs.entries_under("/dst").get(&PathBuf::from("a/inner")),
            Some(&MemoryEntry::File(b"x".to_vec()))
        );
    }
}
