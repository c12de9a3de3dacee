//! Reconciler: removes replica entries that have no source counterpart

use crate::apply::Applier;
use crate::engine::MirrorOptions;
use crate::fs::FileSystem;
use crate::plan::plan_removals;
use crate::snapshot::{scan_into, TreeSnapshot};
use ferrosync_types::{Action, EventSink, PathMapping, StageReport};
use std::path::PathBuf;
use tracing::debug;

/// Deletes orphaned files and directories from the replica
pub struct Pruner<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    sink: &'a dyn EventSink,
    options: &'a MirrorOptions,
    already_removed: Vec<PathBuf>,
}

impl<'a, F: FileSystem + ?Sized> Pruner<'a, F> {
    /// Create a pruner over `fs`
    pub fn new(fs: &'a F, sink: &'a dyn EventSink, options: &'a MirrorOptions) -> Self {
        Self {
            fs,
            sink,
            options,
            already_removed: Vec::new(),
        }
    }

    /// Skip removals the additions stage already reported
    ///
    /// In dry-run mode the replica is not changed between the two stages, so
    /// entries the comparator replaces would otherwise be reported twice.
    /// Nothing below a skipped path is removed either.
    pub fn with_already_removed<'b, I>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = &'b Action>,
    {
        self.already_removed.extend(actions.into_iter().filter_map(|action| match action {
            Action::RemoveFile { path } | Action::RemoveDir { path } => Some(path.clone()),
            _ => None,
        }));
        self
    }

    /// Walk the replica and remove every entry the source does not have
    pub fn prune_orphans(&self, mapping: &PathMapping) -> StageReport {
        let mut report = StageReport::new();
        let source = scan_into(self.fs, mapping.source_root(), self.sink, &mut report);
        report.extend(self.prune_from(mapping, &source));
        report
    }

    /// Same as [`prune_orphans`](Self::prune_orphans), starting from an
    /// already taken source snapshot
    pub fn prune_from(&self, mapping: &PathMapping, source: &TreeSnapshot) -> StageReport {
        let mut report = StageReport::new();
        let replica = scan_into(self.fs, mapping.replica_root(), self.sink, &mut report);

        let mut plan = plan_removals(source, &replica, mapping);
        if !self.already_removed.is_empty() {
            plan = plan
                .into_iter()
                .filter(|action| {
                    !self
                        .already_removed
                        .iter()
                        .any(|removed| action.target().starts_with(removed))
                })
                .collect();
        }
        debug!("Planned {} removals", plan.len());

        let applied = Applier::new(self.fs, self.sink)
            .with_dry_run(self.options.dry_run)
            .apply(plan);
        report.extend(applied);
        report
    }
}
