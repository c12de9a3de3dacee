//! Execution of an action plan against a filesystem

use crate::fs::{CopyOptions, FileSystem};
use crate::plan::ActionPlan;
use ferrosync_types::{Action, EntryError, EventSink, StageReport};
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Applies planned actions one by one, isolating failures per entry
pub struct Applier<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    sink: &'a dyn EventSink,
    copy: CopyOptions,
    dry_run: bool,
}

impl<'a, F: FileSystem + ?Sized> Applier<'a, F> {
    /// Create an applier writing through `fs` and reporting to `sink`
    pub fn new(fs: &'a F, sink: &'a dyn EventSink) -> Self {
        Self {
            fs,
            sink,
            copy: CopyOptions::default(),
            dry_run: false,
        }
    }

    /// Set how copies preserve metadata
    pub fn with_copy_options(mut self, copy: CopyOptions) -> Self {
        self.copy = copy;
        self
    }

    /// Report actions without performing them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply every action of `plan` in order
    ///
    /// A failed action is recorded and the next one is attempted. When a
    /// directory cannot be created, every later action strictly inside it is
    /// skipped for this run.
    pub fn apply(&self, plan: ActionPlan) -> StageReport {
        let mut report = StageReport::new();
        let mut blocked: Vec<PathBuf> = Vec::new();

        for action in plan {
            let target = action.target();
            if let Some(dir) = blocked
                .iter()
                .find(|dir| target != dir.as_path() && target.starts_with(dir))
            {
                debug!(
                    "Skipping {}: folder {} could not be created",
                    target.display(),
                    dir.display()
                );
                continue;
            }

            if self.dry_run {
                self.sink.report_action(&action, true);
                report.push_action(action);
                continue;
            }

            match self.execute(&action) {
                Ok(applied) => {
                    self.sink.report_action(&applied, false);
                    report.push_action(applied);
                }
                Err(error) => {
                    let failure = EntryError::from_io(action.operation(), target, &error);
                    self.sink.report_error(&failure);
                    report.push_error(failure);
                    if let Action::CreateDir { path } = action {
                        blocked.push(path);
                    }
                }
            }
        }

        report
    }

    fn execute(&self, action: &Action) -> io::Result<Action> {
        match action {
            Action::CreateDir { path } => self.fs.create_dir_all(path)?,
            Action::CopyFile {
                from, to, reason, ..
            } => {
                let size = self.fs.copy_file(from, to, self.copy)?;
                return Ok(Action::CopyFile {
                    from: from.clone(),
                    to: to.clone(),
                    reason: *reason,
                    size,
                });
            }
            Action::RemoveFile { path } => self.fs.remove_file(path)?,
            Action::RemoveDir { path } => self.fs.remove_dir_all(path)?,
        }
        Ok(action.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::{Fault, MemoryFs};
    use crate::sink::{CollectingSink, SinkEvent};
    use ferrosync_types::{CopyReason, EntryKind, Operation};
    use std::path::Path;

    fn copy(from: &str, to: &str) -> Action {
        Action::CopyFile {
            from: PathBuf::from(from),
            to: PathBuf::from(to),
            reason: CopyReason::Missing,
            size: 0,
        }
    }

    fn plan(actions: Vec<Action>) -> ActionPlan {
        let mut plan = ActionPlan::new();
        for action in actions {
            plan.push(action);
        }
        plan
    }

    #[test]
    fn test_apply_reports_actual_copy_size() {
        let fs = MemoryFs::new();
        fs.add_file("/src/f", "12345").add_dir("/dst");
        let sink = CollectingSink::new();

        let report = Applier::new(&fs, &sink).apply(plan(vec![copy("/src/f", "/dst/f")]));

        assert!(matches!(report.actions[..], [Action::CopyFile { size: 5, .. }]));
        assert_eq!(fs.read("/dst/f"), Some(b"12345".to_vec()));
        assert_eq!(sink.actions().len(), 1);
    }

    #[test]
    fn test_failed_directory_blocks_its_subtree_only() {
        let fs = MemoryFs::new();
        fs.add_file("/src/bad/f", "x")
            .add_file("/src/good/g", "y")
            .add_dir("/dst");
        fs.fail("/dst/bad", Fault::CreateDir);
        let sink = CollectingSink::new();

        let report = Applier::new(&fs, &sink).apply(plan(vec![
            Action::CreateDir {
                path: PathBuf::from("/dst/bad"),
            },
            copy("/src/bad/f", "/dst/bad/f"),
            Action::CreateDir {
                path: PathBuf::from("/dst/good"),
            },
            copy("/src/good/g", "/dst/good/g"),
        ]));

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].operation, Operation::CreateDir);
        assert_eq!(report.errors[0].path, PathBuf::from("/dst/bad"));
        assert_eq!(report.actions.len(), 2);
        assert_eq!(fs.read("/dst/good/g"), Some(b"y".to_vec()));
        assert_eq!(fs.kind("/dst/bad"), None);
        assert_eq!(sink.errors().len(), 1);
    }

    #[test]
    fn test_failed_copy_does_not_stop_siblings() {
        let fs = MemoryFs::new();
        fs.add_file("/src/a", "a").add_file("/src/b", "b").add_dir("/dst");
        fs.fail("/dst/a", Fault::Copy);
        let sink = CollectingSink::new();

        let report = Applier::new(&fs, &sink).apply(plan(vec![
            copy("/src/a", "/dst/a"),
            copy("/src/b", "/dst/b"),
        ]));

        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.errors[0].io_kind, Some(io::ErrorKind::PermissionDenied));
        assert_eq!(fs.read("/dst/b"), Some(b"b".to_vec()));
        assert_eq!(fs.kind("/dst/a"), None);
    }

    #[test]
    fn test_dry_run_reports_without_writing() {
        let fs = MemoryFs::new();
        fs.add_file("/src/f", "x").add_file("/dst/stale", "y");
        let sink = CollectingSink::new();

        let report = Applier::new(&fs, &sink).with_dry_run(true).apply(plan(vec![
            Action::CreateDir {
                path: PathBuf::from("/dst/new"),
            },
            copy("/src/f", "/dst/new/f"),
            Action::RemoveFile {
                path: PathBuf::from("/dst/stale"),
            },
        ]));

        assert_eq!(report.actions.len(), 3);
        assert_eq!(fs.kind("/dst/new"), None);
        assert_eq!(fs.kind("/dst/stale"), Some(EntryKind::File));
        assert!(sink
            .events()
            .iter()
            .all(|event| matches!(event, SinkEvent::Action { dry_run: true, .. })));
    }

    #[test]
    fn test_removals() {
        let fs = MemoryFs::new();
        fs.add_file("/dst/old/deep/f", "x").add_file("/dst/c", "y");
        let sink = CollectingSink::new();

        let report = Applier::new(&fs, &sink).apply(plan(vec![
            Action::RemoveDir {
                path: PathBuf::from("/dst/old"),
            },
            Action::RemoveFile {
                path: PathBuf::from("/dst/c"),
            },
        ]));

        assert!(report.errors.is_empty());
        assert!(fs.entries_under("/dst").is_empty());
        assert_eq!(report.actions[0].target(), Path::new("/dst/old"));
    }
}
