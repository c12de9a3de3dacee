//! Pure diff of two tree snapshots into an ordered action plan
//!
//! Planning never writes. The only I/O it performs is the content comparison
//! delegated to the [`ContentOracle`].

use crate::oracle::ContentOracle;
use crate::snapshot::TreeSnapshot;
use ferrosync_types::{Action, CopyReason, EntryError, EntryKind, Operation, PathMapping};
use std::path::PathBuf;

/// Ordered list of actions that make the replica match the source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    actions: Vec<Action>,
}

impl ActionPlan {
    /// Create an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action
    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Planned actions in execution order
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of planned actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True when nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl IntoIterator for ActionPlan {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

impl FromIterator<Action> for ActionPlan {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

/// Plan the creations and copies that bring every source entry into the
/// replica
///
/// Source entries are visited in snapshot order so a directory is always
/// created before anything inside it. A replica entry of the wrong kind is
/// removed right before its replacement is created. Source entries that are
/// neither files nor directories are skipped with a warning, and so is
/// anything at or below a replica path that could not be listed.
pub fn plan_additions(
    source: &TreeSnapshot,
    replica: &TreeSnapshot,
    mapping: &PathMapping,
    oracle: &dyn ContentOracle,
) -> (ActionPlan, Vec<EntryError>) {
    let mut plan = ActionPlan::new();
    let mut warnings = Vec::new();

    for (relative, metadata) in source.iter() {
        if replica.is_unreadable_under(relative) {
            continue;
        }
        let source_path = mapping.source_for(relative);
        let replica_path = mapping.replica_for(relative);
        let existing = replica.get(relative).map(|meta| meta.kind);

        match metadata.kind {
            EntryKind::Directory => {
                match existing {
                    Some(EntryKind::Directory) => continue,
                    Some(_) => plan.push(Action::RemoveFile {
                        path: replica_path.clone(),
                    }),
                    None => {}
                }
                plan.push(Action::CreateDir { path: replica_path });
            }
            EntryKind::File => {
                let reason = match existing {
                    None => CopyReason::Missing,
                    Some(EntryKind::Directory) => {
                        plan.push(Action::RemoveDir {
                            path: replica_path.clone(),
                        });
                        CopyReason::Missing
                    }
                    Some(EntryKind::Other) => {
                        plan.push(Action::RemoveFile {
                            path: replica_path.clone(),
                        });
                        CopyReason::Missing
                    }
                    Some(EntryKind::File) => match oracle.equal(&source_path, &replica_path) {
                        Ok(true) => continue,
                        Ok(false) => CopyReason::ContentChanged,
                        Err(error) => {
                            warnings.push(EntryError::warning(
                                Operation::Compare,
                                &replica_path,
                                format!("cannot compare contents, copying anyway: {error}"),
                            ));
                            CopyReason::Unverified
                        }
                    },
                };
                plan.push(Action::CopyFile {
                    from: source_path,
                    to: replica_path,
                    reason,
                    size: metadata.size,
                });
            }
            EntryKind::Other => warnings.push(EntryError::warning(
                Operation::Scan,
                source_path,
                "skipping symbolic link or special file",
            )),
        }
    }

    (plan, warnings)
}

/// Plan the removal of every replica entry without a same-kind source
/// counterpart
///
/// A removed directory is removed as a whole, so nothing below it is planned.
/// Entries under a source path that could not be read are kept, since their
/// orphan status is unknown.
pub fn plan_removals(
    source: &TreeSnapshot,
    replica: &TreeSnapshot,
    mapping: &PathMapping,
) -> ActionPlan {
    let mut plan = ActionPlan::new();
    let mut removed_dir: Option<PathBuf> = None;

    for (relative, metadata) in replica.iter() {
        if removed_dir
            .as_deref()
            .is_some_and(|dir| relative.starts_with(dir))
        {
            continue;
        }
        if source.is_unreadable_under(relative) {
            continue;
        }

        let counterpart = source.get(relative).map(|meta| meta.kind);
        let replica_path = mapping.replica_for(relative);
        match metadata.kind {
            EntryKind::Directory if counterpart != Some(EntryKind::Directory) => {
                plan.push(Action::RemoveDir { path: replica_path });
                removed_dir = Some(relative.to_path_buf());
            }
            EntryKind::File if counterpart != Some(EntryKind::File) => {
                plan.push(Action::RemoveFile { path: replica_path });
            }
            EntryKind::Other => plan.push(Action::RemoveFile { path: replica_path }),
            _ => {}
        }
    }

    plan
}
