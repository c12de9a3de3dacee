//! Core traits for ferrosync operations

use crate::{Action, EntryError, PathMapping, TickId, TickReport};

/// Destination for the human-readable progress of a mirror run
///
/// The engine never logs through a global; every action and every per-entry
/// error is handed to the sink it was built with.
pub trait EventSink: Send + Sync {
    /// A tick is about to start
    fn report_start(&self, _tick_id: TickId, _mapping: &PathMapping) {}

    /// An action was applied (or, in dry-run mode, would have been)
    fn report_action(&self, action: &Action, dry_run: bool);

    /// An entry could not be processed
    fn report_error(&self, error: &EntryError);

    /// A tick finished without a structural failure
    fn report_completion(&self, _report: &TickReport) {}
}
