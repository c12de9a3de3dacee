//! Event sinks the engine reports through

use ferrosync_types::{Action, EntryError, EventSink, PathMapping, TickId, TickReport};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

/// Sink writing one log line per action and per error through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new tracing sink
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn report_start(&self, tick_id: TickId, mapping: &PathMapping) {
        info!(
            %tick_id,
            "Starting sync from {} to {}",
            mapping.source_root().display(),
            mapping.replica_root().display()
        );
    }

    fn report_action(&self, action: &Action, dry_run: bool) {
        if dry_run {
            info!("[dry-run] {action}");
        } else {
            info!("{action}");
        }
    }

    fn report_error(&self, entry_error: &EntryError) {
        if entry_error.is_warning() {
            warn!("{entry_error}");
        } else {
            error!("{entry_error}");
        }
    }

    fn report_completion(&self, report: &TickReport) {
        let stats = report.stats();
        info!(
            tick_id = %report.tick_id,
            "Sync completed in {:.2?}: {} folders created, {} files copied, {} files removed, {} folders removed, {} errors",
            report.duration,
            stats.directories_created,
            stats.files_copied,
            stats.files_removed,
            stats.directories_removed,
            stats.errors
        );
    }
}

/// Event recorded by a [`CollectingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A tick started
    Started {
        /// Tick identifier
        tick_id: TickId,
    },
    /// An action was reported
    Action {
        /// The action
        action: Action,
        /// Whether it was only planned
        dry_run: bool,
    },
    /// An error or warning was reported
    Error(EntryError),
    /// A tick completed
    Completed(Box<TickReport>),
}

/// Sink keeping every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl CollectingSink {
    /// Create an empty collecting sink
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All events so far, in order
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    /// Reported actions, in order
    pub fn actions(&self) -> Vec<Action> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Action { action, .. } => Some(action.clone()),
                _ => None,
            })
            .collect()
    }

    /// Reported errors and warnings, in order
    pub fn errors(&self) -> Vec<EntryError> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of completed ticks seen
    pub fn completed_ticks(&self) -> usize {
        self.lock()
            .iter()
            .filter(|event| matches!(event, SinkEvent::Completed(_)))
            .count()
    }

    /// Forget every recorded event
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl EventSink for CollectingSink {
    fn report_start(&self, tick_id: TickId, _mapping: &PathMapping) {
        self.lock().push(SinkEvent::Started { tick_id });
    }

    fn report_action(&self, action: &Action, dry_run: bool) {
        self.lock().push(SinkEvent::Action {
            action: action.clone(),
            dry_run,
        });
    }

    fn report_error(&self, error: &EntryError) {
        self.lock().push(SinkEvent::Error(error.clone()));
    }

    fn report_completion(&self, report: &TickReport) {
        self.lock()
            .push(SinkEvent::Completed(Box::new(report.clone())));
    }
}

/// Sink forwarding every event to several sinks
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Create a sink with no targets
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target sink
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of target sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True when there is no target sink
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanoutSink {
    fn report_start(&self, tick_id: TickId, mapping: &PathMapping) {
        for sink in &self.sinks {
            sink.report_start(tick_id, mapping);
        }
    }

    fn report_action(&self, action: &Action, dry_run: bool) {
        for sink in &self.sinks {
            sink.report_action(action, dry_run);
        }
    }

    fn report_error(&self, error: &EntryError) {
        for sink in &self.sinks {
            sink.report_error(error);
        }
    }

    fn report_completion(&self, report: &TickReport) {
        for sink in &self.sinks {
            sink.report_completion(report);
        }
    }
}
