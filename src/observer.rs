use std::sync::mpsc::Sender;

use crate::stats::{AnalysisState, BatchStatus};

/// A unit of progress published by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisEvent<'a> {
    BatchStarted { total_files: usize },
    FileStarted { index: usize, name: &'a str },
    RecordProcessed,
    FileCompleted { index: usize, name: &'a str },
    BatchFinished { status: BatchStatus },
}

/// Receives every event together with a read-only view of the state it produced.
///
/// Observers run on the analyzing thread while the state lock is held, so they
/// must not call back into the analyzer.
pub trait AnalysisObserver: Send {
    fn on_event(&mut self, event: &AnalysisEvent<'_>, state: &AnalysisState);
}

impl<F> AnalysisObserver for F
where
    F: FnMut(&AnalysisEvent<'_>, &AnalysisState) + Send,
{
    fn on_event(&mut self, event: &AnalysisEvent<'_>, state: &AnalysisState) {
        self(event, state)
    }
}

/// Forwards owned snapshots over a channel: one per `every` records, plus one at
/// every file boundary and at the end of the batch.
pub struct SnapshotChannel {
    sender: Sender<AnalysisState>,
    every: u64,
}

impl SnapshotChannel {
    pub fn new(sender: Sender<AnalysisState>, every: u64) -> Self {
        Self {
            sender,
            every: every.max(1),
        }
    }
}

impl AnalysisObserver for SnapshotChannel {
    fn on_event(&mut self, event: &AnalysisEvent<'_>, state: &AnalysisState) {
        let publish = match event {
            AnalysisEvent::RecordProcessed => state.total_records_processed % self.every == 0,
            AnalysisEvent::FileCompleted { .. } | AnalysisEvent::BatchFinished { .. } => true,
            AnalysisEvent::BatchStarted { .. } | AnalysisEvent::FileStarted { .. } => false,
        };
        if publish {
            // A dropped receiver just means nobody is listening anymore.
            let _ = self.sender.send(state.clone());
        }
    }
}
