use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Running count per key. Counts only grow while a batch is being analyzed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FrequencyTable {
    counts: BTreeMap<String, u64>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, key: &str) {
        match self.counts.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(key.to_string(), 1);
            }
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(key, count)| (key.as_str(), *count))
    }

    /// Entries by descending count; equal counts keep key order.
    pub fn sorted(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisState {
    pub status: BatchStatus,
    pub total_files_submitted: usize,
    pub files_completed: usize,
    pub current_file: Option<String>,
    pub total_records_processed: u64,
    pub invalid_target_uris: u64,
    pub earliest_capture: Option<DateTime<Utc>>,
    pub latest_capture: Option<DateTime<Utc>>,
    pub record_type_counts: FrequencyTable,
    pub media_type_counts: FrequencyTable,
    pub host_counts: FrequencyTable,
}

impl AnalysisState {
    pub fn for_batch(total_files_submitted: usize) -> Self {
        Self {
            status: BatchStatus::Running,
            total_files_submitted,
            ..Self::default()
        }
    }

    pub fn observe_capture(&mut self, captured_at: DateTime<Utc>) {
        if self.earliest_capture.map_or(true, |earliest| captured_at < earliest) {
            self.earliest_capture = Some(captured_at);
        }
        if self.latest_capture.map_or(true, |latest| captured_at > latest) {
            self.latest_capture = Some(captured_at);
        }
    }

    /// Whole days between the first and last capture seen so far.
    pub fn capture_span_days(&self) -> Option<i64> {
        match (self.earliest_capture, self.latest_capture) {
            (Some(earliest), Some(latest)) => Some((latest - earliest).num_days()),
            _ => None,
        }
    }
}
