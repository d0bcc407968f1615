use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

use crate::domain::{extract_host, normalize_media_type};
use crate::error::{AnalyzeError, Result};
use crate::observer::{AnalysisEvent, AnalysisObserver};
use crate::record::{ArchiveRecord, RecordSource};
use crate::stats::{AnalysisState, BatchStatus};

/// What to do with a response record whose target URI cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UriPolicy {
    /// Fail the batch.
    #[default]
    Abort,
    /// Count the record everywhere except the host table and tally it.
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfig {
    pub uri_policy: UriPolicy,
}

/// Shared flag that stops a running batch before its next record.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Everything one record adds to the tallies, computed before any table is touched.
struct Contribution<'r> {
    record: &'r ArchiveRecord,
    media_type: Option<String>,
    host: Option<String>,
    invalid_uri: bool,
}

/// Clears the busy flag when a batch ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Tallies record types, media types and hosts across a batch of archives.
///
/// Files are processed one after another on the calling thread. The state sits
/// behind a lock so other threads can take snapshots or cancel while a batch runs.
pub struct Analyzer {
    config: AnalyzerConfig,
    state: Mutex<AnalysisState>,
    observers: Mutex<Vec<Box<dyn AnalysisObserver>>>,
    busy: AtomicBool,
    cancel: CancellationToken,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AnalysisState::default()),
            observers: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Registers an observer for every later event.
    ///
    /// Observers are called while the state lock is held: calling
    /// [`Analyzer::snapshot`] or [`Analyzer::status`] from inside one deadlocks.
    /// Use the `&AnalysisState` passed to the observer instead.
    pub fn subscribe(&self, observer: impl AnalysisObserver + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> AnalysisState {
        self.lock_state().clone()
    }

    pub fn status(&self) -> BatchStatus {
        self.lock_state().status
    }

    /// Analyzes `files` in order, replacing any previous results.
    ///
    /// Returns the final state, or the first error. Counts gathered before an
    /// error stay available through [`Analyzer::snapshot`].
    pub fn submit_batch<S: RecordSource>(&self, files: &[S]) -> Result<AnalysisState> {
        if files.is_empty() {
            return Err(AnalyzeError::EmptyBatch);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                action = "reject",
                component = "batch",
                "Batch submitted while another is running"
            );
            return Err(AnalyzeError::BatchInProgress);
        }
        let _busy = BusyGuard(&self.busy);

        let start_time = Instant::now();
        self.cancel.reset();
        {
            let mut state = self.lock_state();
            *state = AnalysisState::for_batch(files.len());
            self.notify(
                &AnalysisEvent::BatchStarted {
                    total_files: files.len(),
                },
                &state,
            );
        }
        info!(
            action = "start",
            component = "batch",
            file_count = files.len(),
            "Starting WARC analysis"
        );

        let outcome = files
            .iter()
            .enumerate()
            .try_for_each(|(index, file)| self.process_file(index, file));

        let status = match &outcome {
            Ok(()) => BatchStatus::Completed,
            Err(AnalyzeError::Cancelled) => BatchStatus::Cancelled,
            Err(_) => BatchStatus::Failed,
        };

        let final_state = {
            let mut state = self.lock_state();
            state.status = status;
            state.current_file = None;
            self.notify(&AnalysisEvent::BatchFinished { status }, &state);
            state.clone()
        };

        let total_time = start_time.elapsed();
        match &outcome {
            Ok(()) => info!(
                action = "complete",
                component = "batch",
                records = final_state.total_records_processed,
                files = final_state.files_completed,
                duration_ms = total_time.as_millis(),
                "Analysis completed successfully"
            ),
            Err(e) => warn!(
                action = "abort",
                component = "batch",
                status = ?status,
                records = final_state.total_records_processed,
                files = final_state.files_completed,
                duration_ms = total_time.as_millis(),
                error = %e,
                "Analysis stopped early"
            ),
        }

        outcome.map(|()| final_state)
    }

    fn process_file<S: RecordSource>(&self, index: usize, file: &S) -> Result<()> {
        let start_time = Instant::now();
        let name = file.name();

        if self.cancel.is_cancelled() {
            return Err(AnalyzeError::Cancelled);
        }

        {
            let mut state = self.lock_state();
            state.current_file = Some(name.to_string());
            self.notify(&AnalysisEvent::FileStarted { index, name }, &state);
        }
        info!(action = "open", component = "warc_file", file = name, index, "Opening WARC file");

        let records = file.open().map_err(|source| AnalyzeError::StreamOpen {
            file: name.to_string(),
            source,
        })?;

        let mut record_count: u64 = 0;
        for record in records {
            if self.cancel.is_cancelled() {
                info!(action = "cancel", component = "warc_file", file = name, "Cancellation requested");
                return Err(AnalyzeError::Cancelled);
            }

            let record = record.map_err(|e| AnalyzeError::Parse {
                file: name.to_string(),
                record: record_count + 1,
                message: e.to_string(),
            })?;
            let contribution = self.contribution(name, &record)?;

            let mut state = self.lock_state();
            apply(&mut state, &contribution);
            self.notify(&AnalysisEvent::RecordProcessed, &state);
            record_count += 1;
        }

        {
            let mut state = self.lock_state();
            state.files_completed += 1;
            self.notify(&AnalysisEvent::FileCompleted { index, name }, &state);
        }

        let file_time = start_time.elapsed();
        info!(
            action = "complete",
            component = "warc_file",
            file = name,
            records = record_count,
            duration_ms = file_time.as_millis(),
            "Finished WARC file"
        );
        Ok(())
    }

    fn contribution<'r>(&self, file: &str, record: &'r ArchiveRecord) -> Result<Contribution<'r>> {
        if !record.is_response() {
            return Ok(Contribution {
                record,
                media_type: None,
                host: None,
                invalid_uri: false,
            });
        }

        let media_type = Some(normalize_media_type(record.content_type.as_deref()));
        let uri = record.target_uri.as_deref().unwrap_or("");

        match extract_host(uri) {
            Ok(host) => Ok(Contribution {
                record,
                media_type,
                host: Some(host),
                invalid_uri: false,
            }),
            Err(e) => match self.config.uri_policy {
                UriPolicy::Abort => Err(AnalyzeError::MalformedUri {
                    file: file.to_string(),
                    uri: uri.to_string(),
                    reason: e.to_string(),
                }),
                UriPolicy::Skip => {
                    warn!(action = "skip", component = "target_uri", file, uri, error = %e, "Skipping malformed target URI");
                    Ok(Contribution {
                        record,
                        media_type,
                        host: None,
                        invalid_uri: true,
                    })
                }
            },
        }
    }

    fn notify(&self, event: &AnalysisEvent<'_>, state: &AnalysisState) {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter_mut() {
            observer.on_event(event, state);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, AnalysisState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply(state: &mut AnalysisState, contribution: &Contribution<'_>) {
    let record = contribution.record;
    state.total_records_processed += 1;
    state.record_type_counts.increment(&record.record_type);
    if let Some(media_type) = &contribution.media_type {
        state.media_type_counts.increment(media_type);
    }
    if let Some(host) = &contribution.host {
        state.host_counts.increment(host);
    }
    if contribution.invalid_uri {
        state.invalid_target_uris += 1;
    }
    if let Some(captured_at) = record.captured_at {
        state.observe_capture(captured_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNKNOWN_KEY;
    use crate::record::MemorySource;
    use crate::stats::FrequencyTable;
    use std::sync::mpsc;
    use std::thread;

    fn response(uri: &str, content_type: Option<&str>) -> ArchiveRecord {
        ArchiveRecord::response(uri, content_type)
    }

    fn table(entries: &[(&str, u64)]) -> FrequencyTable {
        let mut table = FrequencyTable::new();
        for (key, count) in entries {
            for _ in 0..*count {
                table.increment(key);
            }
        }
        table
    }

    #[test]
    fn single_file_mixed_records() {
        let file = MemorySource::new(
            "a.warc",
            vec![
                response("http://example.com/", Some("text/html; charset=utf-8")),
                response("http://example.com/about", Some("text/html")),
                ArchiveRecord::new("warcinfo"),
            ],
        );

        let analyzer = Analyzer::default();
        let state = analyzer.submit_batch(&[file]).unwrap();

        assert_eq!(
            state.record_type_counts,
            table(&[("response", 2), ("warcinfo", 1)])
        );
        assert_eq!(state.media_type_counts, table(&[("text/html", 2)]));
        assert_eq!(state.total_records_processed, 3);
        assert_eq!(state.files_completed, 1);
        assert_eq!(state.status, BatchStatus::Completed);
        assert_eq!(analyzer.status(), BatchStatus::Completed);
    }

    #[test]
    fn hosts_are_tallied_per_response() {
        let file = MemorySource::new(
            "a.warc",
            vec![
                response("http://example.com/a", Some("text/html")),
                response("http://example.com/b", Some("text/css")),
                ArchiveRecord {
                    target_uri: Some("http://other.org/".to_string()),
                    ..ArchiveRecord::new("request")
                },
            ],
        );

        let state = Analyzer::default().submit_batch(&[file]).unwrap();
        assert_eq!(state.host_counts, table(&[("example.com", 2)]));
    }

    #[test]
    fn empty_file_still_completes() {
        let files = vec![
            MemorySource::new("empty.warc", Vec::new()),
            MemorySource::new("one.warc", vec![ArchiveRecord::new("warcinfo")]),
        ];

        let state = Analyzer::default().submit_batch(&files).unwrap();
        assert_eq!(state.files_completed, 2);
        assert_eq!(state.total_records_processed, 1);
    }

    #[test]
    fn missing_content_type_uses_unknown_key() {
        let file = MemorySource::new("a.warc", vec![response("http://example.com/", None)]);

        let state = Analyzer::default().submit_batch(&[file]).unwrap();
        assert_eq!(state.media_type_counts, table(&[(UNKNOWN_KEY, 1)]));
        assert_eq!(state.host_counts, table(&[("example.com", 1)]));
    }

    #[test]
    fn invariants_hold_after_every_update() {
        let files = vec![
            MemorySource::new(
                "a.warc",
                vec![
                    ArchiveRecord::new("warcinfo"),
                    response("http://a.example/", Some("text/html")),
                    ArchiveRecord::new("request"),
                ],
            ),
            MemorySource::new(
                "b.warc",
                vec![
                    response("https://b.example/x", Some("image/png")),
                    ArchiveRecord::new("metadata"),
                ],
            ),
        ];

        let analyzer = Analyzer::default();
        let (tx, rx) = mpsc::channel();
        analyzer.subscribe(move |event: &AnalysisEvent<'_>, state: &AnalysisState| {
            let completed = matches!(event, AnalysisEvent::FileCompleted { .. });
            tx.send((completed, state.clone())).unwrap();
        });
        analyzer.submit_batch(&files).unwrap();

        let mut last_completed = 0;
        let mut completions = 0;
        for (completed, state) in rx.try_iter() {
            assert_eq!(
                state.total_records_processed,
                state.record_type_counts.total()
            );
            let responses = state.record_type_counts.get("response");
            assert_eq!(state.media_type_counts.total(), responses);
            assert_eq!(state.host_counts.total(), responses);
            assert!(state.files_completed >= last_completed);
            assert!(state.files_completed <= state.total_files_submitted);
            if completed {
                completions += 1;
                assert_eq!(state.files_completed, completions);
            }
            last_completed = state.files_completed;
        }
        assert_eq!(completions, 2);
    }

    #[test]
    fn events_arrive_in_processing_order() {
        let files = vec![
            MemorySource::new("a.warc", vec![ArchiveRecord::new("warcinfo")]),
            MemorySource::new("b.warc", Vec::new()),
        ];
        let analyzer = Analyzer::default();
        let (tx, rx) = mpsc::channel();
        analyzer.subscribe(move |event: &AnalysisEvent<'_>, _: &AnalysisState| {
            let label = match event {
                AnalysisEvent::BatchStarted { total_files } => format!("batch:{}", total_files),
                AnalysisEvent::FileStarted { name, .. } => format!("start:{}", name),
                AnalysisEvent::RecordProcessed => "record".to_string(),
                AnalysisEvent::FileCompleted { name, .. } => format!("done:{}", name),
                AnalysisEvent::BatchFinished { status } => format!("finished:{:?}", status),
            };
            tx.send(label).unwrap();
        });

        analyzer.submit_batch(&files).unwrap();
        let labels: Vec<String> = rx.try_iter().collect();
        assert_eq!(
            labels,
            vec![
                "batch:2",
                "start:a.warc",
                "record",
                "done:a.warc",
                "start:b.warc",
                "done:b.warc",
                "finished:Completed",
            ]
        );
    }

    #[test]
    fn new_batch_discards_previous_results() {
        let analyzer = Analyzer::default();
        analyzer
            .submit_batch(&[MemorySource::new(
                "a.warc",
                vec![ArchiveRecord::new("warcinfo"), ArchiveRecord::new("request")],
            )])
            .unwrap();

        let state = analyzer
            .submit_batch(&[MemorySource::new("b.warc", vec![ArchiveRecord::new("request")])])
            .unwrap();
        assert_eq!(state.total_records_processed, 1);
        assert_eq!(state.record_type_counts, table(&[("request", 1)]));
        assert_eq!(state.total_files_submitted, 1);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let files: Vec<MemorySource> = Vec::new();
        assert!(matches!(
            Analyzer::default().submit_batch(&files),
            Err(AnalyzeError::EmptyBatch)
        ));
    }

    #[test]
    fn malformed_uri_aborts_by_default() {
        let files = vec![
            MemorySource::new("a.warc", vec![response("http://example.com/", Some("text/html"))]),
            MemorySource::new(
                "b.warc",
                vec![
                    ArchiveRecord::new("warcinfo"),
                    response("::not a uri::", Some("text/html")),
                    ArchiveRecord::new("request"),
                ],
            ),
            MemorySource::new("c.warc", vec![ArchiveRecord::new("warcinfo")]),
        ];

        let analyzer = Analyzer::default();
        let err = analyzer.submit_batch(&files).unwrap_err();
        assert!(matches!(err, AnalyzeError::MalformedUri { ref file, .. } if file == "b.warc"));

        let state = analyzer.snapshot();
        assert_eq!(state.status, BatchStatus::Failed);
        assert_eq!(state.files_completed, 1);
        // The failing record contributes nothing.
        assert_eq!(state.total_records_processed, 2);
        assert_eq!(state.record_type_counts.get("response"), 1);
        assert_eq!(state.media_type_counts.total(), 1);
    }

    #[test]
    fn missing_target_uri_is_malformed() {
        let record = ArchiveRecord {
            content_type: Some("text/html".to_string()),
            ..ArchiveRecord::new("response")
        };
        let err = Analyzer::default()
            .submit_batch(&[MemorySource::new("a.warc", vec![record])])
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::MalformedUri { ref uri, .. } if uri.is_empty()));
    }

    #[test]
    fn malformed_uri_is_tallied_when_skipping() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            uri_policy: UriPolicy::Skip,
        });
        let file = MemorySource::new(
            "a.warc",
            vec![
                response("not a uri", Some("text/plain")),
                response("http://example.com/", Some("text/html")),
            ],
        );

        let state = analyzer.submit_batch(&[file]).unwrap();
        assert_eq!(state.total_records_processed, 2);
        assert_eq!(state.invalid_target_uris, 1);
        assert_eq!(state.media_type_counts.total(), 2);
        assert_eq!(state.host_counts, table(&[("example.com", 1)]));
    }

    #[test]
    fn open_failure_stops_remaining_files() {
        let files = vec![
            MemorySource::new("a.warc", vec![ArchiveRecord::new("warcinfo")]),
            MemorySource::unopenable("b.warc"),
            MemorySource::new("c.warc", vec![ArchiveRecord::new("warcinfo")]),
        ];

        let analyzer = Analyzer::default();
        let err = analyzer.submit_batch(&files).unwrap_err();
        assert!(matches!(err, AnalyzeError::StreamOpen { ref file, .. } if file == "b.warc"));

        let state = analyzer.snapshot();
        assert_eq!(state.files_completed, 1);
        assert_eq!(state.total_records_processed, 1);
        assert_eq!(state.status, BatchStatus::Failed);
    }

    #[test]
    fn read_failure_reports_record_position() {
        let file = MemorySource::failing_after(
            "a.warc",
            vec![ArchiveRecord::new("warcinfo"), ArchiveRecord::new("request")],
            "unexpected end of block",
        );

        let analyzer = Analyzer::default();
        let err = analyzer.submit_batch(&[file]).unwrap_err();
        match err {
            AnalyzeError::Parse {
                file,
                record,
                message,
            } => {
                assert_eq!(file, "a.warc");
                assert_eq!(record, 3);
                assert_eq!(message, "unexpected end of block");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(analyzer.snapshot().total_records_processed, 2);
        assert_eq!(analyzer.snapshot().files_completed, 0);
    }

    #[test]
    fn cancellation_stops_before_next_record() {
        let analyzer = Analyzer::default();
        let token = analyzer.cancellation_token();
        analyzer.subscribe(move |event: &AnalysisEvent<'_>, state: &AnalysisState| {
            if *event == AnalysisEvent::RecordProcessed && state.total_records_processed == 2 {
                token.cancel();
            }
        });

        let records = (0..5).map(|_| ArchiveRecord::new("warcinfo")).collect();
        let files = vec![
            MemorySource::new("a.warc", records),
            MemorySource::new("b.warc", vec![ArchiveRecord::new("warcinfo")]),
        ];
        let err = analyzer.submit_batch(&files).unwrap_err();

        assert!(matches!(err, AnalyzeError::Cancelled));
        let state = analyzer.snapshot();
        assert_eq!(state.status, BatchStatus::Cancelled);
        assert_eq!(state.total_records_processed, 2);
        assert_eq!(state.files_completed, 0);
    }

    #[test]
    fn cancellation_does_not_leak_into_next_batch() {
        let analyzer = Analyzer::default();
        analyzer.cancellation_token().cancel();

        let state = analyzer
            .submit_batch(&[MemorySource::new("a.warc", vec![ArchiveRecord::new("warcinfo")])])
            .unwrap();
        assert_eq!(state.status, BatchStatus::Completed);
    }

    /// Source that blocks in `open` until released, to hold a batch in flight.
    struct GatedSource {
        opened: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl RecordSource for GatedSource {
        fn name(&self) -> &str {
            "gated.warc"
        }

        fn open(&self) -> std::io::Result<crate::record::RecordStream<'_>> {
            self.opened.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(Box::new(std::iter::once(Ok(ArchiveRecord::new("warcinfo")))))
        }
    }

    #[test]
    fn concurrent_submission_is_rejected() {
        let (opened_tx, opened_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gated = GatedSource {
            opened: Mutex::new(opened_tx),
            release: Mutex::new(release_rx),
        };
        let analyzer = Analyzer::default();

        thread::scope(|scope| {
            let running = scope.spawn(|| analyzer.submit_batch(std::slice::from_ref(&gated)));

            opened_rx.recv().unwrap();
            assert_eq!(analyzer.status(), BatchStatus::Running);
            let second = analyzer.submit_batch(&[MemorySource::new("other.warc", Vec::new())]);
            assert!(matches!(second, Err(AnalyzeError::BatchInProgress)));

            release_tx.send(()).unwrap();
            let state = running.join().unwrap().unwrap();
            assert_eq!(state.total_records_processed, 1);
            assert_eq!(state.total_files_submitted, 1);
        });

        // Once the first batch is done a new one is accepted.
        assert!(analyzer
            .submit_batch(&[MemorySource::new("other.warc", Vec::new())])
            .is_ok());
    }
}
