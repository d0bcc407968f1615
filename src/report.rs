use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::observer::{AnalysisEvent, AnalysisObserver};
use crate::stats::{AnalysisState, BatchStatus, FrequencyTable};
use crate::utils::{format_number, redact_host};

const LIVE_REFRESH: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub top: Option<usize>,
    pub redact: bool,
}

/// `M / N WARC files analyzed [K records]`
pub fn progress_line(state: &AnalysisState) -> String {
    format!(
        "{} / {} WARC files analyzed [{} records]",
        state.files_completed,
        state.total_files_submitted,
        format_number(state.total_records_processed)
    )
}

pub fn render_text(state: &AnalysisState, options: &ReportOptions) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\n--- WARC Analysis ---");
    let _ = writeln!(out, "{}", progress_line(state));
    match state.status {
        BatchStatus::Failed => {
            let _ = writeln!(out, "Incomplete: analysis stopped by an error");
        }
        BatchStatus::Cancelled => {
            let _ = writeln!(out, "Incomplete: analysis cancelled");
        }
        _ => {}
    }

    if let (Some(earliest), Some(latest), Some(days)) = (
        state.earliest_capture,
        state.latest_capture,
        state.capture_span_days(),
    ) {
        if days > 0 {
            let _ = writeln!(
                out,
                "Capture range: {} to {} ({} days)",
                earliest.format("%B %-d, %Y"),
                latest.format("%B %-d, %Y"),
                format_number(days as u64)
            );
        } else {
            let _ = writeln!(
                out,
                "Capture range: {} to {}",
                earliest.format("%B %-d, %Y"),
                latest.format("%B %-d, %Y")
            );
        }
    }

    if state.invalid_target_uris > 0 {
        let _ = writeln!(
            out,
            "Response records with malformed target URIs: {}",
            format_number(state.invalid_target_uris)
        );
    }

    write_table(&mut out, "WARC Record Types", &state.record_type_counts, options, false);
    write_table(&mut out, "Hostnames", &state.host_counts, options, options.redact);
    write_table(&mut out, "Media Types", &state.media_type_counts, options, false);

    out
}

fn write_table(
    out: &mut String,
    title: &str,
    table: &FrequencyTable,
    options: &ReportOptions,
    redact: bool,
) {
    if table.is_empty() {
        return;
    }

    let entries = table.sorted();
    let shown = options.top.unwrap_or(entries.len()).min(entries.len());

    if shown < entries.len() {
        let _ = writeln!(out, "\n{} (top {} of {}):", title, shown, entries.len());
    } else {
        let _ = writeln!(out, "\n{}:", title);
    }
    for (key, count) in entries.into_iter().take(shown) {
        let label = if redact {
            redact_host(key)
        } else {
            key.to_string()
        };
        let _ = writeln!(out, "- {}: {}", label, format_number(count));
    }
}

pub fn render_json(state: &AnalysisState) -> serde_json::Result<String> {
    serde_json::to_string_pretty(state)
}

/// Redraws the progress line in place while a batch runs.
pub struct LiveProgress<W: Write + Send> {
    out: W,
    last_draw: Option<Instant>,
}

impl LiveProgress<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> LiveProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_draw: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, state: &AnalysisState) {
        let line = match &state.current_file {
            Some(file) => format!("{} ({})", progress_line(state), file),
            None => progress_line(state),
        };
        let _ = write!(self.out, "\r\x1b[2K{}", line);
        let _ = self.out.flush();
        self.last_draw = Some(Instant::now());
    }
}

impl<W: Write + Send> AnalysisObserver for LiveProgress<W> {
    fn on_event(&mut self, event: &AnalysisEvent<'_>, state: &AnalysisState) {
        match event {
            AnalysisEvent::BatchStarted { .. } => self.last_draw = None,
            AnalysisEvent::RecordProcessed => {
                let due = self
                    .last_draw
                    .map_or(true, |last| last.elapsed() >= LIVE_REFRESH);
                if due {
                    self.draw(state);
                }
            }
            AnalysisEvent::FileStarted { .. } | AnalysisEvent::FileCompleted { .. } => {
                self.draw(state)
            }
            AnalysisEvent::BatchFinished { .. } => {
                self.draw(state);
                let _ = writeln!(self.out);
            }
        }
    }
}
