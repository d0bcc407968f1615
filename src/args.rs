use clap::Parser;
use std::path::PathBuf;

use crate::analyzer::{AnalyzerConfig, UriPolicy};
use crate::report::ReportOptions;

#[derive(Parser, Debug)]
#[command(
    name = "warc-tally",
    about = "Tally record types, media types and hostnames across WARC files",
    version,
    long_about = None
)]
pub struct Args {
    /// WARC files to analyze (.warc or .warc.gz), processed in the given order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Number of top entries to display per table
    #[arg(short, long)]
    pub top: Option<usize>,

    /// Print the final tallies as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip response records with malformed target URIs instead of stopping
    #[arg(long)]
    pub skip_invalid_uris: bool,

    /// Redact hostnames for privacy
    #[arg(long)]
    pub redact: bool,

    /// Do not show live progress
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            uri_policy: if self.skip_invalid_uris {
                UriPolicy::Skip
            } else {
                UriPolicy::Abort
            },
        }
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            top: self.top,
            redact: self.redact,
        }
    }
}
