pub mod analyzer;
pub mod args;
pub mod domain;
pub mod error;
pub mod observer;
pub mod record;
pub mod report;
pub mod selection;
pub mod stats;
pub mod utils;
pub mod warc_source;

pub use analyzer::{Analyzer, AnalyzerConfig, CancellationToken, UriPolicy};
pub use args::Args;
pub use error::{AnalyzeError, Result};
pub use observer::{AnalysisEvent, AnalysisObserver, SnapshotChannel};
pub use record::{ArchiveRecord, MemorySource, RecordSource};
pub use selection::select_files;
pub use stats::{AnalysisState, BatchStatus, FrequencyTable};
pub use warc_source::WarcFile;
