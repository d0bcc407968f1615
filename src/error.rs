use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("Failed to open {file}: {source}")]
    StreamOpen {
        file: String,
        source: std::io::Error,
    },

    #[error("Failed to read record {record} of {file}: {message}")]
    Parse {
        file: String,
        record: u64,
        message: String,
    },

    #[error("Malformed target URI {uri:?} in {file}: {reason}")]
    MalformedUri {
        file: String,
        uri: String,
        reason: String,
    },

    #[error("Unsupported file (expected .warc or .warc.gz; other .gz archives are not read): {}", path.display())]
    UnsupportedFile { path: PathBuf },

    #[error("Not a readable file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("No files submitted")]
    EmptyBatch,

    #[error("A batch is already in progress")]
    BatchInProgress,

    #[error("Analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;

/// Failure reported by a record source while yielding a record.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RecordError(pub String);
