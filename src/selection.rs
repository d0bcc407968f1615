use std::path::PathBuf;
use tracing::info;

use crate::error::{AnalyzeError, Result};
use crate::warc_source::{Compression, WarcFile};

/// Turns user-supplied paths into WARC file handles, keeping their order.
pub fn select_files(paths: &[PathBuf]) -> Result<Vec<WarcFile>> {
    if paths.is_empty() {
        return Err(AnalyzeError::EmptyBatch);
    }

    let files = paths
        .iter()
        .map(|path| {
            let compression = Compression::from_path(path)
                .ok_or_else(|| AnalyzeError::UnsupportedFile { path: path.clone() })?;
            if !path.is_file() {
                return Err(AnalyzeError::NotAFile { path: path.clone() });
            }
            Ok(WarcFile::new(path.clone(), compression))
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        action = "select",
        component = "file_selection",
        file_count = files.len(),
        "Selected WARC files"
    );
    Ok(files)
}
