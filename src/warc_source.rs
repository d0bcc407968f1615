use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use warc::{BufferedBody, Record, WarcHeader, WarcReader};

use crate::error::RecordError;
use crate::record::{ArchiveRecord, RecordSource, RecordStream, RESPONSE_TYPE};

const MAX_HTTP_HEADERS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Compression implied by a `.warc` / `.warc.gz` file name, `None` for anything else.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".warc.gz") {
            Some(Self::Gzip)
        } else if name.ends_with(".warc") {
            Some(Self::None)
        } else {
            None
        }
    }
}

/// A WARC file on disk, read through the `warc` crate.
#[derive(Debug, Clone)]
pub struct WarcFile {
    path: PathBuf,
    name: String,
    compression: Compression,
}

impl WarcFile {
    pub fn new(path: PathBuf, compression: Compression) -> Self {
        let name = path.display().to_string();
        Self {
            path,
            name,
            compression,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl RecordSource for WarcFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<RecordStream<'_>> {
        match self.compression {
            Compression::Gzip => Ok(stream_records(WarcReader::from_path_gzip(&self.path)?)),
            Compression::None => Ok(records_from_reader(BufReader::new(File::open(
                &self.path,
            )?))),
        }
    }
}

/// Streams records from any uncompressed WARC byte source.
pub fn records_from_reader<'a, R: BufRead + 'a>(reader: R) -> RecordStream<'a> {
    stream_records(WarcReader::new(reader))
}

fn stream_records<'a, R: BufRead + 'a>(reader: WarcReader<R>) -> RecordStream<'a> {
    Box::new(reader.iter_records().map(|result| {
        result
            .map(to_archive_record)
            .map_err(|e| RecordError(e.to_string()))
    }))
}

fn to_archive_record(record: Record<BufferedBody>) -> ArchiveRecord {
    let record_type = record.warc_type().to_string();
    let target_uri = record
        .header(WarcHeader::TargetURI)
        .map(|uri| uri.into_owned());
    let content_type = if record_type == RESPONSE_TYPE {
        http_content_type(record.body())
    } else {
        None
    };

    trace!(
        action = "read",
        component = "warc_record",
        record_type = %record_type,
        target_uri = ?target_uri,
        "Read WARC record"
    );

    ArchiveRecord {
        record_type,
        content_type,
        target_uri,
        captured_at: Some(*record.date()),
    }
}

/// `Content-Type` of the HTTP response at the start of a record block.
pub fn http_content_type(block: &[u8]) -> Option<String> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HTTP_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    // Crawled responses often carry broken headers next to a usable Content-Type.
    let mut config = httparse::ParserConfig::default();
    config
        .allow_spaces_after_header_name_in_responses(true)
        .allow_obsolete_multiline_headers_in_responses(true)
        .ignore_invalid_headers_in_responses(true);

    if let Err(e) = config.parse_response(&mut response, block) {
        debug!(action = "parse", component = "http_headers", error = %e, "Record block is not an HTTP response");
        return None;
    }

    response
        .headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case("content-type"))
        .map(|header| String::from_utf8_lossy(header.value).into_owned())
}
