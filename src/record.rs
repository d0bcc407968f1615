use chrono::{DateTime, Utc};
use std::io;

use crate::error::RecordError;

pub const RESPONSE_TYPE: &str = "response";

/// The parts of a WARC record the analyzer looks at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveRecord {
    pub record_type: String,
    /// `Content-Type` of the HTTP message in the record block, if it had one.
    pub content_type: Option<String>,
    pub target_uri: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl ArchiveRecord {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ..Self::default()
        }
    }

    pub fn response(target_uri: impl Into<String>, content_type: Option<&str>) -> Self {
        Self {
            record_type: RESPONSE_TYPE.to_string(),
            content_type: content_type.map(str::to_string),
            target_uri: Some(target_uri.into()),
            captured_at: None,
        }
    }

    pub fn captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn is_response(&self) -> bool {
        self.record_type == RESPONSE_TYPE
    }
}

pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<ArchiveRecord, RecordError>> + 'a>;

/// One archive the analyzer can read: a name for reporting plus a way to open
/// a lazy, forward-only record stream over it.
pub trait RecordSource {
    fn name(&self) -> &str;

    fn open(&self) -> io::Result<RecordStream<'_>>;
}

/// Record source backed by an in-memory list, for embedding and tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    records: Vec<Result<ArchiveRecord, String>>,
    openable: bool,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, records: Vec<ArchiveRecord>) -> Self {
        Self {
            name: name.into(),
            records: records.into_iter().map(Ok).collect(),
            openable: true,
        }
    }

    /// A source that yields `records` and then fails with `message`.
    pub fn failing_after(
        name: impl Into<String>,
        records: Vec<ArchiveRecord>,
        message: impl Into<String>,
    ) -> Self {
        let mut source = Self::new(name, records);
        source.records.push(Err(message.into()));
        source
    }

    /// A source whose stream cannot be opened.
    pub fn unopenable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            openable: false,
        }
    }
}

impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<RecordStream<'_>> {
        if !self.openable {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not available", self.name),
            ));
        }
        Ok(Box::new(self.records.iter().map(|record| match record {
            Ok(record) => Ok(record.clone()),
            Err(message) => Err(RecordError(message.clone())),
        })))
    }
}
