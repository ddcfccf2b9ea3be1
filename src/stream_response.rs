// Per-request result of the streaming protocol
//
// Counts accepted, invalid and dropped events and keeps a small, deduplicated
// set of validation samples so clients can find their malformed documents.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Distinct validation messages kept per response.
pub const VALIDATION_SAMPLE_LIMIT: usize = 5;

/// The closed set of error kinds the streaming protocol reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StreamErrorKind {
    #[serde(rename = "ERR_QUEUE_FULL")]
    QueueFull,
    #[serde(rename = "ERR_PROCESSING_TIMEOUT")]
    ProcessingTimeout,
    #[serde(rename = "ERR_SCHEMA_VALIDATION")]
    SchemaValidation,
    #[serde(rename = "ERR_INVALID_JSON")]
    InvalidJson,
    #[serde(rename = "ERR_SHUTTING_DOWN")]
    ShuttingDown,
    #[serde(rename = "ERR_CONTENT_TYPE")]
    InvalidContentType,
}

impl StreamErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            StreamErrorKind::QueueFull => "queue is full",
            StreamErrorKind::ProcessingTimeout => "timeout while waiting to process request",
            StreamErrorKind::SchemaValidation => "validation error",
            StreamErrorKind::InvalidJson => "invalid JSON",
            StreamErrorKind::ShuttingDown => "server is shutting down",
            StreamErrorKind::InvalidContentType => {
                "invalid content-type. Expected 'application/x-ndjson'"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSample {
    pub error: String,
    pub object: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    pub count: u64,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<ValidationSample>,
}

impl ErrorDetails {
    fn new(kind: StreamErrorKind) -> Self {
        Self {
            count: 0,
            message: kind.message(),
            documents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamResponse {
    pub accepted: u64,
    pub invalid: u64,
    pub dropped: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<StreamErrorKind, ErrorDetails>,
}

impl StreamResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the tally of `kind`, creating it on first use.
    pub fn add_error(&mut self, kind: StreamErrorKind, count: u64) {
        self.errors
            .entry(kind)
            .or_insert_with(|| ErrorDetails::new(kind))
            .count += count;
    }

    /// Keep a sample of a schema-validation failure.
    ///
    /// Only the first [`VALIDATION_SAMPLE_LIMIT`] distinct messages are kept.
    pub fn record_validation_sample(&mut self, error: &str, object: &str) {
        let details = self
            .errors
            .entry(StreamErrorKind::SchemaValidation)
            .or_insert_with(|| ErrorDetails::new(StreamErrorKind::SchemaValidation));

        if details.documents.len() >= VALIDATION_SAMPLE_LIMIT
            || details.documents.iter().any(|d| d.error == error)
        {
            return;
        }

        details.documents.push(ValidationSample {
            error: error.to_string(),
            object: object.to_string(),
        });
    }

    pub fn add_accepted(&mut self, count: u64) {
        self.accepted += count;
    }

    pub fn add_invalid(&mut self, count: u64) {
        self.invalid += count;
    }

    pub fn add_dropped(&mut self, count: u64) {
        self.dropped += count;
    }

    pub fn has_error(&self, kind: StreamErrorKind) -> bool {
        self.errors.contains_key(&kind)
    }

    /// Render the wire format.
    pub fn to_json(&self) -> String {
        // Only strings and integers inside; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Human-readable summary, e.g. `validation error (2): missing property (...)`.
impl fmt::Display for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for details in self.errors.values() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;

            write!(f, "{} ({})", details.message, details.count)?;
            if !details.documents.is_empty() {
                f.write_str(": ")?;
                let samples = details
                    .documents
                    .iter()
                    .map(|d| format!("{} ({})", d.error, d.object))
                    .collect::<Vec<_>>()
                    .join(", ");
                f.write_str(&samples)?;
            }
        }
        Ok(())
    }
}
