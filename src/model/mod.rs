// Event model
//
// Typed records decoded from agent JSON, plus the schemas that guard them.

pub mod error_event;
pub mod metadata;
pub mod metric;
pub mod schema;
pub mod transaction;

pub use error_event::ErrorEvent;
pub use metadata::Metadata;
pub use metric::Metric;
pub use schema::{Field, FieldKind, ObjectSchema, Schema, ValidationError};
pub use transaction::{Span, Transaction};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed set of event kinds accepted by the intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Transaction,
    Span,
    Metric,
    Error,
}

impl RecordKind {
    /// Top-level key naming this kind in a streamed document.
    pub fn key(&self) -> &'static str {
        match self {
            RecordKind::Transaction => "transaction",
            RecordKind::Span => "span",
            RecordKind::Metric => "metric",
            RecordKind::Error => "error",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One decoded event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "event", rename_all = "lowercase")]
pub enum Record {
    Transaction(Transaction),
    Span(Span),
    Metric(Metric),
    Error(ErrorEvent),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Transaction(_) => RecordKind::Transaction,
            Record::Span(_) => RecordKind::Span,
            Record::Metric(_) => RecordKind::Metric,
            Record::Error(_) => RecordKind::Error,
        }
    }

    /// Decode a value that already passed schema validation.
    pub fn decode(kind: RecordKind, value: Value) -> Result<Self, DecodeError> {
        let decoded = match kind {
            RecordKind::Transaction => serde_json::from_value(value).map(Record::Transaction),
            RecordKind::Span => serde_json::from_value(value).map(Record::Span),
            RecordKind::Metric => serde_json::from_value(value).map(Record::Metric),
            RecordKind::Error => serde_json::from_value(value).map(Record::Error),
        };
        decoded.map_err(|source| DecodeError {
            what: kind.key(),
            source,
        })
    }
}

/// A structurally valid value that still could not be turned into a record.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode {what}: {source}")]
pub struct DecodeError {
    pub what: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Accepts identifiers sent either as strings or as integers.
pub(crate) fn string_or_integer<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or an integer, got {}",
            other
        ))),
    }
}
