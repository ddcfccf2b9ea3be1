// Record dispatcher
//
// Maps one raw streamed document onto a typed record by looking up its
// single top-level key in a fixed registry of {key, schema, decoder} entries.

use crate::model::error_event::error_schema;
use crate::model::metric::metric_schema;
use crate::model::transaction::{span_schema, transaction_schema};
use crate::model::{DecodeError, Record, RecordKind, Schema, ValidationError};
use serde_json::{Map, Value};
use std::sync::Arc;

type DecodeFn = fn(Value) -> Result<Record, DecodeError>;

/// Registry entry for one record kind
#[derive(Clone)]
pub struct ModelEntry {
    pub kind: RecordKind,
    pub schema: Arc<dyn Schema>,
    pub decode: DecodeFn,
}

impl ModelEntry {
    pub fn new(kind: RecordKind, schema: Arc<dyn Schema>, decode: DecodeFn) -> Self {
        Self {
            kind,
            schema,
            decode,
        }
    }

    pub fn key(&self) -> &'static str {
        self.kind.key()
    }
}

/// Why a single document was rejected. None of these end the stream.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("did not recognize object type")]
    Unrecognized,

    #[error("ambiguous object type, found keys: {}", .0.join(", "))]
    Ambiguous(Vec<&'static str>),

    #[error("failed to validate {kind}: {source}")]
    Validation {
        kind: RecordKind,
        #[source]
        source: ValidationError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl DocumentError {
    /// Schema-level failures carry a sample back to the client; decode
    /// failures do not.
    pub fn is_validation(&self) -> bool {
        !matches!(self, DocumentError::Decode(_))
    }
}

fn decode_transaction(value: Value) -> Result<Record, DecodeError> {
    Record::decode(RecordKind::Transaction, value)
}

fn decode_span(value: Value) -> Result<Record, DecodeError> {
    Record::decode(RecordKind::Span, value)
}

fn decode_metric(value: Value) -> Result<Record, DecodeError> {
    Record::decode(RecordKind::Metric, value)
}

fn decode_error(value: Value) -> Result<Record, DecodeError> {
    Record::decode(RecordKind::Error, value)
}

pub struct Dispatcher {
    entries: Vec<ModelEntry>,
}

impl Dispatcher {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }

    /// Registry for the streaming protocol.
    pub fn streaming() -> Self {
        Self::new(vec![
            ModelEntry::new(
                RecordKind::Transaction,
                Arc::new(transaction_schema()),
                decode_transaction,
            ),
            ModelEntry::new(RecordKind::Span, Arc::new(span_schema()), decode_span),
            ModelEntry::new(RecordKind::Metric, Arc::new(metric_schema()), decode_metric),
            ModelEntry::new(RecordKind::Error, Arc::new(error_schema()), decode_error),
        ])
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(ModelEntry::key)
    }

    /// Validate then decode the one recognized record in `document`.
    pub fn dispatch(&self, mut document: Map<String, Value>) -> Result<Record, DocumentError> {
        let mut found = self
            .entries
            .iter()
            .filter(|entry| document.contains_key(entry.key()));

        let entry = match (found.next(), found.next()) {
            (None, _) => return Err(DocumentError::Unrecognized),
            (Some(entry), None) => entry,
            (Some(first), Some(second)) => {
                let mut keys = vec![first.key(), second.key()];
                keys.extend(found.map(ModelEntry::key));
                return Err(DocumentError::Ambiguous(keys));
            }
        };

        let value = document
            .remove(entry.key())
            .ok_or(DocumentError::Unrecognized)?;

        entry
            .schema
            .validate(&value)
            .map_err(|source| DocumentError::Validation {
                kind: entry.kind,
                source,
            })?;

        Ok((entry.decode)(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    fn span() -> Value {
        json!({
            "id": "0aaaaaaaaaaaaaaa",
            "trace_id": "0123456789abcdef0123456789abcdef",
            "parent_id": "1aaaaaaaaaaaaaaa",
            "name": "SELECT FROM users",
            "type": "db.postgresql.query",
            "duration": 3.7
        })
    }

    #[test]
    fn test_registry_order() {
        let keys: Vec<_> = Dispatcher::streaming().keys().collect();
        assert_eq!(keys, vec!["transaction", "span", "metric", "error"]);
    }

    #[test]
    fn test_dispatch_span() {
        let record = Dispatcher::streaming()
            .dispatch(doc(json!({ "span": span() })))
            .unwrap();
        match record {
            Record::Span(span) => assert_eq!(span.name, "SELECT FROM users"),
            other => panic!("expected a span, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_unrecognized_type() {
        let err = Dispatcher::streaming()
            .dispatch(doc(json!({"log": {"message": "hi"}})))
            .unwrap_err();
        assert!(matches!(err, DocumentError::Unrecognized));
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "did not recognize object type");
    }

    #[test]
    fn test_more_than_one_key_is_rejected() {
        let err = Dispatcher::streaming()
            .dispatch(doc(json!({"span": span(), "error": {"id": "x"}})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "ambiguous object type, found keys: span, error"
        );
    }

    #[test]
    fn test_validation_error_is_distinct_from_decode_error() {
        let dispatcher = Dispatcher::streaming();

        let mut invalid = span();
        invalid.as_object_mut().unwrap().remove("duration");
        let err = dispatcher
            .dispatch(doc(json!({ "span": invalid })))
            .unwrap_err();
        assert!(matches!(err, DocumentError::Validation { .. }));
        assert_eq!(
            err.to_string(),
            "failed to validate span: missing required property 'duration'"
        );

        // Valid per schema but not representable: the count overflows u64.
        let overflow = json!({"transaction": {
            "id": "a", "trace_id": "b", "type": "request", "duration": 1,
            "span_count": {"started": 123456789012345678901234567890_u128}
        }});
        let err = dispatcher.dispatch(doc(overflow)).unwrap_err();
        assert!(matches!(err, DocumentError::Decode(_)));
        assert!(!err.is_validation());
    }
}
