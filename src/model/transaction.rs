use super::schema::{Field, FieldKind, ObjectSchema, Schema};
use super::string_or_integer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

const KEYWORD_LENGTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, deserialize_with = "string_or_integer")]
    pub id: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration: f64,
    #[serde(default)]
    pub result: Option<String>,
    /// Epoch microseconds, or an RFC 3339 string from older agents.
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub sampled: Option<bool>,
    #[serde(default)]
    pub span_count: Option<SpanCount>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    #[serde(default)]
    pub marks: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanCount {
    pub started: u64,
    #[serde(default)]
    pub dropped: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default, deserialize_with = "string_or_integer")]
    pub id: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_integer")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    /// Offset from the transaction start in milliseconds.
    #[serde(default)]
    pub start: Option<f64>,
    pub duration: f64,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    #[serde(default)]
    pub stacktrace: Option<Vec<Value>>,
}

/// Streamed transaction event
pub fn transaction_schema() -> ObjectSchema {
    ObjectSchema::new("transaction")
        .field(Field::required("id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("trace_id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("parent_id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("name", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("type", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("duration", FieldKind::Number))
        .field(Field::optional("result", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("timestamp", FieldKind::Integer))
        .field(Field::optional("sampled", FieldKind::Boolean))
        .field(Field::required("span_count", FieldKind::Object))
        .field(Field::required("span_count.started", FieldKind::Integer))
        .field(Field::optional("span_count.dropped", FieldKind::Integer))
        .field(Field::optional("context", FieldKind::Object))
        .field(Field::optional("marks", FieldKind::Object))
}

/// Streamed span event
pub fn span_schema() -> ObjectSchema {
    ObjectSchema::new("span")
        .field(Field::required("id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("trace_id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("parent_id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("transaction_id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("name", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("type", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("subtype", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("action", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("start", FieldKind::Number))
        .field(Field::required("duration", FieldKind::Number))
        .field(Field::optional("timestamp", FieldKind::Integer))
        .field(Field::optional("context", FieldKind::Object))
        .field(Field::optional("stacktrace", FieldKind::Array))
}

/// Span embedded in a legacy transactions payload
pub fn legacy_span_schema() -> ObjectSchema {
    ObjectSchema::new("span")
        .field(Field::optional("id", FieldKind::StringOrInteger))
        .field(Field::optional("parent", FieldKind::StringOrInteger))
        .field(Field::required("name", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("type", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("start", FieldKind::Number))
        .field(Field::required("duration", FieldKind::Number))
        .field(Field::optional("context", FieldKind::Object))
        .field(Field::optional("stacktrace", FieldKind::Array))
}

/// Transaction inside a legacy transactions payload
pub fn legacy_transaction_schema() -> ObjectSchema {
    ObjectSchema::new("transaction")
        .field(Field::required("id", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("name", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("type", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("duration", FieldKind::Number))
        .field(Field::optional("timestamp", FieldKind::String))
        .field(Field::optional("result", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("sampled", FieldKind::Boolean))
        .field(Field::optional("context", FieldKind::Object))
        .items("spans", false, Arc::new(legacy_span_schema()) as Arc<dyn Schema>)
}
