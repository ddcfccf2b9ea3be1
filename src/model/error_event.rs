use super::schema::{Field, FieldKind, ObjectSchema};
use super::string_or_integer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const KEYWORD_LENGTH: usize = 1024;

/// A captured exception or log line reported by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub culprit: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub exception: Option<Exception>,
    #[serde(default)]
    pub log: Option<Log>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "string_or_integer")]
    pub code: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub handled: Option<bool>,
    #[serde(default)]
    pub stacktrace: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub logger_name: Option<String>,
    #[serde(default)]
    pub param_message: Option<String>,
}

fn common(schema: ObjectSchema) -> ObjectSchema {
    schema
        .field(Field::optional("culprit", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("exception", FieldKind::Object))
        .field(Field::required_within("exception.message", FieldKind::String))
        .field(Field::optional("exception.type", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("exception.code", FieldKind::StringOrInteger))
        .field(Field::optional("exception.handled", FieldKind::Boolean))
        .field(Field::optional("exception.stacktrace", FieldKind::Array))
        .field(Field::optional("log", FieldKind::Object))
        .field(Field::required_within("log.message", FieldKind::String))
        .field(Field::optional("log.level", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("context", FieldKind::Object))
        .one_of(&["exception", "log"])
}

/// Streamed error event
pub fn error_schema() -> ObjectSchema {
    common(
        ObjectSchema::new("error")
            .field(Field::required("id", FieldKind::String).max_len(KEYWORD_LENGTH))
            .field(Field::optional("trace_id", FieldKind::String).max_len(KEYWORD_LENGTH))
            .field(Field::optional("parent_id", FieldKind::String).max_len(KEYWORD_LENGTH))
            .field(Field::optional("transaction_id", FieldKind::String).max_len(KEYWORD_LENGTH))
            .field(Field::optional("timestamp", FieldKind::Integer)),
    )
}

/// Error inside a legacy errors payload
pub fn legacy_error_schema() -> ObjectSchema {
    common(
        ObjectSchema::new("error")
            .field(Field::optional("id", FieldKind::String).max_len(KEYWORD_LENGTH))
            .field(Field::optional("timestamp", FieldKind::String)),
    )
}
