use super::schema::{Field, FieldKind, ObjectSchema};
use super::string_or_integer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const KEYWORD_LENGTH: usize = 1024;

/// Describes the source of every event in one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub service: Service,
    #[serde(default)]
    pub process: Option<Process>,
    #[serde(default)]
    pub system: Option<System>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    pub agent: Agent,
    #[serde(default)]
    pub language: Option<NameVersion>,
    #[serde(default)]
    pub runtime: Option<NameVersion>,
    #[serde(default)]
    pub framework: Option<NameVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameVersion {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub pid: Option<i64>,
    #[serde(default)]
    pub ppid: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub argv: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "string_or_integer")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default, rename = "user-agent")]
    pub user_agent: Option<String>,
}

impl Metadata {
    /// Decode the service/process/system/user blocks of an object.
    pub fn decode(blocks: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut selected = Map::new();
        for key in ["service", "process", "system", "user"] {
            if let Some(value) = blocks.get(key) {
                selected.insert(key.to_string(), value.clone());
            }
        }
        serde_json::from_value(Value::Object(selected))
    }
}

fn with_metadata_fields(schema: ObjectSchema) -> ObjectSchema {
    schema
        .field(Field::required("service", FieldKind::Object))
        .field(Field::required("service.name", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("service.version", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("service.environment", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("service.agent", FieldKind::Object))
        .field(Field::required("service.agent.name", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::required("service.agent.version", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("process", FieldKind::Object))
        .field(Field::optional("process.pid", FieldKind::Integer))
        .field(Field::optional("process.ppid", FieldKind::Integer))
        .field(Field::optional("process.title", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("process.argv", FieldKind::Array))
        .field(Field::optional("system", FieldKind::Object))
        .field(Field::optional("system.hostname", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("system.ip", FieldKind::String))
        .field(Field::optional("user", FieldKind::Object))
        .field(Field::optional("user.id", FieldKind::StringOrInteger))
        .field(Field::optional("user.email", FieldKind::String).max_len(KEYWORD_LENGTH))
        .field(Field::optional("user.ip", FieldKind::String))
        .field(Field::optional("user.user-agent", FieldKind::String))
}

/// The value under the `metadata` key of a stream's first line
pub fn metadata_schema() -> ObjectSchema {
    with_metadata_fields(ObjectSchema::new("metadata"))
}

/// Metadata blocks at the top level of a legacy payload
pub fn payload_schema(name: &'static str) -> ObjectSchema {
    with_metadata_fields(ObjectSchema::new(name))
}
