// Structural validation of raw JSON events
//
// Schemas are declared as lists of typed fields addressed by dotted paths.
// Validation happens on the untyped value so that messages can name the
// offending property before serde ever sees it.

use serde_json::{Map, Value};

/// A validator for one kind of JSON document.
pub trait Schema: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, value: &Value) -> Result<(), ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{schema} must be a JSON object")]
    NotAnObject { schema: String },

    #[error("missing required property '{0}'")]
    MissingProperty(String),

    #[error("property '{path}' must be {expected}")]
    WrongType { path: String, expected: &'static str },

    #[error("property '{path}' exceeds the maximum length of {max}")]
    TooLong { path: String, max: usize },

    #[error("one of {} is required", quoted(.0))]
    MissingOneOf(Vec<String>),

    #[error("{path}[{index}]: {source}")]
    Item {
        path: String,
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Identifiers that some agents send as integers.
    StringOrInteger,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => is_integer(value),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::StringOrInteger => value.is_string() || is_integer(value),
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Number => "a number",
            FieldKind::Integer => "an integer",
            FieldKind::Boolean => "a boolean",
            FieldKind::Object => "an object",
            FieldKind::Array => "an array",
            FieldKind::StringOrInteger => "a string or an integer",
        }
    }
}

fn is_integer(value: &Value) -> bool {
    matches!(value, Value::Number(n) if !n.is_f64())
}

/// One property rule. `null` counts as absent.
#[derive(Debug, Clone)]
pub struct Field {
    path: &'static str,
    kind: FieldKind,
    required: bool,
    within_parent: bool,
    max_len: Option<usize>,
}

impl Field {
    pub const fn required(path: &'static str, kind: FieldKind) -> Self {
        Self {
            path,
            kind,
            required: true,
            within_parent: false,
            max_len: None,
        }
    }

    /// Required only when the enclosing object is present.
    pub const fn required_within(path: &'static str, kind: FieldKind) -> Self {
        Self {
            path,
            kind,
            required: true,
            within_parent: true,
            max_len: None,
        }
    }

    pub const fn optional(path: &'static str, kind: FieldKind) -> Self {
        Self {
            path,
            kind,
            required: false,
            within_parent: false,
            max_len: None,
        }
    }

    /// Keyword-style strings are capped in length.
    pub const fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    fn check(&self, root: &Map<String, Value>) -> Result<(), ValidationError> {
        let value = match lookup(root, self.path) {
            Some(Value::Null) | None if self.within_parent && !self.parent_present(root) => {
                return Ok(())
            }
            Some(Value::Null) | None if self.required => {
                return Err(ValidationError::MissingProperty(self.path.to_string()))
            }
            Some(Value::Null) | None => return Ok(()),
            Some(value) => value,
        };

        if !self.kind.matches(value) {
            return Err(ValidationError::WrongType {
                path: self.path.to_string(),
                expected: self.kind.expected(),
            });
        }

        if let (Some(max), Value::String(s)) = (self.max_len, value) {
            if s.chars().count() > max {
                return Err(ValidationError::TooLong {
                    path: self.path.to_string(),
                    max,
                });
            }
        }

        Ok(())
    }

    fn parent_present(&self, root: &Map<String, Value>) -> bool {
        match self.path.rsplit_once('.') {
            Some((parent, _)) => !matches!(lookup(root, parent), None | Some(Value::Null)),
            None => true,
        }
    }
}

/// Every element of an array property must satisfy a nested schema.
#[derive(Clone)]
struct ArrayRule {
    path: &'static str,
    required: bool,
    items: std::sync::Arc<dyn Schema>,
}

/// Declarative schema over a JSON object.
#[derive(Clone)]
pub struct ObjectSchema {
    name: &'static str,
    fields: Vec<Field>,
    one_of: Vec<&'static [&'static str]>,
    arrays: Vec<ArrayRule>,
}

impl ObjectSchema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            one_of: Vec::new(),
            arrays: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// At least one of the named top-level properties must be present.
    pub fn one_of(mut self, names: &'static [&'static str]) -> Self {
        self.one_of.push(names);
        self
    }

    /// Validate each element of the array at `path` against `items`.
    pub fn items(
        mut self,
        path: &'static str,
        required: bool,
        items: std::sync::Arc<dyn Schema>,
    ) -> Self {
        self.arrays.push(ArrayRule {
            path,
            required,
            items,
        });
        self
    }
}

impl Schema for ObjectSchema {
    fn name(&self) -> &str {
        self.name
    }

    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Value::Object(root) = value else {
            return Err(ValidationError::NotAnObject {
                schema: self.name.to_string(),
            });
        };

        for field in &self.fields {
            field.check(root)?;
        }

        for group in &self.one_of {
            let present = group
                .iter()
                .any(|name| !matches!(root.get(*name), None | Some(Value::Null)));
            if !present {
                return Err(ValidationError::MissingOneOf(
                    group.iter().map(|n| n.to_string()).collect(),
                ));
            }
        }

        for rule in &self.arrays {
            match lookup(root, rule.path) {
                None | Some(Value::Null) if rule.required => {
                    return Err(ValidationError::MissingProperty(rule.path.to_string()))
                }
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    for (index, item) in items.iter().enumerate() {
                        rule.items
                            .validate(item)
                            .map_err(|source| ValidationError::Item {
                                path: rule.path.to_string(),
                                index,
                                source: Box::new(source),
                            })?;
                    }
                }
                Some(_) => {
                    return Err(ValidationError::WrongType {
                        path: rule.path.to_string(),
                        expected: FieldKind::Array.expected(),
                    })
                }
            }
        }

        Ok(())
    }
}

/// Resolve a dotted path through nested objects.
fn lookup<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
