use super::schema::{Field, FieldKind, ObjectSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A set of samples sharing one timestamp and tag set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub samples: BTreeMap<String, Sample>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub tags: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub sum: Option<f64>,
}

/// Streamed metric event
pub fn metric_schema() -> ObjectSchema {
    ObjectSchema::new("metric")
        .field(Field::required("samples", FieldKind::Object))
        .field(Field::optional("timestamp", FieldKind::Integer))
        .field(Field::optional("tags", FieldKind::Object))
}

/// Metric inside a legacy metrics payload
pub fn legacy_metric_schema() -> ObjectSchema {
    ObjectSchema::new("metric")
        .field(Field::required("samples", FieldKind::Object))
        .field(Field::required("timestamp", FieldKind::String))
        .field(Field::optional("tags", FieldKind::Object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Schema;
    use serde_json::json;

    #[test]
    fn test_decode_samples() {
        let value = json!({
            "samples": {
                "byte_counter": {"value": 1},
                "latency": {"type": "summary", "count": 2, "sum": 3.5}
            },
            "tags": {"code": 200},
            "timestamp": 1496170422281000_u64
        });
        assert!(metric_schema().validate(&value).is_ok());

        let metric: Metric = serde_json::from_value(value).unwrap();
        assert_eq!(metric.samples["byte_counter"].value, Some(1.0));
        assert_eq!(metric.samples["latency"].count, Some(2));
    }

    #[test]
    fn test_legacy_metric_needs_timestamp() {
        let value = json!({"samples": {}});
        assert!(metric_schema().validate(&value).is_ok());
        assert_eq!(
            legacy_metric_schema().validate(&value).unwrap_err().to_string(),
            "missing required property 'timestamp'"
        );
    }
}
