// Single-payload intake
//
// One JSON object carries the metadata blocks and an array of one record
// family. The payload is validated as a whole and either every record is
// submitted or none is.

use super::{content_type_is, content_type_of, RouteState};
use crate::decoder::{read_to_end, DecompressingReader};
use crate::error::IntakeError;
use crate::model::error_event::legacy_error_schema;
use crate::model::metadata::payload_schema;
use crate::model::metric::legacy_metric_schema;
use crate::model::transaction::legacy_transaction_schema;
use crate::model::{DecodeError, Metadata, ObjectSchema, Record, RecordKind, Schema};
use crate::publish::PendingBatch;
use crate::AppError;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The record family a payload carries, named after its array key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyFamily {
    Transactions,
    Errors,
    Metrics,
}

impl LegacyFamily {
    pub fn key(&self) -> &'static str {
        match self {
            LegacyFamily::Transactions => "transactions",
            LegacyFamily::Errors => "errors",
            LegacyFamily::Metrics => "metrics",
        }
    }

    /// Schema for a whole payload of this family.
    pub fn schema(&self) -> ObjectSchema {
        let items: Arc<dyn Schema> = match self {
            LegacyFamily::Transactions => Arc::new(legacy_transaction_schema()),
            LegacyFamily::Errors => Arc::new(legacy_error_schema()),
            LegacyFamily::Metrics => Arc::new(legacy_metric_schema()),
        };
        payload_schema(self.key()).items(self.key(), true, items)
    }

    /// Turn the family array of a validated payload into records.
    ///
    /// Spans embedded in a transaction become records of their own, linked
    /// back to the transaction.
    pub fn decode(&self, payload: &mut Map<String, Value>) -> Result<Vec<Record>, DecodeError> {
        let items = match payload.remove(self.key()) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match self {
                LegacyFamily::Transactions => decode_transaction(item, &mut records)?,
                LegacyFamily::Errors => records.push(Record::decode(RecordKind::Error, item)?),
                LegacyFamily::Metrics => records.push(Record::decode(RecordKind::Metric, item)?),
            }
        }
        Ok(records)
    }
}

fn decode_transaction(mut item: Value, records: &mut Vec<Record>) -> Result<(), DecodeError> {
    let spans = match item.as_object_mut().and_then(|t| t.remove("spans")) {
        Some(Value::Array(spans)) => spans,
        _ => Vec::new(),
    };

    let transaction_id = item.get("id").cloned();
    records.push(Record::decode(RecordKind::Transaction, item)?);

    for mut span in spans {
        if let Some(span) = span.as_object_mut() {
            if let Some(parent) = span.remove("parent") {
                span.entry("parent_id").or_insert(parent);
            }
            if let Some(id) = &transaction_id {
                span.entry("transaction_id").or_insert_with(|| id.clone());
            }
        }
        records.push(Record::decode(RecordKind::Span, span)?);
    }
    Ok(())
}

/// Handler state for one legacy route.
#[derive(Clone)]
pub struct LegacyRoute {
    pub route: RouteState,
    pub family: LegacyFamily,
    pub schema: Arc<dyn Schema>,
}

impl LegacyRoute {
    pub fn new(route: RouteState, family: LegacyFamily) -> Self {
        Self {
            route,
            family,
            schema: Arc::new(family.schema()),
        }
    }
}

/// POST /v1/transactions, /v1/errors, /v1/metrics and their browser variants
pub(crate) async fn handle_payload(
    State(legacy): State<LegacyRoute>,
    req: Request,
) -> Result<Response, AppError> {
    let json = crate::error::accepts_json(req.headers());
    let accepted = process_payload(&legacy, req)
        .await
        .map_err(|error| AppError::with_format(error, json))?;

    counter!("apm_intake.events", accepted as u64, "outcome" => "accepted");
    Ok(StatusCode::ACCEPTED.into_response())
}

async fn process_payload(legacy: &LegacyRoute, req: Request) -> Result<usize, IntakeError> {
    if req.method() != Method::POST {
        return Err(IntakeError::MethodNotAllowed);
    }

    if !content_type_is(req.headers(), &[JSON_CONTENT_TYPE]) {
        return Err(IntakeError::Decode(format!(
            "invalid content type: '{}'",
            content_type_of(req.headers())
        )));
    }

    let route = &legacy.route;
    let augmenter = route.augmenter(req.headers(), req.extensions());
    let (parts, body) = req.into_parts();
    let reader =
        DecompressingReader::from_request(&parts.headers, body, route.app.max_unzipped_size);
    let bytes = read_to_end(reader).await?;

    let mut payload = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(payload)) => payload,
        Ok(_) => return Err(IntakeError::Decode("expected a JSON object".to_string())),
        Err(err) => return Err(IntakeError::Decode(err.to_string())),
    };

    augmenter.apply(&mut payload);

    let payload_value = Value::Object(payload);
    legacy
        .schema
        .validate(&payload_value)
        .map_err(|err| IntakeError::Validation(err.to_string()))?;
    let Value::Object(mut payload) = payload_value else {
        return Err(IntakeError::Decode("expected a JSON object".to_string()));
    };

    let metadata = Metadata::decode(&payload)
        .map_err(|err| IntakeError::Decode(format!("failed to decode metadata: {err}")))?;
    let records = legacy
        .family
        .decode(&mut payload)
        .map_err(|err| IntakeError::Decode(err.to_string()))?;

    let count = records.len();
    debug!(
        family = legacy.family.key(),
        records = count,
        "Decoded payload"
    );

    if records.is_empty() {
        return Ok(0);
    }

    route
        .app
        .reporter
        .report(PendingBatch {
            metadata: Arc::new(metadata),
            records,
        })
        .await?;

    Ok(count)
}
