// NDJSON intake
//
// The first line carries the metadata shared by every record in the request.
// Records follow one per line and are handed to the reporter in batches.
// Per-document problems are tallied in the response body; only request-level
// failures end the request early.

use super::{content_type_is, content_type_of, RouteState};
use crate::augment::Augmenter;
use crate::batch::{Batch, BatchReader};
use crate::decoder::{DecompressingReader, NdjsonReader, StreamError};
use crate::error::IntakeError;
use crate::model::Metadata;
use crate::publish::{PendingBatch, PublishError, Reporter};
use crate::stream_response::{StreamErrorKind, StreamResponse};
use crate::AppError;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

/// Content types accepted by the streaming endpoints.
pub const NDJSON_CONTENT_TYPES: &[&str] = &["application/x-ndjson", "application/ndjson"];

const METADATA_KEY: &str = "metadata";

/// POST /v2/intake and /v2/rum/intake
pub(crate) async fn handle_intake(
    State(route): State<RouteState>,
    req: Request,
) -> Result<Response, AppError> {
    let json = crate::error::accepts_json(req.headers());
    let fail = |error: IntakeError| AppError::with_format(error, json);

    if req.method() != Method::POST {
        return Err(fail(IntakeError::MethodNotAllowed));
    }

    if !content_type_is(req.headers(), NDJSON_CONTENT_TYPES) {
        debug!(
            content_type = content_type_of(req.headers()),
            "Rejected stream with unexpected content type"
        );
        let mut response = StreamResponse::new();
        response.add_error(StreamErrorKind::InvalidContentType, 1);
        return Ok(stream_reply(StatusCode::BAD_REQUEST, &response));
    }

    let augmenter = route.augmenter(req.headers(), req.extensions());
    let (parts, body) = req.into_parts();
    let reader =
        DecompressingReader::from_request(&parts.headers, body, route.app.max_unzipped_size);
    let mut documents = NdjsonReader::new(reader);

    let metadata = read_metadata(&route, &augmenter, &mut documents)
        .await
        .map_err(fail)?;

    let batches = BatchReader::new(documents, Arc::clone(&route.app.dispatcher));
    let mut response = StreamResponse::new();
    let status = process_stream(
        batches,
        Arc::new(metadata),
        route.app.reporter.as_ref(),
        &mut response,
    )
    .await
    .map_err(fail)?;

    counter!("apm_intake.events", response.accepted, "outcome" => "accepted");
    counter!("apm_intake.events", response.invalid, "outcome" => "invalid");
    counter!("apm_intake.events", response.dropped, "outcome" => "dropped");

    if !response.errors.is_empty() {
        debug!(summary = %response, "Stream finished with errors");
    }

    Ok(stream_reply(status, &response))
}

/// Read, augment, validate and decode the leading metadata line.
async fn read_metadata<R>(
    route: &RouteState,
    augmenter: &Augmenter,
    documents: &mut NdjsonReader<R>,
) -> Result<Metadata, IntakeError>
where
    R: AsyncRead + Unpin,
{
    let outcome = documents.next_document().await?;
    let Some(document) = outcome.document else {
        return Err(IntakeError::Decode("empty request body".to_string()));
    };

    let mut body = document.body;
    let mut metadata = match body.remove(METADATA_KEY) {
        Some(Value::Object(metadata)) => metadata,
        _ => return Err(IntakeError::Validation("invalid metadata format".to_string())),
    };

    augmenter.apply(&mut metadata);
    let metadata = Value::Object(metadata);

    route
        .app
        .metadata_schema
        .validate(&metadata)
        .map_err(|err| IntakeError::Validation(format!("failed to validate metadata: {err}")))?;

    let Value::Object(blocks) = metadata else {
        return Err(IntakeError::Validation("invalid metadata format".to_string()));
    };
    Metadata::decode(&blocks)
        .map_err(|err| IntakeError::Decode(format!("failed to decode metadata: {err}")))
}

/// Drain the stream batch by batch into `response`.
///
/// Returns the final status, or the request-level error that ended it.
pub(crate) async fn process_stream<R>(
    mut batches: BatchReader<R>,
    metadata: Arc<Metadata>,
    reporter: &dyn Reporter,
    response: &mut StreamResponse,
) -> Result<StatusCode, IntakeError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let batch = match batches.next_batch().await {
            Ok(batch) => batch,
            Err(err) if err.is_invalid_json() => {
                debug!(error = %err, "Stream aborted on malformed line");
                response.add_invalid(1);
                response.add_error(StreamErrorKind::InvalidJson, 1);
                return Ok(StatusCode::BAD_REQUEST);
            }
            Err(err @ StreamError::SizeExceeded(_)) => {
                warn!(error = %err, "Stream exceeded the decompressed size limit");
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let done = batch.is_done();
        if let Some(status) = handle_batch(batch, &metadata, reporter, response).await {
            return Ok(status);
        }
        if done {
            break;
        }
    }

    if response.dropped > 0 {
        Ok(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(StatusCode::ACCEPTED)
    }
}

/// Tally one batch and submit its records.
///
/// `Some(status)` ends the stream immediately.
async fn handle_batch(
    batch: Batch,
    metadata: &Arc<Metadata>,
    reporter: &dyn Reporter,
    response: &mut StreamResponse,
) -> Option<StatusCode> {
    for failure in &batch.failures {
        response.add_invalid(1);
        response.add_error(StreamErrorKind::SchemaValidation, 1);
        if failure.error.is_validation() {
            response.record_validation_sample(&failure.error.to_string(), &failure.raw);
        } else {
            debug!(line = failure.line, error = %failure.error, "Dropped undecodable document");
        }
    }

    if batch.records.is_empty() {
        return None;
    }

    let count = batch.records.len() as u64;
    let pending = PendingBatch {
        metadata: Arc::clone(metadata),
        records: batch.records,
    };

    match reporter.report(pending).await {
        Ok(()) => {
            response.add_accepted(count);
            None
        }
        Err(PublishError::QueueFull) => {
            response.add_dropped(count);
            response.add_error(StreamErrorKind::QueueFull, count);
            None
        }
        Err(PublishError::ProcessingTimeout) => {
            response.add_dropped(count);
            response.add_error(StreamErrorKind::ProcessingTimeout, count);
            None
        }
        Err(PublishError::ShuttingDown) => {
            response.add_dropped(count);
            response.add_error(StreamErrorKind::ShuttingDown, count);
            Some(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

fn stream_reply(status: StatusCode, response: &StreamResponse) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        response.to_json(),
    )
        .into_response()
}
