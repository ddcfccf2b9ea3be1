// Shared helpers for router-level integration tests
//
// The router is driven in-process with `tower::ServiceExt::oneshot`; batches
// land in a capturing reporter instead of a real queue.

#![allow(dead_code)]

use apm_intake::publish::{PendingBatch, PublishError, Reporter};
use apm_intake::routes::RoutingTable;
use apm_intake::{build_router, AppState, RuntimeConfig};
use async_trait::async_trait;
use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

/// Keeps every submitted batch, or fails every submission with `fail_with`.
#[derive(Default)]
pub struct CapturingReporter {
    batches: Mutex<Vec<PendingBatch>>,
    fail_with: Mutex<Option<PublishError>>,
}

impl CapturingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: PublishError) -> Arc<Self> {
        let reporter = Self::default();
        *reporter.fail_with.lock() = Some(error);
        Arc::new(reporter)
    }

    pub fn batches(&self) -> Vec<PendingBatch> {
        self.batches.lock().clone()
    }

    pub fn events(&self) -> usize {
        self.batches.lock().iter().map(PendingBatch::len).sum()
    }
}

#[async_trait]
impl Reporter for CapturingReporter {
    async fn report(&self, batch: PendingBatch) -> Result<(), PublishError> {
        if let Some(error) = *self.fail_with.lock() {
            return Err(error);
        }
        self.batches.lock().push(batch);
        Ok(())
    }
}

pub fn app(config: &RuntimeConfig, reporter: Arc<CapturingReporter>) -> Router {
    let state = AppState::new(config, reporter as Arc<dyn Reporter>);
    build_router(config, &RoutingTable::standard(), state)
}

/// Defaults with the browser endpoints switched on.
pub fn rum_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.rum.enabled = true;
    config
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(router: &Router, req: Request<Body>) -> Reply {
    let response = router.clone().oneshot(req).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    Reply {
        status,
        headers,
        body,
    }
}

pub fn post(path: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", content_type)
        .body(body.into())
        .expect("valid request")
}

pub fn ndjson(path: &str, body: impl Into<Body>) -> Request<Body> {
    post(path, "application/x-ndjson", body)
}

pub fn metadata_line() -> String {
    r#"{"metadata":{"service":{"name":"checkout","agent":{"name":"rust","version":"1.0.0"}}}}"#
        .to_string()
}

pub fn transaction_line(id: &str) -> String {
    format!(
        r#"{{"transaction":{{"id":"{id}","trace_id":"0123456789abcdef0123456789abcdef","type":"request","duration":12.5,"span_count":{{"started":1}}}}}}"#
    )
}

/// An error event missing its required `id`.
pub fn invalid_error_line() -> String {
    r#"{"error":{"exception":{"message":"boom"}}}"#.to_string()
}

pub fn stream(lines: &[String]) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("deflate write");
    encoder.finish().expect("deflate finish")
}
