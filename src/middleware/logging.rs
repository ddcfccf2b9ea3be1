use super::{client_ip, Filter, Next};
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::Response;
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Correlation ID assigned to every request, available as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Opens the request span and logs a summary line once the response is known.
pub struct RequestLogger;

#[async_trait]
impl Filter for RequestLogger {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn call(&self, mut req: Request, next: Next<'_>) -> Response {
        let request_id = Uuid::new_v4();
        req.extensions_mut().insert(RequestId(request_id));

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            url = %req.uri(),
            content_length = %header_str(req.headers(), &header::CONTENT_LENGTH),
            remote_address = %client_ip(req.headers(), req.extensions()).unwrap_or_default(),
            user_agent = %header_str(req.headers(), &header::USER_AGENT),
        );

        counter!("apm_intake.requests", 1);
        let start = Instant::now();
        let response = next.run(req).instrument(span.clone()).await;
        let elapsed = start.elapsed();

        let status = response.status();
        histogram!("apm_intake.request.duration_seconds", elapsed.as_secs_f64());
        counter!("apm_intake.responses", 1, "class" => status_class(status));

        span.in_scope(|| {
            let elapsed_ms = elapsed.as_millis() as u64;
            if status.is_client_error() || status.is_server_error() {
                warn!(response_code = status.as_u16(), elapsed_ms, "handled request");
            } else {
                info!(response_code = status.as_u16(), elapsed_ms, "handled request");
            }
        });

        response
    }
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
