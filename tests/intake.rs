// Router-level tests for the intake endpoints
//
// Each test builds the full router from the standard routing table and
// drives it in-process.

mod common;

use apm_intake::model::Record;
use apm_intake::publish::{PublishError, QueueReporter, Reporter};
use apm_intake::routes::RoutingTable;
use apm_intake::{build_router, AppState, RuntimeConfig};
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use common::*;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_stream_accepts_valid_and_counts_invalid() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    let body = stream(&[metadata_line(), transaction_line("t1"), invalid_error_line()]);
    let reply = send(&router, ndjson("/v2/intake", body)).await;

    assert_eq!(reply.status, StatusCode::ACCEPTED);
    let json = reply.json();
    assert_eq!(json["accepted"], 1);
    assert_eq!(json["invalid"], 1);
    assert_eq!(json["dropped"], 0);

    let validation = &json["errors"]["ERR_SCHEMA_VALIDATION"];
    assert_eq!(validation["count"], 1);
    assert_eq!(validation["message"], "validation error");
    let sample = &validation["documents"][0];
    assert!(sample["error"]
        .as_str()
        .unwrap()
        .contains("missing required property 'id'"));
    assert_eq!(sample["object"], invalid_error_line());

    let batches = reporter.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].metadata.service.name, "checkout");
    assert!(matches!(batches[0].records[0], Record::Transaction(_)));
}

#[tokio::test]
async fn test_stream_without_errors_omits_error_map() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    // No trailing newline: the last line still counts.
    let body = format!("{}\n{}", metadata_line(), transaction_line("t1"));
    let reply = send(&router, ndjson("/v2/intake", body)).await;

    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(
        reply.json(),
        json!({"accepted": 1, "invalid": 0, "dropped": 0})
    );
    assert_eq!(reporter.events(), 1);
}

#[tokio::test]
async fn test_stream_batches_records() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    let mut lines = vec![metadata_line()];
    lines.extend((0..45).map(|i| transaction_line(&format!("t{i}"))));
    let reply = send(&router, ndjson("/v2/intake", stream(&lines))).await;

    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.json()["accepted"], 45);
    let sizes: Vec<_> = reporter.batches().iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![20, 20, 5]);
}

#[tokio::test]
async fn test_stream_gzip_and_deflate_bodies() {
    let body = stream(&[metadata_line(), transaction_line("t1")]);

    for (encoding, bytes) in [
        ("gzip", gzip(body.as_bytes())),
        ("deflate", deflate(body.as_bytes())),
    ] {
        let reporter = CapturingReporter::new();
        let router = app(&RuntimeConfig::default(), reporter.clone());

        let req = Request::builder()
            .method("POST")
            .uri("/v2/intake")
            .header("content-type", "application/x-ndjson")
            .header("content-encoding", encoding)
            .body(Body::from(bytes))
            .unwrap();
        let reply = send(&router, req).await;

        assert_eq!(reply.status, StatusCode::ACCEPTED, "{encoding}");
        assert_eq!(reply.json()["accepted"], 1, "{encoding}");
    }
}

#[tokio::test]
async fn test_stream_over_size_limit_is_413() {
    let mut config = RuntimeConfig::default();
    config.request.max_unzipped_size = 512;
    let router = app(&config, CapturingReporter::new());

    let mut lines = vec![metadata_line()];
    lines.extend((0..20).map(|i| transaction_line(&format!("t{i}"))));
    let compressed = gzip(stream(&lines).as_bytes());

    let req = Request::builder()
        .method("POST")
        .uri("/v2/intake")
        .header("content-type", "application/x-ndjson")
        .header("content-encoding", "gzip")
        .body(Body::from(compressed))
        .unwrap();
    let reply = send(&router, req).await;

    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.json(), json!({"error": "request body too large"}));
}

#[tokio::test]
async fn test_stream_wrong_content_type() {
    let router = app(&RuntimeConfig::default(), CapturingReporter::new());

    let body = stream(&[metadata_line()]);
    let reply = send(&router, post("/v2/intake", "application/json", body)).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let json = reply.json();
    assert_eq!(json["errors"]["ERR_CONTENT_TYPE"]["count"], 1);
    assert_eq!(json["accepted"], 0);
}

#[tokio::test]
async fn test_stream_invalid_json_after_metadata() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    let body = stream(&[metadata_line(), "{\"transaction\": ".to_string()]);
    let reply = send(&router, ndjson("/v2/intake", body)).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let json = reply.json();
    assert_eq!(json["invalid"], 1);
    assert_eq!(json["errors"]["ERR_INVALID_JSON"]["count"], 1);
    assert_eq!(reporter.events(), 0);
}

#[tokio::test]
async fn test_stream_metadata_failures_reject_request() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    // First line is a record, not metadata.
    let body = stream(&[transaction_line("t1")]);
    let reply = send(&router, ndjson("/v2/intake", body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"]
        .as_str()
        .unwrap()
        .contains("invalid metadata format"));

    // Metadata without the service agent.
    let body = stream(&[
        r#"{"metadata":{"service":{"name":"x"}}}"#.to_string(),
        transaction_line("t1"),
    ]);
    let reply = send(&router, ndjson("/v2/intake", body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"]
        .as_str()
        .unwrap()
        .contains("service.agent"));

    // Empty body.
    let reply = send(&router, ndjson("/v2/intake", "")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    assert_eq!(reporter.events(), 0);
}

#[tokio::test]
async fn test_stream_queue_full_drops_events() {
    let reporter = CapturingReporter::failing(PublishError::QueueFull);
    let router = app(&RuntimeConfig::default(), reporter);

    let body = stream(&[metadata_line(), transaction_line("a"), transaction_line("b")]);
    let reply = send(&router, ndjson("/v2/intake", body)).await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    let json = reply.json();
    assert_eq!(json["accepted"], 0);
    assert_eq!(json["dropped"], 2);
    assert_eq!(json["errors"]["ERR_QUEUE_FULL"]["count"], 2);
    assert_eq!(json["errors"]["ERR_QUEUE_FULL"]["message"], "queue is full");
}

#[tokio::test]
async fn test_stream_shutting_down_is_503() {
    let reporter = CapturingReporter::failing(PublishError::ShuttingDown);
    let router = app(&RuntimeConfig::default(), reporter);

    let body = stream(&[metadata_line(), transaction_line("a")]);
    let reply = send(&router, ndjson("/v2/intake", body)).await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.json()["errors"]["ERR_SHUTTING_DOWN"]["count"], 1);
}

#[tokio::test]
async fn test_stream_sees_queue_stopped_mid_request() {
    let config = RuntimeConfig::default();
    let (reporter, mut queue) = QueueReporter::new(8, None);
    let reporter = Arc::new(reporter);
    let state = AppState::new(&config, Arc::clone(&reporter) as Arc<dyn Reporter>);
    let router = build_router(&config, &RoutingTable::standard(), state);

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(8);
    let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
    });
    let request = ndjson("/v2/intake", Body::from_stream(chunks));
    let in_flight = tokio::spawn(async move { send(&router, request).await });

    let mut first = vec![metadata_line()];
    first.extend((0..20).map(|i| transaction_line(&format!("t{i}"))));
    tx.send(Bytes::from(stream(&first))).await.unwrap();

    let batch = queue.recv().await.expect("first batch is queued");
    assert_eq!(batch.len(), 20);

    reporter.stop();
    tx.send(Bytes::from(stream(&[transaction_line("late")])))
        .await
        .unwrap();
    drop(tx);

    let reply = in_flight.await.unwrap();
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    let json = reply.json();
    assert_eq!(json["accepted"], 20);
    assert_eq!(json["errors"]["ERR_SHUTTING_DOWN"]["count"], 1);
    assert_eq!(
        json["errors"]["ERR_SHUTTING_DOWN"]["message"],
        "server is shutting down"
    );
}

#[tokio::test]
async fn test_backend_augments_system_ip() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    let mut req = ndjson(
        "/v2/intake",
        stream(&[metadata_line(), transaction_line("t1")]),
    );
    req.headers_mut()
        .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    let reply = send(&router, req).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);

    let batches = reporter.batches();
    let system = batches[0].metadata.system.as_ref().unwrap();
    assert_eq!(system.ip.as_deref(), Some("203.0.113.9"));
}

#[tokio::test]
async fn test_non_post_is_405() {
    let router = app(&RuntimeConfig::default(), CapturingReporter::new());

    for path in ["/v2/intake", "/v1/transactions"] {
        let req = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let reply = send(&router, req).await;
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED, "{path}");
        assert_eq!(
            reply.json(),
            json!({"error": "only POST requests are supported"})
        );
    }
}

#[tokio::test]
async fn test_error_body_is_text_when_json_not_accepted() {
    let router = app(&RuntimeConfig::default(), CapturingReporter::new());

    let req = Request::builder()
        .method(Method::GET)
        .uri("/v2/intake")
        .header("accept", "text/plain")
        .body(Body::empty())
        .unwrap();
    let reply = send(&router, req).await;

    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.text(), "only POST requests are supported");
}

#[tokio::test]
async fn test_healthcheck() {
    let router = app(&RuntimeConfig::default(), CapturingReporter::new());

    for path in ["/", "/healthcheck"] {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        assert_eq!(send(&router, req).await.status, StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn test_auth_required_when_token_configured() {
    let mut config = RuntimeConfig::default();
    config.auth.secret_token = Some("s3cret".to_string());
    let reporter = CapturingReporter::new();
    let router = app(&config, reporter.clone());

    let body = stream(&[metadata_line(), transaction_line("t1")]);

    let reply = send(&router, ndjson("/v2/intake", body.clone())).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json(), json!({"error": "invalid token"}));

    let mut req = ndjson("/v2/intake", body.clone());
    req.headers_mut()
        .insert("authorization", "Bearer wrong".parse().unwrap());
    assert_eq!(send(&router, req).await.status, StatusCode::UNAUTHORIZED);

    let mut req = ndjson("/v2/intake", body);
    req.headers_mut()
        .insert("authorization", "Bearer s3cret".parse().unwrap());
    assert_eq!(send(&router, req).await.status, StatusCode::ACCEPTED);

    // Health stays open.
    let req = Request::builder()
        .uri("/healthcheck")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&router, req).await.status, StatusCode::OK);

    // Browser routes never ask for the token.
    let mut config = rum_config();
    config.auth.secret_token = Some("s3cret".to_string());
    let router = app(&config, CapturingReporter::new());
    let body = stream(&[metadata_line(), transaction_line("t1")]);
    assert_eq!(
        send(&router, ndjson("/v2/rum/intake", body)).await.status,
        StatusCode::ACCEPTED
    );
}

#[tokio::test]
async fn test_rum_disabled_by_default() {
    let router = app(&RuntimeConfig::default(), CapturingReporter::new());

    let body = stream(&[metadata_line(), transaction_line("t1")]);
    let reply = send(&router, ndjson("/v2/rum/intake", body)).await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(
        reply.json(),
        json!({"error": "forbidden request: endpoint is disabled"})
    );
}

#[tokio::test]
async fn test_rum_cors_preflight_and_origin_check() {
    let mut config = rum_config();
    config.rum.allow_origins = vec!["*.example.com".to_string()];
    let reporter = CapturingReporter::new();
    let router = app(&config, reporter.clone());

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v2/rum/intake")
        .header("origin", "app.example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let reply = send(&router, preflight).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.headers["access-control-allow-origin"],
        "app.example.com"
    );
    assert!(reply.body.is_empty());

    let body = stream(&[metadata_line(), transaction_line("t1")]);
    let mut req = ndjson("/v2/rum/intake", body.clone());
    req.headers_mut()
        .insert("origin", "evil.example.org".parse().unwrap());
    let reply = send(&router, req).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let mut req = ndjson("/v2/rum/intake", body);
    req.headers_mut()
        .insert("origin", "app.example.com".parse().unwrap());
    req.headers_mut()
        .insert("user-agent", "Mozilla/5.0".parse().unwrap());
    let reply = send(&router, req).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(
        reply.headers["access-control-allow-origin"],
        "app.example.com"
    );
    assert_eq!(reply.headers["vary"], "Origin");

    let batches = reporter.batches();
    let user = batches[0].metadata.user.as_ref().unwrap();
    assert_eq!(user.user_agent.as_deref(), Some("Mozilla/5.0"));
}

#[tokio::test]
async fn test_rum_rate_limit_per_ip() {
    let mut config = rum_config();
    config.rum.rate_limit = 2;
    let router = app(&config, CapturingReporter::new());

    let request_from = |ip: &str| {
        let body = stream(&[metadata_line(), transaction_line("t1")]);
        let mut req = ndjson("/v2/rum/intake", body);
        req.headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        req
    };

    // Burst is twice the rate.
    for _ in 0..4 {
        assert_eq!(
            send(&router, request_from("198.51.100.1")).await.status,
            StatusCode::ACCEPTED
        );
    }
    let reply = send(&router, request_from("198.51.100.1")).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(reply.json(), json!({"error": "too many requests"}));

    assert_eq!(
        send(&router, request_from("198.51.100.2")).await.status,
        StatusCode::ACCEPTED
    );
}

#[tokio::test]
async fn test_legacy_transactions_payload() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    let payload = json!({
        "service": {"name": "api", "agent": {"name": "python", "version": "2.0"}},
        "transactions": [{
            "id": "945254c5-67a5-417e-8a4e-aa29efcbfb79",
            "name": "GET /",
            "type": "request",
            "duration": 32.5,
            "spans": [{"id": 0, "name": "SELECT", "type": "db.sql", "start": 1.0, "duration": 3.5}]
        }]
    });
    let reply = send(
        &router,
        post("/v1/transactions", "application/json", payload.to_string()),
    )
    .await;

    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert!(reply.body.is_empty());
    assert_eq!(reporter.events(), 2);
}

#[tokio::test]
async fn test_legacy_payload_is_all_or_nothing() {
    let reporter = CapturingReporter::new();
    let router = app(&RuntimeConfig::default(), reporter.clone());

    let payload = json!({
        "service": {"name": "api", "agent": {"name": "python", "version": "2.0"}},
        "errors": [
            {"exception": {"message": "boom"}},
            {"culprit": "nothing else"}
        ]
    });
    let reply = send(
        &router,
        post("/v1/errors", "application/json", payload.to_string()),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"]
        .as_str()
        .unwrap()
        .starts_with("data validation error"));
    assert_eq!(reporter.events(), 0);
}

#[tokio::test]
async fn test_legacy_requires_json_content_type() {
    let router = app(&RuntimeConfig::default(), CapturingReporter::new());

    let reply = send(&router, post("/v1/errors", "text/plain", "{}")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"]
        .as_str()
        .unwrap()
        .contains("invalid content type"));
}

#[tokio::test]
async fn test_legacy_queue_full_is_503() {
    let router = app(
        &RuntimeConfig::default(),
        CapturingReporter::failing(PublishError::QueueFull),
    );

    let payload = json!({
        "service": {"name": "api", "agent": {"name": "go", "version": "1.0"}},
        "metrics": [{"samples": {"a": {"value": 1}}, "timestamp": "2018-01-01T00:00:00Z"}]
    });
    let reply = send(
        &router,
        post("/v1/metrics", "application/json", payload.to_string()),
    )
    .await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.json(), json!({"error": "queue is full"}));
}

#[tokio::test]
async fn test_metrics_endpoint_kill_switch() {
    let mut config = RuntimeConfig::default();
    config.metrics.enabled = false;
    let router = app(&config, CapturingReporter::new());

    let reply = send(&router, post("/v1/metrics", "application/json", "{}")).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}
