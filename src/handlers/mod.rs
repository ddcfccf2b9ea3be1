// HTTP request handlers
//
// streaming: the NDJSON intake protocol (/v2/...)
// legacy:    single-payload endpoints (/v1/...)

pub mod legacy;
pub mod streaming;

use crate::augment::Augmenter;
use crate::routes::Tier;
use crate::AppState;
use axum::http::{header, Extensions, HeaderMap, StatusCode};
use axum::response::IntoResponse;

/// Handler state for one route: the shared state plus the route's tier.
#[derive(Clone)]
pub struct RouteState {
    pub app: AppState,
    pub tier: Tier,
}

impl RouteState {
    pub fn new(app: AppState, tier: Tier) -> Self {
        Self { app, tier }
    }

    /// Capture the request fields this route adds to metadata.
    pub(crate) fn augmenter(&self, headers: &HeaderMap, extensions: &Extensions) -> Augmenter {
        match self.tier.augment_target() {
            Some(target) if self.app.augment_enabled => {
                Augmenter::from_request(target, headers, extensions)
            }
            _ => Augmenter::disabled(),
        }
    }
}

/// GET / and /healthcheck - liveness probe
pub(crate) async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Whether the request's `Content-Type` contains one of `accepted`.
pub(crate) fn content_type_is(headers: &HeaderMap, accepted: &[&str]) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            accepted.iter().any(|a| ct.contains(a))
        })
        .unwrap_or(false)
}

pub(crate) fn content_type_of(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
