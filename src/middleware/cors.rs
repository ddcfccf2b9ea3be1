use super::{Filter, Next};
use crate::error::IntakeError;
use crate::AppError;
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Content-Encoding, Accept";
const PREFLIGHT_MAX_AGE: &str = "3600";

/// Match `subject` against a pattern where `*` stands for any run of characters.
pub fn glob_match(pattern: &str, subject: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let Some((last, inner)) = parts.split_last() else {
        return subject.is_empty();
    };
    if inner.is_empty() {
        return subject == pattern;
    }

    let mut rest = subject;
    for (i, part) in inner.iter().enumerate() {
        match rest.find(part) {
            Some(idx) if i > 0 || idx == 0 => rest = &rest[idx + part.len()..],
            _ => return false,
        }
    }

    pattern.ends_with('*') || rest.ends_with(last)
}

/// Origin allow-list for browser routes.
///
/// Allowed origins are echoed back verbatim rather than answered with `*`,
/// which keeps credentialed requests working.
pub struct Cors {
    allowed: Vec<String>,
}

impl Cors {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.iter().any(|pattern| glob_match(pattern, origin))
    }

    fn preflight(&self, origin: Option<&HeaderValue>, allowed: bool) -> Response {
        let mut headers = HeaderMap::new();
        if let (Some(origin), true) = (origin, allowed) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));

        (StatusCode::OK, headers).into_response()
    }
}

#[async_trait]
impl Filter for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn call(&self, req: Request, next: Next<'_>) -> Response {
        let origin = req.headers().get(header::ORIGIN).cloned();
        let origin_str = origin
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let allowed = self.is_allowed(&origin_str);

        if req.method() == Method::OPTIONS {
            return self.preflight(origin.as_ref(), allowed);
        }

        if !allowed {
            debug!(origin = %origin_str, "Rejected request from origin");
            return AppError::new(IntakeError::OriginNotAllowed(origin_str), req.headers())
                .into_response();
        }

        let mut response = next.run(req).await;
        let headers = response.headers_mut();
        if let Some(origin) = origin {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        response
    }
}
