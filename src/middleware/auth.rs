use super::{Filter, Next};
use crate::error::IntakeError;
use crate::AppError;
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use subtle::ConstantTimeEq;

/// Bearer-token check against the configured secret.
///
/// With no secret configured every request is let through.
pub struct BearerAuth {
    token: Option<String>,
}

impl BearerAuth {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };

        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };

        let parts: Vec<&str> = value.split(' ').collect();
        if parts.len() != 2 || parts[0] != "Bearer" {
            return false;
        }

        parts[1].as_bytes().ct_eq(expected.as_bytes()).into()
    }
}

#[async_trait]
impl Filter for BearerAuth {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn call(&self, req: Request, next: Next<'_>) -> Response {
        if !self.is_authorized(req.headers()) {
            counter!("apm_intake.auth.rejected", 1);
            return AppError::new(IntakeError::Unauthorized, req.headers()).into_response();
        }
        next.run(req).await
    }
}
