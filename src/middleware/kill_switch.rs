use super::{Filter, Next};
use crate::error::IntakeError;
use crate::AppError;
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};

/// Administrative on/off gate for a route.
pub struct KillSwitch {
    enabled: bool,
}

impl KillSwitch {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Filter for KillSwitch {
    fn name(&self) -> &'static str {
        "kill_switch"
    }

    async fn call(&self, req: Request, next: Next<'_>) -> Response {
        if !self.enabled {
            return AppError::new(IntakeError::Disabled, req.headers()).into_response();
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{router, send};
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_disabled_route_is_forbidden() {
        let router = router(vec![Arc::new(KillSwitch::new(false))]);
        let response = send(&router, axum::http::Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "forbidden request: endpoint is disabled");
    }

    #[tokio::test]
    async fn test_enabled_route_passes() {
        let router = router(vec![Arc::new(KillSwitch::new(true))]);
        let response = send(&router, axum::http::Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
