use super::{Filter, Next};
use crate::error::IntakeError;
use crate::AppError;
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

/// Process-wide permit pool bounding in-flight requests.
///
/// A request waits at most `max_wait` for a permit. The permit is owned by
/// the request future, so it returns to the pool however that future ends.
pub struct ConcurrencyLimit {
    permits: Arc<Semaphore>,
    max_wait: Duration,
}

impl ConcurrencyLimit {
    pub fn new(permits: Arc<Semaphore>, max_wait: Duration) -> Self {
        Self { permits, max_wait }
    }
}

#[async_trait]
impl Filter for ConcurrencyLimit {
    fn name(&self) -> &'static str {
        "concurrency"
    }

    async fn call(&self, req: Request, next: Next<'_>) -> Response {
        let start = Instant::now();
        let acquired =
            tokio::time::timeout(self.max_wait, Arc::clone(&self.permits).acquire_owned()).await;
        histogram!(
            "apm_intake.concurrency.wait_seconds",
            start.elapsed().as_secs_f64()
        );

        match acquired {
            Ok(Ok(permit)) => {
                let response = next.run(req).await;
                drop(permit);
                response
            }
            Ok(Err(_)) | Err(_) => {
                debug!(
                    waited_ms = start.elapsed().as_millis() as u64,
                    "No concurrency permit available"
                );
                counter!("apm_intake.concurrency.rejected", 1);
                AppError::new(IntakeError::ConcurrencyTimeout, req.headers()).into_response()
            }
        }
    }
}
