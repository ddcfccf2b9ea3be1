// Publishing queue
//
// Handlers hand decoded batches to a `Reporter`. The default reporter is a
// bounded in-process channel drained by a background task; the downstream
// sink behind that task lives outside this crate.

use crate::model::{Metadata, Record};
use async_trait::async_trait;
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Records decoded from one batch, sharing the request's metadata.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub metadata: Arc<Metadata>,
    pub records: Vec<Record>,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("queue is full")]
    QueueFull,
    #[error("timeout while waiting to process request")]
    ProcessingTimeout,
    #[error("server is shutting down")]
    ShuttingDown,
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, batch: PendingBatch) -> Result<(), PublishError>;
}

/// Bounded queue in front of the event sink.
pub struct QueueReporter {
    sender: mpsc::Sender<PendingBatch>,
    timeout: Option<Duration>,
    stopped: AtomicBool,
}

impl QueueReporter {
    /// `timeout` of `None` rejects immediately when the queue is full.
    pub fn new(capacity: usize, timeout: Option<Duration>) -> (Self, mpsc::Receiver<PendingBatch>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let reporter = Self {
            sender,
            timeout,
            stopped: AtomicBool::new(false),
        };
        (reporter, receiver)
    }

    /// Reject all further submissions with [`PublishError::ShuttingDown`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Reporter for QueueReporter {
    async fn report(&self, batch: PendingBatch) -> Result<(), PublishError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PublishError::ShuttingDown);
        }

        let result = match self.timeout {
            None => self.sender.try_send(batch).map_err(|err| match err {
                TrySendError::Full(_) => PublishError::QueueFull,
                TrySendError::Closed(_) => PublishError::ShuttingDown,
            }),
            Some(timeout) => self
                .sender
                .send_timeout(batch, timeout)
                .await
                .map_err(|err| match err {
                    SendTimeoutError::Timeout(_) => PublishError::ProcessingTimeout,
                    SendTimeoutError::Closed(_) => PublishError::ShuttingDown,
                }),
        };

        match &result {
            Ok(()) => counter!("apm_intake.publish.batches", 1, "outcome" => "queued"),
            Err(PublishError::QueueFull) => {
                counter!("apm_intake.publish.batches", 1, "outcome" => "queue_full")
            }
            Err(PublishError::ProcessingTimeout) => {
                counter!("apm_intake.publish.batches", 1, "outcome" => "timeout")
            }
            Err(PublishError::ShuttingDown) => {
                counter!("apm_intake.publish.batches", 1, "outcome" => "shutting_down")
            }
        }

        result
    }
}

/// Drain queued batches until every sender is gone.
pub fn spawn_consumer(mut receiver: mpsc::Receiver<PendingBatch>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut events = 0u64;
        while let Some(batch) = receiver.recv().await {
            for record in &batch.records {
                counter!("apm_intake.publish.events", 1, "kind" => record.kind().key());
            }
            events += batch.len() as u64;
            debug!(
                service_name = %batch.metadata.service.name,
                events = batch.len(),
                "Published batch"
            );
        }
        info!(events, "Publishing queue drained");
        events
    })
}
