// Batch accumulation for the streaming protocol
//
// Pulls documents off an NDJSON stream, dispatches each one, and hands back
// bounded batches. Per-document failures travel with the batch so the
// caller decides whether to tally or abort; read errors end the stream.

use crate::decoder::{Document, NdjsonReader, StreamError};
use crate::dispatch::{Dispatcher, DocumentError};
use crate::model::Record;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Documents pulled per batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// What the caller should do after handling a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSignal {
    /// A full batch was read; more documents may follow.
    Ready,
    /// The stream ended; this batch may be partial or empty.
    StreamDone,
}

/// A document that was read but could not become a record.
#[derive(Debug)]
pub struct DocumentFailure {
    pub line: u64,
    pub raw: String,
    pub error: DocumentError,
}

#[derive(Debug)]
pub struct Batch {
    pub records: Vec<Record>,
    pub failures: Vec<DocumentFailure>,
    pub signal: BatchSignal,
}

impl Batch {
    fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            failures: Vec::new(),
            signal: BatchSignal::Ready,
        }
    }

    /// Documents consumed from the stream for this batch.
    pub fn documents(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    pub fn is_done(&self) -> bool {
        self.signal == BatchSignal::StreamDone
    }
}

pub struct BatchReader<R> {
    documents: NdjsonReader<R>,
    dispatcher: Arc<Dispatcher>,
    batch_size: usize,
    done: bool,
}

impl<R> BatchReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(documents: NdjsonReader<R>, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_batch_size(documents, dispatcher, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(
        documents: NdjsonReader<R>,
        dispatcher: Arc<Dispatcher>,
        batch_size: usize,
    ) -> Self {
        Self {
            documents,
            dispatcher,
            batch_size: batch_size.max(1),
            done: false,
        }
    }

    /// Read up to `batch_size` documents.
    ///
    /// An `Err` is fatal: the rest of the stream is never read.
    pub async fn next_batch(&mut self) -> Result<Batch, StreamError> {
        let mut batch = Batch::new(self.batch_size);
        if self.done {
            batch.signal = BatchSignal::StreamDone;
            return Ok(batch);
        }

        while batch.documents() < self.batch_size {
            let outcome = match self.documents.next_document().await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.done = true;
                    return Err(err);
                }
            };

            if let Some(Document { body, raw, line }) = outcome.document {
                match self.dispatcher.dispatch(body) {
                    Ok(record) => batch.records.push(record),
                    Err(error) => batch.failures.push(DocumentFailure { line, raw, error }),
                }
            }

            if outcome.is_final {
                self.done = true;
                batch.signal = BatchSignal::StreamDone;
                break;
            }
        }

        Ok(batch)
    }
}
