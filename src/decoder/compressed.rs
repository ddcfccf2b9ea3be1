// Decompressing body reader
//
// Wraps an inbound request body in the decoder named by Content-Encoding and
// enforces a ceiling on the number of *decompressed* bytes handed out.

use async_compression::tokio::bufread::{GzipDecoder, ZlibDecoder};
use axum::body::Body;
use axum::http::{header, HeaderMap};
use futures_util::TryStreamExt;
use metrics::counter;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;
use tracing::debug;

/// Supported `Content-Encoding` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Deflate,
    Gzip,
}

impl ContentEncoding {
    /// Unknown or absent encodings are read as identity.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
        else {
            return ContentEncoding::Identity;
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => ContentEncoding::Gzip,
            "deflate" => ContentEncoding::Deflate,
            _ => ContentEncoding::Identity,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Deflate => "deflate",
            ContentEncoding::Gzip => "gzip",
        }
    }
}

/// Raised once the decompressed stream passes its byte ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("decompressed body exceeds the limit of {limit} bytes")]
pub struct SizeExceeded {
    pub limit: u64,
}

impl SizeExceeded {
    /// Whether an I/O error returned by [`DecompressingReader`] is the size guard.
    pub fn is_cause_of(err: &io::Error) -> bool {
        err.get_ref()
            .map(|inner| inner.is::<SizeExceeded>())
            .unwrap_or(false)
    }
}

/// Reader yielding at most `limit` decompressed bytes.
///
/// Reads past the limit fail with an [`io::Error`] wrapping [`SizeExceeded`],
/// which callers can tell apart from a clean end-of-stream (`Ok` with zero
/// bytes). Once tripped, every subsequent read fails the same way.
pub struct DecompressingReader {
    inner: Pin<Box<dyn AsyncRead + Send>>,
    limit: u64,
    consumed: u64,
    exceeded: bool,
}

impl DecompressingReader {
    /// Build a reader over a request body, choosing the decoder from the headers.
    pub fn from_request(headers: &HeaderMap, body: Body, limit: u64) -> Self {
        let encoding = ContentEncoding::from_headers(headers);

        counter!("apm_intake.decoder.requests", 1, "encoding" => encoding.as_str());
        match content_length(headers) {
            Some(len) => {
                counter!("apm_intake.decoder.content_length", len, "encoding" => encoding.as_str());
            }
            None => {
                debug!(
                    encoding = encoding.as_str(),
                    "Request without content-length"
                );
                counter!("apm_intake.decoder.missing_content_length", 1);
            }
        }

        let stream = body.into_data_stream().map_err(io::Error::other);
        Self::new(encoding, StreamReader::new(stream), limit)
    }

    /// Build a reader over any buffered byte source.
    pub fn new<R>(encoding: ContentEncoding, reader: R, limit: u64) -> Self
    where
        R: AsyncBufRead + Send + 'static,
    {
        let inner: Pin<Box<dyn AsyncRead + Send>> = match encoding {
            ContentEncoding::Identity => Box::pin(reader),
            ContentEncoding::Deflate => Box::pin(ZlibDecoder::new(reader)),
            ContentEncoding::Gzip => Box::pin(GzipDecoder::new(reader)),
        };

        Self {
            inner,
            limit,
            consumed: 0,
            exceeded: false,
        }
    }

    /// Decompressed bytes handed out so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn size_exceeded(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            SizeExceeded { limit: self.limit },
        )
    }
}

impl AsyncRead for DecompressingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.exceeded {
            return Poll::Ready(Err(this.size_exceeded()));
        }

        let before = buf.filled().len();
        ready!(this.inner.as_mut().poll_read(cx, buf))?;
        let read = (buf.filled().len() - before) as u64;

        this.consumed += read;
        if this.consumed > this.limit {
            // Nothing past the ceiling is handed to the caller.
            buf.set_filled(before);
            this.exceeded = true;
            return Poll::Ready(Err(this.size_exceeded()));
        }

        Poll::Ready(Ok(()))
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
