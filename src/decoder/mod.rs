// Request body decoding
//
// compressed: Content-Encoding handling and the decompressed byte ceiling
// ndjson:     one JSON object per line on top of a decompressed body

mod compressed;
mod ndjson;

pub use compressed::{ContentEncoding, DecompressingReader, SizeExceeded};
pub use ndjson::{Document, NdjsonReader, ReadOutcome};

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Failures while reading the request body. All of them end the request.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    SizeExceeded(SizeExceeded),

    #[error("data read error: {0}")]
    Read(#[source] io::Error),

    #[error("invalid JSON on line {line}: {source}")]
    InvalidJson {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSON on line {line}: expected an object")]
    NotAnObject { line: u64 },
}

impl StreamError {
    /// Classify an I/O error from a [`DecompressingReader`].
    pub fn from_io(err: io::Error) -> Self {
        let size = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<SizeExceeded>())
            .copied();

        match size {
            Some(size) => StreamError::SizeExceeded(size),
            None => StreamError::Read(err),
        }
    }

    /// Malformed content, as opposed to a transport or size problem.
    pub fn is_invalid_json(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidJson { .. } | StreamError::NotAnObject { .. }
        )
    }
}

/// Drain a reader into memory, for protocols that take one JSON document.
pub async fn read_to_end<R>(mut reader: R) -> Result<Vec<u8>, StreamError>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    reader
        .read_to_end(&mut body)
        .await
        .map_err(StreamError::from_io)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classifies_size_errors() {
        let err = io::Error::new(io::ErrorKind::InvalidData, SizeExceeded { limit: 5 });
        assert!(matches!(
            StreamError::from_io(err),
            StreamError::SizeExceeded(SizeExceeded { limit: 5 })
        ));

        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset");
        let classified = StreamError::from_io(err);
        assert!(matches!(classified, StreamError::Read(_)));
        assert!(!classified.is_invalid_json());
    }

    #[tokio::test]
    async fn test_read_to_end_respects_limit() {
        let ok = read_to_end(DecompressingReader::new(
            ContentEncoding::Identity,
            &b"{\"a\":1}"[..],
            64,
        ))
        .await
        .unwrap();
        assert_eq!(ok, b"{\"a\":1}");

        let err = read_to_end(DecompressingReader::new(
            ContentEncoding::Identity,
            &b"{\"a\":1}"[..],
            3,
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, StreamError::SizeExceeded(_)));
    }
}
