// Newline-delimited JSON document reader
//
// One JSON object per line. The reader is forward-only: once it reports a
// final outcome or an error, it never yields another document.

use super::StreamError;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// One parsed line of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub body: Map<String, Value>,
    /// The line as received, used for diagnostics.
    pub raw: String,
    pub line: u64,
}

/// Result of one [`NdjsonReader::next_document`] call.
///
/// `is_final` may arrive together with a document parsed from a last line
/// that had no trailing newline; that document is still valid.
#[derive(Debug)]
pub struct ReadOutcome {
    pub document: Option<Document>,
    pub is_final: bool,
}

impl ReadOutcome {
    fn finished() -> Self {
        Self {
            document: None,
            is_final: true,
        }
    }
}

pub struct NdjsonReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    line: u64,
    done: bool,
}

impl<R> NdjsonReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            line: 0,
            done: false,
        }
    }

    /// Number of lines consumed so far, blank lines included.
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    /// Read and parse the next non-blank line.
    pub async fn next_document(&mut self) -> Result<ReadOutcome, StreamError> {
        loop {
            if self.done {
                return Ok(ReadOutcome::finished());
            }

            self.buf.clear();
            let read = match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(read) => read,
                Err(err) => {
                    self.done = true;
                    return Err(StreamError::from_io(err));
                }
            };

            if read == 0 {
                self.done = true;
                return Ok(ReadOutcome::finished());
            }

            let is_final = self.buf.last() != Some(&b'\n');
            self.done = is_final;
            self.line += 1;

            let line = trim_ascii_whitespace(&self.buf);
            if line.is_empty() {
                if is_final {
                    return Ok(ReadOutcome::finished());
                }
                continue;
            }

            let document = match parse_object(line, self.line) {
                Ok(document) => document,
                Err(err) => {
                    self.done = true;
                    return Err(err);
                }
            };

            return Ok(ReadOutcome {
                document: Some(document),
                is_final,
            });
        }
    }
}

fn parse_object(line: &[u8], line_no: u64) -> Result<Document, StreamError> {
    let value: Value = serde_json::from_slice(line).map_err(|source| StreamError::InvalidJson {
        line: line_no,
        source,
    })?;

    match value {
        Value::Object(body) => Ok(Document {
            body,
            raw: String::from_utf8_lossy(line).into_owned(),
            line: line_no,
        }),
        _ => Err(StreamError::NotAnObject { line: line_no }),
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end.max(start)]
}
