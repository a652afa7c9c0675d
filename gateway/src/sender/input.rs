//! NDJSON input for the replay sender
//!
//! One JSON document per line. Blank lines are skipped and anything after
//! the first ` # ` is treated as a comment.

use serde_json::Value;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Marker that starts an inline comment
pub const COMMENT_MARKER: &str = " # ";

/// Strip whitespace and trailing comment; `None` for blank lines
pub fn clean_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(COMMENT_MARKER) {
        Some((body, _)) => Some(body.trim()),
        None => Some(line),
    }
}

/// A line that could not be turned into a JSON value
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("line {line}: invalid UTF-8: {source}")]
    Utf8 {
        line: usize,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl LineError {
    /// 1-based line number
    pub fn line(&self) -> usize {
        match self {
            LineError::Utf8 { line, .. } | LineError::Json { line, .. } => *line,
        }
    }
}

/// Streaming reader over an NDJSON file
///
/// Lines are read as raw bytes so one undecodable line does not end the
/// stream.
pub struct RecordReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
    line_no: usize,
}

impl RecordReader {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            reader: BufReader::new(file),
            buf: Vec::new(),
            line_no: 0,
        })
    }

    /// Next non-blank line, parsed
    ///
    /// Returns `Ok(None)` at end of input. The inner result carries a decode
    /// or parse failure for the line without ending the stream.
    pub async fn next_record(&mut self) -> std::io::Result<Option<Result<Value, LineError>>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.line_no;

            let text = match std::str::from_utf8(&self.buf) {
                Ok(text) => text,
                Err(source) => return Ok(Some(Err(LineError::Utf8 { line, source }))),
            };
            let Some(cleaned) = clean_line(text) else {
                continue;
            };
            let parsed =
                serde_json::from_str(cleaned).map_err(|source| LineError::Json { line, source });
            return Ok(Some(parsed));
        }
    }
}
