//! Logging trait for inference client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows callers to
//! capture every request and streamed chunk passing through the [`Groq`]
//! client, plus [`JsonLinesLogger`], which appends one JSON object per event
//! to a file.
//!
//! [`Groq`]: crate::Groq

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::{ChatCompletionChunk, ChatCompletionRequest, Error, Result};

/// A trait for logging inference client operations.
///
/// Implement this trait to record API interactions. Requests are logged
/// without their credential; only the body sent to the server is exposed.
///
/// # Example
///
/// ```rust,ignore
/// use groqchat::{ChatCompletionChunk, ChatCompletionRequest, ClientLogger, Error};
///
/// struct StderrLogger;
///
/// impl ClientLogger for StderrLogger {
///     fn log_request(&self, request: &ChatCompletionRequest) {
///         eprintln!("request: {} messages", request.messages.len());
///     }
///
///     fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
///         eprintln!("chunk: {:?}", chunk.fragment());
///     }
///
///     fn log_stream_complete(&self, text: &str) {
///         eprintln!("complete: {} bytes", text.len());
///     }
///
///     fn log_stream_error(&self, error: &Error) {
///         eprintln!("error: {error}");
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &ChatCompletionRequest);

    /// Log an individual streamed chunk.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);

    /// Log the accumulated text of a stream that finished cleanly.
    fn log_stream_complete(&self, text: &str);

    /// Log the error that ended a request or stream.
    fn log_stream_error(&self, error: &Error);
}

/// A [`ClientLogger`] that appends JSON lines to a file.
pub struct JsonLinesLogger {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesLogger {
    /// Opens (or creates) `path` for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|err| Error::io("failed to open log file", err))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write(&self, kind: &str, payload: Value) {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let line = json!({
            "ts": timestamp,
            "kind": kind,
            "payload": payload,
        });
        // Drop the line on failure.
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}

impl ClientLogger for JsonLinesLogger {
    fn log_request(&self, request: &ChatCompletionRequest) {
        self.write(
            "request",
            serde_json::to_value(request).unwrap_or(Value::Null),
        );
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        self.write(
            "chunk",
            serde_json::to_value(chunk).unwrap_or(Value::Null),
        );
    }

    fn log_stream_complete(&self, text: &str) {
        self.write("complete", json!({ "text": text }));
    }

    fn log_stream_error(&self, error: &Error) {
        self.write("error", json!({ "message": error.to_string() }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Model, Turn};

    #[test]
    fn json_lines_logger_appends_events() {
        let path = std::env::temp_dir().join(format!(
            "groqchat-logger-test-{}.jsonl",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let logger = JsonLinesLogger::open(&path).unwrap();
        let request =
            ChatCompletionRequest::new(Model::from("m1"), &[Turn::user("hi")], 0.5, 500);
        logger.log_request(&request);
        logger.log_stream_chunk(&ChatCompletionChunk::text("Hel"));
        logger.log_stream_complete("Hello");
        logger.log_stream_error(&Error::authentication("invalid api key"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        for line in &lines {
            let ts = line["ts"].as_str().unwrap();
            let parsed = OffsetDateTime::parse(ts, &Rfc3339).unwrap();
            assert_eq!(parsed.offset(), time::UtcOffset::UTC);
        }
        assert_eq!(lines[0]["kind"], "request");
        assert_eq!(lines[0]["payload"]["messages"][0]["content"], "hi");
        assert_eq!(lines[1]["kind"], "chunk");
        assert_eq!(lines[2]["payload"]["text"], "Hello");
        assert_eq!(lines[3]["kind"], "error");

        let _ = std::fs::remove_file(&path);
    }
}
