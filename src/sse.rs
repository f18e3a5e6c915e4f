//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! This module turns the raw byte stream of an HTTP response into a stream of
//! [`ChatCompletionChunk`]s. Events are separated by a blank line; the
//! `data:` lines of an event carry one JSON chunk, and `data: [DONE]` ends
//! the stream.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS};
use crate::{ChatCompletionChunk, Error, Result};

/// Terminal sentinel sent by OpenAI-compatible servers.
const DONE_SENTINEL: &str = "[DONE]";

/// One parsed SSE event.
#[derive(Debug)]
enum Event {
    Chunk(Result<ChatCompletionChunk>),
    Done,
    Skip,
}

/// Process a stream of bytes into a stream of chat-completion chunks.
///
/// Transport errors are converted into [`Error::Streaming`]; the stream ends
/// at `[DONE]` or when the underlying byte stream is exhausted.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer = String::new();
    let pending = Vec::<u8>::new();

    stream::unfold(
        Some((stream, buffer, pending)),
        move |state| async move {
            let (mut stream, mut buffer, mut pending) = state?;
            loop {
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match event {
                        Event::Chunk(chunk) => {
                            if chunk.is_err() {
                                STREAM_ERRORS.click();
                            }
                            return Some((chunk, Some((stream, buffer, pending))));
                        }
                        Event::Done => return None,
                        Event::Skip => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        pending.extend_from_slice(&bytes);
                        // A multi-byte character may straddle two reads.
                        let valid = match std::str::from_utf8(&pending) {
                            Ok(_) => pending.len(),
                            Err(e) if e.error_len().is_none() => e.valid_up_to(),
                            Err(e) => {
                                STREAM_ERRORS.click();
                                return Some((
                                    Err(Error::encoding(
                                        format!("Invalid UTF-8 in stream: {e}"),
                                        Some(Box::new(e)),
                                    )),
                                    None,
                                ));
                            }
                        };
                        // Hold back a trailing CR until we know whether LF follows.
                        let ready = if valid > 0 && pending[valid - 1] == b'\r' {
                            valid - 1
                        } else {
                            valid
                        };
                        let text = String::from_utf8_lossy(&pending[..ready]).into_owned();
                        push_normalized(&mut buffer, &text);
                        pending.drain(..ready);
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), None));
                    }
                    None => {
                        if pending.first() == Some(&b'\r') {
                            buffer.push('\n');
                            pending.remove(0);
                        }
                        if !pending.is_empty() {
                            STREAM_ERRORS.click();
                            return Some((
                                Err(Error::encoding(
                                    format!(
                                        "Stream ended inside a UTF-8 sequence ({} bytes left)",
                                        pending.len()
                                    ),
                                    None,
                                )),
                                None,
                            ));
                        }
                        // A final event may lack its trailing blank line.
                        if !buffer.trim().is_empty() {
                            buffer.push_str("\n\n");
                            if let Some((Event::Chunk(chunk), _)) = extract_event(&buffer) {
                                return Some((chunk, None));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

fn push_normalized(buffer: &mut String, text: &str) {
    if text.contains('\r') {
        buffer.push_str(&text.replace("\r\n", "\n"));
    } else {
        buffer.push_str(text);
    }
}

/// Extract a complete SSE event from a buffer string.
fn extract_event(buffer: &str) -> Option<(Event, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let mut data = Vec::new();
    for line in event_text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data.is_empty() {
        return Some((Event::Skip, rest));
    }
    let data = data.join("\n");
    if data.trim() == DONE_SENTINEL {
        return Some((Event::Done, rest));
    }
    Some((Event::Chunk(parse_chunk(&data)), rest))
}

/// Parse the data payload of one event.
fn parse_chunk(data: &str) -> Result<ChatCompletionChunk> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(data) {
        return Err(Error::api(
            500,
            payload
                .error
                .error_type
                .or_else(|| Some("stream_error".to_string())),
            payload.error.message.unwrap_or_else(|| data.to_string()),
            None,
        ));
    }

    serde_json::from_str::<ChatCompletionChunk>(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })
}
