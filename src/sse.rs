//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! `streamGenerateContent?alt=sse` answers with one `data:` event per partial
//! response, each carrying a complete `GenerateContentResponse` JSON object.
//! This module turns the raw byte stream into those objects.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::{Error, GenerateContentResponse, Result};

/// Process a stream of bytes into a stream of server-sent events.
///
/// Handles events split across chunks, multi-byte characters split across
/// chunks, and both `\n` and `\r\n` line endings.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<GenerateContentResponse>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let state = SseState {
        text: String::new(),
        pending: Vec::new(),
    };

    stream::unfold((stream, state), move |(mut stream, mut state)| async move {
        loop {
            // First check if we have a complete event in the buffer
            if let Some((event, remaining)) = extract_event(&state.text) {
                state.text = remaining;
                match event {
                    Some(event) => {
                        if event.is_err() {
                            STREAM_ERRORS.click();
                        } else {
                            STREAM_EVENTS.click();
                        }
                        return Some((event, (stream, state)));
                    }
                    None => continue,
                }
            }

            // Read more data
            match stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    if let Err(e) = state.push_bytes(&bytes) {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, state)));
                    }
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    return Some((Err(e), (stream, state)));
                }
                None => {
                    // End of stream; a final event may lack its blank line.
                    if !state.text.trim().is_empty() {
                        let tail = std::mem::take(&mut state.text) + "\n\n";
                        if let Some((Some(event), _)) = extract_event(&tail) {
                            return Some((event, (stream, state)));
                        }
                    }
                    return None;
                }
            }
        }
    })
}

struct SseState {
    text: String,
    pending: Vec<u8>,
}

impl SseState {
    fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // An incomplete trailing sequence waits for the next chunk.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(Error::encoding(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ));
            }
        };
        let mut rest = self.pending.split_off(valid);
        // A trailing CR may be the first half of a CRLF split across chunks.
        if rest.is_empty() && self.pending.last() == Some(&b'\r') {
            self.pending.pop();
            rest.push(b'\r');
        }
        let complete = std::mem::replace(&mut self.pending, rest);
        let text = String::from_utf8(complete).map_err(|e| {
            Error::encoding(format!("Invalid UTF-8 in stream: {e}"), Some(Box::new(e)))
        })?;
        self.text.push_str(&text.replace("\r\n", "\n"));
        Ok(())
    }
}

/// Extract a complete SSE event from a buffer string.
///
/// Returns `None` when no complete event is buffered, `Some((None, rest))`
/// for events without data (comments, keep-alives).
#[allow(clippy::type_complexity)]
fn extract_event(buffer: &str) -> Option<(Option<Result<GenerateContentResponse>>, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let data = event_text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n");

    if data.trim().is_empty() {
        return Some((None, rest));
    }

    Some((Some(parse_event_data(&data)), rest))
}

/// Parse the data of one event, recognizing in-band error objects.
fn parse_event_data(data: &str) -> Result<GenerateContentResponse> {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        code: Option<u16>,
        message: Option<String>,
        status: Option<String>,
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        let detail = envelope.error;
        return Err(Error::api(
            detail.code.unwrap_or(500),
            detail.status,
            detail
                .message
                .unwrap_or_else(|| "error event in stream".to_string()),
        ));
    }

    serde_json::from_str::<GenerateContentResponse>(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })
}
