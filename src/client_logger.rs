//! Logging trait for Gemini client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log all API interactions passing through the [`Gemini`](crate::Gemini)
//! client.

use crate::{Error, GenerateContentRequest, GenerateContentResponse, Model};

/// A trait for logging Gemini client operations.
///
/// Implement this trait to capture and record all API interactions,
/// including both non-streaming responses and individual streaming events.
///
/// # Example
///
/// ```rust,ignore
/// use flowchat::{ClientLogger, GenerateContentRequest, GenerateContentResponse, Model};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_request(&self, model: &Model, request: &GenerateContentRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "{model}: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_response(&self, response: &GenerateContentResponse) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Response: {}", serde_json::to_string(response).unwrap()).unwrap();
///     }
///
///     fn log_stream_event(&self, event: &GenerateContentResponse) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Stream event: {}", serde_json::to_string(event).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log an outgoing request before it is sent.
    fn log_request(&self, model: &Model, request: &GenerateContentRequest);

    /// Log a complete response from a non-streaming `send` call.
    fn log_response(&self, response: &GenerateContentResponse);

    /// Log an individual streaming event.
    ///
    /// This method is called for each partial response received during a
    /// streaming request.
    fn log_stream_event(&self, event: &GenerateContentResponse);

    /// Log a failed request or stream.
    fn log_error(&self, error: &Error) {
        _ = error;
    }
}
