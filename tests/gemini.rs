//! The Gemini backend against a local one-shot HTTP server.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use flowchat::chat::{ChatSession, SessionConfig, default_seed};
use flowchat::{
    ClientLogger, Error, GenerateContentRequest, GenerateContentResponse, Model, Renderer, Reveal,
    Role, Turn,
};

/// A request as seen by the server.
struct Captured {
    head: String,
    body: serde_json::Value,
}

/// Serve exactly one request with `status` and `reply`, then close.
async fn serve_once(
    status: &'static str,
    content_type: &'static str,
    reply: String,
) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/v1beta/", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map(|value| value.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap();

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
            reply.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        Captured { head, body }
    });
    (base_url, handle)
}

fn config(base_url: &str) -> SessionConfig {
    SessionConfig::new()
        .with_api_key("test-key")
        .with_base_url(base_url)
}

#[derive(Default)]
struct Collect {
    text: String,
}

impl Renderer for Collect {
    fn print_turn(&mut self, _: &Turn) {}
    fn print_text(&mut self, text: &str) {
        self.text.push_str(text);
    }
    fn print_error(&mut self, _: &str) {}
    fn print_info(&mut self, _: &str) {}
    fn finish_response(&mut self) {}
    fn print_interrupted(&mut self) {}
}

#[derive(Default)]
struct CountingLogger {
    counts: std::sync::Mutex<[usize; 4]>,
}

impl ClientLogger for CountingLogger {
    fn log_request(&self, _: &Model, _: &GenerateContentRequest) {
        self.counts.lock().unwrap()[0] += 1;
    }

    fn log_response(&self, _: &GenerateContentResponse) {
        self.counts.lock().unwrap()[1] += 1;
    }

    fn log_stream_event(&self, _: &GenerateContentResponse) {
        self.counts.lock().unwrap()[2] += 1;
    }

    fn log_error(&self, _: &Error) {
        self.counts.lock().unwrap()[3] += 1;
    }
}

#[tokio::test]
async fn submit_round_trips_through_generate_content() {
    let reply = serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": "Three steps."}]},
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 3, "totalTokenCount": 123}
    });
    let (base_url, server) = serve_once("200 OK", "application/json", reply.to_string()).await;
    let logger = Arc::new(CountingLogger::default());
    let mut session =
        ChatSession::connect_with_logger(config(&base_url), default_seed(), Some(logger.clone()))
            .unwrap();

    let turn = session.submit("list the steps").await.unwrap();
    assert_eq!(turn.text(), "Three steps.");
    assert_eq!(session.history().len(), 4);
    assert_eq!(session.stats().total_prompt_tokens, 120);
    assert_eq!(*logger.counts.lock().unwrap(), [1, 1, 0, 0]);

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with(
        "post /v1beta/models/gemini-1.5-flash:generatecontent http/1.1"
    ));
    assert!(captured.head.contains("x-goog-api-key: test-key"));
    let body = captured.body;
    assert_eq!(body["contents"].as_array().unwrap().len(), 3);
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
    assert_eq!(body["contents"][1]["role"], "model");
    assert_eq!(body["contents"][2]["parts"][0]["text"], "list the steps");
    assert!(
        body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You are an assistant for industrial workflow processing.")
    );
    assert_eq!(body["generationConfig"]["topK"], 40);
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    assert_eq!(body["generationConfig"]["responseMimeType"], "text/plain");
}

#[tokio::test]
async fn blocked_prompt_is_content_blocked() {
    let reply = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
    let (base_url, server) = serve_once("200 OK", "application/json", reply.to_string()).await;
    let mut session = ChatSession::connect(config(&base_url), Vec::new()).unwrap();

    let err = session.submit("something unsafe").await.unwrap_err();
    assert!(err.is_content_blocked(), "{err}");
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history()[0].role(), Role::User);
    server.await.unwrap();
}

#[tokio::test]
async fn server_error_is_transport() {
    let reply = serde_json::json!({
        "error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}
    });
    let (base_url, server) =
        serve_once("503 Service Unavailable", "application/json", reply.to_string()).await;
    let mut session = ChatSession::connect(config(&base_url), default_seed()).unwrap();

    let err = session.submit("list the steps").await.unwrap_err();
    assert!(err.is_transport(), "{err}");
    assert!(err.is_retryable());
    assert_eq!(session.history().len(), 3);
    server.await.unwrap();
}

#[tokio::test]
async fn streaming_reply_is_revealed_and_committed() {
    let events = [
        serde_json::json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Mixing, "}]}}]}),
        serde_json::json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "baking, packaging."}]}, "finishReason": "STOP"}],
                           "usageMetadata": {"promptTokenCount": 50, "candidatesTokenCount": 6, "totalTokenCount": 56}}),
    ];
    let body: String = events
        .iter()
        .map(|event| format!("data: {event}\r\n\r\n"))
        .collect();
    let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;
    let logger = Arc::new(CountingLogger::default());
    let mut session =
        ChatSession::connect_with_logger(config(&base_url), default_seed(), Some(logger.clone()))
            .unwrap();
    let mut renderer = Collect::default();
    let mut reveal = Reveal::new(|| 7, Duration::ZERO);
    let interrupted = AtomicBool::new(false);

    let turn = session
        .submit_streaming("list the steps", &mut renderer, &mut reveal, &interrupted)
        .await
        .unwrap();

    assert_eq!(turn.text(), "Mixing, baking, packaging.");
    assert_eq!(renderer.text, "Mixing, baking, packaging.");
    assert_eq!(session.history().len(), 4);
    assert_eq!(session.stats().total_reply_tokens, 6);
    assert_eq!(*logger.counts.lock().unwrap(), [1, 0, 2, 0]);

    let captured = server.await.unwrap();
    assert!(captured.head.contains(":streamgeneratecontent?alt=sse"));
}

#[tokio::test]
async fn streaming_block_mid_reply_keeps_user_turn() {
    let events = [
        serde_json::json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Sure, "}]}}]}),
        serde_json::json!({"candidates": [{"finishReason": "SAFETY"}]}),
    ];
    let body: String = events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect();
    let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;
    let mut session = ChatSession::connect(config(&base_url), Vec::new()).unwrap();
    let mut renderer = Collect::default();
    let interrupted = AtomicBool::new(false);

    let err = session
        .submit_streaming("x", &mut renderer, &mut Reveal::immediate(), &interrupted)
        .await
        .unwrap_err();

    assert!(err.is_content_blocked(), "{err}");
    assert_eq!(renderer.text, "Sure, ");
    assert_eq!(session.history().len(), 1);
    server.await.unwrap();
}
