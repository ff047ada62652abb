//! The seam between a conversation and the model that answers it.
//!
//! A [`ModelBackend`] receives the system instruction, the prior turns, the
//! new user message and sampling parameters, and produces reply text either
//! whole ([`ModelBackend::generate`]) or as a lazy stream of fragments
//! ([`ModelBackend::generate_stream`]).
//!
//! Two backends ship with the crate: [`GeminiBackend`], which talks to the
//! hosted Gemini API, and [`ScriptedBackend`], which replays canned replies
//! and is used for offline runs and tests.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::{
    FinishReason, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Model,
    UsageMetadata,
};
use crate::{Gemini, Turn};

/// A lazy sequence of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<ReplyChunk>> + Send>>;

/// Everything the remote model needs to produce the next reply.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Instruction framing the whole conversation.
    pub system_instruction: String,
    /// Prior turns, oldest first.
    pub history: Vec<Turn>,
    /// The message being answered.
    pub new_message: String,
    /// Sampling parameters.
    pub sampling: GenerationConfig,
}

impl GenerateRequest {
    /// Convert to the Gemini wire request.
    pub fn to_gemini(&self) -> GenerateContentRequest {
        let mut contents: Vec<_> = self.history.iter().map(Turn::to_content).collect();
        contents.push(Turn::user(self.new_message.clone()).to_content());
        GenerateContentRequest::new(contents)
            .with_system_instruction(self.system_instruction.clone())
            .with_generation_config(self.sampling.clone())
    }
}

/// A complete reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// The generated text.
    pub text: String,
    /// Why generation stopped, when reported.
    pub finish_reason: Option<FinishReason>,
    /// Token accounting, when reported.
    pub usage: Option<UsageMetadata>,
}

impl Reply {
    /// Create a reply carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
            usage: None,
        }
    }
}

/// One piece of a streamed reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyChunk {
    /// Text of this fragment; may be empty.
    pub text: String,
    /// Token accounting; the last chunk carries the totals.
    pub usage: Option<UsageMetadata>,
}

impl ReplyChunk {
    /// Create a chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// A remote (or simulated) generative model.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short description for banners and stats, e.g. the model name.
    fn describe(&self) -> String;

    /// Produce a complete reply.
    async fn generate(&self, request: &GenerateRequest) -> Result<Reply>;

    /// Produce a reply as a lazy stream of fragments.
    ///
    /// The default delivers the complete reply as a single fragment.
    async fn generate_stream(&self, request: &GenerateRequest) -> Result<FragmentStream> {
        let reply = self.generate(request).await?;
        let chunk = ReplyChunk {
            text: reply.text,
            usage: reply.usage,
        };
        Ok(Box::pin(stream::once(async move { Ok(chunk) })))
    }
}

////////////////////////////////////////////// Gemini //////////////////////////////////////////////

/// Backend that forwards every request to one Gemini model.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Gemini,
    model: Model,
}

impl GeminiBackend {
    /// Bind a client to a model.
    pub fn new(client: Gemini, model: Model) -> Self {
        Self { client, model }
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &Model {
        &self.model
    }
}

/// Reject withheld responses, otherwise hand the response back.
fn check_blocked(response: GenerateContentResponse) -> Result<GenerateContentResponse> {
    match response.block_reason() {
        Some(reason) => Err(Error::content_blocked(
            reason,
            "the model declined to answer this prompt",
        )),
        None => Ok(response),
    }
}

#[async_trait::async_trait]
impl ModelBackend for GeminiBackend {
    fn describe(&self) -> String {
        self.model.to_string()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Reply> {
        let response = self.client.send(&self.model, &request.to_gemini()).await?;
        let response = check_blocked(response)?;
        if response.candidates.is_empty() {
            return Err(Error::malformed_reply("response contained no candidates", None));
        }
        Ok(Reply {
            text: response.text(),
            finish_reason: response.finish_reason(),
            usage: response.usage_metadata,
        })
    }

    async fn generate_stream(&self, request: &GenerateRequest) -> Result<FragmentStream> {
        let events = self
            .client
            .stream(&self.model, &request.to_gemini())
            .await?;
        let chunks = events.map(|event| {
            let event = check_blocked(event?)?;
            Ok(ReplyChunk {
                text: event.text(),
                usage: event.usage_metadata,
            })
        });
        Ok(Box::pin(chunks))
    }
}

///////////////////////////////////////////// Scripted /////////////////////////////////////////////

/// One canned outcome for [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply with the text, streamed as a single fragment.
    Text(String),
    /// Reply with the concatenation of the fragments, streamed one by one.
    Fragments(Vec<String>),
    /// Fail before producing anything.
    Fail(Error),
    /// Stream the fragments, then fail.
    FailAfter(Vec<String>, Error),
}

/// Backend that replays scripted outcomes in order.
///
/// Once the script is exhausted, every message is echoed back.  Each request
/// is recorded so callers can inspect what a session sent.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    /// Create a backend with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that plays the given outcomes in order.
    pub fn with_script(script: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append an outcome to the script.
    pub async fn push(&self, reply: ScriptedReply) {
        self.script.lock().await.push_back(reply);
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_outcome(&self, request: &GenerateRequest) -> ScriptedReply {
        self.requests.lock().await.push(request.clone());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::Text(format!("(offline) {}", request.new_message)))
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Reply> {
        match self.next_outcome(request).await {
            ScriptedReply::Text(text) => Ok(Reply::text(text)),
            ScriptedReply::Fragments(fragments) => Ok(Reply::text(fragments.concat())),
            ScriptedReply::Fail(err) | ScriptedReply::FailAfter(_, err) => Err(err),
        }
    }

    async fn generate_stream(&self, request: &GenerateRequest) -> Result<FragmentStream> {
        let (fragments, failure) = match self.next_outcome(request).await {
            ScriptedReply::Text(text) => (vec![text], None),
            ScriptedReply::Fragments(fragments) => (fragments, None),
            ScriptedReply::Fail(err) => return Err(err),
            ScriptedReply::FailAfter(fragments, err) => (fragments, Some(err)),
        };
        let chunks = fragments
            .into_iter()
            .map(|text| Ok(ReplyChunk::text(text)))
            .chain(failure.map(Err));
        Ok(Box::pin(stream::iter(chunks.collect::<Vec<_>>())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentRole;

    fn request(new_message: &str) -> GenerateRequest {
        GenerateRequest {
            system_instruction: "You analyze workflows.".to_string(),
            history: vec![Turn::user("hello"), Turn::model("Hello!")],
            new_message: new_message.to_string(),
            sampling: GenerationConfig::new().with_top_k(40),
        }
    }

    #[test]
    fn to_gemini_appends_new_message() {
        let wire = request("list the steps").to_gemini();
        assert_eq!(wire.contents.len(), 3);
        assert_eq!(wire.contents[0].role, Some(ContentRole::User));
        assert_eq!(wire.contents[1].role, Some(ContentRole::Model));
        assert_eq!(wire.contents[2].text(), "list the steps");
        assert_eq!(
            wire.system_instruction.unwrap().text(),
            "You analyze workflows."
        );
        assert_eq!(wire.generation_config.unwrap().top_k, Some(40));
    }

    #[test]
    fn blocked_response_is_content_blocked() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = check_blocked(response).unwrap_err();
        assert!(err.is_content_blocked());
    }

    #[tokio::test]
    async fn scripted_plays_in_order_then_echoes() {
        let backend = ScriptedBackend::with_script([
            ScriptedReply::Text("first".to_string()),
            ScriptedReply::Fail(Error::timeout("slow", None)),
        ]);

        assert_eq!(backend.generate(&request("a")).await.unwrap().text, "first");
        assert!(backend.generate(&request("b")).await.unwrap_err().is_timeout());
        assert_eq!(
            backend.generate(&request("c")).await.unwrap().text,
            "(offline) c"
        );
        assert_eq!(backend.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn scripted_stream_fails_after_fragments() {
        let backend = ScriptedBackend::with_script([ScriptedReply::FailAfter(
            vec!["par".to_string(), "tial".to_string()],
            Error::streaming("connection reset", None),
        )]);

        let mut stream = backend.generate_stream(&request("go")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().text, "par");
        assert_eq!(stream.next().await.unwrap().unwrap().text, "tial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn default_stream_wraps_generate() {
        struct Fixed;

        #[async_trait::async_trait]
        impl ModelBackend for Fixed {
            fn describe(&self) -> String {
                "fixed".to_string()
            }

            async fn generate(&self, _: &GenerateRequest) -> Result<Reply> {
                Ok(Reply::text("whole"))
            }
        }

        let mut stream = Fixed.generate_stream(&request("x")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().text, "whole");
        assert!(stream.next().await.is_none());
    }
}
