//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the transcript of
//! one conversation and mediates every call to the model backend.
//!
//! A submit builds its request from the committed transcript plus the pending
//! user message and commits turns only once the backend call settles.  A
//! successful call commits the user turn and the reply; a failed call commits
//! the user turn alone; an abandoned call commits nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::{Mutex, MutexGuard};

use crate::accumulating_stream::AccumulatingStream;
use crate::backend::{GenerateRequest, GeminiBackend, ModelBackend, Reply};
use crate::chat::config::SessionConfig;
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_BLOCKED, SESSION_CANCELLED, SESSION_RESETS, SESSION_SUBMIT_ERRORS, SESSION_SUBMITS,
    SESSION_TURN_DURATION,
};
use crate::types::UsageMetadata;
use crate::{ClientLogger, Gemini, Renderer, Reveal, Turn, WorkflowDocument, WorkflowPlacement};

/// How often a streaming submit looks at the interrupt flag while waiting.
const INTERRUPT_POLL: Duration = Duration::from_millis(25);

/// A chat session that manages conversation state and backend interactions.
pub struct ChatSession<B: ModelBackend> {
    backend: B,
    config: SessionConfig,
    seed: Vec<Turn>,
    transcript: Vec<Turn>,
    usage_totals: UsageMetadata,
    last_turn_usage: Option<UsageMetadata>,
    request_count: u64,
    failure_count: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The backend answering the session, usually the model name.
    pub backend: String,
    /// The number of turns in the transcript.
    pub message_count: usize,
    /// The number of seed turns the transcript resets to.
    pub seed_count: usize,
    /// Total number of backend requests made.
    pub total_requests: u64,
    /// Requests that ended in an error.
    pub failed_requests: u64,
    /// Prompt tokens across all successful requests.
    pub total_prompt_tokens: u64,
    /// Reply tokens across all successful requests.
    pub total_reply_tokens: u64,
    /// Usage of the last successful turn, if the backend reported it.
    pub last_turn_usage: Option<UsageMetadata>,
}

impl ChatSession<GeminiBackend> {
    /// Create a session backed by the Gemini API.
    ///
    /// The API key comes from the configuration or, failing that, from
    /// `GEMINI_API_KEY` / `GOOGLE_API_KEY`.  Missing credentials are reported
    /// as [`Error::Configuration`] without touching the network.
    pub fn connect(config: SessionConfig, initial_history: Vec<Turn>) -> Result<Self> {
        Self::connect_with_logger(config, initial_history, None)
    }

    /// Like [`ChatSession::connect`], with a logger attached to the client.
    pub fn connect_with_logger(
        config: SessionConfig,
        initial_history: Vec<Turn>,
        logger: Option<Arc<dyn ClientLogger>>,
    ) -> Result<Self> {
        config.validate()?;
        let mut client = Gemini::with_options(
            config.api_key.clone(),
            config.project.clone(),
            config.base_url.clone(),
            None,
        )?;
        if let Some(logger) = logger {
            client = client.with_logger(logger);
        }
        let backend = GeminiBackend::new(client, config.model.clone());
        Self::start(backend, config, initial_history)
    }
}

impl<B: ModelBackend> ChatSession<B> {
    /// Create a session over `backend` starting from `initial_history`.
    ///
    /// The initial history is also what [`ChatSession::reset`] returns to.
    pub fn start(backend: B, config: SessionConfig, initial_history: Vec<Turn>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            transcript: initial_history.clone(),
            seed: initial_history,
            usage_totals: UsageMetadata::default(),
            last_turn_usage: None,
            request_count: 0,
            failure_count: 0,
        })
    }

    /// Sends a user message and returns the model's reply turn.
    ///
    /// On failure the user turn stays in the transcript and no model turn is
    /// added.  Dropping the returned future before it completes leaves the
    /// transcript exactly as it was.
    pub async fn submit(&mut self, user_text: &str) -> Result<Turn> {
        SESSION_SUBMITS.click();
        let started = Instant::now();
        let request = self.request(user_text);
        let user = Turn::user(user_text).stamped();
        self.request_count = self.request_count.saturating_add(1);

        let outcome = self.backend.generate(&request).await;
        SESSION_TURN_DURATION.add(started.elapsed().as_secs_f64());
        match outcome {
            Ok(reply) => Ok(self.commit_reply(user, reply)),
            Err(err) => Err(self.commit_failure(user, err)),
        }
    }

    /// Sends a user message and reveals the reply on `renderer` as it streams.
    ///
    /// Fragments pass through `reveal` on their way to the renderer; the
    /// model turn is committed once the stream completes.  A failure part way
    /// through keeps the user turn only.  Raising `interrupted` abandons the
    /// reply: the transcript is left as it was before the call and
    /// [`Error::Abort`] is returned.
    pub async fn submit_streaming(
        &mut self,
        user_text: &str,
        renderer: &mut dyn Renderer,
        reveal: &mut Reveal,
        interrupted: &AtomicBool,
    ) -> Result<Turn> {
        SESSION_SUBMITS.click();
        let started = Instant::now();
        let request = self.request(user_text);
        let user = Turn::user(user_text).stamped();
        self.request_count = self.request_count.saturating_add(1);
        renderer.start_response();

        let fragments = tokio::select! {
            biased;
            _ = wait_for(interrupted) => return Err(cancelled(renderer)),
            fragments = self.backend.generate_stream(&request) => fragments,
        };
        let fragments = match fragments {
            Ok(fragments) => fragments,
            Err(err) => {
                renderer.finish_response();
                return Err(self.commit_failure(user, err));
            }
        };

        let (mut stream, reply_rx) = AccumulatingStream::new(fragments);
        loop {
            let item = tokio::select! {
                biased;
                _ = wait_for(interrupted) => return Err(cancelled(renderer)),
                item = stream.next() => item,
            };
            match item {
                Some(Ok(chunk)) => {
                    if !reveal.emit(&chunk.text, renderer, interrupted).await {
                        return Err(cancelled(renderer));
                    }
                }
                Some(Err(err)) => {
                    renderer.finish_response();
                    return Err(self.commit_failure(user, err));
                }
                None => break,
            }
        }
        SESSION_TURN_DURATION.add(started.elapsed().as_secs_f64());
        renderer.finish_response();

        let reply = match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => Err(Error::streaming("reply stream closed before completion", None)),
        };
        match reply {
            Ok(reply) => Ok(self.commit_reply(user, reply)),
            Err(err) => Err(self.commit_failure(user, err)),
        }
    }

    /// Brings a workflow into the conversation.
    ///
    /// With [`WorkflowPlacement::FirstTurn`] the document is sent as a user
    /// message asking for an analysis, and the reply turn is returned.  With
    /// [`WorkflowPlacement::SystemInstruction`] the document must already be
    /// part of the session's system instruction (see
    /// [`SessionConfig::with_workflow`]); the instruction is fixed once the
    /// session starts, so nothing is sent.
    pub async fn load_workflow(
        &mut self,
        document: &WorkflowDocument,
        placement: WorkflowPlacement,
    ) -> Result<Option<Turn>> {
        match placement {
            WorkflowPlacement::FirstTurn => self.submit(&document.analysis_prompt()).await.map(Some),
            WorkflowPlacement::SystemInstruction => {
                if self.config.system_instruction.contains(document.text()) {
                    Ok(None)
                } else {
                    Err(Error::configuration(
                        "the system instruction is fixed once a session starts; \
                         embed the workflow before starting the session",
                        Some("system_instruction".to_string()),
                    ))
                }
            }
        }
    }

    /// Asks the model to rewrite `document` according to `instruction`.
    ///
    /// The exchange is recorded like any other submit.  A reply that does not
    /// contain parseable JSON yields [`Error::MalformedReply`]; `document`
    /// itself is never changed.
    pub async fn modify_workflow(
        &mut self,
        document: &WorkflowDocument,
        instruction: &str,
    ) -> Result<WorkflowDocument> {
        let reply = self.submit(&document.modification_prompt(instruction)).await?;
        let modified = WorkflowDocument::from_reply(reply.text())?;
        Ok(match document.name() {
            Some(name) => modified.with_name(name),
            None => modified,
        })
    }

    /// Restores the transcript to the seed turns.
    ///
    /// Usage totals are kept; they describe the session, not the transcript.
    pub fn reset(&mut self) {
        SESSION_RESETS.click();
        self.transcript.clone_from(&self.seed);
    }

    /// The transcript, oldest turn first.
    pub fn history(&self) -> &[Turn] {
        &self.transcript
    }

    /// Returns the number of turns in the conversation.
    pub fn message_count(&self) -> usize {
        self.transcript.len()
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The backend answering this session.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            backend: self.backend.describe(),
            message_count: self.message_count(),
            seed_count: self.seed.len(),
            total_requests: self.request_count,
            failed_requests: self.failure_count,
            total_prompt_tokens: u64::from(self.usage_totals.prompt_token_count),
            total_reply_tokens: u64::from(self.usage_totals.candidates_token_count),
            last_turn_usage: self.last_turn_usage,
        }
    }

    fn request(&self, user_text: &str) -> GenerateRequest {
        GenerateRequest {
            system_instruction: self.config.system_instruction.clone(),
            history: self.transcript.clone(),
            new_message: user_text.to_string(),
            sampling: self.config.generation_config(),
        }
    }

    fn commit_reply(&mut self, user: Turn, reply: Reply) -> Turn {
        if let Some(usage) = reply.usage {
            self.usage_totals = self.usage_totals + usage;
        }
        self.last_turn_usage = reply.usage;
        let turn = Turn::model(reply.text).stamped();
        self.transcript.push(user);
        self.transcript.push(turn.clone());
        turn
    }

    fn commit_failure(&mut self, user: Turn, err: Error) -> Error {
        SESSION_SUBMIT_ERRORS.click();
        if err.is_content_blocked() {
            SESSION_BLOCKED.click();
        }
        self.failure_count = self.failure_count.saturating_add(1);
        self.transcript.push(user);
        err
    }
}

async fn wait_for(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}

fn cancelled(renderer: &mut dyn Renderer) -> Error {
    SESSION_CANCELLED.click();
    renderer.print_interrupted();
    Error::abort("reply interrupted")
}

////////////////////////////////////////////// Shared //////////////////////////////////////////////

/// A session shared between tasks.
///
/// Every operation takes the session lock for its whole duration, so a
/// `reset` issued while a `submit` is in flight runs after the submit
/// finishes or is dropped.
pub struct SharedSession<B: ModelBackend> {
    inner: Arc<Mutex<ChatSession<B>>>,
}

impl<B: ModelBackend> SharedSession<B> {
    /// Share `session`.
    pub fn new(session: ChatSession<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// See [`ChatSession::submit`].
    pub async fn submit(&self, user_text: &str) -> Result<Turn> {
        self.inner.lock().await.submit(user_text).await
    }

    /// See [`ChatSession::reset`].
    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }

    /// A copy of the transcript.
    pub async fn history(&self) -> Vec<Turn> {
        self.inner.lock().await.history().to_vec()
    }

    /// Exclusive access for anything else.
    pub async fn lock(&self) -> MutexGuard<'_, ChatSession<B>> {
        self.inner.lock().await
    }
}

impl<B: ModelBackend> Clone for SharedSession<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
