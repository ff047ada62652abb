//! Chat with a hosted Gemini model about industrial workflow definitions.
//!
//! The heart of the crate is [`chat::ChatSession`], which owns an ordered
//! transcript of [`Turn`]s and forwards each new message, with the whole
//! history and a system instruction, to a [`ModelBackend`].  Replies can be
//! taken whole or streamed through a [`Reveal`] onto a [`Renderer`].

// Public modules
pub mod accumulating_stream;
pub mod backend;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod render;
pub mod reveal;
pub mod sse;
pub mod turn;
pub mod types;
pub mod utils;
pub mod workflow;

mod observability;

// Re-exports
pub use accumulating_stream::AccumulatingStream;
pub use backend::{
    FragmentStream, GeminiBackend, GenerateRequest, ModelBackend, Reply, ReplyChunk,
    ScriptedBackend, ScriptedReply,
};
pub use client::Gemini;
pub use client_logger::ClientLogger;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use reveal::{GroupSizer, RandomGroupSizer, Reveal, RevealGroup};
pub use turn::{Role, Turn};
pub use types::*;
pub use workflow::{WorkflowDocument, WorkflowPlacement};
