//! Chat application module for conversations about industrial workflows.
//!
//! This module provides the conversation session and a REPL-oriented layer on
//! top of it:
//!
//! - A session that owns the transcript and talks to the model backend
//! - Streaming replies revealed with a typing effect
//! - Slash commands for session control
//! - Configuration from flags, YAML, and the environment
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing, session configuration and the greeting seed
//! - [`session`]: Core chat session management and backend interaction
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{
    ChatArgs, DEFAULT_SYSTEM_INSTRUCTION, SEED_MODEL_TEXT, SEED_USER_TEXT, SessionConfig,
    default_seed,
};
pub use session::{ChatSession, SessionStats, SharedSession};
