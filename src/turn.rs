//! Conversation turns.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{Content, ContentRole};

/// Who authored a turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard.
    User,

    /// The remote model.
    Model,
}

impl Role {
    /// Label shown next to a turn when rendering.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

impl From<Role> for ContentRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ContentRole::User,
            Role::Model => ContentRole::Model,
        }
    }
}

/// One message of a conversation.
///
/// Turns are immutable: once built, neither the role nor the text changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::utils::time"
    )]
    timestamp: Option<OffsetDateTime>,
}

impl Turn {
    /// Create a turn without a timestamp.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: None,
        }
    }

    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    /// Attach a timestamp.
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach the current UTC time.
    pub fn stamped(self) -> Self {
        self.with_timestamp(OffsetDateTime::now_utc())
    }

    /// The author of the turn.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The text of the turn.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the turn was recorded, if known.
    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        self.timestamp
    }

    /// Convert to the wire representation.
    pub fn to_content(&self) -> Content {
        Content::new_with_text(Some(self.role.into()), self.text.clone())
    }
}
