use serde::{Deserialize, Serialize};

/// Author of a piece of content in the Gemini wire format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    /// Content written by the user.
    User,

    /// Content produced by the model.
    Model,
}

/// A single part of a content entry.
///
/// Only text parts are produced by this crate; other part kinds returned by
/// the API deserialize with `text` set to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// The text of this part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Multi-part content attributed to a role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// The producer of the content; omitted for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ContentRole>,

    /// Ordered parts making up the content.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Create content with a single text part.
    pub fn new_with_text(role: Option<ContentRole>, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    /// Create user content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new_with_text(Some(ContentRole::User), text)
    }

    /// Create model content.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new_with_text(Some(ContentRole::Model), text)
    }

    /// Create role-less content, as used for system instructions.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new_with_text(None, text)
    }

    /// Concatenate the text of every part.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}
