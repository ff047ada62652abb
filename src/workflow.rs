//! Workflow documents.
//!
//! A workflow is a JSON description of an industrial process.  This crate
//! never interprets its structure: a document is checked once for being JSON
//! and then carried verbatim so the model sees exactly what the user loaded.

use std::fmt;

use serde_json::Value;
use utf8path::Path;

use crate::error::{Error, Result};

/// Where a workflow document is placed in the conversation.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum WorkflowPlacement {
    /// Appended to the system instruction; the model sees it on every request.
    #[default]
    SystemInstruction,
    /// Sent as the first user message of the conversation.
    FirstTurn,
}

/// An uploaded workflow, validated as JSON but otherwise opaque.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkflowDocument {
    name: Option<String>,
    text: String,
}

impl WorkflowDocument {
    /// Accept `text` if it parses as JSON.
    pub fn from_json_str(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        serde_json::from_str::<Value>(&text).map_err(|err| {
            Error::serialization("workflow is not valid JSON", Some(Box::new(err)))
        })?;
        Ok(Self { name: None, text })
    }

    /// Read and validate a workflow file.
    pub fn from_path<'a>(path: impl Into<Path<'a>>) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(path.as_str())
            .map_err(|err| Error::io(format!("failed to read {}", path.as_str()), err))?;
        let mut this = Self::from_json_str(text)?;
        this.name = std::path::Path::new(path.as_str())
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        Ok(this)
    }

    /// Build a document from a model reply that should contain JSON.
    ///
    /// The JSON may be bare, wrapped in a fenced code block, or embedded in
    /// prose.  A fenced block that does not parse (a `text` block, say) does
    /// not hide JSON elsewhere in the reply; the longest `{...}` or `[...]`
    /// span that parses is used instead.
    pub fn from_reply(reply: &str) -> Result<Self> {
        if let Some(block) = fenced_block(reply)
            && serde_json::from_str::<Value>(block).is_ok()
        {
            return Ok(Self {
                name: None,
                text: block.to_string(),
            });
        }
        match embedded_json(reply) {
            Some(span) => Ok(Self {
                name: None,
                text: span.to_string(),
            }),
            None if reply.contains(['{', '[']) => Err(Error::malformed_reply(
                "reply JSON does not parse",
                None,
            )),
            None => Err(Error::malformed_reply("reply contains no JSON", None)),
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The display name, usually the file name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The document exactly as loaded.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the document in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// True when the document is empty.  Never true for a loaded document.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Write the document to `path`.
    pub fn save<'a>(&self, path: impl Into<Path<'a>>) -> Result<()> {
        let path = path.into();
        std::fs::write(path.as_str(), &self.text)
            .map_err(|err| Error::io(format!("failed to write {}", path.as_str()), err))
    }

    /// The system instruction with this document appended.
    pub fn embed_in(&self, instruction: &str) -> String {
        let mut out = String::with_capacity(instruction.len() + self.text.len() + 32);
        out.push_str(instruction.trim_end());
        out.push_str("\n\nWorkflow JSON:\n");
        out.push_str(&self.text);
        out
    }

    /// A first message asking the model to analyze this document.
    pub fn analysis_prompt(&self) -> String {
        format!(
            "Here is the JSON file describing my workflow{}. Summarize its steps and how they connect.\n\n{}",
            self.label(),
            self.text
        )
    }

    /// A message asking the model to rewrite this document.
    pub fn modification_prompt(&self, instruction: &str) -> String {
        format!(
            "Modify the following workflow{} according to this instruction: {}\n\
             Reply with the complete modified workflow as JSON in a single ```json code block.\n\n{}",
            self.label(),
            instruction.trim(),
            self.text
        )
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!(" ({name})"),
            None => String::new(),
        }
    }
}

impl fmt::Debug for WorkflowDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDocument")
            .field("name", &self.name)
            .field("len", &self.text.len())
            .finish()
    }
}

/// Contents of the first fenced code block, preferring one tagged `json`.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```json").map(|idx| idx + "```json".len());
    let start = start.or_else(|| text.find("```").map(|idx| idx + 3))?;
    let body = &text[start..];
    // Skip an info string such as `JSON` on the opening fence line.
    let body = match body.find('\n') {
        Some(newline) if !body[..newline].trim_start().starts_with(['{', '[']) => {
            &body[newline + 1..]
        }
        _ => body,
    };
    let end = body.find("```")?;
    let block = body[..end].trim();
    if block.is_empty() { None } else { Some(block) }
}

/// The longest object or array in `text` that parses on its own.
fn embedded_json(text: &str) -> Option<&str> {
    let mut best: Option<&str> = None;
    let mut skip_to = 0;
    for (idx, ch) in text.char_indices() {
        if idx < skip_to || !matches!(ch, '{' | '[') {
            continue;
        }
        let mut values = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(_)) = values.next() {
            let end = idx + values.byte_offset();
            let span = &text[idx..end];
            if best.is_none_or(|best| span.len() > best.len()) {
                best = Some(span);
            }
            skip_to = end;
        }
    }
    best
}
