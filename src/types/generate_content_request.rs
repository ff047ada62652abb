use serde::{Deserialize, Serialize};

use crate::types::{Content, GenerationConfig};

/// Body of a `generateContent` or `streamGenerateContent` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// The conversation so far, oldest first, ending with the new user message.
    pub contents: Vec<Content>,

    /// Instruction that frames every turn of the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    /// Sampling parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Create a request from the given contents.
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            system_instruction: None,
            generation_config: None,
        }
    }

    /// Set the system instruction; blank instructions are omitted.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        self.system_instruction = if instruction.trim().is_empty() {
            None
        } else {
            Some(Content::system(instruction))
        };
        self
    }

    /// Set the generation config.
    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn request_serialization() {
        let request = GenerateContentRequest::new(vec![
            Content::user("hello"),
            Content::model("Hello!"),
            Content::user("list the steps"),
        ])
        .with_system_instruction("You analyze workflows.")
        .with_generation_config(GenerationConfig::new().with_top_k(40));

        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hello"}]},
                    {"role": "model", "parts": [{"text": "Hello!"}]},
                    {"role": "user", "parts": [{"text": "list the steps"}]}
                ],
                "systemInstruction": {"parts": [{"text": "You analyze workflows."}]},
                "generationConfig": {"topK": 40}
            })
        );
    }

    #[test]
    fn blank_system_instruction_is_omitted() {
        let request =
            GenerateContentRequest::new(vec![Content::user("hi")]).with_system_instruction("  ");
        assert!(request.system_instruction.is_none());
    }
}
