use serde::{Deserialize, Serialize};

use crate::types::{Content, FinishReason, PromptFeedback, SafetyRating, UsageMetadata};

/// One generated response option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content; absent when the candidate was filtered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Why generation stopped; absent on intermediate stream chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Index of the candidate in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    /// Ratings for the candidate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
}

/// Response of `generateContent`, and of each `streamGenerateContent` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate responses.
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// Feedback about the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,

    /// Token accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    /// Model version that produced the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, or the empty string.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(Content::text)
            .unwrap_or_default()
    }

    /// Finish reason of the first candidate.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason)
    }

    /// Describes why this response was withheld, if it was.
    ///
    /// A prompt-level block reason takes precedence over a candidate finish
    /// reason.
    pub fn block_reason(&self) -> Option<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason)
        {
            return Some(reason.to_string());
        }
        self.finish_reason()
            .filter(FinishReason::is_blocked)
            .map(|reason| reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_response() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Step 1: "}, {"text": "mix"}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16},
            "modelVersion": "gemini-1.5-flash-002"
        }))
        .unwrap();

        assert_eq!(response.text(), "Step 1: mix");
        assert_eq!(response.finish_reason(), Some(FinishReason::Stop));
        assert!(response.block_reason().is_none());
        assert_eq!(response.usage_metadata.unwrap().total_token_count, 16);
    }

    #[test]
    fn prompt_blocked_response() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}
        }))
        .unwrap();

        assert_eq!(response.text(), "");
        assert_eq!(response.block_reason().as_deref(), Some("PROHIBITED_CONTENT"));
    }

    #[test]
    fn candidate_blocked_response() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY", "index": 0}]
        }))
        .unwrap();

        assert_eq!(response.block_reason().as_deref(), Some("SAFETY"));
    }
}
