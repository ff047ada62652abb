use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a candidate stopped generating.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// Unspecified by the server.
    FinishReasonUnspecified,

    /// Natural stop point or a provided stop sequence.
    Stop,

    /// The maximum number of output tokens was reached.
    MaxTokens,

    /// Flagged for safety reasons.
    Safety,

    /// Flagged for recitation of training data.
    Recitation,

    /// Unsupported language.
    Language,

    /// Unknown reason.
    Other,

    /// Contains forbidden terms.
    Blocklist,

    /// Contains prohibited content.
    ProhibitedContent,

    /// Contains sensitive personally identifiable information.
    Spii,

    /// The model produced an invalid function call.
    MalformedFunctionCall,

    /// A reason this crate does not know about yet.
    #[serde(other)]
    Unknown,
}

impl FinishReason {
    /// Returns true when the candidate was withheld by content filtering.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            FinishReason::Safety
                | FinishReason::Recitation
                | FinishReason::Blocklist
                | FinishReason::ProhibitedContent
                | FinishReason::Spii
        )
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinishReason::FinishReasonUnspecified => "FINISH_REASON_UNSPECIFIED",
            FinishReason::Stop => "STOP",
            FinishReason::MaxTokens => "MAX_TOKENS",
            FinishReason::Safety => "SAFETY",
            FinishReason::Recitation => "RECITATION",
            FinishReason::Language => "LANGUAGE",
            FinishReason::Other => "OTHER",
            FinishReason::Blocklist => "BLOCKLIST",
            FinishReason::ProhibitedContent => "PROHIBITED_CONTENT",
            FinishReason::Spii => "SPII",
            FinishReason::MalformedFunctionCall => "MALFORMED_FUNCTION_CALL",
            FinishReason::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Why a prompt was refused before any candidate was generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    /// Unspecified by the server.
    BlockReasonUnspecified,

    /// Blocked for safety reasons.
    Safety,

    /// Blocked for an unknown reason.
    Other,

    /// Contains forbidden terms.
    Blocklist,

    /// Contains prohibited content.
    ProhibitedContent,

    /// A reason this crate does not know about yet.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockReason::BlockReasonUnspecified => "BLOCK_REASON_UNSPECIFIED",
            BlockReason::Safety => "SAFETY",
            BlockReason::Other => "OTHER",
            BlockReason::Blocklist => "BLOCKLIST",
            BlockReason::ProhibitedContent => "PROHIBITED_CONTENT",
            BlockReason::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Safety rating for a prompt or candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRating {
    /// Harm category, e.g. `HARM_CATEGORY_DANGEROUS_CONTENT`.
    pub category: String,

    /// Probability bucket, e.g. `NEGLIGIBLE`.
    pub probability: String,

    /// Whether this rating caused the block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
}

/// Feedback about the prompt itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Set when the prompt was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,

    /// Ratings for the prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_deserialization() {
        let reason: FinishReason = serde_json::from_str(r#""MAX_TOKENS""#).unwrap();
        assert_eq!(reason, FinishReason::MaxTokens);

        let reason: FinishReason = serde_json::from_str(r#""IMAGE_SAFETY""#).unwrap();
        assert_eq!(reason, FinishReason::Unknown);
    }

    #[test]
    fn blocked_finish_reasons() {
        assert!(FinishReason::Safety.is_blocked());
        assert!(FinishReason::Recitation.is_blocked());
        assert!(!FinishReason::Stop.is_blocked());
        assert!(!FinishReason::MaxTokens.is_blocked());
    }

    #[test]
    fn prompt_feedback_deserialization() {
        let feedback: PromptFeedback = serde_json::from_str(
            r#"{"blockReason":"SAFETY","safetyRatings":[{"category":"HARM_CATEGORY_HARASSMENT","probability":"HIGH","blocked":true}]}"#,
        )
        .unwrap();
        assert_eq!(feedback.block_reason, Some(BlockReason::Safety));
        assert_eq!(feedback.safety_ratings.len(), 1);
        assert_eq!(feedback.safety_ratings[0].blocked, Some(true));
    }

    #[test]
    fn display() {
        assert_eq!(FinishReason::ProhibitedContent.to_string(), "PROHIBITED_CONTENT");
        assert_eq!(BlockReason::Blocklist.to_string(), "BLOCKLIST");
    }
}
