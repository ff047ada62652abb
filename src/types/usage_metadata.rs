use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Token accounting for a generation request.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt, including history and system instruction.
    #[serde(default)]
    pub prompt_token_count: u32,

    /// Tokens across all generated candidates.
    #[serde(default)]
    pub candidates_token_count: u32,

    /// Total tokens billed for the request.
    #[serde(default)]
    pub total_token_count: u32,
}

impl UsageMetadata {
    /// Create usage from prompt and candidate counts.
    pub fn new(prompt_token_count: u32, candidates_token_count: u32) -> Self {
        Self {
            prompt_token_count,
            candidates_token_count,
            total_token_count: prompt_token_count.saturating_add(candidates_token_count),
        }
    }
}

impl Add for UsageMetadata {
    type Output = UsageMetadata;

    fn add(self, rhs: UsageMetadata) -> UsageMetadata {
        UsageMetadata {
            prompt_token_count: self.prompt_token_count.saturating_add(rhs.prompt_token_count),
            candidates_token_count: self
                .candidates_token_count
                .saturating_add(rhs.candidates_token_count),
            total_token_count: self.total_token_count.saturating_add(rhs.total_token_count),
        }
    }
}
