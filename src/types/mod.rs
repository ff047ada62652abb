// Public modules
pub mod content;
pub mod generate_content_request;
pub mod generate_content_response;
pub mod generation_config;
pub mod model;
pub mod safety;
pub mod usage_metadata;

// Re-exports
pub use content::{Content, ContentRole, Part};
pub use generate_content_request::GenerateContentRequest;
pub use generate_content_response::{Candidate, GenerateContentResponse};
pub use generation_config::GenerationConfig;
pub use model::{KnownModel, Model, ModelParseError};
pub use safety::{BlockReason, FinishReason, PromptFeedback, SafetyRating};
pub use usage_metadata::UsageMetadata;
