//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, the per-session
//! configuration with its defaults, and the canned greeting that seeds a
//! fresh conversation.

use std::fmt;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};
use utf8path::Path;

use crate::error::{Error, Result};
use crate::types::{GenerationConfig, Model};
use crate::{Turn, WorkflowDocument, WorkflowPlacement};

/// Instruction framing every conversation about workflows.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an assistant for industrial workflow processing. You will be given a JSON file representing a detailed configuration of a workflow system. The system is composed of steps that interact with other steps through defined inputs, outputs, and conditions. Your job is to analyze such workflows based on user prompts and provide specific information and visualization, modify workflows according to user instructions and/or generate new workflows following the structure presented in the JSON file. ";

/// The user half of the greeting seed.
pub const SEED_USER_TEXT: &str = "hello";

/// The model half of the greeting seed.
pub const SEED_MODEL_TEXT: &str = "Hello! \u{1F44B}  I'm ready to help you with your industrial workflow processing. Please provide me with the JSON file representing your workflow configuration and let me know how you want me to help you analyze, modify, or generate workflows. \n\nFor example, you can ask me:\n\n* \"Analyze the workflow and tell me which steps are involved in the process of 'product quality inspection'?\" \n* \"Modify the workflow to add a new step after 'packaging' called 'shipping' that takes the output from 'packaging' and sends it to the 'logistics' system.\"\n* \"Generate a new workflow for 'order fulfillment' that includes steps like 'order reception', 'inventory check', 'picking', 'packing', and 'shipping'.\"\n\nI'm excited to work with you on optimizing your industrial workflows! \n";

const DEFAULT_TEMPERATURE: f32 = 1.0;
const DEFAULT_TOP_P: f32 = 0.95;
const DEFAULT_TOP_K: u32 = 40;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;
const DEFAULT_RESPONSE_MIME_TYPE: &str = "text/plain";

/// The canned two-turn greeting a new conversation starts from.
pub fn default_seed() -> Vec<Turn> {
    vec![Turn::user(SEED_USER_TEXT), Turn::model(SEED_MODEL_TEXT)]
}

/// Command-line arguments for the flowchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gemini-1.5-flash)", "MODEL")]
    pub model: Option<String>,

    /// System instruction replacing the workflow-assistant default.
    #[arrrg(optional, "System instruction for the conversation", "TEXT")]
    pub system: Option<String>,

    /// YAML file with session settings.
    #[arrrg(optional, "YAML file with session settings", "PATH")]
    pub config: Option<String>,

    /// Workflow JSON loaded before the first prompt.
    #[arrrg(optional, "Workflow JSON to load at startup", "PATH")]
    pub workflow: Option<String>,

    /// Send the workflow as the first message instead of embedding it.
    #[arrrg(flag, "Send the workflow as the first message")]
    pub workflow_first_turn: bool,

    /// Maximum output tokens per reply.
    #[arrrg(optional, "Max output tokens per reply (default: 8192)", "TOKENS")]
    pub max_output_tokens: Option<u32>,

    /// Start without the greeting seed.
    #[arrrg(flag, "Start without the greeting seed")]
    pub no_seed: bool,

    /// Print replies as they arrive, without the typing effect.
    #[arrrg(flag, "Disable the typing effect")]
    pub no_reveal: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Answer from a local scripted backend instead of the API.
    #[arrrg(flag, "Use an offline scripted backend")]
    pub offline: bool,

    /// Log API requests and responses to stderr.
    #[arrrg(flag, "Log API traffic to stderr")]
    pub trace: bool,
}

impl ChatArgs {
    /// Resolve the session configuration: YAML file first, then flags.
    ///
    /// A workflow given with `--workflow` is embedded in the system
    /// instruction unless `--workflow-first-turn` is set.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_yaml_file(path.as_str())?,
            None => SessionConfig::default(),
        };
        if let Some(model) = &self.model {
            config = config.with_model(Model::from(model.as_str()));
        }
        if let Some(system) = &self.system {
            config = config.with_system_instruction(system.clone());
        }
        if let Some(max_output_tokens) = self.max_output_tokens {
            config = config.with_max_output_tokens(max_output_tokens);
        }
        if let Some(document) = self.workflow_document()?
            && self.placement() == WorkflowPlacement::SystemInstruction
        {
            config = config.with_workflow(&document);
        }
        config.validate()?;
        Ok(config)
    }

    /// The startup workflow, if one was named.
    pub fn workflow_document(&self) -> Result<Option<WorkflowDocument>> {
        self.workflow
            .as_deref()
            .map(|path| WorkflowDocument::from_path(path))
            .transpose()
    }

    /// Where the startup workflow goes.
    pub fn placement(&self) -> WorkflowPlacement {
        if self.workflow_first_turn {
            WorkflowPlacement::FirstTurn
        } else {
            WorkflowPlacement::SystemInstruction
        }
    }

    /// The turns a new session starts from.
    pub fn seed(&self) -> Vec<Turn> {
        if self.no_seed { Vec::new() } else { default_seed() }
    }
}

/// Configuration for a chat session.
///
/// Fixed for the lifetime of a session.  Deserializes from YAML with every
/// field optional; absent fields take the defaults.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The model that answers.
    pub model: Model,

    /// Instruction framing the whole conversation.
    pub system_instruction: String,

    /// Sampling temperature, `0.0..=2.0`.
    pub temperature: f32,

    /// Nucleus sampling mass, `0.0..=1.0`.
    pub top_p: f32,

    /// Top-k sampling limit, at least 1.
    pub top_k: u32,

    /// Upper bound on tokens per reply, at least 1.
    pub max_output_tokens: u32,

    /// MIME type requested for replies.
    pub response_mime_type: String,

    /// API key; falls back to the environment when absent.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Project billed for requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Override for the API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl SessionConfig {
    /// Creates a new SessionConfig with default values.
    ///
    /// Defaults:
    /// - Model: gemini-1.5-flash
    /// - Temperature 1.0, top-p 0.95, top-k 40
    /// - Max output tokens: 8192
    /// - Response MIME type: text/plain
    /// - System instruction: the workflow-assistant instruction
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            response_mime_type: DEFAULT_RESPONSE_MIME_TYPE.to_string(),
            api_key: None,
            project: None,
            base_url: None,
        }
    }

    /// Load settings from a YAML file.
    pub fn from_yaml_file<'a>(path: impl Into<Path<'a>>) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(path.as_str())
            .map_err(|err| Error::io(format!("failed to read {}", path.as_str()), err))?;
        Self::from_yaml_str(&text)
    }

    /// Parse settings from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|err| Error::configuration(format!("invalid config file: {err}"), None))
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<Model>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Appends a workflow document to the system instruction.
    pub fn with_workflow(mut self, document: &WorkflowDocument) -> Self {
        self.system_instruction = document.embed_in(&self.system_instruction);
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the top-p value.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets the top-k value.
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the maximum output tokens per reply.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the billed project.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the API endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Check every field, naming the first offending one.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_blank() {
            return Err(Error::configuration(
                "model name must not be empty",
                Some("model".to_string()),
            ));
        }
        if !(self.temperature.is_finite() && (0.0..=2.0).contains(&self.temperature)) {
            return Err(Error::configuration(
                format!("temperature {} is outside 0.0..=2.0", self.temperature),
                Some("temperature".to_string()),
            ));
        }
        if !(self.top_p.is_finite() && (0.0..=1.0).contains(&self.top_p)) {
            return Err(Error::configuration(
                format!("top_p {} is outside 0.0..=1.0", self.top_p),
                Some("top_p".to_string()),
            ));
        }
        if self.top_k == 0 {
            return Err(Error::configuration(
                "top_k must be at least 1",
                Some("top_k".to_string()),
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(Error::configuration(
                "max_output_tokens must be at least 1",
                Some("max_output_tokens".to_string()),
            ));
        }
        if self.response_mime_type.trim().is_empty() {
            return Err(Error::configuration(
                "response_mime_type must not be empty",
                Some("response_mime_type".to_string()),
            ));
        }
        Ok(())
    }

    /// Sampling parameters for the wire request.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::new()
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_top_k(self.top_k)
            .with_max_output_tokens(self.max_output_tokens)
            .with_response_mime_type(self.response_mime_type.clone())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("model", &self.model)
            .field("system_instruction_len", &self.system_instruction.len())
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("response_mime_type", &self.response_mime_type)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;

    #[test]
    fn default_config() {
        let config = SessionConfig::new();
        assert_eq!(config.model, Model::Known(KnownModel::Gemini15Flash));
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.top_p, 0.95);
        assert_eq!(config.top_k, 40);
        assert_eq!(config.max_output_tokens, 8192);
        assert_eq!(config.response_mime_type, "text/plain");
        assert_eq!(config.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
        assert!(config.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn generation_config_carries_sampling() {
        let wire = SessionConfig::new().with_top_k(12).generation_config();
        assert_eq!(wire.temperature, Some(1.0));
        assert_eq!(wire.top_k, Some(12));
        assert_eq!(wire.max_output_tokens, Some(8192));
        assert_eq!(wire.response_mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn validate_names_offending_field() {
        let cases = [
            (SessionConfig::new().with_model(""), "model"),
            (SessionConfig::new().with_temperature(2.5), "temperature"),
            (SessionConfig::new().with_temperature(f32::NAN), "temperature"),
            (SessionConfig::new().with_top_p(1.5), "top_p"),
            (SessionConfig::new().with_top_k(0), "top_k"),
            (SessionConfig::new().with_max_output_tokens(0), "max_output_tokens"),
        ];
        for (config, field) in cases {
            match config.validate() {
                Err(Error::Configuration { param, .. }) => {
                    assert_eq!(param.as_deref(), Some(field))
                }
                other => panic!("expected configuration error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let config = SessionConfig::from_yaml_str(
            "model: gemini-2.0-flash\ntemperature: 0.5\napi_key: secret\n",
        )
        .unwrap();
        assert_eq!(config.model, Model::Known(KnownModel::Gemini20Flash));
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.top_k, 40);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn yaml_errors_are_configuration() {
        let err = SessionConfig::from_yaml_str("top_k: many").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn api_key_is_neither_serialized_nor_printed() {
        let config = SessionConfig::new().with_api_key("secret");
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret"));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn seed_is_greeting() {
        let seed = default_seed();
        assert_eq!(seed.len(), 2);
        assert_eq!(seed[0].text(), "hello");
        assert!(seed[1].text().starts_with("Hello! \u{1F44B}"));
        assert!(seed[1].text().ends_with("industrial workflows! \n"));
    }

    #[test]
    fn config_from_args_defaults() {
        let args = ChatArgs::default();
        let config = args.session_config().unwrap();
        assert_eq!(config, SessionConfig::new());
        assert_eq!(args.seed().len(), 2);
        assert_eq!(args.placement(), WorkflowPlacement::SystemInstruction);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            model: Some("gemini-2.5-pro".to_string()),
            system: Some("You review workflows.".to_string()),
            max_output_tokens: Some(1024),
            no_seed: true,
            workflow_first_turn: true,
            ..ChatArgs::default()
        };
        let config = args.session_config().unwrap();
        assert_eq!(config.model, Model::Known(KnownModel::Gemini25Pro));
        assert_eq!(config.system_instruction, "You review workflows.");
        assert_eq!(config.max_output_tokens, 1024);
        assert!(args.seed().is_empty());
        assert_eq!(args.placement(), WorkflowPlacement::FirstTurn);
    }

    #[test]
    fn config_from_args_rejects_zero_tokens() {
        let args = ChatArgs {
            max_output_tokens: Some(0),
            ..ChatArgs::default()
        };
        assert!(args.session_config().unwrap_err().is_configuration());
    }

    #[test]
    fn with_workflow_embeds_document() {
        let doc = WorkflowDocument::from_json_str(r#"{"steps":[]}"#).unwrap();
        let config = SessionConfig::new().with_workflow(&doc);
        assert!(config.system_instruction.starts_with("You are an assistant"));
        assert!(config.system_instruction.ends_with(r#"{"steps":[]}"#));
    }
}
