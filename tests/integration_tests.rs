//! Live tests against the Gemini API.
//! These tests require GEMINI_API_KEY or GOOGLE_API_KEY in the environment to run.

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use flowchat::chat::{ChatSession, SessionConfig, default_seed};
    use flowchat::client::API_KEY_ENV_VARS;
    use flowchat::{PlainTextRenderer, Reveal, Role, WorkflowDocument, WorkflowPlacement};

    fn has_key() -> bool {
        API_KEY_ENV_VARS
            .iter()
            .any(|var| std::env::var(var).is_ok_and(|key| !key.trim().is_empty()))
    }

    #[tokio::test]
    async fn test_simple_submit() {
        if !has_key() {
            eprintln!("Skipping test: no Gemini API key set");
            return;
        }

        let config = SessionConfig::new().with_max_output_tokens(32);
        let mut session =
            ChatSession::connect(config, default_seed()).expect("Failed to create session");

        let turn = session.submit("Say 'test passed'").await;
        assert!(turn.is_ok(), "Request should succeed with valid API key");
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[3].role(), Role::Model);
    }

    #[tokio::test]
    async fn test_streaming_submit() {
        if !has_key() {
            eprintln!("Skipping test: no Gemini API key set");
            return;
        }

        let config = SessionConfig::new().with_max_output_tokens(32);
        let mut session =
            ChatSession::connect(config, default_seed()).expect("Failed to create session");
        let mut renderer = PlainTextRenderer::with_color(false);
        let interrupted = AtomicBool::new(false);

        let turn = session
            .submit_streaming(
                "Count to 3",
                &mut renderer,
                &mut Reveal::immediate(),
                &interrupted,
            )
            .await;
        assert!(turn.is_ok(), "Stream request should succeed");
    }

    #[tokio::test]
    async fn test_workflow_first_turn() {
        if !has_key() {
            eprintln!("Skipping test: no Gemini API key set");
            return;
        }

        let doc = WorkflowDocument::from_json_str(
            r#"{"steps": [{"id": "mix", "outputs": ["dough"]}, {"id": "bake", "inputs": ["dough"]}]}"#,
        )
        .expect("valid workflow");
        let config = SessionConfig::new().with_max_output_tokens(256);
        let mut session =
            ChatSession::connect(config, default_seed()).expect("Failed to create session");

        let analysis = session
            .load_workflow(&doc, WorkflowPlacement::FirstTurn)
            .await
            .expect("analysis should succeed");
        assert!(analysis.is_some());
    }
}
