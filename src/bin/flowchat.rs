//! Interactive chat about industrial workflows.
//!
//! This binary provides a REPL for conversing with a Gemini model about a
//! workflow JSON file: analyzing it, asking for modifications, or generating
//! new workflows.
//!
//! # Usage
//!
//! ```bash
//! # Start from the greeting with default settings
//! flowchat
//!
//! # Embed a workflow in the system instruction
//! flowchat --workflow plant.json
//!
//! # Send the workflow as the first message instead
//! flowchat --workflow plant.json --workflow-first-turn
//!
//! # Try the interface without an API key
//! flowchat --offline --no-reveal
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Clear the chat window
//! - `/history` - Replay the conversation
//! - `/workflow <file>` - Load and analyze a workflow
//! - `/modify <instruction>` - Modify the loaded workflow
//! - `/save <file>` - Write the loaded workflow to a file
//! - `/stats` - Show session statistics
//! - `/config` - Show the session configuration
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use flowchat::chat::{
    ChatArgs, ChatCommand, ChatSession, PlainTextRenderer, Renderer, help_text, parse_command,
};
use flowchat::{
    ClientLogger, Error, GenerateContentRequest, GenerateContentResponse, Model, ModelBackend,
    Reveal, Role, ScriptedBackend, WorkflowDocument, WorkflowPlacement,
};

/// Writes API traffic to stderr, one JSON document per line.
struct StderrLogger;

impl StderrLogger {
    fn line(label: &str, value: &impl serde::Serialize) -> String {
        match serde_json::to_string(value) {
            Ok(json) => format!("[{label}] {json}"),
            Err(err) => format!("[{label}] <unserializable: {err}>"),
        }
    }

    fn emit(label: &str, value: &impl serde::Serialize) {
        eprintln!("{}", Self::line(label, value));
    }
}

impl ClientLogger for StderrLogger {
    fn log_request(&self, model: &Model, request: &GenerateContentRequest) {
        Self::emit(&format!("request {model}"), request);
    }

    fn log_response(&self, response: &GenerateContentResponse) {
        Self::emit("response", response);
    }

    fn log_stream_event(&self, event: &GenerateContentResponse) {
        Self::emit("event", event);
    }

    fn log_error(&self, error: &Error) {
        eprintln!("[error] {error}");
    }
}

/// Main entry point for the flowchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("flowchat [OPTIONS]");
    let config = args.session_config()?;
    let workflow = args.workflow_document()?;
    let seed = args.seed();

    if args.offline {
        let session = ChatSession::start(ScriptedBackend::new(), config, seed)?;
        run(session, &args, workflow).await
    } else {
        let logger: Option<Arc<dyn ClientLogger>> = if args.trace {
            Some(Arc::new(StderrLogger))
        } else {
            None
        };
        let session = ChatSession::connect_with_logger(config, seed, logger)?;
        run(session, &args, workflow).await
    }
}

async fn run<B: ModelBackend>(
    mut session: ChatSession<B>,
    args: &ChatArgs,
    mut workflow: Option<WorkflowDocument>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut renderer = PlainTextRenderer::with_color(!args.no_color);
    let mut reveal = if args.no_reveal {
        Reveal::immediate()
    } else {
        Reveal::typing()
    };
    let mut rl = DefaultEditor::new()?;

    // Flag for interrupt handling during replies
    let interrupted = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("Workflow Analyzer (model: {})", session.backend().describe());
    println!("Type /help for commands, /quit to exit\n");
    print_history(&session, &mut renderer);

    if let Some(doc) = &workflow {
        match args.placement() {
            WorkflowPlacement::SystemInstruction => renderer.print_info(&format!(
                "Workflow {} embedded in the system instruction ({} bytes).\n",
                doc.name().unwrap_or("(unnamed)"),
                doc.len()
            )),
            WorkflowPlacement::FirstTurn => {
                renderer.print_info(&format!(
                    "Sending workflow {} ({} bytes) for analysis.\n",
                    doc.name().unwrap_or("(unnamed)"),
                    doc.len()
                ));
                if let Err(err) = session
                    .submit_streaming(
                        &doc.analysis_prompt(),
                        &mut renderer,
                        &mut reveal,
                        &interrupted,
                    )
                    .await
                {
                    report(&mut renderer, &err);
                }
            }
        }
    }

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.reset();
                            renderer.print_info("Chat cleared.\n");
                            print_history(&session, &mut renderer);
                        }
                        ChatCommand::History => {
                            print_history(&session, &mut renderer);
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Workflow(path) => {
                            let doc = match WorkflowDocument::from_path(path.as_str()) {
                                Ok(doc) => doc,
                                Err(err) => {
                                    renderer.print_error(&format!("Failed to load workflow: {err}"));
                                    continue;
                                }
                            };
                            let prompt = doc.analysis_prompt();
                            workflow = Some(doc);
                            if let Err(err) = session
                                .submit_streaming(&prompt, &mut renderer, &mut reveal, &interrupted)
                                .await
                            {
                                report(&mut renderer, &err);
                            }
                        }
                        ChatCommand::Modify(instruction) => {
                            let Some(doc) = &workflow else {
                                renderer.print_error("No workflow loaded; use /workflow <file>");
                                continue;
                            };
                            renderer.start_response();
                            let outcome = session.modify_workflow(doc, &instruction).await;
                            // A transport failure leaves the user turn last.
                            if let Some(reply) = session.history().last()
                                && reply.role() == Role::Model
                            {
                                renderer.print_text(reply.text());
                            }
                            renderer.finish_response();
                            match outcome {
                                Ok(modified) => {
                                    renderer.print_info(&format!(
                                        "Workflow updated ({} bytes). Use /save <file> to write it.",
                                        modified.len()
                                    ));
                                    workflow = Some(modified);
                                }
                                Err(err) => report(&mut renderer, &err),
                            }
                        }
                        ChatCommand::Save(path) => match &workflow {
                            Some(doc) => match doc.save(path.as_str()) {
                                Ok(()) => renderer.print_info(&format!("Workflow saved to {path}")),
                                Err(err) => renderer
                                    .print_error(&format!("Failed to save workflow: {err}")),
                            },
                            None => renderer.print_error("No workflow loaded; use /workflow <file>"),
                        },
                        ChatCommand::Stats => {
                            print_stats(&session);
                        }
                        ChatCommand::ShowConfig => {
                            print_config(&session, workflow.as_ref());
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the model
                if let Err(err) = session
                    .submit_streaming(line, &mut renderer, &mut reveal, &interrupted)
                    .await
                {
                    report(&mut renderer, &err);
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn print_history<B: ModelBackend>(session: &ChatSession<B>, renderer: &mut dyn Renderer) {
    for turn in session.history() {
        renderer.print_turn(turn);
    }
}

fn report(renderer: &mut dyn Renderer, err: &Error) {
    if err.is_abort() {
        // Already reported by the session.
        return;
    }
    if err.is_content_blocked() {
        renderer.print_error(&format!("{err}. Rephrase the message and try again."));
    } else if err.is_retryable() {
        renderer.print_error(&format!("{err}. Send the message again to retry."));
    } else {
        renderer.print_error(&err.to_string());
    }
}

fn print_stats<B: ModelBackend>(session: &ChatSession<B>) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Backend: {}", stats.backend);
    println!(
        "      Messages: {} ({} seed)",
        stats.message_count, stats.seed_count
    );
    println!(
        "      Requests: {} ({} failed)",
        stats.total_requests, stats.failed_requests
    );
    println!(
        "      Total tokens: {} prompt / {} reply",
        stats.total_prompt_tokens, stats.total_reply_tokens
    );
    if let Some(usage) = stats.last_turn_usage {
        println!(
            "      Last turn tokens: {} prompt / {} reply",
            usage.prompt_token_count, usage.candidates_token_count
        );
    }
}

fn print_config<B: ModelBackend>(session: &ChatSession<B>, workflow: Option<&WorkflowDocument>) {
    let config = session.config();
    println!("    Current Configuration:");
    println!("      Model: {}", config.model);
    println!("      Temperature: {:.2}", config.temperature);
    println!("      Top-p: {:.2}", config.top_p);
    println!("      Top-k: {}", config.top_k);
    println!("      Max output tokens: {}", config.max_output_tokens);
    println!("      Response MIME type: {}", config.response_mime_type);
    println!(
        "      System instruction: {} bytes",
        config.system_instruction.len()
    );
    match workflow {
        Some(doc) => println!(
            "      Workflow: {} ({} bytes)",
            doc.name().unwrap_or("(unnamed)"),
            doc.len()
        ),
        None => println!("      Workflow: (none)"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn logger_lines() {
        let response = GenerateContentResponse::default();
        assert_eq!(
            StderrLogger::line("response", &response),
            r#"[response] {"candidates":[]}"#
        );

        // JSON object keys must be strings.
        let unserializable = HashMap::from([(vec![1u8], 1u8)]);
        let line = StderrLogger::line("event", &unserializable);
        assert!(line.starts_with("[event] <unserializable: "), "{line}");
    }
}
