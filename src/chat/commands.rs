//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the model.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Restore the conversation to its seed turns.
    Clear,

    /// Print the conversation so far.
    History,

    /// Load a workflow JSON file and ask for an analysis.
    Workflow(String),

    /// Ask the model to modify the loaded workflow.
    Modify(String),

    /// Write the loaded workflow to a file.
    Save(String),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics (message count, requests, tokens).
    Stats,

    /// Show the current configuration.
    ShowConfig,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use flowchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/workflow plant.json").is_some());
/// assert!(parse_command("Which steps inspect quality?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" | "reset" => ChatCommand::Clear,
        "history" => ChatCommand::History,
        "workflow" | "load" => match argument {
            Some(path) => ChatCommand::Workflow(path.to_string()),
            None => ChatCommand::Invalid("/workflow requires a file path".to_string()),
        },
        "modify" => match argument {
            Some(instruction) => ChatCommand::Modify(instruction.to_string()),
            None => ChatCommand::Invalid("/modify requires an instruction".to_string()),
        },
        "save" => match argument {
            Some(path) => ChatCommand::Save(path.to_string()),
            None => ChatCommand::Invalid("/save requires a file path".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        "config" => ChatCommand::ShowConfig,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Clear the chat window (back to the greeting)
  /history               Show the conversation so far
  /workflow <file>       Load a workflow JSON file and analyze it
  /modify <instruction>  Ask for a modified version of the loaded workflow
  /save <file>           Write the loaded workflow to a file
  /stats                 Show session statistics
  /config                Show current configuration
  /help                  Show this help message
  /quit                  Exit the chat"#
}
