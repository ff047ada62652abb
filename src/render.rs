//! Output rendering for conversations.
//!
//! This module provides the renderer trait the session reports to and a
//! plain-text terminal implementation.

use std::io::{self, Stdout, Write};

use crate::{Role, Turn};

/// ANSI escape code for dim text (used for the placeholder).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for role labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the user label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the assistant label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Return to column zero and erase the line.
const ANSI_CLEAR_LINE: &str = "\r\x1b[2K";

/// Text shown while waiting for the first fragment of a reply.
pub const PLACEHOLDER: &str = "Thinking...";

/// Trait for rendering a conversation.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Collecting output for another UI
pub trait Renderer: Send {
    /// Render a complete stored turn, e.g. when replaying history.
    fn print_turn(&mut self, turn: &Turn);

    /// Called when a reply has been requested and nothing has arrived yet.
    fn start_response(&mut self) {}

    /// Print a piece of reply text.
    ///
    /// This is called incrementally as the reply is revealed.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a reply is complete, or abandoned after an error.
    fn finish_response(&mut self);

    /// Called when the reply is interrupted by the user.
    fn print_interrupted(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    placeholder_shown: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            placeholder_shown: false,
        }
    }

    /// Flushes stdout to ensure immediate display of revealed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn label(&self, role: Role) -> String {
        let name = role.display_name();
        if self.use_color {
            let color = match role {
                Role::User => ANSI_CYAN,
                Role::Model => ANSI_GREEN,
            };
            format!("{ANSI_BOLD}{color}{name}:{ANSI_RESET}")
        } else {
            format!("{name}:")
        }
    }

    fn clear_placeholder(&mut self) {
        if self.placeholder_shown {
            if self.use_color {
                print!("{ANSI_CLEAR_LINE}");
            } else {
                println!();
            }
            self.placeholder_shown = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_turn(&mut self, turn: &Turn) {
        self.clear_placeholder();
        println!("{}", self.label(turn.role()));
        println!("{}\n", turn.text());
        self.flush();
    }

    fn start_response(&mut self) {
        println!("{}", self.label(Role::Model));
        if self.use_color {
            print!("{ANSI_DIM}{PLACEHOLDER}{ANSI_RESET}");
        } else {
            print!("{PLACEHOLDER}");
        }
        self.placeholder_shown = true;
        self.flush();
    }

    fn print_text(&mut self, text: &str) {
        self.clear_placeholder();
        print!("{text}");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.clear_placeholder();
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error:{ANSI_RESET} {error}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.clear_placeholder();
        println!("{info}");
    }

    fn finish_response(&mut self) {
        self.clear_placeholder();
        println!("\n");
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.clear_placeholder();
        println!("\n[interrupted]");
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.label(Role::Model), "assistant:");
        assert_eq!(renderer.label(Role::User), "user:");
    }

    #[test]
    fn colored_label_wraps_name() {
        let renderer = PlainTextRenderer::with_color(true);
        let label = renderer.label(Role::User);
        assert!(label.contains("user:"));
        assert!(label.starts_with(ANSI_BOLD));
        assert!(label.ends_with(ANSI_RESET));
    }
}
