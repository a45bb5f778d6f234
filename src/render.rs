//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the session
//! logic never touches the terminal directly. The default implementation
//! uses ANSI escape codes for styling and OSC 52 for clipboard writes.

use std::io::{self, Stdout, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::stats::RequestStats;

/// ANSI escape code for dim text (used for the stats line).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for yellow text (used for notices).
const ANSI_YELLOW: &str = "\x1b[33m";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Test doubles that capture output for assertions
pub trait Renderer: Send {
    /// Print a fragment of response text.
    ///
    /// This is called incrementally as tokens are streamed from the API.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a notice that the in-flight response was interrupted.
    fn print_interrupted(&mut self);

    /// Called when a response is complete.
    ///
    /// The stats line is printed only when `show_stats` is set.
    fn finish_response(&mut self, stats: &RequestStats, show_stats: bool);

    /// Copy `text` to the terminal clipboard.
    fn copy_to_clipboard(&mut self, text: &str);
}

/// Formats the compact one-line stats summary shown after a response.
pub fn compact_stats_line(stats: &RequestStats) -> String {
    let mut parts = vec![format!("{} tok", stats.output_tokens)];
    if let Some(ttft) = stats.time_to_first_token {
        parts.push(format!("TTFT: {:.2}s", ttft.as_secs_f64()));
    }
    if let Some(speed) = stats.post_first_token_tokens_per_sec {
        parts.push(format!("{speed:.1} tok/s"));
    }
    parts.push(format!("{:.2}s", stats.total_latency.as_secs_f64()));
    if let Some(cost) = stats.cost_estimate {
        parts.push(format!("${cost:.4}"));
    }
    format!("[{}]", parts.join(" | "))
}

/// Renders output as plain text to stdout.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            use_color: true,
        }
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        println!("{info}");
    }

    fn print_interrupted(&mut self) {
        if self.use_color {
            println!("\n{ANSI_YELLOW}[interrupted]{ANSI_RESET}");
        } else {
            println!("\n[interrupted]");
        }
    }

    fn finish_response(&mut self, stats: &RequestStats, show_stats: bool) {
        println!();
        if show_stats {
            let line = compact_stats_line(stats);
            if self.use_color {
                println!("{ANSI_DIM}{line}{ANSI_RESET}");
            } else {
                println!("{line}");
            }
        }
        println!();
        self.flush();
    }

    fn copy_to_clipboard(&mut self, text: &str) {
        // OSC 52: the terminal emulator owns the clipboard, so this works
        // over SSH where a clipboard crate would not.
        print!("\x1b]52;c;{}\x07", BASE64.encode(text));
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn stats_line_with_all_fields() {
        let mut stats = RequestStats::new("gpt-4");
        stats.output_tokens = 42;
        stats.time_to_first_token = Some(Duration::from_millis(310));
        stats.post_first_token_tokens_per_sec = Some(18.25);
        stats.total_latency = Duration::from_millis(2400);
        stats.cost_estimate = Some(0.00123);

        assert_eq!(
            compact_stats_line(&stats),
            "[42 tok | TTFT: 0.31s | 18.2 tok/s | 2.40s | $0.0012]"
        );
    }

    #[test]
    fn stats_line_omits_missing_fields() {
        let mut stats = RequestStats::new("gpt-4");
        stats.output_tokens = 1;
        stats.total_latency = Duration::from_millis(500);

        assert_eq!(compact_stats_line(&stats), "[1 tok | 0.50s]");
    }
}
