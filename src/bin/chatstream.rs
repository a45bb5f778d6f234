//! Interactive chat client for OpenAI-compatible completion endpoints.
//!
//! This binary provides a streaming REPL interface for chatting with
//! models served over the `/chat/completions` protocol.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! chatstream
//!
//! # Specify a model
//! chatstream --model gpt-4o
//!
//! # Point at a local endpoint
//! chatstream --base-url http://localhost:8080/v1
//!
//! # Disable colors (useful for piping output)
//! chatstream --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/new` - Start a new conversation
//! - `/temp <t>` - Change the sampling temperature
//! - `/system <prompt>` - Set the system prompt
//! - `/stats` - Toggle the per-response stats line
//! - `/exit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use chatstream::chat::{
    ActionOutcome, ChatArgs, ChatSession, CommandError, Config, PlainTextRenderer, Renderer,
    commands, provider_from_config,
};

type Repl = Editor<CommandHelper, DefaultHistory>;

/// Tab-completes slash-command names at the start of the line.
struct CommandHelper;

impl Completer for CommandHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let head = &line[..pos];
        if head.starts_with('/') && !head.contains(char::is_whitespace) {
            let candidates = commands::suggestions(head)
                .into_iter()
                .map(|name| format!("/{name}"))
                .collect();
            Ok((0, candidates))
        } else {
            Ok((pos, Vec::new()))
        }
    }
}

impl Hinter for CommandHelper {
    type Hint = String;
}

impl Highlighter for CommandHelper {}
impl Validator for CommandHelper {}
impl Helper for CommandHelper {}

/// Main entry point for the chatstream application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("chatstream [OPTIONS]");
    let mut config = match &args.config {
        Some(path) => Config::load_path(path)?,
        None => Config::load()?,
    };
    config.apply_args(&args);
    let use_color = !args.no_color;

    let provider = provider_from_config(&config)?;
    let model = config.model.clone();

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    })?;

    let mut session = ChatSession::new(provider, config, interrupted.clone());
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl: Repl = Editor::new()?;
    rl.set_helper(Some(CommandHelper));

    println!("chatstream (model: {model})");
    println!("Type /help for commands, /exit to quit\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::SeqCst);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                match commands::parse(&line) {
                    Ok(command) => {
                        let action = match commands::resolve(&command) {
                            Ok(action) => action,
                            Err(err) => {
                                renderer.print_error(&err.to_string());
                                continue;
                            }
                        };
                        match session.handle_action(action, &mut renderer) {
                            Ok(ActionOutcome::Continue) => {}
                            Ok(ActionOutcome::Quit) => {
                                println!("Goodbye!");
                                break;
                            }
                            Ok(ActionOutcome::Resend(text)) => {
                                send(&mut session, &text, &mut renderer).await;
                            }
                            Ok(ActionOutcome::Edit(text)) => {
                                match rl.readline_with_initial("You: ", (&text, "")) {
                                    Ok(edited) => {
                                        let edited = edited.trim();
                                        if edited.is_empty() {
                                            renderer.print_info("Edit cancelled.");
                                        } else {
                                            let _ = rl.add_history_entry(edited);
                                            send(&mut session, edited, &mut renderer).await;
                                        }
                                    }
                                    Err(_) => renderer.print_info("Edit cancelled."),
                                }
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        }
                        continue;
                    }
                    Err(CommandError::NotACommand) => {}
                    Err(err) => {
                        renderer.print_error(&err.to_string());
                        continue;
                    }
                }

                let message = if session.multiline() {
                    match read_multiline(&mut rl, line) {
                        Some(message) => message,
                        None => continue,
                    }
                } else {
                    line
                };

                send(&mut session, &message, &mut renderer).await;
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
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

/// Sends a message and renders the streamed reply.  Dispatch errors are
/// rendered here; stream-level errors are rendered inside the session.
async fn send(session: &mut ChatSession, message: &str, renderer: &mut PlainTextRenderer) {
    println!("Assistant:");
    if let Err(err) = session.send_streaming(message, renderer).await {
        renderer.print_error(&err.to_string());
    }
}

/// Reads continuation lines until a blank line terminates the message.
fn read_multiline(rl: &mut Repl, first: String) -> Option<String> {
    let mut lines = vec![first];
    loop {
        match rl.readline("... ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    break;
                }
                lines.push(line);
            }
            Err(ReadlineError::Interrupted) => return None,
            Err(_) => break,
        }
    }
    Some(lines.join("\n"))
}
