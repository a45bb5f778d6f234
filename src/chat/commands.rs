//! Slash-command parsing and resolution.
//!
//! Parsing is purely lexical and never mutates conversation state; the
//! resolved [`CommandAction`] is handed to the session for execution.

use std::fmt;
use std::path::PathBuf;

/// Maximum temperature accepted by `/temp`.
pub const MAX_TEMPERATURE: f64 = 2.0;

/// A lexed slash command: lowercased name plus raw argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

/// Errors from parsing or resolving a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The input does not start with `/` and should be treated as a chat
    /// message.
    NotACommand,

    /// The input was `/` with nothing after it.
    Empty,

    /// The command name is not recognized.
    Unknown { name: String },

    /// The command requires an argument that was not supplied.
    MissingArgument { name: &'static str, usage: &'static str },

    /// An argument failed to parse or was out of range.
    InvalidArgument { name: &'static str, message: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandError::NotACommand => write!(f, "not a command"),
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown { name } => {
                write!(f, "unknown command: /{name} (try /help)")
            }
            CommandError::MissingArgument { name, usage } => {
                write!(f, "/{name} requires an argument: {usage}")
            }
            CommandError::InvalidArgument { name, message } => {
                write!(f, "/{name}: {message}")
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// The effect a recognized command should have.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    NewConversation,
    ReloadConfig,
    SetTemperature(f64),
    SetSystemPrompt(String),
    DeleteLastTurn,
    SaveConversation(PathBuf),
    LoadConversation(PathBuf),
    ShowTokens,
    ShowCost,
    ExportMarkdown(Option<PathBuf>),
    ToggleStats,
    ToggleDebug,
    Retry,
    CopyLastResponse,
    EditLastMessage,
    ToggleMultiline,
    Help,
    Quit,
}

/// Lexes `input` into a [`Command`].
///
/// Leading and trailing whitespace is ignored.  The name is lowercased;
/// arguments keep their case.  Input that does not begin with `/` yields
/// [`CommandError::NotACommand`].
pub fn parse(input: &str) -> Result<Command, CommandError> {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Err(CommandError::NotACommand);
    };
    let mut tokens = rest.split_whitespace();
    let Some(name) = tokens.next() else {
        return Err(CommandError::Empty);
    };
    Ok(Command {
        name: name.to_lowercase(),
        args: tokens.map(String::from).collect(),
    })
}

/// Resolves a lexed command into a [`CommandAction`], validating
/// arguments.
pub fn resolve(command: &Command) -> Result<CommandAction, CommandError> {
    match command.name.as_str() {
        "new" | "clear" => Ok(CommandAction::NewConversation),
        "reload" => Ok(CommandAction::ReloadConfig),
        "temp" | "temperature" => {
            let raw = first_arg(command, "temp", "/temp <0.0-2.0>")?;
            let value: f64 = raw.parse().map_err(|_| CommandError::InvalidArgument {
                name: "temp",
                message: format!("{raw:?} is not a number"),
            })?;
            if !(0.0..=MAX_TEMPERATURE).contains(&value) {
                return Err(CommandError::InvalidArgument {
                    name: "temp",
                    message: format!("{value} is out of range (0.0-2.0)"),
                });
            }
            Ok(CommandAction::SetTemperature(value))
        }
        "system" => {
            if command.args.is_empty() {
                return Err(CommandError::MissingArgument {
                    name: "system",
                    usage: "/system <prompt>",
                });
            }
            Ok(CommandAction::SetSystemPrompt(command.args.join(" ")))
        }
        "delete" | "undo" => Ok(CommandAction::DeleteLastTurn),
        "save" => {
            let path = first_arg(command, "save", "/save <path>")?;
            Ok(CommandAction::SaveConversation(PathBuf::from(path)))
        }
        "load" => {
            let path = first_arg(command, "load", "/load <path>")?;
            Ok(CommandAction::LoadConversation(PathBuf::from(path)))
        }
        "tokens" => Ok(CommandAction::ShowTokens),
        "cost" => Ok(CommandAction::ShowCost),
        "export" => Ok(CommandAction::ExportMarkdown(
            command.args.first().map(PathBuf::from),
        )),
        "stats" => Ok(CommandAction::ToggleStats),
        "debug" => Ok(CommandAction::ToggleDebug),
        "retry" => Ok(CommandAction::Retry),
        "copy" => Ok(CommandAction::CopyLastResponse),
        "edit" => Ok(CommandAction::EditLastMessage),
        "multiline" => Ok(CommandAction::ToggleMultiline),
        "help" => Ok(CommandAction::Help),
        "exit" | "quit" => Ok(CommandAction::Quit),
        _ => Err(CommandError::Unknown {
            name: command.name.clone(),
        }),
    }
}

fn first_arg<'a>(
    command: &'a Command,
    name: &'static str,
    usage: &'static str,
) -> Result<&'a str, CommandError> {
    command
        .args
        .first()
        .map(String::as_str)
        .ok_or(CommandError::MissingArgument { name, usage })
}

const COMMAND_NAMES: &[&str] = &[
    "new", "clear", "reload", "temp", "system", "delete", "save", "load", "tokens", "cost",
    "export", "stats", "debug", "retry", "copy", "edit", "multiline", "help", "exit", "quit",
];

/// Command names matching `prefix`, for interactive completion.
pub fn suggestions(prefix: &str) -> Vec<&'static str> {
    let prefix = prefix.trim_start_matches('/');
    COMMAND_NAMES
        .iter()
        .copied()
        .filter(|name| name.starts_with(prefix))
        .collect()
}

/// One-line-per-command help text.
pub fn help_text() -> &'static str {
    "Commands:
  /new, /clear       Start a new conversation
  /reload            Reload configuration from disk
  /temp <t>          Set sampling temperature (0.0-2.0)
  /system <prompt>   Set the system prompt
  /delete            Delete the last turn
  /save <path>       Save the conversation to a file
  /load <path>       Load a conversation from a file
  /tokens            Show token usage for this session
  /cost              Show estimated session cost
  /export [path]     Export the conversation as Markdown
  /stats             Toggle the per-response stats line
  /debug             Toggle debug output
  /retry             Regenerate the last response
  /copy              Copy the last response to the clipboard
  /edit              Edit and resend your last message
  /multiline         Toggle multiline input
  /help              Show this help
  /exit, /quit       Exit"
}
