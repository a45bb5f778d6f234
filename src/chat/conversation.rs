//! Conversation state management.
//!
//! This module owns the ordered message history and the in-flight streaming
//! buffer, and enforces the invariants about roles, ordering, and phase
//! transitions.  It is the only component with a real state machine besides
//! the controller that drives it.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};

use crate::error::{Error, Result};
use crate::stats::StatsHandle;
use crate::types::{Message, Role};

/// The phase of the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No request in flight.
    Idle,

    /// A streaming response is being accumulated.
    Streaming,

    /// The last stream ended in an error.  Cleared by the next user
    /// message or by a reset.
    Errored,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Streaming => "streaming",
            Phase::Errored => "errored",
        }
    }
}

/// The conversation transcript plus the currently-in-flight streaming
/// buffer.
///
/// The system message, if present, occupies index 0 and is unique.  The
/// streaming buffer is non-empty only while the phase is `Streaming`.
pub struct Conversation {
    messages: Vec<Message>,
    streaming_buffer: String,
    in_flight_stats: Option<StatsHandle>,
    phase: Phase,
    system_prompt: String,
}

impl Conversation {
    /// Creates a new conversation, seeded with the system prompt when it is
    /// non-empty.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        let mut messages = Vec::new();
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt.clone()));
        }
        Self {
            messages,
            streaming_buffer: String::new(),
            in_flight_stats: None,
            phase: Phase::Idle,
            system_prompt,
        }
    }

    /// Returns the transcript.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true while a stream is being accumulated.
    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }

    /// Returns the in-flight streaming buffer.
    pub fn streaming_buffer(&self) -> &str {
        &self.streaming_buffer
    }

    /// Returns the current system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Number of messages excluding the system message.
    pub fn turn_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role != Role::System)
            .count()
    }

    /// Appends a user message.
    ///
    /// Recovers an `Errored` phase back to `Idle`; fails while streaming.
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<()> {
        if self.phase == Phase::Streaming {
            return Err(Error::invalid_transition("append_user", self.phase.as_str()));
        }
        self.phase = Phase::Idle;
        self.messages.push(Message::user(text));
        Ok(())
    }

    /// Transitions `Idle -> Streaming`, clearing the buffer and storing the
    /// stats handle for the request.
    pub fn begin_streaming(&mut self, stats: StatsHandle) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(Error::invalid_transition(
                "begin_streaming",
                self.phase.as_str(),
            ));
        }
        self.phase = Phase::Streaming;
        self.streaming_buffer.clear();
        self.in_flight_stats = Some(stats);
        Ok(())
    }

    /// Appends a fragment to the streaming buffer, in arrival order.
    pub fn append_stream_fragment(&mut self, text: &str) -> Result<()> {
        if self.phase != Phase::Streaming {
            return Err(Error::invalid_transition(
                "append_stream_fragment",
                self.phase.as_str(),
            ));
        }
        self.streaming_buffer.push_str(text);
        Ok(())
    }

    /// Transitions `Streaming -> Idle`, committing a non-empty buffer as an
    /// assistant message.  Returns the stats handle for the finished
    /// request.
    pub fn commit_streaming(&mut self) -> Result<Option<StatsHandle>> {
        if self.phase != Phase::Streaming {
            return Err(Error::invalid_transition(
                "commit_streaming",
                self.phase.as_str(),
            ));
        }
        if !self.streaming_buffer.is_empty() {
            let content = std::mem::take(&mut self.streaming_buffer);
            self.messages.push(Message::assistant(content));
        }
        self.streaming_buffer.clear();
        self.phase = Phase::Idle;
        Ok(self.in_flight_stats.take())
    }

    /// Transitions `Streaming -> Idle`, discarding the buffer.
    ///
    /// This is the cancellation path: the only way streamed content is lost
    /// by design.
    pub fn abandon_streaming(&mut self) -> Result<()> {
        self.abandon_to(Phase::Idle)
    }

    /// Transitions `Streaming -> Errored`, discarding the buffer.  Used
    /// when the stream itself delivered an error chunk.
    pub fn abandon_streaming_on_error(&mut self) -> Result<()> {
        self.abandon_to(Phase::Errored)
    }

    fn abandon_to(&mut self, next: Phase) -> Result<()> {
        if self.phase != Phase::Streaming {
            return Err(Error::invalid_transition(
                "abandon_streaming",
                self.phase.as_str(),
            ));
        }
        self.streaming_buffer.clear();
        self.in_flight_stats = None;
        self.phase = next;
        Ok(())
    }

    /// Replaces or inserts the system message at index 0.
    ///
    /// Inserting shifts all other messages down one position without
    /// otherwise reordering them.  An empty prompt removes the system
    /// message.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let has_system = self
            .messages
            .first()
            .is_some_and(|message| message.role == Role::System);
        if prompt.is_empty() {
            if has_system {
                self.messages.remove(0);
            }
        } else if has_system {
            self.messages[0].content = prompt.clone();
        } else {
            self.messages.insert(0, Message::system(prompt.clone()));
        }
        self.system_prompt = prompt;
    }

    /// Removes the last turn.
    ///
    /// A trailing assistant message and the user message before it are
    /// removed together; a trailing user message with no reply is removed
    /// alone.  Fails with [`Error::NothingToDelete`] when the history,
    /// excluding the system message, is empty.
    pub fn delete_last_turn(&mut self) -> Result<()> {
        if self.turn_message_count() == 0 {
            return Err(Error::NothingToDelete);
        }
        let Some(last) = self.messages.pop() else {
            return Err(Error::NothingToDelete);
        };
        if last.role == Role::Assistant
            && self
                .messages
                .last()
                .is_some_and(|message| message.role == Role::User)
        {
            self.messages.pop();
        }
        Ok(())
    }

    /// Clears the history, installing `system_prompt` as the sole message
    /// when it is non-empty.
    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = system_prompt.into();
        self.messages.clear();
        self.streaming_buffer.clear();
        self.in_flight_stats = None;
        self.phase = Phase::Idle;
        if !self.system_prompt.is_empty() {
            self.messages.push(Message::system(self.system_prompt.clone()));
        }
    }

    /// Returns the content of the most recent assistant message.
    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.content.as_str())
    }

    /// Pops a trailing assistant message, leaving the user message before
    /// it in place.  Returns false when the last message is not from the
    /// assistant.  Used by retry.
    pub fn drop_last_assistant(&mut self) -> bool {
        if self
            .messages
            .last()
            .is_some_and(|message| message.role == Role::Assistant)
        {
            self.messages.pop();
            true
        } else {
            false
        }
    }

    /// Pops a trailing user message, returning its content.
    ///
    /// Used by retry and edit, which put the text back through the send
    /// path.
    pub fn take_last_user(&mut self) -> Option<String> {
        if self
            .messages
            .last()
            .is_some_and(|message| message.role == Role::User)
        {
            self.messages.pop().map(|message| message.content)
        } else {
            None
        }
    }

    /// Saves the transcript to `path` as versioned JSON.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let transcript = TranscriptFile::new(&self.messages);
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }

    /// Loads a transcript from `path`, replacing the current history.
    ///
    /// Fails while streaming; the system prompt is re-derived from the
    /// loaded transcript.
    pub fn load_from<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.phase == Phase::Streaming {
            return Err(Error::invalid_transition("load", self.phase.as_str()));
        }
        let file = File::open(path.as_ref())
            .map_err(|err| Error::io("failed to open transcript file", err))?;
        let reader = BufReader::new(file);
        let transcript: TranscriptFile = from_reader(reader).map_err(|err| {
            Error::serialization("failed to parse transcript", Some(Box::new(err)))
        })?;
        if transcript.version != TRANSCRIPT_VERSION {
            return Err(Error::validation(
                format!("unsupported transcript version {}", transcript.version),
                Some("version".to_string()),
            ));
        }
        self.messages = transcript.messages;
        self.system_prompt = self
            .messages
            .first()
            .filter(|message| message.role == Role::System)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Renders the transcript as Markdown.
    pub fn export_markdown(&self) -> String {
        let mut out = String::from("# Conversation\n");
        for message in &self.messages {
            match message.role {
                Role::System => {
                    let _ = write!(out, "\n> System: {}\n", message.content);
                }
                Role::User => {
                    let _ = write!(out, "\n## User\n\n{}\n", message.content);
                }
                Role::Assistant => {
                    let _ = write!(out, "\n## Assistant\n\n{}\n", message.content);
                }
            }
        }
        out
    }
}

/// Transcript format version written by [`Conversation::save_to`].
const TRANSCRIPT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    messages: Vec<Message>,
}

impl TranscriptFile {
    fn new(messages: &[Message]) -> Self {
        Self {
            version: TRANSCRIPT_VERSION,
            messages: messages.to_vec(),
        }
    }
}
