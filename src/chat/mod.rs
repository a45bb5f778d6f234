//! Interactive chat application built on the streaming client.
//!
//! This module provides a streaming REPL chat interface on top of the
//! chatstream client library. It supports:
//!
//! - Streaming responses with real-time token display
//! - A per-response latency and throughput stats line
//! - Slash commands for session control
//! - YAML configuration with environment overrides
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and YAML configuration
//! - [`conversation`]: Message history and the streaming state machine
//! - [`commands`]: Slash command parsing and resolution
//! - [`session`]: The controller tying conversation, client, and renderer
//!   together

pub mod commands;
pub mod config;
pub mod conversation;
pub mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{Command, CommandAction, CommandError, help_text, parse, resolve, suggestions};
pub use config::{ChatArgs, Config, DebugConfig, UiConfig};
pub use conversation::{Conversation, Phase};
pub use session::{ActionOutcome, ChatSession, SessionTotals, provider_from_config};
