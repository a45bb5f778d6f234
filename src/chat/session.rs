//! Chat session management.
//!
//! [`ChatSession`] is the controller that ties the conversation state
//! machine, the streaming client, and the renderer together.  It consumes
//! chunk streams, applies slash-command actions, and keeps session-level
//! usage totals.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::interval;

use crate::client::Provider;
use crate::error::{Error, Result};
use crate::render::Renderer;
use crate::stats::RequestStats;
use crate::types::StreamChunk;

use super::commands::{self, CommandAction, MAX_TEMPERATURE};
use super::config::Config;
use super::conversation::Conversation;

/// How often the interrupt flag is polled while a stream is in flight.
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the caller should do after a command has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Keep reading input.
    Continue,

    /// Exit the REPL.
    Quit,

    /// Re-send the given text through the normal send path.
    Resend(String),

    /// Let the user edit this text, then send the result.
    Edit(String),
}

/// Aggregated usage totals for a chat session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionTotals {
    /// Total input tokens across all requests.
    pub input_tokens: u64,

    /// Total output tokens across all requests.
    pub output_tokens: u64,

    /// Total number of API requests made.
    pub requests: u64,

    /// Accumulated cost estimate, when pricing is configured.
    pub cost: f64,
}

/// A chat session that manages conversation state and API interactions.
pub struct ChatSession {
    provider: Box<dyn Provider>,
    conversation: Conversation,
    config: Config,
    totals: SessionTotals,
    last_turn: Option<RequestStats>,
    interrupt: Arc<AtomicBool>,
    show_stats: bool,
    debug: bool,
    multiline: bool,
}

impl ChatSession {
    /// Creates a new chat session.
    ///
    /// The conversation is seeded with the configured system prompt; the
    /// interrupt flag is shared with the signal handler.
    pub fn new(provider: Box<dyn Provider>, config: Config, interrupt: Arc<AtomicBool>) -> Self {
        let conversation = Conversation::new(config.system_prompt.clone());
        let show_stats = config.ui.show_stats;
        let debug = config.debug.verbose;
        Self {
            provider,
            conversation,
            config,
            totals: SessionTotals::default(),
            last_turn: None,
            interrupt,
            show_stats,
            debug,
            multiline: false,
        }
    }

    /// Returns whether multiline input mode is active.
    pub fn multiline(&self) -> bool {
        self.multiline
    }

    /// Returns the session usage totals.
    pub fn totals(&self) -> SessionTotals {
        self.totals
    }

    /// Returns the conversation.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Sends a user message and streams the response.
    ///
    /// The user message is appended first; if dispatching the request
    /// fails before any bytes arrive, the message is removed again and the
    /// error is returned so the caller can display it.  Stream-level
    /// errors and interrupts are rendered here and do not propagate.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        self.conversation.append_user(user_input)?;
        self.stream_turn(renderer).await
    }

    /// Dispatches a request for the current history and consumes the
    /// resulting chunk stream.
    async fn stream_turn(&mut self, renderer: &mut dyn Renderer) -> Result<()> {
        self.interrupt.store(false, Ordering::SeqCst);

        let dispatch = self.provider.start_stream(self.conversation.messages()).await;
        let (mut chunks, stats) = match dispatch {
            Ok(pair) => pair,
            Err(err) => {
                self.conversation.take_last_user();
                return Err(err);
            }
        };
        self.conversation.begin_streaming(stats)?;

        let mut poll = interval(INTERRUPT_POLL_INTERVAL);
        loop {
            tokio::select! {
                chunk = chunks.next() => {
                    match chunk {
                        Some(StreamChunk::Content(text)) => {
                            self.conversation.append_stream_fragment(&text)?;
                            renderer.print_text(&text);
                        }
                        Some(StreamChunk::Done) | None => {
                            // A closed channel without a terminal chunk
                            // means the reader task is gone; treat it as
                            // end of stream.
                            return self.finish_turn(renderer);
                        }
                        Some(StreamChunk::Error(err)) => {
                            self.conversation.abandon_streaming_on_error()?;
                            renderer.print_error(&err.to_string());
                            if self.debug {
                                renderer.print_info(&format!("debug: {err:?}"));
                            }
                            return Ok(());
                        }
                    }
                }
                _ = poll.tick() => {
                    if self.interrupt.swap(false, Ordering::SeqCst) {
                        chunks.cancel();
                        self.conversation.abandon_streaming()?;
                        renderer.print_interrupted();
                        return Ok(());
                    }
                }
            }
        }
    }

    fn finish_turn(&mut self, renderer: &mut dyn Renderer) -> Result<()> {
        let handle = self.conversation.commit_streaming()?;
        if let Some(handle) = handle {
            let snapshot = handle.snapshot();
            self.totals.input_tokens += snapshot.input_tokens;
            self.totals.output_tokens += snapshot.output_tokens;
            self.totals.requests += 1;
            if let Some(cost) = snapshot.cost_estimate {
                self.totals.cost += cost;
            }
            renderer.finish_response(&snapshot, self.show_stats);
            if self.debug {
                renderer.print_info(&format!(
                    "debug: model={} status={:?} tokens={}/{}",
                    snapshot.model,
                    snapshot.http_status,
                    snapshot.input_tokens,
                    snapshot.output_tokens,
                ));
            }
            self.last_turn = Some(snapshot);
        }
        Ok(())
    }

    /// Applies a resolved command action.
    ///
    /// Command failures are rendered rather than propagated; only I/O and
    /// state errors reach the caller.
    pub fn handle_action(
        &mut self,
        action: CommandAction,
        renderer: &mut dyn Renderer,
    ) -> Result<ActionOutcome> {
        match action {
            CommandAction::NewConversation => {
                self.conversation.reset(self.config.system_prompt.clone());
                renderer.print_info("Started a new conversation.");
            }
            CommandAction::ReloadConfig => {
                self.reload(renderer)?;
            }
            CommandAction::SetTemperature(value) => {
                debug_assert!((0.0..=MAX_TEMPERATURE).contains(&value));
                self.config.temperature = value;
                self.provider.set_temperature(value);
                renderer.print_info(&format!("Temperature set to {value}."));
            }
            CommandAction::SetSystemPrompt(prompt) => {
                self.config.system_prompt = prompt.clone();
                self.conversation.set_system_prompt(prompt);
                renderer.print_info("System prompt updated.");
            }
            CommandAction::DeleteLastTurn => {
                self.conversation.delete_last_turn()?;
                renderer.print_info("Deleted the last turn.");
            }
            CommandAction::SaveConversation(path) => {
                self.conversation.save_to(&path)?;
                renderer.print_info(&format!("Saved conversation to {}.", path.display()));
            }
            CommandAction::LoadConversation(path) => {
                self.conversation.load_from(&path)?;
                renderer.print_info(&format!(
                    "Loaded conversation from {} ({} messages).",
                    path.display(),
                    self.conversation.messages().len(),
                ));
            }
            CommandAction::ShowTokens => {
                renderer.print_info(&format!(
                    "Session tokens: {} in / {} out over {} requests.",
                    self.totals.input_tokens, self.totals.output_tokens, self.totals.requests,
                ));
                if let Some(last) = &self.last_turn {
                    renderer.print_info(&format!(
                        "Last turn: {} in / {} out.",
                        last.input_tokens, last.output_tokens,
                    ));
                }
            }
            CommandAction::ShowCost => {
                if self.config.pricing.is_some() {
                    renderer.print_info(&format!(
                        "Estimated session cost: ${:.4}.",
                        self.totals.cost
                    ));
                } else {
                    renderer.print_info(
                        "No pricing configured; set `pricing` in the config file for estimates.",
                    );
                }
            }
            CommandAction::ExportMarkdown(path) => {
                let markdown = self.conversation.export_markdown();
                match path {
                    Some(path) => {
                        std::fs::write(&path, markdown).map_err(|err| {
                            Error::io(format!("failed to write {}", path.display()), err)
                        })?;
                        renderer.print_info(&format!("Exported to {}.", path.display()));
                    }
                    None => renderer.print_info(&markdown),
                }
            }
            CommandAction::ToggleStats => {
                self.show_stats = !self.show_stats;
                renderer.print_info(if self.show_stats {
                    "Stats line on."
                } else {
                    "Stats line off."
                });
            }
            CommandAction::ToggleDebug => {
                self.debug = !self.debug;
                renderer.print_info(if self.debug {
                    "Debug output on."
                } else {
                    "Debug output off."
                });
            }
            CommandAction::Retry => {
                self.conversation.drop_last_assistant();
                match self.conversation.take_last_user() {
                    Some(text) => return Ok(ActionOutcome::Resend(text)),
                    None => renderer.print_info("Nothing to retry."),
                }
            }
            CommandAction::CopyLastResponse => match self.conversation.last_assistant() {
                Some(text) => {
                    let text = text.to_string();
                    renderer.copy_to_clipboard(&text);
                    renderer.print_info("Copied last response to clipboard.");
                }
                None => renderer.print_info("No response to copy."),
            },
            CommandAction::EditLastMessage => {
                // Drop any reply to the message being edited so the
                // resend regenerates it.
                self.conversation.drop_last_assistant();
                match self.conversation.take_last_user() {
                    Some(text) => return Ok(ActionOutcome::Edit(text)),
                    None => renderer.print_info("No message to edit."),
                }
            }
            CommandAction::ToggleMultiline => {
                self.multiline = !self.multiline;
                renderer.print_info(if self.multiline {
                    "Multiline input on; finish a message with a blank line."
                } else {
                    "Multiline input off."
                });
            }
            CommandAction::Help => {
                renderer.print_info(commands::help_text());
            }
            CommandAction::Quit => return Ok(ActionOutcome::Quit),
        }
        Ok(ActionOutcome::Continue)
    }

    /// Re-reads the configuration from disk and rebuilds the provider.
    ///
    /// Replaces client configuration only: the conversation, including its
    /// system message, is left untouched.  A reloaded system prompt takes
    /// effect on the next `/new`.  On failure the old configuration and
    /// provider stay in effect.
    fn reload(&mut self, renderer: &mut dyn Renderer) -> Result<()> {
        let config = Config::load()?;
        let provider = provider_from_config(&config)?;
        self.install_config(config, provider);
        renderer.print_info(&format!(
            "Configuration reloaded (model: {}).",
            self.config.model
        ));
        Ok(())
    }

    fn install_config(&mut self, config: Config, provider: Box<dyn Provider>) {
        self.provider = provider;
        self.show_stats = config.ui.show_stats;
        self.debug = config.debug.verbose;
        self.config = config;
    }
}

/// Builds an [`OpenAi`](crate::client::OpenAi) provider from a
/// configuration.
pub fn provider_from_config(config: &Config) -> Result<Box<dyn Provider>> {
    if config.api_key.is_empty() {
        return Err(Error::authentication(
            "no API key; set OPENAI_API_KEY or api_key in the config file",
        ));
    }
    let provider = crate::client::OpenAi::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.model.clone(),
        config.temperature,
        config.max_tokens,
    )?
    .with_pricing(config.pricing);
    Ok(Box::new(provider))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::client::Provider;
    use crate::sse::ChunkStream;
    use crate::stats::StatsHandle;
    use crate::types::{Message, Role};

    use super::*;

    /// A renderer that captures output for assertions.
    #[derive(Default)]
    struct CaptureRenderer {
        text: String,
        errors: Vec<String>,
        info: Vec<String>,
        interrupted: usize,
        finished: usize,
        clipboard: Option<String>,
    }

    impl Renderer for CaptureRenderer {
        fn print_text(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }

        fn print_info(&mut self, info: &str) {
            self.info.push(info.to_string());
        }

        fn print_interrupted(&mut self) {
            self.interrupted += 1;
        }

        fn finish_response(&mut self, _stats: &RequestStats, _show_stats: bool) {
            self.finished += 1;
        }

        fn copy_to_clipboard(&mut self, text: &str) {
            self.clipboard = Some(text.to_string());
        }
    }

    /// A provider that replays a canned sequence of chunks.
    #[derive(Debug)]
    struct ScriptedProvider {
        model: String,
        temperature: f64,
        chunks: Vec<StreamChunk>,
    }

    impl ScriptedProvider {
        fn new(chunks: Vec<StreamChunk>) -> Self {
            Self {
                model: "test-model".to_string(),
                temperature: 0.7,
                chunks,
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, _messages: &[Message]) -> Result<(String, RequestStats)> {
            unimplemented!("streaming only");
        }

        async fn start_stream(
            &self,
            _messages: &[Message],
        ) -> Result<(ChunkStream, StatsHandle)> {
            let stats = StatsHandle::new(RequestStats::new(&self.model));
            let chunks = self.chunks.clone();
            let token_stats = stats.clone();
            let stream = ChunkStream::scripted(move |tx| async move {
                for chunk in chunks {
                    if matches!(chunk, StreamChunk::Content(_)) {
                        let now = std::time::Instant::now();
                        token_stats.update(|stats| stats.record_token(now));
                    }
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
            });
            let finalize = stats.clone();
            finalize.update(|stats| {
                stats.record_status(200);
            });
            Ok((stream, stats))
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn set_model(&mut self, model: String) {
            self.model = model;
        }

        fn temperature(&self) -> f64 {
            self.temperature
        }

        fn set_temperature(&mut self, temperature: f64) {
            self.temperature = temperature;
        }
    }

    fn session_with(chunks: Vec<StreamChunk>) -> ChatSession {
        let provider = Box::new(ScriptedProvider::new(chunks));
        let mut config = Config::default();
        config.system_prompt = String::new();
        ChatSession::new(provider, config, Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn streamed_turn_commits_and_renders() {
        let mut session = session_with(vec![
            StreamChunk::Content("Hello".to_string()),
            StreamChunk::Content(", world".to_string()),
            StreamChunk::Done,
        ]);
        let mut renderer = CaptureRenderer::default();

        session.send_streaming("hi", &mut renderer).await.unwrap();

        assert_eq!(renderer.text, "Hello, world");
        assert_eq!(renderer.finished, 1);
        let messages = session.conversation().messages();
        assert_eq!(messages.last().unwrap().content, "Hello, world");
        assert_eq!(messages.last().unwrap().role, Role::Assistant);
        assert_eq!(session.totals().requests, 1);
    }

    #[tokio::test]
    async fn stream_error_renders_and_leaves_errored_phase() {
        let mut session = session_with(vec![
            StreamChunk::Content("partial".to_string()),
            StreamChunk::Error(Error::api(500, "boom".to_string())),
        ]);
        let mut renderer = CaptureRenderer::default();

        session.send_streaming("hi", &mut renderer).await.unwrap();

        assert_eq!(renderer.errors.len(), 1);
        // The partial fragment is discarded, the user message stays.
        let messages = session.conversation().messages();
        assert_eq!(messages.last().unwrap().role, Role::User);
        assert_eq!(session.totals().requests, 0);
    }

    #[tokio::test]
    async fn closed_channel_without_terminal_commits() {
        let mut session = session_with(vec![StreamChunk::Content("tail".to_string())]);
        let mut renderer = CaptureRenderer::default();

        session.send_streaming("hi", &mut renderer).await.unwrap();

        let messages = session.conversation().messages();
        assert_eq!(messages.last().unwrap().content, "tail");
        assert_eq!(messages.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn retry_resends_last_user_message() {
        let mut session = session_with(vec![
            StreamChunk::Content("answer".to_string()),
            StreamChunk::Done,
        ]);
        let mut renderer = CaptureRenderer::default();
        session.send_streaming("question", &mut renderer).await.unwrap();

        let outcome = session
            .handle_action(CommandAction::Retry, &mut renderer)
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Resend("question".to_string()));
        assert!(session.conversation().messages().is_empty());
    }

    #[tokio::test]
    async fn edit_returns_last_user_text() {
        let mut session = session_with(vec![StreamChunk::Done]);
        let mut renderer = CaptureRenderer::default();
        session.send_streaming("typo", &mut renderer).await.unwrap();

        let outcome = session
            .handle_action(CommandAction::EditLastMessage, &mut renderer)
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Edit("typo".to_string()));
    }

    #[tokio::test]
    async fn copy_uses_last_assistant_message() {
        let mut session = session_with(vec![
            StreamChunk::Content("the answer".to_string()),
            StreamChunk::Done,
        ]);
        let mut renderer = CaptureRenderer::default();
        session.send_streaming("q", &mut renderer).await.unwrap();

        session
            .handle_action(CommandAction::CopyLastResponse, &mut renderer)
            .unwrap();
        assert_eq!(renderer.clipboard.as_deref(), Some("the answer"));
    }

    #[tokio::test]
    async fn new_conversation_keeps_system_prompt() {
        let mut config = Config::default();
        config.system_prompt = "sys".to_string();
        let provider = Box::new(ScriptedProvider::new(vec![StreamChunk::Done]));
        let mut session =
            ChatSession::new(provider, config, Arc::new(AtomicBool::new(false)));
        let mut renderer = CaptureRenderer::default();
        session.send_streaming("hello", &mut renderer).await.unwrap();

        session
            .handle_action(CommandAction::NewConversation, &mut renderer)
            .unwrap();
        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn reload_replaces_config_without_touching_conversation() {
        let mut config = Config::default();
        config.system_prompt = "original prompt".to_string();
        let provider = Box::new(ScriptedProvider::new(vec![
            StreamChunk::Content("reply".to_string()),
            StreamChunk::Done,
        ]));
        let mut session =
            ChatSession::new(provider, config, Arc::new(AtomicBool::new(false)));
        let mut renderer = CaptureRenderer::default();
        session.send_streaming("question", &mut renderer).await.unwrap();
        let before = session.conversation().messages().to_vec();

        let mut reloaded = Config::default();
        reloaded.system_prompt = "prompt from disk".to_string();
        reloaded.ui.show_stats = false;
        session.install_config(reloaded, Box::new(ScriptedProvider::new(vec![])));

        // Client configuration is replaced; the transcript, system message
        // included, stays exactly as it was.
        assert_eq!(session.conversation().messages(), before.as_slice());
        assert_eq!(
            session.conversation().messages()[0],
            Message::system("original prompt")
        );
        assert!(!session.show_stats);
        assert_eq!(session.config.system_prompt, "prompt from disk");

        // The reloaded prompt takes effect on the next /new.
        session
            .handle_action(CommandAction::NewConversation, &mut renderer)
            .unwrap();
        assert_eq!(
            session.conversation().messages(),
            [Message::system("prompt from disk")].as_slice()
        );
    }

    #[tokio::test]
    async fn set_temperature_updates_session_and_provider() {
        let mut session = session_with(vec![]);
        let mut renderer = CaptureRenderer::default();

        session
            .handle_action(CommandAction::SetTemperature(1.3), &mut renderer)
            .unwrap();
        assert_eq!(session.config.temperature, 1.3);
        assert_eq!(session.provider.temperature(), 1.3);
    }

    #[test]
    fn provider_requires_api_key() {
        let config = Config::default();
        let err = provider_from_config(&config).unwrap_err();
        assert!(err.is_authentication());
    }
}
