//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and YAML
//! configuration loading for the chat session.

use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::Pricing;

/// Default completion endpoint base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

/// Configuration file name searched for in the working directory and $HOME.
pub const CONFIG_FILE_NAME: &str = ".chatstream.yaml";

/// Command-line arguments for the chatstream tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Explicit path to a configuration file.
    #[arrrg(optional, "Path to a configuration file", "PATH")]
    pub config: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-4)", "MODEL")]
    pub model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Base URL of the completion endpoint.
    #[arrrg(optional, "Base URL of the completion endpoint", "URL")]
    pub base_url: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 4096)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// UI-related settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Whether the per-response stats line is shown.
    pub show_stats: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { show_stats: true }
    }
}

/// Debug-related settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Whether verbose debug output is enabled.
    pub verbose: bool,
}

/// Configuration for a chat session.
///
/// Loaded from `.chatstream.yaml`; every field has a default so a missing
/// or partial file still produces a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the completion endpoint.  The OPENAI_API_KEY
    /// environment variable takes precedence.
    pub api_key: String,

    /// Base URL of the completion endpoint.
    pub base_url: String,

    /// The model to use for generating responses.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// System prompt to set conversation context.
    pub system_prompt: String,

    /// Optional per-token pricing used for cost estimates.
    pub pricing: Option<Pricing>,

    /// UI settings.
    pub ui: UiConfig,

    /// Debug settings.
    pub debug: DebugConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            pricing: None,
            ui: UiConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, searching the working directory and then $HOME
    /// for [`CONFIG_FILE_NAME`].  Missing files yield the defaults.  The
    /// OPENAI_API_KEY environment variable overrides the file's api_key.
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Loads configuration from an explicit path, then applies environment
    /// overrides.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_from(path.as_ref())?;
        config.apply_env();
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        serde_yaml::from_str(&contents).map_err(|err| {
            Error::serialization(
                format!("failed to parse {}", path.display()),
                Some(Box::new(err)),
            )
        })
    }

    fn find_config_file() -> Option<PathBuf> {
        let cwd = PathBuf::from(CONFIG_FILE_NAME);
        if cwd.is_file() {
            return Some(cwd);
        }
        let home = std::env::var_os("HOME")?;
        let home = PathBuf::from(home).join(CONFIG_FILE_NAME);
        home.is_file().then_some(home)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.is_empty()
        {
            self.api_key = key;
        }
    }

    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_args(&mut self, args: &ChatArgs) {
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(system) = &args.system {
            self.system_prompt = system.clone();
        }
        if let Some(base_url) = &args.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(max_tokens) = args.max_tokens {
            self.max_tokens = max_tokens;
        }
    }

    /// Serializes this configuration to `path` as YAML.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self).map_err(|err| {
            Error::serialization("failed to serialize configuration", Some(Box::new(err)))
        })?;
        std::fs::write(path.as_ref(), yaml).map_err(|err| {
            Error::io(
                format!("failed to write {}", path.as_ref().display()),
                err,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(config.api_key.is_empty());
        assert!(config.pricing.is_none());
        assert!(config.ui.show_stats);
        assert!(!config.debug.verbose);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str("model: gpt-4o\ntemperature: 1.1\n").unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, 1.1);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn nested_sections_parse() {
        let yaml = "ui:\n  show_stats: false\ndebug:\n  verbose: true\npricing:\n  input_per_mtok: 2.5\n  output_per_mtok: 10.0\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.ui.show_stats);
        assert!(config.debug.verbose);
        let pricing = config.pricing.unwrap();
        assert_eq!(pricing.input_per_mtok, 2.5);
        assert_eq!(pricing.output_per_mtok, 10.0);
    }

    #[test]
    fn args_override_config() {
        let mut config = Config::default();
        let args = ChatArgs {
            config: None,
            model: Some("gpt-4o-mini".to_string()),
            system: Some("Be terse.".to_string()),
            base_url: Some("http://localhost:8080/v1".to_string()),
            max_tokens: Some(512),
            no_color: true,
        };
        config.apply_args(&args);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.system_prompt, "Be terse.");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.max_tokens, 512);
    }

    #[test]
    fn yaml_round_trip() {
        let dir = std::env::temp_dir().join("chatstream-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");

        let mut config = Config::default();
        config.model = "gpt-4o".to_string();
        config.ui.show_stats = false;
        config.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: Config = serde_yaml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_file(&path).ok();
    }
}
