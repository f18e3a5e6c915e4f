//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, the per-session
//! [`SessionConfig`] the session store owns, and [`ConfigUpdate`] for
//! changing it mid-session.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::client::API_KEY_ENV;
use crate::types::{Credential, Model};
use crate::{Error, Result};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Lowest accepted temperature.
pub const MIN_TEMPERATURE: f32 = 0.0;

/// Highest accepted temperature.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Lowest accepted max_tokens.
pub const MIN_MAX_TOKENS: u32 = 256;

/// Highest accepted max_tokens.
pub const MAX_MAX_TOKENS: u32 = 8192;

/// Clamps a temperature into the accepted range.
///
/// Non-finite input falls back to [`DEFAULT_TEMPERATURE`].
pub fn clamp_temperature(temperature: f32) -> f32 {
    if temperature.is_finite() {
        temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
    } else {
        DEFAULT_TEMPERATURE
    }
}

/// Parses a temperature given on the command line and clamps it.
pub fn parse_temperature(value: &str) -> Result<f32> {
    match value.trim().parse::<f32>() {
        Ok(parsed) if parsed.is_finite() => Ok(clamp_temperature(parsed)),
        _ => Err(Error::validation(
            format!("temperature must be a number, got {value:?}"),
            Some("temperature".to_string()),
        )),
    }
}

/// Clamps max_tokens into the accepted range.
pub fn clamp_max_tokens(max_tokens: u32) -> u32 {
    max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS)
}

/// Command-line arguments for the groq-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: llama-3.3-70b-versatile)", "MODEL")]
    pub model: Option<String>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature, 0.0 to 2.0 (default: 1.0)", "TEMP")]
    pub temperature: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response, 256 to 8192 (default: 1024)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Override for the API base URL.
    #[arrrg(optional, "API base URL (default: https://api.groq.com/openai/v1/)", "URL")]
    pub base_url: Option<String>,

    /// Append requests and streamed chunks to this file as JSON lines.
    #[arrrg(optional, "Log requests and chunks as JSON lines to FILE", "FILE")]
    pub log_file: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// The settings every request is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Secret used to authenticate; empty means unset.
    pub credential: Credential,

    /// The model to use for generating responses.
    pub model: Model,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum tokens per response.
    pub max_tokens: u32,
}

impl SessionConfig {
    /// Creates a configuration with the defaults and no credential.
    pub fn new() -> Self {
        Self {
            credential: Credential::default(),
            model: Model::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Sets the credential.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// True if a non-empty credential is configured.
    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }

    /// Overwrites every field `update` provides.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(credential) = update.credential {
            self.credential = credential;
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(temperature) = update.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = update.max_tokens {
            self.max_tokens = max_tokens;
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A partial [`SessionConfig`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    /// New credential; an empty one unsets it.
    pub credential: Option<Credential>,
    /// New model.
    pub model: Option<Model>,
    /// New temperature, stored as given.
    pub temperature: Option<f32>,
    /// New response length limit, stored as given.
    pub max_tokens: Option<u32>,
}

impl ConfigUpdate {
    /// An update that only replaces the credential.
    pub fn credential(credential: impl Into<Credential>) -> Self {
        Self {
            credential: Some(credential.into()),
            ..Self::default()
        }
    }

    /// An update that only replaces the model.
    pub fn model(model: impl Into<Model>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// An update that only replaces the temperature.
    pub fn temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..Self::default()
        }
    }

    /// An update that only replaces max_tokens.
    pub fn max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..Self::default()
        }
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.credential.is_none()
            && self.model.is_none()
            && self.temperature.is_none()
            && self.max_tokens.is_none()
    }
}

/// Configuration for the chat application.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Settings handed to the session.
    pub session: SessionConfig,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Override for the API base URL.
    pub base_url: Option<String>,

    /// Where to write the JSON lines request log, if anywhere.
    pub log_file: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: llama-3.3-70b-versatile
    /// - Temperature: 1.0
    /// - Max tokens: 1024
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            session: SessionConfig::new(),
            use_color: true,
            base_url: None,
            log_file: None,
        }
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Reads the credential from `GROQ_API_KEY` if it is set.
    pub fn with_credential_from_env(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            self.session.credential = Credential::new(key);
        }
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let temperature = match args.temperature.as_deref() {
            Some(value) => parse_temperature(value)?,
            None => DEFAULT_TEMPERATURE,
        };
        let session = SessionConfig {
            model: args
                .model
                .map(|s| Model::from(s.as_str()))
                .unwrap_or_default(),
            temperature,
            max_tokens: args
                .max_tokens
                .map(clamp_max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            ..SessionConfig::new()
        };
        Ok(ChatConfig {
            session,
            use_color: !args.no_color,
            base_url: args.base_url,
            log_file: args.log_file.map(PathBuf::from),
        })
    }
}
