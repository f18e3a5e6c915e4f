//! Chat application module for interactive conversations with Groq-hosted models.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! groqchat client library. It supports:
//!
//! - Streaming responses with a live cursor
//! - Slash commands for session control
//! - Configurable model, temperature, and max tokens
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: The transcript, its configuration, and submission
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{
    ChatArgs, ChatConfig, ConfigUpdate, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_MAX_TOKENS,
    MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE, SessionConfig, clamp_max_tokens,
    clamp_temperature,
};
pub use session::{ChatSession, ERROR_MARKER, SessionStats};
