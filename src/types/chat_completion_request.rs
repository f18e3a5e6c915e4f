use serde::{Deserialize, Serialize};

use crate::types::{Model, Role, Turn};

/// One `{role, content}` pair in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// The role of the message.
    pub role: Role,

    /// The content of the message.
    pub content: String,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// Parameters for a streaming chat completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    /// The model that will complete the conversation.
    pub model: Model,

    /// Prior turns, oldest first.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum number of tokens to generate.
    pub max_tokens: u32,

    /// Whether the response is streamed.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Create a streaming request from a transcript snapshot.
    pub fn new(model: Model, turns: &[Turn], temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            messages: turns.iter().map(ChatMessage::from).collect(),
            temperature,
            max_tokens,
            stream: true,
        }
    }
}
