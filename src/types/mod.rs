// Public modules
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod credential;
pub mod model;
pub mod turn;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_request::{ChatCompletionRequest, ChatMessage};
pub use credential::Credential;
pub use model::{KnownModel, Model};
pub use turn::{Role, Turn};
