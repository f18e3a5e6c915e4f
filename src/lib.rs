// Public modules
pub mod accumulating_stream;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod observability;
pub mod reducer;
pub mod render;
pub mod sse;
pub mod types;

// Re-exports
pub use accumulating_stream::AccumulatingStream;
pub use client::{API_KEY_ENV, ChunkStream, CompletionBackend, Groq};
pub use client_logger::{ClientLogger, JsonLinesLogger};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use reducer::{CompletionOutcome, CompletionReducer, CompletionState};
pub use render::{CURSOR_MARKER, PlainTextRenderer, Renderer};
pub use types::*;
