// Public modules
pub mod chunk;
pub mod message;
pub mod request;
pub mod response;

// Re-exports
pub use chunk::StreamChunk;
pub use message::{Message, Role};
pub use request::ChatRequest;
pub use response::{ChatCompletion, ChatCompletionChunk, Choice, Delta, DeltaChoice, Usage};
