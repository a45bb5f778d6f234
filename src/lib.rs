// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod observability;
pub mod render;
pub mod sse;
pub mod stats;
pub mod types;

// Re-exports
pub use client::{OpenAi, Provider};
pub use error::{Error, Result};
pub use render::{PlainTextRenderer, Renderer};
pub use sse::ChunkStream;
pub use stats::{Pricing, RequestStats, StatsHandle};
pub use types::*;
