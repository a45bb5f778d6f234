use crate::error::Error;

/// A chunk of streamed response, produced in strict arrival order.
///
/// `Done` and `Error` are terminal; no further chunks follow either.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// An incremental piece of assistant text.
    Content(String),

    /// The stream completed normally.
    Done,

    /// The transport failed mid-stream.  The accumulated stats are still
    /// finalized before this is delivered.
    Error(Error),
}

impl StreamChunk {
    /// Returns true if this chunk ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done | StreamChunk::Error(_))
    }
}
