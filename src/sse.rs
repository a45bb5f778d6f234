//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module decodes the newline-delimited `data:` stream produced by
//! OpenAI-compatible completion endpoints and runs the background reader
//! task that turns a raw byte stream into an ordered sequence of
//! [`StreamChunk`]s while driving the per-request stats record.

use std::time::Instant;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observability;
use crate::stats::{Pricing, StatsHandle};
use crate::types::{ChatCompletionChunk, StreamChunk};

/// The event-data marker prefixing payload lines.
pub const DATA_PREFIX: &str = "data:";

/// The literal payload marking end of stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Capacity of the chunk channel.  The reader blocks on a full channel
/// rather than dropping chunks, so back-pressure is implicit.
const CHANNEL_CAPACITY: usize = 16;

/// The decoded meaning of one SSE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SsePayload {
    /// A non-empty text delta.
    Delta(String),

    /// The stream-termination sentinel.
    Done,

    /// A payload that produces no chunk: malformed JSON or a chunk with no
    /// text delta.  Never surfaced as an error.
    Skip,
}

/// Extracts the payload of an SSE line, if it carries one.
///
/// Blank lines and lines without the `data:` marker are ignored.
pub fn payload_of_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.strip_prefix(DATA_PREFIX).map(str::trim_start)
}

/// Decodes one payload into its stream meaning.
pub fn decode_payload(payload: &str) -> SsePayload {
    if payload == DONE_SENTINEL {
        return SsePayload::Done;
    }
    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => match chunk.content() {
            Some(text) => SsePayload::Delta(text.to_string()),
            None => SsePayload::Skip,
        },
        // Malformed payloads are tolerated, not surfaced.
        Err(_) => SsePayload::Skip,
    }
}

/// An ordered, single-consumer, finite sequence of [`StreamChunk`]s.
///
/// Dropping or cancelling the stream signals the reader task's cancellation
/// token, so the underlying transport is released on every exit path,
/// including early abandonment.
#[derive(Debug)]
pub struct ChunkStream {
    rx: mpsc::Receiver<StreamChunk>,
    cancel: CancellationToken,
}

impl ChunkStream {
    pub(crate) fn new(rx: mpsc::Receiver<StreamChunk>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Receives the next chunk, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }

    /// Signals the reader task to stop and release the transport.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Builds a stream fed by a scripted task instead of a transport.
    #[cfg(test)]
    pub(crate) fn scripted<F, Fut>(script: F) -> Self
    where
        F: FnOnce(mpsc::Sender<StreamChunk>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(script(tx));
        Self { rx, cancel }
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns nothing itself: runs the reader loop over `byte_stream`, feeding
/// `tx` and mutating `stats`.  Exactly one finalization happens on every
/// exit path.
pub(crate) async fn drive_stream<S>(
    byte_stream: S,
    tx: mpsc::Sender<StreamChunk>,
    stats: StatsHandle,
    pricing: Option<Pricing>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut byte_stream = byte_stream;
    let mut buffer = String::new();
    let mut first_token_seen = false;

    let finalize = |stats: &StatsHandle, first_token_seen: bool| {
        let now = Instant::now();
        stats.update(|stats| {
            stats.finalize(now, pricing);
            observability::STREAM_DURATION.add(stats.total_latency.as_secs_f64());
            if first_token_seen
                && let Some(ttft) = stats.time_to_first_token
            {
                observability::STREAM_TTFT.add(ttft.as_secs_f64());
            }
        });
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                // Abandoned by the consumer.  Dropping the byte stream
                // closes the transport; stats still finalize.
                finalize(&stats, first_token_seen);
                return;
            }
            next = byte_stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                observability::STREAM_BYTES.count(bytes.len() as u64);
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let Some(payload) = payload_of_line(&line) else {
                        continue;
                    };
                    match decode_payload(payload) {
                        SsePayload::Done => {
                            finalize(&stats, first_token_seen);
                            let _ = tx.send(StreamChunk::Done).await;
                            return;
                        }
                        SsePayload::Delta(text) => {
                            let now = Instant::now();
                            stats.update(|stats| stats.record_token(now));
                            first_token_seen = true;
                            observability::STREAM_CHUNKS.click();
                            if tx.send(StreamChunk::Content(text)).await.is_err() {
                                // Receiver gone; treat as abandonment.
                                finalize(&stats, first_token_seen);
                                return;
                            }
                        }
                        SsePayload::Skip => {}
                    }
                }
            }
            Some(Err(err)) => {
                observability::STREAM_ERRORS.click();
                finalize(&stats, first_token_seen);
                let _ = tx.send(StreamChunk::Error(err)).await;
                return;
            }
            None => {
                // End of body without the sentinel still terminates cleanly.
                finalize(&stats, first_token_seen);
                let _ = tx.send(StreamChunk::Done).await;
                return;
            }
        }
    }
}

/// Wires up a chunk channel and reader task for `byte_stream`.
///
/// Returns the consumer half; the producer runs as an independent tokio
/// task whose lifetime is bound to the returned stream's cancellation
/// token.
pub(crate) fn spawn_stream<S>(
    byte_stream: S,
    stats: StatsHandle,
    pricing: Option<Pricing>,
) -> ChunkStream
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        drive_stream(byte_stream, tx, stats, pricing, token).await;
    });
    ChunkStream::new(rx, cancel)
}
