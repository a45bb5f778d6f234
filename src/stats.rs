//! Per-request timing and throughput statistics.
//!
//! A [`RequestStats`] record is created at request dispatch, mutated only by
//! the streaming reader task, and immutable once the stream terminates.
//! Derived fields are left `None` when their preconditions do not hold, so
//! consumers must not assume they are always populated.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::types::Usage;

/// Per-million-token pricing used to derive a cost estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Dollars per million input tokens.
    pub input_per_mtok: f64,

    /// Dollars per million output tokens.
    pub output_per_mtok: f64,
}

impl Pricing {
    /// Estimated dollar cost for the given token counts.
    pub fn estimate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1_000_000.0 * self.input_per_mtok
            + output_tokens as f64 / 1_000_000.0 * self.output_per_mtok
    }
}

/// Timing and throughput metrics for one request.
#[derive(Debug, Clone)]
pub struct RequestStats {
    /// When the request was dispatched.
    pub start_time: Instant,

    /// When the stream terminated.  Set exactly once by [`finalize`].
    ///
    /// [`finalize`]: RequestStats::finalize
    pub end_time: Option<Instant>,

    /// When the first content-bearing chunk arrived.
    pub first_token_time: Option<Instant>,

    /// The model the request was addressed to.
    pub model: String,

    /// Prompt tokens, as reported by the backend.  Zero while streaming:
    /// the backend does not report incremental usage.
    pub input_tokens: u64,

    /// Completion tokens.  While streaming this is the count of observed
    /// content chunks.
    pub output_tokens: u64,

    /// Prompt plus completion tokens.
    pub total_tokens: u64,

    /// Latency from dispatch to the first content chunk.  Present iff at
    /// least one content chunk was observed.
    pub time_to_first_token: Option<Duration>,

    /// Duration from the first content chunk to termination.
    pub generation_time: Option<Duration>,

    /// Output tokens divided by total latency.  Present iff any output
    /// token was observed.
    pub avg_tokens_per_sec: Option<f64>,

    /// Steady-state decode speed, excluding the first token.  Present iff
    /// at least two output tokens were observed.
    pub post_first_token_tokens_per_sec: Option<f64>,

    /// Latency from dispatch to termination.
    pub total_latency: Duration,

    /// HTTP status of the response, once one arrived.
    pub http_status: Option<u16>,

    /// Estimated dollar cost, when pricing is configured.
    pub cost_estimate: Option<f64>,
}

impl RequestStats {
    /// Creates a new record stamped with the current time.
    pub fn new(model: impl Into<String>) -> Self {
        Self::started_at(model, Instant::now())
    }

    /// Creates a new record with an explicit start time.
    pub fn started_at(model: impl Into<String>, start_time: Instant) -> Self {
        Self {
            start_time,
            end_time: None,
            first_token_time: None,
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            time_to_first_token: None,
            generation_time: None,
            avg_tokens_per_sec: None,
            post_first_token_tokens_per_sec: None,
            total_latency: Duration::ZERO,
            http_status: None,
            cost_estimate: None,
        }
    }

    /// Records the HTTP status of the response.
    pub fn record_status(&mut self, status: u16) {
        self.http_status = Some(status);
    }

    /// Records one observed content chunk at `now`.
    ///
    /// The first call sets `first_token_time` and `time_to_first_token`;
    /// that assignment happens exactly once per stream.
    pub fn record_token(&mut self, now: Instant) {
        self.output_tokens += 1;
        if self.first_token_time.is_none() {
            self.first_token_time = Some(now);
            self.time_to_first_token = Some(now.saturating_duration_since(self.start_time));
        }
    }

    /// Records the usage object of a non-streaming response.
    pub fn record_usage(&mut self, usage: Usage) {
        self.input_tokens = usage.prompt_tokens;
        self.output_tokens = usage.completion_tokens;
        self.total_tokens = usage.total_tokens;
    }

    /// Finalizes the record at `now`, deriving the throughput fields.
    ///
    /// Idempotent: only the first call has any effect, so every exit path
    /// of the reader task may finalize unconditionally.
    pub fn finalize(&mut self, now: Instant, pricing: Option<Pricing>) {
        if self.end_time.is_some() {
            return;
        }
        self.end_time = Some(now);
        self.total_latency = now.saturating_duration_since(self.start_time);
        if self.total_tokens == 0 {
            self.total_tokens = self.input_tokens + self.output_tokens;
        }

        if let Some(first) = self.first_token_time {
            let generation = now.saturating_duration_since(first);
            self.generation_time = Some(generation);
            if self.output_tokens > 1 && !generation.is_zero() {
                self.post_first_token_tokens_per_sec =
                    Some((self.output_tokens - 1) as f64 / generation.as_secs_f64());
            }
        }

        if self.output_tokens > 0 && !self.total_latency.is_zero() {
            self.avg_tokens_per_sec =
                Some(self.output_tokens as f64 / self.total_latency.as_secs_f64());
        }

        if let Some(pricing) = pricing {
            self.cost_estimate = Some(pricing.estimate(self.input_tokens, self.output_tokens));
        }
    }

    /// Returns true if the record has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Shared handle onto a [`RequestStats`] record.
///
/// The reader task writes through one clone while the controller holds
/// another; the record is stable once the terminal chunk has been observed.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    inner: Arc<Mutex<RequestStats>>,
}

impl StatsHandle {
    /// Wraps a record in a shared handle.
    pub fn new(stats: RequestStats) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stats)),
        }
    }

    /// Returns a copy of the current record.
    pub fn snapshot(&self) -> RequestStats {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Runs `f` against the record under the lock.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut RequestStats) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
