use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatstream.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("chatstream.client.request_errors");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("chatstream.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatstream.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("chatstream.stream.bytes");
pub(crate) static STREAM_TTFT: Moments = Moments::new("chatstream.stream.ttft_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("chatstream.stream.duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFT);
    collector.register_moments(&STREAM_DURATION);
}
