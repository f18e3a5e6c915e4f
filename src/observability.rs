use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("groqchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("groqchat.client.request_errors");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("groqchat.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("groqchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("groqchat.stream.bytes");
pub(crate) static STREAM_TTFF: Moments = Moments::new("groqchat.stream.ttff_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("groqchat.stream.duration_seconds");

pub(crate) static REDUCER_FRAGMENTS: Counter = Counter::new("groqchat.reducer.fragments");
pub(crate) static REDUCER_COMPLETED: Counter = Counter::new("groqchat.reducer.completed");
pub(crate) static REDUCER_FAILED: Counter = Counter::new("groqchat.reducer.failed");
pub(crate) static REDUCER_INTERRUPTED: Counter = Counter::new("groqchat.reducer.interrupted");

pub(crate) static SESSION_TURNS_COMMITTED: Counter =
    Counter::new("groqchat.session.turns_committed");
pub(crate) static SESSION_TURNS_DISCARDED: Counter =
    Counter::new("groqchat.session.turns_discarded");
pub(crate) static SESSION_REJECTED_SUBMISSIONS: Counter =
    Counter::new("groqchat.session.rejected_submissions");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFF);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&REDUCER_FRAGMENTS);
    collector.register_counter(&REDUCER_COMPLETED);
    collector.register_counter(&REDUCER_FAILED);
    collector.register_counter(&REDUCER_INTERRUPTED);

    collector.register_counter(&SESSION_TURNS_COMMITTED);
    collector.register_counter(&SESSION_TURNS_DISCARDED);
    collector.register_counter(&SESSION_REJECTED_SUBMISSIONS);
}
