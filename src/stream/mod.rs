pub mod delta;
pub mod relay;
pub mod sse;

pub use delta::{decode_delta, DeltaDecodeError, DeltaEvent};
pub use relay::{relay_completion_stream, RelayOptions, RelayOutcome, RelaySession, SessionState};
pub use sse::{ChunkDecoder, SseParser};

/// A parsed SSE frame from the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}
