//! Decoding of completion-delta payloads out of parsed SSE frames.
//!
//! Upstream deployments signal end-of-stream two independent ways: the
//! reserved `[DONE]` sentinel, and a non-null `finish_reason` inside a
//! structured frame. Some deployments send only one of the two; both are
//! honored.

use serde::Deserialize;

/// Reserved payload marking the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded completion event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaEvent {
    /// An incremental text fragment (possibly empty).
    Text(String),
    /// The stream has concluded, via sentinel or finish reason.
    Finished,
}

/// A data payload that is neither the sentinel nor valid structured content.
#[derive(Debug, thiserror::Error)]
#[error("malformed completion chunk: {0}")]
pub struct DeltaDecodeError(#[from] serde_json::Error);

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one SSE data payload into a [`DeltaEvent`].
///
/// Policy, in order: the `[DONE]` sentinel signals completion with no text;
/// otherwise the payload must parse as a completion chunk; a non-null,
/// non-empty `finish_reason` on the first choice signals completion even
/// when no sentinel ever arrives; otherwise the delta content (absent
/// content and an empty `choices` array both decode to an empty fragment).
///
/// # Errors
///
/// Returns [`DeltaDecodeError`] when the payload is not valid structured
/// content. Callers treat this as a stream-ending condition, not a crash.
pub fn decode_delta(data: &str) -> Result<DeltaEvent, DeltaDecodeError> {
    if data.trim() == DONE_SENTINEL {
        return Ok(DeltaEvent::Finished);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(DeltaEvent::Text(String::new()));
    };

    match choice.finish_reason {
        Some(reason) if !reason.is_empty() => Ok(DeltaEvent::Finished),
        _ => Ok(DeltaEvent::Text(choice.delta.content.unwrap_or_default())),
    }
}
