//! The stream relay controller: pulls bytes from the upstream completion
//! response, feeds them through the SSE parser and delta decoder, and
//! forwards decoded text to the outbound sink under an explicit session
//! state machine.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::delta::{decode_delta, DeltaEvent};
use super::sse::{ChunkDecoder, SseParser};
use super::SseEvent;

// ---------------------------------------------------------------------------
// RelaySession — outbound transfer state machine
// ---------------------------------------------------------------------------

/// Lifecycle of one outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Closing,
    Closed,
}

/// The outbound consumer disappeared before the transfer completed.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientGone;

/// Live state of one outbound transfer.
///
/// The session is the single owner of the outbound sender: text reaches the
/// sink only through [`RelaySession::enqueue`], which checks the state
/// first, and the sender is released exactly once in
/// [`RelaySession::close`]. Write-after-close and double-close cannot occur.
pub struct RelaySession {
    state: SessionState,
    sink: Option<mpsc::Sender<Bytes>>,
}

impl RelaySession {
    #[must_use]
    pub fn new(sink: mpsc::Sender<Bytes>) -> Self {
        Self {
            state: SessionState::Idle,
            sink: Some(sink),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    fn mark_streaming(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Streaming;
        }
    }

    /// Whether the outbound consumer has dropped its end of the channel.
    #[must_use]
    pub fn client_gone(&self) -> bool {
        self.sink.as_ref().is_some_and(mpsc::Sender::is_closed)
    }

    /// Enqueue a decoded text fragment to the outbound sink.
    ///
    /// A closed session accepts and discards the fragment.
    ///
    /// # Errors
    ///
    /// Returns [`ClientGone`] when the outbound consumer has disappeared.
    pub async fn enqueue(&mut self, text: String) -> Result<(), ClientGone> {
        let Some(sink) = self.sink.as_ref() else {
            return Ok(());
        };
        if sink.send(Bytes::from(text)).await.is_err() {
            return Err(ClientGone);
        }
        Ok(())
    }

    /// Close the session, releasing the outbound sender.
    ///
    /// Idempotent: closing an already-closed session is a no-op.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        // Dropping the sender completes the outbound body exactly once.
        self.sink = None;
        self.state = SessionState::Closed;
    }
}

// ---------------------------------------------------------------------------
// Relay controller
// ---------------------------------------------------------------------------

/// Controller policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    /// Grace period after upstream end-of-input without a termination
    /// signal, before the session is force-closed.
    pub idle_grace: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            idle_grace: Duration::from_secs(10),
        }
    }
}

/// How a relay run ended. Mid-stream failures close the session cleanly;
/// none of these surface as errors across the outbound boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// An explicit termination signal (sentinel or finish reason) was seen.
    Finished,
    /// A mid-stream payload was undecodable.
    DecodeAbort,
    /// The upstream transport failed mid-stream.
    UpstreamLost,
    /// Upstream closed without a termination signal; the idle grace elapsed.
    IdleTimeout,
    /// The outbound consumer disconnected.
    ClientGone,
}

impl RelayOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelayOutcome::Finished => "finished",
            RelayOutcome::DecodeAbort => "decode_abort",
            RelayOutcome::UpstreamLost => "upstream_lost",
            RelayOutcome::IdleTimeout => "idle_timeout",
            RelayOutcome::ClientGone => "client_gone",
        }
    }
}

enum Forward {
    Continue,
    Done(RelayOutcome),
}

/// Drive one upstream completion stream to the outbound sink.
///
/// The single consumer task for the session: reads chunks, feeds the
/// parser, decodes deltas and enqueues text in decode order. Terminates on
/// an explicit end-of-stream signal, a decode failure, upstream loss,
/// client disconnect, or the idle-grace backstop after end-of-input.
pub async fn relay_completion_stream<S, E>(
    upstream: S,
    mut session: RelaySession,
    options: RelayOptions,
) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures_util::pin_mut!(upstream);
    let mut parser = SseParser::new();
    let mut chunks = ChunkDecoder::new();
    let mut events: Vec<SseEvent> = Vec::with_capacity(8);

    loop {
        // Abort check between chunks: stop draining an upstream nobody reads.
        if session.client_gone() {
            session.close();
            return RelayOutcome::ClientGone;
        }

        match upstream.next().await {
            Some(Ok(bytes)) => {
                session.mark_streaming();
                chunks.decode(&bytes, |text| parser.feed_into(text, &mut events));
                if let Forward::Done(outcome) = forward_events(&mut session, &mut events).await {
                    return outcome;
                }
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "upstream read failed mid-stream, closing relay");
                session.close();
                return RelayOutcome::UpstreamLost;
            }
            None => break,
        }
    }

    // End-of-input without an explicit termination signal: give the parser
    // its final dispatch boundary, then arm the idle-grace backstop.
    let mut trailing = parser.flush();
    if let Forward::Done(outcome) = forward_events(&mut session, &mut trailing).await {
        return outcome;
    }

    tokio::time::sleep(options.idle_grace).await;
    session.close();
    RelayOutcome::IdleTimeout
}

async fn forward_events(session: &mut RelaySession, events: &mut Vec<SseEvent>) -> Forward {
    for event in events.drain(..) {
        match decode_delta(&event.data) {
            Ok(DeltaEvent::Text(text)) => {
                if text.is_empty() {
                    continue;
                }
                if session.enqueue(text).await.is_err() {
                    session.close();
                    return Forward::Done(RelayOutcome::ClientGone);
                }
            }
            Ok(DeltaEvent::Finished) => {
                session.close();
                return Forward::Done(RelayOutcome::Finished);
            }
            Err(err) => {
                tracing::warn!(error = %err, "undecodable completion frame, closing relay");
                session.close();
                return Forward::Done(RelayOutcome::DecodeAbort);
            }
        }
    }
    Forward::Continue
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
