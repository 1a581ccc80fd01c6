use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::observability::log_relay_complete;
use crate::search::prompt::answer_prompt;
use crate::search::search_passages;
use crate::state::AppState;
use crate::stream::{relay_completion_stream, RelaySession};
use crate::transport::open_completion_stream;

/// Bounded outbound channel: a slow client exerts backpressure on the
/// upstream read loop instead of buffering the whole completion.
const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    pub query: String,
    #[serde(default)]
    pub matches: Option<usize>,
}

/// `POST /api/answer` — retrieve passages, build the prompt, and stream the
/// model's answer back as a chunked plain-text body.
///
/// Failures before the upstream stream opens surface as JSON error
/// responses; once streaming has begun the body is only ever cleanly
/// truncated.
pub(crate) async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: AnswerRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return RelayError::InvalidRequest(format!("invalid answer request: {err}"))
                .into_response()
        }
    };
    if request.query.trim().is_empty() {
        return RelayError::InvalidRequest("query cannot be empty".to_string()).into_response();
    }

    let request_id = state.request_uuid(state.next_request_seq());

    let passages = match search_passages(
        state.transport.client(),
        &state.completion,
        &state.store,
        &request.query,
        request.matches,
    )
    .await
    {
        Ok(passages) => passages,
        Err(err) => {
            tracing::warn!(request_id = %request_id, error = %err, "passage search failed");
            return err.into_response();
        }
    };

    let prompt = answer_prompt(&request.query, &passages);

    // A rejected upstream request never opens a relay session.
    let upstream = match open_completion_stream(
        state.transport.client(),
        &state.completion,
        state.system_prompt(),
        &prompt,
    )
    .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(request_id = %request_id, error = %err, "completion request rejected");
            return err.into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        passages = passages.len(),
        "relaying completion stream"
    );

    let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
    let session = RelaySession::new(tx);
    let options = state.relay_options();
    let started = std::time::Instant::now();
    let byte_stream = upstream.bytes_stream();
    tokio::spawn(async move {
        let outcome = relay_completion_stream(byte_stream, session, options).await;
        log_relay_complete(request_id, outcome, started);
    });

    text_stream_response(Body::from_stream(outbound_stream(rx)))
}

fn outbound_stream(rx: mpsc::Receiver<Bytes>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok(chunk), rx))
    })
}

fn text_stream_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    response
}
