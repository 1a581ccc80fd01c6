use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::error::RelayError;
use crate::search::search_passages;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub matches: Option<usize>,
}

/// `POST /api/search` — embed the query and return ranked passages.
pub(crate) async fn handler(State(state): State<Arc<AppState>>, body: bytes::Bytes) -> Response {
    let request: SearchRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return RelayError::InvalidRequest(format!("invalid search request: {err}"))
                .into_response()
        }
    };
    if request.query.trim().is_empty() {
        return RelayError::InvalidRequest("query cannot be empty".to_string()).into_response();
    }

    match search_passages(
        state.transport.client(),
        &state.completion,
        &state.store,
        &request.query,
        request.matches,
    )
    .await
    {
        Ok(passages) => Json(passages).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "passage search failed");
            err.into_response()
        }
    }
}
