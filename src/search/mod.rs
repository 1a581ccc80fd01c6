//! The retrieval collaborator: query embedding plus vector-store lookup.
//!
//! The store is a PostgREST-style RPC endpoint that ranks passages by
//! embedding similarity above a fixed threshold. The relay core treats the
//! output purely as prompt-construction input.

pub mod prompt;

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::RelayError;
use crate::transport::{fetch_embedding, PreparedCompletion};

/// One retrieved passage from the memory palace store, ranked by similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub content_title: String,
    pub content_url: String,
    pub content_date: String,
    pub content: String,
    pub content_length: u64,
    pub content_tokens: u64,
}

/// Precomputed store endpoint state.
#[derive(Debug, Clone)]
pub struct PreparedStore {
    rpc_url: String,
    service_role_key: String,
    similarity_threshold: f32,
    default_match_count: usize,
}

impl PreparedStore {
    #[must_use]
    pub fn new(store: &StoreConfig) -> Self {
        let rpc_url = format!(
            "{}/rest/v1/rpc/{}",
            store.url.trim_end_matches('/'),
            store.search_function
        );
        Self {
            rpc_url,
            service_role_key: store.service_role_key.clone(),
            similarity_threshold: store.similarity_threshold,
            default_match_count: store.default_match_count,
        }
    }

    /// Effective match count for a request, falling back to the configured default.
    #[must_use]
    pub fn match_count(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_match_count)
    }
}

/// Embed the query and rank passages against the store.
///
/// Newlines in the query are folded to spaces before embedding.
///
/// # Errors
///
/// Returns [`RelayError::Upstream`] when the embedding request is rejected,
/// or [`RelayError::Search`] when the store call fails or returns an
/// undecodable body.
pub async fn search_passages(
    client: &reqwest::Client,
    completion: &PreparedCompletion,
    store: &PreparedStore,
    query: &str,
    matches: Option<usize>,
) -> Result<Vec<Passage>, RelayError> {
    let input = query.replace('\n', " ");
    let embedding = fetch_embedding(client, completion, &input).await?;

    let response = client
        .post(&store.rpc_url)
        .header("apikey", &store.service_role_key)
        .bearer_auth(&store.service_role_key)
        .json(&serde_json::json!({
            "query_embedding": embedding,
            "similarity_threshold": store.similarity_threshold,
            "match_count": store.match_count(matches),
        }))
        .send()
        .await
        .map_err(|err| RelayError::Search(format!("store request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::Search(format!(
            "store returned status {}: {}",
            status.as_u16(),
            body.trim()
        )));
    }

    response
        .json::<Vec<Passage>>()
        .await
        .map_err(|err| RelayError::Search(format!("invalid store response: {err}")))
}
