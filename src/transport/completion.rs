//! The completion request issuer: builds and sends upstream HTTP requests
//! and hands the raw streaming body to the relay controller.

use crate::config::CompletionConfig;
use crate::error::RelayError;

/// The embeddings API version is pinned independently of the chat API.
const EMBEDDINGS_API_VERSION: &str = "2022-12-01";

/// Precomputed upstream endpoint state used by request paths.
#[derive(Debug, Clone)]
pub struct PreparedCompletion {
    chat_url: String,
    embeddings_url: String,
    api_key: String,
    deployment: String,
    max_tokens: u32,
    temperature: f32,
    stop: Vec<String>,
}

impl PreparedCompletion {
    /// Build prepared endpoint URLs and parameters from configuration.
    #[must_use]
    pub fn new(completion: &CompletionConfig) -> Self {
        let endpoint = completion.endpoint.trim_end_matches('/');
        let chat_url = format!(
            "{endpoint}/openai/deployments/{}/chat/completions?api-version={}",
            completion.deployment, completion.api_version
        );
        let embeddings_url = format!(
            "{endpoint}/openai/deployments/{}/embeddings?api-version={EMBEDDINGS_API_VERSION}",
            completion.embedding_deployment
        );
        Self {
            chat_url,
            embeddings_url,
            api_key: completion.api_key.clone(),
            deployment: completion.deployment.clone(),
            max_tokens: completion.max_tokens,
            temperature: completion.temperature,
            stop: completion.stop.clone(),
        }
    }

    fn chat_body(&self, system_prompt: &str, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.deployment,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": true,
        });
        if !self.stop.is_empty() {
            body["stop"] = serde_json::json!(self.stop);
        }
        body
    }
}

/// Distill a readable message out of an upstream error body.
///
/// Upstream errors arrive as `{"error":{"message":...}}` JSON; anything
/// else is surfaced raw.
fn upstream_error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("upstream request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

/// Issue the streaming chat-completion request.
///
/// Returns the live response on success; its body is the chunked SSE
/// stream (callers take it with `bytes_stream()`). A non-2xx status is a
/// fatal, non-retried condition surfaced before any streaming begins; no
/// relay session exists at that point.
///
/// # Errors
///
/// Returns [`RelayError::Upstream`] with the status and distilled error
/// body for non-2xx responses, or [`RelayError::Transport`] when the
/// request cannot be sent at all.
pub async fn open_completion_stream(
    client: &reqwest::Client,
    prepared: &PreparedCompletion,
    system_prompt: &str,
    prompt: &str,
) -> Result<reqwest::Response, RelayError> {
    let response = client
        .post(&prepared.chat_url)
        .header("api-key", &prepared.api_key)
        .json(&prepared.chat_body(system_prompt, prompt))
        .send()
        .await
        .map_err(|err| RelayError::Transport(format!("completion request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            message: upstream_error_message(&body, status),
        });
    }

    Ok(response)
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRecord>,
}

#[derive(serde::Deserialize)]
struct EmbeddingRecord {
    embedding: Vec<f32>,
}

/// Fetch the embedding vector for a query string.
///
/// # Errors
///
/// Returns [`RelayError::Upstream`] for non-2xx responses and
/// [`RelayError::Search`] when the response carries no embedding.
pub async fn fetch_embedding(
    client: &reqwest::Client,
    prepared: &PreparedCompletion,
    input: &str,
) -> Result<Vec<f32>, RelayError> {
    let response = client
        .post(&prepared.embeddings_url)
        .header("api-key", &prepared.api_key)
        .json(&serde_json::json!({ "input": input }))
        .send()
        .await
        .map_err(|err| RelayError::Transport(format!("embedding request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            message: upstream_error_message(&body, status),
        });
    }

    let parsed: EmbeddingResponse = response
        .json()
        .await
        .map_err(|err| RelayError::Search(format!("invalid embedding response: {err}")))?;
    parsed
        .data
        .into_iter()
        .next()
        .map(|record| record.embedding)
        .ok_or_else(|| RelayError::Search("embedding response contained no vectors".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionConfig;

    fn config() -> CompletionConfig {
        CompletionConfig {
            endpoint: "https://r.openai.azure.com/".to_string(),
            api_key: "k".to_string(),
            deployment: "gpt-4".to_string(),
            api_version: "2023-05-15".to_string(),
            embedding_deployment: "ada".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            stop: Vec::new(),
            idle_grace_secs: 10,
        }
    }

    #[test]
    fn test_prepared_urls() {
        let prepared = PreparedCompletion::new(&config());
        assert_eq!(
            prepared.chat_url,
            "https://r.openai.azure.com/openai/deployments/gpt-4/chat/completions?api-version=2023-05-15"
        );
        assert_eq!(
            prepared.embeddings_url,
            "https://r.openai.azure.com/openai/deployments/ada/embeddings?api-version=2022-12-01"
        );
    }

    #[test]
    fn test_chat_body_shape() {
        let prepared = PreparedCompletion::new(&config());
        let body = prepared.chat_body("sys", "ask");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "ask");
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_chat_body_includes_stop_when_configured() {
        let mut cfg = config();
        cfg.stop = vec!["\n\n".to_string()];
        let prepared = PreparedCompletion::new(&cfg);
        let body = prepared.chat_body("sys", "ask");
        assert_eq!(body["stop"][0], "\n\n");
    }

    #[test]
    fn test_upstream_error_message_extraction() {
        let body = r#"{"error":{"message":"quota exhausted","type":"insufficient_quota"}}"#;
        assert_eq!(
            upstream_error_message(body, reqwest::StatusCode::TOO_MANY_REQUESTS),
            "quota exhausted"
        );
        assert_eq!(
            upstream_error_message("", reqwest::StatusCode::BAD_GATEWAY),
            "Bad Gateway"
        );
        assert_eq!(
            upstream_error_message("plain failure", reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            "plain failure"
        );
    }
}
