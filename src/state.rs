use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::AppConfig;
use crate::search::PreparedStore;
use crate::stream::RelayOptions;
use crate::transport::{HttpTransport, PreparedCompletion};

/// Process-seeded request id source: a random seed XORed with a monotonic
/// sequence yields stable, unique per-request UUIDs without per-request RNG.
struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.seed ^ u128::from(request_seq))
    }
}

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub completion: PreparedCompletion,
    pub store: PreparedStore,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let completion = PreparedCompletion::new(&config.completion);
        let store = PreparedStore::new(&config.store);
        Self {
            config,
            transport,
            completion,
            store,
            request_ids: RequestIdGenerator::new(),
        }
    }

    pub fn next_request_seq(&self) -> u64 {
        self.request_ids.next_seq()
    }

    #[must_use]
    pub fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        self.request_ids.request_uuid(request_seq)
    }

    /// System prompt for the answering model, honoring the config override.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        self.config
            .features
            .system_prompt
            .as_deref()
            .unwrap_or(crate::search::prompt::SYSTEM_PROMPT)
    }

    /// Relay policy derived from config.
    #[must_use]
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            idle_grace: Duration::from_secs(self.config.completion.idle_grace_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompletionConfig, FeaturesConfig, ServerConfig, StoreConfig};

    fn app_state() -> AppState {
        let config = AppConfig {
            server: ServerConfig::default(),
            completion: CompletionConfig {
                endpoint: "https://r.openai.azure.com/".to_string(),
                api_key: "k".to_string(),
                deployment: "gpt-4".to_string(),
                api_version: "2023-05-15".to_string(),
                embedding_deployment: "ada".to_string(),
                max_tokens: 2048,
                temperature: 0.3,
                stop: Vec::new(),
                idle_grace_secs: 7,
            },
            store: StoreConfig {
                url: "https://p.supabase.co".to_string(),
                service_role_key: "srk".to_string(),
                search_function: "mp_search".to_string(),
                similarity_threshold: 0.05,
                default_match_count: 5,
            },
            features: FeaturesConfig::default(),
        };
        let transport = HttpTransport::new(&config.server);
        AppState::new(config, transport)
    }

    #[test]
    fn test_request_ids_are_unique_and_stable() {
        let state = app_state();
        let a = state.next_request_seq();
        let b = state.next_request_seq();
        assert_ne!(a, b);
        assert_eq!(state.request_uuid(a), state.request_uuid(a));
        assert_ne!(state.request_uuid(a), state.request_uuid(b));
    }

    #[test]
    fn test_relay_options_from_config() {
        let state = app_state();
        assert_eq!(state.relay_options().idle_grace, Duration::from_secs(7));
    }

    #[test]
    fn test_system_prompt_override() {
        let mut state = app_state();
        assert!(state.system_prompt().contains("memory palace"));
        state.config.features.system_prompt = Some("custom".to_string());
        assert_eq!(state.system_prompt(), "custom");
    }
}
