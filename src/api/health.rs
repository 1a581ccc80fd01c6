use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "palace-rs is running",
        "config": {
            "deployment": config.completion.deployment,
            "embedding_deployment": config.completion.embedding_deployment,
            "search_function": config.store.search_function,
            "default_match_count": config.store.default_match_count,
            "features": {
                "log_level": config.features.log_level,
                "system_prompt_override": config.features.system_prompt.is_some(),
            }
        }
    }))
}
