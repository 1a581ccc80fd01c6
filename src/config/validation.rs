use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_completion_config(config)?;
    validate_store_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_completion_config(config: &AppConfig) -> Result<(), ConfigError> {
    let completion = &config.completion;
    if url::Url::parse(&completion.endpoint).is_err()
        || !completion.endpoint.starts_with("http://") && !completion.endpoint.starts_with("https://")
    {
        return Err(validation_err(
            "completion.endpoint must be a valid http(s) URL",
        ));
    }
    if !completion.endpoint.ends_with('/') {
        return Err(validation_err(
            "completion.endpoint must end with a trailing slash",
        ));
    }
    if completion.api_key.trim().is_empty() {
        return Err(validation_err("completion.api_key cannot be empty"));
    }
    if completion.deployment.trim().is_empty() {
        return Err(validation_err("completion.deployment cannot be empty"));
    }
    if completion.embedding_deployment.trim().is_empty() {
        return Err(validation_err(
            "completion.embedding_deployment cannot be empty",
        ));
    }
    if completion.max_tokens == 0 {
        return Err(validation_err("completion.max_tokens must be greater than 0"));
    }
    if !(0.0..=2.0).contains(&completion.temperature) {
        return Err(validation_err(
            "completion.temperature must be between 0.0 and 2.0",
        ));
    }
    if completion.idle_grace_secs == 0 {
        return Err(validation_err(
            "completion.idle_grace_secs must be greater than 0",
        ));
    }
    for stop in &completion.stop {
        if stop.is_empty() {
            return Err(validation_err("completion.stop contains an empty sequence"));
        }
    }
    Ok(())
}

fn validate_store_config(config: &AppConfig) -> Result<(), ConfigError> {
    let store = &config.store;
    if url::Url::parse(&store.url).is_err()
        || !store.url.starts_with("http://") && !store.url.starts_with("https://")
    {
        return Err(validation_err("store.url must be a valid http(s) URL"));
    }
    if store.service_role_key.trim().is_empty() {
        return Err(validation_err("store.service_role_key cannot be empty"));
    }
    if store.search_function.trim().is_empty() {
        return Err(validation_err("store.search_function cannot be empty"));
    }
    if !(0.0..=1.0).contains(&store.similarity_threshold) {
        return Err(validation_err(
            "store.similarity_threshold must be between 0.0 and 1.0",
        ));
    }
    if store.default_match_count == 0 {
        return Err(validation_err(
            "store.default_match_count must be greater than 0",
        ));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
