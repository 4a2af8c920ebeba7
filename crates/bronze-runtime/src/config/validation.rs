//! Configuration validation.
//!
//! Runs before anything is built from a loaded [`BronzeConfig`], so a bad
//! value fails at startup instead of on the first reconnect or request.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    ApiConfig, BronzeConfig, CommandConfig, RetryConfig, TransportConfig, WebhookConfig,
    WebsocketConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &BronzeConfig) -> ConfigResult<()> {
    if config.bot.token.is_empty() {
        return Err(ConfigError::missing_field("bot.token"));
    }
    validate_api_config(&config.bot.api)?;
    match &config.bot.transport {
        TransportConfig::Websocket(ws) => validate_websocket_config(ws)?,
        TransportConfig::Webhook(hook) => validate_webhook_config(hook)?,
    }
    validate_command_config(&config.bot.command)?;
    Ok(())
}

fn validate_api_config(api: &ApiConfig) -> ConfigResult<()> {
    validate_url(&api.base_url)?;
    if api.version == 0 {
        return Err(ConfigError::validation("API version must be greater than 0"));
    }
    if api.timeout_ms == 0 {
        return Err(ConfigError::validation("Timeout must be greater than 0"));
    }
    Ok(())
}

fn validate_websocket_config(ws: &WebsocketConfig) -> ConfigResult<()> {
    if ws.heartbeat_interval_secs == 0 {
        return Err(ConfigError::validation(
            "Heartbeat interval must be greater than 0",
        ));
    }
    validate_retry_config(&ws.retry)
}

fn validate_retry_config(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if retry.multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_webhook_config(hook: &WebhookConfig) -> ConfigResult<()> {
    if hook.verify_token.is_empty() {
        return Err(ConfigError::missing_field("bot.transport.verify_token"));
    }
    if hook.port == 0 {
        return Err(ConfigError::InvalidPort(hook.port));
    }
    if !hook.path.starts_with('/') {
        return Err(ConfigError::validation("Path must start with '/'"));
    }
    if hook.dedup_window_secs == 0 || hook.sweep_interval_secs == 0 {
        return Err(ConfigError::validation(
            "Dedup window and sweep interval must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_command_config(command: &CommandConfig) -> ConfigResult<()> {
    if command.prefixes.is_empty() {
        return Err(ConfigError::validation("At least one command prefix is required"));
    }
    if command.prefixes.iter().any(String::is_empty) {
        return Err(ConfigError::validation("Command prefixes cannot be empty"));
    }
    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("bot.api.base_url"));
    }

    const VALID_SCHEMES: [&str; 2] = ["http://", "https://"];
    if !VALID_SCHEMES.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {VALID_SCHEMES:?}"),
        ));
    }

    Ok(())
}
