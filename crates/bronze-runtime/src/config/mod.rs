//! Configuration for a Bronze bot.
//!
//! Layered loading through figment (defaults, profile file, main file,
//! `BRONZE_*` environment, programmatic overrides), the schema, and
//! validation run before anything is built from it.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ApiConfig, BotConfig, BronzeConfig, CommandConfig, LogFormat, LogLevel, LogOutput,
    LoggingConfig, RetryConfig, SpanEventConfig, TransportConfig, WebhookConfig, WebsocketConfig,
};
pub use validation::validate_config;
