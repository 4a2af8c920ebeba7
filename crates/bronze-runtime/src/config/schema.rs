//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
#[cfg(any(feature = "ws-client", feature = "http-server", feature = "http-client"))]
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bronze_core::Secret;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BronzeConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The bot account and how it talks to the platform.
    #[serde(default)]
    pub bot: BotConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including frame-level traces.
    Trace,
    /// Diagnostic detail.
    Debug,
    /// Lifecycle events.
    #[default]
    Info,
    /// Recovered failures.
    Warn,
    /// Unrecovered failures.
    Error,
}

impl LogLevel {
    /// Returns the lower-case name used in filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line, with span context.
    Full,
    /// Multi-line, human oriented.
    Pretty,
    /// Newline-delimited JSON (requires the `json-log` feature).
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// The file at `logging.file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    /// Span created.
    pub new: bool,
    /// Span entered.
    pub enter: bool,
    /// Span exited.
    pub exit: bool,
    /// Span closed.
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG`.
    pub level: LogLevel,
    /// Line format.
    pub format: LogFormat,
    /// Destination.
    pub output: LogOutput,
    /// Log file (for [`LogOutput::File`]).
    pub file_path: Option<PathBuf>,
    /// Rotation size in bytes.
    pub max_file_size: u64,
    /// Rotated files to keep.
    pub max_files: u32,
    /// Include thread ids.
    pub thread_ids: bool,
    /// Include file and line.
    pub file_location: bool,
    /// Span lifecycle events.
    pub span_events: SpanEventConfig,
    /// Per-module levels, e.g. `bronze_transport = "debug"`.
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            max_file_size: 10 * 1024 * 1024,
            max_files: 5,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Bot
// =============================================================================

/// Bot account configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    /// Bot token.
    #[serde(default)]
    pub token: Secret,

    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Event transport.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Command engine settings.
    #[serde(default)]
    pub command: CommandConfig,
}

/// REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root without the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API version.
    #[serde(default = "default_api_version")]
    pub version: u32,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Remaining-request count above which no pacing is applied.
    #[serde(default = "default_low_water")]
    pub rate_limit_low_water: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            version: default_api_version(),
            timeout_ms: default_timeout_ms(),
            rate_limit_low_water: default_low_water(),
        }
    }
}

#[cfg(feature = "http-client")]
impl ApiConfig {
    /// Builds the requester config for `token`.
    pub fn to_requester_config(&self, token: &Secret) -> bronze_transport::RequesterConfig {
        bronze_transport::RequesterConfig {
            base_url: self.base_url.clone(),
            version: self.version,
            token: token.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            rate_limit_low_water: self.rate_limit_low_water,
        }
    }
}

fn default_base_url() -> String {
    "https://www.kookapp.cn/api".to_string()
}

fn default_api_version() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_low_water() -> u32 {
    120
}

/// Event transport, selected by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Outbound websocket session.
    Websocket(WebsocketConfig),

    /// Inbound webhook route.
    Webhook(WebhookConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Websocket(WebsocketConfig::default())
    }
}

impl TransportConfig {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Websocket(_) => "websocket",
            Self::Webhook(_) => "webhook",
        }
    }
}

/// Reconnect backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First delay in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor per consecutive failure.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive failures before giving up; unset retries forever.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: None,
        }
    }
}

#[cfg(feature = "ws-client")]
impl RetryConfig {
    /// Converts to the socket receiver's policy.
    pub fn to_policy(&self) -> bronze_transport::RetryPolicy {
        bronze_transport::RetryPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            max_retries: self.max_retries,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Websocket transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketConfig {
    /// Ask for zlib-compressed frames.
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Heartbeat interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Reconnect backoff.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Frame encryption key, if the platform encrypts socket frames.
    #[serde(default)]
    pub encrypt_key: Option<Secret>,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            compress: true,
            heartbeat_interval_secs: default_heartbeat_interval(),
            retry: RetryConfig::default(),
            encrypt_key: None,
        }
    }
}

#[cfg(feature = "ws-client")]
impl WebsocketConfig {
    /// Converts to the socket receiver's config.
    pub fn to_socket_config(&self) -> bronze_transport::SocketConfig {
        bronze_transport::SocketConfig {
            compress: self.compress,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            retry: self.retry.to_policy(),
            encrypt_key: self.encrypt_key.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    26
}

/// Webhook transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default)]
    pub port: u16,

    /// Callback route.
    #[serde(default = "default_webhook_path")]
    pub path: String,

    /// Token every callback must carry.
    #[serde(default)]
    pub verify_token: Secret,

    /// Body encryption key.
    #[serde(default)]
    pub encrypt_key: Option<Secret>,

    /// Bodies are zlib-compressed.
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Duplicate-suppression window in seconds.
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Seconds between dedup sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            path: default_webhook_path(),
            verify_token: Secret::default(),
            encrypt_key: None,
            compress: true,
            dedup_window_secs: default_dedup_window(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[cfg(feature = "http-server")]
impl WebhookConfig {
    /// Converts to the push receiver's config.
    pub fn to_push_config(&self) -> bronze_transport::PushConfig {
        bronze_transport::PushConfig {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            verify_token: self.verify_token.clone(),
            encrypt_key: self.encrypt_key.clone(),
            compress: self.compress,
            dedup_window: Duration::from_secs(self.dedup_window_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_path() -> String {
    "/khl-wh".to_string()
}

fn default_dedup_window() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

/// Command engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Default prefix set.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefixes: default_prefixes(),
        }
    }
}

fn default_prefixes() -> Vec<String> {
    bronze_framework::DEFAULT_PREFIXES
        .iter()
        .map(|p| p.to_string())
        .collect()
}
