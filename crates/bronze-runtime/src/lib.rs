//! Bronze Runtime - configuration, logging and the bot facade.
//!
//! This crate provides:
//! - Layered configuration ([`ConfigLoader`], [`BronzeConfig`])
//! - Logging setup ([`LoggingBuilder`], [`logging::init_from_config`])
//! - The [`Bot`] facade wiring requester, receiver, gateway and client
//!
//! # Transport Selection
//!
//! `bot.transport.type` picks the receiver; its cargo feature must be on:
//!
//! - `websocket` needs `ws-client`
//! - `webhook` needs `http-server`
//!
//! Every bot also needs `http-client` for the REST requester.
//!
//! ```ignore
//! use bronze_runtime::Bot;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Bot::load()?;
//!     bot.on_text(|msg| async move {
//!         tracing::info!(content = msg.plain_text(), "text");
//!     });
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;

// Re-exports
pub use bot::{Bot, Hook};
pub use config::{BronzeConfig, ConfigError, ConfigLoader, ConfigResult, load_config};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by bot code
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
