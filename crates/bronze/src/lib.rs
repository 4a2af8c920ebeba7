//! # Bronze
//!
//! An async bot framework for the KOOK chat platform.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  raw events  ┌────────┐──▶ raw / text / system listeners
//! │   Receiver   │─────────────▶│ Client │──▶ CommandManager (lex, parse, rules)
//! │ socket│push  │    queue     │        │──▶ EventManager (typed system events)
//! └──────────────┘              └────────┘
//!        ▲                           │ handlers reply through Context
//!        │ gateway/index             ▼
//! ┌──────────────────────────────────────┐
//! │ Requester (HTTP, rate limited)       │
//! └──────────────────────────────────────┘
//! ```
//!
//! - **Receiver**: the websocket session or the webhook route; decodes frames
//!   and queues event payloads
//! - **Client**: drains the queue and launches every handler as its own task
//! - **Commands**: prefix or regex triggers, typed parameters, gating rules
//! - **Bot**: owns all of the above and the process lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bronze::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Bot::load()?;
//!
//!     bot.command(
//!         Command::builder("roll")
//!             .param::<i64>("low")
//!             .param::<i64>("high")
//!             .handler(|msg: Message, args: Args| async move {
//!                 let low = args.value::<i64>("low").copied().unwrap_or(1);
//!                 let high = args.value::<i64>("high").copied().unwrap_or(6);
//!                 msg.reply(format!("rolling {low}..={high}")).await
//!             }),
//!     )?;
//!
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `full` (default): websocket, webhook and HTTP requester support
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines

pub use bronze_core as core;
pub use bronze_framework as framework;
pub use bronze_runtime as runtime;
pub use bronze_transport as transport;

/// Commonly used types for building a bot.
///
/// ```rust,ignore
/// use bronze::prelude::*;
/// ```
pub mod prelude {
    // Entry point
    pub use bronze_runtime::{Bot, BronzeConfig, ConfigLoader, RuntimeError, RuntimeResult};

    // Commands
    pub use bronze_framework::{Args, Command, CommandBuilder, Mention, Rule, rules};

    // Messages and replies
    pub use bronze_core::{
        ApiError, ChannelType, Context, Message, MessageKind, MessageType, SendOptions, User,
    };

    // System events
    pub use bronze_core::event::*;

    // Logging macros
    pub use bronze_runtime::prelude::*;
}
