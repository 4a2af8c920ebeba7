//! # Bronze Framework
//!
//! Everything between the raw event queue and user code.
//!
//! This layer provides:
//! - [`Client`]: the dispatch loop that classifies payloads and fans them out
//! - [`CommandManager`]: prefix/trigger and regex commands with typed
//!   parameters and gating rules
//! - [`EventManager`]: typed system-event handlers
//! - Supervised task spawning, so a failing handler never stops dispatch
//!
//! Handlers are async closures; see [`handler`] for what they may return.

pub mod client;
pub mod command;
pub mod error;
pub mod event_manager;
pub mod handler;
pub mod task;

pub use client::Client;
pub use command::{
    Args, BoxedRule, Command, CommandBuilder, CommandInfo, CommandManager, CommandOutcome,
    ConvertError, ConverterRegistry, DEFAULT_PREFIXES, Mention, Param, Rule, rules,
};
pub use error::{
    BoxError, CommandError, EventRegisterError, LexError, ParseError, RegisterError,
    RegisterResult,
};
pub use event_manager::EventManager;
pub use handler::{HandlerFuture, HandlerReturn};
pub use task::{TaskLabel, spawn_supervised};
