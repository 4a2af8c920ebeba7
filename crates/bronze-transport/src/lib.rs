//! # Bronze Transport
//!
//! Concrete receivers, the REST requester and the wire codec for the Bronze
//! bot framework.
//!
//! ## Features
//!
//! - `ws-client`: [`SocketReceiver`], the outbound websocket session
//! - `http-server`: [`PushReceiver`], the inbound webhook route
//! - `http-client`: [`HttpRequester`], the rate-limited REST client
//! - `full`: all of the above
//!
//! The [`Codec`], [`RateLimiter`] and [`DedupWindow`] are always available.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  bronze-framework   │  (client dispatch, commands)
//! ├─────────────────────┤
//! │  bronze-core        │  (Receiver / Requester traits, Gateway)
//! ├─────────────────────┤
//! │  bronze-transport   │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```

pub mod codec;
pub mod dedup;
pub mod ratelimit;

#[cfg(feature = "http-server")]
pub mod push;

#[cfg(feature = "http-client")]
pub mod requester;

#[cfg(feature = "ws-client")]
pub mod socket;

pub use codec::Codec;
pub use dedup::DedupWindow;
pub use ratelimit::{RateLimitHeaders, RateLimiter};

#[cfg(feature = "http-server")]
pub use push::{PushConfig, PushOutcome, PushReceiver, Rejection};

#[cfg(feature = "http-client")]
pub use requester::{HttpRequester, RequesterConfig};

#[cfg(feature = "ws-client")]
pub use socket::{Backoff, RetryPolicy, SocketConfig, SocketReceiver};
