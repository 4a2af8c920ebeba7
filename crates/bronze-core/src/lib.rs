//! # Bronze Core
//!
//! Foundation types for the Bronze bot framework.
//!
//! This crate owns everything the other layers agree on:
//!
//! - **Wire model**: gateway [`Frame`]s, [`Signal`]s and the untyped [`RawEvent`]
//! - **Typed model**: [`Message`] / [`MessageKind`] and the [`SystemEvent`] catalogue
//! - **Capabilities**: the [`Receiver`] and [`Requester`] traits composed by [`Gateway`]
//! - **Reply surface**: the per-message [`Context`]
//! - **Credentials**: the log-safe [`Secret`] wrapper
//! - **Errors**: [`TransportError`], [`ApiError`], [`DecodeError`]
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐  Value   ┌────────┐ RawEvent ┌─────────┐
//! │ Receiver │────────▶│ queue  │────────▶│ Message │──▶ handlers
//! └──────────┘          └────────┘          └─────────┘
//!                                               │ ctx
//!                                               ▼
//!                                          ┌──────────┐
//!                                          │Requester │──▶ platform
//!                                          └──────────┘
//! ```

pub mod context;
pub mod error;
pub mod event;
pub mod frame;
pub mod gateway;
pub mod message;
pub mod secret;

pub use context::{Context, SendOptions, SendReceipt};
pub use error::{
    ApiError, ApiResult, DecodeError, DecodeResult, TransportError, TransportResult,
};
pub use event::{EventType, SystemEvent, SystemEventKind, TypedEvent, UnknownEventType};
pub use frame::{ChannelType, Frame, MessageType, RawEvent, Signal};
pub use gateway::{
    EventReceiver, EventSender, Gateway, Method, Receiver, Requester, event_channel, paginate,
};
pub use message::{Attachment, MediaExtra, Message, MessageKind, TextExtra, User};
pub use secret::Secret;
