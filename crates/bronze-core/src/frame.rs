//! Wire-level types: gateway frames and the raw event payload.
//!
//! Every frame the platform sends has the shape `{ "s": <signal>, "sn": <seq>, "d": <data> }`.
//! Only `s == 0` frames carry deliverable events; their `d` object is what
//! receivers push onto the event queue and what [`RawEvent`] decodes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Frame
// ============================================================================

/// Gateway signal carried in the `s` field of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// A deliverable event.
    Event,
    /// Handshake result sent right after connecting.
    Hello,
    /// Client heartbeat.
    Ping,
    /// Server heartbeat answer.
    Pong,
    /// Client resume request.
    Resume,
    /// Server asks the client to reconnect from scratch.
    Reconnect,
    /// Server acknowledges a resume.
    ResumeAck,
}

impl Signal {
    /// Maps a raw `s` value to a signal.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Event,
            1 => Self::Hello,
            2 => Self::Ping,
            3 => Self::Pong,
            4 => Self::Resume,
            5 => Self::Reconnect,
            6 => Self::ResumeAck,
            _ => return None,
        })
    }

    /// Returns the raw `s` value.
    pub fn code(self) -> u8 {
        match self {
            Self::Event => 0,
            Self::Hello => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::Resume => 4,
            Self::Reconnect => 5,
            Self::ResumeAck => 6,
        }
    }
}

/// One decoded gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Signal discriminator.
    pub s: u8,
    /// Sequence number (event frames and heartbeats).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<u64>,
    /// Frame payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub d: Value,
}

impl Frame {
    /// Builds the liveness frame `{ "s": 2, "sn": <last_sn> }`.
    pub fn ping(last_sn: u64) -> Self {
        Self {
            s: Signal::Ping.code(),
            sn: Some(last_sn),
            d: Value::Null,
        }
    }

    /// Returns the decoded signal, if known.
    pub fn signal(&self) -> Option<Signal> {
        Signal::from_code(self.s)
    }

    /// Returns `true` for `s == 0` frames.
    pub fn is_event(&self) -> bool {
        self.s == 0
    }
}

// ============================================================================
// Message Type
// ============================================================================

/// Message type discriminator carried in the payload's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Image.
    Image,
    /// Video.
    Video,
    /// File.
    File,
    /// Audio.
    Audio,
    /// Markup (KMarkdown) text.
    Markup,
    /// Card message.
    Card,
    /// System event.
    System,
}

impl MessageType {
    /// Maps a raw integer to a message type.
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => Self::Text,
            2 => Self::Image,
            3 => Self::Video,
            4 => Self::File,
            8 => Self::Audio,
            9 => Self::Markup,
            10 => Self::Card,
            255 => Self::System,
            _ => return None,
        })
    }

    /// Returns the raw integer value.
    pub fn code(self) -> i64 {
        match self {
            Self::Text => 1,
            Self::Image => 2,
            Self::Video => 3,
            Self::File => 4,
            Self::Audio => 8,
            Self::Markup => 9,
            Self::Card => 10,
            Self::System => 255,
        }
    }

    /// Returns `true` for the types that can trigger commands.
    pub fn is_text_like(self) -> bool {
        matches!(self, Self::Text | Self::Markup | Self::Card)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Markup => "markup",
            Self::Card => "card",
            Self::System => "system",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Channel Type
// ============================================================================

/// Where a message was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    /// A guild text channel.
    #[default]
    Group,
    /// A private chat.
    Person,
    /// Broadcast message.
    Broadcast,
    /// Webhook verification handshake.
    WebhookChallenge,
    /// Any value this crate does not know about.
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Raw Event
// ============================================================================

/// The untyped payload of one event frame.
///
/// Created by a receiver, consumed exactly once by the client dispatch loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Raw message type (see [`MessageType::from_code`]).
    #[serde(rename = "type")]
    pub kind: i64,
    /// Channel type.
    #[serde(default)]
    pub channel_type: ChannelType,
    /// Channel id (guild messages) or recipient id (private messages).
    #[serde(default)]
    pub target_id: String,
    /// Author id (`"1"` for system events).
    #[serde(default)]
    pub author_id: String,
    /// Message content.
    #[serde(default)]
    pub content: String,
    /// Message id.
    #[serde(default)]
    pub msg_id: String,
    /// Millisecond timestamp.
    #[serde(default)]
    pub msg_timestamp: i64,
    /// Nonce echoed from the sender.
    #[serde(default)]
    pub nonce: String,
    /// Webhook verify token (push mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_token: Option<String>,
    /// Webhook challenge value (verification handshake only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    /// Type-specific fields.
    #[serde(default)]
    pub extra: Value,
}

impl RawEvent {
    /// Decodes the payload object of an event frame.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Returns the typed message type, or `None` for unknown discriminators.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ping_frame_serializes_without_payload() {
        let text = serde_json::to_string(&Frame::ping(42)).unwrap();
        assert_eq!(text, r#"{"s":2,"sn":42}"#);
    }

    #[test]
    fn event_frame_round_trip() {
        let frame: Frame =
            serde_json::from_value(json!({"s": 0, "sn": 7, "d": {"type": 1}})).unwrap();
        assert!(frame.is_event());
        assert_eq!(frame.sn, Some(7));
        assert_eq!(frame.signal(), Some(Signal::Event));
    }

    #[test]
    fn message_type_codes() {
        for code in [1, 2, 3, 4, 8, 9, 10, 255] {
            let ty = MessageType::from_code(code).unwrap();
            assert_eq!(ty.code(), code);
        }
        assert_eq!(MessageType::from_code(42), None);
        assert!(MessageType::Card.is_text_like());
        assert!(!MessageType::Image.is_text_like());
    }

    #[test]
    fn unknown_channel_type_is_tolerated() {
        let raw = RawEvent::from_value(json!({
            "type": 1,
            "channel_type": "SOMETHING_NEW",
            "content": "hi"
        }))
        .unwrap();
        assert_eq!(raw.channel_type, ChannelType::Unknown);
        assert_eq!(raw.message_type(), Some(MessageType::Text));
    }
}
