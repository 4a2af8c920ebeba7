//! Typed messages.
//!
//! A [`RawEvent`] is classified by its `type` discriminator into a
//! [`Message`] whose [`MessageKind`] carries the kind-specific payload.
//! Discriminators without a variant here (audio, anything unknown) are not
//! messages and are dropped by the caller.

use std::sync::Weak;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{Context, SendReceipt};
use crate::error::ApiResult;
use crate::event::SystemEvent;
use crate::frame::{ChannelType, MessageType, RawEvent};
use crate::gateway::Gateway;

/// A platform user as embedded in message extras.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// User id.
    pub id: String,
    /// Global username.
    pub username: String,
    /// Guild nickname.
    pub nickname: String,
    /// Four-digit discriminator.
    pub identify_num: String,
    /// Avatar URL.
    pub avatar: String,
    /// Whether this is a bot account.
    pub bot: bool,
}

/// Extra fields of text, markup and card messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextExtra {
    /// Guild id (empty in private chats).
    pub guild_id: String,
    /// Channel name.
    pub channel_name: String,
    /// Mentioned user ids.
    pub mention: Vec<String>,
    /// Whether `@all` is mentioned.
    pub mention_all: bool,
    /// Mentioned role ids.
    pub mention_roles: Vec<i64>,
    /// Whether `@here` is mentioned.
    pub mention_here: bool,
    /// Author profile.
    pub author: Option<User>,
}

/// A file attached to a media message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    /// Attachment kind (`image`, `video`, `file`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Hosted URL.
    pub url: String,
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Extra fields of image, video and file messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaExtra {
    /// Guild id (empty in private chats).
    pub guild_id: String,
    /// The attached file.
    pub attachments: Option<Attachment>,
    /// Author profile.
    pub author: Option<User>,
}

/// Kind-specific message payload.
#[derive(Debug, Clone)]
pub enum MessageKind {
    /// Plain text.
    Text(TextExtra),
    /// Markup text.
    Markup(TextExtra),
    /// Card message.
    Card(TextExtra),
    /// Image.
    Image(MediaExtra),
    /// Video.
    Video(MediaExtra),
    /// File.
    File(MediaExtra),
    /// System event.
    System(SystemEvent),
}

/// A classified inbound message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message id.
    pub msg_id: String,
    /// Message type.
    pub msg_type: MessageType,
    /// Channel type.
    pub channel_type: ChannelType,
    /// Channel id (or recipient id in private chats).
    pub target_id: String,
    /// Author id.
    pub author_id: String,
    /// Raw content.
    pub content: String,
    /// Millisecond timestamp.
    pub timestamp: i64,
    /// Sender nonce.
    pub nonce: String,
    /// Kind-specific payload.
    pub kind: MessageKind,
    ctx: Context,
}

impl Message {
    /// Classifies a raw event.
    ///
    /// Returns `Ok(None)` when the discriminator maps to no message variant.
    /// Fails when the `extra` object does not fit the selected variant.
    pub fn from_raw(raw: RawEvent, gateway: Weak<Gateway>) -> serde_json::Result<Option<Self>> {
        let Some(msg_type) = raw.message_type() else {
            return Ok(None);
        };

        let kind = match msg_type {
            MessageType::Text => MessageKind::Text(text_extra(raw.extra)?),
            MessageType::Markup => MessageKind::Markup(text_extra(raw.extra)?),
            MessageType::Card => MessageKind::Card(text_extra(raw.extra)?),
            MessageType::Image => MessageKind::Image(media_extra(raw.extra)?),
            MessageType::Video => MessageKind::Video(media_extra(raw.extra)?),
            MessageType::File => MessageKind::File(media_extra(raw.extra)?),
            MessageType::System => MessageKind::System(SystemEvent::from_extra(raw.extra)?),
            MessageType::Audio => return Ok(None),
        };

        let guild_id = match &kind {
            MessageKind::Text(extra) | MessageKind::Markup(extra) | MessageKind::Card(extra) => {
                non_empty(&extra.guild_id)
            }
            MessageKind::Image(extra) | MessageKind::Video(extra) | MessageKind::File(extra) => {
                non_empty(&extra.guild_id)
            }
            MessageKind::System(_) => None,
        };

        let ctx = Context::new(
            gateway,
            raw.channel_type,
            raw.target_id.clone(),
            raw.author_id.clone(),
            raw.msg_id.clone(),
            guild_id,
        );

        Ok(Some(Self {
            msg_id: raw.msg_id,
            msg_type,
            channel_type: raw.channel_type,
            target_id: raw.target_id,
            author_id: raw.author_id,
            content: raw.content,
            timestamp: raw.msg_timestamp,
            nonce: raw.nonce,
            kind,
            ctx,
        }))
    }

    /// Returns the reply context bound to this message.
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    /// Returns the raw content.
    pub fn plain_text(&self) -> &str {
        &self.content
    }

    /// Returns `true` for text, markup and card messages.
    pub fn is_text_like(&self) -> bool {
        self.msg_type.is_text_like()
    }

    /// Returns `true` for system events.
    pub fn is_system(&self) -> bool {
        matches!(self.kind, MessageKind::System(_))
    }

    /// Returns the system event, if this is one.
    pub fn system_event(&self) -> Option<&SystemEvent> {
        match &self.kind {
            MessageKind::System(event) => Some(event),
            _ => None,
        }
    }

    fn text_extra(&self) -> Option<&TextExtra> {
        match &self.kind {
            MessageKind::Text(extra) | MessageKind::Markup(extra) | MessageKind::Card(extra) => {
                Some(extra)
            }
            _ => None,
        }
    }

    /// Returns the author profile, if embedded.
    pub fn author(&self) -> Option<&User> {
        match &self.kind {
            MessageKind::Text(extra) | MessageKind::Markup(extra) | MessageKind::Card(extra) => {
                extra.author.as_ref()
            }
            MessageKind::Image(extra) | MessageKind::Video(extra) | MessageKind::File(extra) => {
                extra.author.as_ref()
            }
            MessageKind::System(_) => None,
        }
    }

    /// Returns the guild id, if the message was posted in a guild.
    pub fn guild_id(&self) -> Option<&str> {
        self.ctx.guild_id()
    }

    /// Returns the mentioned user ids.
    pub fn mentions(&self) -> &[String] {
        self.text_extra().map_or(&[], |extra| extra.mention.as_slice())
    }

    /// Returns `true` when the message mentions `@all`.
    pub fn mentions_all(&self) -> bool {
        self.text_extra().is_some_and(|extra| extra.mention_all)
    }

    /// Shorthand for [`Context::reply`].
    pub async fn reply(&self, content: impl Into<String>) -> ApiResult<SendReceipt> {
        self.ctx.reply(content).await
    }
}

fn text_extra(extra: Value) -> serde_json::Result<TextExtra> {
    if extra.is_null() {
        return Ok(TextExtra::default());
    }
    serde_json::from_value(extra)
}

fn media_extra(extra: Value) -> serde_json::Result<MediaExtra> {
    if extra.is_null() {
        return Ok(MediaExtra::default());
    }
    serde_json::from_value(extra)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(value: Value) -> Option<Message> {
        let raw = RawEvent::from_value(value).unwrap();
        Message::from_raw(raw, Weak::new()).unwrap()
    }

    #[test]
    fn text_message_carries_extras() {
        let msg = classify(json!({
            "type": 1,
            "channel_type": "GROUP",
            "target_id": "chan",
            "author_id": "u1",
            "content": "hello",
            "msg_id": "m1",
            "msg_timestamp": 1700000000000i64,
            "extra": {
                "guild_id": "g1",
                "mention": ["u2"],
                "author": {"id": "u1", "username": "alice", "bot": false}
            }
        }))
        .unwrap();

        assert!(msg.is_text_like());
        assert_eq!(msg.plain_text(), "hello");
        assert_eq!(msg.guild_id(), Some("g1"));
        assert_eq!(msg.mentions(), ["u2".to_string()]);
        assert_eq!(msg.author().unwrap().username, "alice");
        assert_eq!(msg.ctx().msg_id(), "m1");
    }

    #[test]
    fn audio_and_unknown_types_are_not_messages() {
        assert!(classify(json!({"type": 8})).is_none());
        assert!(classify(json!({"type": 77})).is_none());
    }

    #[test]
    fn system_message_decodes_event() {
        let msg = classify(json!({
            "type": 255,
            "author_id": "1",
            "extra": {
                "type": "deleted_message",
                "body": {"channel_id": "c", "msg_id": "m"}
            }
        }))
        .unwrap();
        assert!(msg.is_system());
        assert!(!msg.is_text_like());
        assert_eq!(msg.system_event().unwrap().name, "deleted_message");
    }

    #[test]
    fn image_message_has_attachment() {
        let msg = classify(json!({
            "type": 2,
            "content": "https://img/x.png",
            "extra": {"attachments": {"type": "image", "url": "https://img/x.png", "name": "x.png"}}
        }))
        .unwrap();
        match &msg.kind {
            MessageKind::Image(extra) => {
                assert_eq!(extra.attachments.as_ref().unwrap().name, "x.png");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
