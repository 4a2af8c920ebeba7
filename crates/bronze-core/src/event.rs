//! System events.
//!
//! A system message (`type == 255`) carries `extra = { "type": <name>, "body": {...} }`.
//! The name selects one entry of a fixed lookup table; the body is decoded
//! into the matching strongly-typed struct, which exposes only the fields
//! relevant to that event.
//!
//! ```text
//! SystemEvent { name, kind }
//! └── SystemEventKind
//!     ├── AddedReaction(AddedReaction { channel_id, emoji, user_id, msg_id })
//!     ├── UpdatedMessage(UpdatedMessage { .. })
//!     ├── ...
//!     └── Unknown { body }
//! ```
//!
//! Handlers that want one concrete event use [`TypedEvent::from_kind`]:
//!
//! ```rust,ignore
//! if let Some(reaction) = AddedReaction::from_kind(&event.kind) {
//!     println!("{} reacted with {}", reaction.user_id, reaction.emoji.name);
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::User;

// ============================================================================
// Shared body types
// ============================================================================

/// An emoji as reported in reaction events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Emoji {
    /// Emoji id (unicode codepoint string or custom emoji id).
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Channel description used by channel CRUD events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelInfo {
    /// Channel id.
    pub id: String,
    /// Channel name.
    pub name: String,
    /// Creator id.
    pub user_id: String,
    /// Owning guild id.
    pub guild_id: String,
    /// Channel topic.
    pub topic: String,
    /// Whether this is a category.
    pub is_category: bool,
    /// Parent category id.
    pub parent_id: String,
    /// Sort level.
    pub level: i64,
    /// Slow-mode interval in milliseconds.
    pub slow_mode: i64,
    /// Channel kind (1 text, 2 voice).
    #[serde(rename = "type")]
    pub kind: i64,
}

/// Role description used by role CRUD events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleInfo {
    /// Role id.
    pub role_id: i64,
    /// Role name.
    pub name: String,
    /// Display color.
    pub color: i64,
    /// Sort position.
    pub position: i64,
    /// Whether members are listed separately.
    pub hoist: i64,
    /// Whether the role can be mentioned.
    pub mentionable: i64,
    /// Permission bit set.
    pub permissions: i64,
}

/// Guild description used by guild update/delete events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildInfo {
    /// Guild id.
    pub id: String,
    /// Guild name.
    pub name: String,
    /// Owner id.
    pub user_id: String,
    /// Icon URL.
    pub icon: String,
    /// Notification setting.
    pub notify_type: i64,
    /// Voice region.
    pub region: String,
    /// Whether the guild is public.
    pub enable_open: bool,
    /// Public id.
    pub open_id: String,
    /// Default channel.
    pub default_channel_id: String,
    /// Welcome channel.
    pub welcome_channel_id: String,
}

// ============================================================================
// Event bodies
// ============================================================================

/// A reaction was added to a channel message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddedReaction {
    /// Channel of the reacted message.
    pub channel_id: String,
    /// The reaction emoji.
    pub emoji: Emoji,
    /// User who reacted.
    pub user_id: String,
    /// Reacted message.
    pub msg_id: String,
}

/// A reaction was removed from a channel message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletedReaction {
    /// Channel of the reacted message.
    pub channel_id: String,
    /// The reaction emoji.
    pub emoji: Emoji,
    /// User whose reaction was removed.
    pub user_id: String,
    /// Reacted message.
    pub msg_id: String,
}

/// A reaction was added to a private message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivateAddedReaction {
    /// The reaction emoji.
    pub emoji: Emoji,
    /// User who reacted.
    pub user_id: String,
    /// Private chat code.
    pub chat_code: String,
    /// Reacted message.
    pub msg_id: String,
}

/// A reaction was removed from a private message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivateDeletedReaction {
    /// The reaction emoji.
    pub emoji: Emoji,
    /// User whose reaction was removed.
    pub user_id: String,
    /// Private chat code.
    pub chat_code: String,
    /// Reacted message.
    pub msg_id: String,
}

/// A channel message was edited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatedMessage {
    /// Channel id.
    pub channel_id: String,
    /// New content.
    pub content: String,
    /// Mentioned user ids.
    pub mention: Vec<String>,
    /// Whether `@all` is mentioned.
    pub mention_all: bool,
    /// Whether `@here` is mentioned.
    pub mention_here: bool,
    /// Mentioned role ids.
    pub mention_roles: Vec<i64>,
    /// Edit time (ms).
    pub updated_at: i64,
    /// Edited message.
    pub msg_id: String,
}

/// A channel message was deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletedMessage {
    /// Channel id.
    pub channel_id: String,
    /// Deleted message.
    pub msg_id: String,
}

/// A private message was edited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatedPrivateMessage {
    /// Edited message.
    pub msg_id: String,
    /// Author id.
    pub author_id: String,
    /// Recipient id.
    pub target_id: String,
    /// New content.
    pub content: String,
    /// Private chat code.
    pub chat_code: String,
    /// Edit time (ms).
    pub updated_at: i64,
}

/// A private message was deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletedPrivateMessage {
    /// Private chat code.
    pub chat_code: String,
    /// Deleted message.
    pub msg_id: String,
    /// Author id.
    pub author_id: String,
    /// Recipient id.
    pub target_id: String,
    /// Deletion time (ms).
    pub deleted_at: i64,
}

/// A message was pinned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinnedMessage {
    /// Channel id.
    pub channel_id: String,
    /// User who pinned.
    pub operator_id: String,
    /// Pinned message.
    pub msg_id: String,
}

/// A message was unpinned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpinnedMessage {
    /// Channel id.
    pub channel_id: String,
    /// User who unpinned.
    pub operator_id: String,
    /// Unpinned message.
    pub msg_id: String,
}

/// A channel was created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddedChannel(pub ChannelInfo);

/// A channel was modified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdatedChannel(pub ChannelInfo);

/// A channel was deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletedChannel {
    /// Channel id.
    pub id: String,
    /// Deletion time (ms).
    pub deleted_at: i64,
}

/// A role was created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddedRole(pub RoleInfo);

/// A role was modified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdatedRole(pub RoleInfo);

/// A role was deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeletedRole(pub RoleInfo);

/// Guild settings changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdatedGuild(pub GuildInfo);

/// The guild was deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeletedGuild(pub GuildInfo);

/// Users were added to the guild block list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddedBlockList {
    /// Acting user.
    pub operator_id: String,
    /// Reason.
    pub remark: String,
    /// Blocked users.
    pub user_id: Vec<String>,
}

/// Users were removed from the guild block list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletedBlockList {
    /// Acting user.
    pub operator_id: String,
    /// Unblocked users.
    pub user_id: Vec<String>,
}

/// A user joined the guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinedGuild {
    /// Joining user.
    pub user_id: String,
    /// Join time (ms).
    pub joined_at: i64,
}

/// A user left the guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitedGuild {
    /// Leaving user.
    pub user_id: String,
    /// Leave time (ms).
    pub exited_at: i64,
}

/// A member's guild profile changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatedGuildMember {
    /// Member id.
    pub user_id: String,
    /// New nickname.
    pub nickname: String,
}

/// A member came online.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildMemberOnline {
    /// Member id.
    pub user_id: String,
    /// Event time (ms).
    pub event_time: i64,
    /// Guilds shared with the bot.
    pub guilds: Vec<String>,
}

/// A member went offline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildMemberOffline {
    /// Member id.
    pub user_id: String,
    /// Event time (ms).
    pub event_time: i64,
    /// Guilds shared with the bot.
    pub guilds: Vec<String>,
}

/// A user joined a voice channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinedChannel {
    /// Joining user.
    pub user_id: String,
    /// Voice channel.
    pub channel_id: String,
    /// Join time (ms).
    pub joined_at: i64,
}

/// A user left a voice channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitedChannel {
    /// Leaving user.
    pub user_id: String,
    /// Voice channel.
    pub channel_id: String,
    /// Leave time (ms).
    pub exited_at: i64,
}

/// A user changed their global profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserUpdated {
    /// User id.
    pub user_id: String,
    /// New username.
    pub username: String,
    /// New avatar URL.
    pub avatar: String,
}

/// The bot joined a guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfJoinedGuild {
    /// Guild id.
    pub guild_id: String,
}

/// The bot left a guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfExitedGuild {
    /// Guild id.
    pub guild_id: String,
}

/// A button on a card message was clicked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageBtnClick {
    /// Message holding the button.
    pub msg_id: String,
    /// User who clicked.
    pub user_id: String,
    /// Button value.
    pub value: String,
    /// Channel (or user for private chats) holding the message.
    pub target_id: String,
    /// Clicking user's profile.
    pub user_info: Option<User>,
}

// ============================================================================
// Lookup table
// ============================================================================

/// Implemented by every concrete system event body.
pub trait TypedEvent: Clone + Send + Sync + 'static {
    /// The discriminator this body is decoded for.
    const EVENT_TYPE: EventType;

    /// Narrows a decoded event to this concrete body.
    fn from_kind(kind: &SystemEventKind) -> Option<&Self>;
}

macro_rules! system_events {
    ($( $variant:ident => $name:literal ),* $(,)?) => {
        /// Closed set of known system event discriminators.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventType {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )*
        }

        impl EventType {
            /// Every known event type.
            pub const ALL: &'static [EventType] = &[$(EventType::$variant),*];

            /// Returns the wire name.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventType::$variant => $name,)*
                }
            }
        }

        impl FromStr for EventType {
            type Err = UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(EventType::$variant),)*
                    other => Err(UnknownEventType(other.to_string())),
                }
            }
        }

        /// A decoded system event body.
        #[derive(Debug, Clone)]
        pub enum SystemEventKind {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant($variant),
            )*
            /// A discriminator outside the known table.
            Unknown {
                /// The raw body.
                body: Value,
            },
        }

        impl SystemEventKind {
            /// Decodes a body using the discriminator lookup table.
            ///
            /// Unknown names yield [`SystemEventKind::Unknown`]; a known name
            /// whose body does not fit its struct is an error.
            pub fn decode(name: &str, body: Value) -> serde_json::Result<Self> {
                match name.parse::<EventType>() {
                    $(Ok(EventType::$variant) => {
                        Ok(SystemEventKind::$variant(serde_json::from_value(body)?))
                    })*
                    Err(_) => Ok(SystemEventKind::Unknown { body }),
                }
            }

            /// Returns the discriminator, or `None` for unknown events.
            pub fn event_type(&self) -> Option<EventType> {
                match self {
                    $(SystemEventKind::$variant(_) => Some(EventType::$variant),)*
                    SystemEventKind::Unknown { .. } => None,
                }
            }
        }

        $(
            impl TypedEvent for $variant {
                const EVENT_TYPE: EventType = EventType::$variant;

                fn from_kind(kind: &SystemEventKind) -> Option<&Self> {
                    match kind {
                        SystemEventKind::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

system_events! {
    AddedReaction => "added_reaction",
    DeletedReaction => "deleted_reaction",
    PrivateAddedReaction => "private_added_reaction",
    PrivateDeletedReaction => "private_deleted_reaction",
    UpdatedMessage => "updated_message",
    DeletedMessage => "deleted_message",
    UpdatedPrivateMessage => "updated_private_message",
    DeletedPrivateMessage => "deleted_private_message",
    PinnedMessage => "pinned_message",
    UnpinnedMessage => "unpinned_message",
    AddedChannel => "added_channel",
    UpdatedChannel => "updated_channel",
    DeletedChannel => "deleted_channel",
    AddedRole => "added_role",
    UpdatedRole => "updated_role",
    DeletedRole => "deleted_role",
    UpdatedGuild => "updated_guild",
    DeletedGuild => "deleted_guild",
    AddedBlockList => "added_block_list",
    DeletedBlockList => "deleted_block_list",
    JoinedGuild => "joined_guild",
    ExitedGuild => "exited_guild",
    UpdatedGuildMember => "updated_guild_member",
    GuildMemberOnline => "guild_member_online",
    GuildMemberOffline => "guild_member_offline",
    JoinedChannel => "joined_channel",
    ExitedChannel => "exited_channel",
    UserUpdated => "user_updated",
    SelfJoinedGuild => "self_joined_guild",
    SelfExitedGuild => "self_exited_guild",
    MessageBtnClick => "message_btn_click",
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an event type name outside the known table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown system event type '{0}'")]
pub struct UnknownEventType(pub String);

// ============================================================================
// SystemEvent
// ============================================================================

/// The system-event payload of a `type == 255` message.
#[derive(Debug, Clone)]
pub struct SystemEvent {
    /// The raw discriminator from `extra.type`.
    pub name: String,
    /// The decoded body.
    pub kind: SystemEventKind,
}

/// Shape of `extra` on system messages.
#[derive(Deserialize)]
struct SystemExtra {
    #[serde(rename = "type", default)]
    name: String,
    #[serde(default)]
    body: Value,
}

impl SystemEvent {
    /// Decodes the `extra` object of a system message.
    pub fn from_extra(extra: Value) -> serde_json::Result<Self> {
        let SystemExtra { name, body } = serde_json::from_value(extra)?;
        let kind = SystemEventKind::decode(&name, body)?;
        Ok(Self { name, kind })
    }

    /// Returns the known discriminator, if any.
    pub fn event_type(&self) -> Option<EventType> {
        self.kind.event_type()
    }

    /// Narrows to a concrete body.
    pub fn get<E: TypedEvent>(&self) -> Option<&E> {
        E::from_kind(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_added_reaction() {
        let event = SystemEvent::from_extra(json!({
            "type": "added_reaction",
            "body": {
                "channel_id": "c1",
                "emoji": {"id": "👍", "name": "👍"},
                "user_id": "u1",
                "msg_id": "m1"
            }
        }))
        .unwrap();

        assert_eq!(event.event_type(), Some(EventType::AddedReaction));
        let reaction = event.get::<AddedReaction>().unwrap();
        assert_eq!(reaction.channel_id, "c1");
        assert_eq!(reaction.emoji.name, "👍");
        assert_eq!(reaction.user_id, "u1");
        assert!(event.get::<DeletedReaction>().is_none());
    }

    #[test]
    fn unknown_type_is_kept_raw() {
        let event = SystemEvent::from_extra(json!({
            "type": "brand_new_event",
            "body": {"x": 1}
        }))
        .unwrap();
        assert_eq!(event.event_type(), None);
        assert!(matches!(event.kind, SystemEventKind::Unknown { .. }));
    }

    #[test]
    fn transparent_bodies_decode() {
        let event = SystemEvent::from_extra(json!({
            "type": "added_role",
            "body": {"role_id": 11, "name": "mods", "permissions": 8}
        }))
        .unwrap();
        let role = event.get::<AddedRole>().unwrap();
        assert_eq!(role.0.role_id, 11);
        assert_eq!(role.0.name, "mods");
    }

    #[test]
    fn event_type_names_round_trip() {
        for ty in EventType::ALL {
            assert_eq!(ty.as_str().parse::<EventType>().unwrap(), *ty);
        }
        assert!("nope".parse::<EventType>().is_err());
    }
}
