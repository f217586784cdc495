use serde::{Deserialize, Serialize};

use crate::models::{
    Attachment, GuildMember, PlatformEmbed, PlatformMessage, ReactionEmoji, snapshot_content,
    snapshot_image,
};

/// Normalized events delivered by the gateway relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEvent {
    /// A message was posted
    MessageCreate(PlatformMessage),

    /// A message was edited, or the platform attached an embed to it
    MessageUpdate(MessageEdit),

    /// A single message was deleted
    MessageDelete(MessageDelete),

    /// Several messages were deleted at once by a moderator
    MessageDeleteBulk(MessageDeleteBulk),

    /// A user reacted to a message
    MessageReactionAdd(ReactionEvent),

    /// A user withdrew a reaction
    MessageReactionRemove(ReactionEvent),

    /// Every reaction was cleared from a message
    MessageReactionRemoveAll(ReactionClear),
}

impl GatewayEvent {
    /// Wire name, used to tag reported errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageCreate(_) => "MESSAGE_CREATE",
            Self::MessageUpdate(_) => "MESSAGE_UPDATE",
            Self::MessageDelete(_) => "MESSAGE_DELETE",
            Self::MessageDeleteBulk(_) => "MESSAGE_DELETE_BULK",
            Self::MessageReactionAdd(_) => "MESSAGE_REACTION_ADD",
            Self::MessageReactionRemove(_) => "MESSAGE_REACTION_REMOVE",
            Self::MessageReactionRemoveAll(_) => "MESSAGE_REACTION_REMOVE_ALL",
        }
    }

    /// Events outside a guild (direct messages) carry no guild id.
    pub fn guild_id(&self) -> Option<&str> {
        match self {
            Self::MessageCreate(m) => m.guild_id.as_deref(),
            Self::MessageUpdate(m) => m.guild_id.as_deref(),
            Self::MessageDelete(m) => m.guild_id.as_deref(),
            Self::MessageDeleteBulk(m) => m.guild_id.as_deref(),
            Self::MessageReactionAdd(r) | Self::MessageReactionRemove(r) => r.guild_id.as_deref(),
            Self::MessageReactionRemoveAll(r) => r.guild_id.as_deref(),
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::MessageCreate(m) => &m.channel_id,
            Self::MessageUpdate(m) => &m.channel_id,
            Self::MessageDelete(m) => &m.channel_id,
            Self::MessageDeleteBulk(m) => &m.channel_id,
            Self::MessageReactionAdd(r) | Self::MessageReactionRemove(r) => &r.channel_id,
            Self::MessageReactionRemoveAll(r) => &r.channel_id,
        }
    }

    /// Source message ids the event touches.
    pub fn message_ids(&self) -> Vec<&str> {
        match self {
            Self::MessageCreate(m) => vec![m.id.as_str()],
            Self::MessageUpdate(m) => vec![m.id.as_str()],
            Self::MessageDelete(m) => vec![m.id.as_str()],
            Self::MessageDeleteBulk(m) => m.ids.iter().map(String::as_str).collect(),
            Self::MessageReactionAdd(r) | Self::MessageReactionRemove(r) => {
                vec![r.message_id.as_str()]
            }
            Self::MessageReactionRemoveAll(r) => vec![r.message_id.as_str()],
        }
    }
}

/// Partial message carried by an update event; the author is not guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEdit {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub edited_timestamp: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<PlatformEmbed>,
}

impl MessageEdit {
    pub fn is_edit(&self) -> bool {
        self.edited_timestamp.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn snapshot_content(&self) -> String {
        snapshot_content(&self.content, &self.embeds)
    }

    pub fn snapshot_image(&self) -> Option<String> {
        snapshot_image(&self.attachments, &self.embeds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelete {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeleteBulk {
    pub ids: Vec<String>,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub user_id: String,
    pub channel_id: String,
    pub message_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub emoji: ReactionEmoji,
    /// Present on adds inside a guild.
    #[serde(default)]
    pub member: Option<GuildMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionClear {
    pub channel_id: String,
    pub message_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}
