use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds between the Unix epoch and the platform epoch (2015-01-01).
pub const PLATFORM_EPOCH_MS: i64 = 1_420_070_400_000;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Creation time embedded in a snowflake identifier.
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.parse().ok()?;
    let ms = (raw >> 22) as i64 + PLATFORM_EPOCH_MS;
    Utc.timestamp_millis_opt(ms).single()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMember {
    pub user: PlatformUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl Attachment {
    /// Attachments carry dimensions only when the platform decoded them as images.
    pub fn is_image(&self) -> bool {
        if self.width.is_some() && self.height.is_some() {
            return true;
        }

        let name = if self.filename.is_empty() { &self.url } else { &self.filename };
        let name = name.split('?').next().unwrap_or_default();
        name.rsplit_once('.')
            .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformEmbed {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<EmbedMedia>,
    #[serde(default)]
    pub thumbnail: Option<EmbedMedia>,
}

/// Emoji identity as the platform reports it on a reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEmoji {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionCount {
    pub count: u32,
    pub emoji: ReactionEmoji,
}

/// A message as fetched from, or delivered by, the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: PlatformUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub edited_timestamp: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<PlatformEmbed>,
    #[serde(default)]
    pub reactions: Vec<ReactionCount>,
}

impl PlatformMessage {
    pub fn snapshot_content(&self) -> String {
        snapshot_content(&self.content, &self.embeds)
    }

    pub fn snapshot_image(&self) -> Option<String> {
        snapshot_image(&self.attachments, &self.embeds)
    }

    /// Build the snapshot the engine caches and persists. The guild id comes
    /// from the caller because fetched messages do not always carry it.
    pub fn to_snapshot(&self, guild_id: &str) -> MessageSnapshot {
        MessageSnapshot {
            id: self.id.clone(),
            author_id: self.author.id.clone(),
            channel_id: self.channel_id.clone(),
            guild_id: guild_id.to_string(),
            content: self.snapshot_content(),
            image: self.snapshot_image(),
        }
    }
}

/// Text shown for a message: its content, or the first embed description
/// when the message has no text of its own.
pub fn snapshot_content(content: &str, embeds: &[PlatformEmbed]) -> String {
    if !content.is_empty() {
        return content.to_string();
    }

    embeds
        .iter()
        .find_map(|e| e.description.clone())
        .unwrap_or_default()
}

/// First image attachment, else the first embed image or thumbnail.
pub fn snapshot_image(attachments: &[Attachment], embeds: &[PlatformEmbed]) -> Option<String> {
    if let Some(a) = attachments.iter().find(|a| a.is_image()) {
        return Some(a.url.clone());
    }

    embeds.iter().find_map(|e| {
        e.image
            .as_ref()
            .or(e.thumbnail.as_ref())
            .map(|m| m.url.clone())
    })
}

/// Last-known content of a source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub id: String,
    pub author_id: String,
    pub channel_id: String,
    pub guild_id: String,
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformChannel {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub position: i32,
}

impl PlatformChannel {
    pub const GUILD_TEXT: u8 = 0;
    pub const GUILD_ANNOUNCEMENT: u8 = 5;

    pub fn is_text(&self) -> bool {
        self.kind == Self::GUILD_TEXT || self.kind == Self::GUILD_ANNOUNCEMENT
    }
}

/// Channel permissions the engine checks before acting on its own behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    AddReactions,
    ManageMessages,
}

impl Permission {
    pub fn bits(self) -> u64 {
        match self {
            Permission::AddReactions => 1 << 6,
            Permission::ManageMessages => 1 << 13,
        }
    }
}
