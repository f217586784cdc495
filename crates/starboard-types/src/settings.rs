use serde::{Deserialize, Serialize};

use crate::models::ReactionEmoji;

pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const STAR_GLYPH: &str = "⭐";

/// Stored value that explicitly turns a mirror channel off.
pub const CHANNEL_DISABLED: &str = "none";

/// The reaction a guild counts as a star.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub name: String,
    /// Literal glyph for unicode emoji; empty for custom emoji.
    #[serde(default)]
    pub unicode: String,
    /// Custom emoji id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl Default for Emoji {
    fn default() -> Self {
        Self {
            name: "star".into(),
            unicode: STAR_GLYPH.into(),
            id: None,
            animated: false,
        }
    }
}

impl Emoji {
    pub fn is_custom(&self) -> bool {
        self.id.is_some()
    }

    /// Custom emoji match by id, unicode emoji by glyph.
    pub fn matches(&self, reaction: &ReactionEmoji) -> bool {
        match &reaction.id {
            Some(id) => self.id.as_deref() == Some(id.as_str()),
            None => reaction.name.as_deref() == Some(self.unicode.as_str()),
        }
    }

    pub fn icon_url(&self) -> Option<String> {
        let ext = if self.animated { "gif" } else { "png" };
        self.id
            .as_ref()
            .map(|id| format!("https://cdn.discordapp.com/emojis/{}.{}", id, ext))
    }

    /// Form used in reaction REST paths.
    pub fn api_name(&self) -> String {
        match &self.id {
            Some(id) => format!("{}:{}", self.name, id),
            None => self.unicode.clone(),
        }
    }
}

/// Where a guild's mirror cards go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorChannel {
    /// Unset: fall back to the guild's default channel lookup.
    #[default]
    Default,
    Disabled,
    Channel(String),
}

impl MirrorChannel {
    pub fn from_stored(value: Option<String>) -> Self {
        match value {
            None => Self::Default,
            Some(v) if v.is_empty() => Self::Default,
            Some(v) if v == CHANNEL_DISABLED => Self::Disabled,
            Some(v) => Self::Channel(v),
        }
    }

    pub fn to_stored(&self) -> Option<String> {
        match self {
            Self::Default => None,
            Self::Disabled => Some(CHANNEL_DISABLED.to_string()),
            Self::Channel(id) => Some(id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    /// Exclude messages whose author or channel is listed.
    #[default]
    Blacklist,
    /// Include only messages whose author or channel is listed.
    Whitelist,
}

impl BlockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::Whitelist => "whitelist",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "blacklist" => Some(Self::Blacklist),
            "whitelist" => Some(Self::Whitelist),
            _ => None,
        }
    }

    /// Apply the mode to the number of block entries matching a message.
    pub fn is_blocked(&self, matches: u64) -> bool {
        match self {
            Self::Blacklist => matches > 0,
            Self::Whitelist => matches == 0,
        }
    }
}

/// Per-guild configuration consumed by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub language: String,
    pub minimum: i64,
    pub self_star: bool,
    pub self_star_warning: bool,
    pub emoji: Emoji,
    pub channel: MirrorChannel,
    pub nsfw_channel: MirrorChannel,
    pub minimal: bool,
    pub remove_bot_stars: bool,
    pub save_deleted_messages: bool,
    pub block_mode: BlockMode,
    /// Percent chance (0-100) that the bot stars a new message itself.
    pub random_star_probability: f64,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.into(),
            minimum: 1,
            self_star: false,
            self_star_warning: false,
            emoji: Emoji::default(),
            channel: MirrorChannel::Default,
            nsfw_channel: MirrorChannel::Default,
            minimal: false,
            remove_bot_stars: true,
            save_deleted_messages: false,
            block_mode: BlockMode::Blacklist,
            random_star_probability: 0.0,
        }
    }
}

impl GuildSettings {
    pub fn mirror_channel(&self, nsfw: bool) -> &MirrorChannel {
        if nsfw { &self.nsfw_channel } else { &self.channel }
    }
}
