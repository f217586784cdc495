//! Database row types — these map directly to SQLite rows.
//! Distinct from starboard-types models to keep the DB layer independent.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub mirror_id: String,
    pub author_id: String,
    pub channel_id: String,
    pub guild_id: String,
    pub content: String,
    pub image: Option<String>,
}

/// Columns an edit may touch. `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub mirror_id: Option<String>,
    pub content: Option<String>,
    pub image: Option<Option<String>>,
}

impl MessagePatch {
    pub fn is_empty(&self) -> bool {
        self.mirror_id.is_none() && self.content.is_none() && self.image.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub bot: bool,
}

/// Exclusions applied when computing a message's score.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountFilter<'a> {
    /// Skip the row belonging to this user (the message author).
    pub exclude_user: Option<&'a str>,
    pub exclude_bots: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    User,
    Channel,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::User => "user",
            BlockKind::Channel => "channel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(BlockKind::User),
            "channel" => Some(BlockKind::Channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub guild_id: String,
    pub kind: BlockKind,
    pub id: String,
}
