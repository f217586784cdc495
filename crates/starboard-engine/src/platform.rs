//! The chat platform as the engine sees it.

use async_trait::async_trait;
use thiserror::Error;

use starboard_types::card::Card;
use starboard_types::models::{GuildMember, Permission, PlatformChannel, PlatformMessage, PlatformUser};
use starboard_types::settings::Emoji;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The target (message, card, channel, member) does not exist.
    #[error("not found")]
    NotFound,

    #[error("missing access")]
    Forbidden,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Id of the account the engine acts as.
    fn current_user_id(&self) -> &str;

    /// Post a card. Returns the new card's message id.
    async fn send_card(&self, channel_id: &str, card: &Card) -> Result<String, PlatformError>;

    /// Replace a posted card. `NotFound` when the card was deleted upstream.
    async fn edit_card(&self, channel_id: &str, card_id: &str, card: &Card) -> Result<(), PlatformError>;

    async fn delete_card(&self, channel_id: &str, card_id: &str) -> Result<(), PlatformError>;

    async fn bulk_delete_cards(&self, channel_id: &str, card_ids: &[String]) -> Result<(), PlatformError>;

    /// One page of users who reacted with `emoji`, ordered by id, starting
    /// after the `after` cursor.
    async fn list_reacting_users(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &Emoji,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<PlatformUser>, PlatformError>;

    async fn fetch_message(&self, channel_id: &str, message_id: &str) -> Result<PlatformMessage, PlatformError>;

    async fn fetch_channel(&self, channel_id: &str) -> Result<PlatformChannel, PlatformError>;

    async fn fetch_guild_channels(&self, guild_id: &str) -> Result<Vec<PlatformChannel>, PlatformError>;

    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> Result<GuildMember, PlatformError>;

    /// Whether the current user holds `permission` in the channel.
    async fn has_permission(&self, channel_id: &str, permission: Permission) -> Result<bool, PlatformError>;

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &Emoji) -> Result<(), PlatformError>;

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &Emoji,
        user_id: &str,
    ) -> Result<(), PlatformError>;

    /// Post a plain text message. Returns its id.
    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String, PlatformError>;
}
