//! In-memory collaborators used by the engine's tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;

use starboard_db::Database;
use starboard_types::card::Card;
use starboard_types::models::{
    GuildMember, Permission, PlatformChannel, PlatformMessage, PlatformUser, ReactionCount,
    ReactionEmoji,
};
use starboard_types::settings::{Emoji, GuildSettings};

use crate::engine::Engine;
use crate::locale::Locales;
use crate::platform::{ChatPlatform, PlatformError};
use crate::settings::SettingsSource;

pub const BOT_ID: &str = "900";

#[derive(Default)]
pub struct MockState {
    pub messages: HashMap<String, PlatformMessage>,
    pub channels: HashMap<String, PlatformChannel>,
    /// user id -> is bot
    pub members: HashMap<String, bool>,
    pub manage_messages: bool,
    pub add_reactions: bool,
    /// message id -> users who reacted with the guild emoji
    pub reactors: HashMap<String, Vec<PlatformUser>>,
    /// card id -> (channel id, card)
    pub cards: HashMap<String, (String, Card)>,
    pub sent: u32,
    pub edits: u32,
    pub deleted: Vec<String>,
    pub bulk_deleted: Vec<Vec<String>>,
    pub removed_reactions: Vec<(String, String)>,
    pub added_reactions: Vec<String>,
    pub texts: Vec<(String, String)>,
    pub list_calls: u32,
    pub fetches: u32,
}

pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn add_channel(&self, channel: PlatformChannel) {
        self.state().channels.insert(channel.id.clone(), channel);
    }

    pub fn add_message(&self, message: PlatformMessage) {
        self.state().messages.insert(message.id.clone(), message);
    }

    /// Users reacting to `message_id` with `emoji`; also sets the platform's total.
    pub fn set_reactors(&self, message_id: &str, emoji: &Emoji, users: Vec<PlatformUser>) {
        let mut state = self.state();
        if let Some(m) = state.messages.get_mut(message_id) {
            m.reactions = vec![ReactionCount {
                count: users.len() as u32,
                emoji: reaction_emoji(emoji),
            }];
        }
        state.reactors.insert(message_id.to_string(), users);
    }

    pub fn card_in(&self, channel_id: &str) -> Vec<Card> {
        self.state()
            .cards
            .values()
            .filter(|(c, _)| c == channel_id)
            .map(|(_, card)| card.clone())
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    fn current_user_id(&self) -> &str {
        BOT_ID
    }

    async fn send_card(&self, channel_id: &str, card: &Card) -> Result<String, PlatformError> {
        let mut state = self.state();
        state.sent += 1;
        let id = format!("card{}", state.sent);
        state.cards.insert(id.clone(), (channel_id.to_string(), card.clone()));
        Ok(id)
    }

    async fn edit_card(&self, _channel_id: &str, card_id: &str, card: &Card) -> Result<(), PlatformError> {
        let mut state = self.state();
        let Some(entry) = state.cards.get_mut(card_id) else {
            return Err(PlatformError::NotFound);
        };
        entry.1 = card.clone();
        state.edits += 1;
        Ok(())
    }

    async fn delete_card(&self, _channel_id: &str, card_id: &str) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.deleted.push(card_id.to_string());
        state.cards.remove(card_id).map(|_| ()).ok_or(PlatformError::NotFound)
    }

    async fn bulk_delete_cards(&self, _channel_id: &str, card_ids: &[String]) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.bulk_deleted.push(card_ids.to_vec());
        for id in card_ids {
            state.cards.remove(id);
        }
        Ok(())
    }

    async fn list_reacting_users(
        &self,
        _channel_id: &str,
        message_id: &str,
        _emoji: &Emoji,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<PlatformUser>, PlatformError> {
        let mut state = self.state();
        state.list_calls += 1;

        let mut users = state.reactors.get(message_id).cloned().unwrap_or_default();
        users.sort_by(|a, b| a.id.cmp(&b.id));

        let start = match after {
            Some(cursor) => users.iter().position(|u| u.id == cursor).map_or(0, |i| i + 1),
            None => 0,
        };
        Ok(users.into_iter().skip(start).take(limit as usize).collect())
    }

    async fn fetch_message(&self, _channel_id: &str, message_id: &str) -> Result<PlatformMessage, PlatformError> {
        let mut state = self.state();
        state.fetches += 1;
        state.messages.get(message_id).cloned().ok_or(PlatformError::NotFound)
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<PlatformChannel, PlatformError> {
        self.state().channels.get(channel_id).cloned().ok_or(PlatformError::NotFound)
    }

    async fn fetch_guild_channels(&self, guild_id: &str) -> Result<Vec<PlatformChannel>, PlatformError> {
        Ok(self
            .state()
            .channels
            .values()
            .filter(|c| c.guild_id.as_deref() == Some(guild_id))
            .cloned()
            .collect())
    }

    async fn fetch_member(&self, _guild_id: &str, user_id: &str) -> Result<GuildMember, PlatformError> {
        let bot = *self.state().members.get(user_id).ok_or(PlatformError::NotFound)?;
        Ok(GuildMember { user: user(user_id, bot) })
    }

    async fn has_permission(&self, _channel_id: &str, permission: Permission) -> Result<bool, PlatformError> {
        let state = self.state();
        Ok(match permission {
            Permission::AddReactions => state.add_reactions,
            Permission::ManageMessages => state.manage_messages,
        })
    }

    async fn add_reaction(&self, _channel_id: &str, message_id: &str, _emoji: &Emoji) -> Result<(), PlatformError> {
        self.state().added_reactions.push(message_id.to_string());
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        _emoji: &Emoji,
        user_id: &str,
    ) -> Result<(), PlatformError> {
        self.state()
            .removed_reactions
            .push((message_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String, PlatformError> {
        let mut state = self.state();
        state.texts.push((channel_id.to_string(), content.to_string()));
        Ok(format!("text{}", state.texts.len()))
    }
}

pub fn reaction_emoji(emoji: &Emoji) -> ReactionEmoji {
    match &emoji.id {
        Some(id) => ReactionEmoji { id: Some(id.clone()), name: Some(emoji.name.clone()), animated: emoji.animated },
        None => ReactionEmoji { id: None, name: Some(emoji.unicode.clone()), animated: false },
    }
}

pub fn user(id: &str, bot: bool) -> PlatformUser {
    PlatformUser { id: id.to_string(), bot }
}

pub fn text_channel(id: &str, guild_id: &str, name: &str, nsfw: bool) -> PlatformChannel {
    PlatformChannel {
        id: id.to_string(),
        guild_id: Some(guild_id.to_string()),
        name: Some(name.to_string()),
        kind: PlatformChannel::GUILD_TEXT,
        nsfw,
        position: 0,
    }
}

pub fn message(id: &str, channel_id: &str, guild_id: &str, author_id: &str, content: &str) -> PlatformMessage {
    PlatformMessage {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        guild_id: Some(guild_id.to_string()),
        author: user(author_id, false),
        content: content.to_string(),
        edited_timestamp: None,
        attachments: vec![],
        embeds: vec![],
        reactions: vec![],
    }
}

/// In-memory settings; unknown guilds get the defaults.
#[derive(Default)]
pub struct StaticSettings {
    guilds: RwLock<HashMap<String, GuildSettings>>,
}

impl StaticSettings {
    pub fn set(&self, guild_id: &str, settings: GuildSettings) {
        self.guilds
            .write()
            .unwrap()
            .insert(guild_id.to_string(), settings);
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn guild_settings(&self, guild_id: &str) -> anyhow::Result<GuildSettings> {
        let guilds = self
            .guilds
            .read()
            .map_err(|e| anyhow::anyhow!("settings lock poisoned: {}", e))?;
        Ok(guilds.get(guild_id).cloned().unwrap_or_default())
    }
}

/// Engine wired to a mock platform, an in-memory store and fixed settings for guild `G`.
pub fn engine(platform: Arc<MockPlatform>, settings: GuildSettings) -> (Engine, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let source = StaticSettings::default();
    source.set("G", settings);

    let engine = Engine::new(
        db.clone(),
        platform,
        Arc::new(source),
        Arc::new(Locales::builtin()),
    );
    (engine, db)
}
