use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use starboard_db::Database;
use starboard_types::settings::GuildSettings;

/// Typed per-guild configuration lookup.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn guild_settings(&self, guild_id: &str) -> Result<GuildSettings>;
}

/// Settings persisted in the `guild_settings` table.
pub struct StoredSettings {
    db: Arc<Database>,
}

impl StoredSettings {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettingsSource for StoredSettings {
    async fn guild_settings(&self, guild_id: &str) -> Result<GuildSettings> {
        let db = self.db.clone();
        let guild_id = guild_id.to_string();
        tokio::task::spawn_blocking(move || db.get_guild_settings(&guild_id)).await?
    }
}
