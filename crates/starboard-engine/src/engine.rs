use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use starboard_db::Database;
use starboard_db::models::{CountFilter, MessagePatch, MessageRow, ReactionRow};
use starboard_types::card::Card;
use starboard_types::models::{MessageSnapshot, PlatformMessage};
use starboard_types::settings::GuildSettings;

use crate::cache::{TtlCache, run_sweep_loop};
use crate::error::{EngineError, Result};
use crate::locale::{KEY_CARD_AUTHOR, KEY_CARD_CHANNEL, KEY_CARD_TITLE, Localizer};
use crate::locks::EntityLocks;
use crate::platform::{ChatPlatform, PlatformError};
use crate::render::{CardLabels, render};
use crate::resolver::resolve_mirror_channel;
use crate::settings::SettingsSource;

/// How long a message snapshot stays cached after its last write.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(20 * 60);

/// How often expired cache entries are reclaimed.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A user warned about starring their own message is not warned again for this long.
pub const WARNING_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Page size when listing reacting users during drift repair.
pub const REACTION_PAGE_SIZE: u32 = 100;

/// Identifies the source message an event is about.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub id: String,
    pub channel_id: String,
    pub guild_id: String,
}

impl MessageRef {
    pub fn new(id: &str, channel_id: &str, guild_id: &str) -> Self {
        Self {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            guild_id: guild_id.to_string(),
        }
    }
}

/// The reconciliation engine. Keeps each guild's curated channel in line
/// with the reactions on its source messages.
pub struct Engine {
    pub(crate) db: Arc<Database>,
    pub(crate) platform: Arc<dyn ChatPlatform>,
    pub(crate) settings: Arc<dyn SettingsSource>,
    pub(crate) locales: Arc<dyn Localizer>,
    pub(crate) locks: EntityLocks,
    pub(crate) snapshots: Arc<TtlCache<MessageSnapshot>>,
    /// Users already warned about self-starring.
    pub(crate) warned: Arc<TtlCache<()>>,
}

impl Engine {
    pub fn new(
        db: Arc<Database>,
        platform: Arc<dyn ChatPlatform>,
        settings: Arc<dyn SettingsSource>,
        locales: Arc<dyn Localizer>,
    ) -> Self {
        Self {
            db,
            platform,
            settings,
            locales,
            locks: EntityLocks::new(),
            snapshots: Arc::new(TtlCache::new(SNAPSHOT_TTL)),
            warned: Arc::new(TtlCache::new(WARNING_COOLDOWN)),
        }
    }

    /// Start the background sweeps for both caches. Needs a tokio runtime.
    pub fn spawn_sweepers(&self) {
        tokio::spawn(run_sweep_loop("snapshots", self.snapshots.clone(), SWEEP_INTERVAL));
        tokio::spawn(run_sweep_loop("warned", self.warned.clone(), SWEEP_INTERVAL));
    }

    pub fn cached_snapshot(&self, id: &str) -> Option<MessageSnapshot> {
        self.snapshots.get(id)
    }

    /// Run a blocking store call off the async runtime.
    pub(crate) async fn store<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    pub(crate) async fn guild_settings(&self, guild_id: &str) -> Result<GuildSettings> {
        Ok(self.settings.guild_settings(guild_id).await?)
    }

    /// Score of a message: its ledger rows minus the exclusions the guild enables.
    pub(crate) async fn count_stars(
        &self,
        message_id: &str,
        author_id: &str,
        settings: &GuildSettings,
    ) -> Result<u64> {
        let message_id = message_id.to_string();
        let author_id = author_id.to_string();
        let exclude_self = !settings.self_star;
        let exclude_bots = settings.remove_bot_stars;

        self.store(move |db| {
            let filter = CountFilter {
                exclude_user: exclude_self.then_some(author_id.as_str()),
                exclude_bots,
            };
            db.count_reactions(&message_id, filter)
        })
        .await
    }

    pub(crate) fn render_card(&self, snapshot: &MessageSnapshot, count: u64, settings: &GuildSettings) -> Card {
        let lang = settings.language.as_str();
        let labels = CardLabels {
            title: self.locales.render(lang, KEY_CARD_TITLE, &[]),
            author: self.locales.render(lang, KEY_CARD_AUTHOR, &[]),
            channel: self.locales.render(lang, KEY_CARD_CHANNEL, &[]),
        };
        render(snapshot, count, settings, &labels)
    }

    /// Bring an existing mirror in line with the ledger, or hand over to the
    /// create path when the message has no record yet. Caller holds the lock.
    pub(crate) async fn update_message(&self, target: &MessageRef, settings: &GuildSettings) -> Result<()> {
        let id = target.id.clone();
        let Some(row) = self.store(move |db| db.get_message(&id)).await? else {
            return self.create_message(target, settings).await;
        };

        let count = self.count_stars(&row.id, &row.author_id, settings).await?;

        let Some(starboard) =
            resolve_mirror_channel(&*self.platform, settings, &row.guild_id, &row.channel_id).await
        else {
            return Ok(());
        };

        if (count as i64) < settings.minimum {
            self.demote(&starboard, &row).await;
            return Ok(());
        }

        let snapshot = match self.snapshots.get(&row.id) {
            Some(cached) => {
                self.sync_record(&row, &cached).await?;
                cached
            }
            None => snapshot_of(&row),
        };

        let card = self.render_card(&snapshot, count, settings);
        match self.platform.edit_card(&starboard, &row.mirror_id, &card).await {
            Ok(()) => {
                debug!(message_id = %row.id, count, "Mirror updated");
                Ok(())
            }
            Err(PlatformError::NotFound) => {
                let mirror_id = self.platform.send_card(&starboard, &card).await?;
                info!(message_id = %row.id, %mirror_id, "Mirror vanished upstream, resent");

                let id = row.id.clone();
                let patch = MessagePatch {
                    mirror_id: Some(mirror_id),
                    ..Default::default()
                };
                self.store(move |db| db.update_message(&id, &patch)).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write edits absorbed by the cache back to the record.
    async fn sync_record(&self, row: &MessageRow, cached: &MessageSnapshot) -> Result<()> {
        let patch = MessagePatch {
            content: (cached.content != row.content).then(|| cached.content.clone()),
            image: (cached.image != row.image).then(|| cached.image.clone()),
            ..Default::default()
        };
        if patch.is_empty() {
            return Ok(());
        }

        let id = row.id.clone();
        self.store(move |db| db.update_message(&id, &patch)).await?;
        debug!(message_id = %row.id, "Record caught up with cached edit");
        Ok(())
    }

    /// Mirror a message that has just crossed the threshold. Caller holds the lock.
    pub(crate) async fn create_message(&self, target: &MessageRef, settings: &GuildSettings) -> Result<()> {
        let snapshot = match self.resolve_snapshot(target, settings).await {
            Ok(snapshot) => snapshot,
            Err(EngineError::Platform(PlatformError::NotFound)) => {
                debug!(message_id = %target.id, "Source message is gone, nothing to mirror");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let (guild_id, author_id, channel_id) = (
            snapshot.guild_id.clone(),
            snapshot.author_id.clone(),
            snapshot.channel_id.clone(),
        );
        let mode = settings.block_mode;
        let blocked = self
            .store(move |db| db.is_blocked(&guild_id, &author_id, &channel_id, mode))
            .await?;
        if blocked {
            debug!(message_id = %snapshot.id, "Message filtered by block list");
            return Ok(());
        }

        let Some(starboard) =
            resolve_mirror_channel(&*self.platform, settings, &snapshot.guild_id, &snapshot.channel_id).await
        else {
            return Ok(());
        };

        let count = self.count_stars(&snapshot.id, &snapshot.author_id, settings).await?;
        if (count as i64) < settings.minimum {
            return Ok(());
        }

        let card = self.render_card(&snapshot, count, settings);
        let mirror_id = self.platform.send_card(&starboard, &card).await?;
        info!(message_id = %snapshot.id, %mirror_id, count, "Message mirrored");

        let row = MessageRow {
            id: snapshot.id,
            mirror_id,
            author_id: snapshot.author_id,
            channel_id: snapshot.channel_id,
            guild_id: snapshot.guild_id,
            content: snapshot.content,
            image: snapshot.image,
        };
        self.store(move |db| db.insert_message(&row)).await
    }

    /// Delete a demoted mirror and its record side by side. The two outcomes
    /// are independent; a failure in one is logged and left for the next pass.
    pub(crate) async fn demote(&self, starboard: &str, row: &MessageRow) {
        let id = row.id.clone();
        let (card, record) = tokio::join!(
            self.platform.delete_card(starboard, &row.mirror_id),
            self.store(move |db| db.delete_message(&id)),
        );

        if let Err(e) = card {
            warn!(message_id = %row.id, "Failed to delete demoted mirror: {}", e);
        }
        if let Err(e) = record {
            warn!(message_id = %row.id, "Failed to delete demoted record: {}", e);
        }
        info!(message_id = %row.id, "Message fell below threshold, mirror removed");
    }

    /// Snapshot of a source message: from the cache, or fetched live. A live
    /// fetch also checks the ledger against the platform's own count.
    pub(crate) async fn resolve_snapshot(
        &self,
        target: &MessageRef,
        settings: &GuildSettings,
    ) -> Result<MessageSnapshot> {
        if let Some(snapshot) = self.snapshots.get(&target.id) {
            return Ok(snapshot);
        }

        let message = self
            .platform
            .fetch_message(&target.channel_id, &target.id)
            .await?;
        let snapshot = message.to_snapshot(&target.guild_id);

        self.repair_drift(&message, settings).await?;

        self.snapshots.set(&target.id, snapshot.clone());
        Ok(snapshot)
    }

    /// Rebuild the ledger from the platform when its raw count disagrees
    /// with the platform's total for the guild's emoji.
    pub(crate) async fn repair_drift(&self, message: &PlatformMessage, settings: &GuildSettings) -> Result<()> {
        let emoji = &settings.emoji;
        let live = message
            .reactions
            .iter()
            .find(|r| emoji.matches(&r.emoji))
            .map(|r| r.count as u64)
            .unwrap_or(0);

        let id = message.id.clone();
        let stored = self.store(move |db| db.count_reactions_raw(&id)).await?;
        if stored == live {
            return Ok(());
        }

        info!(message_id = %message.id, stored, live, "Reaction ledger drifted, rebuilding");

        let id = message.id.clone();
        self.store(move |db| db.delete_reactions(&id)).await?;

        let mut rows: Vec<ReactionRow> = Vec::new();
        let mut after: Option<String> = None;

        while (rows.len() as u64) < live {
            let page = self
                .platform
                .list_reacting_users(
                    &message.channel_id,
                    &message.id,
                    emoji,
                    after.as_deref(),
                    REACTION_PAGE_SIZE,
                )
                .await?;

            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id.clone());

            let full = page.len() >= REACTION_PAGE_SIZE as usize;
            rows.extend(page.into_iter().map(|u| ReactionRow {
                message_id: message.id.clone(),
                user_id: u.id,
                bot: u.bot,
            }));

            if !full {
                break;
            }
        }

        let inserted = self.store(move |db| db.insert_reactions(&rows)).await?;
        debug!(message_id = %message.id, inserted, "Reaction ledger rebuilt");
        Ok(())
    }
}

pub(crate) fn snapshot_of(row: &MessageRow) -> MessageSnapshot {
    MessageSnapshot {
        id: row.id.clone(),
        author_id: row.author_id.clone(),
        channel_id: row.channel_id.clone(),
        guild_id: row.guild_id.clone(),
        content: row.content.clone(),
        image: row.image.clone(),
    }
}
