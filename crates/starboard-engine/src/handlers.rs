use tracing::{debug, info, warn};

use starboard_types::events::{
    GatewayEvent, MessageDelete, MessageDeleteBulk, MessageEdit, ReactionClear, ReactionEvent,
};
use starboard_types::models::{Permission, PlatformMessage};
use starboard_types::settings::GuildSettings;

use starboard_db::models::MessagePatch;

use crate::engine::{Engine, MessageRef, WARNING_COOLDOWN};
use crate::error::Result;
use crate::locale::KEY_SELF_STAR_WARNING;
use crate::resolver::resolve_mirror_channel;

impl Engine {
    /// Route one gateway event to its handler. Events outside a guild are ignored.
    pub async fn handle(&self, event: &GatewayEvent) -> Result<()> {
        match event {
            GatewayEvent::MessageCreate(m) => self.message_create(m).await,
            GatewayEvent::MessageUpdate(m) => self.message_update(m).await,
            GatewayEvent::MessageDelete(m) => self.message_delete(m).await,
            GatewayEvent::MessageDeleteBulk(m) => self.message_delete_bulk(m).await,
            GatewayEvent::MessageReactionAdd(r) => self.reaction_add(r).await,
            GatewayEvent::MessageReactionRemove(r) => self.reaction_remove(r).await,
            GatewayEvent::MessageReactionRemoveAll(r) => self.reaction_remove_all(r).await,
        }
    }

    pub async fn message_create(&self, m: &PlatformMessage) -> Result<()> {
        let Some(guild_id) = m.guild_id.as_deref() else {
            return Ok(());
        };

        let _guard = self.locks.acquire(&m.id).await;
        self.snapshots.set(&m.id, m.to_snapshot(guild_id));

        let settings = self.guild_settings(guild_id).await?;
        let probability = settings.random_star_probability;
        if probability <= 0.0 || rand::random::<f64>() > probability / 100.0 {
            return Ok(());
        }

        match self.platform.has_permission(&m.channel_id, Permission::AddReactions).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                debug!(channel_id = %m.channel_id, "Permission check failed: {}", e);
                return Ok(());
            }
        }

        if let Err(e) = self.platform.add_reaction(&m.channel_id, &m.id, &settings.emoji).await {
            debug!(message_id = %m.id, "Random star failed: {}", e);
        }
        Ok(())
    }

    pub async fn message_update(&self, m: &MessageEdit) -> Result<()> {
        let Some(guild_id) = m.guild_id.as_deref() else {
            return Ok(());
        };

        let _guard = self.locks.acquire(&m.id).await;
        let image = m.snapshot_image();

        if let Some(mut snapshot) = self.snapshots.get(&m.id) {
            if m.is_edit() {
                snapshot.content = m.snapshot_content();
                snapshot.image = image;
            } else if image.is_some() {
                snapshot.image = image;
            } else {
                return Ok(());
            }

            self.snapshots.set(&m.id, snapshot);
            return Ok(());
        }

        let patch = if m.is_edit() {
            MessagePatch {
                content: Some(m.snapshot_content()),
                image: Some(image),
                ..Default::default()
            }
        } else if image.is_some() {
            MessagePatch {
                image: Some(image),
                ..Default::default()
            }
        } else {
            return Ok(());
        };

        // No record yet is fine: the update path falls through to creation.
        let id = m.id.clone();
        self.store(move |db| db.update_message(&id, &patch)).await?;

        let settings = self.guild_settings(guild_id).await?;
        self.update_message(&MessageRef::new(&m.id, &m.channel_id, guild_id), &settings)
            .await
    }

    pub async fn message_delete(&self, m: &MessageDelete) -> Result<()> {
        let Some(guild_id) = m.guild_id.as_deref() else {
            return Ok(());
        };

        let settings = self.guild_settings(guild_id).await?;
        if settings.save_deleted_messages {
            return Ok(());
        }

        let _guard = self.locks.acquire(&m.id).await;
        self.remove_mirrors(guild_id, &m.channel_id, vec![m.id.clone()], &settings)
            .await
    }

    pub async fn message_delete_bulk(&self, m: &MessageDeleteBulk) -> Result<()> {
        let Some(guild_id) = m.guild_id.as_deref() else {
            return Ok(());
        };

        let settings = self.guild_settings(guild_id).await?;
        if settings.save_deleted_messages {
            return Ok(());
        }

        let _guards = self.locks.acquire_many(&m.ids).await;
        self.remove_mirrors(guild_id, &m.channel_id, m.ids.clone(), &settings)
            .await
    }

    pub async fn reaction_remove_all(&self, r: &ReactionClear) -> Result<()> {
        let Some(guild_id) = r.guild_id.as_deref() else {
            return Ok(());
        };

        let _guard = self.locks.acquire(&r.message_id).await;

        // A reaction lives only as long as it does upstream. Preserving
        // deleted mirrors keeps the card and its record, never the ledger.
        let id = r.message_id.clone();
        self.store(move |db| db.delete_reactions(&id)).await?;

        let settings = self.guild_settings(guild_id).await?;
        if settings.save_deleted_messages {
            return Ok(());
        }

        self.remove_mirrors(guild_id, &r.channel_id, vec![r.message_id.clone()], &settings)
            .await
    }

    /// Drop the ledgers of source messages that went away, then delete their
    /// mirrors and records side by side. Caller holds the locks for `ids`.
    async fn remove_mirrors(
        &self,
        guild_id: &str,
        channel_id: &str,
        ids: Vec<String>,
        settings: &GuildSettings,
    ) -> Result<()> {
        // The sources are gone, so are their reactions, mirrored or not.
        let ledger = ids.clone();
        self.store(move |db| db.delete_reactions_for(&ledger)).await?;

        let lookup = ids.clone();
        let rows = self.store(move |db| db.get_messages(&lookup)).await?;
        if rows.is_empty() {
            return Ok(());
        }

        let Some(starboard) =
            resolve_mirror_channel(&*self.platform, settings, guild_id, channel_id).await
        else {
            return Ok(());
        };

        let mirror_ids: Vec<String> = rows.iter().map(|r| r.mirror_id.clone()).collect();
        let platform = async {
            match mirror_ids.as_slice() {
                [single] => self.platform.delete_card(&starboard, single).await,
                many => self.platform.bulk_delete_cards(&starboard, many).await,
            }
        };
        let store = self.store(move |db| db.delete_messages(&ids));

        let (cards, records) = tokio::join!(platform, store);
        if let Err(e) = cards {
            warn!(guild_id, count = mirror_ids.len(), "Failed to delete mirrors: {}", e);
        }
        let removed = records?;

        info!(guild_id, count = removed.len(), "Removed mirrors of deleted messages");
        Ok(())
    }

    pub async fn reaction_add(&self, r: &ReactionEvent) -> Result<()> {
        let Some(guild_id) = r.guild_id.as_deref() else {
            return Ok(());
        };

        let settings = self.guild_settings(guild_id).await?;
        if !settings.emoji.matches(&r.emoji) {
            return Ok(());
        }

        let _guard = self.locks.acquire(&r.message_id).await;
        let target = MessageRef::new(&r.message_id, &r.channel_id, guild_id);
        let mut bot = false;

        if r.user_id != self.platform.current_user_id() {
            let reactor_is_bot = match &r.member {
                Some(member) => member.user.bot,
                None => self
                    .platform
                    .fetch_member(guild_id, &r.user_id)
                    .await
                    .map(|m| m.user.bot)
                    .unwrap_or(false),
            };
            let can_manage = self
                .platform
                .has_permission(&r.channel_id, Permission::ManageMessages)
                .await
                .unwrap_or(false);

            if reactor_is_bot {
                bot = true;

                if can_manage && settings.remove_bot_stars {
                    match self
                        .platform
                        .remove_reaction(&r.channel_id, &r.message_id, &settings.emoji, &r.user_id)
                        .await
                    {
                        Ok(()) => return Ok(()),
                        Err(e) => debug!(user_id = %r.user_id, "Bot star removal failed: {}", e),
                    }
                }
            } else if can_manage && !settings.self_star {
                let snapshot = self.resolve_snapshot(&target, &settings).await?;

                if snapshot.author_id == r.user_id {
                    match self
                        .platform
                        .remove_reaction(&r.channel_id, &r.message_id, &settings.emoji, &r.user_id)
                        .await
                    {
                        Ok(()) => self.warn_self_star(r, &settings).await,
                        Err(e) => debug!(user_id = %r.user_id, "Self star removal failed: {}", e),
                    }
                }
            }
        }

        let (id, user_id) = (r.message_id.clone(), r.user_id.clone());
        self.store(move |db| db.insert_reaction(&id, &user_id, bot)).await?;

        self.update_message(&target, &settings).await
    }

    /// Tell a user once per cooldown that starring their own message does not count.
    async fn warn_self_star(&self, r: &ReactionEvent, settings: &GuildSettings) {
        if !settings.self_star_warning || self.warned.contains(&r.user_id) {
            return;
        }
        self.warned.set_with_ttl(&r.user_id, (), WARNING_COOLDOWN);

        let mention = format!("<@{}>", r.user_id);
        let text = self
            .locales
            .render(&settings.language, KEY_SELF_STAR_WARNING, &[mention.as_str()]);

        if let Err(e) = self.platform.send_text(&r.channel_id, &text).await {
            debug!(channel_id = %r.channel_id, "Self star warning failed: {}", e);
        }
    }

    pub async fn reaction_remove(&self, r: &ReactionEvent) -> Result<()> {
        let Some(guild_id) = r.guild_id.as_deref() else {
            return Ok(());
        };

        let settings = self.guild_settings(guild_id).await?;
        if !settings.emoji.matches(&r.emoji) {
            return Ok(());
        }

        let _guard = self.locks.acquire(&r.message_id).await;

        let (id, user_id) = (r.message_id.clone(), r.user_id.clone());
        self.store(move |db| db.delete_reaction(&id, &user_id)).await?;

        let target = MessageRef::new(&r.message_id, &r.channel_id, guild_id);
        match self.update_message(&target, &settings).await {
            Err(e) if e.is_integrity_violation() => {
                debug!(message_id = %r.message_id, "Ignoring integrity violation: {}", e);
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use starboard_db::models::{BlockKind, MessageRow};
    use starboard_types::models::GuildMember;
    use starboard_types::settings::{BlockMode, Emoji, MirrorChannel};

    use super::*;
    use crate::testutil::{self, BOT_ID, MockPlatform, message, text_channel, user};

    const SB: &str = "sb";

    fn settings(minimum: i64) -> GuildSettings {
        GuildSettings {
            minimum,
            channel: MirrorChannel::Channel(SB.into()),
            ..Default::default()
        }
    }

    fn platform() -> Arc<MockPlatform> {
        let p = Arc::new(MockPlatform::new());
        p.add_channel(text_channel("C", "G", "general", false));
        p.add_message(message("M", "C", "G", "A", "hello"));
        p
    }

    fn star(user_id: &str, bot: bool) -> ReactionEvent {
        ReactionEvent {
            user_id: user_id.into(),
            channel_id: "C".into(),
            message_id: "M".into(),
            guild_id: Some("G".into()),
            emoji: testutil::reaction_emoji(&Emoji::default()),
            member: Some(GuildMember { user: user(user_id, bot) }),
        }
    }

    fn mirrored(id: &str, mirror_id: &str) -> MessageRow {
        MessageRow {
            id: id.into(),
            mirror_id: mirror_id.into(),
            author_id: "A".into(),
            channel_id: "C".into(),
            guild_id: "G".into(),
            content: "hello".into(),
            image: None,
        }
    }

    #[tokio::test]
    async fn mirrors_at_threshold_and_retracts_below_it() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(3));
        let m = message("M", "C", "G", "A", "hello");
        engine.handle(&GatewayEvent::MessageCreate(m)).await.unwrap();

        for (user_id, bot) in [("A", false), ("B", true), ("U1", false), ("U2", false)] {
            engine.reaction_add(&star(user_id, bot)).await.unwrap();
        }
        assert_eq!(p.state().sent, 0);
        assert!(db.get_message("M").unwrap().is_none());

        engine.reaction_add(&star("U3", false)).await.unwrap();
        assert_eq!(p.state().sent, 1);
        assert_eq!(db.get_message("M").unwrap().unwrap().mirror_id, "card1");
        assert_eq!(db.count_reactions_raw("M").unwrap(), 5);

        let cards = p.card_in(SB);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].footer.text, "⭐ 3 stars");
        assert_eq!(cards[0].description, "hello");

        // A repeated add changes nothing but refreshes the card.
        engine.reaction_add(&star("U3", false)).await.unwrap();
        assert_eq!(p.state().sent, 1);
        assert_eq!(p.state().edits, 1);
        assert_eq!(db.count_reactions_raw("M").unwrap(), 5);

        engine.reaction_remove(&star("U1", false)).await.unwrap();
        assert_eq!(p.state().deleted, vec!["card1".to_string()]);
        assert!(p.card_in(SB).is_empty());
        assert!(db.get_message("M").unwrap().is_none());
        assert_eq!(db.count_reactions_raw("M").unwrap(), 4);

        // Removing an absent reaction is a no-op.
        engine.reaction_remove(&star("U9", false)).await.unwrap();
        assert_eq!(p.state().deleted.len(), 1);
    }

    #[tokio::test]
    async fn foreign_emoji_and_direct_messages_are_ignored() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));

        let mut other = star("U1", false);
        other.emoji.name = Some("🔥".into());
        engine.reaction_add(&other).await.unwrap();

        let mut dm = star("U2", false);
        dm.guild_id = None;
        engine.reaction_add(&dm).await.unwrap();

        assert_eq!(db.count_reactions_raw("M").unwrap(), 0);
        assert_eq!(p.state().sent, 0);
    }

    #[tokio::test]
    async fn drift_repair_pages_through_every_reactor() {
        let p = platform();
        let users: Vec<_> = (0..150).map(|i| user(&format!("u{:03}", i), false)).collect();
        p.set_reactors("M", &Emoji::default(), users);

        let (engine, db) = testutil::engine(p.clone(), settings(1));
        db.insert_reaction("M", "stale", false).unwrap();

        let target = MessageRef::new("M", "C", "G");
        let snapshot = engine.resolve_snapshot(&target, &settings(1)).await.unwrap();
        assert_eq!(snapshot.author_id, "A");
        assert_eq!(db.count_reactions_raw("M").unwrap(), 150);
        assert!(db.get_reactions("M").unwrap().iter().all(|r| r.user_id != "stale"));
        assert_eq!(p.state().list_calls, 2);

        // Second lookup is served from the cache.
        engine.resolve_snapshot(&target, &settings(1)).await.unwrap();
        assert_eq!(p.state().fetches, 1);
        assert_eq!(p.state().list_calls, 2);
    }

    #[tokio::test]
    async fn consistent_ledger_is_not_rebuilt() {
        let p = platform();
        p.set_reactors("M", &Emoji::default(), vec![user("U1", false), user("U2", false)]);

        let (engine, db) = testutil::engine(p.clone(), settings(5));
        db.insert_reaction("M", "U1", false).unwrap();
        db.insert_reaction("M", "U2", false).unwrap();

        engine
            .resolve_snapshot(&MessageRef::new("M", "C", "G"), &settings(5))
            .await
            .unwrap();
        assert_eq!(p.state().list_calls, 0);
    }

    #[tokio::test]
    async fn disabled_or_unresolvable_channel_takes_no_action() {
        let p = platform();
        let disabled = GuildSettings {
            channel: MirrorChannel::Disabled,
            ..settings(1)
        };
        p.set_reactors("M", &Emoji::default(), vec![user("U1", false)]);
        let (engine, db) = testutil::engine(p.clone(), disabled);

        engine.reaction_add(&star("U1", false)).await.unwrap();
        assert_eq!(db.count_reactions_raw("M").unwrap(), 1);
        assert_eq!(p.state().sent, 0);
        assert!(db.get_message("M").unwrap().is_none());

        // Sensitive source, sensitive channel unset, no sensitive default.
        let p = Arc::new(MockPlatform::new());
        p.add_channel(text_channel("N", "G", "after-dark", true));
        p.add_channel(text_channel("S", "G", "starboard", false));
        p.add_message(message("M", "N", "G", "A", "hello"));
        let (engine, db) = testutil::engine(p.clone(), settings(1));

        let mut r = star("U1", false);
        r.channel_id = "N".into();
        engine.reaction_add(&r).await.unwrap();
        assert_eq!(p.state().sent, 0);
        assert!(db.get_message("M").unwrap().is_none());
    }

    #[tokio::test]
    async fn blocked_author_is_never_mirrored() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));
        db.add_block("G", BlockKind::User, "A").unwrap();

        engine.reaction_add(&star("U1", false)).await.unwrap();
        assert_eq!(p.state().sent, 0);

        let whitelist = GuildSettings {
            block_mode: BlockMode::Whitelist,
            ..settings(1)
        };
        let (engine, _db) = testutil::engine(p.clone(), whitelist);
        engine.reaction_add(&star("U1", false)).await.unwrap();
        assert_eq!(p.state().sent, 0);
    }

    #[tokio::test]
    async fn vanished_mirror_is_resent() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));
        db.insert_message(&mirrored("M", "gone")).unwrap();

        engine.reaction_add(&star("U1", false)).await.unwrap();
        assert_eq!(p.state().sent, 1);
        assert_eq!(db.get_message("M").unwrap().unwrap().mirror_id, "card1");
    }

    #[tokio::test]
    async fn bulk_delete_removes_mirrors_unless_preserved() {
        let p = platform();
        let bulk = GatewayEvent::MessageDeleteBulk(MessageDeleteBulk {
            ids: vec!["M1".into(), "M2".into(), "M3".into()],
            channel_id: "C".into(),
            guild_id: Some("G".into()),
        });

        let preserve = GuildSettings {
            save_deleted_messages: true,
            ..settings(1)
        };
        let (engine, db) = testutil::engine(p.clone(), preserve);
        db.insert_message(&mirrored("M1", "c1")).unwrap();
        engine.handle(&bulk).await.unwrap();
        assert!(p.state().bulk_deleted.is_empty());
        assert!(db.get_message("M1").unwrap().is_some());

        let (engine, db) = testutil::engine(p.clone(), settings(1));
        db.insert_message(&mirrored("M1", "c1")).unwrap();
        db.insert_message(&mirrored("M2", "c2")).unwrap();
        db.insert_reaction("M1", "U1", false).unwrap();
        engine.handle(&bulk).await.unwrap();

        let mut deleted = p.state().bulk_deleted.concat();
        deleted.sort();
        assert_eq!(deleted, vec!["c1".to_string(), "c2".to_string()]);
        assert!(db.get_message("M1").unwrap().is_none());
        assert!(db.get_message("M2").unwrap().is_none());
        assert_eq!(db.count_reactions_raw("M1").unwrap(), 0);
    }

    #[tokio::test]
    async fn single_delete_and_reaction_clear() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));
        db.insert_message(&mirrored("M1", "c1")).unwrap();
        db.insert_message(&mirrored("M", "c2")).unwrap();
        db.insert_reaction("M", "U1", false).unwrap();

        let delete = GatewayEvent::MessageDelete(MessageDelete {
            id: "M1".into(),
            channel_id: "C".into(),
            guild_id: Some("G".into()),
        });
        engine.handle(&delete).await.unwrap();
        assert_eq!(p.state().deleted, vec!["c1".to_string()]);
        assert!(db.get_message("M1").unwrap().is_none());

        // Deleting something never mirrored touches nothing.
        engine.handle(&delete).await.unwrap();
        assert_eq!(p.state().deleted.len(), 1);

        let clear = GatewayEvent::MessageReactionRemoveAll(ReactionClear {
            channel_id: "C".into(),
            message_id: "M".into(),
            guild_id: Some("G".into()),
        });
        engine.handle(&clear).await.unwrap();
        assert_eq!(p.state().deleted, vec!["c1".to_string(), "c2".to_string()]);
        assert!(db.get_message("M").unwrap().is_none());
        assert_eq!(db.count_reactions_raw("M").unwrap(), 0);
    }

    #[tokio::test]
    async fn self_star_is_removed_and_warned_once() {
        let p = platform();
        p.state().manage_messages = true;
        let warn = GuildSettings {
            self_star_warning: true,
            ..settings(1)
        };
        let (engine, db) = testutil::engine(p.clone(), warn);
        engine
            .message_create(&message("M", "C", "G", "A", "hello"))
            .await
            .unwrap();

        engine.reaction_add(&star("A", false)).await.unwrap();
        engine.reaction_add(&star("A", false)).await.unwrap();

        let state = p.state();
        assert_eq!(state.removed_reactions.len(), 2);
        assert_eq!(state.texts.len(), 1);
        assert_eq!(state.texts[0].1, "<@A>, you cannot star your own messages.");
        assert_eq!(state.sent, 0);
        drop(state);

        // Still recorded; the count filter keeps it out of the score.
        assert_eq!(db.count_reactions_raw("M").unwrap(), 1);
    }

    #[tokio::test]
    async fn bot_stars_are_stripped_when_permitted() {
        let p = platform();
        p.state().manage_messages = true;
        let (engine, db) = testutil::engine(p.clone(), settings(1));

        engine.reaction_add(&star("B", true)).await.unwrap();
        assert_eq!(p.state().removed_reactions, vec![("M".to_string(), "B".to_string())]);
        assert_eq!(db.count_reactions_raw("M").unwrap(), 0);

        // The engine's own star is recorded as is.
        p.set_reactors("M", &Emoji::default(), vec![user(BOT_ID, true)]);
        engine.reaction_add(&star(BOT_ID, true)).await.unwrap();
        assert_eq!(p.state().removed_reactions.len(), 1);
        assert_eq!(db.count_reactions_raw("M").unwrap(), 1);
        assert_eq!(p.state().sent, 1);
    }

    #[tokio::test]
    async fn random_star_follows_probability() {
        let p = platform();
        p.state().add_reactions = true;
        let always = GuildSettings {
            random_star_probability: 100.0,
            ..settings(1)
        };
        let (engine, _db) = testutil::engine(p.clone(), always);
        engine
            .message_create(&message("M", "C", "G", "A", "hello"))
            .await
            .unwrap();
        assert_eq!(p.state().added_reactions, vec!["M".to_string()]);

        let (engine, _db) = testutil::engine(p.clone(), settings(1));
        engine
            .message_create(&message("M2", "C", "G", "A", "hello"))
            .await
            .unwrap();
        assert_eq!(p.state().added_reactions.len(), 1);
    }

    fn edit(content: &str) -> MessageEdit {
        MessageEdit {
            id: "M".into(),
            channel_id: "C".into(),
            guild_id: Some("G".into()),
            content: content.into(),
            edited_timestamp: Some("2024-01-01T00:00:00+00:00".into()),
            attachments: vec![],
            embeds: vec![],
        }
    }

    #[tokio::test]
    async fn edit_of_cached_unmirrored_message_stays_in_cache() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));
        engine
            .message_create(&message("M", "C", "G", "A", "hello"))
            .await
            .unwrap();

        engine.message_update(&edit("edited")).await.unwrap();
        assert_eq!(engine.cached_snapshot("M").unwrap().content, "edited");
        assert!(db.get_message("M").unwrap().is_none());
        assert_eq!(p.state().sent, 0);
    }

    #[tokio::test]
    async fn edit_of_mirrored_message_refreshes_card() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));
        db.insert_message(&mirrored("M", "gone")).unwrap();
        db.insert_reaction("M", "U1", false).unwrap();

        engine.message_update(&edit("edited")).await.unwrap();
        assert_eq!(db.get_message("M").unwrap().unwrap().content, "edited");
        assert_eq!(p.card_in(SB)[0].description, "edited");

        // An update that is neither an edit nor adds an image is ignored.
        let mut embed_only = edit("ignored");
        embed_only.edited_timestamp = None;
        engine.message_update(&embed_only).await.unwrap();
        assert_eq!(db.get_message("M").unwrap().unwrap().content, "edited");
    }

    #[tokio::test]
    async fn cached_edit_reaches_mirror_on_next_update() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));
        engine
            .message_create(&message("M", "C", "G", "A", "hello"))
            .await
            .unwrap();

        engine.reaction_add(&star("U1", false)).await.unwrap();
        assert_eq!(p.card_in(SB)[0].description, "hello");

        engine.message_update(&edit("edited")).await.unwrap();
        engine.reaction_add(&star("U2", false)).await.unwrap();

        assert_eq!(p.state().sent, 1);
        assert_eq!(p.card_in(SB)[0].description, "edited");
        assert_eq!(db.get_message("M").unwrap().unwrap().content, "edited");
    }

    #[tokio::test]
    async fn uncached_edit_promotes_message_already_at_threshold() {
        let p = platform();
        p.set_reactors("M", &Emoji::default(), vec![user("U1", false)]);
        let (engine, db) = testutil::engine(p.clone(), settings(1));
        db.insert_reaction("M", "U1", false).unwrap();

        engine.message_update(&edit("edited")).await.unwrap();
        assert_eq!(p.state().sent, 1);
        assert!(db.get_message("M").unwrap().is_some());
    }

    #[tokio::test]
    async fn deleting_unmirrored_source_drops_its_ledger() {
        let p = platform();
        p.set_reactors("M", &Emoji::default(), vec![user("U1", false)]);
        let (engine, db) = testutil::engine(p.clone(), settings(5));

        engine.reaction_add(&star("U1", false)).await.unwrap();
        assert_eq!(db.count_reactions_raw("M").unwrap(), 1);

        let delete = GatewayEvent::MessageDelete(MessageDelete {
            id: "M".into(),
            channel_id: "C".into(),
            guild_id: Some("G".into()),
        });
        engine.handle(&delete).await.unwrap();
        assert_eq!(db.count_reactions_raw("M").unwrap(), 0);
        assert!(p.state().deleted.is_empty());

        db.insert_reaction("M1", "U1", false).unwrap();
        db.insert_reaction("M2", "U2", true).unwrap();
        let bulk = GatewayEvent::MessageDeleteBulk(MessageDeleteBulk {
            ids: vec!["M1".into(), "M2".into()],
            channel_id: "C".into(),
            guild_id: Some("G".into()),
        });
        engine.handle(&bulk).await.unwrap();
        assert_eq!(db.count_reactions_raw("M1").unwrap(), 0);
        assert_eq!(db.count_reactions_raw("M2").unwrap(), 0);
        assert!(p.state().bulk_deleted.is_empty());
    }

    #[tokio::test]
    async fn preserved_deletes_keep_the_ledger() {
        let p = platform();
        let preserve = GuildSettings {
            save_deleted_messages: true,
            ..settings(5)
        };
        let (engine, db) = testutil::engine(p.clone(), preserve);
        db.insert_reaction("M", "U1", false).unwrap();

        let delete = GatewayEvent::MessageDelete(MessageDelete {
            id: "M".into(),
            channel_id: "C".into(),
            guild_id: Some("G".into()),
        });
        engine.handle(&delete).await.unwrap();
        assert_eq!(db.count_reactions_raw("M").unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_with_preserved_mirrors_keeps_record_but_not_ledger() {
        let p = platform();
        let preserve = GuildSettings {
            save_deleted_messages: true,
            ..settings(1)
        };
        let (engine, db) = testutil::engine(p.clone(), preserve);
        db.insert_message(&mirrored("M", "c1")).unwrap();
        db.insert_reaction("M", "U1", false).unwrap();

        let clear = GatewayEvent::MessageReactionRemoveAll(ReactionClear {
            channel_id: "C".into(),
            message_id: "M".into(),
            guild_id: Some("G".into()),
        });
        engine.handle(&clear).await.unwrap();
        assert_eq!(db.count_reactions_raw("M").unwrap(), 0);
        assert!(db.get_message("M").unwrap().is_some());
        assert!(p.state().deleted.is_empty());
    }

    #[tokio::test]
    async fn reaction_on_vanished_source_is_quiet() {
        let p = platform();
        let (engine, db) = testutil::engine(p.clone(), settings(1));

        let mut r = star("U1", false);
        r.message_id = "X".into();
        engine.reaction_remove(&r).await.unwrap();
        engine.reaction_add(&r).await.unwrap();

        assert_eq!(p.state().sent, 0);
        assert!(db.get_message("X").unwrap().is_none());
    }
}
