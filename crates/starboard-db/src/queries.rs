use crate::Database;
use crate::models::{BlockKind, BlockRow, CountFilter, MessagePatch, MessageRow, ReactionRow};
use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, params_from_iter};
use starboard_types::settings::{BlockMode, Emoji, GuildSettings, MirrorChannel};

impl Database {
    // -- Mirror records --

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    pub fn get_messages(&self, ids: &[String]) -> Result<Vec<MessageRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| query_messages(conn, ids))
    }

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, mirror_id, author_id, channel_id, guild_id, content, image)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    row.id,
                    row.mirror_id,
                    row.author_id,
                    row.channel_id,
                    row.guild_id,
                    row.content,
                    row.image
                ],
            )?;
            Ok(())
        })
    }

    /// Patch only the columns set in `patch`. Returns false when no row matched.
    pub fn update_message(&self, id: &str, patch: &MessagePatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }

        self.with_conn(|conn| {
            let mut sets: Vec<&str> = Vec::new();
            let mut params: Vec<&dyn ToSql> = Vec::new();

            if let Some(mirror_id) = &patch.mirror_id {
                sets.push("mirror_id = ?");
                params.push(mirror_id);
            }
            if let Some(content) = &patch.content {
                sets.push("content = ?");
                params.push(content);
            }
            if let Some(image) = &patch.image {
                sets.push("image = ?");
                params.push(image);
            }
            params.push(&id);

            let sql = format!("UPDATE messages SET {} WHERE id = ?", sets.join(", "));
            let changed = conn.execute(&sql, params.as_slice())?;
            Ok(changed > 0)
        })
    }

    /// Remove the record only. The ledger is kept so a later re-promotion
    /// still counts the surviving reactions.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Remove the records and ledgers of deleted source messages.
    /// Returns the mirror ids of the records that existed.
    pub fn delete_messages(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let placeholders = placeholders(ids.len());

            let mirror_ids = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT mirror_id FROM messages WHERE id IN ({})",
                    placeholders
                ))?;
                stmt.query_map(params_from_iter(ids.iter()), |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            tx.execute(
                &format!("DELETE FROM messages WHERE id IN ({})", placeholders),
                params_from_iter(ids.iter()),
            )?;
            tx.execute(
                &format!("DELETE FROM reactions WHERE message_id IN ({})", placeholders),
                params_from_iter(ids.iter()),
            )?;

            tx.commit()?;
            Ok(mirror_ids)
        })
    }

    // -- Reaction ledger --

    /// Record a reaction. A duplicate (message, user) pair is ignored.
    /// Returns true when a row was inserted.
    pub fn insert_reaction(&self, message_id: &str, user_id: &str, bot: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO reactions (message_id, user_id, bot) VALUES (?1, ?2, ?3)",
                rusqlite::params![message_id, user_id, bot],
            )?;
            Ok(changed > 0)
        })
    }

    /// Batch insert with the same conflict rule as `insert_reaction`.
    pub fn insert_reactions(&self, rows: &[ReactionRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO reactions (message_id, user_id, bot) VALUES (?1, ?2, ?3)",
                )?;
                for r in rows {
                    inserted += stmt.execute(rusqlite::params![r.message_id, r.user_id, r.bot])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Returns false when there was nothing to delete.
    pub fn delete_reaction(&self, message_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                [message_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_reactions(&self, message_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM reactions WHERE message_id = ?1", [message_id])?)
        })
    }

    pub fn delete_reactions_for(&self, message_ids: &[String]) -> Result<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "DELETE FROM reactions WHERE message_id IN ({})",
                placeholders(message_ids.len())
            );
            Ok(conn.execute(&sql, params_from_iter(message_ids.iter()))?)
        })
    }

    /// Score of a message after applying `filter`.
    pub fn count_reactions(&self, message_id: &str, filter: CountFilter<'_>) -> Result<u64> {
        self.with_conn(|conn| {
            let mut sql = String::from("SELECT COUNT(*) FROM reactions WHERE message_id = ?");
            let mut params: Vec<&dyn ToSql> = Vec::new();
            params.push(&message_id);

            if let Some(user) = &filter.exclude_user {
                sql.push_str(" AND user_id != ?");
                params.push(user);
            }
            if filter.exclude_bots {
                sql.push_str(" AND bot = 0");
            }

            let count: i64 = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Unfiltered count, compared against the platform's own total.
    pub fn count_reactions_raw(&self, message_id: &str) -> Result<u64> {
        self.count_reactions(message_id, CountFilter::default())
    }

    pub fn get_reactions(&self, message_id: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, user_id, bot FROM reactions WHERE message_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        bot: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Block list --

    pub fn add_block(&self, guild_id: &str, kind: BlockKind, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO blocks (guild_id, type, id) VALUES (?1, ?2, ?3)",
                [guild_id, kind.as_str(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn remove_block(&self, guild_id: &str, kind: BlockKind, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM blocks WHERE guild_id = ?1 AND type = ?2 AND id = ?3",
                [guild_id, kind.as_str(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_blocks(&self, guild_id: &str) -> Result<Vec<BlockRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT guild_id, type, id FROM blocks WHERE guild_id = ?1 ORDER BY type, id")?;
            let rows = stmt
                .query_map([guild_id], |row| {
                    let kind: String = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, kind, row.get::<_, String>(2)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .filter_map(|(guild_id, kind, id)| {
                    BlockKind::parse(&kind).map(|kind| BlockRow { guild_id, kind, id })
                })
                .collect())
        })
    }

    /// Whether the block list excludes a message by `author_id` in `channel_id`.
    pub fn is_blocked(
        &self,
        guild_id: &str,
        author_id: &str,
        channel_id: &str,
        mode: BlockMode,
    ) -> Result<bool> {
        let matches: i64 = self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM blocks
                 WHERE guild_id = ?1
                   AND ((type = 'user' AND id = ?2) OR (type = 'channel' AND id = ?3))",
                [guild_id, author_id, channel_id],
                |row| row.get(0),
            )?)
        })?;

        Ok(mode.is_blocked(matches as u64))
    }

    // -- Guild settings --

    pub fn get_guild_settings(&self, guild_id: &str) -> Result<GuildSettings> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT language, minimum, self_star, self_star_warning,
                        emoji_name, emoji_unicode, emoji_id, emoji_animated,
                        channel, nsfw_channel, minimal, remove_bot_stars,
                        save_deleted_messages, block_mode, random_star_probability
                 FROM guild_settings WHERE guild_id = ?1",
            )?;

            let settings = stmt.query_row([guild_id], settings_from_row).optional()?;
            Ok(settings.unwrap_or_default())
        })
    }

    pub fn put_guild_settings(&self, guild_id: &str, s: &GuildSettings) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO guild_settings (
                    guild_id, language, minimum, self_star, self_star_warning,
                    emoji_name, emoji_unicode, emoji_id, emoji_animated,
                    channel, nsfw_channel, minimal, remove_bot_stars,
                    save_deleted_messages, block_mode, random_star_probability
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                rusqlite::params![
                    guild_id,
                    s.language,
                    s.minimum,
                    s.self_star,
                    s.self_star_warning,
                    s.emoji.name,
                    s.emoji.unicode,
                    s.emoji.id,
                    s.emoji.animated,
                    s.channel.to_stored(),
                    s.nsfw_channel.to_stored(),
                    s.minimal,
                    s.remove_bot_stars,
                    s.save_deleted_messages,
                    s.block_mode.as_str(),
                    s.random_star_probability,
                ],
            )?;
            Ok(())
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        mirror_id: row.get(1)?,
        author_id: row.get(2)?,
        channel_id: row.get(3)?,
        guild_id: row.get(4)?,
        content: row.get(5)?,
        image: row.get(6)?,
    })
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, mirror_id, author_id, channel_id, guild_id, content, image
         FROM messages WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], message_from_row).optional()?;
    Ok(row)
}

fn query_messages(conn: &Connection, ids: &[String]) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT id, mirror_id, author_id, channel_id, guild_id, content, image
         FROM messages WHERE id IN ({})",
        placeholders(ids.len())
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn settings_from_row(row: &Row<'_>) -> rusqlite::Result<GuildSettings> {
    let d = GuildSettings::default();

    let emoji = match row.get::<_, Option<String>>(4)? {
        Some(name) => Emoji {
            name,
            unicode: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            id: row.get(6)?,
            animated: row.get::<_, Option<bool>>(7)?.unwrap_or(false),
        },
        None => d.emoji,
    };

    Ok(GuildSettings {
        language: row.get::<_, Option<String>>(0)?.unwrap_or(d.language),
        minimum: row.get::<_, Option<i64>>(1)?.unwrap_or(d.minimum),
        self_star: row.get::<_, Option<bool>>(2)?.unwrap_or(d.self_star),
        self_star_warning: row.get::<_, Option<bool>>(3)?.unwrap_or(d.self_star_warning),
        emoji,
        channel: MirrorChannel::from_stored(row.get(8)?),
        nsfw_channel: MirrorChannel::from_stored(row.get(9)?),
        minimal: row.get::<_, Option<bool>>(10)?.unwrap_or(d.minimal),
        remove_bot_stars: row.get::<_, Option<bool>>(11)?.unwrap_or(d.remove_bot_stars),
        save_deleted_messages: row
            .get::<_, Option<bool>>(12)?
            .unwrap_or(d.save_deleted_messages),
        block_mode: row
            .get::<_, Option<String>>(13)?
            .and_then(|m| BlockMode::parse(&m))
            .unwrap_or(d.block_mode),
        random_star_probability: row
            .get::<_, Option<f64>>(14)?
            .unwrap_or(d.random_star_probability),
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
