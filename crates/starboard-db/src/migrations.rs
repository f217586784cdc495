use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            mirror_id   TEXT NOT NULL,
            author_id   TEXT NOT NULL,
            channel_id  TEXT NOT NULL,
            guild_id    TEXT NOT NULL,
            content     TEXT NOT NULL DEFAULT '',
            image       TEXT
        );

        -- No foreign key to messages: reactions are recorded before a
        -- message crosses the threshold and gets a row of its own.
        CREATE TABLE IF NOT EXISTS reactions (
            message_id  TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            bot         INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS blocks (
            guild_id    TEXT NOT NULL,
            type        TEXT NOT NULL CHECK (type IN ('user', 'channel')),
            id          TEXT NOT NULL,
            PRIMARY KEY (guild_id, type, id)
        );

        -- NULL columns fall back to the declared defaults.
        CREATE TABLE IF NOT EXISTS guild_settings (
            guild_id                TEXT PRIMARY KEY,
            language                TEXT,
            minimum                 INTEGER,
            self_star               INTEGER,
            self_star_warning       INTEGER,
            emoji_name              TEXT,
            emoji_unicode           TEXT,
            emoji_id                TEXT,
            emoji_animated          INTEGER,
            channel                 TEXT,
            nsfw_channel            TEXT,
            minimal                 INTEGER,
            remove_bot_stars        INTEGER,
            save_deleted_messages   INTEGER,
            block_mode              TEXT,
            random_star_probability REAL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

pub fn drop_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        DROP TABLE IF EXISTS messages;
        DROP TABLE IF EXISTS reactions;
        DROP TABLE IF EXISTS blocks;
        DROP TABLE IF EXISTS guild_settings;
        ",
    )?;

    info!("Dropped all tables");
    Ok(())
}
