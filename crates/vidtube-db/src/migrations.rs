use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE CHECK (length(username) > 0),
                email           TEXT NOT NULL UNIQUE CHECK (length(email) > 0),
                full_name       TEXT NOT NULL CHECK (length(full_name) > 0),
                avatar          TEXT NOT NULL,
                cover_image     TEXT,
                password        TEXT NOT NULL,
                refresh_token   TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE subscriptions (
                subscriber_id   TEXT NOT NULL REFERENCES users(id),
                channel_id      TEXT NOT NULL REFERENCES users(id),
                created_at      TEXT NOT NULL,
                PRIMARY KEY (subscriber_id, channel_id),
                CHECK (subscriber_id != channel_id)
            );

            CREATE INDEX idx_subscriptions_channel
                ON subscriptions(channel_id);

            CREATE TABLE videos (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                video_file      TEXT NOT NULL,
                thumbnail       TEXT NOT NULL,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                views           INTEGER NOT NULL DEFAULT 0 CHECK (views >= 0),
                is_published    INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_videos_owner
                ON videos(owner_id, created_at);

            CREATE TABLE watch_history (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL REFERENCES users(id),
                video_id        TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                watched_at      TEXT NOT NULL
            );

            CREATE INDEX idx_watch_history_user
                ON watch_history(user_id, id);

            CREATE TABLE tweets (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL CHECK (length(trim(content)) > 0),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_tweets_owner
                ON tweets(owner_id, created_at);

            CREATE TABLE playlists (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                name            TEXT NOT NULL,
                description     TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE playlist_videos (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                playlist_id     TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
                video_id        TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_playlist_videos_playlist
                ON playlist_videos(playlist_id, id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
