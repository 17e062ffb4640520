use std::collections::HashMap;

use crate::listing::{ListFilter, Page};
use crate::models::{NewVideo, PlaylistRow, TweetRow, VideoRow};
use crate::queries::OptionalExt;
use crate::{Database, now};
use anyhow::Result;
use rusqlite::{Connection, Row};

pub(crate) const VIDEO_SELECT: &str = "SELECT v.id, v.owner_id, u.username, u.full_name, u.avatar,
        v.video_file, v.thumbnail, v.title, v.description, v.views, v.is_published,
        v.created_at, v.updated_at
     FROM videos v
     JOIN users u ON u.id = v.owner_id";

const TWEET_SELECT: &str = "SELECT t.id, t.owner_id, t.content, t.created_at, t.updated_at FROM tweets t";

const PLAYLIST_SELECT: &str =
    "SELECT p.id, p.owner_id, p.name, p.description, p.created_at, p.updated_at FROM playlists p";

/// How one resource plugs into the shared list query.
struct ListSpec<'a> {
    select: &'a str,
    from: &'a str,
    alias: &'a str,
    search_column: &'a str,
    owner_column: &'a str,
    sort_columns: &'a [(&'a str, &'a str)],
}

const VIDEO_LIST: ListSpec<'static> = ListSpec {
    select: VIDEO_SELECT,
    from: "videos v",
    alias: "v",
    search_column: "v.title",
    owner_column: "v.owner_id",
    sort_columns: &[
        ("createdAt", "v.created_at"),
        ("updatedAt", "v.updated_at"),
        ("title", "v.title"),
        ("views", "v.views"),
        ("isPublished", "v.is_published"),
    ],
};

const TWEET_LIST: ListSpec<'static> = ListSpec {
    select: TWEET_SELECT,
    from: "tweets t",
    alias: "t",
    search_column: "t.content",
    owner_column: "t.owner_id",
    sort_columns: &[
        ("createdAt", "t.created_at"),
        ("updatedAt", "t.updated_at"),
        ("content", "t.content"),
    ],
};

const PLAYLIST_LIST: ListSpec<'static> = ListSpec {
    select: PLAYLIST_SELECT,
    from: "playlists p",
    alias: "p",
    search_column: "p.name",
    owner_column: "p.owner_id",
    sort_columns: &[
        ("createdAt", "p.created_at"),
        ("updatedAt", "p.updated_at"),
        ("name", "p.name"),
    ],
};

impl Database {
    // -- Videos --

    pub fn insert_video(&self, video: &NewVideo<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO videos (id, owner_id, video_file, thumbnail, title, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    video.id,
                    video.owner_id,
                    video.video_file,
                    video.thumbnail,
                    video.title,
                    video.description,
                    ts,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_video(&self, id: &str) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{VIDEO_SELECT} WHERE v.id = ?1"))?;
            let row = stmt.query_row([id], map_video).optional()?;
            Ok(row)
        })
    }

    pub fn list_videos(&self, filter: &ListFilter) -> Result<Page<VideoRow>> {
        self.with_conn(|conn| list_rows(conn, &VIDEO_LIST, filter, map_video))
    }

    /// Replace whichever fields are given; `None` keeps the stored value.
    pub fn update_video(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        thumbnail: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE videos
                 SET title = COALESCE(?1, title),
                     description = COALESCE(?2, description),
                     thumbnail = COALESCE(?3, thumbnail),
                     updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![title, description, thumbnail, now(), id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Flip the published flag. Returns the new value, or None if the video is gone.
    pub fn toggle_video_published(&self, id: &str) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let published = conn
                .query_row(
                    "UPDATE videos SET is_published = NOT is_published, updated_at = ?1
                     WHERE id = ?2
                     RETURNING is_published",
                    rusqlite::params![now(), id],
                    |row| row.get::<_, bool>(0),
                )
                .optional()?;
            Ok(published)
        })
    }

    pub fn increment_video_views(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("UPDATE videos SET views = views + 1 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Playlist entries and watch history rows referencing the video go with it.
    pub fn delete_video(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM videos WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Tweets --

    pub fn insert_tweet(&self, id: &str, owner_id: &str, content: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO tweets (id, owner_id, content, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, owner_id, content, ts],
            )?;
            Ok(())
        })
    }

    pub fn get_tweet(&self, id: &str) -> Result<Option<TweetRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{TWEET_SELECT} WHERE t.id = ?1"))?;
            let row = stmt.query_row([id], map_tweet).optional()?;
            Ok(row)
        })
    }

    pub fn list_tweets(&self, filter: &ListFilter) -> Result<Page<TweetRow>> {
        self.with_conn(|conn| list_rows(conn, &TWEET_LIST, filter, map_tweet))
    }

    pub fn update_tweet(&self, id: &str, content: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE tweets SET content = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![content, now(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_tweet(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM tweets WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Playlists --

    pub fn insert_playlist(&self, id: &str, owner_id: &str, name: &str, description: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO playlists (id, owner_id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id, owner_id, name, description, ts],
            )?;
            Ok(())
        })
    }

    pub fn get_playlist(&self, id: &str) -> Result<Option<PlaylistRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{PLAYLIST_SELECT} WHERE p.id = ?1"))?;
            let Some(mut playlist) = stmt.query_row([id], map_playlist).optional()? else {
                return Ok(None);
            };
            let mut videos = query_playlist_videos(conn, &[playlist.id.clone()])?;
            playlist.video_ids = videos.remove(&playlist.id).unwrap_or_default();
            Ok(Some(playlist))
        })
    }

    pub fn list_playlists(&self, filter: &ListFilter) -> Result<Page<PlaylistRow>> {
        self.with_conn(|conn| {
            let mut page = list_rows(conn, &PLAYLIST_LIST, filter, map_playlist)?;
            let ids: Vec<String> = page.rows.iter().map(|p| p.id.clone()).collect();
            let mut videos = query_playlist_videos(conn, &ids)?;
            for playlist in &mut page.rows {
                playlist.video_ids = videos.remove(&playlist.id).unwrap_or_default();
            }
            Ok(page)
        })
    }

    pub fn update_playlist(&self, id: &str, name: Option<&str>, description: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE playlists
                 SET name = COALESCE(?1, name), description = COALESCE(?2, description), updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![name, description, now(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_playlist(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM playlists WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Append a video. The same video may appear more than once.
    pub fn add_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO playlist_videos (playlist_id, video_id) VALUES (?1, ?2)",
                [playlist_id, video_id],
            )?;
            tx.execute(
                "UPDATE playlists SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now(), playlist_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Remove every occurrence of a video. Returns how many entries went away.
    pub fn remove_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM playlist_videos WHERE playlist_id = ?1 AND video_id = ?2",
                [playlist_id, video_id],
            )?;
            if removed > 0 {
                tx.execute(
                    "UPDATE playlists SET updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now(), playlist_id],
                )?;
            }
            tx.commit()?;
            Ok(removed)
        })
    }
}

fn list_rows<T>(
    conn: &Connection,
    spec: &ListSpec<'_>,
    filter: &ListFilter,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Page<T>> {
    let predicate = format!(
        "WHERE (?1 IS NULL OR {search} LIKE ?1 ESCAPE '\\')
           AND (?2 IS NULL OR {owner} = ?2)",
        search = spec.search_column,
        owner = spec.owner_column,
    );
    let pattern = filter.like_pattern();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} {predicate}", spec.from),
        rusqlite::params![pattern, filter.owner_id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "{select} {predicate} {order} LIMIT ?3 OFFSET ?4",
        select = spec.select,
        order = filter.order_clause(spec.sort_columns, spec.alias),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params![pattern, filter.owner_id, filter.limit, filter.offset()],
            map,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Page {
        rows,
        total: total as u64,
    })
}

/// Batch-fetch playlist entries, keyed by playlist id, in insertion order.
fn query_playlist_videos(conn: &Connection, playlist_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    if playlist_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders: Vec<String> = (1..=playlist_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT playlist_id, video_id FROM playlist_videos WHERE playlist_id IN ({}) ORDER BY id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = playlist_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (playlist_id, video_id) = row?;
        grouped.entry(playlist_id).or_default().push(video_id);
    }

    Ok(grouped)
}

pub(crate) fn map_video(row: &Row<'_>) -> rusqlite::Result<VideoRow> {
    Ok(VideoRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_username: row.get(2)?,
        owner_full_name: row.get(3)?,
        owner_avatar: row.get(4)?,
        video_file: row.get(5)?,
        thumbnail: row.get(6)?,
        title: row.get(7)?,
        description: row.get(8)?,
        views: row.get(9)?,
        is_published: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn map_tweet(row: &Row<'_>) -> rusqlite::Result<TweetRow> {
    Ok(TweetRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_playlist(row: &Row<'_>) -> rusqlite::Result<PlaylistRow> {
    Ok(PlaylistRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        video_ids: Vec::new(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tests::seed_user;

    fn seed_video(db: &Database, id: &str, owner: &str, title: &str) {
        db.insert_video(&NewVideo {
            id,
            owner_id: owner,
            video_file: "http://media/v.mp4",
            thumbnail: "http://media/t.png",
            title,
            description: "desc",
        })
        .unwrap();
    }

    #[test]
    fn second_page_holds_items_eleven_to_twenty() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        for i in 1..=25 {
            seed_video(&db, &format!("v{i:02}"), "u1", &format!("Video {i:02}"));
        }

        let page = db
            .list_videos(&ListFilter {
                page: 2,
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 25);
        let titles: Vec<&str> = page.rows.iter().map(|v| v.title.as_str()).collect();
        let expected: Vec<String> = (11..=20).map(|i| format!("Video {i:02}")).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn search_and_owner_filters_combine() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_user(&db, "u2", "bob");
        seed_video(&db, "v1", "u1", "Rust tutorial");
        seed_video(&db, "v2", "u2", "rust for beginners");
        seed_video(&db, "v3", "u1", "Cooking");

        let page = db
            .list_videos(&ListFilter {
                search: Some("RUST".into()),
                owner_id: Some("u1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].id, "v1");
        assert_eq!(page.rows[0].owner_username, "alice");
    }

    #[test]
    fn sort_by_views_descending() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_video(&db, "v1", "u1", "a");
        seed_video(&db, "v2", "u1", "b");
        db.increment_video_views("v2").unwrap();
        db.increment_video_views("v2").unwrap();
        db.increment_video_views("v1").unwrap();

        let page = db
            .list_videos(&ListFilter {
                sort_by: Some("views".into()),
                descending: true,
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<&str> = page.rows.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["v2", "v1"]);
        assert_eq!(page.rows[0].views, 2);
    }

    #[test]
    fn toggle_published_flips_and_reports() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_video(&db, "v1", "u1", "a");

        assert_eq!(db.toggle_video_published("v1").unwrap(), Some(false));
        assert_eq!(db.toggle_video_published("v1").unwrap(), Some(true));
        assert_eq!(db.toggle_video_published("missing").unwrap(), None);
    }

    #[test]
    fn update_video_keeps_fields_not_given() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_video(&db, "v1", "u1", "a");
        let before = db.get_video("v1").unwrap().unwrap();

        assert!(db.update_video("v1", Some("New"), None, None).unwrap());
        let video = db.get_video("v1").unwrap().unwrap();
        assert_eq!(video.title, "New");
        assert_eq!(video.description, before.description);
        assert_eq!(video.thumbnail, "http://media/t.png");

        db.update_video("v1", None, Some("New desc"), Some("http://media/t2.png")).unwrap();
        let video = db.get_video("v1").unwrap().unwrap();
        assert_eq!(video.title, "New");
        assert_eq!(video.description, "New desc");
        assert_eq!(video.thumbnail, "http://media/t2.png");

        assert!(!db.update_video("missing", Some("x"), None, None).unwrap());
    }

    #[test]
    fn empty_tweet_is_rejected_by_the_store() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        let err = db.insert_tweet("t1", "u1", "   ").unwrap_err();
        assert_eq!(
            crate::constraint_violation(&err),
            Some(crate::ConstraintViolation::Invalid)
        );
        assert!(db.get_tweet("t1").unwrap().is_none());
    }

    #[test]
    fn playlist_keeps_order_and_duplicates() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_video(&db, "v1", "u1", "a");
        seed_video(&db, "v2", "u1", "b");
        db.insert_playlist("p1", "u1", "Mix", "stuff").unwrap();

        db.add_playlist_video("p1", "v2").unwrap();
        db.add_playlist_video("p1", "v1").unwrap();
        db.add_playlist_video("p1", "v2").unwrap();
        let playlist = db.get_playlist("p1").unwrap().unwrap();
        assert_eq!(playlist.video_ids, ["v2", "v1", "v2"]);

        assert_eq!(db.remove_playlist_video("p1", "v2").unwrap(), 2);
        assert_eq!(db.get_playlist("p1").unwrap().unwrap().video_ids, ["v1"]);
    }

    #[test]
    fn deleting_a_video_cascades_to_playlists_and_history() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_video(&db, "v1", "u1", "a");
        db.insert_playlist("p1", "u1", "Mix", "stuff").unwrap();
        db.add_playlist_video("p1", "v1").unwrap();
        db.record_watch("u1", "v1").unwrap();

        assert!(db.delete_video("v1").unwrap());
        assert!(db.get_playlist("p1").unwrap().unwrap().video_ids.is_empty());
        assert!(db.get_watch_history("u1").unwrap().is_empty());
    }

    #[test]
    fn list_playlists_attaches_videos() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_video(&db, "v1", "u1", "a");
        db.insert_playlist("p1", "u1", "One", "x").unwrap();
        db.insert_playlist("p2", "u1", "Two", "y").unwrap();
        db.add_playlist_video("p2", "v1").unwrap();

        let page = db.list_playlists(&ListFilter::default()).unwrap();
        assert_eq!(page.total, 2);
        assert!(page.rows[0].video_ids.is_empty());
        assert_eq!(page.rows[1].video_ids, ["v1"]);
    }
}
