use crate::content::{VIDEO_SELECT, map_video};
use crate::models::{ChannelRow, NewUser, UserRow, VideoRow};
use crate::{Database, now};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, password, refresh_token, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, avatar, cover_image, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.email,
                    user.full_name,
                    user.avatar,
                    user.cover_image,
                    user.password_hash,
                    ts,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", rusqlite::params![id]))
    }

    /// Look up a user whose email OR username matches.
    pub fn find_user_by_email_or_username(&self, email: &str, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1 OR username = ?2", rusqlite::params![email, username]))
    }

    /// Overwrite the single refresh-token slot. `None` ends the session.
    pub fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![token, now(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.update_user_field(id, "password", Some(password_hash))
    }

    pub fn update_account(&self, id: &str, full_name: &str, email: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET full_name = ?1, email = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![full_name, email, now(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn update_avatar(&self, id: &str, url: &str) -> Result<bool> {
        self.update_user_field(id, "avatar", Some(url))
    }

    pub fn update_cover_image(&self, id: &str, url: &str) -> Result<bool> {
        self.update_user_field(id, "cover_image", Some(url))
    }

    fn update_user_field(&self, id: &str, column: &'static str, value: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!("UPDATE users SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
                rusqlite::params![value, now(), id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Channels & subscriptions --

    pub fn get_channel_profile(&self, username: &str, viewer_id: Option<&str>) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let Some(user) = query_user(conn, "username = ?1", rusqlite::params![username])? else {
                return Ok(None);
            };

            let (subscribers, subscribed_to, is_subscribed): (i64, i64, bool) = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM subscriptions WHERE channel_id = ?1),
                    (SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = ?1),
                    EXISTS(SELECT 1 FROM subscriptions WHERE channel_id = ?1 AND subscriber_id = ?2)",
                rusqlite::params![&user.id, viewer_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            Ok(Some(ChannelRow {
                user,
                subscribers_count: subscribers as u64,
                subscribed_to_count: subscribed_to as u64,
                is_subscribed,
            }))
        })
    }

    /// Toggle a subscription: removes if exists, inserts if not.
    /// Returns true when the caller is subscribed afterwards.
    pub fn toggle_subscription(&self, subscriber_id: &str, channel_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM subscriptions WHERE subscriber_id = ?1 AND channel_id = ?2",
                [subscriber_id, channel_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO subscriptions (subscriber_id, channel_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![subscriber_id, channel_id, now()],
            )?;
            Ok(true)
        })
    }

    // -- Watch history --

    pub fn record_watch(&self, user_id: &str, video_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO watch_history (user_id, video_id, watched_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, video_id, now()],
            )?;
            Ok(())
        })
    }

    /// Videos in the order the user watched them, repeats included.
    pub fn get_watch_history(&self, user_id: &str) -> Result<Vec<VideoRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{VIDEO_SELECT}
                 JOIN watch_history w ON w.video_id = v.id
                 WHERE w.user_id = ?1
                 ORDER BY w.id ASC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_video)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate} LIMIT 1"))?;
    let row = stmt.query_row(params, map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        avatar: row.get(4)?,
        cover_image: row.get(5)?,
        password: row.get(6)?,
        refresh_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ConstraintViolation;
    use crate::constraint_violation;

    pub(crate) fn seed_user(db: &Database, id: &str, username: &str) {
        db.create_user(&NewUser {
            id,
            username,
            email: &format!("{username}@example.com"),
            full_name: "Test User",
            avatar: "http://media/avatar.png",
            cover_image: None,
            password_hash: "hash",
        })
        .unwrap();
    }

    #[test]
    fn duplicate_username_is_a_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");

        let err = db
            .create_user(&NewUser {
                id: "u2",
                username: "alice",
                email: "other@example.com",
                full_name: "Other",
                avatar: "a",
                cover_image: None,
                password_hash: "hash",
            })
            .unwrap_err();
        assert_eq!(constraint_violation(&err), Some(ConstraintViolation::Unique));
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn blank_full_name_is_an_invalid_write() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_user(&NewUser {
                id: "u1",
                username: "bob",
                email: "bob@example.com",
                full_name: "",
                avatar: "a",
                cover_image: None,
                password_hash: "hash",
            })
            .unwrap_err();
        assert_eq!(constraint_violation(&err), Some(ConstraintViolation::Invalid));
    }

    #[test]
    fn refresh_token_slot_overwrites_and_clears() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");

        db.set_refresh_token("u1", Some("first")).unwrap();
        db.set_refresh_token("u1", Some("second")).unwrap();
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(user.refresh_token.as_deref(), Some("second"));

        db.set_refresh_token("u1", None).unwrap();
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert!(user.refresh_token.is_none());
    }

    #[test]
    fn login_lookup_matches_either_identifier() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");

        let by_email = db.find_user_by_email_or_username("alice@example.com", "nobody").unwrap();
        assert_eq!(by_email.unwrap().id, "u1");
        let by_name = db.find_user_by_email_or_username("nobody@example.com", "alice").unwrap();
        assert_eq!(by_name.unwrap().id, "u1");
        assert!(db.find_user_by_email_or_username("x@example.com", "x").unwrap().is_none());
    }

    #[test]
    fn subscription_toggle_and_channel_counts() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        seed_user(&db, "u2", "bob");

        assert!(db.toggle_subscription("u2", "u1").unwrap());
        let channel = db.get_channel_profile("alice", Some("u2")).unwrap().unwrap();
        assert_eq!(channel.subscribers_count, 1);
        assert_eq!(channel.subscribed_to_count, 0);
        assert!(channel.is_subscribed);

        let anonymous = db.get_channel_profile("alice", None).unwrap().unwrap();
        assert!(!anonymous.is_subscribed);

        assert!(!db.toggle_subscription("u2", "u1").unwrap());
        let channel = db.get_channel_profile("alice", Some("u2")).unwrap().unwrap();
        assert_eq!(channel.subscribers_count, 0);

        assert!(db.get_channel_profile("nobody", None).unwrap().is_none());
    }

    #[test]
    fn self_subscription_is_rejected_by_the_store() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "alice");
        let err = db.toggle_subscription("u1", "u1").unwrap_err();
        assert_eq!(constraint_violation(&err), Some(ConstraintViolation::Invalid));
    }
}
