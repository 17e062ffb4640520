//! Store rows to wire models.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use vidtube_db::models::{ChannelRow, PlaylistRow, TweetRow, UserRow, VideoRow};
use vidtube_types::models::{ChannelProfile, OwnerSummary, Playlist, Tweet, User, Video};

pub fn uuid(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap_or_else(|e| {
        warn!("Stored id {:?} is not a UUID: {}", raw, e);
        Uuid::nil()
    })
}

pub fn timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Stored timestamp {:?} is not RFC 3339: {}", raw, e);
            DateTime::<Utc>::default()
        })
}

pub fn user(row: UserRow) -> User {
    User {
        id: uuid(&row.id),
        username: row.username,
        email: row.email,
        full_name: row.full_name,
        avatar: row.avatar,
        cover_image: row.cover_image,
        created_at: timestamp(&row.created_at),
        updated_at: timestamp(&row.updated_at),
    }
}

pub fn channel(row: ChannelRow) -> ChannelProfile {
    let user = row.user;
    ChannelProfile {
        id: uuid(&user.id),
        username: user.username,
        full_name: user.full_name,
        email: user.email,
        avatar: user.avatar,
        cover_image: user.cover_image,
        subscribers_count: row.subscribers_count,
        channels_subscribed_to_count: row.subscribed_to_count,
        is_subscribed: row.is_subscribed,
    }
}

pub fn video(row: VideoRow) -> Video {
    Video {
        id: uuid(&row.id),
        owner: OwnerSummary {
            id: uuid(&row.owner_id),
            username: row.owner_username,
            full_name: row.owner_full_name,
            avatar: row.owner_avatar,
        },
        video_file: row.video_file,
        thumbnail: row.thumbnail,
        title: row.title,
        description: row.description,
        views: row.views.max(0) as u64,
        is_published: row.is_published,
        created_at: timestamp(&row.created_at),
        updated_at: timestamp(&row.updated_at),
    }
}

pub fn tweet(row: TweetRow) -> Tweet {
    Tweet {
        id: uuid(&row.id),
        owner: uuid(&row.owner_id),
        content: row.content,
        created_at: timestamp(&row.created_at),
        updated_at: timestamp(&row.updated_at),
    }
}

pub fn playlist(row: PlaylistRow) -> Playlist {
    Playlist {
        id: uuid(&row.id),
        owner: uuid(&row.owner_id),
        name: row.name,
        description: row.description,
        videos: row.video_ids.iter().map(|id| uuid(id)).collect(),
        created_at: timestamp(&row.created_at),
        updated_at: timestamp(&row.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_parse_millisecond_utc() {
        let t = timestamp("2024-03-05T10:20:30.123Z");
        assert_eq!(t.timestamp_millis() % 1000, 123);
    }

    #[test]
    fn corrupt_values_fall_back() {
        assert_eq!(uuid("nope"), Uuid::nil());
        assert_eq!(timestamp("yesterday"), DateTime::<Utc>::default());
    }
}
