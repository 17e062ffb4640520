use vidtube_db::models::{PlaylistRow, TweetRow, VideoRow};

use crate::error::{ApiError, ApiResult};

/// Anything with a single owner fixed at creation.
pub trait Owned {
    fn owner_id(&self) -> &str;
}

impl Owned for VideoRow {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for TweetRow {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for PlaylistRow {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// Absent is 404, someone else's is 403.
pub fn authorize_owner<T: Owned>(entity: Option<T>, caller_id: &str, resource: &str) -> ApiResult<T> {
    let entity = entity.ok_or_else(|| ApiError::not_found(format!("{} not found", resource)))?;
    if entity.owner_id() != caller_id {
        return Err(ApiError::forbidden(format!(
            "You are not allowed to modify this {}",
            resource.to_lowercase()
        )));
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(owner: &str) -> TweetRow {
        TweetRow {
            id: "t1".into(),
            owner_id: owner.into(),
            content: "hello".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn owner_passes() {
        let t = authorize_owner(Some(tweet("a")), "a", "Tweet").unwrap();
        assert_eq!(t.id, "t1");
    }

    #[test]
    fn stranger_is_forbidden() {
        let err = authorize_owner(Some(tweet("a")), "b", "Tweet").unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn missing_is_not_found() {
        let err = authorize_owner(None::<TweetRow>, "a", "Tweet").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(m) if m == "Tweet not found"));
    }
}
