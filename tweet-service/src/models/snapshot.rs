//! Cached tweet snapshot - the subset of a tweet served from point lookups.

use serde::Serialize;

use super::tweet::{Tweet, TweetCategory, TweetId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TweetSnapshot {
    pub id: TweetId,
    pub content: String,
    pub author_id: UserId,
    pub hashtags: Vec<String>,
    pub location: Option<String>,
    pub category: TweetCategory,
}

impl From<&Tweet> for TweetSnapshot {
    fn from(t: &Tweet) -> Self {
        Self {
            id: t.id,
            content: t.content.clone(),
            author_id: t.author_id,
            hashtags: t.hashtags.clone(),
            location: t.location.clone(),
            category: t.category,
        }
    }
}
