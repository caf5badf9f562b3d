//! Time-ordered visibility index: one sorted set for public tweets and one
//! per group, scored by creation time in milliseconds.
//!
//! Retention is per scope. Every insert resets the expiry of the whole
//! scope key, so a scope that keeps receiving tweets never expires while
//! idle scopes age out after the retention window.

use std::sync::Arc;
use tracing::{debug, instrument};

use super::metrics::CACHE_LOOKUPS_TOTAL;
use super::{CacheBackend, CacheKeys, ServiceError};
use crate::models::{IndexEntry, TweetCategory, TweetId, VisibilityScope};

#[derive(Clone)]
pub struct VisibilityIndex {
    cache: Arc<dyn CacheBackend>,
    keys: CacheKeys,
    retention_seconds: u64,
}

impl VisibilityIndex {
    pub fn new(cache: Arc<dyn CacheBackend>, keys: CacheKeys, retention_seconds: u64) -> Self {
        Self {
            cache,
            keys,
            retention_seconds,
        }
    }

    #[instrument(skip(self, scope, hashtags), fields(scope = %scope.label()))]
    pub async fn add_to_scope(
        &self,
        scope: VisibilityScope,
        tweet_id: TweetId,
        hashtags: &[String],
        category: TweetCategory,
        created_at_millis: i64,
    ) -> Result<(), ServiceError> {
        let member = pack_member(tweet_id, hashtags, category);
        self.cache
            .sorted_set_add(
                &self.keys.visibility(scope),
                &member,
                created_at_millis,
                self.retention_seconds,
            )
            .await?;
        debug!(tweet_id = tweet_id, "Tweet added to visibility scope");
        Ok(())
    }

    /// Entries scored within `[from_millis, to_millis]`, newest first.
    ///
    /// Returns `None` when the scope is not in the cache at all, which
    /// callers treat as a miss rather than an empty page.
    #[instrument(skip(self, scope), fields(scope = %scope.label()))]
    pub async fn paginate(
        &self,
        scope: VisibilityScope,
        from_millis: i64,
        to_millis: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Option<Vec<IndexEntry>>, ServiceError> {
        let key = self.keys.visibility(scope);
        if !self.cache.exists(&key).await? {
            CACHE_LOOKUPS_TOTAL
                .with_label_values(&["visibility", "miss"])
                .inc();
            return Ok(None);
        }
        CACHE_LOOKUPS_TOTAL
            .with_label_values(&["visibility", "hit"])
            .inc();

        if from_millis > to_millis || limit == 0 {
            return Ok(Some(Vec::new()));
        }

        let raw = self
            .cache
            .sorted_set_range_desc(&key, from_millis, to_millis, offset, limit)
            .await?;

        raw.into_iter()
            .map(|(member, score)| {
                Ok(IndexEntry {
                    tweet_id: unpack_tweet_id(&member)?,
                    member,
                    score,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()
            .map(Some)
    }
}

/// `tweetId_hashtag1_..._category`
pub fn pack_member(tweet_id: TweetId, hashtags: &[String], category: TweetCategory) -> String {
    let mut parts = Vec::with_capacity(hashtags.len() + 2);
    parts.push(tweet_id.to_string());
    parts.extend(hashtags.iter().cloned());
    parts.push(category.as_str().to_string());
    parts.join("_")
}

pub fn unpack_tweet_id(member: &str) -> Result<TweetId, ServiceError> {
    member
        .split('_')
        .next()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| {
            ServiceError::SerializationFailure(format!("Malformed visibility member: {}", member))
        })
}
