//! Point flags recording who may edit a tweet.
//!
//! Flags are only ever written positively and expire on their own. A `false`
//! answer therefore means "not cached", and callers must recompute through
//! the resolver instead of denying.

use std::sync::Arc;
use tracing::instrument;

use super::metrics::CACHE_LOOKUPS_TOTAL;
use super::{CacheBackend, CacheKeys, ServiceError};
use crate::models::{GroupId, TweetId};

const SENTINEL: &[u8] = b"1";

#[derive(Clone)]
pub struct EditabilityFlagStore {
    cache: Arc<dyn CacheBackend>,
    keys: CacheKeys,
    ttl_seconds: u64,
}

impl EditabilityFlagStore {
    pub fn new(cache: Arc<dyn CacheBackend>, keys: CacheKeys, ttl_seconds: u64) -> Self {
        Self {
            cache,
            keys,
            ttl_seconds,
        }
    }

    #[instrument(skip(self))]
    pub async fn set_public_editable(&self, tweet_id: TweetId) -> Result<(), ServiceError> {
        self.cache
            .set_with_expiry(&self.keys.public_editable(tweet_id), SENTINEL, self.ttl_seconds)
            .await
    }

    pub async fn is_public_editable(&self, tweet_id: TweetId) -> Result<bool, ServiceError> {
        self.lookup(&self.keys.public_editable(tweet_id)).await
    }

    #[instrument(skip(self))]
    pub async fn set_group_editable(
        &self,
        tweet_id: TweetId,
        group_id: GroupId,
    ) -> Result<(), ServiceError> {
        self.cache
            .set_with_expiry(
                &self.keys.group_editable(tweet_id, group_id),
                SENTINEL,
                self.ttl_seconds,
            )
            .await
    }

    pub async fn is_group_editable(
        &self,
        tweet_id: TweetId,
        group_id: GroupId,
    ) -> Result<bool, ServiceError> {
        self.lookup(&self.keys.group_editable(tweet_id, group_id))
            .await
    }

    async fn lookup(&self, key: &str) -> Result<bool, ServiceError> {
        let found = self.cache.exists(key).await?;
        CACHE_LOOKUPS_TOTAL
            .with_label_values(&["editability", if found { "hit" } else { "miss" }])
            .inc();
        Ok(found)
    }
}
