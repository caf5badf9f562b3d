//! Point cache of encoded tweet snapshots.

use std::sync::Arc;
use tracing::warn;

use super::metrics::CACHE_LOOKUPS_TOTAL;
use super::{CacheBackend, CacheKeys, ServiceError, TweetCacheCodec};
use crate::models::{TweetId, TweetSnapshot};

#[derive(Clone)]
pub struct TweetSnapshotCache {
    cache: Arc<dyn CacheBackend>,
    keys: CacheKeys,
    ttl_seconds: u64,
}

impl TweetSnapshotCache {
    pub fn new(cache: Arc<dyn CacheBackend>, keys: CacheKeys, ttl_seconds: u64) -> Self {
        Self {
            cache,
            keys,
            ttl_seconds,
        }
    }

    /// Cached snapshot, if any. An undecodable entry is reported as a miss.
    pub async fn get(&self, tweet_id: TweetId) -> Result<Option<TweetSnapshot>, ServiceError> {
        let Some(bytes) = self.cache.get(&self.keys.snapshot(tweet_id)).await? else {
            CACHE_LOOKUPS_TOTAL.with_label_values(&["snapshot", "miss"]).inc();
            return Ok(None);
        };

        match TweetCacheCodec::decode(&bytes) {
            Ok(snapshot) => {
                CACHE_LOOKUPS_TOTAL.with_label_values(&["snapshot", "hit"]).inc();
                Ok(Some(snapshot))
            }
            Err(e) => {
                warn!(
                    tweet_id = tweet_id,
                    error = %e,
                    "Cached tweet snapshot failed to decode, possible format drift"
                );
                CACHE_LOOKUPS_TOTAL
                    .with_label_values(&["snapshot", "corrupt"])
                    .inc();
                Ok(None)
            }
        }
    }

    pub async fn put(&self, snapshot: &TweetSnapshot) -> Result<(), ServiceError> {
        self.cache
            .set_with_expiry(
                &self.keys.snapshot(snapshot.id),
                &TweetCacheCodec::encode(snapshot),
                self.ttl_seconds,
            )
            .await
    }
}
