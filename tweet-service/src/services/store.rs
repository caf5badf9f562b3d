//! Persistence seams consumed by the permission components.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::ServiceError;
use crate::models::{Group, GroupId, Tweet, TweetId, UserId};

/// Keyset position in a newest-first tweet listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TweetCursor {
    pub created_at: DateTime<Utc>,
    pub id: TweetId,
}

impl From<&Tweet> for TweetCursor {
    fn from(tweet: &Tweet) -> Self {
        Self {
            created_at: tweet.created_at,
            id: tweet.id,
        }
    }
}

#[async_trait]
pub trait TweetStore: Send + Sync {
    /// Load a tweet with its hashtags and group-permission links.
    async fn find_tweet(&self, id: TweetId) -> Result<Option<Tweet>, ServiceError>;

    /// Up to `limit` tweets whose creation time (ms) lies in
    /// `[from_millis, to_millis]`, newest first (ties by id descending),
    /// starting strictly after `after`.
    async fn list_tweets_created_between(
        &self,
        from_millis: i64,
        to_millis: i64,
        after: Option<TweetCursor>,
        limit: usize,
    ) -> Result<Vec<Tweet>, ServiceError>;

    /// Persist inherit flags and replace the tweet's group-permission links.
    async fn save_permissions(
        &self,
        id: TweetId,
        inherit_view: bool,
        inherit_edit: bool,
        view_group_ids: &[GroupId],
        edit_group_ids: &[GroupId],
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Groups with the given ids; unknown ids are skipped.
    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<Group>, ServiceError>;

    /// Groups whose member set is exactly `user_ids`.
    async fn find_groups_with_exact_members(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<Group>, ServiceError>;

    async fn create_group(
        &self,
        user_ids: &BTreeSet<UserId>,
        creator_id: UserId,
    ) -> Result<Group, ServiceError>;

    /// Ids from `user_ids` that do not belong to an existing user.
    async fn find_missing_users(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<UserId>, ServiceError>;
}

/// In-memory store for tests and local runs.
pub struct MockStore {
    tweets: Mutex<HashMap<TweetId, Tweet>>,
    groups: Mutex<BTreeMap<GroupId, Group>>,
    users: Mutex<BTreeSet<UserId>>,
    next_group_id: AtomicI64,
    list_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            tweets: Mutex::new(HashMap::new()),
            groups: Mutex::new(BTreeMap::new()),
            users: Mutex::new(BTreeSet::new()),
            next_group_id: AtomicI64::new(1000),
            list_calls: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn insert_tweet(&self, tweet: Tweet) {
        if let Ok(mut tweets) = self.tweets.lock() {
            tweets.insert(tweet.id, tweet);
        }
    }

    pub fn insert_group(&self, group: Group) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.insert(group.id, group);
        }
    }

    pub fn add_users(&self, ids: impl IntoIterator<Item = UserId>) {
        if let Ok(mut users) = self.users.lock() {
            users.extend(ids);
        }
    }

    pub fn tweet(&self, id: TweetId) -> Option<Tweet> {
        self.tweets.lock().ok()?.get(&id).cloned()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.groups
            .lock()
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of time-window listing calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make every store call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ServiceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Database(anyhow::anyhow!(
                "Mock store is unavailable"
            )));
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, ServiceError> {
    m.lock()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock store mutex poisoned: {}", e)))
}

#[async_trait]
impl TweetStore for MockStore {
    async fn find_tweet(&self, id: TweetId) -> Result<Option<Tweet>, ServiceError> {
        self.check_available()?;
        Ok(lock(&self.tweets)?.get(&id).cloned())
    }

    async fn list_tweets_created_between(
        &self,
        from_millis: i64,
        to_millis: i64,
        after: Option<TweetCursor>,
        limit: usize,
    ) -> Result<Vec<Tweet>, ServiceError> {
        self.check_available()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut tweets: Vec<Tweet> = lock(&self.tweets)?
            .values()
            .filter(|t| (from_millis..=to_millis).contains(&t.created_at_millis()))
            .filter(|t| after.map_or(true, |c| (t.created_at, t.id) < (c.created_at, c.id)))
            .cloned()
            .collect();
        tweets.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        tweets.truncate(limit);
        Ok(tweets)
    }

    async fn save_permissions(
        &self,
        id: TweetId,
        inherit_view: bool,
        inherit_edit: bool,
        view_group_ids: &[GroupId],
        edit_group_ids: &[GroupId],
    ) -> Result<(), ServiceError> {
        self.check_available()?;
        let mut tweets = lock(&self.tweets)?;
        let tweet = tweets.get_mut(&id).ok_or(ServiceError::TweetNotFound(id))?;
        tweet.inherit_view_permissions = inherit_view;
        tweet.inherit_edit_permissions = inherit_edit;
        tweet.viewable_group_ids = view_group_ids.to_vec();
        tweet.editable_group_ids = edit_group_ids.to_vec();
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MockStore {
    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<Group>, ServiceError> {
        self.check_available()?;
        let groups = lock(&self.groups)?;
        Ok(ids.iter().filter_map(|id| groups.get(id).cloned()).collect())
    }

    async fn find_groups_with_exact_members(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<Group>, ServiceError> {
        self.check_available()?;
        Ok(lock(&self.groups)?
            .values()
            .filter(|g| g.has_exact_members(user_ids))
            .cloned()
            .collect())
    }

    async fn create_group(
        &self,
        user_ids: &BTreeSet<UserId>,
        creator_id: UserId,
    ) -> Result<Group, ServiceError> {
        self.check_available()?;
        let group = Group {
            id: self.next_group_id.fetch_add(1, Ordering::SeqCst),
            creator_id,
            members: user_ids.clone(),
        };
        lock(&self.groups)?.insert(group.id, group.clone());
        Ok(group)
    }

    async fn find_missing_users(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<UserId>, ServiceError> {
        self.check_available()?;
        let users = lock(&self.users)?;
        Ok(user_ids.difference(&users).copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(id: TweetId, millis: i64) -> Tweet {
        Tweet {
            created_at: DateTime::from_timestamp_millis(millis).unwrap(),
            ..Tweet::new(id, 1, format!("tweet {}", id), None)
        }
    }

    #[tokio::test]
    async fn listing_pages_by_keyset_with_id_tiebreak() {
        let store = MockStore::new();
        for (id, millis) in [(1, 1_000), (2, 2_000), (3, 2_000), (4, 3_000), (5, 9_000)] {
            store.insert_tweet(tweet(id, millis));
        }

        let first = store.list_tweets_created_between(0, 5_000, None, 2).await.unwrap();
        let ids: Vec<TweetId> = first.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 3]);

        let cursor = first.last().map(TweetCursor::from);
        let rest = store.list_tweets_created_between(0, 5_000, cursor, 10).await.unwrap();
        let ids: Vec<TweetId> = rest.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.list_calls(), 2);
    }
}
