//! Permission inheritance resolver.
//!
//! Walks a tweet's parent chain until it reaches the node that decides the
//! audience for one axis (view or edit). The walk is iterative and bounded:
//! a revisited tweet or more than `max_depth` hops aborts with
//! [`ServiceError::CorruptPermissionChain`]. Each parent load is an await
//! point, so callers can cancel between hops.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{instrument, warn};

use super::metrics::RESOLVER_DEPTH;
use super::{ServiceError, TweetStore};
use crate::models::{GroupId, PermissionAxis, ResolvedAudience, Tweet, UserId};

pub const DEFAULT_MAX_DEPTH: u32 = 64;

#[derive(Clone)]
pub struct PermissionResolver {
    tweets: Arc<dyn TweetStore>,
    max_depth: u32,
}

impl PermissionResolver {
    pub fn new(tweets: Arc<dyn TweetStore>, max_depth: u32) -> Self {
        Self { tweets, max_depth }
    }

    pub async fn resolve_visibility(
        &self,
        tweet: &Tweet,
        explicit_user_ids: &[UserId],
        explicit_group_ids: &[GroupId],
        depth: u32,
    ) -> Result<ResolvedAudience, ServiceError> {
        self.resolve(
            PermissionAxis::View,
            tweet,
            explicit_user_ids,
            explicit_group_ids,
            depth,
        )
        .await
    }

    pub async fn resolve_editability(
        &self,
        tweet: &Tweet,
        explicit_user_ids: &[UserId],
        explicit_group_ids: &[GroupId],
        depth: u32,
    ) -> Result<ResolvedAudience, ServiceError> {
        self.resolve(
            PermissionAxis::Edit,
            tweet,
            explicit_user_ids,
            explicit_group_ids,
            depth,
        )
        .await
    }

    /// Resolve the audience the tweet currently has, seeding the walk with
    /// the group links stored on the tweet itself.
    pub async fn resolve_current(
        &self,
        axis: PermissionAxis,
        tweet: &Tweet,
    ) -> Result<ResolvedAudience, ServiceError> {
        self.resolve(axis, tweet, &[], tweet.own_group_ids(axis), 0)
            .await
    }

    /// Resolve one axis. An inheriting tweet defers to its parent, seeded
    /// with the parent's own group ids; the explicit ids passed in only
    /// count when the tweet does not inherit.
    #[instrument(
        skip(self, tweet, explicit_user_ids, explicit_group_ids),
        fields(tweet_id = tweet.id, axis = axis.as_str())
    )]
    pub async fn resolve(
        &self,
        axis: PermissionAxis,
        tweet: &Tweet,
        explicit_user_ids: &[UserId],
        explicit_group_ids: &[GroupId],
        depth: u32,
    ) -> Result<ResolvedAudience, ServiceError> {
        let mut current: Cow<'_, Tweet> = Cow::Borrowed(tweet);
        let mut user_ids = explicit_user_ids.to_vec();
        let mut group_ids = explicit_group_ids.to_vec();
        let mut depth = depth;
        let mut hops = 0u32;
        let mut visited = HashSet::from([tweet.id]);

        let resolved = loop {
            if !current.inherits(axis) {
                if user_ids.is_empty() && group_ids.is_empty() {
                    break ResolvedAudience::public(depth);
                }
                break ResolvedAudience::scoped(depth, user_ids, group_ids);
            }

            let Some(parent_id) = current.parent_tweet_id else {
                break ResolvedAudience::public(depth);
            };

            if hops >= self.max_depth || !visited.insert(parent_id) {
                warn!(
                    tweet_id = tweet.id,
                    parent_id = parent_id,
                    hops = hops,
                    "Aborting permission walk on corrupt parent chain"
                );
                return Err(ServiceError::CorruptPermissionChain {
                    tweet_id: tweet.id,
                    hops,
                });
            }

            let parent = self
                .tweets
                .find_tweet(parent_id)
                .await?
                .ok_or(ServiceError::TweetNotFound(parent_id))?;

            user_ids = Vec::new();
            group_ids = parent.own_group_ids(axis).to_vec();
            depth += 1;
            hops += 1;
            current = Cow::Owned(parent);
        };

        RESOLVER_DEPTH
            .with_label_values(&[axis.as_str()])
            .observe(f64::from(resolved.depth));

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EffectiveAudience;
    use crate::services::MockStore;

    fn resolver(store: Arc<MockStore>) -> PermissionResolver {
        PermissionResolver::new(store, DEFAULT_MAX_DEPTH)
    }

    fn explicit(id: i64, parent: Option<i64>, groups: Vec<i64>) -> Tweet {
        let mut t = Tweet::new(id, 1, "explicit", parent);
        t.inherit_view_permissions = false;
        t.inherit_edit_permissions = false;
        t.viewable_group_ids = groups.clone();
        t.editable_group_ids = groups;
        t
    }

    fn inheriting(id: i64, parent: Option<i64>, groups: Vec<i64>) -> Tweet {
        let mut t = Tweet::new(id, 1, "inheriting", parent);
        t.viewable_group_ids = groups.clone();
        t.editable_group_ids = groups;
        t
    }

    #[tokio::test]
    async fn inheriting_root_is_public_at_input_depth() {
        let store = Arc::new(MockStore::new());
        let root = inheriting(1, None, vec![]);

        let resolved = resolver(store)
            .resolve_visibility(&root, &[7], &[8], 3)
            .await
            .unwrap();

        assert_eq!(resolved, ResolvedAudience::public(3));
    }

    #[tokio::test]
    async fn non_inheriting_without_grant_defaults_to_public() {
        let store = Arc::new(MockStore::new());
        let tweet = explicit(1, None, vec![]);

        let resolved = resolver(store)
            .resolve_visibility(&tweet, &[], &[], 0)
            .await
            .unwrap();

        assert_eq!(resolved, ResolvedAudience::public(0));
    }

    #[tokio::test]
    async fn non_inheriting_with_grant_is_scoped_locally() {
        let store = Arc::new(MockStore::new());
        let tweet = explicit(1, None, vec![]);

        let resolved = resolver(store)
            .resolve_editability(&tweet, &[4, 5], &[9], 0)
            .await
            .unwrap();

        assert_eq!(resolved, ResolvedAudience::scoped(0, vec![4, 5], vec![9]));
        assert!(resolved.is_local());
    }

    #[tokio::test]
    async fn leaf_takes_grandparent_grant_two_hops_up() {
        let store = Arc::new(MockStore::new());
        store.insert_tweet(explicit(1, None, vec![1]));
        store.insert_tweet(inheriting(2, Some(1), vec![2]));
        let leaf = inheriting(3, Some(2), vec![]);
        store.insert_tweet(leaf.clone());

        let resolved = resolver(store)
            .resolve_visibility(&leaf, &[], &[], 0)
            .await
            .unwrap();

        assert_eq!(resolved.depth, 2);
        assert_eq!(
            resolved.audience,
            EffectiveAudience::Scoped {
                user_ids: vec![],
                group_ids: vec![1]
            }
        );
    }

    #[tokio::test]
    async fn depth_grows_by_one_per_hop() {
        let store = Arc::new(MockStore::new());
        store.insert_tweet(explicit(1, None, vec![]));
        for id in 2..=6 {
            store.insert_tweet(inheriting(id, Some(id - 1), vec![]));
        }
        let resolver = resolver(store.clone());

        for id in 1..=6 {
            let tweet = store.tweet(id).unwrap();
            let resolved = resolver.resolve_current(PermissionAxis::View, &tweet).await.unwrap();
            assert_eq!(resolved, ResolvedAudience::public((id - 1) as u32));
        }
    }

    #[tokio::test]
    async fn inheritance_discards_the_callers_grant() {
        let store = Arc::new(MockStore::new());
        store.insert_tweet(explicit(1, None, vec![]));
        let child = inheriting(2, Some(1), vec![]);

        let resolved = resolver(store)
            .resolve_visibility(&child, &[10, 11], &[12], 0)
            .await
            .unwrap();

        assert_eq!(resolved, ResolvedAudience::public(1));
    }

    #[tokio::test]
    async fn axes_resolve_independently() {
        let store = Arc::new(MockStore::new());
        let mut root = explicit(1, None, vec![]);
        root.viewable_group_ids = vec![3];
        root.editable_group_ids = vec![4];
        store.insert_tweet(root);
        let mut child = inheriting(2, Some(1), vec![]);
        child.inherit_edit_permissions = false;
        let resolver = resolver(store);

        let view = resolver.resolve_current(PermissionAxis::View, &child).await.unwrap();
        let edit = resolver.resolve_current(PermissionAxis::Edit, &child).await.unwrap();

        assert_eq!(view, ResolvedAudience::scoped(1, vec![], vec![3]));
        assert_eq!(edit, ResolvedAudience::public(0));
    }

    #[tokio::test]
    async fn missing_parent_is_not_found() {
        let store = Arc::new(MockStore::new());
        let orphan = inheriting(2, Some(99), vec![]);

        let result = resolver(store)
            .resolve_visibility(&orphan, &[], &[], 0)
            .await;

        assert!(matches!(result, Err(ServiceError::TweetNotFound(99))));
    }

    #[tokio::test]
    async fn cyclic_chain_is_rejected() {
        let store = Arc::new(MockStore::new());
        store.insert_tweet(inheriting(1, Some(2), vec![]));
        store.insert_tweet(inheriting(2, Some(1), vec![]));
        let tweet = store.tweet(1).unwrap();

        let result = resolver(store)
            .resolve_visibility(&tweet, &[], &[], 0)
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::CorruptPermissionChain { tweet_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn chains_longer_than_the_bound_are_rejected() {
        let store = Arc::new(MockStore::new());
        store.insert_tweet(explicit(1, None, vec![]));
        for id in 2..=5 {
            store.insert_tweet(inheriting(id, Some(id - 1), vec![]));
        }
        let leaf = store.tweet(5).unwrap();
        let bounded = PermissionResolver::new(store, 3);

        let result = bounded.resolve_visibility(&leaf, &[], &[], 0).await;

        assert!(matches!(
            result,
            Err(ServiceError::CorruptPermissionChain { tweet_id: 5, hops: 3 })
        ));
    }
}
