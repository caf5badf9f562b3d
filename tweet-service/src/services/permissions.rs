//! Permission orchestration.
//!
//! Mutations write the store first, then project the resolved audiences
//! into the visibility index, the editability flags and the snapshot cache.
//! Projection writes are awaited but never fail the mutation: the cache is a
//! derived view and reads fall back to the resolver when it is missing or
//! unreachable.
//!
//! Entries left behind in scopes or flags the tweet no longer belongs to are
//! not removed here; they age out with their TTL.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::metrics::{CACHE_WRITE_FAILURES_TOTAL, ERRORS_TOTAL, FALLBACKS_TOTAL};
use super::visibility::pack_member;
use super::{
    CacheBackend, CacheKeys, EditabilityFlagStore, GroupAssignmentEngine, GroupStore,
    PermissionResolver, ServiceError, TweetEvent, TweetEventPublisher, TweetSnapshotCache,
    TweetCursor, TweetStore, VisibilityIndex,
};
use crate::config::{CacheConfig, PermissionConfig};
use crate::models::{
    EffectiveAudience, Group, GroupId, IndexEntry, PaginationQuery, PermissionAxis,
    PermissionOutcome, PermissionUpdate, ResolvedAudience, Tweet, TweetId, TweetSnapshot, UserId,
    VisibilityScope,
};

/// Candidate tweets fetched per store round trip by the pagination fallback.
const FALLBACK_BATCH_SIZE: usize = 200;

#[derive(Clone)]
pub struct PermissionService {
    tweets: Arc<dyn TweetStore>,
    resolver: PermissionResolver,
    assignments: GroupAssignmentEngine,
    visibility: VisibilityIndex,
    editability: EditabilityFlagStore,
    snapshots: TweetSnapshotCache,
    publisher: Arc<dyn TweetEventPublisher>,
    max_page_size: usize,
}

impl PermissionService {
    pub fn new(
        tweets: Arc<dyn TweetStore>,
        groups: Arc<dyn GroupStore>,
        cache: Arc<dyn CacheBackend>,
        publisher: Arc<dyn TweetEventPublisher>,
        cache_config: &CacheConfig,
        permission_config: &PermissionConfig,
    ) -> Self {
        let keys = CacheKeys::new(cache_config.namespace.clone());
        Self {
            resolver: PermissionResolver::new(tweets.clone(), permission_config.max_depth),
            assignments: GroupAssignmentEngine::new(groups),
            visibility: VisibilityIndex::new(
                cache.clone(),
                keys.clone(),
                cache_config.visibility_ttl_seconds,
            ),
            editability: EditabilityFlagStore::new(
                cache.clone(),
                keys.clone(),
                cache_config.flag_ttl_seconds,
            ),
            snapshots: TweetSnapshotCache::new(cache, keys, cache_config.snapshot_ttl_seconds),
            tweets,
            publisher,
            max_page_size: permission_config.max_page_size,
        }
    }

    /// Change who may view and edit a tweet. Only the author may do this.
    #[instrument(skip(self, update))]
    pub async fn update_permissions(
        &self,
        caller_id: UserId,
        tweet_id: TweetId,
        update: PermissionUpdate,
    ) -> Result<PermissionOutcome, ServiceError> {
        self.apply_update(caller_id, tweet_id, update)
            .await
            .inspect_err(|e| ERRORS_TOTAL.with_label_values(&[e.kind()]).inc())
    }

    async fn apply_update(
        &self,
        caller_id: UserId,
        tweet_id: TweetId,
        update: PermissionUpdate,
    ) -> Result<PermissionOutcome, ServiceError> {
        let mut tweet = self.load_tweet(tweet_id).await?;
        if tweet.author_id != caller_id {
            return Err(ServiceError::Unauthorized {
                caller_id,
                tweet_id,
            });
        }

        tweet.inherit_view_permissions = update.inherit_view_permissions;
        tweet.inherit_edit_permissions = update.inherit_edit_permissions;

        let view = self
            .resolver
            .resolve_visibility(&tweet, &update.view_user_ids, &update.view_group_ids, 0)
            .await?;
        let edit = self
            .resolver
            .resolve_editability(&tweet, &update.edit_user_ids, &update.edit_group_ids, 0)
            .await?;

        // Both grants are checked before either may create a group.
        self.validate(&view).await?;
        self.validate(&edit).await?;

        let view_groups = self.assign(&view, tweet.author_id).await?;
        let edit_groups = self.assign(&edit, tweet.author_id).await?;

        tweet.viewable_group_ids = local_links(&view, &view_groups);
        tweet.editable_group_ids = local_links(&edit, &edit_groups);

        self.tweets
            .save_permissions(
                tweet.id,
                tweet.inherit_view_permissions,
                tweet.inherit_edit_permissions,
                &tweet.viewable_group_ids,
                &tweet.editable_group_ids,
            )
            .await?;

        info!(
            view_public = view.audience.is_public(),
            view_depth = view.depth,
            edit_public = edit.audience.is_public(),
            edit_depth = edit.depth,
            "Tweet permissions updated"
        );

        let outcome = PermissionOutcome {
            tweet_id: tweet.id,
            view,
            edit,
            view_groups,
            edit_groups,
        };
        self.project(&tweet, &outcome).await;
        self.publish(TweetEvent::PermissionsUpdated {
            tweet_id: tweet.id,
            view: outcome.view.clone(),
            edit: outcome.edit.clone(),
        });

        Ok(outcome)
    }

    /// Project a tweet's current audiences into the cache. Used after a
    /// tweet is created and to repair a stale index.
    #[instrument(skip(self))]
    pub async fn index_tweet(&self, tweet_id: TweetId) -> Result<PermissionOutcome, ServiceError> {
        let tweet = self.load_tweet(tweet_id).await?;

        let view = self
            .resolver
            .resolve_current(PermissionAxis::View, &tweet)
            .await?;
        let edit = self
            .resolver
            .resolve_current(PermissionAxis::Edit, &tweet)
            .await?;

        let outcome = PermissionOutcome {
            tweet_id: tweet.id,
            view_groups: self.assign(&view, tweet.author_id).await?,
            edit_groups: self.assign(&edit, tweet.author_id).await?,
            view,
            edit,
        };

        let scopes = self.project(&tweet, &outcome).await;
        self.publish(TweetEvent::Indexed {
            tweet_id: tweet.id,
            scopes,
        });

        Ok(outcome)
    }

    /// Tweets visible in `scope`, newest first.
    #[instrument(skip(self, scope, query), fields(scope = %scope.label()))]
    pub async fn paginate(
        &self,
        scope: VisibilityScope,
        query: PaginationQuery,
    ) -> Result<Vec<IndexEntry>, ServiceError> {
        let limit = query.limit.clamp(1, self.max_page_size.max(1));

        let reason = match self
            .visibility
            .paginate(
                scope,
                query.creation_timestamp_from,
                query.creation_timestamp_to,
                query.offset,
                limit,
            )
            .await
        {
            Ok(Some(entries)) => return Ok(entries),
            Ok(None) => "miss",
            Err(e) if e.is_cache_error() => {
                warn!(error = %e, "Visibility index unavailable, resolving from store");
                "cache_error"
            }
            Err(e) => return Err(e),
        };
        FALLBACKS_TOTAL
            .with_label_values(&["paginate", reason])
            .inc();

        self.paginate_from_store(scope, query, limit).await
    }

    async fn paginate_from_store(
        &self,
        scope: VisibilityScope,
        query: PaginationQuery,
        limit: usize,
    ) -> Result<Vec<IndexEntry>, ServiceError> {
        if query.creation_timestamp_from > query.creation_timestamp_to {
            return Ok(Vec::new());
        }

        let wanted = query.offset.saturating_add(limit);
        let batch = wanted.min(FALLBACK_BATCH_SIZE);
        let mut cursor: Option<TweetCursor> = None;
        let mut matched = 0usize;
        let mut page = Vec::with_capacity(limit);

        loop {
            let candidates = self
                .tweets
                .list_tweets_created_between(
                    query.creation_timestamp_from,
                    query.creation_timestamp_to,
                    cursor,
                    batch,
                )
                .await?;
            let exhausted = candidates.len() < batch;
            cursor = candidates.last().map(TweetCursor::from);

            for tweet in candidates {
                let view = match self
                    .resolver
                    .resolve_current(PermissionAxis::View, &tweet)
                    .await
                {
                    Ok(view) => view,
                    Err(e @ (ServiceError::CorruptPermissionChain { .. }
                    | ServiceError::TweetNotFound(_))) => {
                        warn!(tweet_id = tweet.id, error = %e, "Skipping tweet with unresolvable permissions");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if !scope.holds(&view.audience) {
                    continue;
                }
                matched += 1;
                if matched > query.offset {
                    page.push(IndexEntry {
                        tweet_id: tweet.id,
                        member: pack_member(tweet.id, &tweet.hashtags, tweet.category),
                        score: tweet.created_at_millis(),
                    });
                    if page.len() >= limit {
                        return Ok(page);
                    }
                }
            }

            if exhausted {
                return Ok(page);
            }
        }
    }

    /// Whether `scope` may edit the tweet. A public-editable tweet is
    /// editable by every group.
    #[instrument(skip(self, scope), fields(scope = %scope.label()))]
    pub async fn can_edit(
        &self,
        tweet_id: TweetId,
        scope: VisibilityScope,
    ) -> Result<bool, ServiceError> {
        let reason = match self.cached_can_edit(tweet_id, scope).await {
            Ok(true) => return Ok(true),
            Ok(false) => "miss",
            Err(e) if e.is_cache_error() => {
                warn!(error = %e, "Editability flags unavailable, resolving from store");
                "cache_error"
            }
            Err(e) => return Err(e),
        };
        FALLBACKS_TOTAL
            .with_label_values(&["can_edit", reason])
            .inc();

        let tweet = self.load_tweet(tweet_id).await?;
        let edit = self
            .resolver
            .resolve_current(PermissionAxis::Edit, &tweet)
            .await?;

        let allowed = edit.audience.is_public() || scope.holds(&edit.audience);
        if allowed {
            let write = if edit.audience.is_public() {
                self.editability.set_public_editable(tweet_id).await
            } else {
                match scope {
                    VisibilityScope::Group(group_id) => {
                        self.editability.set_group_editable(tweet_id, group_id).await
                    }
                    VisibilityScope::Public => Ok(()),
                }
            };
            record_cache_write("editability", tweet_id, write);
        }

        Ok(allowed)
    }

    async fn cached_can_edit(
        &self,
        tweet_id: TweetId,
        scope: VisibilityScope,
    ) -> Result<bool, ServiceError> {
        if self.editability.is_public_editable(tweet_id).await? {
            return Ok(true);
        }
        match scope {
            VisibilityScope::Public => Ok(false),
            VisibilityScope::Group(group_id) => {
                self.editability.is_group_editable(tweet_id, group_id).await
            }
        }
    }

    /// Snapshot of a tweet, served from the cache when possible.
    #[instrument(skip(self))]
    pub async fn get_tweet(&self, tweet_id: TweetId) -> Result<TweetSnapshot, ServiceError> {
        match self.snapshots.get(tweet_id).await {
            Ok(Some(snapshot)) => return Ok(snapshot),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Snapshot cache unavailable, loading from store"),
        }

        let tweet = self.load_tweet(tweet_id).await?;
        let snapshot = TweetSnapshot::from(&tweet);
        record_cache_write("snapshot", tweet_id, self.snapshots.put(&snapshot).await);
        Ok(snapshot)
    }

    async fn load_tweet(&self, tweet_id: TweetId) -> Result<Tweet, ServiceError> {
        self.tweets
            .find_tweet(tweet_id)
            .await?
            .ok_or(ServiceError::TweetNotFound(tweet_id))
    }

    async fn validate(&self, resolved: &ResolvedAudience) -> Result<(), ServiceError> {
        match &resolved.audience {
            EffectiveAudience::Public => Ok(()),
            EffectiveAudience::Scoped {
                user_ids,
                group_ids,
            } => self.assignments.validate(user_ids, group_ids).await,
        }
    }

    async fn assign(
        &self,
        resolved: &ResolvedAudience,
        author_id: UserId,
    ) -> Result<Vec<Group>, ServiceError> {
        match &resolved.audience {
            EffectiveAudience::Public => Ok(Vec::new()),
            EffectiveAudience::Scoped {
                user_ids,
                group_ids,
            } => {
                self.assignments
                    .assign_groups_to_users(user_ids, group_ids, author_id)
                    .await
            }
        }
    }

    /// Write index entries, edit flags and the snapshot for `tweet`.
    /// Failures are logged and counted. Returns the visibility scopes.
    async fn project(&self, tweet: &Tweet, outcome: &PermissionOutcome) -> Vec<VisibilityScope> {
        let scopes = scopes_for(&outcome.view, &outcome.view_groups);
        let created_at = tweet.created_at_millis();

        let added = join_all(scopes.iter().map(|scope| {
            self.visibility.add_to_scope(
                *scope,
                tweet.id,
                &tweet.hashtags,
                tweet.category,
                created_at,
            )
        }))
        .await;
        for result in added {
            record_cache_write("visibility", tweet.id, result);
        }

        if outcome.edit.audience.is_public() {
            record_cache_write(
                "editability",
                tweet.id,
                self.editability.set_public_editable(tweet.id).await,
            );
        } else {
            let flagged = join_all(
                outcome
                    .edit_groups
                    .iter()
                    .map(|g| self.editability.set_group_editable(tweet.id, g.id)),
            )
            .await;
            for result in flagged {
                record_cache_write("editability", tweet.id, result);
            }
        }

        record_cache_write(
            "snapshot",
            tweet.id,
            self.snapshots.put(&TweetSnapshot::from(tweet)).await,
        );

        scopes
    }

    fn publish(&self, event: TweetEvent) {
        let tweet_id = event.tweet_id();
        if let Err(e) = self.publisher.publish(event) {
            warn!(tweet_id = tweet_id, error = %e, "Failed to publish tweet event");
        }
    }
}

/// Group links stored on the tweet: only a grant decided by the tweet itself.
fn local_links(resolved: &ResolvedAudience, groups: &[Group]) -> Vec<GroupId> {
    if resolved.is_local() && !resolved.audience.is_public() {
        groups.iter().map(|g| g.id).collect()
    } else {
        Vec::new()
    }
}

fn scopes_for(resolved: &ResolvedAudience, groups: &[Group]) -> Vec<VisibilityScope> {
    if resolved.audience.is_public() {
        vec![VisibilityScope::Public]
    } else {
        groups.iter().map(|g| VisibilityScope::Group(g.id)).collect()
    }
}

fn record_cache_write(component: &'static str, tweet_id: TweetId, result: Result<(), ServiceError>) {
    if let Err(e) = result {
        warn!(
            tweet_id = tweet_id,
            component = component,
            error = %e,
            "Cache write failed, continuing without it"
        );
        CACHE_WRITE_FAILURES_TOTAL
            .with_label_values(&[component])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn group(id: GroupId) -> Group {
        Group {
            id,
            creator_id: 1,
            members: BTreeSet::from([1]),
        }
    }

    #[test]
    fn only_local_scoped_decisions_are_linked() {
        let groups = vec![group(3), group(4)];

        assert_eq!(
            local_links(&ResolvedAudience::scoped(0, vec![], vec![3, 4]), &groups),
            vec![3, 4]
        );
        assert!(local_links(&ResolvedAudience::scoped(2, vec![], vec![3, 4]), &groups).is_empty());
        assert!(local_links(&ResolvedAudience::public(0), &[]).is_empty());
    }

    #[test]
    fn public_audience_maps_to_the_public_scope_only() {
        assert_eq!(
            scopes_for(&ResolvedAudience::public(1), &[group(3)]),
            vec![VisibilityScope::Public]
        );
        assert_eq!(
            scopes_for(&ResolvedAudience::scoped(0, vec![1], vec![]), &[group(3)]),
            vec![VisibilityScope::Group(3)]
        );
    }
}
