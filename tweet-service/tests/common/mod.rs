//! Common test utilities for tweet-service integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use service_core::observability::init_test_tracing;
use std::collections::BTreeSet;
use std::sync::Arc;
use tweet_service::config::{CacheConfig, PermissionConfig};
use tweet_service::models::{Group, GroupId, Tweet, TweetId, UserId};
use tweet_service::services::{BroadcastPublisher, MockCache, MockStore, PermissionService};

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    init_test_tracing("info,tweet_service=debug");
}

/// A permission service wired to in-memory collaborators.
pub struct TestApp {
    pub store: Arc<MockStore>,
    pub cache: Arc<MockCache>,
    pub events: BroadcastPublisher,
    pub service: PermissionService,
}

impl TestApp {
    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{}", CacheConfig::default().namespace, suffix)
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(PermissionConfig::default())
}

pub fn spawn_app_with(permissions: PermissionConfig) -> TestApp {
    init_tracing();

    let store = Arc::new(MockStore::new());
    let cache = Arc::new(MockCache::new());
    let events = BroadcastPublisher::new(64);

    let service = PermissionService::new(
        store.clone(),
        store.clone(),
        cache.clone(),
        Arc::new(events.clone()),
        &CacheConfig::default(),
        &permissions,
    );

    TestApp {
        store,
        cache,
        events,
        service,
    }
}

pub fn at_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).expect("timestamp in range")
}

/// Root tweet that is public on both axes.
pub fn public_tweet(id: TweetId, author_id: UserId, created_millis: i64) -> Tweet {
    Tweet {
        inherit_view_permissions: false,
        inherit_edit_permissions: false,
        created_at: at_millis(created_millis),
        ..Tweet::new(id, author_id, format!("tweet {}", id), None)
    }
}

/// Root tweet visible to and editable by the given groups only.
pub fn group_tweet(
    id: TweetId,
    author_id: UserId,
    group_ids: &[GroupId],
    created_millis: i64,
) -> Tweet {
    Tweet {
        viewable_group_ids: group_ids.to_vec(),
        editable_group_ids: group_ids.to_vec(),
        ..public_tweet(id, author_id, created_millis)
    }
}

/// Reply inheriting both permissions from `parent_id`.
pub fn reply(id: TweetId, author_id: UserId, parent_id: TweetId, created_millis: i64) -> Tweet {
    Tweet {
        created_at: at_millis(created_millis),
        ..Tweet::new(id, author_id, format!("reply {}", id), Some(parent_id))
    }
}

pub fn group(id: GroupId, creator_id: UserId, members: &[UserId]) -> Group {
    Group {
        id,
        creator_id,
        members: members.iter().copied().collect::<BTreeSet<_>>(),
    }
}
