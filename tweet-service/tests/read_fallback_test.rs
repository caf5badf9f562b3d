//! Reads served from the cache and their fallback through the resolver.

mod common;

use common::{group, group_tweet, public_tweet, reply, spawn_app, spawn_app_with, TestApp};
use tokio_test::{assert_err, assert_ok};
use tweet_service::config::PermissionConfig;
use tweet_service::models::{PaginationQuery, TweetCategory, TweetId, VisibilityScope};
use tweet_service::services::ServiceError;

fn ids(entries: &[tweet_service::models::IndexEntry]) -> Vec<TweetId> {
    entries.iter().map(|e| e.tweet_id).collect()
}

async fn seed_public(app: &TestApp, count: i64) {
    for id in 1..=count {
        app.store.insert_tweet(public_tweet(id, 1, id * 1_000));
        assert_ok!(app.service.index_tweet(id).await);
    }
}

#[tokio::test]
async fn pages_come_from_the_index() {
    let app = spawn_app();
    seed_public(&app, 6).await;
    // prove the store is not consulted
    app.store.set_unavailable(true);

    let first = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(0, 10_000, 0, 3))
            .await
    );
    let second = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(0, 10_000, 3, 3))
            .await
    );

    assert_eq!(ids(&first), vec![6, 5, 4]);
    assert_eq!(ids(&second), vec![3, 2, 1]);
    assert_eq!(first[0].score, 6_000);
}

#[tokio::test]
async fn cache_outage_falls_back_to_the_store() {
    let app = spawn_app();
    seed_public(&app, 5).await;
    app.store.insert_group(group(9, 1, &[1]));
    app.store.insert_tweet(group_tweet(50, 1, &[9], 4_500));
    app.cache.set_unavailable(true);

    let first = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(1_000, 5_000, 0, 2))
            .await
    );
    let second = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(1_000, 5_000, 2, 2))
            .await
    );
    let group_page = assert_ok!(
        app.service
            .paginate(VisibilityScope::Group(9), PaginationQuery::new(0, 10_000, 0, 10))
            .await
    );

    assert_eq!(ids(&first), vec![5, 4]);
    assert_eq!(ids(&second), vec![3, 2]);
    assert_eq!(ids(&group_page), vec![50]);
}

#[tokio::test]
async fn missing_scope_falls_back_without_writing_back() {
    let app = spawn_app();
    app.store.insert_tweet(public_tweet(1, 1, 1_000));
    app.store.insert_tweet(reply(2, 1, 1, 2_000));

    let page = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(0, 5_000, 0, 10))
            .await
    );

    assert_eq!(ids(&page), vec![2, 1]);
    assert_eq!(page[0].member, "2_other");
    assert!(app.cache.members(&app.key("visible:public")).is_empty());
}

#[tokio::test]
async fn fallback_skips_tweets_with_corrupt_chains() {
    let app = spawn_app();
    app.store.insert_tweet(public_tweet(1, 1, 1_000));
    app.store.insert_tweet(reply(2, 1, 3, 2_000));
    app.store.insert_tweet(reply(3, 1, 2, 3_000));

    let page = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(0, 5_000, 0, 10))
            .await
    );

    assert_eq!(ids(&page), vec![1]);
}

#[tokio::test]
async fn fallback_surfaces_store_failures() {
    let app = spawn_app();
    app.cache.set_unavailable(true);
    app.store.set_unavailable(true);

    let err = assert_err!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(0, 5_000, 0, 10))
            .await
    );
    assert!(matches!(err, ServiceError::Database(_)));
}

#[tokio::test]
async fn huge_offset_during_outage_returns_an_empty_page() {
    let app = spawn_app();
    seed_public(&app, 3).await;
    app.cache.set_unavailable(true);

    let page = assert_ok!(
        app.service
            .paginate(
                VisibilityScope::Public,
                PaginationQuery::new(0, 5_000, usize::MAX, 10)
            )
            .await
    );
    assert!(page.is_empty());
}

#[tokio::test]
async fn fallback_reads_the_window_in_batches() {
    let app = spawn_app();
    app.store.insert_group(group(9, 1, &[1]));
    // the newest half is group-only, so public matches start past the first batch
    for id in 1..=500 {
        let created = id * 10;
        if id > 250 {
            app.store.insert_tweet(group_tweet(id, 1, &[9], created));
        } else {
            app.store.insert_tweet(public_tweet(id, 1, created));
        }
    }
    app.cache.set_unavailable(true);

    let page = assert_ok!(
        app.service
            .paginate(
                VisibilityScope::Public,
                PaginationQuery::new(0, i64::MAX, 150, 100)
            )
            .await
    );
    assert_eq!(ids(&page), (1..=100).rev().collect::<Vec<_>>());
    assert_eq!(app.store.list_calls(), 3);

    let page = assert_ok!(
        app.service
            .paginate(VisibilityScope::Group(9), PaginationQuery::new(0, i64::MAX, 0, 2))
            .await
    );
    assert_eq!(ids(&page), vec![500, 499]);
    assert_eq!(app.store.list_calls(), 4);
}

#[tokio::test]
async fn page_size_is_clamped() {
    let app = spawn_app_with(PermissionConfig {
        max_page_size: 2,
        ..PermissionConfig::default()
    });
    seed_public(&app, 4).await;

    let page = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(0, 10_000, 0, 50))
            .await
    );
    assert_eq!(ids(&page), vec![4, 3]);

    let page = assert_ok!(
        app.service
            .paginate(VisibilityScope::Public, PaginationQuery::new(0, 10_000, 0, 0))
            .await
    );
    assert_eq!(ids(&page), vec![4]);
}

#[tokio::test]
async fn can_edit_recomputes_a_missing_flag_and_writes_it_back() {
    let app = spawn_app();
    app.store.insert_group(group(4, 1, &[1]));
    app.store.insert_tweet(group_tweet(20, 1, &[4], 1_000));
    app.store.insert_tweet(reply(21, 2, 20, 2_000));
    let flag = app.key("editable:group:21:4");

    assert!(assert_ok!(app.service.can_edit(21, VisibilityScope::Group(4)).await));
    assert!(app.cache.ttl(&flag).is_some());

    assert!(!assert_ok!(app.service.can_edit(21, VisibilityScope::Group(5)).await));
    assert!(app.cache.ttl(&app.key("editable:group:21:5")).is_none());
    assert!(!assert_ok!(app.service.can_edit(21, VisibilityScope::Public).await));

    // the written-back flag now answers without the store
    app.store.set_unavailable(true);
    assert!(assert_ok!(app.service.can_edit(21, VisibilityScope::Group(4)).await));
}

#[tokio::test]
async fn can_edit_survives_a_cache_outage() {
    let app = spawn_app();
    app.store.insert_tweet(public_tweet(30, 1, 1_000));
    app.cache.set_unavailable(true);

    assert!(assert_ok!(app.service.can_edit(30, VisibilityScope::Public).await));
    assert!(assert_ok!(app.service.can_edit(30, VisibilityScope::Group(8)).await));

    let err = assert_err!(app.service.can_edit(31, VisibilityScope::Public).await);
    assert!(matches!(err, ServiceError::TweetNotFound(31)));
}

#[tokio::test]
async fn snapshot_read_through_replaces_a_corrupt_entry() {
    let app = spawn_app();
    let mut tweet = public_tweet(40, 6, 1_000);
    tweet.hashtags = vec!["rust".to_string()];
    tweet.location = Some("Porto".to_string());
    tweet.category = TweetCategory::Technology;
    app.store.insert_tweet(tweet);
    app.cache
        .insert_raw(&app.key("snapshot:40"), vec![0x0a, 0x01, 0x00]);

    let snapshot = assert_ok!(app.service.get_tweet(40).await);
    assert_eq!(snapshot.hashtags, vec!["rust".to_string()]);
    assert_eq!(snapshot.location.as_deref(), Some("Porto"));
    assert_eq!(snapshot.category, TweetCategory::Technology);

    app.store.set_unavailable(true);
    let cached = assert_ok!(app.service.get_tweet(40).await);
    assert_eq!(cached, snapshot);
}

#[tokio::test]
async fn snapshot_of_unknown_tweet_is_not_found() {
    let app = spawn_app();
    let err = assert_err!(app.service.get_tweet(41).await);
    assert!(matches!(err, ServiceError::TweetNotFound(41)));
}
