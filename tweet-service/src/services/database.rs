//! PostgreSQL implementation of the tweet and group stores.
//!
//! Tables are owned by the tweet and group CRUD services; this store only
//! reads them and writes permission flags, permission links and groups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{info, instrument};

use super::metrics::DB_QUERY_DURATION;
use super::{GroupStore, ServiceError, TweetCursor, TweetStore};
use crate::models::{Group, GroupId, GroupMemberRow, GroupRow, Tweet, TweetId, TweetRow, UserId};

const TWEET_COLUMNS: &str = "id, author_id, content, location, parent_tweet_id, \
     inherit_view_permissions, inherit_edit_permissions, category, created_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "tweet-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Attach hashtags and permission links to tweet rows, keeping row order.
    async fn hydrate_tweets(&self, rows: Vec<TweetRow>) -> Result<Vec<Tweet>, ServiceError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<TweetId> = rows.iter().map(|r| r.id).collect();

        let hashtags: Vec<(TweetId, String)> = sqlx::query_as(
            "SELECT tweet_id, tag FROM tweet_hashtags \
             WHERE tweet_id = ANY($1) ORDER BY tweet_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let view_links: Vec<(TweetId, GroupId)> = sqlx::query_as(
            "SELECT tweet_id, group_id FROM tweet_view_groups \
             WHERE tweet_id = ANY($1) ORDER BY tweet_id, group_id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let edit_links: Vec<(TweetId, GroupId)> = sqlx::query_as(
            "SELECT tweet_id, group_id FROM tweet_edit_groups \
             WHERE tweet_id = ANY($1) ORDER BY tweet_id, group_id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut hashtags = group_by_tweet(hashtags);
        let mut view_links = group_by_tweet(view_links);
        let mut edit_links = group_by_tweet(edit_links);

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_tweet(
                    hashtags.remove(&id).unwrap_or_default(),
                    view_links.remove(&id).unwrap_or_default(),
                    edit_links.remove(&id).unwrap_or_default(),
                )
                .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Tweet {}: {}", id, e)))
            })
            .collect()
    }

    async fn hydrate_groups(&self, rows: Vec<GroupRow>) -> Result<Vec<Group>, ServiceError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<GroupId> = rows.iter().map(|r| r.id).collect();

        let members: Vec<GroupMemberRow> = sqlx::query_as(
            "SELECT group_id, user_id FROM group_members WHERE group_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_group: HashMap<GroupId, BTreeSet<UserId>> = HashMap::new();
        for m in members {
            by_group.entry(m.group_id).or_default().insert(m.user_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| Group {
                id: row.id,
                creator_id: row.creator_id,
                members: by_group.remove(&row.id).unwrap_or_default(),
            })
            .collect())
    }
}

/// Earliest instant a Postgres `timestamptz` can hold (4714-11-24 BC).
const POSTGRES_MIN_TIMESTAMP_MILLIS: i64 = -210_866_803_200_000;

/// Millisecond bound as a timestamp both chrono and Postgres can represent.
fn timestamp_bound(millis: i64) -> DateTime<Utc> {
    let clamped = millis.clamp(
        POSTGRES_MIN_TIMESTAMP_MILLIS,
        DateTime::<Utc>::MAX_UTC.timestamp_millis(),
    );
    DateTime::from_timestamp_millis(clamped).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn group_by_tweet<T>(pairs: Vec<(TweetId, T)>) -> HashMap<TweetId, Vec<T>> {
    let mut grouped: HashMap<TweetId, Vec<T>> = HashMap::new();
    for (tweet_id, value) in pairs {
        grouped.entry(tweet_id).or_default().push(value);
    }
    grouped
}

#[async_trait]
impl TweetStore for PgStore {
    #[instrument(skip(self))]
    async fn find_tweet(&self, id: TweetId) -> Result<Option<Tweet>, ServiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_tweet"])
            .start_timer();

        let row: Option<TweetRow> =
            sqlx::query_as(&format!("SELECT {} FROM tweets WHERE id = $1", TWEET_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let tweet = match row {
            Some(row) => self.hydrate_tweets(vec![row]).await?.pop(),
            None => None,
        };

        timer.observe_duration();
        Ok(tweet)
    }

    #[instrument(skip(self))]
    async fn list_tweets_created_between(
        &self,
        from_millis: i64,
        to_millis: i64,
        after: Option<TweetCursor>,
        limit: usize,
    ) -> Result<Vec<Tweet>, ServiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_tweets_created_between"])
            .start_timer();

        // Half-open bounds on the raw column keep the created_at index usable.
        let rows: Vec<TweetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tweets \
             WHERE created_at >= $1 AND created_at < $2 \
               AND ($3::timestamptz IS NULL OR (created_at, id) < ($3, $4)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $5",
            TWEET_COLUMNS
        ))
        .bind(timestamp_bound(from_millis))
        .bind(timestamp_bound(to_millis.saturating_add(1)))
        .bind(after.map(|c| c.created_at))
        .bind(after.map(|c| c.id))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let tweets = self.hydrate_tweets(rows).await?;

        timer.observe_duration();
        Ok(tweets)
    }

    #[instrument(skip(self, view_group_ids, edit_group_ids))]
    async fn save_permissions(
        &self,
        id: TweetId,
        inherit_view: bool,
        inherit_edit: bool,
        view_group_ids: &[GroupId],
        edit_group_ids: &[GroupId],
    ) -> Result<(), ServiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_permissions"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE tweets SET inherit_view_permissions = $2, inherit_edit_permissions = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(inherit_view)
        .bind(inherit_edit)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ServiceError::TweetNotFound(id));
        }

        sqlx::query("DELETE FROM tweet_view_groups WHERE tweet_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO tweet_view_groups (tweet_id, group_id) \
             SELECT $1, unnest($2::bigint[])",
        )
        .bind(id)
        .bind(view_group_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tweet_edit_groups WHERE tweet_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO tweet_edit_groups (tweet_id, group_id) \
             SELECT $1, unnest($2::bigint[])",
        )
        .bind(id)
        .bind(edit_group_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        timer.observe_duration();
        info!(
            tweet_id = id,
            view_groups = view_group_ids.len(),
            edit_groups = edit_group_ids.len(),
            "Tweet permissions saved"
        );
        Ok(())
    }
}

#[async_trait]
impl GroupStore for PgStore {
    #[instrument(skip(self))]
    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<Group>, ServiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_groups_by_ids"])
            .start_timer();

        let rows: Vec<GroupRow> =
            sqlx::query_as("SELECT id, creator_id FROM groups WHERE id = ANY($1) ORDER BY id")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        let groups = self.hydrate_groups(rows).await?;

        timer.observe_duration();
        Ok(groups)
    }

    #[instrument(skip(self))]
    async fn find_groups_with_exact_members(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<Group>, ServiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_groups_with_exact_members"])
            .start_timer();

        let sorted: Vec<UserId> = user_ids.iter().copied().collect();
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT g.id, g.creator_id FROM groups g \
             JOIN group_members gm ON gm.group_id = g.id \
             GROUP BY g.id, g.creator_id \
             HAVING array_agg(DISTINCT gm.user_id ORDER BY gm.user_id) = $1::bigint[] \
             ORDER BY g.id",
        )
        .bind(&sorted)
        .fetch_all(&self.pool)
        .await?;
        let groups = self.hydrate_groups(rows).await?;

        timer.observe_duration();
        Ok(groups)
    }

    #[instrument(skip(self, user_ids), fields(members = user_ids.len()))]
    async fn create_group(
        &self,
        user_ids: &BTreeSet<UserId>,
        creator_id: UserId,
    ) -> Result<Group, ServiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_group"])
            .start_timer();

        let members: Vec<UserId> = user_ids.iter().copied().collect();
        let mut tx = self.pool.begin().await?;

        let id: GroupId =
            sqlx::query_scalar("INSERT INTO groups (creator_id) VALUES ($1) RETURNING id")
                .bind(creator_id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            "INSERT INTO group_members (group_id, user_id) SELECT $1, unnest($2::bigint[])",
        )
        .bind(id)
        .bind(&members)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.observe_duration();

        Ok(Group {
            id,
            creator_id,
            members: user_ids.clone(),
        })
    }

    #[instrument(skip(self, user_ids))]
    async fn find_missing_users(
        &self,
        user_ids: &BTreeSet<UserId>,
    ) -> Result<Vec<UserId>, ServiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_missing_users"])
            .start_timer();

        let requested: Vec<UserId> = user_ids.iter().copied().collect();
        let missing: Vec<UserId> = sqlx::query_scalar(
            "SELECT u.id FROM unnest($1::bigint[]) AS u(id) \
             WHERE NOT EXISTS (SELECT 1 FROM users WHERE users.id = u.id) \
             ORDER BY u.id",
        )
        .bind(&requested)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_pairs_by_tweet_in_order() {
        let grouped = group_by_tweet(vec![
            (1, "a".to_string()),
            (2, "x".to_string()),
            (1, "b".to_string()),
        ]);
        assert_eq!(grouped[&1], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(grouped[&2], vec!["x".to_string()]);
    }

    #[test]
    fn timestamp_bounds_clamp_to_the_representable_range() {
        assert_eq!(timestamp_bound(1_500).timestamp_millis(), 1_500);
        assert_eq!(
            timestamp_bound(i64::MIN).timestamp_millis(),
            POSTGRES_MIN_TIMESTAMP_MILLIS
        );
        assert_eq!(
            timestamp_bound(i64::MAX).timestamp_millis(),
            DateTime::<Utc>::MAX_UTC.timestamp_millis()
        );
    }
}
