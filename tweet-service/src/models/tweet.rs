//! Tweet model - a node in the reply forest carrying permission flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::audience::PermissionAxis;

pub type TweetId = i64;
pub type UserId = i64;
pub type GroupId = i64;

/// Closed set of tweet categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TweetCategory {
    News,
    Sport,
    Entertainment,
    Technology,
    Other,
}

impl TweetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TweetCategory::News => "news",
            TweetCategory::Sport => "sport",
            TweetCategory::Entertainment => "entertainment",
            TweetCategory::Technology => "technology",
            TweetCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for TweetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TweetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "news" => Ok(TweetCategory::News),
            "sport" => Ok(TweetCategory::Sport),
            "entertainment" => Ok(TweetCategory::Entertainment),
            "technology" => Ok(TweetCategory::Technology),
            "other" => Ok(TweetCategory::Other),
            _ => Err(format!("Invalid tweet category: {}", s)),
        }
    }
}

/// Tweet entity as loaded from the tweet store, including its hashtags and
/// group-permission links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: TweetId,
    pub author_id: UserId,
    pub content: String,
    pub location: Option<String>,
    pub parent_tweet_id: Option<TweetId>,
    pub inherit_view_permissions: bool,
    pub inherit_edit_permissions: bool,
    pub viewable_group_ids: Vec<GroupId>,
    pub editable_group_ids: Vec<GroupId>,
    pub hashtags: Vec<String>,
    pub category: TweetCategory,
    pub created_at: DateTime<Utc>,
}

impl Tweet {
    /// Create a tweet that inherits both permissions from its parent chain.
    pub fn new(
        id: TweetId,
        author_id: UserId,
        content: impl Into<String>,
        parent_tweet_id: Option<TweetId>,
    ) -> Self {
        Self {
            id,
            author_id,
            content: content.into(),
            location: None,
            parent_tweet_id,
            inherit_view_permissions: true,
            inherit_edit_permissions: true,
            viewable_group_ids: Vec::new(),
            editable_group_ids: Vec::new(),
            hashtags: Vec::new(),
            category: TweetCategory::Other,
            created_at: Utc::now(),
        }
    }

    pub fn inherits(&self, axis: PermissionAxis) -> bool {
        match axis {
            PermissionAxis::View => self.inherit_view_permissions,
            PermissionAxis::Edit => self.inherit_edit_permissions,
        }
    }

    /// Groups linked directly to this tweet for the given axis.
    pub fn own_group_ids(&self, axis: PermissionAxis) -> &[GroupId] {
        match axis {
            PermissionAxis::View => &self.viewable_group_ids,
            PermissionAxis::Edit => &self.editable_group_ids,
        }
    }

    /// Ordering score used by the visibility index.
    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}

/// Row shape of the `tweets` table; hashtags and group links are loaded
/// separately and attached with [`TweetRow::into_tweet`].
#[derive(Debug, Clone, FromRow)]
pub struct TweetRow {
    pub id: TweetId,
    pub author_id: UserId,
    pub content: String,
    pub location: Option<String>,
    pub parent_tweet_id: Option<TweetId>,
    pub inherit_view_permissions: bool,
    pub inherit_edit_permissions: bool,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl TweetRow {
    pub fn into_tweet(
        self,
        hashtags: Vec<String>,
        viewable_group_ids: Vec<GroupId>,
        editable_group_ids: Vec<GroupId>,
    ) -> Result<Tweet, String> {
        Ok(Tweet {
            id: self.id,
            author_id: self.author_id,
            content: self.content,
            location: self.location,
            parent_tweet_id: self.parent_tweet_id,
            inherit_view_permissions: self.inherit_view_permissions,
            inherit_edit_permissions: self.inherit_edit_permissions,
            viewable_group_ids,
            editable_group_ids,
            hashtags,
            category: self.category.parse()?,
            created_at: self.created_at,
        })
    }
}
