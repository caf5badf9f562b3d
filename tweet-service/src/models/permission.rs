//! Permission mutation and pagination request/response types.

use serde::{Deserialize, Serialize};

use super::audience::ResolvedAudience;
use super::group::Group;
use super::tweet::{GroupId, TweetId, UserId};

/// Request to change who may view and edit a tweet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionUpdate {
    pub inherit_view_permissions: bool,
    pub inherit_edit_permissions: bool,
    #[serde(default)]
    pub view_user_ids: Vec<UserId>,
    #[serde(default)]
    pub view_group_ids: Vec<GroupId>,
    #[serde(default)]
    pub edit_user_ids: Vec<UserId>,
    #[serde(default)]
    pub edit_group_ids: Vec<GroupId>,
}

impl PermissionUpdate {
    /// Inherit both axes from the parent chain.
    pub fn inherit_all() -> Self {
        Self {
            inherit_view_permissions: true,
            inherit_edit_permissions: true,
            ..Default::default()
        }
    }

    /// Explicit public view and edit.
    pub fn public() -> Self {
        Self::default()
    }
}

/// Result of a permission mutation or a reindex.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionOutcome {
    pub tweet_id: TweetId,
    pub view: ResolvedAudience,
    pub edit: ResolvedAudience,
    /// Concrete groups that may view; empty when public.
    pub view_groups: Vec<Group>,
    /// Concrete groups that may edit; empty when public.
    pub edit_groups: Vec<Group>,
}

/// Time-window pagination over a visibility scope.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationQuery {
    pub creation_timestamp_from: i64,
    pub creation_timestamp_to: i64,
    #[serde(default)]
    pub offset: usize,
    pub limit: usize,
}

impl PaginationQuery {
    pub fn new(from: i64, to: i64, offset: usize, limit: usize) -> Self {
        Self {
            creation_timestamp_from: from,
            creation_timestamp_to: to,
            offset,
            limit,
        }
    }
}

/// One page entry: the tweet id plus the packed index member and its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub tweet_id: TweetId,
    pub member: String,
    pub score: i64,
}
