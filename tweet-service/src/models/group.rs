//! Group model - a named set of users used as a permission audience.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;

use super::tweet::{GroupId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub creator_id: UserId,
    pub members: BTreeSet<UserId>,
}

impl Group {
    /// True when the member set equals `user_ids` exactly.
    pub fn has_exact_members(&self, user_ids: &BTreeSet<UserId>) -> bool {
        &self.members == user_ids
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupRow {
    pub id: GroupId,
    pub creator_id: UserId,
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupMemberRow {
    pub group_id: GroupId,
    pub user_id: UserId,
}
