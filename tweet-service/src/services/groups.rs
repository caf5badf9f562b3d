//! Group assignment: turns an explicit (users, groups) grant into concrete
//! groups, reusing a group whose members match the user set exactly and
//! creating one otherwise.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{GroupStore, ServiceError};
use crate::models::{Group, GroupId, UserId};

#[derive(Clone)]
pub struct GroupAssignmentEngine {
    groups: Arc<dyn GroupStore>,
}

impl GroupAssignmentEngine {
    pub fn new(groups: Arc<dyn GroupStore>) -> Self {
        Self { groups }
    }

    /// Returns the union of the user-set group(s) and the named groups,
    /// one entry per group id, ordered by id.
    ///
    /// An empty `user_ids` contributes no group. Unknown users or group ids
    /// fail the whole assignment before anything is created.
    #[instrument(skip(self))]
    pub async fn assign_groups_to_users(
        &self,
        user_ids: &[UserId],
        group_ids: &[GroupId],
        author_id: UserId,
    ) -> Result<Vec<Group>, ServiceError> {
        let user_set: BTreeSet<UserId> = user_ids.iter().copied().collect();
        let mut assigned: BTreeMap<GroupId, Group> = BTreeMap::new();

        let named = self.find_named_groups(group_ids).await?;

        if !user_set.is_empty() {
            self.check_users(&user_set).await?;

            let matching = self.groups.find_groups_with_exact_members(&user_set).await?;
            if matching.is_empty() {
                let group = self.groups.create_group(&user_set, author_id).await?;
                info!(
                    group_id = group.id,
                    members = user_set.len(),
                    "Created group for user grant"
                );
                assigned.insert(group.id, group);
            } else {
                for group in matching {
                    assigned.insert(group.id, group);
                }
            }
        }

        for group in named {
            assigned.entry(group.id).or_insert(group);
        }

        Ok(assigned.into_values().collect())
    }

    /// Check that every user and named group exists without creating
    /// anything. Lets a caller validate several grants before assigning any.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        user_ids: &[UserId],
        group_ids: &[GroupId],
    ) -> Result<(), ServiceError> {
        self.find_named_groups(group_ids).await?;
        let user_set: BTreeSet<UserId> = user_ids.iter().copied().collect();
        if !user_set.is_empty() {
            self.check_users(&user_set).await?;
        }
        Ok(())
    }

    async fn check_users(&self, user_set: &BTreeSet<UserId>) -> Result<(), ServiceError> {
        match self.groups.find_missing_users(user_set).await?.into_iter().next() {
            Some(missing) => Err(ServiceError::UserNotFound(missing)),
            None => Ok(()),
        }
    }

    async fn find_named_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>, ServiceError> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let requested: BTreeSet<GroupId> = group_ids.iter().copied().collect();
        let ids: Vec<GroupId> = requested.iter().copied().collect();
        let found = self.groups.find_groups_by_ids(&ids).await?;

        let found_ids: BTreeSet<GroupId> = found.iter().map(|g| g.id).collect();
        if let Some(missing) = requested.difference(&found_ids).next() {
            return Err(ServiceError::GroupNotFound(*missing));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockStore;

    fn group(id: GroupId, members: &[UserId]) -> Group {
        Group {
            id,
            creator_id: 99,
            members: members.iter().copied().collect(),
        }
    }

    fn store_with_users() -> Arc<MockStore> {
        let store = Arc::new(MockStore::new());
        store.add_users(1..=10);
        store
    }

    #[tokio::test]
    async fn creates_one_group_when_no_exact_match_exists() {
        let store = store_with_users();
        store.insert_group(group(5, &[1, 2, 3]));
        let engine = GroupAssignmentEngine::new(store.clone());

        let groups = engine.assign_groups_to_users(&[1, 2], &[], 42).await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, BTreeSet::from([1, 2]));
        assert_eq!(groups[0].creator_id, 42);
        assert_eq!(store.groups().len(), 2);
    }

    #[tokio::test]
    async fn reuses_exact_match_and_adds_named_groups() {
        let store = store_with_users();
        store.insert_group(group(1, &[1, 2]));
        store.insert_group(group(3, &[7]));
        let engine = GroupAssignmentEngine::new(store.clone());

        let groups = engine.assign_groups_to_users(&[2, 1], &[3], 42).await.unwrap();

        let ids: Vec<GroupId> = groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(store.groups().len(), 2);
    }

    #[tokio::test]
    async fn superset_groups_do_not_count_as_a_match() {
        let store = store_with_users();
        store.insert_group(group(1, &[1, 2, 3]));
        store.insert_group(group(2, &[1]));
        let engine = GroupAssignmentEngine::new(store.clone());

        let groups = engine.assign_groups_to_users(&[1, 2], &[], 42).await.unwrap();

        assert_eq!(groups.len(), 1);
        assert!(groups[0].id != 1 && groups[0].id != 2);
    }

    #[tokio::test]
    async fn named_group_equal_to_matched_group_appears_once() {
        let store = store_with_users();
        store.insert_group(group(1, &[1, 2]));
        let engine = GroupAssignmentEngine::new(store);

        let groups = engine.assign_groups_to_users(&[1, 2], &[1, 1], 42).await.unwrap();

        assert_eq!(groups, vec![group(1, &[1, 2])]);
    }

    #[tokio::test]
    async fn empty_user_set_only_returns_named_groups() {
        let store = store_with_users();
        store.insert_group(group(4, &[9]));
        let engine = GroupAssignmentEngine::new(store.clone());

        let groups = engine.assign_groups_to_users(&[], &[4], 42).await.unwrap();

        assert_eq!(groups, vec![group(4, &[9])]);
        assert_eq!(store.groups().len(), 1);
    }

    #[tokio::test]
    async fn unknown_user_fails_without_creating_a_group() {
        let store = store_with_users();
        let engine = GroupAssignmentEngine::new(store.clone());

        let result = engine.assign_groups_to_users(&[1, 404], &[], 42).await;

        assert!(matches!(result, Err(ServiceError::UserNotFound(404))));
        assert!(store.groups().is_empty());
    }

    #[tokio::test]
    async fn unknown_group_fails() {
        let store = store_with_users();
        let engine = GroupAssignmentEngine::new(store);

        let result = engine.assign_groups_to_users(&[1], &[77], 42).await;

        assert!(matches!(result, Err(ServiceError::GroupNotFound(77))));
    }

    #[tokio::test]
    async fn validate_reports_unknown_ids_and_creates_nothing() {
        let store = store_with_users();
        store.insert_group(group(2, &[1]));
        let engine = GroupAssignmentEngine::new(store.clone());

        assert!(engine.validate(&[3, 4], &[2]).await.is_ok());
        assert!(matches!(
            engine.validate(&[3], &[2, 8]).await,
            Err(ServiceError::GroupNotFound(8))
        ));
        assert!(matches!(
            engine.validate(&[3, 11], &[]).await,
            Err(ServiceError::UserNotFound(11))
        ));
        assert_eq!(store.groups().len(), 1);
    }
}
