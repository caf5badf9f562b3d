//! Derived audiences and the scopes of the visibility index.

use serde::{Deserialize, Serialize};

use super::tweet::{GroupId, UserId};

/// Which permission a resolution is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAxis {
    View,
    Edit,
}

impl PermissionAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAxis::View => "view",
            PermissionAxis::Edit => "edit",
        }
    }
}

/// Who may view or edit a tweet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EffectiveAudience {
    Public,
    Scoped {
        user_ids: Vec<UserId>,
        group_ids: Vec<GroupId>,
    },
}

impl EffectiveAudience {
    pub fn is_public(&self) -> bool {
        matches!(self, EffectiveAudience::Public)
    }

    /// Group ids named by a scoped audience; empty for public.
    pub fn group_ids(&self) -> &[GroupId] {
        match self {
            EffectiveAudience::Public => &[],
            EffectiveAudience::Scoped { group_ids, .. } => group_ids,
        }
    }
}

/// An audience together with the number of parent hops it took to decide it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAudience {
    pub depth: u32,
    pub audience: EffectiveAudience,
}

impl ResolvedAudience {
    pub fn public(depth: u32) -> Self {
        Self {
            depth,
            audience: EffectiveAudience::Public,
        }
    }

    pub fn scoped(depth: u32, user_ids: Vec<UserId>, group_ids: Vec<GroupId>) -> Self {
        Self {
            depth,
            audience: EffectiveAudience::Scoped {
                user_ids,
                group_ids,
            },
        }
    }

    /// Decided by the tweet itself rather than an ancestor.
    pub fn is_local(&self) -> bool {
        self.depth == 0
    }
}

/// A partition of the visibility index and editability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "group_id", rename_all = "lowercase")]
pub enum VisibilityScope {
    Public,
    Group(GroupId),
}

impl VisibilityScope {
    /// Whether a tweet with `audience` is filed under this scope.
    pub fn holds(&self, audience: &EffectiveAudience) -> bool {
        match (self, audience) {
            (VisibilityScope::Public, EffectiveAudience::Public) => true,
            (VisibilityScope::Group(id), EffectiveAudience::Scoped { group_ids, .. }) => {
                group_ids.contains(id)
            }
            _ => false,
        }
    }

    pub fn label(&self) -> String {
        match self {
            VisibilityScope::Public => "public".to_string(),
            VisibilityScope::Group(id) => format!("group:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_scope_holds_only_public_audience() {
        let scoped = ResolvedAudience::scoped(0, vec![], vec![1]).audience;
        assert!(VisibilityScope::Public.holds(&EffectiveAudience::Public));
        assert!(!VisibilityScope::Public.holds(&scoped));
    }

    #[test]
    fn group_scope_holds_audiences_naming_the_group() {
        let scoped = ResolvedAudience::scoped(0, vec![5], vec![1, 2]).audience;
        assert!(VisibilityScope::Group(2).holds(&scoped));
        assert!(!VisibilityScope::Group(3).holds(&scoped));
        assert!(!VisibilityScope::Group(1).holds(&EffectiveAudience::Public));
    }
}
