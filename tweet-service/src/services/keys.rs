//! Cache key layout. Every key lives under a configurable namespace.

use crate::models::{GroupId, TweetId, VisibilityScope};

#[derive(Debug, Clone)]
pub struct CacheKeys {
    namespace: String,
}

impl CacheKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Sorted set of tweets visible in `scope`.
    pub fn visibility(&self, scope: VisibilityScope) -> String {
        match scope {
            VisibilityScope::Public => format!("{}:visible:public", self.namespace),
            VisibilityScope::Group(id) => format!("{}:visible:group:{}", self.namespace, id),
        }
    }

    pub fn public_editable(&self, tweet_id: TweetId) -> String {
        format!("{}:editable:public:{}", self.namespace, tweet_id)
    }

    pub fn group_editable(&self, tweet_id: TweetId, group_id: GroupId) -> String {
        format!("{}:editable:group:{}:{}", self.namespace, tweet_id, group_id)
    }

    pub fn snapshot(&self, tweet_id: TweetId) -> String {
        format!("{}:snapshot:{}", self.namespace, tweet_id)
    }
}
