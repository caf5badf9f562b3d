use service_core::error::AppError;
use thiserror::Error;

use crate::models::{GroupId, TweetId, UserId};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Tweet {0} not found")]
    TweetNotFound(TweetId),

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Group {0} not found")]
    GroupNotFound(GroupId),

    #[error("User {caller_id} is not the author of tweet {tweet_id}")]
    Unauthorized { caller_id: UserId, tweet_id: TweetId },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Corrupt permission chain at tweet {tweet_id} after {hops} hops")]
    CorruptPermissionChain { tweet_id: TweetId, hops: u32 },

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Errors that belong to the cache layer and may be downgraded to a
    /// fallback computation.
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self,
            ServiceError::CacheUnavailable(_) | ServiceError::SerializationFailure(_)
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::TweetNotFound(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::GroupNotFound(_) => "not_found",
            ServiceError::Unauthorized { .. } => "unauthorized",
            ServiceError::CacheUnavailable(_) => "cache_unavailable",
            ServiceError::SerializationFailure(_) => "serialization_failure",
            ServiceError::CorruptPermissionChain { .. } => "corrupt_permission_chain",
            ServiceError::Database(_) => "database",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        ServiceError::CacheUnavailable(err.to_string())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<prost::DecodeError> for ServiceError {
    fn from(err: prost::DecodeError) -> Self {
        ServiceError::SerializationFailure(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            e @ (ServiceError::TweetNotFound(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::GroupNotFound(_)) => AppError::NotFound(anyhow::anyhow!(e.to_string())),
            e @ ServiceError::Unauthorized { .. } => {
                AppError::Forbidden(anyhow::anyhow!(e.to_string()))
            }
            ServiceError::CacheUnavailable(_) | ServiceError::SerializationFailure(_) => {
                AppError::ServiceUnavailable
            }
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            e @ ServiceError::CorruptPermissionChain { .. } => {
                AppError::InternalError(anyhow::anyhow!(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_terminal_app_errors() {
        assert!(matches!(
            AppError::from(ServiceError::TweetNotFound(3)),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(ServiceError::Unauthorized {
                caller_id: 1,
                tweet_id: 3
            }),
            AppError::Forbidden(_)
        ));
    }

    #[test]
    fn cache_errors_are_flagged_for_fallback() {
        assert!(ServiceError::CacheUnavailable("down".into()).is_cache_error());
        assert!(ServiceError::SerializationFailure("bad".into()).is_cache_error());
        assert!(!ServiceError::TweetNotFound(1).is_cache_error());
    }
}
