//! Services module for tweet-service.

pub mod cache;
pub mod codec;
pub mod database;
pub mod editability;
pub mod error;
pub mod events;
pub mod groups;
pub mod keys;
pub mod metrics;
pub mod permissions;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod visibility;

pub use cache::{CacheBackend, MockCache, RedisCache};
pub use codec::TweetCacheCodec;
pub use database::PgStore;
pub use editability::EditabilityFlagStore;
pub use error::ServiceError;
pub use events::{BroadcastPublisher, TweetEvent, TweetEventPublisher};
pub use groups::GroupAssignmentEngine;
pub use keys::CacheKeys;
pub use metrics::{get_metrics, init_metrics};
pub use permissions::PermissionService;
pub use resolver::{PermissionResolver, DEFAULT_MAX_DEPTH};
pub use snapshot::TweetSnapshotCache;
pub use store::{GroupStore, MockStore, TweetCursor, TweetStore};
pub use visibility::VisibilityIndex;
