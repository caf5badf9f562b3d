pub mod audience;
pub mod group;
pub mod permission;
pub mod snapshot;
pub mod tweet;

pub use audience::{EffectiveAudience, PermissionAxis, ResolvedAudience, VisibilityScope};
pub use group::{Group, GroupMemberRow, GroupRow};
pub use permission::{IndexEntry, PaginationQuery, PermissionOutcome, PermissionUpdate};
pub use snapshot::TweetSnapshot;
pub use tweet::{GroupId, Tweet, TweetCategory, TweetId, TweetRow, UserId};
