//! Binary encoding of cached tweet snapshots (protobuf wire format).

use prost::Message;

use super::ServiceError;
use crate::models::{TweetCategory, TweetSnapshot};

#[derive(Clone, PartialEq, Message)]
pub struct TweetSnapshotMessage {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub content: String,
    #[prost(int64, tag = "3")]
    pub author_id: i64,
    #[prost(string, repeated, tag = "4")]
    pub hashtags: Vec<String>,
    #[prost(string, optional, tag = "5")]
    pub location: Option<String>,
    #[prost(enumeration = "CategoryMessage", tag = "6")]
    pub category: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum CategoryMessage {
    Unspecified = 0,
    News = 1,
    Sport = 2,
    Entertainment = 3,
    Technology = 4,
    Other = 5,
}

impl From<TweetCategory> for CategoryMessage {
    fn from(c: TweetCategory) -> Self {
        match c {
            TweetCategory::News => CategoryMessage::News,
            TweetCategory::Sport => CategoryMessage::Sport,
            TweetCategory::Entertainment => CategoryMessage::Entertainment,
            TweetCategory::Technology => CategoryMessage::Technology,
            TweetCategory::Other => CategoryMessage::Other,
        }
    }
}

impl TryFrom<CategoryMessage> for TweetCategory {
    type Error = ServiceError;

    fn try_from(c: CategoryMessage) -> Result<Self, Self::Error> {
        match c {
            CategoryMessage::News => Ok(TweetCategory::News),
            CategoryMessage::Sport => Ok(TweetCategory::Sport),
            CategoryMessage::Entertainment => Ok(TweetCategory::Entertainment),
            CategoryMessage::Technology => Ok(TweetCategory::Technology),
            CategoryMessage::Other => Ok(TweetCategory::Other),
            CategoryMessage::Unspecified => Err(ServiceError::SerializationFailure(
                "Snapshot has no category".to_string(),
            )),
        }
    }
}

pub struct TweetCacheCodec;

impl TweetCacheCodec {
    pub fn encode(snapshot: &TweetSnapshot) -> Vec<u8> {
        TweetSnapshotMessage {
            id: snapshot.id,
            content: snapshot.content.clone(),
            author_id: snapshot.author_id,
            hashtags: snapshot.hashtags.clone(),
            location: snapshot.location.clone(),
            category: CategoryMessage::from(snapshot.category) as i32,
        }
        .encode_to_vec()
    }

    /// Decode a snapshot. Truncated input, wire-type mismatches, invalid
    /// UTF-8 and unknown categories all fail; nothing is returned partially.
    pub fn decode(bytes: &[u8]) -> Result<TweetSnapshot, ServiceError> {
        let message = TweetSnapshotMessage::decode(bytes)?;
        let category = CategoryMessage::try_from(message.category).map_err(|_| {
            ServiceError::SerializationFailure(format!(
                "Unknown category value {}",
                message.category
            ))
        })?;

        Ok(TweetSnapshot {
            id: message.id,
            content: message.content,
            author_id: message.author_id,
            hashtags: message.hashtags,
            location: message.location,
            category: TweetCategory::try_from(category)?,
        })
    }
}
