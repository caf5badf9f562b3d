//! Tweet event publishing, injected into the permission service so tests
//! can subscribe or substitute their own publisher.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{ResolvedAudience, TweetId, VisibilityScope};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TweetEvent {
    /// A tweet was projected into the visibility index.
    Indexed {
        tweet_id: TweetId,
        scopes: Vec<VisibilityScope>,
    },
    /// The author changed who may view or edit a tweet.
    PermissionsUpdated {
        tweet_id: TweetId,
        view: ResolvedAudience,
        edit: ResolvedAudience,
    },
}

impl TweetEvent {
    pub fn tweet_id(&self) -> TweetId {
        match self {
            TweetEvent::Indexed { tweet_id, .. } => *tweet_id,
            TweetEvent::PermissionsUpdated { tweet_id, .. } => *tweet_id,
        }
    }
}

pub trait TweetEventPublisher: Send + Sync {
    /// Returns the number of subscribers reached.
    fn publish(&self, event: TweetEvent) -> Result<usize, anyhow::Error>;
}

/// In-process publisher backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<TweetEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TweetEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl TweetEventPublisher for BroadcastPublisher {
    fn publish(&self, event: TweetEvent) -> Result<usize, anyhow::Error> {
        // No subscribers is not an error for a fan-out channel.
        Ok(self.sender.send(event).unwrap_or(0))
    }
}
