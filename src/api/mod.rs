pub mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::HttpGateway;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::model::{Tweet, TweetId, UserId};

/// `statuses/lookup` accepts at most this many IDs per call
pub const MAX_LOOKUP_IDS: usize = 100;

/// `statuses/user_timeline` returns at most this many tweets per page
pub const MAX_TIMELINE_PAGE: u32 = 200;

/// One page of an author's timeline, newest first, no newer than `max_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePage {
    pub user: UserId,
    pub max_id: TweetId,
    pub count: u32,
}

/// The two read-only Twitter operations the resolver needs.
#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// Look up a batch of tweets. Tweets that are deleted, protected, or
    /// unknown are simply absent from the result.
    async fn lookup_tweets(&self, ids: &[TweetId]) -> ApiResult<Vec<Tweet>>;

    async fn user_timeline(&self, page: TimelinePage) -> ApiResult<Vec<Tweet>>;

    async fn lookup_tweet(&self, id: TweetId) -> ApiResult<Option<Tweet>> {
        let tweets = self.lookup_tweets(&[id]).await?;
        Ok(tweets.into_iter().find(|tweet| tweet.id == id))
    }
}
