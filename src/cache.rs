//! Process-wide tweet memoization.
//!
//! Tweets are treated as immutable once observed, so entries are only ever
//! added. Deleted tweets surface as fetch failures, not invalidations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Tweet, TweetId};

/// Anything shaped like the cache: the in-memory cache itself, or a durable
/// history store consulted before the network.
#[async_trait]
pub trait TweetStore: Send + Sync {
    async fn get(&self, id: TweetId) -> Result<Option<Arc<Tweet>>>;

    /// Add tweets that are not already stored. Existing entries are kept.
    async fn merge_all(&self, tweets: Vec<Arc<Tweet>>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct TweetCache {
    tweets: RwLock<HashMap<TweetId, Arc<Tweet>>>,
}

impl TweetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TweetId) -> Option<Arc<Tweet>> {
        self.tweets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn contains(&self, id: TweetId) -> bool {
        self.tweets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Insert one tweet unless it is already cached. Returns the cached
    /// value, which is the earlier one if there was a race.
    pub fn insert(&self, tweet: Arc<Tweet>) -> Arc<Tweet> {
        let mut tweets = self.tweets.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tweets.entry(tweet.id).or_insert(tweet))
    }

    /// Merge a batch of tweets. Idempotent and order-independent; returns how
    /// many were new.
    pub fn merge_all<I>(&self, tweets: I) -> usize
    where
        I: IntoIterator<Item = Arc<Tweet>>,
    {
        let mut stored = self.tweets.write().unwrap_or_else(PoisonError::into_inner);
        let before = stored.len();
        for tweet in tweets {
            stored.entry(tweet.id).or_insert(tweet);
        }
        stored.len() - before
    }

    pub fn len(&self) -> usize {
        self.tweets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TweetStore for TweetCache {
    async fn get(&self, id: TweetId) -> Result<Option<Arc<Tweet>>> {
        Ok(TweetCache::get(self, id))
    }

    async fn merge_all(&self, tweets: Vec<Arc<Tweet>>) -> Result<()> {
        TweetCache::merge_all(self, tweets);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, UserId};

    fn tweet(id: u64, text: &str) -> Arc<Tweet> {
        Arc::new(Tweet {
            id: TweetId(id),
            author: Arc::new(Author {
                id: UserId(1),
                display_name: "Ada".into(),
                handle: "ada".into(),
                image_url: None,
            }),
            text: text.into(),
            reply: None,
            image_url: None,
            created_at: None,
        })
    }

    fn snapshot(cache: &TweetCache) -> Vec<(TweetId, String)> {
        let mut entries: Vec<_> = cache
            .tweets
            .read()
            .unwrap()
            .values()
            .map(|tweet| (tweet.id, tweet.text.clone()))
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn test_get_missing() {
        let cache = TweetCache::new();
        assert!(cache.get(TweetId(1)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let page_ab = vec![tweet(1, "a"), tweet(2, "b")];
        let page_bc = vec![tweet(2, "b"), tweet(3, "c")];

        let forward = TweetCache::new();
        forward.merge_all(page_ab.clone());
        forward.merge_all(page_bc.clone());

        let backward = TweetCache::new();
        backward.merge_all(page_bc);
        backward.merge_all(page_ab);

        assert_eq!(snapshot(&forward), snapshot(&backward));
        assert_eq!(forward.len(), 3);
    }

    #[test]
    fn test_merge_is_idempotent_and_counts_new() {
        let cache = TweetCache::new();
        assert_eq!(cache.merge_all(vec![tweet(1, "a"), tweet(2, "b")]), 2);
        assert_eq!(cache.merge_all(vec![tweet(1, "a"), tweet(2, "b")]), 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_existing_entries_are_not_overwritten() {
        let cache = TweetCache::new();
        cache.insert(tweet(1, "first"));

        let kept = cache.insert(tweet(1, "second"));
        assert_eq!(kept.text, "first");

        cache.merge_all(vec![tweet(1, "third")]);
        assert_eq!(cache.get(TweetId(1)).unwrap().text, "first");
    }

    #[tokio::test]
    async fn test_concurrent_merges() {
        let cache = Arc::new(TweetCache::new());
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let page: Vec<_> = (0..50u64)
                        .map(|i| tweet(worker * 25 + i, "x"))
                        .collect();
                    cache.merge_all(page);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        // Pages overlap by half; ids run from 0 to 7 * 25 + 49
        assert_eq!(cache.len(), 7 * 25 + 50);
    }

    #[tokio::test]
    async fn test_store_trait() {
        let cache = TweetCache::new();
        let store: &dyn TweetStore = &cache;

        store.merge_all(vec![tweet(5, "e")]).await.unwrap();
        let found = store.get(TweetId(5)).await.unwrap();
        assert_eq!(found.map(|t| t.text.clone()), Some("e".to_string()));
        assert!(store.get(TweetId(6)).await.unwrap().is_none());
    }
}
