//! In-memory stand-in for the Twitter API, used by resolver and renderer
//! tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{TimelinePage, TwitterApi};
use crate::error::{ApiError, ApiResult};
use crate::model::{Author, ReplyInfo, Tweet, TweetId, UserId};

pub(crate) fn author(id: u64) -> Arc<Author> {
    Arc::new(Author {
        id: UserId(id),
        display_name: format!("User {id}"),
        handle: format!("user{id}"),
        image_url: None,
    })
}

/// A tweet by `by`, optionally replying to `parent`
pub(crate) fn tweet(id: u64, by: &Arc<Author>, parent: Option<&Tweet>) -> Tweet {
    Tweet {
        id: TweetId(id),
        author: Arc::clone(by),
        text: format!("tweet {id}"),
        reply: parent.map(|parent| ReplyInfo {
            id: parent.id,
            author: parent.author.id,
        }),
        image_url: None,
        created_at: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeTwitter {
    tweets: Mutex<HashMap<TweetId, Tweet>>,
    /// IDs the lookup endpoint refuses with a 500
    broken_lookups: Mutex<HashSet<TweetId>>,
    fail_timelines: AtomicBool,
    /// When set, each lookup waits for one notification before answering
    lookup_gate: Mutex<Option<Arc<Notify>>>,
    pub(crate) lookups: AtomicUsize,
    pub(crate) looked_up: Mutex<Vec<TweetId>>,
    pub(crate) timelines: AtomicUsize,
}

impl FakeTwitter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, tweet: Tweet) {
        self.tweets.lock().unwrap().insert(tweet.id, tweet);
    }

    /// Add a self-reply chain by one author, returning the tweets root first
    pub(crate) fn add_chain(&self, ids: &[u64], by: &Arc<Author>) -> Vec<Tweet> {
        let mut chain: Vec<Tweet> = Vec::new();
        for &id in ids {
            let next = tweet(id, by, chain.last());
            self.add(next.clone());
            chain.push(next);
        }
        chain
    }

    pub(crate) fn remove(&self, id: u64) {
        self.tweets.lock().unwrap().remove(&TweetId(id));
    }

    pub(crate) fn break_lookup(&self, id: u64) {
        self.broken_lookups.lock().unwrap().insert(TweetId(id));
    }

    pub(crate) fn fail_timelines(&self) {
        self.fail_timelines.store(true, Ordering::SeqCst);
    }

    pub(crate) fn gate_lookups(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.lookup_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn timeline_count(&self) -> usize {
        self.timelines.load(Ordering::SeqCst)
    }

    pub(crate) fn network_calls(&self) -> usize {
        self.lookup_count() + self.timeline_count()
    }
}

#[async_trait]
impl TwitterApi for FakeTwitter {
    async fn lookup_tweets(&self, ids: &[TweetId]) -> ApiResult<Vec<Tweet>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.looked_up.lock().unwrap().extend_from_slice(ids);

        let gate = self.lookup_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let broken = self.broken_lookups.lock().unwrap();
        if ids.iter().any(|id| broken.contains(id)) {
            return Err(ApiError::Status {
                status: 500,
                message: "lookup exploded".into(),
            });
        }

        let tweets = self.tweets.lock().unwrap();
        Ok(ids.iter().filter_map(|id| tweets.get(id).cloned()).collect())
    }

    async fn user_timeline(&self, page: TimelinePage) -> ApiResult<Vec<Tweet>> {
        self.timelines.fetch_add(1, Ordering::SeqCst);

        if self.fail_timelines.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: "timeline unavailable".into(),
            });
        }

        let tweets = self.tweets.lock().unwrap();
        let mut timeline: Vec<Tweet> = tweets
            .values()
            .filter(|tweet| tweet.author.id == page.user && tweet.id <= page.max_id)
            .cloned()
            .collect();
        timeline.sort_by(|a, b| b.id.cmp(&a.id));
        timeline.truncate(page.count as usize);
        Ok(timeline)
    }
}
