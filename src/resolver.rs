//! Rebuilds a thread by walking reply pointers backward from its last tweet.
//!
//! The walk is serial: a tweet's parent is only known once the tweet itself
//! has been fetched. To avoid one request per hop, each directly fetched
//! reply starts a lookahead that pulls a page of the parent author's timeline
//! into the cache. Threads are overwhelmingly self-replies, so one page
//! usually covers most of the remaining hops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument};

use crate::api::{TimelinePage, TwitterApi, MAX_TIMELINE_PAGE};
use crate::cache::{TweetCache, TweetStore};
use crate::config::Config;
use crate::error::{ApiError, ApiResult, ResolveError};
use crate::model::{ReplyInfo, Thread, Tweet, TweetId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Most tweets a single walk may hold
    pub max_chain_length: usize,
    pub lookahead: bool,
    /// Wait for an author's pending lookahead before fetching that author's
    /// next tweet directly
    pub await_lookahead: bool,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_chain_length: 1000,
            lookahead: true,
            await_lookahead: true,
            page_size: MAX_TIMELINE_PAGE,
            max_pages: 1,
        }
    }
}

impl From<&Config> for ResolveOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_chain_length: config.max_chain_length,
            lookahead: config.lookahead.enabled,
            await_lookahead: config.lookahead.await_pending,
            page_size: config.lookahead.page_size,
            max_pages: config.lookahead.max_pages,
        }
    }
}

/// Lookahead tasks started during one walk, keyed by the author whose
/// timeline they fetch. Dropping this detaches the tasks; they still finish
/// and fill the cache.
#[derive(Default)]
struct Lookaheads {
    pending: HashMap<UserId, Vec<JoinHandle<()>>>,
}

impl Lookaheads {
    fn track(&mut self, author: UserId, handle: JoinHandle<()>) {
        self.pending.entry(author).or_default().push(handle);
    }

    /// Wait for every pending lookahead for `author`. Returns whether there
    /// was anything to wait for.
    async fn settle(&mut self, author: UserId) -> bool {
        let Some(handles) = self.pending.remove(&author) else {
            return false;
        };

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(author = %author, error = %err, "Lookahead task failed");
            }
        }
        true
    }
}

pub struct ThreadResolver {
    api: Arc<dyn TwitterApi>,
    cache: Arc<TweetCache>,
    history: Option<Arc<dyn TweetStore>>,
    options: ResolveOptions,
}

impl ThreadResolver {
    pub fn new(api: Arc<dyn TwitterApi>, cache: Arc<TweetCache>, options: ResolveOptions) -> Self {
        Self {
            api,
            cache,
            history: None,
            options,
        }
    }

    /// Consult `store` on cache misses before going to the network, and save
    /// every resolved thread into it.
    pub fn with_history(mut self, store: Arc<dyn TweetStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn cache(&self) -> &Arc<TweetCache> {
        &self.cache
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub async fn resolve_thread(&self, tail: TweetId) -> Result<Thread, ResolveError> {
        self.resolve_range(tail, None).await
    }

    /// Like `resolve_thread`, but gives up with `Cancelled` when `cancel`
    /// fires. Requests already in flight still complete into the cache.
    pub async fn resolve_thread_cancellable(
        &self,
        tail: TweetId,
        cancel: &CancellationToken,
    ) -> Result<Thread, ResolveError> {
        self.resolve_range_cancellable(tail, None, cancel).await
    }

    pub async fn resolve_range_cancellable(
        &self,
        tail: TweetId,
        head: Option<TweetId>,
        cancel: &CancellationToken,
    ) -> Result<Thread, ResolveError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            result = self.resolve_range(tail, head) => result,
        }
    }

    /// Walk back from `tail`, stopping at the thread root or at `head`,
    /// whichever comes first.
    #[instrument(skip(self), fields(tail = %tail))]
    pub async fn resolve_range(
        &self,
        tail: TweetId,
        head: Option<TweetId>,
    ) -> Result<Thread, ResolveError> {
        let mut lookaheads = Lookaheads::default();

        // Built tail first, reversed once the walk ends
        let mut chain: Vec<Arc<Tweet>> = Vec::new();
        let mut current = tail;
        let mut expected_author = None;

        loop {
            if chain.len() >= self.options.max_chain_length {
                return Err(ResolveError::ThreadTooLong {
                    limit: self.options.max_chain_length,
                });
            }

            let tweet = match self
                .fetch_tweet(current, expected_author, &mut lookaheads)
                .await
            {
                Ok(Some(tweet)) => tweet,
                Ok(None) => return Err(unresolved(current, &chain)),
                // Past the tail, a failed hop still leaves a partial thread
                Err(err) if !chain.is_empty() => {
                    warn!(tweet = %current, error = %err, "Hop failed, keeping partial thread");
                    return Err(unresolved(current, &chain));
                }
                Err(err) => return Err(err),
            };

            debug!(tweet = %tweet.id, parent = ?tweet.parent_id(), depth = chain.len(), "Resolved hop");

            let reply = tweet.reply;
            chain.push(tweet);

            if head == Some(current) {
                break;
            }

            match reply {
                Some(reply) => {
                    current = reply.id;
                    expected_author = Some(reply.author);
                }
                None => break,
            }
        }

        chain.reverse();
        self.record_history(&chain).await;

        Ok(Thread::from_tweets(&chain))
    }

    async fn fetch_tweet(
        &self,
        id: TweetId,
        expected_author: Option<UserId>,
        lookaheads: &mut Lookaheads,
    ) -> Result<Option<Arc<Tweet>>, ResolveError> {
        if let Some(tweet) = self.cache.get(id) {
            return Ok(Some(tweet));
        }

        if self.options.await_lookahead {
            if let Some(author) = expected_author {
                if lookaheads.settle(author).await {
                    if let Some(tweet) = self.cache.get(id) {
                        return Ok(Some(tweet));
                    }
                    debug!(tweet = %id, "Lookahead did not cover tweet");
                }
            }
        }

        if let Some(tweet) = self.from_history(id).await {
            return Ok(Some(self.cache.insert(tweet)));
        }

        // Spawned so that an abandoned walk still finishes the request and
        // caches the result
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let fetched = tokio::spawn(
            async move {
                let tweet = api.lookup_tweet(id).await?;
                Ok::<_, ApiError>(tweet.map(|tweet| cache.insert(Arc::new(tweet))))
            }
            .in_current_span(),
        )
        .await??;

        let Some(tweet) = fetched else {
            return Ok(None);
        };

        if let Some(reply) = tweet.reply {
            if self.options.lookahead && !self.cache.contains(reply.id) {
                lookaheads.track(reply.author, self.spawn_lookahead(reply));
            }
        }

        Ok(Some(tweet))
    }

    fn spawn_lookahead(&self, reply: ReplyInfo) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let page_size = self.options.page_size;
        let max_pages = self.options.max_pages;

        tokio::spawn(
            async move {
                if let Err(err) = lookahead(api.as_ref(), &cache, reply, page_size, max_pages).await
                {
                    warn!(
                        author = %reply.author,
                        parent = %reply.id,
                        error = %err,
                        "Timeline lookahead failed"
                    );
                }
            }
            .in_current_span(),
        )
    }

    async fn from_history(&self, id: TweetId) -> Option<Arc<Tweet>> {
        let store = self.history.as_ref()?;
        match store.get(id).await {
            Ok(found) => found,
            Err(err) => {
                warn!(tweet = %id, error = %err, "History lookup failed");
                None
            }
        }
    }

    async fn record_history(&self, chain: &[Arc<Tweet>]) {
        if let Some(store) = &self.history {
            if let Err(err) = store.merge_all(chain.to_vec()).await {
                warn!(error = %err, "Failed to save thread to history");
            }
        }
    }
}

/// Pull pages of `reply.author`'s timeline, starting at the parent tweet and
/// moving back in time, into the cache.
async fn lookahead(
    api: &dyn TwitterApi,
    cache: &TweetCache,
    reply: ReplyInfo,
    page_size: u32,
    max_pages: u32,
) -> ApiResult<()> {
    let mut max_id = reply.id;

    for page in 0..max_pages.max(1) {
        let tweets = api
            .user_timeline(TimelinePage {
                user: reply.author,
                max_id,
                count: page_size,
            })
            .await?;

        let Some(oldest) = tweets.iter().map(|tweet| tweet.id).min() else {
            break;
        };

        let added = cache.merge_all(tweets.into_iter().map(Arc::new));
        debug!(author = %reply.author, page, added, "Merged timeline page");

        match oldest.0.checked_sub(1) {
            Some(next) => max_id = TweetId(next),
            None => break,
        }
    }

    Ok(())
}

fn unresolved(missing: TweetId, chain: &[Arc<Tweet>]) -> ResolveError {
    match chain.last() {
        None => ResolveError::TweetUnavailable(missing),
        Some(last) => ResolveError::BrokenChain {
            missing,
            last_resolved: last.id,
            partial: chain.iter().rev().map(|tweet| tweet.id).collect(),
        },
    }
}
