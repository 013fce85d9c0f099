//! Plain-text and JSON views of a resolved thread.

use std::sync::Arc;

use anyhow::Result;
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::api::TwitterApi;
use crate::cache::TweetCache;
use crate::config::Config;
use crate::error::ApiResult;
use crate::model::{Thread, ThreadAuthor, Tweet, TweetId};
use crate::scheduler::Scheduler;

const MIN_WIDTH: usize = 20;

/// Formats every item of a thread. Uncached items are fetched in one batch,
/// then each item is formatted as a separate task on the renderer's own
/// scheduler.
pub struct Renderer {
    api: Arc<dyn TwitterApi>,
    cache: Arc<TweetCache>,
    scheduler: Scheduler,
    width: usize,
    tz: Tz,
}

#[derive(Serialize)]
struct ThreadView<'a> {
    #[serde(flatten)]
    thread: &'a Thread,
    tweets: Vec<Arc<Tweet>>,
}

impl Renderer {
    pub fn new(
        api: Arc<dyn TwitterApi>,
        cache: Arc<TweetCache>,
        scheduler: Scheduler,
        width: usize,
        tz: Tz,
    ) -> Self {
        Self {
            api,
            cache,
            scheduler,
            width: width.max(MIN_WIDTH),
            tz,
        }
    }

    pub fn from_config(
        api: Arc<dyn TwitterApi>,
        cache: Arc<TweetCache>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self::new(
            api,
            cache,
            Scheduler::new(config.render_concurrency),
            config.wrap_width,
            config.time_zone()?,
        ))
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Look up every item that is not cached yet in one batched call.
    async fn prefetch(&self, thread: &Thread) -> ApiResult<()> {
        let missing: Vec<TweetId> = thread
            .items
            .iter()
            .copied()
            .filter(|&id| !self.cache.contains(id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        debug!(count = missing.len(), "Fetching uncached thread items");
        let tweets = self.api.lookup_tweets(&missing).await?;
        self.cache.merge_all(tweets.into_iter().map(Arc::new));
        Ok(())
    }

    /// Every item of `thread`, in thread order. `None` marks a tweet that
    /// could not be retrieved.
    pub async fn tweets(&self, thread: &Thread) -> ApiResult<Vec<Option<Arc<Tweet>>>> {
        self.prefetch(thread).await?;
        Ok(thread.items.iter().map(|&id| self.cache.get(id)).collect())
    }

    pub async fn render_text(&self, thread: &Thread) -> ApiResult<String> {
        let tweets = self.tweets(thread).await?;
        let blocks = join_all(thread.items.iter().zip(tweets).map(|(&id, tweet)| {
            self.scheduler.schedule(move || async move {
                match tweet {
                    Some(tweet) => format_tweet(&tweet, self.width, self.tz),
                    None => unavailable(id),
                }
            })
        }))
        .await;

        let mut out = header(thread);
        for block in blocks {
            out.push_str("\n\n");
            out.push_str(&block);
        }
        out.push('\n');
        Ok(out)
    }

    /// The thread plus every tweet that could be retrieved
    pub async fn render_json(&self, thread: &Thread) -> Result<String> {
        let tweets = self.tweets(thread).await?.into_iter().flatten().collect();
        let view = ThreadView { thread, tweets };
        Ok(serde_json::to_string_pretty(&view)?)
    }
}

fn header(thread: &Thread) -> String {
    let count = match thread.len() {
        1 => "1 tweet".to_string(),
        n => format!("{n} tweets"),
    };

    match &thread.author {
        ThreadAuthor::Author(author) => format!(
            "Thread by {} (@{}), {count}",
            author.display_name, author.handle
        ),
        ThreadAuthor::Conversation => format!("Conversation, {count}"),
    }
}

fn unavailable(id: TweetId) -> String {
    format!("[tweet {id} unavailable]")
}

/// Format one tweet as a text block: byline, wrapped text, optional image,
/// and the status URL.
pub fn format_tweet(tweet: &Tweet, width: usize, tz: Tz) -> String {
    let mut byline = format!("{} (@{})", tweet.author.display_name, tweet.author.handle);
    if let Some(created_at) = tweet.created_at {
        let local = created_at.with_timezone(&tz);
        byline.push_str(&format!(" · {}", local.format("%Y-%m-%d %H:%M %Z")));
    }

    let mut lines = vec![byline, textwrap::fill(&tweet.text, width)];
    if let Some(image) = &tweet.image_url {
        lines.push(format!("[image] {image}"));
    }
    lines.push(tweet.url());
    lines.join("\n")
}
