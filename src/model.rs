use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Arc;

macro_rules! twitter_id_types {
    ($($(#[$meta:meta])* $Name:ident)*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $Name(pub u64);

        impl Display for $Name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $Name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<u64> for $Name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    )*};
}

twitter_id_types! {
    /// Twitter's snowflake ID for a single tweet
    TweetId
    /// Twitter's numeric ID for an account
    UserId
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    /// The user's "real name"
    pub display_name: String,
    /// The user's @name, without the @
    pub handle: String,
    pub image_url: Option<String>,
}

/// The tweet this one replies to. Twitter always reports the parent tweet and
/// the parent author together, so they live in one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyInfo {
    pub id: TweetId,
    pub author: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: TweetId,
    pub author: Arc<Author>,
    pub text: String,
    pub reply: Option<ReplyInfo>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Tweet {
    pub fn parent_id(&self) -> Option<TweetId> {
        self.reply.map(|reply| reply.id)
    }

    pub fn parent_author(&self) -> Option<UserId> {
        self.reply.map(|reply| reply.author)
    }

    /// A tweet with no parent starts a thread
    pub fn is_root(&self) -> bool {
        self.reply.is_none()
    }

    pub fn url(&self) -> String {
        format!(
            "https://twitter.com/{}/status/{}",
            self.author.handle, self.id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "author", rename_all = "snake_case")]
pub enum ThreadAuthor {
    Author(Arc<Author>),
    Conversation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub description: String,
    pub image_url: Option<String>,
}

/// A resolved reply chain, oldest tweet first, ending at the requested tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub items: Vec<TweetId>,
    pub author: ThreadAuthor,
    pub meta: Option<Meta>,
}

impl Thread {
    /// Build a thread from tweets that are already in root-to-tail order.
    pub fn from_tweets(tweets: &[Arc<Tweet>]) -> Self {
        let items = tweets.iter().map(|tweet| tweet.id).collect();
        let author = thread_author(tweets.iter().map(|tweet| &tweet.author));

        // The description is the content of the first tweet. The image is the
        // first tweet's image, falling back to the thread author, falling
        // back to whoever wrote the first tweet.
        let meta = tweets.first().map(|first| Meta {
            description: first.text.clone(),
            image_url: first.image_url.clone().or_else(|| match &author {
                ThreadAuthor::Author(author) => author.image_url.clone(),
                ThreadAuthor::Conversation => first.author.image_url.clone(),
            }),
        });

        Self {
            items,
            author,
            meta,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn root(&self) -> Option<TweetId> {
        self.items.first().copied()
    }

    pub fn tail(&self) -> Option<TweetId> {
        self.items.last().copied()
    }
}

/// Decide whether a set of tweets has one clear author or is a conversation.
pub fn thread_author<'a>(authors: impl IntoIterator<Item = &'a Arc<Author>>) -> ThreadAuthor {
    struct Entry<'a> {
        count: usize,
        author: &'a Arc<Author>,
    }

    let mut counter: HashMap<UserId, Entry> = HashMap::new();

    for author in authors {
        counter
            .entry(author.id)
            .and_modify(|entry| entry.count += 1)
            .or_insert(Entry { count: 1, author });
    }

    let mut counted: Vec<&Entry> = counter.values().collect();
    counted.sort_unstable_by_key(|entry| cmp::Reverse(entry.count));

    match counted.first() {
        None => ThreadAuthor::Conversation,

        // `most` is the user with the most tweets in this thread
        Some(most) => match counted.get(1) {
            None => ThreadAuthor::Author(Arc::clone(most.author)),

            // No unique plurality
            Some(next) if next.count >= most.count => ThreadAuthor::Conversation,

            Some(..) if most.count * 2 >= counted.len() => {
                ThreadAuthor::Author(Arc::clone(most.author))
            }

            _ => ThreadAuthor::Conversation,
        },
    }
}

/// Accept either a bare tweet ID or a status URL such as
/// `https://x.com/someone/status/123?s=20`.
pub fn parse_tweet_ref(input: &str) -> Option<TweetId> {
    let input = input.trim();
    if let Ok(id) = input.parse() {
        return Some(id);
    }

    let path = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))
        .unwrap_or(input);
    let path = path
        .strip_prefix("www.")
        .or_else(|| path.strip_prefix("mobile."))
        .unwrap_or(path);
    let path = path
        .strip_prefix("twitter.com/")
        .or_else(|| path.strip_prefix("x.com/"))?;

    let after_status = path.split("/status/").nth(1)?;
    let digits = after_status
        .split(&['/', '?', '#'][..])
        .next()
        .unwrap_or("");

    digits.parse().ok()
}
