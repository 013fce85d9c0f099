use crate::error::{ApiError, ApiResult};
use crate::model::{Author, ReplyInfo, Tweet, TweetId, UserId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// v1.1 `created_at`, e.g. `Wed Oct 10 20:19:24 +0000 2018`
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Deserialize)]
struct RawUser {
    id: UserId,
    name: String,
    screen_name: String,
    profile_image_url_https: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    media_url_https: String,
}

#[derive(Debug, Deserialize)]
struct RawEntities {
    #[serde(default)]
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawTweet {
    id: TweetId,
    user: RawUser,
    // `full_text` with tweet_mode=extended, `text` otherwise
    full_text: Option<String>,
    text: Option<String>,
    in_reply_to_status_id: Option<TweetId>,
    in_reply_to_user_id: Option<UserId>,
    extended_entities: Option<RawEntities>,
    created_at: Option<String>,
}

/// Deduplicates authors within one response, so every tweet by the same
/// account shares a single `Arc<Author>`. A differing snapshot for the same
/// ID replaces the stored one.
#[derive(Debug, Default)]
pub struct AuthorTable {
    table: HashMap<UserId, Arc<Author>>,
}

impl AuthorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dedup(&mut self, author: Author) -> Arc<Author> {
        let entry = self
            .table
            .entry(author.id)
            .or_insert_with(|| Arc::new(author.clone()));

        if **entry != author {
            *entry = Arc::new(author);
        }

        Arc::clone(entry)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Parse a JSON array of v1.1 tweet objects, as returned by both
/// `statuses/lookup` and `statuses/user_timeline`.
pub fn parse_tweets(body: &str) -> ApiResult<Vec<Tweet>> {
    let raw: Vec<RawTweet> = serde_json::from_str(body)?;
    let mut authors = AuthorTable::new();

    raw.into_iter()
        .map(|raw| tweet_from_raw(raw, &mut authors))
        .collect()
}

fn tweet_from_raw(raw: RawTweet, authors: &mut AuthorTable) -> ApiResult<Tweet> {
    let reply = match (raw.in_reply_to_status_id, raw.in_reply_to_user_id) {
        (None, None) => None,
        (Some(id), Some(author)) => Some(ReplyInfo { id, author }),
        (Some(_), None) => {
            return Err(ApiError::MalformedResponse(format!(
                "tweet {} has a reply id but no reply author",
                raw.id
            )))
        }
        (None, Some(_)) => {
            return Err(ApiError::MalformedResponse(format!(
                "tweet {} has a reply author but no reply id",
                raw.id
            )))
        }
    };

    let text = raw.full_text.or(raw.text).ok_or_else(|| {
        ApiError::MalformedResponse(format!("tweet {} has no text field", raw.id))
    })?;

    let author = authors.dedup(Author {
        id: raw.user.id,
        display_name: raw.user.name,
        handle: raw.user.screen_name,
        image_url: raw.user.profile_image_url_https,
    });

    Ok(Tweet {
        id: raw.id,
        author,
        text,
        reply,
        image_url: raw
            .extended_entities
            .and_then(|entities| entities.media.into_iter().next())
            .map(|media| media.media_url_https),
        // An unparseable date is cosmetic, so it is dropped rather than failing the tweet
        created_at: raw.created_at.as_deref().and_then(parse_created_at),
    })
}

fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, CREATED_AT_FORMAT)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const USER: &str = r#"{"id": 12, "name": "Ada", "screen_name": "ada", "profile_image_url_https": "https://pbs.twimg.com/ada.jpg"}"#;

    #[test]
    fn test_parse_root_and_reply() {
        let body = format!(
            r#"[
                {{"id": 200, "user": {USER}, "full_text": "root", "in_reply_to_status_id": null, "in_reply_to_user_id": null, "created_at": "Wed Oct 10 20:19:24 +0000 2018"}},
                {{"id": 300, "user": {USER}, "full_text": "reply", "in_reply_to_status_id": 200, "in_reply_to_user_id": 12,
                  "extended_entities": {{"media": [{{"media_url_https": "https://pbs.twimg.com/media/1.jpg"}}]}}}}
            ]"#
        );

        let tweets = parse_tweets(&body).unwrap();
        assert_eq!(tweets.len(), 2);

        let root = &tweets[0];
        assert_eq!(root.id, TweetId(200));
        assert!(root.is_root());
        assert_eq!(root.text, "root");
        assert_eq!(root.author.handle, "ada");
        assert_eq!(
            root.created_at,
            Some(Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap())
        );

        let reply = &tweets[1];
        assert_eq!(reply.parent_id(), Some(TweetId(200)));
        assert_eq!(reply.parent_author(), Some(UserId(12)));
        assert_eq!(
            reply.image_url.as_deref(),
            Some("https://pbs.twimg.com/media/1.jpg")
        );

        // Both tweets share one author allocation
        assert!(Arc::ptr_eq(&root.author, &reply.author));
    }

    #[test]
    fn test_falls_back_to_short_text() {
        let body = format!(r#"[{{"id": 1, "user": {USER}, "text": "short"}}]"#);
        let tweets = parse_tweets(&body).unwrap();
        assert_eq!(tweets[0].text, "short");
        assert_eq!(tweets[0].created_at, None);
    }

    #[test]
    fn test_reply_author_without_reply_id_is_malformed() {
        let body = format!(
            r#"[{{"id": 1, "user": {USER}, "full_text": "x", "in_reply_to_user_id": 12}}]"#
        );
        assert!(matches!(
            parse_tweets(&body),
            Err(ApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_reply_id_without_author_is_malformed() {
        let body = format!(
            r#"[{{"id": 1, "user": {USER}, "full_text": "x", "in_reply_to_status_id": 5}}]"#
        );
        assert!(matches!(
            parse_tweets(&body),
            Err(ApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_non_array_is_malformed() {
        assert!(matches!(
            parse_tweets(r#"{"errors": [{"code": 34}]}"#),
            Err(ApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_array() {
        assert!(parse_tweets("[]").unwrap().is_empty());
    }

    #[test]
    fn test_author_table_replaces_changed_snapshot() {
        let mut table = AuthorTable::new();
        let first = table.dedup(Author {
            id: UserId(1),
            display_name: "Old".into(),
            handle: "old".into(),
            image_url: None,
        });
        let same = table.dedup((*first).clone());
        assert!(Arc::ptr_eq(&first, &same));

        let renamed = table.dedup(Author {
            handle: "new".into(),
            ..(*first).clone()
        });
        assert_eq!(renamed.handle, "new");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_bad_created_at_is_dropped() {
        assert_eq!(parse_created_at("yesterday"), None);
    }
}
