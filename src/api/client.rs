//! reqwest-backed gateway to the Twitter v1.1 REST API.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use super::{TimelinePage, TwitterApi, MAX_LOOKUP_IDS, MAX_TIMELINE_PAGE};
use crate::auth::{BearerToken, CredentialProducer};
use crate::config::{Config, RetryConfig};
use crate::error::{ApiError, ApiResult};
use crate::model::{Tweet, TweetId};
use crate::scheduler::Scheduler;
use crate::twitter_parser::parse_tweets;

const LOOKUP_ENDPOINT: &str = "/1.1/statuses/lookup.json";
const TIMELINE_ENDPOINT: &str = "/1.1/statuses/user_timeline.json";

/// Longest error body kept in `ApiError::Status`
const MAX_ERROR_MESSAGE: usize = 200;

pub struct HttpGateway {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProducer>,
    retry: RetryConfig,
    limiter: Scheduler,
}

impl HttpGateway {
    pub fn new(config: &Config, credentials: Arc<dyn CredentialProducer>) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("threadview/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
            retry: config.retry.clone(),
            limiter: Scheduler::new(config.api_concurrency),
        })
    }

    /// The scheduler bounding outbound requests
    pub fn limiter(&self) -> &Scheduler {
        &self.limiter
    }

    async fn get_tweets(&self, endpoint: &str, query: &[(&str, String)]) -> ApiResult<Vec<Tweet>> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut delay = self.retry.initial_delay();
        let mut attempts = 0;
        let mut refreshed = false;
        let mut token = self.credentials.get_token().await?;

        loop {
            attempts += 1;
            debug!(attempt = attempts, endpoint, "Making Twitter API request");

            let result = self
                .limiter
                .schedule(|| self.send_once(&url, query, &token))
                .await;

            match result {
                Ok(tweets) => return Ok(tweets),
                Err(ApiError::AuthExpired { status }) if !refreshed => {
                    warn!(status, endpoint, "Credential rejected, refreshing once");
                    refreshed = true;
                    // The replay with a fresh credential does not use up an attempt
                    attempts -= 1;
                    token = self.credentials.refresh_token().await?;
                }
                Err(e) if e.is_retryable() && attempts < self.retry.max_attempts => {
                    let wait = e
                        .retry_after()
                        .map_or(delay, |after| cmp::min(after, self.retry.max_delay()));
                    warn!(
                        attempt = attempts,
                        delay_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying Twitter API request"
                    );
                    tokio::time::sleep(wait).await;
                    delay = cmp::min(delay * 2, self.retry.max_delay());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        token: &BearerToken,
    ) -> ApiResult<Vec<Tweet>> {
        let request = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, "application/json");

        let response = token.apply(request).send().await?;
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::AuthExpired {
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(ApiError::RateLimited {
                    retry_after: retry_after(response.headers()),
                })
            }
            _ if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    message: body.chars().take(MAX_ERROR_MESSAGE).collect(),
                });
            }
            _ => {}
        }

        let body = response.text().await?;
        parse_tweets(&body)
    }

    async fn lookup_chunk(&self, ids: &[TweetId]) -> ApiResult<Vec<Tweet>> {
        let id_list = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let query = [
            ("id", id_list),
            ("tweet_mode", "extended".to_string()),
            ("include_entities", "true".to_string()),
            ("trim_user", "false".to_string()),
            ("map", "false".to_string()),
        ];

        self.get_tweets(LOOKUP_ENDPOINT, &query).await
    }
}

/// `Retry-After` in seconds; HTTP dates are ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl TwitterApi for HttpGateway {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn lookup_tweets(&self, ids: &[TweetId]) -> ApiResult<Vec<Tweet>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let pages = try_join_all(
            ids.chunks(MAX_LOOKUP_IDS)
                .map(|chunk| self.lookup_chunk(chunk)),
        )
        .await?;

        Ok(pages.into_iter().flatten().collect())
    }

    #[instrument(skip(self), fields(user = %page.user, max_id = %page.max_id))]
    async fn user_timeline(&self, page: TimelinePage) -> ApiResult<Vec<Tweet>> {
        let query = [
            ("user_id", page.user.to_string()),
            ("max_id", page.max_id.to_string()),
            ("count", page.count.clamp(1, MAX_TIMELINE_PAGE).to_string()),
            ("exclude_replies", "false".to_string()),
            ("include_rts", "false".to_string()),
            ("trim_user", "false".to_string()),
            ("tweet_mode", "extended".to_string()),
        ];

        self.get_tweets(TIMELINE_ENDPOINT, &query).await
    }
}
