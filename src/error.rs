//! Error types for the API gateway and the thread resolver.

use std::time::Duration;

use thiserror::Error;

use crate::model::TweetId;

/// Failures talking to the Twitter API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure or timeout
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    /// The credential was rejected (401/403); refresh it before retrying
    #[error("authorization rejected by Twitter (HTTP {status})")]
    AuthExpired { status: u16 },

    #[error("rate limited by Twitter")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-2xx response
    #[error("Twitter API error {status}: {message}")]
    Status { status: u16, message: String },

    /// The payload did not have the shape we expect. Never retried.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("could not obtain a credential: {0}")]
    Credential(String),
}

impl ApiError {
    /// Whether the gateway should back off and try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Failures resolving a whole thread.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The requested tweet itself is deleted, protected, or does not exist
    #[error("tweet {0} is unavailable")]
    TweetUnavailable(TweetId),

    /// An ancestor could not be fetched. `partial` holds the tweets that were
    /// resolved, oldest first, ending at the requested tail.
    #[error("thread is broken at tweet {missing}; last resolved tweet was {last_resolved}")]
    BrokenChain {
        missing: TweetId,
        last_resolved: TweetId,
        partial: Vec<TweetId>,
    },

    #[error("thread is longer than the limit of {limit} tweets")]
    ThreadTooLong { limit: usize },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("thread resolution was cancelled")]
    Cancelled,

    #[error("fetch task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl ResolveError {
    /// The part of the thread recovered before the walk broke, if any.
    pub fn partial(&self) -> Option<&[TweetId]> {
        match self {
            Self::BrokenChain { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub fn has_partial(&self) -> bool {
        self.partial().is_some_and(|partial| !partial.is_empty())
    }
}
