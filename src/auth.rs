use std::fmt;

use async_trait::async_trait;

use crate::error::{ApiError, ApiResult};

/// An opaque app-only bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Attach this token to an outgoing request
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.0)
    }
}

// Never print the secret
impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// Something that can hand out bearer credentials. How they are minted or
/// refreshed is up to the implementation.
#[async_trait]
pub trait CredentialProducer: Send + Sync {
    async fn get_token(&self) -> ApiResult<BearerToken>;

    /// Called once after Twitter rejects a token with 401/403.
    async fn refresh_token(&self) -> ApiResult<BearerToken> {
        self.get_token().await
    }
}

/// A fixed token, usually read from configuration.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    token: Option<BearerToken>,
}

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(BearerToken::new),
        }
    }
}

#[async_trait]
impl CredentialProducer for StaticCredential {
    async fn get_token(&self) -> ApiResult<BearerToken> {
        self.token.clone().ok_or_else(|| {
            ApiError::Credential(
                "no bearer token configured; set THREADVIEW_BEARER_TOKEN or bearer_token".into(),
            )
        })
    }
}
