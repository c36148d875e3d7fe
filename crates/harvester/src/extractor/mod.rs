//! Extractor contract
//!
//! An [`Extractor`] turns one claimed work item into result records by
//! fetching and parsing the remote page(s) behind it. The worker layer owns
//! retries, persistence, and flag updates; extractors perform a single
//! attempt and classify their failure.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialSet;
use crate::persistence::{ResultRecord, WorkItem};
use crate::requirement::Requirement;

pub use http::{FetcherConfig, PageFetcher};

/// Failure classes shared by extraction and task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal setup problem
    InvalidConfiguration,
    /// Network failure or unexpected status
    TransientFetch,
    /// The page redirected to an authentication wall
    LoginRequired,
    /// Page structure did not match expectations
    Parse,
    /// Store rejected the write
    Persistence,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidConfiguration => "invalid_configuration",
            Self::TransientFetch => "transient_fetch",
            Self::LoginRequired => "login_required",
            Self::Parse => "parse",
            Self::Persistence => "persistence",
        };
        f.write_str(s)
    }
}

/// Error type for a single extraction attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// Extractor cannot run with the supplied setup
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Page title indicates an authentication redirect
    #[error("login required at {url}")]
    LoginRequired { url: String },

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// Connection, timeout, or body read failure
    #[error("network error: {0}")]
    Network(String),

    /// Unexpected page structure
    #[error("parse error: {0}")]
    Parse(String),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::LoginRequired { .. } => ErrorKind::LoginRequired,
            Self::Http { .. } | Self::Network(_) => ErrorKind::TransientFetch,
            Self::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Whether another attempt could succeed without outside intervention
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientFetch | ErrorKind::LoginRequired
        )
    }

    /// Shorthand for a parse failure
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

impl From<anyhow::Error> for ExtractError {
    fn from(err: anyhow::Error) -> Self {
        Self::Network(format!("{:#}", err))
    }
}

/// Input to a single extraction attempt
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub requirement: Requirement,
    pub item: WorkItem,
    /// Credential set assigned to the item, if the requirement needs one
    pub credentials: Option<Arc<CredentialSet>>,
    /// 1-based attempt number
    pub attempt: u32,
}

impl ExtractRequest {
    pub fn new(requirement: Requirement, item: WorkItem) -> Self {
        Self {
            requirement,
            item,
            credentials: None,
            attempt: 1,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Arc<CredentialSet>>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn entity_id(&self) -> &str {
        self.item.entity_id()
    }
}

/// Fetches and parses the pages behind one requirement
///
/// Implementations must be safe to call concurrently; each call is one
/// attempt and must not retry internally.
///
/// # Example
///
/// ```ignore
/// struct ProfileExtractor { fetcher: PageFetcher }
///
/// #[async_trait]
/// impl Extractor for ProfileExtractor {
///     fn requirement(&self) -> Requirement {
///         Requirement::PersonProfile
///     }
///
///     async fn extract(&self, request: &ExtractRequest) -> Result<Vec<ResultRecord>, ExtractError> {
///         let url = format!("https://www.douban.com/personage/{}/", request.entity_id());
///         let html = self.fetcher.get_html(&url, request.credentials.as_deref()).await?;
///         Ok(vec![parse_profile(request.entity_id(), &url, &html)?.into()])
///     }
/// }
/// ```
#[async_trait]
pub trait Extractor: Send + Sync + 'static {
    /// Requirement whose flag this extractor completes
    fn requirement(&self) -> Requirement;

    /// Perform one extraction attempt
    async fn extract(&self, request: &ExtractRequest) -> Result<Vec<ResultRecord>, ExtractError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MarkingRecord;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ExtractError::LoginRequired {
                url: "https://example.com".into()
            }
            .kind(),
            ErrorKind::LoginRequired
        );
        assert_eq!(
            ExtractError::Http {
                status: 503,
                url: "https://example.com".into()
            }
            .kind(),
            ErrorKind::TransientFetch
        );
        assert_eq!(ExtractError::parse("no title").kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_retryable() {
        assert!(ExtractError::Network("reset".into()).is_retryable());
        assert!(!ExtractError::parse("missing table").is_retryable());
        assert!(!ExtractError::InvalidConfiguration("no cookies".into()).is_retryable());
    }

    #[test]
    fn test_from_anyhow_is_transient() {
        let err: ExtractError = anyhow::anyhow!("connection refused").into();
        assert_eq!(err.kind(), ErrorKind::TransientFetch);
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_request_builder() {
        let request = ExtractRequest::new(
            Requirement::PersonWorks,
            WorkItem::Person(MarkingRecord::new("1001")),
        )
        .with_attempt(2)
        .with_credentials(Some(Arc::new(CredentialSet::new([("dbcl2", "x")]))));

        assert_eq!(request.entity_id(), "1001");
        assert_eq!(request.attempt, 2);
        assert!(request.credentials.is_some());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::LoginRequired.to_string(), "login_required");
        let json = serde_json::to_string(&ErrorKind::TransientFetch).unwrap();
        assert_eq!(json, "\"transient_fetch\"");
    }
}
