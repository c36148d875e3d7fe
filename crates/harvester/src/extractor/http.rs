//! Shared HTTP page fetcher for extractors
//!
//! - One `reqwest::Client` with browser-like headers, reused by every worker
//! - Optional outbound proxy, fixed at construction
//! - Per-request `Cookie` header built from the item's credential set
//! - Login-wall detection on the page `<title>`
//!
//! A fetch is a single attempt; failures are classified into
//! [`ExtractError`] so the task runner can decide whether to retry.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::ExtractError;
use crate::credentials::CredentialSet;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Title fragment shown by the site's authentication page
pub const DEFAULT_LOGIN_MARKER: &str = "登录";

/// Page fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetcherConfig {
    /// Outbound proxy applied to every request
    pub proxy_url: Option<String>,

    /// Per-request timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    /// Pause between consecutive pages of one multi-page extraction
    #[serde(with = "duration_millis")]
    pub page_pause: Duration,

    /// Title substring that marks an authentication redirect
    pub login_marker: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            timeout: Duration::from_secs(30),
            page_pause: Duration::from_secs(2),
            login_marker: DEFAULT_LOGIN_MARKER.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route all requests through a proxy
    pub fn with_proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pause between pages
    pub fn with_page_pause(mut self, pause: Duration) -> Self {
        self.page_pause = pause;
        self
    }

    pub fn with_login_marker(mut self, marker: impl Into<String>) -> Self {
        self.login_marker = marker.into();
        self
    }
}

/// HTTP client shared by extractors
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl PageFetcher {
    /// Build the client; an unparsable proxy URL is a configuration error
    pub fn new(config: FetcherConfig) -> Result<Self, ExtractError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| {
                ExtractError::InvalidConfiguration(format!("invalid proxy {}: {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            ExtractError::InvalidConfiguration(format!("failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch a page body, rejecting error statuses and login walls
    #[instrument(skip(self, credentials), fields(authenticated = credentials.is_some()))]
    pub async fn get_html(
        &self,
        url: &str,
        credentials: Option<&CredentialSet>,
    ) -> Result<String, ExtractError> {
        let body = self.get_text(url, credentials).await?;

        if let Some(title) = page_title(&body) {
            if title.contains(&self.config.login_marker) {
                warn!(%url, %title, "Redirected to login page");
                return Err(ExtractError::LoginRequired {
                    url: url.to_string(),
                });
            }
        }

        Ok(body)
    }

    /// Fetch and decode a JSON endpoint
    #[instrument(skip(self, credentials))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        credentials: Option<&CredentialSet>,
    ) -> Result<T, ExtractError> {
        let body = self.get_text(url, credentials).await?;
        serde_json::from_str(&body)
            .map_err(|e| ExtractError::Parse(format!("malformed JSON from {}: {}", url, e)))
    }

    /// Sleep between pages of one extraction
    pub async fn pause_between_pages(&self) {
        if !self.config.page_pause.is_zero() {
            tokio::time::sleep(self.config.page_pause).await;
        }
    }

    async fn get_text(
        &self,
        url: &str,
        credentials: Option<&CredentialSet>,
    ) -> Result<String, ExtractError> {
        let mut request = self.client.get(url);
        if let Some(credentials) = credentials.filter(|c| !c.is_empty()) {
            let cookie = HeaderValue::from_str(&credentials.cookie_header()).map_err(|e| {
                ExtractError::InvalidConfiguration(format!("invalid cookie value: {}", e))
            })?;
            request = request.header(header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractError::Network(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::Network(format!("failed to read body of {}: {}", url, e)))?;

        debug!(%url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

/// Text of the document `<title>`, trimmed; `None` when absent or empty
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> PageFetcher {
        PageFetcher::new(FetcherConfig::new().with_page_pause(Duration::ZERO)).unwrap()
    }

    #[test]
    fn test_page_title() {
        assert_eq!(
            page_title("<html><head><title> 周星驰 </title></head></html>"),
            Some("周星驰".to_string())
        );
        assert_eq!(page_title("<html><body>no title</body></html>"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = FetcherConfig::default();
        assert_eq!(config.login_marker, DEFAULT_LOGIN_MARKER);
        assert_eq!(config.page_pause, Duration::from_secs(2));
        assert!(config.proxy_url.is_none());
    }

    #[test]
    fn test_valid_proxy_accepted() {
        let config = FetcherConfig::new().with_proxy("http://127.0.0.1:7890");
        assert!(PageFetcher::new(config).is_ok());
    }

    #[tokio::test]
    async fn test_get_html_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/personage/1001/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><head><title>Someone</title></head></html>"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/personage/1001/", server.uri());
        let body = fetcher().get_html(&url, None).await.unwrap();
        assert!(body.contains("Someone"));
    }

    #[tokio::test]
    async fn test_login_wall_detected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><head><title>登录豆瓣</title></head></html>"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/personage/1001/works/", server.uri());
        let err = fetcher().get_html(&url, None).await.unwrap_err();
        assert_eq!(err, ExtractError::LoginRequired { url });
    }

    #[tokio::test]
    async fn test_error_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let url = format!("{}/subject/2001/", server.uri());
        let err = fetcher().get_html(&url, None).await.unwrap_err();
        assert!(matches!(err, ExtractError::Http { status: 403, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cookie_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("cookie", "bid=abc; dbcl2=xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>ok</title>"))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = CredentialSet::new([("dbcl2", "xyz"), ("bid", "abc")]);
        let url = format!("{}/personage/1001/awards/", server.uri());
        fetcher().get_html(&url, Some(&credentials)).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_json() {
        #[derive(Debug, Deserialize)]
        struct Suggest {
            title: String,
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"title":"Eva"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let ok: Suggest = fetcher
            .get_json(&format!("{}/ok", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(ok.title, "Eva");

        let err = fetcher
            .get_json::<Suggest>(&format!("{}/bad", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let fetcher =
            PageFetcher::new(FetcherConfig::new().with_timeout(Duration::from_secs(2))).unwrap();
        let err = fetcher
            .get_html("http://127.0.0.1:1/gone", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Network(_)));
    }
}
