use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{NicoError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.40 Safari/537.36 Edg/92.0.902.9";

/// Session API used to negotiate and keep alive streaming grants.
pub const DEFAULT_SESSION_API_BASE: &str = "https://api.dmc.nico/api/sessions";

/// Query key under which the content auth token travels on media requests.
pub const CONTENT_AUTH_QUERY_KEY: &str = "ht2_nicovideo";

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Configurable options for the session and download clients
#[derive(Debug, Clone)]
pub struct NicoConfig {
    /// Base URL of the session API (without query string)
    pub session_api_base: String,

    /// User agent string
    pub user_agent: String,

    /// Headers sent when fetching the watch page
    pub page_headers: HeaderMap,

    /// Headers sent to the session API and the content server
    pub api_headers: HeaderMap,

    /// Timeout applied to every individual session call (open and renew)
    pub session_timeout: Duration,

    /// Timeout applied to the metadata page request
    pub page_timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing
    pub pool_idle_timeout: Duration,

    /// Default number of bytes handed to the sink per write
    pub chunk_size: usize,
}

impl Default for NicoConfig {
    fn default() -> Self {
        Self {
            session_api_base: DEFAULT_SESSION_API_BASE.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            page_headers: NicoConfig::default_page_headers(),
            api_headers: NicoConfig::default_api_headers(),
            session_timeout: Duration::from_secs(30),
            page_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 4,
            pool_idle_timeout: Duration::from_secs(90),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl NicoConfig {
    pub fn builder() -> NicoConfigBuilder {
        NicoConfigBuilder::new()
    }

    pub fn default_page_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ja,en;q=0.9,en-GB;q=0.8,en-US;q=0.7"),
        );
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            HeaderValue::from_static("max-age=0"),
        );
        headers
    }

    pub fn default_api_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::ORIGIN,
            HeaderValue::from_static("https://www.nicovideo.jp"),
        );
        headers.insert(
            reqwest::header::REFERER,
            HeaderValue::from_static("https://www.nicovideo.jp/"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ja,en;q=0.9,en-GB;q=0.8,en-US;q=0.7"),
        );
        headers
    }
}

/// Builder for [`NicoConfig`]
#[derive(Debug, Clone, Default)]
pub struct NicoConfigBuilder {
    config: NicoConfig,
}

impl NicoConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.session_api_base = base.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Adds a header to API and content requests. Invalid names or values are rejected.
    pub fn with_api_header(mut self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        self.config.api_headers.insert(name, value);
        Ok(self)
    }

    /// Adds a header to the watch page request. Invalid names or values are rejected.
    pub fn with_page_header(mut self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        self.config.page_headers.insert(name, value);
        Ok(self)
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.config.page_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size.max(1);
        self
    }

    pub fn build(self) -> NicoConfig {
        self.config
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| NicoError::configuration(format!("invalid header name `{name}`: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| NicoError::configuration(format!("invalid value for header `{name}`: {e}")))?;
    Ok((name, value))
}

/// Builds the HTTP client shared by the page fetch, the heartbeat and the download.
///
/// No overall request timeout is set here: downloads may legitimately run for a long time.
/// Session calls attach [`NicoConfig::session_timeout`] per request instead.
pub fn create_client(config: &NicoConfig) -> Result<Client> {
    let base = Url::parse(&config.session_api_base).map_err(|e| {
        NicoError::configuration(format!(
            "invalid session API base `{}`: {e}",
            config.session_api_base
        ))
    })?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(NicoError::configuration(format!(
            "unsupported session API scheme `{}`",
            base.scheme()
        )));
    }

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .build()
        .map_err(|e| NicoError::configuration(format!("failed to build HTTP client: {e}")))
}
