use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum NicoError {
    #[error("invalid video URL `{input}`")]
    InvalidUrl { input: String },

    #[error("failed to fetch video metadata from {url}: {reason}")]
    MetadataFetch { url: String, reason: String },

    #[error("failed to open session: {reason}")]
    SessionOpen { reason: String },

    #[error("failed to renew session `{session_id}`: {reason}")]
    Renewal { session_id: String, reason: String },

    #[error("session is dead: {reason}")]
    SessionDead { reason: String },

    #[error("session has been closed")]
    SessionClosed,

    #[error("unknown delivery mode `{mode}`, expected `hls_parameters` or `http_output_download_parameters`")]
    InvalidMode { mode: String },

    #[error("metadata lists no {kind} source ids")]
    NoSources { kind: &'static str },

    #[error("transfer from {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl NicoError {
    pub fn invalid_url(input: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
        }
    }

    pub fn metadata_fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MetadataFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn session_open(reason: impl ToString) -> Self {
        Self::SessionOpen {
            reason: reason.to_string(),
        }
    }

    pub fn renewal(session_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Renewal {
            session_id: session_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transfer(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transfer {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transfer_status(url: impl Into<String>, status: StatusCode) -> Self {
        Self::transfer(url, format!("server responded with HTTP {status}"))
    }

    pub fn configuration(reason: impl ToString) -> Self {
        Self::Configuration {
            reason: reason.to_string(),
        }
    }

    /// Whether re-invoking the failed operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MetadataFetch { .. } | Self::Transfer { .. } => true,
            Self::InvalidUrl { .. }
            | Self::SessionOpen { .. }
            | Self::Renewal { .. }
            | Self::SessionDead { .. }
            | Self::SessionClosed
            | Self::InvalidMode { .. }
            | Self::NoSources { .. }
            | Self::Configuration { .. } => false,
        }
    }
}

pub type Result<T, E = NicoError> = std::result::Result<T, E>;
