use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-issued session, as returned by the open and renewal calls.
///
/// Only the fields the client reads are typed; everything else is kept in `extra` so that a
/// renewal can echo the state back to the server unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    #[serde(default)]
    pub content_uri: String,
    pub keep_method: StateKeepMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_auth: Option<StateContentAuth>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateKeepMethod {
    pub heartbeat: StateHeartbeat,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateHeartbeat {
    /// Seconds the grant stays valid without a renewal
    pub lifetime: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateContentAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_auth_info: Option<ContentAuthInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAuthInfo {
    pub value: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionState {
    pub fn lifetime(&self) -> u64 {
        self.keep_method.heartbeat.lifetime
    }

    pub fn has_content_uri(&self) -> bool {
        !self.content_uri.is_empty()
    }

    /// Token the content server expects next to the content URI.
    pub fn auth_token(&self) -> Option<&str> {
        self.content_auth
            .as_ref()
            .and_then(|auth| auth.content_auth_info.as_ref())
            .map(|info| info.value.as_str())
    }
}

/// `{"session": ...}` request body.
#[derive(Debug, Serialize)]
pub(crate) struct SessionBody<'a, T> {
    pub session: &'a T,
}

/// `{"data": {"session": ...}}` response body.
#[derive(Debug, Deserialize)]
pub(crate) struct SessionEnvelope {
    pub data: SessionData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionData {
    pub session: SessionState,
}
