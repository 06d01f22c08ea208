#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nicodl_engine::metadata::{AuthTypes, DeliveryUrl};
use nicodl_engine::{Mode, NicoConfig, SessionController, SourceMetadata, create_client};
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, Request, Respond, ResponseTemplate};

pub const SESSIONS_PATH: &str = "/api/sessions";

pub fn metadata(lifetime: u64) -> SourceMetadata {
    SourceMetadata {
        videos: vec!["archive_h264_720p".into()],
        audios: vec!["archive_aac_128kbps".into(), "archive_aac_64kbps".into()],
        heartbeat_lifetime: lifetime,
        recipe_id: "nicovideo-sm9".into(),
        priority: 0.2,
        urls: vec![DeliveryUrl {
            url: None,
            is_well_known_port: true,
            is_ssl: true,
        }],
        token: "{\"service_id\":\"nicovideo\"}".into(),
        signature: "signature".into(),
        content_id: "out1".into(),
        auth_types: AuthTypes {
            http: "ht2".into(),
            hls: None,
        },
        content_key_timeout: 600000,
        service_user_id: 42,
        player_id: "nicovideo-player".into(),
    }
}

pub fn session_json(id: &str, content_uri: &str, lifetime: u64, token: &str) -> Value {
    json!({
        "id": id,
        "recipe_id": "nicovideo-sm9",
        "content_id": "out1",
        "content_uri": content_uri,
        "keep_method": {"heartbeat": {"lifetime": lifetime}},
        "content_auth": {
            "auth_type": "ht2",
            "content_key_timeout": 600000,
            "service_id": "nicovideo",
            "service_user_id": "42",
            "content_auth_info": {"method": "query", "name": "ht2_nicovideo", "value": token}
        }
    })
}

pub fn envelope(session: Value) -> Value {
    json!({"meta": {"status": 201, "message": "created"}, "data": {"session": session}})
}

pub fn session_response(session: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(envelope(session))
}

pub fn open_mock() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path(SESSIONS_PATH))
        .and(query_param("_format", "json"))
}

pub fn renew_mock(session_id: &str) -> MockBuilder {
    Mock::given(method("POST"))
        .and(path(format!("{SESSIONS_PATH}/{session_id}")))
        .and(query_param("_format", "json"))
        .and(query_param("_method", "PUT"))
}

pub fn config(server: &MockServer) -> NicoConfig {
    NicoConfig::builder()
        .with_session_api_base(format!("{}{SESSIONS_PATH}", server.uri()))
        .with_session_timeout(Duration::from_secs(5))
        .build()
}

pub fn controller(server: &MockServer, lifetime: u64) -> SessionController {
    controller_with(config(server), lifetime)
}

pub fn controller_with(config: NicoConfig, lifetime: u64) -> SessionController {
    let client = create_client(&config).unwrap();
    SessionController::new(client, &config, &metadata(lifetime), Mode::DirectHttp).unwrap()
}

/// Answers with a sequence of sessions and remembers when each request arrived.
pub struct Recorder {
    hits: Arc<Mutex<Vec<Instant>>>,
    responses: Vec<Value>,
}

impl Recorder {
    pub fn new(responses: Vec<Value>) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let hits = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                hits: hits.clone(),
                responses,
            },
            hits,
        )
    }
}

impl Respond for Recorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut hits = self.hits.lock().unwrap();
        hits.push(Instant::now());
        let index = (hits.len() - 1).min(self.responses.len() - 1);
        session_response(self.responses[index].clone())
    }
}

/// Polls `check` until it holds or `limit` runs out; returns the last result.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    check()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("nicodl_engine=debug")
        .with_test_writer()
        .try_init();
}
