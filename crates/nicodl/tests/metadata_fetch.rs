use nicodl_engine::{NicoConfig, NicoError, create_client, fetch_video_info};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn escape_attr(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn watch_page(api_data: &serde_json::Value) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>watch</title></head><body>
<div id="js-initial-watch-data" data-api-data="{}" data-environment="{{}}"></div>
</body></html>"#,
        escape_attr(&api_data.to_string())
    )
}

fn api_data() -> serde_json::Value {
    json!({
        "video": {"id": "sm9", "title": "<Test> & \"video\""},
        "media": {"delivery": {"movie": {"session": {
            "videos": ["archive_h264_360p"],
            "audios": ["archive_aac_64kbps"],
            "heartbeatLifetime": 120,
            "recipeId": "nicovideo-sm9",
            "priority": 0,
            "urls": [{"url": "https://api.dmc.nico/api/sessions", "isWellKnownPort": true, "isSsl": true}],
            "token": "{\"service_id\":\"nicovideo\"}",
            "signature": "deadbeef",
            "contentId": "out1",
            "authTypes": {"http": "ht2", "hls": "ht2"},
            "contentKeyTimeout": 600000,
            "serviceUserId": 0,
            "playerId": "nicovideo-6-xyz"
        }}}}
    })
}

#[tokio::test]
async fn fetches_and_decodes_watch_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch/sm9"))
        .and(header("accept-language", "ja-JP"))
        .respond_with(ResponseTemplate::new(200).set_body_string(watch_page(&api_data())))
        .expect(1)
        .mount(&server)
        .await;

    let config = NicoConfig::builder()
        .with_page_header("accept-language", "ja-JP")
        .unwrap()
        .build();
    let client = create_client(&config).unwrap();
    let info = fetch_video_info(&client, &config, &format!("{}/watch/sm9", server.uri()))
        .await
        .unwrap();

    assert_eq!(info.video_id(), Some("sm9"));
    assert_eq!(info.title(), Some("<Test> & \"video\""));

    let metadata = info.source_metadata().unwrap();
    assert_eq!(metadata.videos, vec!["archive_h264_360p"]);
    assert_eq!(metadata.signature, "deadbeef");
    assert_eq!(metadata.service_user_id, 0);
}

#[tokio::test]
async fn http_error_is_a_metadata_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch/sm404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = NicoConfig::default();
    let client = create_client(&config).unwrap();
    let err = fetch_video_info(&client, &config, &format!("{}/watch/sm404", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, NicoError::MetadataFetch { .. }), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn page_without_watch_data_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch/sm9"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>login</body></html>"))
        .mount(&server)
        .await;

    let config = NicoConfig::default();
    let client = create_client(&config).unwrap();
    let err = fetch_video_info(&client, &config, &format!("{}/watch/sm9", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, NicoError::MetadataFetch { .. }));
}
