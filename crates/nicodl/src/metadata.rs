//! Watch page metadata.
//!
//! The watch page embeds its whole API record as the `data-api-data` attribute of
//! `div#js-initial-watch-data`. Everything the session payload needs lives under
//! `media.delivery.movie.session`.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::NicoConfig;
use crate::error::{NicoError, Result};

pub const WATCH_URL_BASE: &str = "https://www.nicovideo.jp/watch/";

static WATCH_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:(?:www|sp)\.)?(?:nicovideo\.jp/watch|nico\.ms)/([a-z]{2}\d+)")
        .unwrap()
});

static VIDEO_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]{2}\d+$").unwrap());

const WATCH_DATA_SELECTOR: &str = "div#js-initial-watch-data";
const WATCH_DATA_ATTR: &str = "data-api-data";

/// Delivery descriptor of one content URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUrl {
    #[serde(default)]
    pub url: Option<String>,
    pub is_well_known_port: bool,
    pub is_ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthTypes {
    pub http: String,
    #[serde(default)]
    pub hls: Option<String>,
}

/// Inputs of the session-initiation payload, as published by the watch page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    /// Interchangeable video source ids, best first
    pub videos: Vec<String>,
    /// Interchangeable audio source ids, best first
    pub audios: Vec<String>,
    /// Heartbeat lifetime in seconds
    pub heartbeat_lifetime: u64,
    pub recipe_id: String,
    pub priority: f64,
    #[serde(default)]
    pub urls: Vec<DeliveryUrl>,
    pub token: String,
    pub signature: String,
    pub content_id: String,
    pub auth_types: AuthTypes,
    pub content_key_timeout: u64,
    #[serde(deserialize_with = "number_or_string")]
    pub service_user_id: u64,
    pub player_id: String,
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Decoded watch page record.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub url: String,
    pub data: Value,
}

impl VideoInfo {
    pub fn title(&self) -> Option<&str> {
        self.data.pointer("/video/title").and_then(Value::as_str)
    }

    pub fn video_id(&self) -> Option<&str> {
        self.data.pointer("/video/id").and_then(Value::as_str)
    }

    pub fn source_metadata(&self) -> Result<SourceMetadata> {
        let session = self
            .data
            .pointer("/media/delivery/movie/session")
            .ok_or_else(|| {
                NicoError::metadata_fetch(
                    &self.url,
                    "page record has no media.delivery.movie.session (login may be required)",
                )
            })?;
        SourceMetadata::deserialize(session)
            .map_err(|e| NicoError::metadata_fetch(&self.url, format!("malformed session data: {e}")))
    }
}

/// Accepts a watch URL, a short `nico.ms` link or a bare id such as `sm9` and returns the
/// canonical watch page URL.
pub fn normalize_watch_url(input: &str) -> Result<String> {
    let input = input.trim();
    let id = WATCH_URL_REGEX
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .or_else(|| VIDEO_ID_REGEX.is_match(input).then_some(input))
        .ok_or_else(|| NicoError::invalid_url(input))?;
    Ok(format!("{WATCH_URL_BASE}{id}"))
}

/// Extracts the embedded API record from watch page HTML.
pub fn parse_watch_page(html: &str) -> std::result::Result<Value, String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(WATCH_DATA_SELECTOR).map_err(|e| e.to_string())?;
    let raw = document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(WATCH_DATA_ATTR))
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| format!("`{WATCH_DATA_ATTR}` attribute not found in page"))?;
    serde_json::from_str(raw).map_err(|e| format!("invalid `{WATCH_DATA_ATTR}` JSON: {e}"))
}

#[instrument(skip(client, config), level = "debug")]
pub async fn fetch_video_info(client: &Client, config: &NicoConfig, url: &str) -> Result<VideoInfo> {
    info!(url, "Fetching watch page");

    let response = client
        .get(url)
        .headers(config.page_headers.clone())
        .timeout(config.page_timeout)
        .send()
        .await
        .map_err(|e| NicoError::metadata_fetch(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NicoError::metadata_fetch(
            url,
            format!("server responded with HTTP {status}"),
        ));
    }

    let html = response
        .text()
        .await
        .map_err(|e| NicoError::metadata_fetch(url, e))?;
    debug!(url, bytes = html.len(), "Watch page received");

    let data = parse_watch_page(&html).map_err(|reason| NicoError::metadata_fetch(url, reason))?;

    Ok(VideoInfo {
        url: url.to_owned(),
        data,
    })
}
