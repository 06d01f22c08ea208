//! Session-initiation payload.
//!
//! [`build`] turns the page's [`SourceMetadata`] into the body of the session creation call.
//! It performs no I/O and always yields the same request for the same inputs.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NicoError, Result};
use crate::metadata::{DeliveryUrl, SourceMetadata};

/// Segment duration requested for segmented delivery, in milliseconds.
pub const SEGMENT_DURATION: u64 = 6000;

pub const SERVICE_ID: &str = "nicovideo";

/// Delivery mode negotiated with the session API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// HLS-style segmented stream (`hls_parameters`)
    SegmentedStream,
    /// Single progressive MP4 over HTTP (`http_output_download_parameters`)
    #[default]
    DirectHttp,
}

impl Mode {
    /// Protocol-parameter key used on the wire.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Mode::SegmentedStream => "hls_parameters",
            Mode::DirectHttp => "http_output_download_parameters",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Mode {
    type Err = NicoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hls_parameters" | "segmented-stream" | "hls" => Ok(Mode::SegmentedStream),
            "http_output_download_parameters" | "direct-http" | "http" => Ok(Mode::DirectHttp),
            other => Err(NicoError::InvalidMode {
                mode: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    Yes,
    No,
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value { YesNo::Yes } else { YesNo::No }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub content_type: String,
    pub content_src_id_sets: Vec<ContentSrcIdSet>,
    pub timing_constraint: String,
    pub keep_method: KeepMethod,
    pub recipe_id: String,
    pub priority: f64,
    pub protocol: Protocol,
    pub content_uri: String,
    pub session_operation_auth: SessionOperationAuth,
    pub content_id: String,
    pub content_auth: ContentAuth,
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSrcIdSet {
    pub content_src_ids: Vec<ContentSrcId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSrcId {
    pub src_id_to_mux: SrcIdToMux,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrcIdToMux {
    pub video_src_ids: Vec<String>,
    pub audio_src_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepMethod {
    pub heartbeat: Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub lifetime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    pub parameters: ProtocolParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub http_parameters: HttpParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpParameters {
    pub parameters: TransferParameters,
}

/// Exactly one of the two shapes is serialized, keyed by [`Mode::wire_name`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferParameters {
    #[serde(rename = "hls_parameters")]
    Segmented(SegmentedParameters),
    #[serde(rename = "http_output_download_parameters")]
    Direct(DirectParameters),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectParameters {
    pub use_well_known_port: YesNo,
    pub use_ssl: YesNo,
    pub transfer_preset: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedParameters {
    pub use_well_known_port: YesNo,
    pub use_ssl: YesNo,
    pub transfer_preset: String,
    pub segment_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOperationAuth {
    pub session_operation_auth_by_signature: SignatureAuth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureAuth {
    pub token: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAuth {
    pub auth_type: String,
    pub content_key_timeout: u64,
    pub service_id: String,
    pub service_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub player_id: String,
}

impl SessionRequest {
    pub fn lifetime(&self) -> u64 {
        self.keep_method.heartbeat.lifetime
    }

    pub fn mux_entries(&self) -> impl Iterator<Item = &SrcIdToMux> {
        self.content_src_id_sets
            .iter()
            .flat_map(|set| set.content_src_ids.iter())
            .map(|id| &id.src_id_to_mux)
    }
}

/// Pairs the source lists the way the session API expects.
///
/// Each entry carries the remaining video and audio ids; after every entry the head of each
/// list longer than one element is dropped, so the shorter list keeps repeating its last id.
fn mux_sources(videos: &[String], audios: &[String], mode: Mode) -> Vec<ContentSrcId> {
    let rounds = match mode {
        Mode::DirectHttp => 1,
        Mode::SegmentedStream => videos.len().max(audios.len()),
    };

    let (mut videos, mut audios) = (videos, audios);
    let mut entries = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        entries.push(ContentSrcId {
            src_id_to_mux: SrcIdToMux {
                video_src_ids: videos.to_vec(),
                audio_src_ids: audios.to_vec(),
            },
        });
        if videos.len() > 1 {
            videos = &videos[1..];
        }
        if audios.len() > 1 {
            audios = &audios[1..];
        }
    }
    entries
}

fn transfer_parameters(delivery: &DeliveryUrl, mode: Mode) -> TransferParameters {
    let use_well_known_port = YesNo::from(delivery.is_well_known_port);
    let use_ssl = YesNo::from(delivery.is_ssl);
    match mode {
        Mode::DirectHttp => TransferParameters::Direct(DirectParameters {
            use_well_known_port,
            use_ssl,
            transfer_preset: String::new(),
        }),
        Mode::SegmentedStream => TransferParameters::Segmented(SegmentedParameters {
            use_well_known_port,
            use_ssl,
            transfer_preset: String::new(),
            segment_duration: SEGMENT_DURATION,
        }),
    }
}

/// Builds the session-initiation request for `metadata` in the given delivery mode.
pub fn build(metadata: &SourceMetadata, mode: Mode) -> Result<SessionRequest> {
    if metadata.videos.is_empty() {
        return Err(NicoError::NoSources { kind: "video" });
    }
    if metadata.audios.is_empty() {
        return Err(NicoError::NoSources { kind: "audio" });
    }

    let delivery = metadata.urls.first().cloned().unwrap_or_default();

    Ok(SessionRequest {
        content_type: "movie".to_owned(),
        content_src_id_sets: vec![ContentSrcIdSet {
            content_src_ids: mux_sources(&metadata.videos, &metadata.audios, mode),
        }],
        timing_constraint: "unlimited".to_owned(),
        keep_method: KeepMethod {
            heartbeat: Heartbeat {
                lifetime: metadata.heartbeat_lifetime,
            },
        },
        recipe_id: metadata.recipe_id.clone(),
        priority: metadata.priority,
        protocol: Protocol {
            name: "http".to_owned(),
            parameters: ProtocolParameters {
                http_parameters: HttpParameters {
                    parameters: transfer_parameters(&delivery, mode),
                },
            },
        },
        content_uri: String::new(),
        session_operation_auth: SessionOperationAuth {
            session_operation_auth_by_signature: SignatureAuth {
                token: metadata.token.clone(),
                signature: metadata.signature.clone(),
            },
        },
        content_id: metadata.content_id.clone(),
        content_auth: ContentAuth {
            auth_type: metadata.auth_types.http.clone(),
            content_key_timeout: metadata.content_key_timeout,
            service_id: SERVICE_ID.to_owned(),
            service_user_id: metadata.service_user_id.to_string(),
        },
        client_info: ClientInfo {
            player_id: metadata.player_id.clone(),
        },
    })
}

/// Like [`build`], with the mode given by name (wire key or short alias).
pub fn build_named(metadata: &SourceMetadata, mode: &str) -> Result<SessionRequest> {
    build(metadata, mode.parse()?)
}
