//! # nicodl engine
//!
//! Downloads niconico videos through the session API. A streaming grant is only honoured while
//! its session is renewed ("heartbeat"), so every download runs next to a background renewal
//! task owned by a [`SessionController`].
//!
//! ```no_run
//! use nicodl_engine::{Mode, NicoConfig, SessionController, create_client, fetch_video_info};
//!
//! # async fn run() -> nicodl_engine::Result<()> {
//! let config = NicoConfig::default();
//! let client = create_client(&config)?;
//! let info = fetch_video_info(&client, &config, "https://www.nicovideo.jp/watch/sm9").await?;
//! let controller =
//!     SessionController::new(client, &config, &info.source_metadata()?, Mode::DirectHttp)?;
//!
//! controller
//!     .with_session(async |c| c.download_to_path("output.mp4", |_| {}).await)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod metadata;
pub mod payload;
pub mod session;
pub mod streamer;

pub use config::{NicoConfig, NicoConfigBuilder, create_client};
pub use controller::{DownloadLink, SessionController};
pub use error::{NicoError, Result};
pub use metadata::{SourceMetadata, VideoInfo, fetch_video_info, normalize_watch_url};
pub use payload::{Mode, SessionRequest};
pub use session::{HeartbeatSession, SessionPhase, SessionState};
pub use streamer::{DownloadProgress, DownloadStreamer};
