//! # Session controller
//!
//! Ties one [`HeartbeatSession`] to one download. `connect` spawns the heartbeat task and waits
//! for the session to go live; `download` streams the negotiated URI while the heartbeat keeps
//! running; `close` stops the heartbeat and waits for its task.
//!
//! The download link and the auth token are captured once, the first time they are needed, and
//! are not refreshed when later renewals replace the session state. Use
//! [`SessionController::session_snapshot`] to look at the current state instead.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::NicoConfig;
use crate::error::{NicoError, Result};
use crate::metadata::SourceMetadata;
use crate::payload::{self, Mode};
use crate::session::{HeartbeatSession, SessionPhase, SessionState};
use crate::streamer::{DownloadProgress, DownloadStreamer};

/// Link captured by [`SessionController::get_download_link`].
#[derive(Debug, Clone)]
pub struct DownloadLink {
    pub uri: String,
    /// State the link was read from; its auth token is the one used for downloads.
    pub state: Arc<SessionState>,
}

impl DownloadLink {
    pub fn auth_token(&self) -> Option<&str> {
        self.state.auth_token()
    }
}

enum HeartbeatTask {
    NotStarted,
    Running(JoinHandle<()>),
    Stopped,
}

pub struct SessionController {
    session: Arc<HeartbeatSession>,
    streamer: DownloadStreamer,
    task: Mutex<HeartbeatTask>,
    link: OnceCell<DownloadLink>,
    chunk_size: usize,
}

impl SessionController {
    /// Builds the session request for `metadata` and prepares, without starting, its heartbeat.
    pub fn new(
        client: Client,
        config: &NicoConfig,
        metadata: &SourceMetadata,
        mode: Mode,
    ) -> Result<Self> {
        let request = payload::build(metadata, mode)?;
        let session = HeartbeatSession::new(client.clone(), config, request);
        Ok(Self {
            session: Arc::new(session),
            streamer: DownloadStreamer::new(client, config),
            task: Mutex::new(HeartbeatTask::NotStarted),
            link: OnceCell::new(),
            chunk_size: config.chunk_size,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn is_live(&self) -> bool {
        self.session.phase().is_live()
    }

    /// Current server state, uncached.
    pub fn session_snapshot(&self) -> Option<Arc<SessionState>> {
        self.session.snapshot()
    }

    /// Link captured by an earlier [`get_download_link`](Self::get_download_link), if any.
    pub fn cached_link(&self) -> Option<&DownloadLink> {
        self.link.get()
    }

    fn start(&self) {
        let mut task = self.task.lock();
        if !matches!(*task, HeartbeatTask::NotStarted) {
            return;
        }

        let span = info_span!("heartbeat", content_id = %self.session.request().content_id);
        let handle = tokio::spawn(self.session.clone().run().instrument(span));
        *task = HeartbeatTask::Running(handle);
    }

    /// Starts the heartbeat and waits until the session is live.
    ///
    /// Further calls do not open another session; they only wait for the first one.
    pub async fn connect(&self) -> Result<()> {
        self.wait_until_live().await.map(drop)
    }

    /// Waits until the session is live, connecting first if needed.
    pub async fn wait_until_live(&self) -> Result<Arc<SessionState>> {
        self.start();
        self.session.wait_live().await
    }

    fn ensure_alive(&self) -> Result<()> {
        match self.session.phase().terminal_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn resolve_link(&self) -> Result<DownloadLink> {
        self.connect().await?;
        let state = self.session.wait_for_content().await?;
        debug!(session_id = %state.id, uri = %state.content_uri, "Download link captured");
        Ok(DownloadLink {
            uri: state.content_uri.clone(),
            state,
        })
    }

    async fn link(&self) -> Result<&DownloadLink> {
        self.ensure_alive()?;
        self.link.get_or_try_init(|| self.resolve_link()).await
    }

    /// Returns the content URI, blocking until the server has negotiated one.
    pub async fn get_download_link(&self) -> Result<String> {
        Ok(self.link().await?.uri.clone())
    }

    /// Streams the content into `sink`, returning the number of bytes written.
    pub async fn download<W, F>(&self, sink: &mut W, chunk_size: usize, on_progress: F) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
        F: FnMut(DownloadProgress),
    {
        let link = self.link().await?;
        self.streamer
            .stream(&link.uri, link.auth_token(), sink, chunk_size, on_progress)
            .await
    }

    /// Downloads into `path`, creating or truncating the file.
    ///
    /// A failed transfer leaves the partial file behind.
    pub async fn download_to_path<F>(&self, path: impl AsRef<Path>, on_progress: F) -> Result<u64>
    where
        F: FnMut(DownloadProgress),
    {
        let path = path.as_ref();
        let link = self.link().await?;
        let mut file = File::create(path)
            .await
            .map_err(|e| NicoError::transfer(&link.uri, format!("{}: {e}", path.display())))?;

        let written = self.download(&mut file, self.chunk_size, on_progress).await?;
        file.sync_all()
            .await
            .map_err(|e| NicoError::transfer(&link.uri, e))?;
        file.shutdown()
            .await
            .map_err(|e| NicoError::transfer(&link.uri, e))?;

        info!(path = %path.display(), written, "Download saved");
        Ok(written)
    }

    /// Stops the heartbeat and waits for its task. Safe to call any number of times.
    pub async fn close(&self) {
        self.session.close();

        let handle = {
            let mut task = self.task.lock();
            match std::mem::replace(&mut *task, HeartbeatTask::Stopped) {
                HeartbeatTask::Running(handle) => Some(handle),
                _ => None,
            }
        };

        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Heartbeat task ended abnormally");
        }
    }

    /// Connects, runs `f`, and closes on every exit path.
    pub async fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&Self) -> Result<T>,
    {
        let result = match self.connect().await {
            Ok(()) => f(self).await,
            Err(e) => Err(e),
        };
        self.close().await;
        result
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.session.close();
    }
}
