//! # Heartbeat session
//!
//! A streaming grant only stays valid while the client keeps renewing its session. The
//! [`HeartbeatSession`] opens the session, then renews it `lifetime - 1` seconds after the start
//! of every previous call until it is closed or a renewal fails.
//!
//! Phases move `Idle -> Opening -> Live <-> Renewing`, ending in `Closed`, `Failed` (the open
//! call failed) or `Dead` (a renewal failed). Terminal phases are never left.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::state::{SessionBody, SessionEnvelope, SessionState};
use crate::config::NicoConfig;
use crate::error::{NicoError, Result};
use crate::payload::SessionRequest;

/// Shortest wait between two session calls, used when the server declares a lifetime of 0 or 1.
pub const MIN_RENEWAL_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between the start of one session call and the next renewal.
pub fn renewal_interval(lifetime_secs: u64) -> Duration {
    Duration::from_secs(lifetime_secs.saturating_sub(1)).max(MIN_RENEWAL_INTERVAL)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Opening,
    Live,
    Renewing,
    Failed { reason: String },
    Dead { reason: String },
    Closed,
}

impl SessionPhase {
    pub fn is_live(&self) -> bool {
        matches!(self, SessionPhase::Live | SessionPhase::Renewing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Failed { .. } | SessionPhase::Dead { .. } | SessionPhase::Closed
        )
    }

    /// Error reported to callers that find the session in a terminal phase.
    pub fn terminal_error(&self) -> Option<NicoError> {
        match self {
            SessionPhase::Failed { reason } => Some(NicoError::session_open(reason)),
            SessionPhase::Dead { reason } => Some(NicoError::SessionDead {
                reason: reason.clone(),
            }),
            SessionPhase::Closed => Some(NicoError::SessionClosed),
            _ => None,
        }
    }
}

pub struct HeartbeatSession {
    client: Client,
    api_base: String,
    headers: HeaderMap,
    timeout: Duration,
    request: SessionRequest,
    phase: watch::Sender<SessionPhase>,
    state: watch::Sender<Option<Arc<SessionState>>>,
    cancel: CancellationToken,
}

impl HeartbeatSession {
    pub fn new(client: Client, config: &NicoConfig, request: SessionRequest) -> Self {
        Self {
            client,
            api_base: config.session_api_base.clone(),
            headers: config.api_headers.clone(),
            timeout: config.session_timeout,
            request,
            phase: watch::Sender::new(SessionPhase::Idle),
            state: watch::Sender::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn request(&self) -> &SessionRequest {
        &self.request
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Latest server state. Renewals replace it wholesale.
    pub fn snapshot(&self) -> Option<Arc<SessionState>> {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<Option<Arc<SessionState>>> {
        self.state.subscribe()
    }

    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Moves to `next` unless a terminal phase has already been reached.
    fn transition(&self, next: SessionPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if phase.is_terminal() || *phase == next {
                return false;
            }
            *phase = next;
            true
        })
    }

    fn open_url(&self) -> String {
        format!("{}?_format=json", self.api_base)
    }

    fn renew_url(&self, session_id: &str) -> String {
        format!("{}/{}?_format=json&_method=PUT", self.api_base, session_id)
    }

    async fn post_session<T: Serialize>(&self, url: &str, session: &T) -> Result<SessionState, String> {
        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .json(&SessionBody { session })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("server responded with HTTP {status}"));
        }

        let envelope: SessionEnvelope = response
            .json()
            .await
            .map_err(|e| format!("malformed session response: {e}"))?;
        Ok(envelope.data.session)
    }

    fn publish(&self, state: SessionState) -> Arc<SessionState> {
        let state = Arc::new(state);
        self.state.send_replace(Some(state.clone()));
        state
    }

    /// Issues the session creation call. On success the state is published and waiters on
    /// [`wait_live`](Self::wait_live) are released.
    #[instrument(skip(self), fields(content_id = %self.request.content_id))]
    pub async fn open(&self) -> Result<Arc<SessionState>> {
        if self.cancel.is_cancelled() {
            self.transition(SessionPhase::Closed);
            return Err(NicoError::SessionClosed);
        }
        if !self.transition(SessionPhase::Opening) && self.phase().is_terminal() {
            let phase = self.phase();
            debug!(?phase, "Session can no longer be opened");
            return Err(phase.terminal_error().unwrap_or(NicoError::SessionClosed));
        }
        info!("Opening session");

        match self.post_session(&self.open_url(), &self.request).await {
            Ok(state) => {
                info!(
                    session_id = %state.id,
                    lifetime = state.lifetime(),
                    has_content_uri = state.has_content_uri(),
                    "Session opened"
                );
                let state = self.publish(state);
                self.transition(SessionPhase::Live);
                Ok(state)
            }
            Err(reason) => {
                warn!(%reason, "Failed to open session");
                self.transition(SessionPhase::Failed {
                    reason: reason.clone(),
                });
                Err(NicoError::session_open(reason))
            }
        }
    }

    /// Sends `current` back to the server and publishes the state it answers with.
    #[instrument(skip(self, current), fields(session_id = %current.id))]
    pub async fn renew(&self, current: &SessionState) -> Result<Arc<SessionState>> {
        self.transition(SessionPhase::Renewing);
        debug!("Sending heartbeat");

        let state = self
            .post_session(&self.renew_url(&current.id), current)
            .await
            .map_err(|reason| NicoError::renewal(&current.id, reason))?;

        debug!(lifetime = state.lifetime(), "Heartbeat acknowledged");
        let state = self.publish(state);
        self.transition(SessionPhase::Live);
        Ok(state)
    }

    /// Opens the session and keeps it alive until [`close`](Self::close) is called or a
    /// renewal fails.
    pub async fn run(self: Arc<Self>) {
        let mut call_started = Instant::now();
        let mut state = match self.open().await {
            Ok(state) => state,
            Err(_) => return,
        };

        loop {
            let interval = renewal_interval(state.lifetime());
            debug!(session_id = %state.id, ?interval, "Next heartbeat scheduled");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(call_started + interval) => {}
            }

            call_started = Instant::now();
            match self.renew(&state).await {
                Ok(next) => state = next,
                Err(e) if self.cancel.is_cancelled() => {
                    debug!(error = %e, "Heartbeat failed while closing");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Heartbeat failed, session is dead");
                    self.transition(SessionPhase::Dead {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }

        info!(session_id = %state.id, "Heartbeat stopped");
        self.transition(SessionPhase::Closed);
    }

    /// Stops the renewal loop. A call already in flight completes; no further call is issued.
    pub fn close(&self) {
        self.cancel.cancel();
        self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Idle {
                *phase = SessionPhase::Closed;
                true
            } else {
                false
            }
        });
    }

    /// Waits until the session has been opened, or fails with the reason it never will be.
    pub async fn wait_live(&self) -> Result<Arc<SessionState>> {
        let mut phases = self.phase.subscribe();
        let phase = phases
            .wait_for(|phase| phase.is_live() || phase.is_terminal())
            .await
            .map_err(|_| NicoError::SessionClosed)?
            .clone();

        if let Some(err) = phase.terminal_error() {
            return Err(err);
        }
        self.snapshot().ok_or(NicoError::SessionClosed)
    }

    /// Waits until the published state carries a content URI.
    pub async fn wait_for_content(&self) -> Result<Arc<SessionState>> {
        let mut states = self.state.subscribe();
        let mut phases = self.phase.subscribe();

        tokio::select! {
            biased;
            err = wait_terminal(&mut phases) => Err(err),
            state = wait_content(&mut states) => state,
        }
    }
}

async fn wait_terminal(phases: &mut watch::Receiver<SessionPhase>) -> NicoError {
    match phases.wait_for(SessionPhase::is_terminal).await {
        Ok(phase) => phase.terminal_error().unwrap_or(NicoError::SessionClosed),
        Err(_) => NicoError::SessionClosed,
    }
}

async fn wait_content(
    states: &mut watch::Receiver<Option<Arc<SessionState>>>,
) -> Result<Arc<SessionState>> {
    let state = states
        .wait_for(|state| state.as_ref().is_some_and(|s| s.has_content_uri()))
        .await
        .map_err(|_| NicoError::SessionClosed)?;
    state.clone().ok_or(NicoError::SessionClosed)
}
