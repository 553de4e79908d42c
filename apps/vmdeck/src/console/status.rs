use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::surface::{SurfaceHost, SurfaceRef, Visibility};

pub const STATUS_CONNECTING: &str = "Verbindung wird hergestellt";
pub const STATUS_CONNECTED: &str = "Verbunden";
pub const STATUS_AGENT_ERROR: &str = "Agent Verbindungsfehler";
pub const STATUS_CONNECTION_ERROR: &str = "Verbindungsfehler";

pub fn error_status(reason: impl std::fmt::Display) -> String {
    format!("Fehler: {reason}")
}

pub fn init_error_status(reason: impl std::fmt::Display) -> String {
    format!("Initialisierungsfehler: {reason}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeTimings {
    /// Visible time before the overlay fades.
    pub fade_after: Duration,
    /// Fade duration before the overlay is hidden.
    pub hide_after: Duration,
}

impl Default for FadeTimings {
    fn default() -> Self {
        Self {
            fade_after: Duration::from_millis(5000),
            hide_after: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub created_at: Instant,
    pub visibility: Visibility,
}

type CurrentMessage = Arc<Mutex<Option<StatusMessage>>>;

/// Single-message overlay. A new message replaces the old one and restarts
/// the fade schedule.
pub struct StatusChannel {
    host: Arc<dyn SurfaceHost>,
    overlay: SurfaceRef,
    timings: FadeTimings,
    session: CancellationToken,
    fade: Mutex<Option<CancellationToken>>,
    current: CurrentMessage,
}

impl StatusChannel {
    /// Fade timers are children of `session` and die with it.
    pub fn new(
        host: Arc<dyn SurfaceHost>,
        overlay: SurfaceRef,
        timings: FadeTimings,
        session: CancellationToken,
    ) -> Self {
        Self {
            host,
            overlay,
            timings,
            session,
            fade: Mutex::new(None),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_status(&self, text: impl Into<String>) {
        if self.session.is_cancelled() {
            return;
        }
        let text = text.into();
        info!(target: "vmdeck::status", status = %text, "status changed");

        let fade = self.session.child_token();
        if let Some(previous) = self.fade.lock().replace(fade.clone()) {
            previous.cancel();
        }

        self.host.set_text(&self.overlay, &text);
        self.host.set_visibility(&self.overlay, Visibility::Visible);
        *self.current.lock() = Some(StatusMessage {
            text,
            created_at: Instant::now(),
            visibility: Visibility::Visible,
        });

        tokio::spawn(fade_out(
            self.host.clone(),
            self.overlay.clone(),
            self.timings,
            self.current.clone(),
            fade,
        ));
    }

    /// Stops any pending fade; the current text stays as it is.
    pub fn cancel_pending(&self) {
        if let Some(fade) = self.fade.lock().take() {
            fade.cancel();
        }
    }

    pub fn current(&self) -> Option<StatusMessage> {
        self.current.lock().clone()
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

async fn fade_out(
    host: Arc<dyn SurfaceHost>,
    overlay: SurfaceRef,
    timings: FadeTimings,
    current: CurrentMessage,
    token: CancellationToken,
) {
    let stages = [
        (timings.fade_after, Visibility::Faded),
        (timings.hide_after, Visibility::Hidden),
    ];
    for (delay, visibility) in stages {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        if token.is_cancelled() {
            return;
        }
        debug!(target: "vmdeck::status", ?visibility, "status overlay fading");
        host.set_visibility(&overlay, visibility);
        if let Some(message) = current.lock().as_mut() {
            message.visibility = visibility;
        }
    }
}
