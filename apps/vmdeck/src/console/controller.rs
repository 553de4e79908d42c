use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::agent::Agent;
use super::binder::{AttachmentState, AttachmentWatch, SurfaceBinder};
use super::error::ConsoleError;
use super::keyboard::{HotkeyForwarder, KeyDisposition, KeyEvent};
use super::schedule::{FrameClock, IntervalClock};
use super::status::{
    STATUS_AGENT_ERROR, STATUS_CONNECTED, STATUS_CONNECTING, StatusChannel, StatusMessage,
    error_status, init_error_status,
};
use super::strategy::AttachStrategy;
use super::surface::{SessionSurfaces, SurfaceHost, SurfaceRef};
use super::{ConnectionParams, SessionTimings, TransportSlot};
use crate::transport::{
    DisplayTransport, Endpoint, EventReceiver, TransportConnector, TransportEvent, TransportOptions,
};

/// What `open_session` hands back: the transport of one mount-epoch.
#[derive(Clone)]
pub struct SessionHandle {
    epoch: u64,
    endpoint: Endpoint,
    transport: Arc<dyn DisplayTransport>,
}

impl SessionHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &Arc<dyn DisplayTransport> {
        &self.transport
    }
}

struct ActiveBinding {
    token: CancellationToken,
    watch: AttachmentWatch,
    task: JoinHandle<AttachmentState>,
}

impl ActiveBinding {
    fn cancel(self) {
        self.token.cancel();
        self.task.abort();
        self.watch.cancel();
    }
}

type BindingSlot = Arc<Mutex<Option<ActiveBinding>>>;

struct LiveSession {
    epoch: u64,
    token: CancellationToken,
    surfaces: SessionSurfaces,
    status: Arc<StatusChannel>,
    binding: BindingSlot,
    pump: Option<JoinHandle<()>>,
    transport: Option<Arc<dyn DisplayTransport>>,
}

/// Owns at most one display session and tears it down before the next.
///
/// Must be driven from inside a tokio runtime: sessions spawn their event
/// pump, binder and status timers as tasks.
pub struct SessionController {
    connector: Arc<dyn TransportConnector>,
    host: Arc<dyn SurfaceHost>,
    clock: Arc<dyn FrameClock>,
    timings: SessionTimings,
    transport: TransportSlot,
    params: Option<ConnectionParams>,
    epoch: u64,
    live: Option<LiveSession>,
}

impl SessionController {
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        host: Arc<dyn SurfaceHost>,
        timings: SessionTimings,
    ) -> Self {
        Self {
            connector,
            host,
            clock: Arc::new(IntervalClock::new(timings.frame_interval)),
            timings,
            transport: Arc::new(Mutex::new(None)),
            params: None,
            epoch: 0,
            live: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn FrameClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mounts `params`. Unchanged parameters keep the current session; any
    /// change closes it completely before the new one opens.
    pub fn apply_params(&mut self, params: ConnectionParams) -> Result<(), ConsoleError> {
        if self.live.is_some() && self.params.as_ref() == Some(&params) {
            debug!(target: "vmdeck::session", epoch = self.epoch, "connection parameters unchanged");
            return Ok(());
        }
        self.close_session();
        self.params = Some(params.clone());
        self.open_session(&params).map(|_| ())
    }

    /// Closes and reopens the session for the current parameters.
    pub fn remount(&mut self) -> Result<(), ConsoleError> {
        self.close_session();
        match self.params.clone() {
            Some(params) => self.open_session(&params).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn open_session(&mut self, params: &ConnectionParams) -> Result<SessionHandle, ConsoleError> {
        if self.live.is_some() {
            self.close_session();
        }
        self.epoch += 1;
        let epoch = self.epoch;
        let endpoint = params.endpoint();
        info!(
            target: "vmdeck::session",
            epoch,
            uri = %endpoint,
            credential = params.credential.is_some(),
            "opening display session"
        );

        let token = CancellationToken::new();
        let surfaces = SessionSurfaces::acquire(self.host.clone());
        let status = Arc::new(StatusChannel::new(
            self.host.clone(),
            surfaces.overlay().clone(),
            self.timings.fade,
            token.clone(),
        ));
        status.set_status(STATUS_CONNECTING);

        let (events, rx) = mpsc::unbounded_channel();
        let options = TransportOptions {
            endpoint: endpoint.clone(),
            screen_id: surfaces.display().id().to_owned(),
            credential: params.credential.clone(),
            events,
        };
        let mut live = LiveSession {
            epoch,
            token: token.clone(),
            surfaces,
            status: status.clone(),
            binding: Arc::new(Mutex::new(None)),
            pump: None,
            transport: None,
        };

        let transport = match self.connector.connect(options) {
            Ok(transport) => transport,
            Err(err) => {
                error!(target: "vmdeck::session", epoch, uri = %endpoint, error = %err, "transport construction failed");
                status.set_status(init_error_status(&err));
                // Keep the surfaces so the error stays visible until teardown.
                self.live = Some(live);
                return Err(ConsoleError::TransportInit(err));
            }
        };
        *self.transport.lock() = Some(transport.clone());
        live.transport = Some(transport.clone());

        let pump = EventPump {
            epoch,
            host: self.host.clone(),
            display: live.surfaces.display().clone(),
            status,
            binding: live.binding.clone(),
            transport: self.transport.clone(),
            clock: self.clock.clone(),
            token,
        };
        live.pump = Some(tokio::spawn(pump.run(rx)));
        self.live = Some(live);

        Ok(SessionHandle {
            epoch,
            endpoint,
            transport,
        })
    }

    /// Tears the current session down. Idempotent and infallible: transport
    /// errors during stop are logged.
    pub fn close_session(&mut self) {
        let Some(mut live) = self.live.take() else {
            self.transport.lock().take();
            return;
        };
        let epoch = live.epoch;
        debug!(target: "vmdeck::session", epoch, "closing display session");

        live.token.cancel();
        live.status.cancel_pending();
        if let Some(binding) = live.binding.lock().take() {
            binding.cancel();
        }
        if let Some(pump) = live.pump.take() {
            pump.abort();
        }
        if let Some(transport) = live.transport.take() {
            if let Err(err) = transport.stop() {
                warn!(
                    target: "vmdeck::session",
                    epoch,
                    uri = %transport.endpoint(),
                    error = %err,
                    "transport stop failed during teardown"
                );
            }
        }
        self.transport.lock().take();
        live.surfaces.release();
        info!(target: "vmdeck::session", epoch, "display session closed");
    }

    pub fn current_transport(&self) -> Option<Arc<dyn DisplayTransport>> {
        self.transport.lock().clone()
    }

    pub fn hotkey_forwarder(&self) -> HotkeyForwarder {
        HotkeyForwarder::new(self.transport.clone())
    }

    /// Injects Ctrl+Alt+Delete; false (and nothing else) without a session.
    pub fn send_hotkey_combo(&self) -> bool {
        self.hotkey_forwarder().send_ctrl_alt_delete()
    }

    pub fn handle_key(&self, event: &KeyEvent) -> KeyDisposition {
        self.hotkey_forwarder().handle_key(event)
    }

    pub fn is_open(&self) -> bool {
        self.live.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    pub fn status(&self) -> Option<StatusMessage> {
        self.live.as_ref().and_then(|live| live.status.current())
    }

    /// State of the active agent's binding; `None` before any agent arrived.
    pub fn attachment_state(&self) -> Option<AttachmentState> {
        let live = self.live.as_ref()?;
        let binding = live.binding.lock();
        binding.as_ref().map(|active| active.watch.get())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.close_session();
    }
}

/// Routes one session's transport callbacks. Every event is dropped once the
/// session token is cancelled.
struct EventPump {
    epoch: u64,
    host: Arc<dyn SurfaceHost>,
    display: SurfaceRef,
    status: Arc<StatusChannel>,
    binding: BindingSlot,
    transport: TransportSlot,
    clock: Arc<dyn FrameClock>,
    token: CancellationToken,
}

impl EventPump {
    async fn run(self, mut events: EventReceiver) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!(target: "vmdeck::session", epoch = self.epoch, "transport event stream closed");
                break;
            };
            if self.token.is_cancelled() {
                break;
            }
            self.handle(event);
        }
    }

    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Error(failure) => {
                error!(
                    target: "vmdeck::session",
                    epoch = self.epoch,
                    error = %ConsoleError::Handshake(failure.clone()),
                    "display transport error"
                );
                self.status.set_status(error_status(&failure));
            }
            TransportEvent::Success => {
                info!(target: "vmdeck::session", epoch = self.epoch, "display connection established");
                self.status.set_status(STATUS_CONNECTED);
                self.host.focus(&self.display);
            }
            TransportEvent::Agent(agent) => self.start_binding(&agent),
        }
    }

    fn start_binding(&self, agent: &Agent) {
        // A newer agent retires the previous one even when it cannot attach.
        if let Some(previous) = self.binding.lock().take() {
            debug!(target: "vmdeck::session", epoch = self.epoch, "new agent supersedes the active one");
            previous.cancel();
        }

        let strategy = match AttachStrategy::resolve_usable(agent) {
            Ok(strategy) => strategy,
            Err(err) => {
                error!(target: "vmdeck::session", epoch = self.epoch, error = %err, "agent rejected");
                self.status.set_status(STATUS_AGENT_ERROR);
                return;
            }
        };

        let binder = SurfaceBinder::new(
            strategy,
            self.host.clone(),
            self.display.clone(),
            self.status.clone(),
            self.transport.clone(),
        );
        let watch = binder.watch();
        let token = self.token.child_token();
        let task = tokio::spawn(binder.run(self.clock.clone(), token.clone()));
        *self.binding.lock() = Some(ActiveBinding { token, watch, task });
        self.host.focus(&self.display);
    }
}
