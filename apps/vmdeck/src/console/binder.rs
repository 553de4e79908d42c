use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::TransportSlot;
use super::error::ConsoleError;
use super::schedule::{FrameClock, repeat_until};
use super::status::{STATUS_CONNECTION_ERROR, StatusChannel};
use super::strategy::AttachStrategy;
use super::surface::{Readiness, SurfaceHost, SurfaceKind, SurfaceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Unbound,
    Bound,
    /// Session torn down; terminal.
    Cancelled,
}

/// Shared view of one binder's attachment state.
#[derive(Debug, Clone)]
pub struct AttachmentWatch(Arc<Mutex<AttachmentState>>);

impl AttachmentWatch {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(AttachmentState::Unbound)))
    }

    pub fn get(&self) -> AttachmentState {
        *self.0.lock()
    }

    fn set(&self, state: AttachmentState) {
        *self.0.lock() = state;
    }

    pub(crate) fn cancel(&self) {
        self.set(AttachmentState::Cancelled);
    }
}

enum FrameOutcome {
    Bound,
    Failed(ConsoleError),
}

/// Attaches one agent to the display surface on the first frame the surface
/// is ready, then stops.
pub struct SurfaceBinder {
    strategy: AttachStrategy,
    host: Arc<dyn SurfaceHost>,
    display: SurfaceRef,
    status: Arc<StatusChannel>,
    transport: TransportSlot,
    state: AttachmentWatch,
}

impl SurfaceBinder {
    pub fn new(
        strategy: AttachStrategy,
        host: Arc<dyn SurfaceHost>,
        display: SurfaceRef,
        status: Arc<StatusChannel>,
        transport: TransportSlot,
    ) -> Self {
        Self {
            strategy,
            host,
            display,
            status,
            transport,
            state: AttachmentWatch::new(),
        }
    }

    pub fn watch(&self) -> AttachmentWatch {
        self.state.clone()
    }

    pub async fn run(self, clock: Arc<dyn FrameClock>, token: CancellationToken) -> AttachmentState {
        let outcome = repeat_until(clock.as_ref(), &token, || self.poll_frame()).await;
        match outcome {
            None => {
                trace!(target: "vmdeck::binder", "binder cancelled");
                self.state.set(AttachmentState::Cancelled);
            }
            Some(FrameOutcome::Bound) => {}
            Some(FrameOutcome::Failed(err)) => {
                error!(
                    target: "vmdeck::binder",
                    surface = self.display.id(),
                    strategy = ?self.strategy.kind(),
                    error = %err,
                    "display binding failed"
                );
                self.status.set_status(STATUS_CONNECTION_ERROR);
            }
        }
        self.state.get()
    }

    fn poll_frame(&self) -> ControlFlow<FrameOutcome> {
        if self.state.get() != AttachmentState::Unbound {
            return ControlFlow::Break(FrameOutcome::Bound);
        }
        if self.transport.lock().is_none() {
            trace!(target: "vmdeck::binder", "transport handle not stored yet");
            return ControlFlow::Continue(());
        }
        if self.display.kind() != SurfaceKind::Display {
            return ControlFlow::Break(FrameOutcome::Failed(self.invalid_surface()));
        }
        match self.host.readiness(&self.display) {
            Readiness::Pending => return ControlFlow::Continue(()),
            Readiness::Gone => return ControlFlow::Break(FrameOutcome::Failed(self.invalid_surface())),
            Readiness::Ready => {}
        }

        match self.strategy.attach(&self.display) {
            Ok(accepted) => {
                if !accepted {
                    warn!(
                        target: "vmdeck::binder",
                        strategy = ?self.strategy.kind(),
                        "agent declined the display surface"
                    );
                }
                self.state.set(AttachmentState::Bound);
                self.host.fit_canvas(&self.display);
                info!(target: "vmdeck::binder", strategy = ?self.strategy.kind(), "display bound");
                ControlFlow::Break(FrameOutcome::Bound)
            }
            Err(err) => {
                debug!(target: "vmdeck::binder", error = %err, "attach raised");
                ControlFlow::Break(FrameOutcome::Failed(err.into()))
            }
        }
    }

    fn invalid_surface(&self) -> ConsoleError {
        ConsoleError::InvalidSurfaceType {
            id: self.display.id().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::agent::{Agent, AttachError, MainChannel, SurfaceConnector};
    use crate::console::schedule::ManualClock;
    use crate::console::status::FadeTimings;
    use crate::console::surface::{
        DISPLAY_SURFACE_ID, HeadlessHost, OVERLAY_SURFACE_ID,
    };
    use crate::transport::mock::MockConnector;
    use crate::transport::{Endpoint, TransportConnector, TransportOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SurfaceConnector for Counting {
        fn connect_display(&self, _surface: &SurfaceRef) -> Result<bool, AttachError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AttachError("display channel closed".into()))
            } else {
                Ok(true)
            }
        }
    }

    struct Fixture {
        host: Arc<HeadlessHost>,
        display: SurfaceRef,
        status: Arc<StatusChannel>,
        slot: TransportSlot,
        token: CancellationToken,
    }

    fn fixture(host: HeadlessHost) -> Fixture {
        let host = Arc::new(host);
        let token = CancellationToken::new();
        let overlay = host.create(OVERLAY_SURFACE_ID, SurfaceKind::Overlay);
        let display = host.create(DISPLAY_SURFACE_ID, SurfaceKind::Display);
        let status = Arc::new(StatusChannel::new(
            host.clone(),
            overlay,
            FadeTimings::default(),
            token.clone(),
        ));
        let (events, _rx) = mpsc::unbounded_channel();
        let transport = MockConnector::new()
            .connect(TransportOptions {
                endpoint: Endpoint::new("10.0.0.5", 5900),
                screen_id: DISPLAY_SURFACE_ID.into(),
                credential: None,
                events,
            })
            .unwrap();
        Fixture {
            host,
            display,
            status,
            slot: Arc::new(Mutex::new(Some(transport))),
            token,
        }
    }

    fn binder(fx: &Fixture, strategy: AttachStrategy) -> SurfaceBinder {
        SurfaceBinder::new(
            strategy,
            fx.host.clone(),
            fx.display.clone(),
            fx.status.clone(),
            fx.slot.clone(),
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn binds_exactly_once() {
        let fx = fixture(HeadlessHost::new());
        let connector = Arc::new(Counting::default());
        let binder = binder(&fx, AttachStrategy::Direct(connector.clone()));
        let watch = binder.watch();
        let (clock, trigger) = ManualClock::new();
        let task = tokio::spawn(binder.run(Arc::new(clock), fx.token.clone()));

        for _ in 0..3 {
            trigger.frame();
        }
        assert_eq!(task.await.unwrap(), AttachmentState::Bound);
        assert_eq!(watch.get(), AttachmentState::Bound);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert!(fx.host.element(DISPLAY_SURFACE_ID).unwrap().canvas_fitted);
    }

    #[test_timeout::tokio_timeout_test]
    async fn waits_for_layout_before_attaching() {
        let fx = fixture(HeadlessHost::with_deferred_layout());
        let main = Arc::new(MainChannel::new());
        let strategy = AttachStrategy::resolve(&Agent::new().with_main(main.clone()));
        let binder = binder(&fx, strategy);
        let watch = binder.watch();
        let (clock, trigger) = ManualClock::new();
        let task = tokio::spawn(binder.run(Arc::new(clock), fx.token.clone()));

        trigger.frame();
        trigger.frame();
        settle().await;
        assert_eq!(watch.get(), AttachmentState::Unbound);
        assert!(main.display().is_none());

        fx.host.complete_layout(DISPLAY_SURFACE_ID);
        trigger.frame();
        assert_eq!(task.await.unwrap(), AttachmentState::Bound);
        assert_eq!(main.display(), Some(fx.display.clone()));
    }

    #[test_timeout::tokio_timeout_test]
    async fn removed_surface_is_fatal() {
        let fx = fixture(HeadlessHost::new());
        let connector = Arc::new(Counting::default());
        let binder = binder(&fx, AttachStrategy::Direct(connector.clone()));
        let (clock, trigger) = ManualClock::new();
        fx.host.remove(&fx.display);

        let task = tokio::spawn(binder.run(Arc::new(clock), fx.token.clone()));
        trigger.frame();
        trigger.frame();

        assert_eq!(task.await.unwrap(), AttachmentState::Unbound);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.status.current().unwrap().text, STATUS_CONNECTION_ERROR);
    }

    #[test_timeout::tokio_timeout_test]
    async fn non_display_surface_is_fatal() {
        let mut fx = fixture(HeadlessHost::new());
        fx.display = fx.host.create(OVERLAY_SURFACE_ID, SurfaceKind::Overlay);
        let connector = Arc::new(Counting::default());
        let binder = binder(&fx, AttachStrategy::Direct(connector.clone()));
        let watch = binder.watch();
        let (clock, trigger) = ManualClock::new();
        let task = tokio::spawn(binder.run(Arc::new(clock), fx.token.clone()));

        trigger.frame();
        trigger.frame();

        assert_eq!(task.await.unwrap(), AttachmentState::Unbound);
        assert_eq!(watch.get(), AttachmentState::Unbound);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        assert!(!fx.host.element(OVERLAY_SURFACE_ID).unwrap().canvas_fitted);
        assert_eq!(fx.status.current().unwrap().text, STATUS_CONNECTION_ERROR);
    }

    #[test_timeout::tokio_timeout_test]
    async fn attach_error_ends_the_frame_chain() {
        let fx = fixture(HeadlessHost::new());
        let connector = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let binder = binder(&fx, AttachStrategy::Nested(connector.clone()));
        let (clock, trigger) = ManualClock::new();
        let task = tokio::spawn(binder.run(Arc::new(clock), fx.token.clone()));

        for _ in 0..3 {
            trigger.frame();
        }
        assert_eq!(task.await.unwrap(), AttachmentState::Unbound);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.status.current().unwrap().text, STATUS_CONNECTION_ERROR);
    }

    #[test_timeout::tokio_timeout_test]
    async fn waits_for_transport_handle() {
        let fx = fixture(HeadlessHost::new());
        let stored = fx.slot.lock().take();
        let connector = Arc::new(Counting::default());
        let binder = binder(&fx, AttachStrategy::Direct(connector.clone()));
        let (clock, trigger) = ManualClock::new();
        let task = tokio::spawn(binder.run(Arc::new(clock), fx.token.clone()));

        trigger.frame();
        settle().await;
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);

        *fx.slot.lock() = stored;
        trigger.frame();
        assert_eq!(task.await.unwrap(), AttachmentState::Bound);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[test_timeout::tokio_timeout_test]
    async fn cancellation_is_observed_before_the_next_frame() {
        let fx = fixture(HeadlessHost::with_deferred_layout());
        let connector = Arc::new(Counting::default());
        let binder = binder(&fx, AttachStrategy::Direct(connector.clone()));
        let (clock, trigger) = ManualClock::new();
        let task = tokio::spawn(binder.run(Arc::new(clock), fx.token.clone()));

        trigger.frame();
        settle().await;
        fx.token.cancel();
        fx.host.complete_layout(DISPLAY_SURFACE_ID);
        trigger.frame();

        assert_eq!(task.await.unwrap(), AttachmentState::Cancelled);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }
}
