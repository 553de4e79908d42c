use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{
    Credential, DisplayTransport, Endpoint, EventSender, HandshakeFailure, Hotkey,
    TransportConnector, TransportError, TransportEvent, TransportOptions,
};
use crate::console::agent::Agent;

#[derive(Debug, Default)]
struct Registry {
    connects: usize,
    live: usize,
    max_live: usize,
    fail_next: Option<String>,
}

/// Scripted connector: records every transport it builds and lets the test
/// drive their callbacks.
#[derive(Clone, Default)]
pub struct MockConnector {
    registry: Arc<Mutex<Registry>>,
    transports: Arc<Mutex<Vec<Arc<MockTransport>>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `connect` fails with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.registry.lock().fail_next = Some(reason.into());
    }

    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.transports.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<MockTransport>> {
        self.transports.lock().last().cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.registry.lock().connects
    }

    /// Transports constructed and not yet stopped.
    pub fn live_count(&self) -> usize {
        self.registry.lock().live
    }

    /// Highest number of simultaneously live transports ever observed.
    pub fn max_live(&self) -> usize {
        self.registry.lock().max_live
    }
}

impl TransportConnector for MockConnector {
    fn connect(
        &self,
        options: TransportOptions,
    ) -> Result<Arc<dyn DisplayTransport>, TransportError> {
        let mut registry = self.registry.lock();
        registry.connects += 1;
        if let Some(reason) = registry.fail_next.take() {
            return Err(TransportError::Construct(reason));
        }
        options.endpoint.to_url()?;
        registry.live += 1;
        registry.max_live = registry.max_live.max(registry.live);
        drop(registry);

        let transport = Arc::new(MockTransport {
            endpoint: options.endpoint,
            screen_id: options.screen_id,
            credential: options.credential,
            events: options.events,
            registry: self.registry.clone(),
            stopped: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
            fail_stop: AtomicBool::new(false),
            hotkeys: Mutex::new(Vec::new()),
        });
        self.transports.lock().push(transport.clone());
        Ok(transport)
    }
}

pub struct MockTransport {
    endpoint: Endpoint,
    screen_id: String,
    credential: Option<Credential>,
    events: EventSender,
    registry: Arc<Mutex<Registry>>,
    stopped: AtomicBool,
    stop_calls: AtomicUsize,
    fail_stop: AtomicBool,
    hotkeys: Mutex<Vec<Hotkey>>,
}

impl MockTransport {
    /// Returns false once the session stopped listening.
    pub fn emit_success(&self) -> bool {
        self.events.send(TransportEvent::Success).is_ok()
    }

    pub fn emit_error(&self, kind: &str) -> bool {
        self.events
            .send(TransportEvent::Error(HandshakeFailure::new(kind)))
            .is_ok()
    }

    pub fn emit_agent(&self, agent: Agent) -> bool {
        self.events.send(TransportEvent::Agent(agent)).is_ok()
    }

    /// Makes every following `stop` report an error (after stopping).
    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn hotkeys(&self) -> Vec<Hotkey> {
        self.hotkeys.lock().clone()
    }

    pub fn screen_id(&self) -> &str {
        &self.screen_id
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

impl DisplayTransport for MockTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn stop(&self) -> Result<(), TransportError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.registry.lock().live -= 1;
        }
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(TransportError::Stop("mock close handshake failed".into()));
        }
        Ok(())
    }

    fn send_hotkey(&self, hotkey: Hotkey) -> Result<(), TransportError> {
        if self.is_stopped() {
            return Err(TransportError::Stopped);
        }
        self.hotkeys.lock().push(hotkey);
        Ok(())
    }
}
