use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::surface::SurfaceRef;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct AttachError(pub String);

/// The `connect_display` capability: binds the agent to a rendering surface.
pub trait SurfaceConnector: Send + Sync {
    fn connect_display(&self, surface: &SurfaceRef) -> Result<bool, AttachError>;
}

/// The agent's main channel. It may carry its own attach capability and
/// always has a raw display slot.
#[derive(Default)]
pub struct MainChannel {
    connector: Option<Arc<dyn SurfaceConnector>>,
    display: Mutex<Option<SurfaceRef>>,
}

impl MainChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connector(connector: Arc<dyn SurfaceConnector>) -> Self {
        Self {
            connector: Some(connector),
            display: Mutex::new(None),
        }
    }

    pub fn connector(&self) -> Option<&Arc<dyn SurfaceConnector>> {
        self.connector.as_ref()
    }

    pub fn display(&self) -> Option<SurfaceRef> {
        self.display.lock().clone()
    }

    pub fn assign_display(&self, surface: SurfaceRef) {
        *self.display.lock() = Some(surface);
    }
}

impl fmt::Debug for MainChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainChannel")
            .field("connect_display", &self.connector.is_some())
            .field("display", &self.display.lock().as_ref().map(|s| s.id().to_owned()))
            .finish()
    }
}

/// Capability object handed out by the transport after a successful handshake.
#[derive(Clone, Default)]
pub struct Agent {
    connector: Option<Arc<dyn SurfaceConnector>>,
    main: Option<Arc<MainChannel>>,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connector(mut self, connector: Arc<dyn SurfaceConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_main(mut self, main: Arc<MainChannel>) -> Self {
        self.main = Some(main);
        self
    }

    pub fn connector(&self) -> Option<&Arc<dyn SurfaceConnector>> {
        self.connector.as_ref()
    }

    pub fn main(&self) -> Option<&Arc<MainChannel>> {
        self.main.as_ref()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("connect_display", &self.connector.is_some())
            .field("main", &self.main)
            .finish()
    }
}
