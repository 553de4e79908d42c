//! Remote display session manager.
//!
//! [`SessionController`] owns one transport session per mount-epoch. Transport
//! callbacks are routed to the [`strategy`] resolver, which picks how the agent
//! attaches to the display; the [`binder`] then polls once per frame until the
//! display is bound. Everything a session spawns hangs off its cancellation
//! token, so teardown stops all of it at once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::transport::{Credential, DisplayTransport, Endpoint};

pub mod agent;
pub mod binder;
pub mod controller;
pub mod error;
pub mod keyboard;
pub mod schedule;
pub mod status;
pub mod strategy;
pub mod surface;

pub use binder::AttachmentState;
pub use controller::{SessionController, SessionHandle};
pub use error::ConsoleError;
pub use keyboard::{Key, KeyDisposition, KeyEvent};

/// The transport handle of the current session, if any.
pub type TransportSlot = Arc<Mutex<Option<Arc<dyn DisplayTransport>>>>;

/// Mount parameters of a session; a change starts a new mount-epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub credential: Option<Credential>,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub frame_interval: Duration,
    pub fade: status::FadeTimings,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            fade: status::FadeTimings::default(),
        }
    }
}
