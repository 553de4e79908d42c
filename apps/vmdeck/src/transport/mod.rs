use std::fmt;
use std::net::Ipv6Addr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::console::agent::Agent;

pub mod mock;
pub mod websocket;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
    #[error("transport construction failed: {0}")]
    Construct(String),
    #[error("transport already stopped")]
    Stopped,
    #[error("transport stop failed: {0}")]
    Stop(String),
}

/// Address of the remote display's websocket proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `ws://host:port`, with IPv6 literals bracketed.
    pub fn uri(&self) -> String {
        let host = self.host.trim();
        if host.parse::<Ipv6Addr>().is_ok() {
            format!("ws://[{host}]:{}", self.port)
        } else {
            format!("ws://{host}:{}", self.port)
        }
    }

    pub fn to_url(&self) -> Result<Url, TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidEndpoint("host is empty".into()));
        }
        let uri = self.uri();
        Url::parse(&uri).map_err(|err| TransportError::InvalidEndpoint(format!("{uri}: {err}")))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Password for the display session. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Key combinations the console can inject into the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    CtrlAltDelete,
}

impl Hotkey {
    /// XT scancodes: every press in order, then every release in reverse.
    pub fn scancodes(self) -> Vec<u16> {
        let presses: &[u16] = match self {
            Hotkey::CtrlAltDelete => &[0x1d, 0x38, 0xe053],
        };
        let mut codes = presses.to_vec();
        codes.extend(presses.iter().rev().map(|code| code | 0x80));
        codes
    }
}

/// Why the transport reported a failure (the `onerror` event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeFailure {
    pub kind: String,
    pub reason: Option<String>,
}

impl HandshakeFailure {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({reason})", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

/// Callbacks a transport delivers for one session.
#[derive(Debug)]
pub enum TransportEvent {
    Error(HandshakeFailure),
    Success,
    Agent(Agent),
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

pub struct TransportOptions {
    pub endpoint: Endpoint,
    /// Id of the display surface the transport renders into.
    pub screen_id: String,
    pub credential: Option<Credential>,
    pub events: EventSender,
}

/// A live connection to the remote display.
pub trait DisplayTransport: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Disconnects without waiting for the remote close handshake.
    fn stop(&self) -> Result<(), TransportError>;

    fn send_hotkey(&self, hotkey: Hotkey) -> Result<(), TransportError>;
}

/// Constructs transports; construction itself never waits on the network.
pub trait TransportConnector: Send + Sync {
    fn connect(
        &self,
        options: TransportOptions,
    ) -> Result<Arc<dyn DisplayTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn endpoint_uri_uses_websocket_scheme() {
        let endpoint = Endpoint::new("10.0.0.5", 5900);
        assert_eq!(endpoint.uri(), "ws://10.0.0.5:5900");
        assert_eq!(endpoint.to_url().unwrap().as_str(), "ws://10.0.0.5:5900/");
    }

    #[test_timeout::timeout]
    fn endpoint_brackets_ipv6_hosts() {
        let endpoint = Endpoint::new("fe80::1", 5959);
        assert_eq!(endpoint.uri(), "ws://[fe80::1]:5959");
        assert!(endpoint.to_url().is_ok());
    }

    #[test_timeout::timeout]
    fn endpoint_rejects_empty_host() {
        let err = Endpoint::new("  ", 5900).to_url().unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
    }

    #[test_timeout::timeout]
    fn credential_debug_is_redacted() {
        let secret = Credential::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test_timeout::timeout]
    fn ctrl_alt_delete_releases_in_reverse() {
        assert_eq!(
            Hotkey::CtrlAltDelete.scancodes(),
            vec![0x1d, 0x38, 0xe053, 0xe0d3, 0xb8, 0x9d]
        );
    }

    #[test_timeout::timeout]
    fn handshake_failure_display_includes_reason() {
        let failure = HandshakeFailure::new("disconnect").with_reason("peer closed");
        assert_eq!(failure.to_string(), "disconnect (peer closed)");
        assert_eq!(HandshakeFailure::new("error").to_string(), "error");
    }
}
