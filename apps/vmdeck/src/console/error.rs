use thiserror::Error;

use super::agent::AttachError;
use crate::transport::{HandshakeFailure, TransportError};

/// Failures of one session attempt. None of these cross back into the
/// owning view; they end up in the status overlay and the log.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("transport initialisation failed: {0}")]
    TransportInit(#[source] TransportError),
    #[error("display handshake failed: {0}")]
    Handshake(HandshakeFailure),
    #[error("agent exposes no display attach capability")]
    NoAttachCapability,
    #[error("surface '{id}' is not a live display element")]
    InvalidSurfaceType { id: String },
    #[error("display attach failed: {0}")]
    Attach(#[from] AttachError),
}
