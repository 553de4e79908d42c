use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{
    Credential, DisplayTransport, Endpoint, EventSender, HandshakeFailure, Hotkey, TransportConnector,
    TransportError, TransportEvent, TransportOptions,
};
use crate::console::agent::{Agent, MainChannel};

/// Opens the websocket link to a display proxy.
///
/// The link reports `Success` once the socket is open and then hands out an
/// agent with a bare main channel; the display protocol carried over the
/// socket is not interpreted here. A display password travels on the upgrade
/// request as [`PASSWORD_HEADER`].
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

pub const PASSWORD_HEADER: &str = "x-spice-password";

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl TransportConnector for WebSocketConnector {
    fn connect(
        &self,
        options: TransportOptions,
    ) -> Result<Arc<dyn DisplayTransport>, TransportError> {
        let url = options.endpoint.to_url()?;
        let request = link_request(&url, options.credential.as_ref())?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Construct(format!("no async runtime: {err}")))?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        debug!(
            target: "vmdeck::transport",
            uri = %url,
            screen_id = %options.screen_id,
            credential = options.credential.is_some(),
            "starting websocket link"
        );
        let task = runtime.spawn(run_link(url, request, options.events, outbound_rx));
        Ok(Arc::new(WebSocketTransport {
            endpoint: options.endpoint,
            outbound: outbound_tx,
            task: Mutex::new(Some(task)),
        }))
    }
}

pub struct WebSocketTransport {
    endpoint: Endpoint,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DisplayTransport for WebSocketTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn stop(&self) -> Result<(), TransportError> {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!(target: "vmdeck::transport", uri = %self.endpoint, "websocket link stopped");
        }
        Ok(())
    }

    fn send_hotkey(&self, hotkey: Hotkey) -> Result<(), TransportError> {
        if self.task.lock().is_none() {
            return Err(TransportError::Stopped);
        }
        self.outbound
            .send(encode_scancodes(&hotkey.scancodes()))
            .map_err(|_| TransportError::Stopped)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

fn link_request(url: &Url, credential: Option<&Credential>) -> Result<Request, TransportError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|err| TransportError::Construct(format!("invalid upgrade request: {err}")))?;
    if let Some(credential) = credential {
        let mut value = HeaderValue::from_str(credential.expose()).map_err(|_| {
            TransportError::Construct("display password is not a valid header value".into())
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(PASSWORD_HEADER, value);
    }
    Ok(request)
}

fn encode_scancodes(codes: &[u16]) -> Vec<u8> {
    codes.iter().flat_map(|code| code.to_be_bytes()).collect()
}

async fn run_link(
    url: Url,
    request: Request,
    events: EventSender,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let stream = match connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            warn!(target: "vmdeck::transport", uri = %url, error = %err, "websocket connect failed");
            let _ = events.send(TransportEvent::Error(
                HandshakeFailure::new("error").with_reason(err.to_string()),
            ));
            return;
        }
    };
    info!(target: "vmdeck::transport", uri = %url, "websocket link open");
    let _ = events.send(TransportEvent::Success);
    let _ = events.send(TransportEvent::Agent(
        Agent::new().with_main(Arc::new(MainChannel::new())),
    ));

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(err) = sink.send(Message::Binary(frame)).await {
                    let _ = events.send(TransportEvent::Error(
                        HandshakeFailure::new("error").with_reason(err.to_string()),
                    ));
                    return;
                }
            }
            message = source.next() => match message {
                Some(Ok(Message::Close(frame))) => {
                    let mut failure = HandshakeFailure::new("disconnect");
                    if let Some(frame) = frame.filter(|f| !f.reason.is_empty()) {
                        failure = failure.with_reason(frame.reason.to_string());
                    }
                    let _ = events.send(TransportEvent::Error(failure));
                    return;
                }
                None => {
                    let _ = events.send(TransportEvent::Error(HandshakeFailure::new("disconnect")));
                    return;
                }
                Some(Err(err)) => {
                    let _ = events.send(TransportEvent::Error(
                        HandshakeFailure::new("error").with_reason(err.to_string()),
                    ));
                    return;
                }
                Some(Ok(message)) => {
                    trace!(target: "vmdeck::transport", bytes = message.len(), "display payload");
                }
            }
        }
    }
    let _ = sink.close().await;
}
