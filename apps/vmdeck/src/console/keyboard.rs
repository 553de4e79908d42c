use tracing::{debug, warn};

use super::TransportSlot;
use crate::transport::Hotkey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Delete,
    Char(char),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            alt: false,
            shift: false,
        }
    }

    pub fn ctrl_alt(key: Key) -> Self {
        Self {
            ctrl: true,
            alt: true,
            ..Self::new(key)
        }
    }

    /// The console shortcut that maps to a guest hotkey, if any.
    pub fn hotkey(&self) -> Option<Hotkey> {
        (self.ctrl && self.alt && self.key == Key::Delete).then_some(Hotkey::CtrlAltDelete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// Sent to the guest; the caller should swallow the key.
    Forwarded,
    PassThrough,
}

/// Cloneable hotkey entry point for controls outside the controller.
/// Every call goes through the current session's transport handle.
#[derive(Clone)]
pub struct HotkeyForwarder {
    transport: TransportSlot,
}

impl HotkeyForwarder {
    pub(crate) fn new(transport: TransportSlot) -> Self {
        Self { transport }
    }

    /// Returns false when no session is open or the transport refused.
    pub fn send(&self, hotkey: Hotkey) -> bool {
        let current = self.transport.lock().clone();
        let Some(transport) = current else {
            debug!(target: "vmdeck::keyboard", ?hotkey, "no display session; hotkey ignored");
            return false;
        };
        match transport.send_hotkey(hotkey) {
            Ok(()) => {
                debug!(target: "vmdeck::keyboard", ?hotkey, endpoint = %transport.endpoint(), "hotkey forwarded");
                true
            }
            Err(err) => {
                warn!(target: "vmdeck::keyboard", ?hotkey, error = %err, "hotkey injection failed");
                false
            }
        }
    }

    pub fn send_ctrl_alt_delete(&self) -> bool {
        self.send(Hotkey::CtrlAltDelete)
    }

    pub fn handle_key(&self, event: &KeyEvent) -> KeyDisposition {
        if self.transport.lock().is_none() {
            return KeyDisposition::PassThrough;
        }
        match event.hotkey() {
            Some(hotkey) => {
                self.send(hotkey);
                KeyDisposition::Forwarded
            }
            None => KeyDisposition::PassThrough,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use parking_lot::Mutex;

    #[test_timeout::timeout]
    fn only_ctrl_alt_delete_maps_to_a_hotkey() {
        assert_eq!(KeyEvent::ctrl_alt(Key::Delete).hotkey(), Some(Hotkey::CtrlAltDelete));
        assert_eq!(KeyEvent::new(Key::Delete).hotkey(), None);
        assert_eq!(KeyEvent::ctrl_alt(Key::Char('d')).hotkey(), None);
        let ctrl_only = KeyEvent {
            ctrl: true,
            ..KeyEvent::new(Key::Delete)
        };
        assert_eq!(ctrl_only.hotkey(), None);
    }

    #[test_timeout::timeout]
    fn forwarder_without_session_is_a_no_op() {
        let forwarder = HotkeyForwarder::new(Arc::new(Mutex::new(None)));
        assert!(!forwarder.send_ctrl_alt_delete());
        assert_eq!(
            forwarder.handle_key(&KeyEvent::ctrl_alt(Key::Delete)),
            KeyDisposition::PassThrough
        );
    }
}
