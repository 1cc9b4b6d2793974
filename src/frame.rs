//! §6 "FrameSender interface": the transport boundary. The core never talks
//! to a socket directly — it hands finished wire text (or, reserved,
//! binary) to whatever implements this trait.

use log::{debug, warn};
use std::sync::{Arc, Mutex};

/// `sendText`/`sendBinary` from §6. `true` means the transport accepted the
/// frame for delivery, not that the remote peer received it — `false` is
/// reported by callers but is explicitly non-fatal (§9 open question: a
/// dead socket failing to carry an unsubscribe-on-close frame is fine).
pub trait FrameSender: Send + Sync {
    fn send_text(&self, text: String) -> bool;

    /// Reserved: WAMP v1 as implemented here is JSON-only (§6).
    fn send_binary(&self, _bytes: Vec<u8>) -> bool {
        false
    }
}

/// An in-memory sender used by tests and by anything driving two
/// `WampConnection`s in the same process without a real socket. Frames are
/// collected in order; nothing is dropped.
#[derive(Clone, Default)]
pub struct ChannelFrameSender {
    sent: Arc<Mutex<Vec<String>>>,
}

impl ChannelFrameSender {
    pub fn new() -> ChannelFrameSender {
        ChannelFrameSender::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl FrameSender for ChannelFrameSender {
    fn send_text(&self, text: String) -> bool {
        self.sent.lock().unwrap().push(text);
        true
    }
}

/// The production sender, backed by a live `parity_ws` connection. Just
/// calls `.send()` on the injected `Sender` rather than reaching into
/// frame encoding itself.
pub struct WsFrameSender {
    sender: parity_ws::Sender,
}

impl WsFrameSender {
    pub fn new(sender: parity_ws::Sender) -> WsFrameSender {
        WsFrameSender { sender }
    }
}

impl FrameSender for WsFrameSender {
    fn send_text(&self, text: String) -> bool {
        match self.sender.send(parity_ws::Message::Text(text)) {
            Ok(()) => true,
            Err(e) => {
                warn!("send_text failed: {}", e);
                false
            }
        }
    }

    fn send_binary(&self, bytes: Vec<u8>) -> bool {
        match self.sender.send(parity_ws::Message::Binary(bytes)) {
            Ok(()) => true,
            Err(e) => {
                debug!("send_binary failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_sender_records_frames_in_order() {
        let sender = ChannelFrameSender::new();
        sender.send_text("a".to_string());
        sender.send_text("b".to_string());
        assert_eq!(sender.sent(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn take_drains_and_resets() {
        let sender = ChannelFrameSender::new();
        sender.send_text("a".to_string());
        assert_eq!(sender.take(), vec!["a".to_string()]);
        assert!(sender.sent().is_empty());
    }
}
