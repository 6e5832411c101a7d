// Presentation callbacks

use super::types::ExpiryReason;
use chrono::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Hooks invoked at warning and expiry transitions
pub trait SessionObserver: Send + Sync {
    fn on_session_expired(&self, _reason: ExpiryReason) {}

    fn on_warning(&self, _remaining: Duration) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Event forwarded by [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Warning { remaining: Duration },
    Expired { reason: ExpiryReason },
}

/// Observer forwarding events over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_session_expired(&self, reason: ExpiryReason) {
        self.send(SessionEvent::Expired { reason });
    }

    fn on_warning(&self, remaining: Duration) {
        self.send(SessionEvent::Warning { remaining });
    }
}
