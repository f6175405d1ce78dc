//! Connection status of the provider session.
//!
//! Whether the session is connected is never inferred from holding a token:
//! it follows the outcome of the most recent provider call, so that a
//! present but revoked token flips it to disconnected.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Session {
    connected: watch::Sender<bool>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: watch::Sender::new(false),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn set_connected(&self, connected: bool) {
        let previous = self.connected.send_replace(connected);
        if previous != connected {
            if connected {
                info!("session connected");
            } else {
                warn!("session disconnected");
            }
        }
    }

    /// Watches connection status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let session = Session::new();
        let mut status = session.subscribe();
        assert!(!session.is_connected());

        session.set_connected(true);
        status.changed().await.unwrap();
        assert!(*status.borrow_and_update());

        session.set_connected(false);
        assert!(!session.is_connected());
    }
}
