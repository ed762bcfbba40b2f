//! Per-peer session record
//!
//! One record per peer the radio layer currently knows about. The record
//! owns the session-manager half of the duplex channel and the cancel
//! handle for an in-flight establishment. Mutable parts live behind a
//! per-session async lock; the lock is held only for short bookkeeping
//! sections, never across an upgrade, a transmit, or a channel push.

use crate::channel::ChannelHandle;
use proxim_discovery::PeerId;
use tokio::sync::{oneshot, Mutex};

/// Lifecycle of a peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Found-event accepted, establishment not yet started
    Discovered,
    /// Upgrade in flight
    Establishing,
    /// Upgrade complete, session usable for payload exchange
    Active,
    /// Terminal; the record lingers until replaced or evicted
    Closed,
}

pub(crate) struct SessionGuarded {
    pub(crate) state: SessionState,
    pub(crate) channel: ChannelHandle,
    /// Fires to abort an in-flight establishment; taken on close
    pub(crate) cancel: Option<oneshot::Sender<()>>,
}

pub(crate) struct PeerSession {
    pub(crate) peer: PeerId,
    /// Monotonic tag distinguishing this establishment attempt from any
    /// earlier or later one for the same peer
    pub(crate) generation: u64,
    pub(crate) guarded: Mutex<SessionGuarded>,
}

impl PeerSession {
    pub(crate) fn new(
        peer: PeerId,
        generation: u64,
        channel: ChannelHandle,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            peer,
            generation,
            guarded: Mutex::new(SessionGuarded {
                state: SessionState::Discovered,
                channel,
                cancel: Some(cancel),
            }),
        }
    }

    pub(crate) async fn state(&self) -> SessionState {
        self.guarded.lock().await.state
    }

    /// Tear the session down: abort any in-flight establishment, close
    /// the channel, mark the record terminal. Returns whether this call
    /// performed the teardown (false if already closed).
    pub(crate) async fn close(&self) -> bool {
        let mut guarded = self.guarded.lock().await;
        if guarded.state == SessionState::Closed {
            return false;
        }
        if let Some(cancel) = guarded.cancel.take() {
            let _ = cancel.send(());
        }
        guarded.channel.close();
        guarded.state = SessionState::Closed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;

    #[tokio::test]
    async fn test_close_fires_cancel_and_closes_channel() {
        let (handle, _raw, _drain) = channel::channel(4);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let session = PeerSession::new(PeerId::new("abcd", "u1"), 1, handle.clone(), cancel_tx);

        assert_eq!(session.state().await, SessionState::Discovered);
        assert!(session.close().await);
        assert_eq!(session.state().await, SessionState::Closed);
        assert!(handle.is_closed());
        assert!(cancel_rx.await.is_ok());

        // second close reports nothing left to do
        assert!(!session.close().await);
    }
}
