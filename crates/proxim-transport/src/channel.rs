//! Bounded duplex byte channel between the bridge and the upgrader
//!
//! [`channel`] produces three parts wired to the same link:
//!
//! - [`ChannelHandle`]: kept by the session manager; pushes inbound radio
//!   payloads toward the upgraded connection and owns close.
//! - [`RawChannel`]: handed to the upgrader; reads inbound payloads and
//!   writes outbound frames.
//! - [`OutboundRx`]: drained by the session's transmit task toward the
//!   native driver.
//!
//! Close is level-triggered through a watch flag: once set, every blocked
//! or future operation on any part fails with [`ChannelError::Closed`].

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
}

/// Create a connected channel with the given per-direction capacity
pub fn channel(capacity: usize) -> (ChannelHandle, RawChannel, OutboundRx) {
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (closed_tx, closed_rx) = watch::channel(false);
    let closed_tx = Arc::new(closed_tx);

    let handle = ChannelHandle {
        inbound_tx,
        closed: closed_tx.clone(),
    };
    let raw = RawChannel {
        inbound_rx: Mutex::new(inbound_rx),
        outbound_tx,
        closed: closed_rx.clone(),
    };
    let drain = OutboundRx {
        rx: outbound_rx,
        closed: closed_rx,
    };
    (handle, raw, drain)
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    // Resolves immediately if the flag is already set; a dropped sender
    // counts as closed as well.
    let _ = rx.wait_for(|closed| *closed).await;
}

/// Session-manager side of the channel
#[derive(Clone)]
pub struct ChannelHandle {
    inbound_tx: mpsc::Sender<Bytes>,
    closed: Arc<watch::Sender<bool>>,
}

impl ChannelHandle {
    /// Push an inbound radio payload toward the upgraded connection.
    ///
    /// Applies backpressure when the buffer is full; a close while blocked
    /// here fails the push instead of leaving it stuck.
    pub async fn push_inbound(&self, payload: Bytes) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut closed_rx = self.closed.subscribe();
        tokio::select! {
            res = self.inbound_tx.send(payload) => res.map_err(|_| ChannelError::Closed),
            _ = wait_closed(&mut closed_rx) => Err(ChannelError::Closed),
        }
    }

    /// Close the channel. Returns whether this call flipped the flag, so
    /// the close side effects run exactly once no matter how many times
    /// the session is torn down.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Upgrader side of the channel: the raw duplex byte stream a secured
/// connection is built on top of
pub struct RawChannel {
    inbound_rx: Mutex<mpsc::Receiver<Bytes>>,
    outbound_tx: mpsc::Sender<Bytes>,
    closed: watch::Receiver<bool>,
}

impl RawChannel {
    /// Next inbound payload from the radio link
    pub async fn recv(&self) -> Result<Bytes, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut rx = self.inbound_rx.lock().await;
        let mut closed_rx = self.closed.clone();
        tokio::select! {
            msg = rx.recv() => msg.ok_or(ChannelError::Closed),
            _ = wait_closed(&mut closed_rx) => Err(ChannelError::Closed),
        }
    }

    /// Queue an outbound frame for transmission over the radio link
    pub async fn send(&self, frame: Bytes) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut closed_rx = self.closed.clone();
        tokio::select! {
            res = self.outbound_tx.send(frame) => res.map_err(|_| ChannelError::Closed),
            _ = wait_closed(&mut closed_rx) => Err(ChannelError::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Outbound frame stream drained toward the native driver
pub struct OutboundRx {
    rx: mpsc::Receiver<Bytes>,
    closed: watch::Receiver<bool>,
}

impl OutboundRx {
    /// Next outbound frame, or `None` once the channel is closed
    pub async fn next(&mut self) -> Option<Bytes> {
        tokio::select! {
            msg = self.rx.recv() => msg,
            _ = wait_closed(&mut self.closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_inbound_roundtrip() {
        let (handle, raw, _drain) = channel(4);
        handle.push_inbound(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(raw.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_outbound_roundtrip() {
        let (_handle, raw, mut drain) = channel(4);
        raw.send(Bytes::from_static(b"frame")).await.unwrap();
        assert_eq!(drain.next().await, Some(Bytes::from_static(b"frame")));
    }

    #[tokio::test]
    async fn test_close_is_exactly_once() {
        let (handle, _raw, _drain) = channel(4);
        assert!(handle.close());
        assert!(!handle.close());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let (handle, raw, mut drain) = channel(4);
        handle.close();

        assert_eq!(
            handle.push_inbound(Bytes::from_static(b"x")).await,
            Err(ChannelError::Closed)
        );
        assert_eq!(raw.recv().await, Err(ChannelError::Closed));
        assert_eq!(raw.send(Bytes::from_static(b"x")).await, Err(ChannelError::Closed));
        assert_eq!(drain.next().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_recv() {
        let (handle, raw, _drain) = channel(4);
        let recv = tokio::spawn(async move { raw.recv().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.close();

        let result = tokio::time::timeout(Duration::from_secs(1), recv)
            .await
            .expect("recv should unblock on close")
            .unwrap();
        assert_eq!(result, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_push() {
        // Capacity 1, pre-filled, so the second push blocks on backpressure.
        let (handle, _raw, _drain) = channel(1);
        handle.push_inbound(Bytes::from_static(b"a")).await.unwrap();

        let blocked = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.push_inbound(Bytes::from_static(b"b")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.close();

        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("push should unblock on close")
            .unwrap();
        assert_eq!(result, Err(ChannelError::Closed));
    }
}
