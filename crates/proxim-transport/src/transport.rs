//! Peer session manager
//!
//! [`ProximityTransport`] is the bridge between driver-initiated radio
//! events (peer found, peer lost, bytes received) and the overlay's
//! transport abstraction. It owns the session table and drives each
//! session through its lifecycle; the radio driver and the upgrade
//! pipeline are consumed through capability traits.
//!
//! Locking discipline: the session table lock may be held while taking a
//! per-session lock, never the other way around, and no lock is held
//! across an upgrade, a native transmit, or a channel push.

use crate::channel::{self, OutboundRx, RawChannel};
use crate::driver::{DriverError, NativeDriver, NoopDriver};
use crate::session::{PeerSession, SessionState};
use crate::upgrader::{SessionInfo, UpgradeError, Upgrader};
use bytes::Bytes;
use proxim_discovery::{DiscoveryRegistry, PeerAddrInfo, PeerId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Errors from the application-initiated send path
#[derive(Debug, Error)]
pub enum SendError {
    #[error("no active session for peer")]
    SessionNotActive,
    #[error("native transmit failed: {0}")]
    TransportFailure(#[from] DriverError),
}

/// Tunables for the session manager
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-direction buffer size of each session's duplex channel
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub upgrades_failed: u64,
    /// Establishment completions discarded because the session they
    /// belonged to was gone or replaced
    pub stale_events_dropped: u64,
    /// Inbound payloads dropped for lack of an active session
    pub payloads_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

struct Inner {
    config: TransportConfig,
    driver: Arc<dyn NativeDriver>,
    upgrader: Arc<dyn Upgrader>,
    registry: Arc<DiscoveryRegistry>,
    sessions: RwLock<HashMap<PeerId, Arc<PeerSession>>>,
    next_generation: AtomicU64,
    stats: RwLock<TransportStats>,
    span: Span,
}

/// Bridge between the native radio driver and the overlay transport
#[derive(Clone)]
pub struct ProximityTransport {
    inner: Arc<Inner>,
}

impl ProximityTransport {
    /// Build a transport over the given capabilities.
    ///
    /// A missing driver is an error worth logging but never fatal: the
    /// no-op driver is substituted so every later call path stays valid.
    pub fn new(
        config: TransportConfig,
        driver: Option<Arc<dyn NativeDriver>>,
        upgrader: Arc<dyn Upgrader>,
        registry: Arc<DiscoveryRegistry>,
    ) -> Self {
        let driver = driver.unwrap_or_else(|| {
            error!("no native driver supplied, substituting noop driver");
            Arc::new(NoopDriver)
        });
        let span = info_span!("proximity_transport", protocol = %driver.protocol_name());
        Self {
            inner: Arc::new(Inner {
                config,
                driver,
                upgrader,
                registry,
                sessions: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                stats: RwLock::new(TransportStats::default()),
                span,
            }),
        }
    }

    /// Protocol name of the underlying driver
    pub fn protocol_name(&self) -> &str {
        self.inner.driver.protocol_name()
    }

    /// Driver callback: a peer became reachable over the radio link.
    ///
    /// Returns whether the event was accepted. An identifier that fails
    /// to decode is rejected and no session is created; a peer that is
    /// already live is acknowledged without side effects.
    pub async fn handle_found_peer(&self, raw_id: &str) -> bool {
        let peer = match PeerId::decode(raw_id) {
            Ok(peer) => peer,
            Err(e) => {
                error!(parent: &self.inner.span, raw_id, error = %e, "rejecting found-event with invalid peer identifier");
                return false;
            }
        };

        let (session, raw_channel, outbound, cancel_rx) = {
            let mut sessions = self.inner.sessions.write().await;
            if let Some(existing) = sessions.get(&peer) {
                if existing.state().await != SessionState::Closed {
                    debug!(parent: &self.inner.span, peer = %peer, "found-event for live session, ignoring");
                    return true;
                }
            }
            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let (handle, raw_channel, outbound) =
                channel::channel(self.inner.config.channel_capacity);
            let (cancel_tx, cancel_rx) = oneshot::channel();
            let session = Arc::new(PeerSession::new(
                peer.clone(),
                generation,
                handle,
                cancel_tx,
            ));
            sessions.insert(peer.clone(), session.clone());
            (session, raw_channel, outbound, cancel_rx)
        };
        self.inner.stats.write().await.sessions_opened += 1;
        info!(parent: &self.inner.span, peer = %peer, generation = session.generation, "peer found, establishing session");

        // Move to Establishing unless a lost-event raced us in between.
        {
            let mut guarded = session.guarded.lock().await;
            if guarded.state != SessionState::Discovered {
                debug!(parent: &self.inner.span, peer = %peer, "session torn down before establishment started");
                return true;
            }
            guarded.state = SessionState::Establishing;
        }

        self.spawn_outbound_drain(peer.clone(), outbound);
        self.spawn_establishment(peer, session.generation, raw_channel, cancel_rx);
        true
    }

    /// Driver callback: a peer went out of range.
    ///
    /// Tears the session down if one is live; otherwise a no-op. Always
    /// wins over an in-flight establishment for the same peer.
    pub async fn handle_lost_peer(&self, raw_id: &str) {
        let peer = match PeerId::decode(raw_id) {
            Ok(peer) => peer,
            Err(e) => {
                error!(parent: &self.inner.span, raw_id, error = %e, "ignoring lost-event with invalid peer identifier");
                return;
            }
        };

        let session = self.inner.sessions.read().await.get(&peer).cloned();
        let Some(session) = session else {
            debug!(parent: &self.inner.span, peer = %peer, "lost-event for unknown peer, ignoring");
            return;
        };
        if session.close().await {
            self.inner.stats.write().await.sessions_closed += 1;
            info!(parent: &self.inner.span, peer = %peer, generation = session.generation, "peer lost, session closed");
        } else {
            debug!(parent: &self.inner.span, peer = %peer, "lost-event for already-closed session, ignoring");
        }
    }

    /// Driver callback: raw bytes arrived from a peer.
    ///
    /// Payloads are only deliverable into an active session; anything
    /// else is dropped with a log line, and a bad event for one peer can
    /// never affect another peer's session.
    pub async fn receive_from_peer(&self, raw_id: &str, payload: &[u8]) {
        let peer = match PeerId::decode(raw_id) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(parent: &self.inner.span, raw_id, error = %e, "dropping payload with invalid peer identifier");
                self.inner.stats.write().await.payloads_dropped += 1;
                return;
            }
        };

        let session = self.inner.sessions.read().await.get(&peer).cloned();
        let handle = match session {
            Some(session) => {
                let guarded = session.guarded.lock().await;
                if guarded.state == SessionState::Active {
                    Some(guarded.channel.clone())
                } else {
                    None
                }
            }
            None => None,
        };
        let Some(handle) = handle else {
            warn!(parent: &self.inner.span, peer = %peer, len = payload.len(), "dropping payload for peer without active session");
            self.inner.stats.write().await.payloads_dropped += 1;
            return;
        };

        let len = payload.len() as u64;
        match handle.push_inbound(Bytes::copy_from_slice(payload)).await {
            Ok(()) => {
                self.inner.stats.write().await.bytes_received += len;
            }
            Err(_) => {
                debug!(parent: &self.inner.span, peer = %peer, "session closed while delivering payload, dropping");
                self.inner.stats.write().await.payloads_dropped += 1;
            }
        }
    }

    /// Application-initiated send to a peer's active session
    pub async fn send_to_peer(&self, peer: &PeerId, payload: Bytes) -> Result<(), SendError> {
        let session = self.inner.sessions.read().await.get(peer).cloned();
        let active = match session {
            Some(session) => session.state().await == SessionState::Active,
            None => false,
        };
        if !active {
            return Err(SendError::SessionNotActive);
        }

        let len = payload.len() as u64;
        self.inner.driver.transmit(peer, payload).await?;
        self.inner.stats.write().await.bytes_sent += len;
        Ok(())
    }

    /// Tear down every session and empty the table
    pub async fn close(&self) {
        let sessions: Vec<Arc<PeerSession>> = self
            .inner
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        let mut closed = 0u64;
        for session in sessions {
            if session.close().await {
                closed += 1;
            }
        }
        self.inner.stats.write().await.sessions_closed += closed;
        info!(parent: &self.inner.span, sessions = closed, "transport closed");
    }

    /// Current lifecycle state of a peer's session, if one is known
    pub async fn session_state(&self, peer: &PeerId) -> Option<SessionState> {
        let session = self.inner.sessions.read().await.get(peer).cloned();
        match session {
            Some(session) => Some(session.state().await),
            None => None,
        }
    }

    /// Peers with a currently active session
    pub async fn active_peers(&self) -> Vec<PeerId> {
        let sessions: Vec<Arc<PeerSession>> =
            self.inner.sessions.read().await.values().cloned().collect();
        let mut peers = Vec::new();
        for session in sessions {
            if session.state().await == SessionState::Active {
                peers.push(session.peer.clone());
            }
        }
        peers
    }

    pub async fn stats(&self) -> TransportStats {
        self.inner.stats.read().await.clone()
    }

    /// Drains outbound frames queued by the upgraded connection into the
    /// native transmit primitive, for the lifetime of the channel.
    fn spawn_outbound_drain(&self, peer: PeerId, mut outbound: OutboundRx) {
        let inner = self.inner.clone();
        let span = self.inner.span.clone();
        tokio::spawn(
            async move {
                while let Some(frame) = outbound.next().await {
                    let len = frame.len() as u64;
                    match inner.driver.transmit(&peer, frame).await {
                        Ok(()) => {
                            inner.stats.write().await.bytes_sent += len;
                        }
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "native transmit of outbound frame failed");
                        }
                    }
                }
                debug!(peer = %peer, "outbound drain finished");
            }
            .instrument(span),
        );
    }

    /// Runs the upgrade for one establishment attempt, racing it against
    /// the session's cancel handle.
    fn spawn_establishment(
        &self,
        peer: PeerId,
        generation: u64,
        raw_channel: RawChannel,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let inner = self.inner.clone();
        let span = self.inner.span.clone();
        let info = SessionInfo {
            peer: peer.clone(),
            generation,
            protocol: self.inner.driver.protocol_name().to_string(),
        };
        tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    result = inner.upgrader.upgrade(raw_channel, info) => result,
                    _ = cancel_rx => Err(UpgradeError::Cancelled),
                };
                inner.complete_establishment(&peer, generation, outcome).await;
            }
            .instrument(span),
        );
    }
}

impl Inner {
    /// Apply an establishment outcome to the session table.
    ///
    /// Guards against stale completions: the outcome only lands if the
    /// table still holds the same peer at the same generation, still in
    /// Establishing. Anything else is discarded and counted.
    async fn complete_establishment(
        &self,
        peer: &PeerId,
        generation: u64,
        outcome: Result<(), UpgradeError>,
    ) {
        match outcome {
            Ok(()) => {
                let session = self.sessions.read().await.get(peer).cloned();
                let current = match session {
                    Some(session) if session.generation == generation => {
                        let mut guarded = session.guarded.lock().await;
                        if guarded.state == SessionState::Establishing {
                            guarded.state = SessionState::Active;
                            guarded.cancel = None;
                            true
                        } else {
                            false
                        }
                    }
                    _ => false,
                };
                if !current {
                    self.stats.write().await.stale_events_dropped += 1;
                    debug!(parent: &self.span, peer = %peer, generation, "discarding stale establishment completion");
                    return;
                }

                info!(parent: &self.span, peer = %peer, generation, "session active");
                let addr = format!("/{}/{}", self.driver.protocol_name(), peer);
                self.registry
                    .publish(&PeerAddrInfo::new(peer.clone(), vec![addr]));
            }
            Err(UpgradeError::Cancelled) => {
                // Teardown already happened on the path that cancelled us.
                debug!(parent: &self.span, peer = %peer, generation, "establishment cancelled");
            }
            Err(e) => {
                warn!(parent: &self.span, peer = %peer, generation, error = %e, "upgrade failed, closing session");
                self.stats.write().await.upgrades_failed += 1;

                let session = self.sessions.read().await.get(peer).cloned();
                if let Some(session) = session {
                    if session.generation == generation && session.close().await {
                        self.stats.write().await.sessions_closed += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, StubUpgrader};
    use proxim_discovery::DiscoveryConfig;

    fn transport_with(upgrader: Arc<dyn Upgrader>) -> (ProximityTransport, Arc<MockDriver>) {
        let driver = Arc::new(MockDriver::new());
        let registry = Arc::new(DiscoveryRegistry::new(DiscoveryConfig::default()));
        let transport = ProximityTransport::new(
            TransportConfig::default(),
            Some(driver.clone()),
            upgrader,
            registry,
        );
        (transport, driver)
    }

    #[tokio::test]
    async fn test_noop_driver_substituted_when_driver_missing() {
        let registry = Arc::new(DiscoveryRegistry::new(DiscoveryConfig::default()));
        let transport = ProximityTransport::new(
            TransportConfig::default(),
            None,
            Arc::new(StubUpgrader::succeeding()),
            registry,
        );
        assert_eq!(transport.protocol_name(), "noop");
    }

    #[tokio::test]
    async fn test_stale_completion_does_not_resurrect_session() {
        let (transport, _driver) = transport_with(Arc::new(StubUpgrader::hanging()));
        let peer = PeerId::new("abcd", "u1");

        // First attempt hangs in the upgrader, then the peer is lost.
        assert!(transport.handle_found_peer("abcd:u1").await);
        assert_eq!(
            transport.session_state(&peer).await,
            Some(SessionState::Establishing)
        );
        transport.handle_lost_peer("abcd:u1").await;
        assert_eq!(
            transport.session_state(&peer).await,
            Some(SessionState::Closed)
        );

        // Second attempt replaces the record at a newer generation.
        assert!(transport.handle_found_peer("abcd:u1").await);
        assert_eq!(
            transport.session_state(&peer).await,
            Some(SessionState::Establishing)
        );

        // A delayed success for the first attempt must land nowhere.
        transport
            .inner
            .complete_establishment(&peer, 1, Ok(()))
            .await;
        assert_eq!(
            transport.session_state(&peer).await,
            Some(SessionState::Establishing)
        );
        assert!(transport.stats().await.stale_events_dropped >= 1);
        assert!(transport.active_peers().await.is_empty());
    }

    #[tokio::test]
    async fn test_completion_for_evicted_peer_is_discarded() {
        let (transport, _driver) = transport_with(Arc::new(StubUpgrader::hanging()));
        let peer = PeerId::new("abcd", "u1");

        assert!(transport.handle_found_peer("abcd:u1").await);
        transport.close().await;
        assert_eq!(transport.session_state(&peer).await, None);

        transport
            .inner
            .complete_establishment(&peer, 1, Ok(()))
            .await;
        assert_eq!(transport.session_state(&peer).await, None);
        assert!(transport.stats().await.stale_events_dropped >= 1);
    }
}
