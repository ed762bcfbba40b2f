//! Upgrader boundary
//!
//! The overlay's connection upgrade pipeline (security handshake plus
//! stream multiplexing) is consumed through the [`Upgrader`] capability
//! trait. The bridge hands over a [`RawChannel`] and waits for the
//! verdict; the upgraded connection itself stays on the overlay side, so
//! no dependency cycle forms between the overlay host and this transport.

use crate::channel::RawChannel;
use async_trait::async_trait;
use proxim_discovery::PeerId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeError {
    #[error("upgrade failed: {0}")]
    Failed(String),
    #[error("upgrade cancelled")]
    Cancelled,
}

/// Context handed to the upgrader alongside the raw channel
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub peer: PeerId,
    /// Establishment attempt this upgrade belongs to
    pub generation: u64,
    /// Protocol name of the driver carrying the session
    pub protocol: String,
}

/// Capability interface over the overlay's upgrade pipeline
#[async_trait]
pub trait Upgrader: Send + Sync {
    /// Turn a raw duplex byte channel into a secured, multiplexed
    /// connection owned by the overlay.
    ///
    /// Consumes the channel. The bridge may abandon the attempt by
    /// dropping this future; implementations must tolerate that at any
    /// await point.
    async fn upgrade(&self, channel: RawChannel, info: SessionInfo) -> Result<(), UpgradeError>;
}
