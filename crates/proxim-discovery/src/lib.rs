//! Peer discovery primitives for the proxim proximity bridge
//!
//! This crate holds the pieces the overlay layer and the transport bridge
//! share:
//!
//! - **PeerId**: decoded peer identity; decoding is the validation
//!   boundary for identifier strings arriving from the radio layer
//! - **PeerAddrInfo**: the event payload published when a peer becomes
//!   reachable
//! - **DiscoveryRegistry**: insertion-ordered notifee pub/sub with
//!   per-subscriber failure isolation
//!
//! No session logic lives here; see `proxim-transport` for the bridge.

pub mod peer;
pub mod registry;
pub mod types;

pub use peer::{PeerId, PeerIdError};
pub use registry::{DiscoveryRegistry, Notifee, RegistryStats};
pub use types::{DiscoveryConfig, PeerAddrInfo, DEFAULT_SERVICE_TAG};
