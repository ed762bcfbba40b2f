//! Discovery event payloads and service configuration

use crate::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default service tag advertised over the proximity link
pub const DEFAULT_SERVICE_TAG: &str = "_proxim-discovery";

/// Address information published when a peer becomes reachable
///
/// Immutable value produced by the bridge and delivered to registered
/// notifees; not persisted beyond delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddrInfo {
    /// The peer this event describes
    #[serde(rename = "peerId")]
    pub peer: PeerId,
    /// Routable address strings for the peer
    pub addrs: Vec<String>,
}

impl PeerAddrInfo {
    pub fn new(peer: PeerId, addrs: Vec<String>) -> Self {
        Self { peer, addrs }
    }
}

/// Configuration for the discovery service
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Service tag used to scope announcements
    pub service_tag: String,
    /// Interval between announcements on the radio medium
    pub announce_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_tag: DEFAULT_SERVICE_TAG.to_string(),
            announce_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_info_serde_field_names() {
        let info = PeerAddrInfo::new(
            PeerId::new("abcd", "u1"),
            vec!["/ble/abcd".to_string()],
        );
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"peerId\""));
        let back: PeerAddrInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.service_tag, DEFAULT_SERVICE_TAG);
        assert_eq!(config.announce_interval, Duration::from_secs(30));
    }
}
