//! Native driver capability
//!
//! The radio driver (BLE scanner/advertiser, physical link management)
//! lives outside this crate and is consumed through the [`NativeDriver`]
//! capability trait. Driver-initiated events travel the other way, into
//! the bridge's `handle_*` methods; the driver never holds a transport
//! reference.

use async_trait::async_trait;
use bytes::Bytes;
use proxim_discovery::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the native transmit primitive
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("radio link down")]
    LinkDown,
    #[error("driver i/o error: {0}")]
    Io(String),
}

/// Capability interface implemented by a concrete radio driver
#[async_trait]
pub trait NativeDriver: Send + Sync {
    /// Stable identifier used for logging and driver selection
    fn protocol_name(&self) -> &str;

    /// Physically transmit `payload` to `peer` over the radio link
    async fn transmit(&self, peer: &PeerId, payload: Bytes) -> Result<(), DriverError>;
}

/// Fallback driver substituted whenever no real driver is supplied.
///
/// Every call is a harmless no-op that logs, so the bridge never operates
/// with an absent capability.
#[derive(Debug, Default)]
pub struct NoopDriver;

#[async_trait]
impl NativeDriver for NoopDriver {
    fn protocol_name(&self) -> &str {
        "noop"
    }

    async fn transmit(&self, peer: &PeerId, payload: Bytes) -> Result<(), DriverError> {
        debug!(peer = %peer, len = payload.len(), "noop driver dropping transmit");
        Ok(())
    }
}

/// Keyed mapping from protocol name to driver instance
///
/// Populated once at composition time; lookups never downcast.
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn NativeDriver>>,
    noop: Arc<NoopDriver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
            noop: Arc::new(NoopDriver),
        }
    }

    /// Register a driver under its own protocol name
    pub fn insert(&mut self, driver: Arc<dyn NativeDriver>) {
        let name = driver.protocol_name().to_string();
        if self.drivers.insert(name.clone(), driver).is_some() {
            warn!(protocol = %name, "replacing previously registered driver");
        }
    }

    pub fn get(&self, protocol: &str) -> Option<Arc<dyn NativeDriver>> {
        self.drivers.get(protocol).cloned()
    }

    /// Lookup with no-op fallback so callers always hold a capability
    pub fn get_or_noop(&self, protocol: &str) -> Arc<dyn NativeDriver> {
        match self.drivers.get(protocol) {
            Some(driver) => driver.clone(),
            None => {
                warn!(protocol, "no driver registered, falling back to noop");
                self.noop.clone()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_driver_transmit_is_ok() {
        let driver = NoopDriver;
        let peer = PeerId::new("abcd", "u1");
        assert_eq!(driver.protocol_name(), "noop");
        assert!(driver.transmit(&peer, Bytes::from_static(b"x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_registry_lookup_and_fallback() {
        let mut registry = DriverRegistry::new();
        assert!(registry.is_empty());
        registry.insert(Arc::new(NoopDriver));
        assert_eq!(registry.len(), 1);

        assert!(registry.get("noop").is_some());
        assert!(registry.get("ble").is_none());
        assert_eq!(registry.get_or_noop("ble").protocol_name(), "noop");
    }
}
