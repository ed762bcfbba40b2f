//! Notifee registry: fan-out of peer-found events
//!
//! Decouples "a peer became reachable" from "who cares". Subscribers are
//! held in insertion order and compared by identity, so registering the
//! same notifee twice yields two deliveries per event. Fan-out runs on a
//! snapshot taken under the lock; the lock is never held across the
//! subscriber callbacks themselves.

use crate::types::{DiscoveryConfig, PeerAddrInfo};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// A subscriber interested in peer-discovery events
///
/// `handle_peer_found` may be called concurrently with the notifee's own
/// unregistration: a publish snapshot taken before the unregistration
/// still delivers.
pub trait Notifee: Send + Sync {
    fn handle_peer_found(&self, info: &PeerAddrInfo);
}

/// Fan-out counters
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub events_published: u64,
    pub deliveries: u64,
    pub panics_isolated: u64,
}

/// Registry of notifees interested in peer-found events
pub struct DiscoveryRegistry {
    config: DiscoveryConfig,
    notifees: Mutex<Vec<Arc<dyn Notifee>>>,
    stats: Mutex<RegistryStats>,
}

impl DiscoveryRegistry {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            notifees: Mutex::new(Vec::new()),
            stats: Mutex::new(RegistryStats::default()),
        }
    }

    /// Service tag this registry is scoped to
    pub fn service_tag(&self) -> &str {
        &self.config.service_tag
    }

    /// Add a subscriber. Duplicates are allowed: each registration gets
    /// its own delivery per event.
    pub fn register(&self, notifee: Arc<dyn Notifee>) {
        self.lock_notifees().push(notifee);
    }

    /// Remove the first subscriber matching by identity; no-op if absent.
    pub fn unregister(&self, notifee: &Arc<dyn Notifee>) {
        let mut notifees = self.lock_notifees();
        if let Some(pos) = notifees.iter().position(|n| Arc::ptr_eq(n, notifee)) {
            notifees.remove(pos);
        }
    }

    /// Deliver an event to every current subscriber in registration order.
    ///
    /// A panic in one subscriber is isolated and logged; the remaining
    /// subscribers still receive the event.
    pub fn publish(&self, info: &PeerAddrInfo) {
        let snapshot: Vec<Arc<dyn Notifee>> = self.lock_notifees().clone();

        let mut delivered = 0u64;
        let mut panicked = 0u64;
        for notifee in &snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| notifee.handle_peer_found(info)));
            if result.is_ok() {
                delivered += 1;
            } else {
                panicked += 1;
                warn!(peer = %info.peer, "notifee panicked while handling peer-found event");
            }
        }

        let mut stats = self.lock_stats();
        stats.events_published += 1;
        stats.deliveries += delivered;
        stats.panics_isolated += panicked;
    }

    pub fn len(&self) -> usize {
        self.lock_notifees().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_notifees().is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.lock_stats().clone()
    }

    // A poisoned lock only means some earlier holder panicked; the list
    // itself is still consistent, so keep going with the inner value.
    fn lock_notifees(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Notifee>>> {
        self.notifees.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, RegistryStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DiscoveryRegistry {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}
