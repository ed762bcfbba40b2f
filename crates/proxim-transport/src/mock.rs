//! Test doubles for the driver and upgrader capabilities

use crate::channel::RawChannel;
use crate::driver::{DriverError, NativeDriver};
use crate::upgrader::{SessionInfo, UpgradeError, Upgrader};
use async_trait::async_trait;
use bytes::Bytes;
use proxim_discovery::PeerId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// In-memory driver that records every transmit
pub struct MockDriver {
    transmitted: Mutex<Vec<(PeerId, Bytes)>>,
    fail_transmit: AtomicBool,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            transmitted: Mutex::new(Vec::new()),
            fail_transmit: AtomicBool::new(false),
        }
    }

    /// Everything transmitted so far, in order
    pub fn transmitted(&self) -> Vec<(PeerId, Bytes)> {
        self.transmitted.lock().unwrap().clone()
    }

    /// Make subsequent transmits fail with a link-down error
    pub fn set_fail_transmit(&self, fail: bool) {
        self.fail_transmit.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NativeDriver for MockDriver {
    fn protocol_name(&self) -> &str {
        "mock"
    }

    async fn transmit(&self, peer: &PeerId, payload: Bytes) -> Result<(), DriverError> {
        if self.fail_transmit.load(Ordering::SeqCst) {
            return Err(DriverError::LinkDown);
        }
        self.transmitted.lock().unwrap().push((peer.clone(), payload));
        Ok(())
    }
}

enum StubMode {
    Succeed,
    Fail,
    Hang,
}

/// Scriptable upgrader: succeeds, fails, or hangs until released.
///
/// On success the raw channel is retained, standing in for the overlay
/// keeping the upgraded connection alive; tests can take it back to
/// exercise the byte path.
pub struct StubUpgrader {
    mode: StubMode,
    release: Notify,
    seen: Mutex<Vec<SessionInfo>>,
    channels: Mutex<Vec<RawChannel>>,
}

impl StubUpgrader {
    fn with_mode(mode: StubMode) -> Self {
        Self {
            mode,
            release: Notify::new(),
            seen: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Every upgrade completes immediately
    pub fn succeeding() -> Self {
        Self::with_mode(StubMode::Succeed)
    }

    /// Every upgrade fails immediately
    pub fn failing() -> Self {
        Self::with_mode(StubMode::Fail)
    }

    /// Upgrades park until [`StubUpgrader::release`] is called; a
    /// released upgrade completes successfully.
    pub fn hanging() -> Self {
        Self::with_mode(StubMode::Hang)
    }

    /// Release one parked upgrade (stores a single permit if none is
    /// parked yet).
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Session contexts handed to the upgrader, in order
    pub fn seen(&self) -> Vec<SessionInfo> {
        self.seen.lock().unwrap().clone()
    }

    /// Take back the most recently retained channel
    pub fn take_channel(&self) -> Option<RawChannel> {
        self.channels.lock().unwrap().pop()
    }
}

#[async_trait]
impl Upgrader for StubUpgrader {
    async fn upgrade(&self, channel: RawChannel, info: SessionInfo) -> Result<(), UpgradeError> {
        self.seen.lock().unwrap().push(info);
        match self.mode {
            StubMode::Succeed => {
                self.channels.lock().unwrap().push(channel);
                Ok(())
            }
            StubMode::Fail => Err(UpgradeError::Failed("stub upgrader".to_string())),
            StubMode::Hang => {
                self.release.notified().await;
                self.channels.lock().unwrap().push(channel);
                Ok(())
            }
        }
    }
}
