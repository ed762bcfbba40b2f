//! Proximity transport: bridges a native radio driver to the overlay
//! network's transport abstraction.
//!
//! The native layer reports three kinds of events: a peer came into
//! range, a peer went out of range, and raw bytes arrived from a peer.
//! [`ProximityTransport`] turns those into managed peer sessions, runs
//! each new session through the overlay's upgrade pipeline, and fans
//! out "peer reachable" events to discovery subscribers.
//!
//! Both external dependencies are capability traits: [`NativeDriver`]
//! for the radio and [`Upgrader`] for the overlay's handshake pipeline,
//! so neither side links against the other's internals.

pub mod channel;
pub mod driver;
pub mod mock;
pub mod session;
pub mod transport;
pub mod upgrader;

pub use channel::{ChannelError, ChannelHandle, OutboundRx, RawChannel};
pub use driver::{DriverError, DriverRegistry, NativeDriver, NoopDriver};
pub use session::SessionState;
pub use transport::{ProximityTransport, SendError, TransportConfig, TransportStats};
pub use upgrader::{SessionInfo, UpgradeError, Upgrader};
