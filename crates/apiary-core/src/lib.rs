//! Session engine for XBee radio modules.
//!
//! Drives a module in API operating mode over any byte-stream transport:
//! a background reader task decodes and dispatches frames, synchronous
//! requests are correlated by frame id, asynchronous traffic fans out to
//! event subscribers, and a discovery engine maps the surrounding
//! network.
//!
//! # Architecture
//!
//! - [`XbeeDevice`]: the session object — open/close lifecycle, operating
//!   mode handshake, AT parameter surface, transmit helpers.
//! - [`Transport`]: the seam concrete serial/BLE/TCP drivers implement;
//!   the core never touches an OS handle itself.
//! - [`EventStream`]: per-subscriber cursor over the session's events,
//!   in arrival order.
//! - [`PacketQueue`]: lookaside queue for synchronous filtered reads.
//! - [`XbeeNetwork`] / [`NetworkDiscoverer`]: registry of remote nodes
//!   and the `ND` discovery procedure that populates it.
//!
//! The wire format itself (framing, escaping, packet layouts) lives in
//! [`apiary_proto`].

pub mod device;
pub mod discovery;
mod error;
pub mod events;
pub mod network;
mod pending;
pub mod protocol;
pub mod queue;
mod reader;
pub mod transport;

pub use device::{DeviceConfig, DeviceInfo, XbeeDevice, DEFAULT_RECEIVE_TIMEOUT};
pub use discovery::{DiscoveryStop, NetworkDiscoverer, DEFAULT_DISCOVERY_TIMEOUT};
pub use error::{DeviceError, TransportError};
pub use events::{Event, EventStream};
pub use network::{NodeRole, RemoteNode, XbeeNetwork};
pub use protocol::XbeeProtocol;
pub use queue::{PacketQueue, DEFAULT_QUEUE_CAPACITY};
pub use transport::{BleAuthenticator, SessionKeys, Transport, TransportKind};

// The wire layer is part of this crate's public vocabulary.
pub use apiary_proto as proto;
