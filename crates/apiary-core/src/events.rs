//! Asynchronous event fan-out.
//!
//! Every frame the reader task decodes is turned into zero or more events
//! on a single broadcast channel. Subscribers each get their own cursor
//! into the stream, and within one subscriber events always arrive in the
//! order the reader produced them. A subscriber that falls more than the
//! channel capacity behind loses the oldest events (a gap, never a
//! reordering).

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use apiary_proto::{
    packet::IoSample, Addr16, Addr64, ModemStatus, Packet, RelayInterface,
};

use crate::network::RemoteNode;

/// Capacity of the broadcast channel behind [`EventStream`].
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Application data received over RF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedData {
    /// Sender's 64-bit address ([`Addr64::UNKNOWN`] for legacy 16-bit
    /// receive frames).
    pub source64: Addr64,
    /// Sender's 16-bit address ([`Addr16::UNKNOWN`] for legacy 64-bit
    /// receive frames).
    pub source16: Addr16,
    /// Payload bytes.
    pub data: Bytes,
    /// Whether the frame was a broadcast.
    pub is_broadcast: bool,
}

/// Application data received with explicit addressing information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitData {
    /// Sender's 64-bit address.
    pub source64: Addr64,
    /// Sender's 16-bit address.
    pub source16: Addr16,
    /// Source endpoint.
    pub src_endpoint: u8,
    /// Destination endpoint.
    pub dst_endpoint: u8,
    /// Cluster identifier.
    pub cluster_id: u16,
    /// Profile identifier.
    pub profile_id: u16,
    /// Payload bytes.
    pub data: Bytes,
    /// Whether the frame was a broadcast.
    pub is_broadcast: bool,
}

/// An I/O sample reported by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSampleData {
    /// Reporting node's 64-bit address.
    pub source64: Addr64,
    /// Reporting node's 16-bit address.
    pub source16: Addr16,
    /// Parsed sample set.
    pub sample: IoSample,
}

/// Data received over IPv4 (Wi-Fi / cellular modules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpData {
    /// Sender's IPv4 address.
    pub source: std::net::Ipv4Addr,
    /// Destination port on this module.
    pub dest_port: u16,
    /// Sender's source port.
    pub src_port: u16,
    /// Payload bytes.
    pub data: Bytes,
}

/// Events published by an open session.
#[derive(Debug, Clone)]
pub enum Event {
    /// Any frame arrived (fires for every decoded frame).
    PacketReceived(Packet),
    /// Application data arrived (receive or legacy RX frames).
    DataReceived(ReceivedData),
    /// An I/O sample arrived.
    IoSampleReceived(IoSampleData),
    /// The modem reported a status change.
    ModemStatusReceived(ModemStatus),
    /// Application data arrived with explicit addressing.
    ExplicitDataReceived(ExplicitData),
    /// A user data relay frame arrived, from any interface.
    UserDataRelayReceived {
        /// Interface the bytes came from.
        source: RelayInterface,
        /// Relayed bytes.
        data: Bytes,
    },
    /// Relay data arrived from the Bluetooth interface.
    BluetoothDataReceived(Bytes),
    /// Relay data arrived from the MicroPython interface.
    MicroPythonDataReceived(Bytes),
    /// Relay data arrived from the serial interface.
    SerialDataReceived(Bytes),
    /// IPv4 data arrived.
    IpDataReceived(IpData),
    /// An SMS arrived.
    SmsReceived {
        /// Sender's phone number.
        phone_number: String,
        /// Message text.
        message: Bytes,
    },
    /// Node discovery found a device.
    DeviceDiscovered(RemoteNode),
    /// Node discovery hit a non-fatal error.
    DiscoveryError(String),
    /// Node discovery concluded. Carries the error message if the run
    /// failed, `None` on success.
    DiscoveryFinished(Option<String>),
}

/// A subscriber's cursor into the session's event stream.
///
/// Obtained from [`XbeeDevice::events`](crate::device::XbeeDevice::events).
/// Dropping the stream unsubscribes.
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
}

impl EventStream {
    pub(crate) fn new(rx: broadcast::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Next event, waiting as long as it takes.
    ///
    /// Returns `None` once the session is closed and the stream drained.
    /// A lagged cursor skips the overwritten events and continues with
    /// the oldest retained one.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event subscriber lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event, waiting up to `timeout`. `None` on timeout or close.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }

    /// Next event matching `filter`, waiting up to `timeout`.
    ///
    /// Non-matching events are consumed from this cursor (other
    /// subscribers are unaffected).
    pub async fn recv_matching<T>(
        &mut self,
        timeout: Duration,
        mut filter: impl FnMut(Event) -> Option<T>,
    ) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.recv_timeout(remaining).await {
                Some(event) => {
                    if let Some(found) = filter(event) {
                        return Some(found);
                    }
                },
                None => return None,
            }
        }
    }
}

/// Create the broadcast channel a session publishes events on.
pub(crate) fn channel() -> broadcast::Sender<Event> {
    broadcast::Sender::new(EVENT_CHANNEL_CAPACITY)
}
