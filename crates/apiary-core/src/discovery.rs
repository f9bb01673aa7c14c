//! Node discovery engine.
//!
//! Issues the `ND` broadcast and collects the identification records
//! every reachable node answers with. Responses share the request's frame
//! id and arrive as local or remote AT command responses; an empty-value
//! OK response is the end marker.
//!
//! How long to wait is protocol-sensitive: 802.15.4 networks (and
//! DigiMesh modules in S1B compatibility mode) always send the end
//! marker, so the engine waits for it. Everything else runs against a
//! computed timeout derived from the module's own `N?`/`NT` registers
//! plus a per-protocol safety margin.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use apiary_proto::{packet::AtCommand, Addr16, Addr64, AtCmd, Packet};

use crate::{
    device::XbeeDevice,
    error::DeviceError,
    events::Event,
    network::{NodeRole, RemoteNode},
    protocol::XbeeProtocol,
};

/// Fallback discovery window when the module's timeout registers cannot
/// be read.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Safety margin on top of `NT` for DigiMesh networks.
const DIGIMESH_MARGIN: Duration = Duration::from_millis(3_000);

/// Safety margin on top of `NT` for point-to-multipoint networks.
const DIGIPOINT_MARGIN: Duration = Duration::from_millis(8_000);

/// How often the collection loop re-checks the stop flag and deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `SM` value marking a DigiMesh module as sleep support.
const SLEEP_SUPPORT: u8 = 7;

/// `C8` bit flagging S1B (802.15.4) compatibility mode.
const C8_COMPAT_802: u8 = 0x02;

/// Cancellation handle for a running discovery.
///
/// Cloneable and callable from any task; the discovery loop observes the
/// flag at its next poll.
#[derive(Debug, Clone)]
pub struct DiscoveryStop(Arc<AtomicBool>);

impl DiscoveryStop {
    /// Ask the discovery loop to return at its next opportunity.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// What one `ND` response contributes to the run.
enum Response {
    /// A node record.
    Node(RemoteNode),
    /// The empty-value end marker.
    EndMarker,
    /// A non-fatal problem worth surfacing.
    Error(String),
    /// Not part of this discovery.
    Unrelated,
}

/// One-network discovery run bound to an open session.
pub struct NetworkDiscoverer<'a> {
    device: &'a XbeeDevice,
    stop: Arc<AtomicBool>,
}

impl<'a> NetworkDiscoverer<'a> {
    /// Create a discoverer for `device`.
    #[must_use]
    pub fn new(device: &'a XbeeDevice) -> Self {
        Self { device, stop: Arc::new(AtomicBool::new(false)) }
    }

    /// Handle for cancelling this run from another task.
    #[must_use]
    pub fn stop_handle(&self) -> DiscoveryStop {
        DiscoveryStop(Arc::clone(&self.stop))
    }

    /// Discover every reachable node.
    ///
    /// Nodes are merged into the session's network registry as they
    /// arrive and also returned. The subscriber pipe fires
    /// [`Event::DeviceDiscovered`] per node, [`Event::DiscoveryError`]
    /// for non-fatal problems, and a terminal
    /// [`Event::DiscoveryFinished`].
    pub async fn discover(&self) -> Result<Vec<RemoteNode>, DeviceError> {
        self.discover_with_filter(None).await
    }

    /// Discover only nodes whose identifier matches `node_id`.
    pub async fn discover_with_filter(
        &self,
        node_id: Option<&str>,
    ) -> Result<Vec<RemoteNode>, DeviceError> {
        let protocol = self.device.protocol();
        let wait_for_marker = self.is_802_compatible(protocol).await;
        let deadline = if wait_for_marker {
            debug!("802.15.4-compatible discovery, waiting for end marker");
            None
        } else {
            let window = self.discovery_timeout(protocol).await;
            debug!(?window, "discovery window computed");
            Some(tokio::time::Instant::now() + window)
        };

        // Subscribe before sending so no response can race the loop.
        let mut events = self.device.events();

        let frame_id = self.device.alloc_frame_id();
        let parameter =
            node_id.map_or_else(Bytes::new, |id| Bytes::copy_from_slice(id.as_bytes()));
        let request = Packet::AtCommand(AtCommand {
            frame_id,
            command: AtCmd(*b"ND"),
            parameter,
        });
        // Async send: an unknown number of responses share this frame id,
        // so the one-shot correlation path does not apply.
        self.device.send_packet(&request).await?;

        let mut found = Vec::new();
        let mut failure: Option<String> = None;

        loop {
            if self.stop.load(Ordering::Acquire) {
                debug!("discovery cancelled");
                break;
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
            }
            if !self.device.is_open() {
                failure = Some("interface closed during discovery".to_owned());
                break;
            }

            let Some(event) = events.recv_timeout(POLL_INTERVAL).await else {
                continue;
            };
            let Event::PacketReceived(packet) = event else {
                continue;
            };

            match self.classify(frame_id, protocol, &packet) {
                Response::Node(node) => {
                    let canonical = self.device.network().add(node);
                    self.device.state().emit(Event::DeviceDiscovered(canonical.clone()));
                    found.push(canonical);
                },
                Response::EndMarker => {
                    debug!(count = found.len(), "discovery end marker");
                    break;
                },
                Response::Error(message) => {
                    warn!(%message, "discovery error");
                    self.device.state().emit(Event::DiscoveryError(message));
                },
                Response::Unrelated => {},
            }
        }

        self.device.state().emit(Event::DiscoveryFinished(failure.clone()));
        match failure {
            Some(_) => Err(DeviceError::InterfaceClosed),
            None => Ok(found),
        }
    }

    /// Whether this network always terminates discovery with the end
    /// marker: native 802.15.4, or DigiMesh in S1B compatibility mode.
    async fn is_802_compatible(&self, protocol: XbeeProtocol) -> bool {
        match protocol {
            XbeeProtocol::Raw802Dot15Dot4 => true,
            XbeeProtocol::DigiMesh => {
                match self.device.get_parameter(AtCmd(*b"C8")).await {
                    Ok(value) => value.first().is_some_and(|byte| byte & C8_COMPAT_802 != 0),
                    Err(_) => false,
                }
            },
            _ => false,
        }
    }

    /// Compute the discovery window from the module's own registers.
    async fn discovery_timeout(&self, protocol: XbeeProtocol) -> Duration {
        // Newer firmware reports the complete window in milliseconds.
        if let Ok(value) = self.device.get_parameter(AtCmd(*b"N?")).await {
            return Duration::from_millis(be_value(&value));
        }

        match self.device.get_parameter(AtCmd(*b"NT")).await {
            Ok(value) => {
                // NT is in units of 100 ms.
                let mut window = Duration::from_millis(be_value(&value) * 100);
                match protocol {
                    XbeeProtocol::DigiMesh | XbeeProtocol::XTendDigiMesh => {
                        window += DIGIMESH_MARGIN;
                        if self.reads_as_sleep_support().await {
                            // Sleeping networks answer across two wake
                            // cycles; double the window plus headroom.
                            window = window.mul_f64(2.2);
                        }
                    },
                    XbeeProtocol::DigiPoint => window += DIGIPOINT_MARGIN,
                    _ => {},
                }
                window
            },
            Err(err) => {
                let message = format!("could not read discovery timeout: {err}");
                warn!(%message, "falling back to default window");
                self.device.state().emit(Event::DiscoveryError(message));
                DEFAULT_DISCOVERY_TIMEOUT
            },
        }
    }

    async fn reads_as_sleep_support(&self) -> bool {
        match self.device.get_parameter(AtCmd(*b"SM")).await {
            Ok(value) => value.first() == Some(&SLEEP_SUPPORT),
            Err(_) => false,
        }
    }

    /// Sort an incoming packet into this discovery's response kinds.
    fn classify(&self, frame_id: u8, protocol: XbeeProtocol, packet: &Packet) -> Response {
        let (id, command, status, value) = match packet {
            Packet::AtCommandResponse(resp) => {
                (resp.frame_id, resp.command, resp.status, &resp.value)
            },
            Packet::RemoteAtCommandResponse(resp) => {
                (resp.frame_id, resp.command, resp.status, &resp.value)
            },
            _ => return Response::Unrelated,
        };
        if id != frame_id || !command.matches(&AtCmd(*b"ND")) {
            return Response::Unrelated;
        }
        if !status.is_ok() {
            return Response::Error(format!("node discovery answered: {status}"));
        }
        if value.is_empty() {
            return Response::EndMarker;
        }
        match parse_record(protocol, value) {
            Ok(node) => Response::Node(node),
            Err(reason) => Response::Error(reason),
        }
    }
}

/// Big-endian integer value of an AT register, whatever its width.
fn be_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// Parse one discovery record.
///
/// Layout: `A16 (2) | A64 (8)`, then for 802.15.4 `RSSI (1) | NI…`, and
/// for mesh/point protocols
/// `NI (nul-terminated) | parent A16 (2) | role (1) | status (1) |
/// profile (2) | manufacturer (2)`.
fn parse_record(protocol: XbeeProtocol, data: &[u8]) -> Result<RemoteNode, String> {
    if data.len() < 10 {
        return Err(format!("discovery record too short: {} bytes", data.len()));
    }
    let addr16 = Addr16::new([data[0], data[1]]);
    let addr64 = Addr64::from_slice(&data[2..10]).map_err(|err| err.to_string())?;
    let tail = &data[10..];

    let mut node = RemoteNode::new(addr64, addr16);
    node.protocol = Some(protocol);

    if protocol == XbeeProtocol::Raw802Dot15Dot4 {
        let (&rssi, name) =
            tail.split_first().ok_or_else(|| "discovery record missing RSSI".to_owned())?;
        node.rssi = Some(rssi);
        node.node_id = Some(read_node_id(name));
    } else {
        let terminator = tail
            .iter()
            .position(|&byte| byte == 0)
            .ok_or_else(|| "discovery record has unterminated node id".to_owned())?;
        node.node_id = Some(String::from_utf8_lossy(&tail[..terminator]).into_owned());

        let fixed = &tail[terminator + 1..];
        if fixed.len() < 8 {
            return Err("discovery record truncated after node id".to_owned());
        }
        // parent A16 (fixed[0..2]), then role; status, profile and
        // manufacturer id close the record but carry nothing we keep.
        node.role = Some(NodeRole::from_u8(fixed[2]));
    }
    Ok(node)
}

/// Node id field: nul-terminated, or the whole remainder.
fn read_node_id(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_record(addr16: u16, addr64: u64, name: &str, role: u8) -> Vec<u8> {
        let mut record = Vec::new();
        record.extend_from_slice(&addr16.to_be_bytes());
        record.extend_from_slice(&addr64.to_be_bytes());
        record.extend_from_slice(name.as_bytes());
        record.push(0); // NI terminator
        record.extend_from_slice(&[0xFF, 0xFE]); // parent
        record.push(role);
        record.push(0); // status
        record.extend_from_slice(&[0xC1, 0x05]); // profile
        record.extend_from_slice(&[0x10, 0x1E]); // manufacturer
        record
    }

    #[test]
    fn parses_mesh_record() {
        let record = mesh_record(0x1234, 0x0013_A200_4001_0203, "TANK", 1);
        let node = parse_record(XbeeProtocol::ZigBee, &record).unwrap();
        assert_eq!(node.addr16, Addr16::from_u16(0x1234));
        assert_eq!(node.addr64, Addr64::from_u64(0x0013_A200_4001_0203));
        assert_eq!(node.node_id.as_deref(), Some("TANK"));
        assert_eq!(node.role, Some(NodeRole::Router));
        assert_eq!(node.rssi, None);
    }

    #[test]
    fn parses_802_record_with_rssi() {
        let mut record = Vec::new();
        record.extend_from_slice(&0x0001_u16.to_be_bytes());
        record.extend_from_slice(&0x0013_A200_0000_0042_u64.to_be_bytes());
        record.push(0x28); // RSSI
        record.extend_from_slice(b"NODE1\0");

        let node = parse_record(XbeeProtocol::Raw802Dot15Dot4, &record).unwrap();
        assert_eq!(node.rssi, Some(0x28));
        assert_eq!(node.node_id.as_deref(), Some("NODE1"));
        assert_eq!(node.role, None);
    }

    #[test]
    fn short_records_are_errors() {
        assert!(parse_record(XbeeProtocol::ZigBee, &[0x00; 5]).is_err());
        // Node id present but fixed fields missing.
        let mut record = Vec::new();
        record.extend_from_slice(&[0x00; 10]);
        record.extend_from_slice(b"X\0");
        assert!(parse_record(XbeeProtocol::ZigBee, &record).is_err());
    }

    #[test]
    fn be_value_widths() {
        assert_eq!(be_value(&[0x14]), 20);
        assert_eq!(be_value(&[0x01, 0x00]), 256);
        assert_eq!(be_value(&[]), 0);
    }
}
