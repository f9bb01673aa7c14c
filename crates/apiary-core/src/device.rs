//! Session object for an XBee module reached over a byte-stream transport.
//!
//! [`XbeeDevice`] owns the transport, the background reader task and the
//! shared session state. All methods take `&self`: the session is safe to
//! drive from concurrent tasks, with writes serialized at frame
//! granularity and synchronous requests correlated by frame id.
//!
//! # Open sequence
//!
//! ```text
//! ┌────────┐ open() ┌────────┐ reader up ┌───────────────┐ AP / +++ ┌──────┐
//! │ Closed │───────>│ Opening│──────────>│ Mode handshake│─────────>│ Open │
//! └────────┘        └────────┘           └───────────────┘          └──────┘
//!                                          │ Unknown / AT mode
//!                                          ↓
//!                                      InvalidMode, closed again
//! ```
//!
//! BLE transports skip the handshake (they are always API mode) and run
//! the authentication collaborator instead.

use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::debug;

use apiary_proto::{
    codec,
    packet::{
        AtCommand, AtCommandQueue, AtCommandResponse, ExplicitAddressing, RemoteAtCommand,
        RemoteAtCommandResponse, TransmitRequest, Tx16, Tx64, UserDataRelay,
        REMOTE_APPLY_CHANGES,
    },
    Addr16, Addr64, AtCmd, FrameType, IpProtocol, OperatingMode, Packet, RelayInterface,
    TransmitOptions,
};

use crate::{
    error::DeviceError,
    events::{Event, EventStream, ExplicitData, ReceivedData},
    network::{RemoteNode, XbeeNetwork},
    pending::PendingRequests,
    protocol::XbeeProtocol,
    queue::{PacketQueue, DEFAULT_QUEUE_CAPACITY},
    reader,
    transport::{BleAuthenticator, Transport, TransportKind},
};

/// Default window for synchronous request/response exchanges.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Silence required on the line before the `+++` escape sequence.
const COMMAND_MODE_GUARD: Duration = Duration::from_millis(1200);

/// Window in which a module in transparent mode answers `+++` with `OK\r`.
const COMMAND_MODE_WINDOW: Duration = Duration::from_millis(1500);

/// Wait for the modem-status frame confirming a local reset.
const RESET_TIMEOUT: Duration = Duration::from_millis(5000);

/// Delay after spawning the reader before the first exchange.
const READER_SETTLE: Duration = Duration::from_millis(10);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Window for synchronous request/response exchanges.
    pub receive_timeout: Duration,
    /// Whether parameter sets apply immediately (`AtCommand`) or queue
    /// until an explicit apply (`AtCommandQueue`).
    pub apply_changes: bool,
    /// Depth of the lookaside packet queue.
    pub queue_capacity: usize,
    /// Fail `open()` with `WrongProtocol` if the module's derived
    /// protocol is not this one.
    pub expected_protocol: Option<XbeeProtocol>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            apply_changes: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            expected_protocol: None,
        }
    }
}

/// Identity read from the module at open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// 64-bit address (`SH` + `SL`).
    pub addr64: Option<Addr64>,
    /// 16-bit address (`MY`), where the protocol has one.
    pub addr16: Option<Addr16>,
    /// Node identifier (`NI`).
    pub node_id: Option<String>,
    /// Hardware version (`HV`).
    pub hardware_version: Option<u16>,
    /// Firmware version (`VR`), leading zero bytes stripped.
    pub firmware_version: Option<Vec<u8>>,
    /// Protocol derived from the version registers.
    pub protocol: Option<XbeeProtocol>,
}

/// State shared between the device handle, the reader task and the
/// discovery engine.
pub(crate) struct SessionState {
    pub(crate) transport: Arc<dyn Transport>,
    mode: Mutex<OperatingMode>,
    pub(crate) queue: PacketQueue,
    pub(crate) pending: PendingRequests,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) network: XbeeNetwork,
    /// Wakes the reader for prompt exit.
    pub(crate) shutdown: Notify,
    /// Set while the session is closing; the reader checks it each pass.
    pub(crate) closing: AtomicBool,
    /// When installed, the reader forwards raw read bytes here (command
    /// mode probe).
    raw_tap: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl SessionState {
    pub(crate) fn mode(&self) -> OperatingMode {
        *self.mode.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn set_mode(&self, mode: OperatingMode) {
        *self.mode.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = mode;
    }

    pub(crate) fn install_raw_tap(&self, tap: mpsc::UnboundedSender<Bytes>) {
        *self.raw_tap.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tap);
    }

    pub(crate) fn clear_raw_tap(&self) {
        *self.raw_tap.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    /// Forward raw bytes to an installed tap, if any.
    pub(crate) fn tap_bytes(&self, bytes: &[u8]) {
        let tap = self.raw_tap.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(tap) = tap.as_ref() {
            let _ = tap.send(Bytes::copy_from_slice(bytes));
        }
    }

    /// Publish an event; nobody listening is fine.
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

/// A session with a locally attached XBee module.
pub struct XbeeDevice {
    state: Arc<SessionState>,
    config: DeviceConfig,
    /// Serializes the transport write path at frame granularity.
    write_gate: tokio::sync::Mutex<()>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Last allocated frame id; the allocator cycles 0x01..=0xFF.
    last_frame_id: AtomicU8,
    info: Mutex<DeviceInfo>,
    apply_changes: AtomicBool,
    opened: AtomicBool,
    authenticator: Option<Arc<dyn BleAuthenticator>>,
}

impl XbeeDevice {
    /// Create a session over `transport` with default configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, DeviceConfig::default())
    }

    /// Create a session with explicit configuration.
    #[must_use]
    pub fn with_config(transport: Arc<dyn Transport>, config: DeviceConfig) -> Self {
        let state = Arc::new(SessionState {
            transport,
            mode: Mutex::new(OperatingMode::Unknown),
            queue: PacketQueue::new(config.queue_capacity),
            pending: PendingRequests::default(),
            events: crate::events::channel(),
            network: XbeeNetwork::new(),
            shutdown: Notify::new(),
            closing: AtomicBool::new(false),
            raw_tap: Mutex::new(None),
        });
        Self {
            state,
            apply_changes: AtomicBool::new(config.apply_changes),
            config,
            write_gate: tokio::sync::Mutex::new(()),
            reader: Mutex::new(None),
            last_frame_id: AtomicU8::new(0),
            info: Mutex::new(DeviceInfo::default()),
            opened: AtomicBool::new(false),
            authenticator: None,
        }
    }

    /// Attach the Bluetooth authentication collaborator.
    ///
    /// Required before opening a BLE transport.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn BleAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Whether the session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Current operating mode.
    #[must_use]
    pub fn operating_mode(&self) -> OperatingMode {
        self.state.mode()
    }

    /// Identity read from the module at open.
    #[must_use]
    pub fn device_info(&self) -> DeviceInfo {
        self.info.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Protocol the module speaks, [`XbeeProtocol::Unknown`] before open.
    #[must_use]
    pub fn protocol(&self) -> XbeeProtocol {
        self.device_info().protocol.unwrap_or(XbeeProtocol::Unknown)
    }

    /// The registry of remote nodes known to this session.
    #[must_use]
    pub fn network(&self) -> &XbeeNetwork {
        &self.state.network
    }

    /// Subscribe to the session's event stream.
    #[must_use]
    pub fn events(&self) -> EventStream {
        EventStream::new(self.state.events.subscribe())
    }

    pub(crate) fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Open the session: transport, reader task, mode handshake, device
    /// info.
    ///
    /// # Errors
    ///
    /// - `DeviceError::AlreadyOpen` if the session is open.
    /// - `DeviceError::InvalidMode` if the module is in transparent mode
    ///   or its mode could not be determined. The session is closed
    ///   again in that case.
    /// - `DeviceError::AuthFailure` for BLE links without a working
    ///   authenticator.
    /// - `DeviceError::WrongProtocol` if the module contradicts
    ///   [`DeviceConfig::expected_protocol`].
    pub async fn open(&self) -> Result<(), DeviceError> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(DeviceError::AlreadyOpen);
        }

        match self.open_inner().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.shutdown().await;
                self.opened.store(false, Ordering::Release);
                Err(err)
            },
        }
    }

    async fn open_inner(&self) -> Result<(), DeviceError> {
        self.state.transport.open().await?;
        self.state.closing.store(false, Ordering::Release);

        let handle = reader::spawn(Arc::clone(&self.state));
        {
            let mut reader = self.reader.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *reader = Some(handle);
        }
        // Give the reader a beat to reach its first read before we
        // provoke any response.
        tokio::time::sleep(READER_SETTLE).await;

        if self.state.transport.kind() == TransportKind::Ble {
            // BLE modules always speak API mode; the link needs
            // authenticating instead of probing.
            self.state.set_mode(OperatingMode::Api);
            let authenticator = self.authenticator.as_ref().ok_or_else(|| {
                DeviceError::AuthFailure("no authenticator configured for BLE transport".into())
            })?;
            let keys = authenticator.authenticate().await?;
            self.state.transport.set_encryption_keys(keys).map_err(DeviceError::from)?;
        } else if self.state.mode() == OperatingMode::Unknown {
            let mode = self.determine_operating_mode().await?;
            if !mode.supports_api_frames() {
                return Err(DeviceError::InvalidMode(mode));
            }
        }

        self.read_device_info().await?;
        debug!(info = ?self.device_info(), "session open");
        Ok(())
    }

    /// Close the session: stop the reader, fail pending waiters, close
    /// the transport. Idempotent.
    pub async fn close(&self) -> Result<(), DeviceError> {
        if !self.opened.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        self.state.closing.store(true, Ordering::Release);
        self.state.shutdown.notify_waiters();

        let handle = {
            let mut reader = self.reader.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            reader.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.state.pending.close();
        if let Err(err) = self.state.transport.close().await {
            debug!(error = %err, "transport close failed");
        }
        self.state.set_mode(OperatingMode::Unknown);
    }

    // Frame ids ---------------------------------------------------------

    /// Allocate the next frame id, cycling `0x01..=0xFF`.
    ///
    /// `0x00` is never produced: it would suppress the response frame.
    pub(crate) fn alloc_frame_id(&self) -> u8 {
        let previous = self
            .last_frame_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id >= 0xFF { 0x01 } else { id + 1 })
            });
        match previous {
            Ok(id) | Err(id) => {
                if id >= 0xFF {
                    0x01
                } else {
                    id + 1
                }
            },
        }
    }

    // Send paths --------------------------------------------------------

    /// Serialize and write a packet without waiting for any response.
    ///
    /// # Errors
    ///
    /// - `DeviceError::InvalidMode` unless the mode is API or API-escaped.
    /// - `DeviceError::InterfaceClosed` once the transport is closed.
    pub async fn send_packet(&self, packet: &Packet) -> Result<(), DeviceError> {
        self.write_payload(&packet.serialize()).await
    }

    async fn write_payload(&self, payload: &Bytes) -> Result<(), DeviceError> {
        if !self.is_open() {
            return Err(DeviceError::InterfaceClosed);
        }
        let mode = self.state.mode();
        if !mode.supports_api_frames() {
            return Err(DeviceError::InvalidMode(mode));
        }
        let wire = codec::encode_frame(payload, mode)?;
        let _gate = self.write_gate.lock().await;
        self.state.transport.write_all(&wire).await.map_err(DeviceError::from)
    }

    /// Send a packet and wait for its correlated response.
    ///
    /// Packets without a frame id (or with id 0, which suppresses the
    /// response) degrade to [`send_packet`](Self::send_packet) and return
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - `DeviceError::Timeout` if no matching response arrives within
    ///   the configured receive timeout.
    /// - `DeviceError::InterfaceClosed` if the session closes while
    ///   waiting.
    pub async fn send_packet_sync(&self, packet: &Packet) -> Result<Option<Packet>, DeviceError> {
        let expected = expected_response(packet);
        let frame_id = packet.frame_id().filter(|id| *id != 0);

        let (Some((response_type, command)), Some(frame_id)) = (expected, frame_id) else {
            self.send_packet(packet).await?;
            return Ok(None);
        };

        let payload = packet.serialize();
        let handle = self
            .state
            .pending
            .register(frame_id, response_type, command, payload.clone())
            .ok_or(DeviceError::InterfaceClosed)?;

        if let Err(err) = self.write_payload(&payload).await {
            self.state.pending.remove(handle.frame_id, handle.token);
            return Err(err);
        }

        let timeout = self.config.receive_timeout;
        let (frame_id, token) = (handle.frame_id, handle.token);
        match tokio::time::timeout(timeout, handle.rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_closed)) => Err(DeviceError::InterfaceClosed),
            Err(_elapsed) => {
                self.state.pending.remove(frame_id, token);
                Err(DeviceError::Timeout(timeout))
            },
        }
    }

    /// Send a transmit request and verify its transmit status.
    ///
    /// # Errors
    ///
    /// - `DeviceError::TransmitFailed` unless the status is success or
    ///   self-addressed.
    pub async fn send_and_check(&self, packet: &Packet) -> Result<(), DeviceError> {
        match self.send_packet_sync(packet).await? {
            Some(Packet::TransmitStatus(status)) if !status.delivery.is_success() => {
                Err(DeviceError::TransmitFailed(status.delivery))
            },
            Some(Packet::TxStatus(status)) if !status.delivery.is_success() => {
                Err(DeviceError::TransmitFailed(status.delivery))
            },
            _ => Ok(()),
        }
    }

    // AT parameter surface ----------------------------------------------

    async fn at_request(
        &self,
        command: AtCmd,
        parameter: Bytes,
        queued: bool,
    ) -> Result<AtCommandResponse, DeviceError> {
        let frame_id = self.alloc_frame_id();
        let packet = if queued {
            Packet::AtCommandQueue(AtCommandQueue { frame_id, command, parameter })
        } else {
            Packet::AtCommand(AtCommand { frame_id, command, parameter })
        };

        match self.send_packet_sync(&packet).await? {
            Some(Packet::AtCommandResponse(response)) => {
                if response.status.is_ok() {
                    Ok(response)
                } else {
                    Err(DeviceError::AtCommand { command, status: response.status })
                }
            },
            // The correlation table only completes AT requests with AT
            // responses, and the frame id is never 0 here.
            _ => unreachable!("AT exchange resolved with non-AT packet"),
        }
    }

    /// Read a parameter. The response must carry a value.
    ///
    /// # Errors
    ///
    /// - `DeviceError::AtCommand` on a non-OK status.
    /// - `DeviceError::AtCommandEmpty` when the module answers OK with no
    ///   value.
    pub async fn get_parameter(&self, command: AtCmd) -> Result<Bytes, DeviceError> {
        let response = self.at_request(command, Bytes::new(), false).await?;
        if response.value.is_empty() {
            return Err(DeviceError::AtCommandEmpty(command));
        }
        Ok(response.value)
    }

    /// Write a parameter.
    ///
    /// Respects the apply-changes flag: with it cleared the set is queued
    /// until [`apply_configuration_changes`](Self::apply_configuration_changes).
    pub async fn set_parameter(
        &self,
        command: AtCmd,
        value: impl Into<Bytes>,
    ) -> Result<(), DeviceError> {
        let value = value.into();
        let is_ni = command == AtCmd(*b"NI");
        if is_ni && value.len() > 20 {
            return Err(DeviceError::InvalidArgument("node identifier exceeds 20 characters"));
        }

        let queued = !self.apply_changes_enabled();
        self.at_request(command, value.clone(), queued).await?;

        // Keep the cached identity in step with the module.
        if is_ni {
            let mut info = self.info.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            info.node_id = Some(String::from_utf8_lossy(&value).into_owned());
        }
        Ok(())
    }

    /// Execute a parameterless command, ignoring any returned value.
    pub async fn execute_command(&self, command: AtCmd) -> Result<(), DeviceError> {
        self.at_request(command, Bytes::new(), false).await.map(|_| ())
    }

    /// Whether parameter sets apply immediately.
    #[must_use]
    pub fn apply_changes_enabled(&self) -> bool {
        self.apply_changes.load(Ordering::Acquire)
    }

    /// Choose between immediate and queued parameter sets.
    pub fn set_apply_changes_enabled(&self, enabled: bool) {
        self.apply_changes.store(enabled, Ordering::Release);
    }

    /// Apply queued configuration changes (`AC`).
    pub async fn apply_configuration_changes(&self) -> Result<(), DeviceError> {
        self.execute_command(AtCmd(*b"AC")).await
    }

    /// Persist the configuration to non-volatile memory (`WR`).
    pub async fn write_changes(&self) -> Result<(), DeviceError> {
        self.execute_command(AtCmd(*b"WR")).await
    }

    /// Restore factory defaults (`RE`).
    pub async fn restore_defaults(&self) -> Result<(), DeviceError> {
        self.execute_command(AtCmd(*b"RE")).await
    }

    /// Signal strength of the last received packet, in -dBm (`DB`).
    pub async fn read_signal_strength(&self) -> Result<u8, DeviceError> {
        let value = self.get_parameter(AtCmd(*b"DB")).await?;
        Ok(value[0])
    }

    /// Set the destination address pair (`DH`/`DL`) atomically.
    ///
    /// The two registers are queued together and applied with a single
    /// `AC`, so no frame can be transmitted with a half-updated
    /// destination. The apply-changes flag is restored on every path.
    pub async fn set_destination_address(&self, addr: Addr64) -> Result<(), DeviceError> {
        let restore = self.apply_changes_enabled();
        self.set_apply_changes_enabled(false);
        let result = self.set_destination_inner(addr).await;
        self.set_apply_changes_enabled(restore);
        result
    }

    async fn set_destination_inner(&self, addr: Addr64) -> Result<(), DeviceError> {
        let bytes = addr.as_bytes();
        self.set_parameter(AtCmd(*b"DH"), Bytes::copy_from_slice(&bytes[..4])).await?;
        self.set_parameter(AtCmd(*b"DL"), Bytes::copy_from_slice(&bytes[4..])).await?;
        self.apply_configuration_changes().await
    }

    // Remote AT commands ------------------------------------------------

    async fn remote_at_request(
        &self,
        remote: &RemoteNode,
        command: AtCmd,
        parameter: Bytes,
    ) -> Result<RemoteAtCommandResponse, DeviceError> {
        let options = if self.apply_changes_enabled() { REMOTE_APPLY_CHANGES } else { 0 };
        let packet = Packet::RemoteAtCommand(RemoteAtCommand {
            frame_id: self.alloc_frame_id(),
            dest64: remote.addr64,
            dest16: remote.addr16,
            options,
            command,
            parameter,
        });

        match self.send_packet_sync(&packet).await? {
            Some(Packet::RemoteAtCommandResponse(response)) => {
                if response.status.is_ok() {
                    Ok(response)
                } else {
                    Err(DeviceError::AtCommand { command, status: response.status })
                }
            },
            _ => unreachable!("remote AT exchange resolved with non-matching packet"),
        }
    }

    /// Read a parameter on a remote node.
    pub async fn get_remote_parameter(
        &self,
        remote: &RemoteNode,
        command: AtCmd,
    ) -> Result<Bytes, DeviceError> {
        let response = self.remote_at_request(remote, command, Bytes::new()).await?;
        if response.value.is_empty() {
            return Err(DeviceError::AtCommandEmpty(command));
        }
        Ok(response.value)
    }

    /// Write a parameter on a remote node.
    pub async fn set_remote_parameter(
        &self,
        remote: &RemoteNode,
        command: AtCmd,
        value: impl Into<Bytes>,
    ) -> Result<(), DeviceError> {
        self.remote_at_request(remote, command, value.into()).await.map(|_| ())
    }

    /// Execute a parameterless command on a remote node.
    pub async fn execute_remote_command(
        &self,
        remote: &RemoteNode,
        command: AtCmd,
    ) -> Result<(), DeviceError> {
        self.remote_at_request(remote, command, Bytes::new()).await.map(|_| ())
    }

    // Reset -------------------------------------------------------------

    /// Software-reset the local module (`FR`) and wait for the modem
    /// status frame confirming it came back.
    pub async fn reset(&self) -> Result<(), DeviceError> {
        // Subscribe before issuing the command so the status frame cannot
        // slip past between send and wait.
        let mut events = self.events();
        self.execute_command(AtCmd(*b"FR")).await?;

        events
            .recv_matching(RESET_TIMEOUT, |event| match event {
                Event::ModemStatusReceived(status) if status.is_reset() => Some(()),
                _ => None,
            })
            .await
            .ok_or(DeviceError::Timeout(RESET_TIMEOUT))
    }

    /// Software-reset a remote node.
    ///
    /// Best-effort on 802.15.4: those modules reset without answering, so
    /// a missing reply counts as success.
    pub async fn reset_remote(&self, remote: &RemoteNode) -> Result<(), DeviceError> {
        match self.remote_at_request(remote, AtCmd(*b"FR"), Bytes::new()).await {
            Ok(_) => Ok(()),
            Err(DeviceError::Timeout(_))
                if self.protocol() == XbeeProtocol::Raw802Dot15Dot4 =>
            {
                Ok(())
            },
            Err(err) => Err(err),
        }
    }

    // Data plane --------------------------------------------------------

    /// Pick the wire frame for this module's protocol and destination.
    fn build_transmit(&self, dest64: Addr64, dest16: Addr16, data: &[u8]) -> Packet {
        let frame_id = self.alloc_frame_id();
        if self.protocol() == XbeeProtocol::Raw802Dot15Dot4 {
            // 802.15.4 modules predate the dual-addressed transmit frame.
            if dest64.is_unknown() {
                Packet::Tx16(Tx16 {
                    frame_id,
                    dest: dest16,
                    options: TransmitOptions::NONE,
                    data: Bytes::copy_from_slice(data),
                })
            } else {
                Packet::Tx64(Tx64 {
                    frame_id,
                    dest: dest64,
                    options: TransmitOptions::NONE,
                    data: Bytes::copy_from_slice(data),
                })
            }
        } else {
            Packet::TransmitRequest(TransmitRequest::unicast(
                frame_id,
                dest64,
                dest16,
                Bytes::copy_from_slice(data),
            ))
        }
    }

    /// Send data to a remote node, verifying delivery.
    pub async fn send_data(&self, remote: &RemoteNode, data: &[u8]) -> Result<(), DeviceError> {
        let packet = self.build_transmit(remote.addr64, remote.addr16, data);
        self.send_and_check(&packet).await
    }

    /// Send data to a 64-bit address, verifying delivery.
    pub async fn send_data_to(&self, dest: Addr64, data: &[u8]) -> Result<(), DeviceError> {
        let packet = self.build_transmit(dest, Addr16::UNKNOWN, data);
        self.send_and_check(&packet).await
    }

    /// Broadcast data to every node on the network.
    pub async fn send_data_broadcast(&self, data: &[u8]) -> Result<(), DeviceError> {
        let packet = self.build_transmit(Addr64::BROADCAST, Addr16::BROADCAST, data);
        self.send_and_check(&packet).await
    }

    /// Send data with explicit application-layer addressing.
    ///
    /// # Errors
    ///
    /// - `DeviceError::OperationNotSupported` on 802.15.4 modules, whose
    ///   firmware has no explicit-addressing frame.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_explicit_data(
        &self,
        remote: &RemoteNode,
        src_endpoint: u8,
        dst_endpoint: u8,
        cluster_id: u16,
        profile_id: u16,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        if self.protocol() == XbeeProtocol::Raw802Dot15Dot4 {
            return Err(DeviceError::OperationNotSupported(
                "explicit addressing is not available on 802.15.4",
            ));
        }
        let packet = Packet::ExplicitAddressing(ExplicitAddressing {
            frame_id: self.alloc_frame_id(),
            dest64: remote.addr64,
            dest16: remote.addr16,
            src_endpoint,
            dst_endpoint,
            cluster_id,
            profile_id,
            broadcast_radius: 0,
            options: TransmitOptions::NONE,
            data: Bytes::copy_from_slice(data),
        });
        self.send_and_check(&packet).await
    }

    /// Relay bytes to one of the module's local interfaces.
    ///
    /// Fire-and-forget: the radio generates no status for relay frames.
    pub async fn send_user_data_relay(
        &self,
        dest: RelayInterface,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let packet = Packet::UserDataRelay(UserDataRelay::new(
            self.alloc_frame_id(),
            dest,
            Bytes::copy_from_slice(data),
        )?);
        self.send_packet(&packet).await
    }

    /// Relay bytes to the Bluetooth interface.
    pub async fn send_bluetooth_data(&self, data: &[u8]) -> Result<(), DeviceError> {
        self.send_user_data_relay(RelayInterface::Bluetooth, data).await
    }

    /// Relay bytes to the MicroPython interpreter.
    pub async fn send_micropython_data(&self, data: &[u8]) -> Result<(), DeviceError> {
        self.send_user_data_relay(RelayInterface::MicroPython, data).await
    }

    /// Relay bytes to the serial interface.
    pub async fn send_serial_data(&self, data: &[u8]) -> Result<(), DeviceError> {
        self.send_user_data_relay(RelayInterface::Serial, data).await
    }

    /// Send data over IPv4 (Wi-Fi / cellular modules), verifying
    /// delivery.
    pub async fn send_ip_data(
        &self,
        dest: std::net::Ipv4Addr,
        dest_port: u16,
        protocol: IpProtocol,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let packet = Packet::TxIpv4(apiary_proto::packet::TxIpv4 {
            frame_id: self.alloc_frame_id(),
            dest,
            dest_port,
            src_port: 0,
            protocol,
            options: 0,
            data: Bytes::copy_from_slice(data),
        });
        self.send_and_check(&packet).await
    }

    /// Send an SMS (cellular modules), verifying delivery.
    pub async fn send_sms(&self, phone_number: &str, message: &[u8]) -> Result<(), DeviceError> {
        let packet = Packet::TxSms(apiary_proto::packet::TxSms::new(
            self.alloc_frame_id(),
            phone_number,
            Bytes::copy_from_slice(message),
        )?);
        self.send_and_check(&packet).await
    }

    // Blocking reads ----------------------------------------------------

    /// Next received data packet, waiting up to `timeout`.
    pub async fn read_data(&self, timeout: Duration) -> Option<ReceivedData> {
        self.state.queue.first_data_packet(timeout).await.and_then(received_data)
    }

    /// Next received data packet from `source`, waiting up to `timeout`.
    pub async fn read_data_from(&self, source: Addr64, timeout: Duration) -> Option<ReceivedData> {
        self.state.queue.first_data_packet_from(source, timeout).await.and_then(received_data)
    }

    /// Next explicit-addressing data packet, waiting up to `timeout`.
    pub async fn read_explicit_data(&self, timeout: Duration) -> Option<ExplicitData> {
        self.state.queue.first_explicit_data_packet(timeout).await.and_then(|packet| {
            match packet {
                Packet::ExplicitRx(rx) => Some(ExplicitData {
                    source64: rx.source64,
                    source16: rx.source16,
                    src_endpoint: rx.src_endpoint,
                    dst_endpoint: rx.dst_endpoint,
                    cluster_id: rx.cluster_id,
                    profile_id: rx.profile_id,
                    is_broadcast: rx.options.is_broadcast(),
                    data: rx.data,
                }),
                _ => None,
            }
        })
    }

    /// Next user data relay payload, waiting up to `timeout`.
    pub async fn read_user_data_relay(
        &self,
        timeout: Duration,
    ) -> Option<(RelayInterface, Bytes)> {
        self.state.queue.first_user_data_relay_packet(timeout).await.and_then(|packet| {
            match packet {
                Packet::UserDataRelayOutput(relay) => Some((relay.source, relay.data)),
                _ => None,
            }
        })
    }

    /// Next IPv4 payload, waiting up to `timeout`.
    pub async fn read_ip_data(&self, timeout: Duration) -> Option<crate::events::IpData> {
        self.state.queue.first_ip_data_packet(timeout).await.and_then(|packet| match packet {
            Packet::RxIpv4(rx) => Some(crate::events::IpData {
                source: rx.source,
                dest_port: rx.dest_port,
                src_port: rx.src_port,
                data: rx.data,
            }),
            _ => None,
        })
    }

    // Mode handshake ----------------------------------------------------

    /// Determine how the module's serial interface is configured.
    ///
    /// Optimistically assumes API mode and queries `AP`; the query frame
    /// contains no reserved bytes, so it reaches a module in either API
    /// variant intact. On silence, falls back to the transparent-mode
    /// probe (`+++` framed by guard silence).
    async fn determine_operating_mode(&self) -> Result<OperatingMode, DeviceError> {
        self.state.set_mode(OperatingMode::Api);
        let query = Packet::AtCommand(AtCommand::query(self.alloc_frame_id(), AtCmd(*b"AP")));

        match self.send_packet_sync(&query).await {
            Ok(Some(Packet::AtCommandResponse(response))) => {
                let mode = if response.value.first() == Some(&2) {
                    OperatingMode::ApiEscape
                } else {
                    OperatingMode::Api
                };
                self.state.set_mode(mode);
                debug!(?mode, "operating mode determined");
                Ok(mode)
            },
            Ok(_) => unreachable!("AP exchange resolved with non-AT packet"),
            Err(DeviceError::Timeout(_)) => {
                debug!("AP query silent, probing for command mode");
                let mode = if self.probe_command_mode().await? {
                    OperatingMode::At
                } else {
                    OperatingMode::Unknown
                };
                self.state.set_mode(mode);
                Ok(mode)
            },
            Err(err) => Err(err),
        }
    }

    /// Probe for transparent mode with the `+++` escape sequence.
    ///
    /// Holds the write gate for the whole probe: any interleaved write
    /// would break the guard silence the module measures.
    async fn probe_command_mode(&self) -> Result<bool, DeviceError> {
        let gate = self.write_gate.lock().await;

        let (tap_tx, mut tap_rx) = mpsc::unbounded_channel();
        self.state.install_raw_tap(tap_tx);

        tokio::time::sleep(COMMAND_MODE_GUARD).await;
        // Bytes that arrived during the guard are not part of the answer.
        while tap_rx.try_recv().is_ok() {}

        let result: Result<bool, DeviceError> = async {
            self.state.transport.write_all(b"+++").await?;

            let deadline = tokio::time::Instant::now() + COMMAND_MODE_WINDOW;
            let mut answer: Vec<u8> = Vec::new();
            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    return Ok(false);
                }
                match tokio::time::timeout(remaining, tap_rx.recv()).await {
                    Ok(Some(chunk)) => {
                        answer.extend_from_slice(&chunk);
                        if answer.windows(3).any(|window| window == b"OK\r") {
                            return Ok(true);
                        }
                    },
                    Ok(None) | Err(_) => return Ok(false),
                }
            }
        }
        .await;

        self.state.clear_raw_tap();
        drop(gate);
        result.map_err(DeviceError::from)
    }

    // Device info -------------------------------------------------------

    /// Read the module's identity registers.
    async fn read_device_info(&self) -> Result<(), DeviceError> {
        let addr64 = {
            let known = self.device_info().addr64;
            match known {
                Some(addr) => addr,
                None => {
                    let sh = self.get_parameter(AtCmd(*b"SH")).await?;
                    let sl = self.get_parameter(AtCmd(*b"SL")).await?;
                    join_addr64(&sh, &sl)?
                },
            }
        };

        // NI may legitimately be empty, so this skips get_parameter's
        // empty-value check.
        let ni = self.at_request(AtCmd(*b"NI"), Bytes::new(), false).await?;
        let node_id = String::from_utf8_lossy(&ni.value).into_owned();

        let hv = self.get_parameter(AtCmd(*b"HV")).await?;
        let hardware_version = match hv.len() {
            1 => u16::from(hv[0]),
            _ => u16::from_be_bytes([hv[0], hv[1]]),
        };

        let vr = self.get_parameter(AtCmd(*b"VR")).await?;
        let firmware: Vec<u8> = {
            let stripped: Vec<u8> =
                vr.iter().copied().skip_while(|byte| *byte == 0).collect();
            if stripped.is_empty() { vec![0] } else { stripped }
        };

        let protocol = XbeeProtocol::determine(hardware_version, &firmware);
        if let Some(expected) = self.config.expected_protocol {
            if protocol != expected {
                return Err(DeviceError::WrongProtocol { expected, found: protocol });
            }
        }

        // DigiMesh and point-to-multipoint have no 16-bit address; asking
        // would only earn an error status.
        let addr16 = if protocol.supports_16bit_addressing() {
            let my = self.get_parameter(AtCmd(*b"MY")).await?;
            let addr = if my.len() >= 2 {
                Addr16::new([my[0], my[1]])
            } else {
                Addr16::UNKNOWN
            };
            Some(addr)
        } else {
            None
        };

        let mut info = self.info.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        info.addr64 = Some(addr64);
        info.addr16 = addr16;
        info.node_id = Some(node_id);
        info.hardware_version = Some(hardware_version);
        info.firmware_version = Some(firmware);
        info.protocol = Some(protocol);
        Ok(())
    }
}

impl std::fmt::Debug for XbeeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XbeeDevice")
            .field("open", &self.is_open())
            .field("mode", &self.state.mode())
            .field("info", &self.device_info())
            .finish_non_exhaustive()
    }
}

/// Map a request to the response frame type (and AT name) that completes
/// it; `None` means the packet has no correlated response.
fn expected_response(packet: &Packet) -> Option<(FrameType, Option<AtCmd>)> {
    match packet {
        Packet::AtCommand(p) => Some((FrameType::AtResponse, Some(p.command))),
        Packet::AtCommandQueue(p) => Some((FrameType::AtResponse, Some(p.command))),
        Packet::RemoteAtCommand(p) => Some((FrameType::RemoteAtResponse, Some(p.command))),
        Packet::TransmitRequest(_) | Packet::ExplicitAddressing(_) => {
            Some((FrameType::TransmitStatus, None))
        },
        Packet::Tx64(_) | Packet::Tx16(_) | Packet::TxIpv4(_) | Packet::TxSms(_) => {
            Some((FrameType::TxStatus, None))
        },
        _ => None,
    }
}

/// Combine the `SH`/`SL` register values into a 64-bit address.
fn join_addr64(sh: &[u8], sl: &[u8]) -> Result<Addr64, DeviceError> {
    if sh.len() > 4 || sl.len() > 4 {
        return Err(DeviceError::InvalidArgument("SH/SL register longer than 4 bytes"));
    }
    let mut bytes = [0u8; 8];
    bytes[4 - sh.len()..4].copy_from_slice(sh);
    bytes[8 - sl.len()..8].copy_from_slice(sl);
    Ok(Addr64::new(bytes))
}

/// View a queued packet as received application data.
fn received_data(packet: Packet) -> Option<ReceivedData> {
    match packet {
        Packet::Receive(rx) => Some(ReceivedData {
            source64: rx.source64,
            source16: rx.source16,
            is_broadcast: rx.options.is_broadcast(),
            data: rx.data,
        }),
        Packet::Rx64(rx) => Some(ReceivedData {
            source64: rx.source,
            source16: Addr16::UNKNOWN,
            is_broadcast: rx.options.is_broadcast(),
            data: rx.data,
        }),
        Packet::Rx16(rx) => Some(ReceivedData {
            source64: Addr64::UNKNOWN,
            source16: rx.source,
            is_broadcast: rx.options.is_broadcast(),
            data: rx.data,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;

    #[async_trait::async_trait]
    impl Transport for NullTransport {
        async fn open(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            true
        }
        fn kind(&self) -> TransportKind {
            TransportKind::Serial
        }
        async fn read(
            &self,
            _buf: &mut [u8],
            timeout: Duration,
        ) -> Result<usize, crate::error::TransportError> {
            tokio::time::sleep(timeout).await;
            Ok(0)
        }
        async fn write_all(&self, _buf: &[u8]) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn frame_id_wraps_skipping_zero() {
        let device = XbeeDevice::new(Arc::new(NullTransport));

        assert_eq!(device.alloc_frame_id(), 0x01);
        device.last_frame_id.store(0xFE, Ordering::Relaxed);
        assert_eq!(device.alloc_frame_id(), 0xFF);
        // Wrap: 0xFF -> 0x01, never 0x00.
        assert_eq!(device.alloc_frame_id(), 0x01);
    }

    #[test]
    fn frame_ids_cycle_all_255_values() {
        let device = XbeeDevice::new(Arc::new(NullTransport));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..255 {
            seen.insert(device.alloc_frame_id());
        }
        assert_eq!(seen.len(), 255);
        assert!(!seen.contains(&0x00));
    }

    #[test]
    fn join_addr64_pads_short_registers() {
        let addr = join_addr64(&[0x13, 0xA2, 0x00], &[0x40, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(addr, Addr64::from_u64(0x0013_A200_4001_0203));
        assert!(join_addr64(&[0u8; 5], &[]).is_err());
    }

    #[tokio::test]
    async fn send_on_unopened_session_is_interface_closed() {
        let device = XbeeDevice::new(Arc::new(NullTransport));
        let packet =
            Packet::AtCommand(AtCommand::query(device.alloc_frame_id(), AtCmd(*b"NI")));
        let err = device.send_packet(&packet).await.unwrap_err();
        assert!(matches!(err, DeviceError::InterfaceClosed));
    }

    #[test]
    fn expected_response_table() {
        let at = Packet::AtCommand(AtCommand::query(1, AtCmd(*b"NI")));
        assert_eq!(
            expected_response(&at),
            Some((FrameType::AtResponse, Some(AtCmd(*b"NI"))))
        );

        let tx = Packet::TransmitRequest(TransmitRequest::unicast(
            1,
            Addr64::BROADCAST,
            Addr16::BROADCAST,
            Bytes::new(),
        ));
        assert_eq!(expected_response(&tx), Some((FrameType::TransmitStatus, None)));

        let status = Packet::ModemStatus(apiary_proto::packet::ModemStatusPacket {
            status: apiary_proto::ModemStatus::Associated,
        });
        assert_eq!(expected_response(&status), None);
    }
}
