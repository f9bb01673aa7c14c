//! Scripted in-memory transport for exercising the full session stack.
//!
//! Tests install a responder closure that sees every write and queues
//! whatever bytes the "module" answers with; the reader task consumes
//! them exactly as it would a serial port. All timing runs on tokio's
//! paused clock.

#![allow(dead_code)] // not every test binary uses every helper

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use apiary_core::{
    proto::{codec, packet::AtCommandResponse, AtCmd, AtCommandStatus, OperatingMode, Packet},
    Transport, TransportError, TransportKind,
};
use bytes::Bytes;

/// Responder: called with each written chunk, returns raw byte chunks to
/// queue for reading.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

struct State {
    open: bool,
    rx: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    responder: Option<Responder>,
}

/// In-memory [`Transport`] with scripted responses.
pub struct MockTransport {
    state: Mutex<State>,
    data_ready: Notify,
    kind: TransportKind,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_kind(TransportKind::Serial)
    }

    pub fn with_kind(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                open: false,
                rx: VecDeque::new(),
                written: Vec::new(),
                responder: None,
            }),
            data_ready: Notify::new(),
            kind,
        })
    }

    pub fn with_responder(
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) -> Arc<Self> {
        let transport = Self::new();
        transport.set_responder(responder);
        transport
    }

    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) {
        self.state.lock().unwrap().responder = Some(Box::new(responder));
    }

    /// Queue bytes for the device to read, as if the module sent them.
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().unwrap().rx.extend(bytes);
        self.data_ready.notify_waiters();
    }

    /// Every chunk written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().written.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<(), TransportError> {
        self.state.lock().unwrap().open = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.lock().unwrap().open = false;
        self.data_ready.notify_waiters();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register for wakeups before checking state, so an inject
            // between check and await is not lost.
            let wakeup = self.data_ready.notified();
            tokio::pin!(wakeup);
            wakeup.as_mut().enable();
            {
                let mut state = self.state.lock().unwrap();
                if !state.open {
                    return Err(TransportError::Closed);
                }
                if !state.rx.is_empty() {
                    let n = buf.len().min(state.rx.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = state.rx.pop_front().unwrap_or_default();
                    }
                    return Ok(n);
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(0);
            }
            if tokio::time::timeout(remaining, wakeup).await.is_err() {
                return Ok(0);
            }
        }
    }

    async fn write_all(&self, buf: &[u8]) -> Result<(), TransportError> {
        let responses = {
            let mut state = self.state.lock().unwrap();
            if !state.open {
                return Err(TransportError::Closed);
            }
            state.written.push(buf.to_vec());
            match state.responder.as_mut() {
                Some(responder) => responder(buf),
                None => Vec::new(),
            }
        };
        if !responses.is_empty() {
            let mut state = self.state.lock().unwrap();
            for chunk in responses {
                state.rx.extend(chunk);
            }
            drop(state);
            self.data_ready.notify_waiters();
        }
        Ok(())
    }
}

/// Decode a written chunk back into a packet (plain API mode).
pub fn written_packet(chunk: &[u8]) -> Option<Packet> {
    let payload = codec::decode_frame(chunk, OperatingMode::Api).ok()?;
    Packet::parse(&payload).ok()
}

/// Frame a packet into plain-mode wire bytes.
pub fn frame(packet: &Packet) -> Vec<u8> {
    codec::encode_frame(&packet.serialize(), OperatingMode::Api)
        .map(|wire| wire.to_vec())
        .unwrap_or_default()
}

/// An OK AT response carrying `value`.
pub fn at_ok(frame_id: u8, command: [u8; 2], value: &[u8]) -> Vec<u8> {
    frame(&Packet::AtCommandResponse(AtCommandResponse {
        frame_id,
        command: AtCmd(command),
        status: AtCommandStatus::Ok,
        value: Bytes::copy_from_slice(value),
    }))
}

/// An errored AT response.
pub fn at_err(frame_id: u8, command: [u8; 2], status: AtCommandStatus) -> Vec<u8> {
    frame(&Packet::AtCommandResponse(AtCommandResponse {
        frame_id,
        command: AtCmd(command),
        status,
        value: Bytes::new(),
    }))
}

/// Identity registers of the scripted module.
#[derive(Clone, Copy)]
pub struct MockIdentity {
    pub hv: [u8; 2],
    pub vr: [u8; 2],
    /// Whether the module answers `MY` (protocols with 16-bit addressing).
    pub has_addr16: bool,
}

/// A ZigBee S2C module.
pub const ZIGBEE: MockIdentity =
    MockIdentity { hv: [0x21, 0x41], vr: [0x40, 0x5F], has_addr16: true };

/// A DigiMesh 900HP module.
pub const DIGIMESH: MockIdentity =
    MockIdentity { hv: [0x23, 0x00], vr: [0x80, 0x2B], has_addr16: false };

/// An 802.15.4 S1 module.
pub const RAW_802: MockIdentity =
    MockIdentity { hv: [0x17, 0x44], vr: [0x10, 0xE8], has_addr16: true };

/// Answer the open-handshake AT commands (`AP`, `SH`, `SL`, `NI`, `HV`,
/// `VR`, `MY`) for the given identity. Returns `None` for anything else
/// so tests can layer their own behavior on top.
pub fn handshake_response(identity: MockIdentity, request: &Packet) -> Option<Vec<u8>> {
    let Packet::AtCommand(cmd) = request else {
        return None;
    };
    let value: &[u8] = match &cmd.command.0 {
        b"AP" => &[0x01],
        b"SH" => &[0x00, 0x13, 0xA2, 0x00],
        b"SL" => &[0x40, 0x01, 0x02, 0x03],
        b"NI" => b"Route",
        b"HV" => &identity.hv,
        b"VR" => &identity.vr,
        b"MY" if identity.has_addr16 => &[0x12, 0x34],
        _ => return None,
    };
    Some(at_ok(cmd.frame_id, cmd.command.0, value))
}

/// Responder that completes the open handshake and delegates everything
/// else to `extra`.
pub fn device_responder(
    identity: MockIdentity,
    mut extra: impl FnMut(&Packet) -> Vec<Vec<u8>> + Send + 'static,
) -> impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static {
    move |chunk: &[u8]| {
        let Some(request) = written_packet(chunk) else {
            return Vec::new();
        };
        if let Some(response) = handshake_response(identity, &request) {
            return vec![response];
        }
        extra(&request)
    }
}
