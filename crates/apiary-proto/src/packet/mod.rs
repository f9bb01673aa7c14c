//! Typed packet model.
//!
//! [`Packet`] is a tagged union over every API frame type the engine
//! speaks. The frame-type byte in the payload identifies the variant, so
//! no additional discriminant is serialized. Parsing dispatches on that
//! byte; frame types this library does not know are preserved as
//! [`Packet::Unknown`] rather than dropped, so a consumer still sees them
//! in arrival order.
//!
//! # Invariants
//!
//! - Each variant maps to exactly one [`FrameType`] (enforced by match
//!   exhaustiveness in `frame_type()`, `serialize()` and `parse()`).
//! - `parse(serialize(p)) == p` for every packet (round-trip property
//!   tests live in `tests/packet_roundtrip.rs`).

mod at;
mod io_sample;
mod ip;
mod relay;
mod rx;
mod tx;

use std::{fmt, str::FromStr};

use bytes::{BufMut, Bytes, BytesMut};

pub use at::{
    AtCommand, AtCommandQueue, AtCommandResponse, RemoteAtCommand, RemoteAtCommandResponse,
    REMOTE_APPLY_CHANGES,
};
pub use io_sample::IoSample;
pub use ip::{RxIpv4, RxSms, TxIpv4, TxSms, PHONE_NUMBER_LEN};
pub use relay::{UserDataRelay, UserDataRelayOutput, MAX_RELAY_DATA_LEN};
pub use rx::{
    ExplicitRx, IoSampleRx, ModemStatusPacket, ReceivePacket, Rx16, Rx16Io, Rx64, Rx64Io,
};
pub use tx::{ExplicitAddressing, TransmitRequest, TransmitStatus, Tx16, Tx64, TxStatus};

use crate::{
    address::{Addr16, Addr64},
    errors::{ProtocolError, Result},
    types::FrameType,
};

/// Two-letter AT command name.
///
/// Stored as raw ASCII bytes; comparison for response matching is
/// case-insensitive ([`AtCmd::matches`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtCmd(pub [u8; 2]);

impl AtCmd {
    /// Case-insensitive comparison, as used when correlating a response
    /// with its request.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for AtCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{:02X}{:02X}", self.0[0], self.0[1]),
        }
    }
}

impl FromStr for AtCmd {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 2] = s
            .as_bytes()
            .try_into()
            .map_err(|_| ProtocolError::InvalidArgument("AT command must be two characters"))?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 2]> for AtCmd {
    fn from(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }
}

/// Sequential reader over a frame body with malformed-packet errors.
///
/// All multi-byte fields in the protocol are big-endian.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    frame_type: u8,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(frame_type: u8, buf: &'a [u8]) -> Self {
        Self { buf, frame_type }
    }

    fn malformed(&self, reason: &'static str) -> ProtocolError {
        ProtocolError::MalformedPacket { frame_type: self.frame_type, reason }
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8> {
        let (&first, rest) = self.buf.split_first().ok_or_else(|| self.malformed(what))?;
        self.buf = rest;
        Ok(first)
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(self.malformed(what));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    pub(crate) fn addr64(&mut self) -> Result<Addr64> {
        let bytes = self.take(Addr64::LEN, "missing 64-bit address")?;
        Addr64::from_slice(bytes)
    }

    pub(crate) fn addr16(&mut self) -> Result<Addr16> {
        let bytes = self.take(Addr16::LEN, "missing 16-bit address")?;
        Addr16::from_slice(bytes)
    }

    pub(crate) fn at_cmd(&mut self) -> Result<AtCmd> {
        let bytes = self.take(2, "missing AT command name")?;
        Ok(AtCmd([bytes[0], bytes[1]]))
    }

    /// Remaining bytes as the variable-length tail field.
    pub(crate) fn rest(&mut self) -> Bytes {
        let tail = Bytes::copy_from_slice(self.buf);
        self.buf = &[];
        tail
    }
}

/// A payload this library has no typed representation for.
///
/// Carried through the queue and event stream untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPacket {
    /// Unrecognized frame type byte.
    pub frame_type: u8,
    /// Body bytes after the frame type.
    pub body: Bytes,
}

/// Tagged union over all API frame types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Local AT command request (0x08).
    AtCommand(AtCommand),
    /// Queued local AT command request (0x09).
    AtCommandQueue(AtCommandQueue),
    /// Local AT command response (0x88).
    AtCommandResponse(AtCommandResponse),
    /// Remote AT command request (0x17).
    RemoteAtCommand(RemoteAtCommand),
    /// Remote AT command response (0x97).
    RemoteAtCommandResponse(RemoteAtCommandResponse),
    /// Transmit request (0x10).
    TransmitRequest(TransmitRequest),
    /// Explicit addressing transmit request (0x11).
    ExplicitAddressing(ExplicitAddressing),
    /// Legacy 64-bit transmit request (0x00).
    Tx64(Tx64),
    /// Legacy 16-bit transmit request (0x01).
    Tx16(Tx16),
    /// Transmit status (0x8B).
    TransmitStatus(TransmitStatus),
    /// Legacy transmit status (0x89).
    TxStatus(TxStatus),
    /// Receive indicator (0x90).
    Receive(ReceivePacket),
    /// Legacy 64-bit receive indicator (0x80).
    Rx64(Rx64),
    /// Legacy 16-bit receive indicator (0x81).
    Rx16(Rx16),
    /// Explicit addressing receive indicator (0x91).
    ExplicitRx(ExplicitRx),
    /// I/O sample indicator (0x92).
    IoSampleRx(IoSampleRx),
    /// Legacy 64-bit I/O sample indicator (0x82).
    Rx64Io(Rx64Io),
    /// Legacy 16-bit I/O sample indicator (0x83).
    Rx16Io(Rx16Io),
    /// Modem status indicator (0x8A).
    ModemStatus(ModemStatusPacket),
    /// User data relay request (0x2D).
    UserDataRelay(UserDataRelay),
    /// User data relay output (0xAD).
    UserDataRelayOutput(UserDataRelayOutput),
    /// IPv4 transmit request (0x20).
    TxIpv4(TxIpv4),
    /// IPv4 receive indicator (0xB0).
    RxIpv4(RxIpv4),
    /// SMS transmit request (0x1F).
    TxSms(TxSms),
    /// SMS receive indicator (0x9F).
    RxSms(RxSms),
    /// Unrecognized frame type, preserved verbatim.
    Unknown(UnknownPacket),
}

impl Packet {
    /// Frame type of this packet, or the raw byte for unknown packets.
    #[must_use]
    pub fn frame_type_byte(&self) -> u8 {
        match self {
            Self::Unknown(p) => p.frame_type,
            other => {
                // INVARIANT: every known variant has a FrameType.
                match other.frame_type() {
                    Some(t) => t.to_u8(),
                    None => unreachable!("known packet without frame type"),
                }
            },
        }
    }

    /// Frame type of this packet. `None` only for [`Packet::Unknown`].
    #[must_use]
    pub fn frame_type(&self) -> Option<FrameType> {
        let frame_type = match self {
            Self::AtCommand(_) => FrameType::AtCommand,
            Self::AtCommandQueue(_) => FrameType::AtCommandQueue,
            Self::AtCommandResponse(_) => FrameType::AtResponse,
            Self::RemoteAtCommand(_) => FrameType::RemoteAtCommand,
            Self::RemoteAtCommandResponse(_) => FrameType::RemoteAtResponse,
            Self::TransmitRequest(_) => FrameType::TransmitRequest,
            Self::ExplicitAddressing(_) => FrameType::ExplicitAddressing,
            Self::Tx64(_) => FrameType::Tx64,
            Self::Tx16(_) => FrameType::Tx16,
            Self::TransmitStatus(_) => FrameType::TransmitStatus,
            Self::TxStatus(_) => FrameType::TxStatus,
            Self::Receive(_) => FrameType::Receive,
            Self::Rx64(_) => FrameType::Rx64,
            Self::Rx16(_) => FrameType::Rx16,
            Self::ExplicitRx(_) => FrameType::ExplicitRx,
            Self::IoSampleRx(_) => FrameType::IoSampleRx,
            Self::Rx64Io(_) => FrameType::Rx64Io,
            Self::Rx16Io(_) => FrameType::Rx16Io,
            Self::ModemStatus(_) => FrameType::ModemStatus,
            Self::UserDataRelay(_) => FrameType::UserDataRelay,
            Self::UserDataRelayOutput(_) => FrameType::UserDataRelayOutput,
            Self::TxIpv4(_) => FrameType::TxIpv4,
            Self::RxIpv4(_) => FrameType::RxIpv4,
            Self::TxSms(_) => FrameType::TxSms,
            Self::RxSms(_) => FrameType::RxSms,
            Self::Unknown(_) => return None,
        };
        Some(frame_type)
    }

    /// Frame identifier, for variants that carry one.
    #[must_use]
    pub fn frame_id(&self) -> Option<u8> {
        match self {
            Self::AtCommand(p) => Some(p.frame_id),
            Self::AtCommandQueue(p) => Some(p.frame_id),
            Self::AtCommandResponse(p) => Some(p.frame_id),
            Self::RemoteAtCommand(p) => Some(p.frame_id),
            Self::RemoteAtCommandResponse(p) => Some(p.frame_id),
            Self::TransmitRequest(p) => Some(p.frame_id),
            Self::ExplicitAddressing(p) => Some(p.frame_id),
            Self::Tx64(p) => Some(p.frame_id),
            Self::Tx16(p) => Some(p.frame_id),
            Self::TransmitStatus(p) => Some(p.frame_id),
            Self::TxStatus(p) => Some(p.frame_id),
            Self::UserDataRelay(p) => Some(p.frame_id),
            Self::TxIpv4(p) => Some(p.frame_id),
            Self::TxSms(p) => Some(p.frame_id),
            Self::Receive(_)
            | Self::Rx64(_)
            | Self::Rx16(_)
            | Self::ExplicitRx(_)
            | Self::IoSampleRx(_)
            | Self::Rx64Io(_)
            | Self::Rx16Io(_)
            | Self::ModemStatus(_)
            | Self::UserDataRelayOutput(_)
            | Self::RxIpv4(_)
            | Self::RxSms(_)
            | Self::Unknown(_) => None,
        }
    }

    /// Whether this packet carries a frame-identifier field.
    #[must_use]
    pub fn needs_frame_id(&self) -> bool {
        self.frame_id().is_some()
    }

    /// Whether this packet is a broadcast, derived from the destination
    /// address for requests and from the receive options for indicators.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        match self {
            Self::TransmitRequest(p) => {
                p.dest64.is_broadcast() || p.dest16.is_broadcast()
            },
            Self::ExplicitAddressing(p) => {
                p.dest64.is_broadcast() || p.dest16.is_broadcast()
            },
            Self::Tx64(p) => p.dest.is_broadcast(),
            Self::Tx16(p) => p.dest.is_broadcast(),
            Self::Receive(p) => p.options.is_broadcast(),
            Self::Rx64(p) => p.options.is_broadcast(),
            Self::Rx16(p) => p.options.is_broadcast(),
            Self::ExplicitRx(p) => p.options.is_broadcast(),
            Self::IoSampleRx(p) => p.options.is_broadcast(),
            Self::Rx64Io(p) => p.options.is_broadcast(),
            Self::Rx16Io(p) => p.options.is_broadcast(),
            _ => false,
        }
    }

    /// Serialize to the frame payload (frame type byte included).
    ///
    /// The result is what the codec frames with delimiter, length and
    /// checksum.
    #[must_use]
    pub fn serialize(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(16);
        dst.put_u8(self.frame_type_byte());
        match self {
            Self::AtCommand(p) => p.write(&mut dst),
            Self::AtCommandQueue(p) => p.write(&mut dst),
            Self::AtCommandResponse(p) => p.write(&mut dst),
            Self::RemoteAtCommand(p) => p.write(&mut dst),
            Self::RemoteAtCommandResponse(p) => p.write(&mut dst),
            Self::TransmitRequest(p) => p.write(&mut dst),
            Self::ExplicitAddressing(p) => p.write(&mut dst),
            Self::Tx64(p) => p.write(&mut dst),
            Self::Tx16(p) => p.write(&mut dst),
            Self::TransmitStatus(p) => p.write(&mut dst),
            Self::TxStatus(p) => p.write(&mut dst),
            Self::Receive(p) => p.write(&mut dst),
            Self::Rx64(p) => p.write(&mut dst),
            Self::Rx16(p) => p.write(&mut dst),
            Self::ExplicitRx(p) => p.write(&mut dst),
            Self::IoSampleRx(p) => p.write(&mut dst),
            Self::Rx64Io(p) => p.write(&mut dst),
            Self::Rx16Io(p) => p.write(&mut dst),
            Self::ModemStatus(p) => p.write(&mut dst),
            Self::UserDataRelay(p) => p.write(&mut dst),
            Self::UserDataRelayOutput(p) => p.write(&mut dst),
            Self::TxIpv4(p) => p.write(&mut dst),
            Self::RxIpv4(p) => p.write(&mut dst),
            Self::TxSms(p) => p.write(&mut dst),
            Self::RxSms(p) => p.write(&mut dst),
            Self::Unknown(p) => dst.put_slice(&p.body),
        }
        dst.freeze()
    }

    /// Parse a frame payload (as yielded by the codec) into a packet.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedPacket` if the payload is empty or the
    ///   body does not fit the declared frame type. Unknown frame types
    ///   are NOT an error; they parse to [`Packet::Unknown`].
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (&type_byte, body) = payload.split_first().ok_or(ProtocolError::MalformedPacket {
            frame_type: 0,
            reason: "empty frame payload",
        })?;

        let Some(frame_type) = FrameType::from_u8(type_byte) else {
            return Ok(Self::Unknown(UnknownPacket {
                frame_type: type_byte,
                body: Bytes::copy_from_slice(body),
            }));
        };

        let mut r = FieldReader::new(type_byte, body);
        let packet = match frame_type {
            FrameType::AtCommand => Self::AtCommand(AtCommand::parse(&mut r)?),
            FrameType::AtCommandQueue => Self::AtCommandQueue(AtCommandQueue::parse(&mut r)?),
            FrameType::AtResponse => Self::AtCommandResponse(AtCommandResponse::parse(&mut r)?),
            FrameType::RemoteAtCommand => Self::RemoteAtCommand(RemoteAtCommand::parse(&mut r)?),
            FrameType::RemoteAtResponse => {
                Self::RemoteAtCommandResponse(RemoteAtCommandResponse::parse(&mut r)?)
            },
            FrameType::TransmitRequest => Self::TransmitRequest(TransmitRequest::parse(&mut r)?),
            FrameType::ExplicitAddressing => {
                Self::ExplicitAddressing(ExplicitAddressing::parse(&mut r)?)
            },
            FrameType::Tx64 => Self::Tx64(Tx64::parse(&mut r)?),
            FrameType::Tx16 => Self::Tx16(Tx16::parse(&mut r)?),
            FrameType::TransmitStatus => Self::TransmitStatus(TransmitStatus::parse(&mut r)?),
            FrameType::TxStatus => Self::TxStatus(TxStatus::parse(&mut r)?),
            FrameType::Receive => Self::Receive(ReceivePacket::parse(&mut r)?),
            FrameType::Rx64 => Self::Rx64(Rx64::parse(&mut r)?),
            FrameType::Rx16 => Self::Rx16(Rx16::parse(&mut r)?),
            FrameType::ExplicitRx => Self::ExplicitRx(ExplicitRx::parse(&mut r)?),
            FrameType::IoSampleRx => Self::IoSampleRx(IoSampleRx::parse(&mut r)?),
            FrameType::Rx64Io => Self::Rx64Io(Rx64Io::parse(&mut r)?),
            FrameType::Rx16Io => Self::Rx16Io(Rx16Io::parse(&mut r)?),
            FrameType::ModemStatus => Self::ModemStatus(ModemStatusPacket::parse(&mut r)?),
            FrameType::UserDataRelay => Self::UserDataRelay(UserDataRelay::parse(&mut r)?),
            FrameType::UserDataRelayOutput => {
                Self::UserDataRelayOutput(UserDataRelayOutput::parse(&mut r)?)
            },
            FrameType::TxIpv4 => Self::TxIpv4(TxIpv4::parse(&mut r)?),
            FrameType::RxIpv4 => Self::RxIpv4(RxIpv4::parse(&mut r)?),
            FrameType::TxSms => Self::TxSms(TxSms::parse(&mut r)?),
            FrameType::RxSms => Self::RxSms(RxSms::parse(&mut r)?),
        };
        Ok(packet)
    }
}
