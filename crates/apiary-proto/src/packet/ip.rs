//! IPv4 and SMS frames for Wi-Fi and cellular modules.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

use super::FieldReader;
use crate::{
    errors::{ProtocolError, Result},
    status::IpProtocol,
};

/// Fixed width of the nul-padded phone number field in SMS frames.
pub const PHONE_NUMBER_LEN: usize = 20;

fn read_ipv4(r: &mut FieldReader<'_>) -> Result<Ipv4Addr> {
    let bytes = r.take(4, "missing IPv4 address")?;
    Ok(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

/// Validate and pad a phone number to its fixed wire field.
///
/// Accepts ASCII digits and a leading `+`.
fn encode_phone(phone: &str) -> Result<[u8; PHONE_NUMBER_LEN]> {
    let bytes = phone.as_bytes();
    if bytes.is_empty() || bytes.len() > PHONE_NUMBER_LEN {
        return Err(ProtocolError::InvalidArgument("phone number must be 1-20 characters"));
    }
    let valid = bytes
        .iter()
        .enumerate()
        .all(|(i, &b)| b.is_ascii_digit() || (i == 0 && b == b'+'));
    if !valid {
        return Err(ProtocolError::InvalidArgument("phone number must be digits with optional +"));
    }
    let mut field = [0u8; PHONE_NUMBER_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Decode a nul-padded phone number field.
fn decode_phone(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// IPv4 transmit request (0x20).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIpv4 {
    /// Correlator; 0 suppresses the transmit status.
    pub frame_id: u8,
    /// Destination address.
    pub dest: Ipv4Addr,
    /// Destination port.
    pub dest_port: u16,
    /// Source port.
    pub src_port: u16,
    /// Transport protocol.
    pub protocol: IpProtocol,
    /// Option bits (bit 1 closes the socket after transmit).
    pub options: u8,
    /// Payload data.
    pub data: Bytes,
}

impl TxIpv4 {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(&self.dest.octets());
        dst.put_u16(self.dest_port);
        dst.put_u16(self.src_port);
        dst.put_u8(self.protocol.to_u8());
        dst.put_u8(self.options);
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            dest: read_ipv4(r)?,
            dest_port: r.u16("missing destination port")?,
            src_port: r.u16("missing source port")?,
            protocol: IpProtocol::from_u8(r.u8("missing protocol")?),
            options: r.u8("missing options")?,
            data: r.rest(),
        })
    }
}

/// IPv4 receive indicator (0xB0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxIpv4 {
    /// Sender's address.
    pub source: Ipv4Addr,
    /// Destination port on this module.
    pub dest_port: u16,
    /// Sender's source port.
    pub src_port: u16,
    /// Transport protocol.
    pub protocol: IpProtocol,
    /// Status byte (reserved, 0 in current firmware).
    pub status: u8,
    /// Payload data.
    pub data: Bytes,
}

impl RxIpv4 {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.source.octets());
        dst.put_u16(self.dest_port);
        dst.put_u16(self.src_port);
        dst.put_u8(self.protocol.to_u8());
        dst.put_u8(self.status);
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source: read_ipv4(r)?,
            dest_port: r.u16("missing destination port")?,
            src_port: r.u16("missing source port")?,
            protocol: IpProtocol::from_u8(r.u8("missing protocol")?),
            status: r.u8("missing status")?,
            data: r.rest(),
        })
    }
}

/// SMS transmit request (0x1F).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSms {
    /// Correlator; 0 suppresses the transmit status.
    pub frame_id: u8,
    /// Option bits (reserved, 0).
    pub options: u8,
    /// Destination phone number, nul-padded on the wire.
    pub phone_number: String,
    /// Message text.
    pub message: Bytes,
}

impl TxSms {
    /// Build an SMS request, validating the phone number.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidArgument` if the phone number is empty,
    ///   longer than [`PHONE_NUMBER_LEN`], or not digits with an optional
    ///   leading `+`.
    pub fn new(frame_id: u8, phone_number: &str, message: impl Into<Bytes>) -> Result<Self> {
        encode_phone(phone_number)?;
        Ok(Self {
            frame_id,
            options: 0,
            phone_number: phone_number.to_owned(),
            message: message.into(),
        })
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_u8(self.options);
        // Constructor validated the number; an invalid one built by struct
        // literal serializes as all-nul.
        let field = encode_phone(&self.phone_number).unwrap_or([0u8; PHONE_NUMBER_LEN]);
        dst.put_slice(&field);
        dst.put_slice(&self.message);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        let frame_id = r.u8("missing frame id")?;
        let options = r.u8("missing options")?;
        let phone = r.take(PHONE_NUMBER_LEN, "missing phone number")?;
        Ok(Self {
            frame_id,
            options,
            phone_number: decode_phone(phone),
            message: r.rest(),
        })
    }
}

/// SMS receive indicator (0x9F).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxSms {
    /// Sender's phone number.
    pub phone_number: String,
    /// Message text.
    pub message: Bytes,
}

impl RxSms {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        let field = encode_phone(&self.phone_number).unwrap_or([0u8; PHONE_NUMBER_LEN]);
        dst.put_slice(&field);
        dst.put_slice(&self.message);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        let phone = r.take(PHONE_NUMBER_LEN, "missing phone number")?;
        Ok(Self { phone_number: decode_phone(phone), message: r.rest() })
    }
}
