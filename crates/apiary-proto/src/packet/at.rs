//! AT command request and response frames, local and remote.

use bytes::{BufMut, Bytes, BytesMut};

use super::{AtCmd, FieldReader};
use crate::{
    address::{Addr16, Addr64},
    errors::Result,
    status::AtCommandStatus,
};

/// Remote AT command option bit: apply the change immediately on the
/// remote instead of waiting for an explicit `AC`.
pub const REMOTE_APPLY_CHANGES: u8 = 0x02;

/// Local AT command request (0x08).
///
/// An empty parameter queries the current value; a non-empty one sets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    /// Correlator; 0 suppresses the response.
    pub frame_id: u8,
    /// Two-letter command name.
    pub command: AtCmd,
    /// Parameter bytes (empty for a query).
    pub parameter: Bytes,
}

impl AtCommand {
    /// Build a query (no parameter).
    #[must_use]
    pub fn query(frame_id: u8, command: AtCmd) -> Self {
        Self { frame_id, command, parameter: Bytes::new() }
    }

    /// Build a set request.
    #[must_use]
    pub fn set(frame_id: u8, command: AtCmd, parameter: impl Into<Bytes>) -> Self {
        Self { frame_id, command, parameter: parameter.into() }
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(&self.command.0);
        dst.put_slice(&self.parameter);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            command: r.at_cmd()?,
            parameter: r.rest(),
        })
    }
}

/// Queued local AT command request (0x09).
///
/// Identical layout to [`AtCommand`]; the change is held until an apply
/// ("AC") or write ("WR") executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommandQueue {
    /// Correlator; 0 suppresses the response.
    pub frame_id: u8,
    /// Two-letter command name.
    pub command: AtCmd,
    /// Parameter bytes (empty for a query).
    pub parameter: Bytes,
}

impl AtCommandQueue {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(&self.command.0);
        dst.put_slice(&self.parameter);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            command: r.at_cmd()?,
            parameter: r.rest(),
        })
    }
}

/// Local AT command response (0x88).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommandResponse {
    /// Correlator copied from the request.
    pub frame_id: u8,
    /// Echoed command name.
    pub command: AtCmd,
    /// Command status.
    pub status: AtCommandStatus,
    /// Returned value (empty for sets and executes).
    pub value: Bytes,
}

impl AtCommandResponse {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(&self.command.0);
        dst.put_u8(self.status.to_u8());
        dst.put_slice(&self.value);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            command: r.at_cmd()?,
            status: AtCommandStatus::from_u8(r.u8("missing status")?),
            value: r.rest(),
        })
    }
}

/// Remote AT command request (0x17).
///
/// Relayed over RF by the local module to the addressed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAtCommand {
    /// Correlator; 0 suppresses the response.
    pub frame_id: u8,
    /// Destination 64-bit address.
    pub dest64: Addr64,
    /// Destination 16-bit address ([`Addr16::UNKNOWN`] when unresolved).
    pub dest16: Addr16,
    /// Option bits; see [`REMOTE_APPLY_CHANGES`].
    pub options: u8,
    /// Two-letter command name.
    pub command: AtCmd,
    /// Parameter bytes (empty for a query).
    pub parameter: Bytes,
}

impl RemoteAtCommand {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(self.dest64.as_bytes());
        dst.put_slice(self.dest16.as_bytes());
        dst.put_u8(self.options);
        dst.put_slice(&self.command.0);
        dst.put_slice(&self.parameter);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            dest64: r.addr64()?,
            dest16: r.addr16()?,
            options: r.u8("missing options")?,
            command: r.at_cmd()?,
            parameter: r.rest(),
        })
    }
}

/// Remote AT command response (0x97).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAtCommandResponse {
    /// Correlator copied from the request.
    pub frame_id: u8,
    /// Responding node's 64-bit address.
    pub source64: Addr64,
    /// Responding node's 16-bit address.
    pub source16: Addr16,
    /// Echoed command name.
    pub command: AtCmd,
    /// Command status.
    pub status: AtCommandStatus,
    /// Returned value (empty for sets and executes).
    pub value: Bytes,
}

impl RemoteAtCommandResponse {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(self.source64.as_bytes());
        dst.put_slice(self.source16.as_bytes());
        dst.put_slice(&self.command.0);
        dst.put_u8(self.status.to_u8());
        dst.put_slice(&self.value);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            source64: r.addr64()?,
            source16: r.addr16()?,
            command: r.at_cmd()?,
            status: AtCommandStatus::from_u8(r.u8("missing status")?),
            value: r.rest(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn at_request_wire_layout() {
        let packet = Packet::AtCommand(AtCommand::query(0x01, AtCmd(*b"NI")));
        assert_eq!(&packet.serialize()[..], &[0x08, 0x01, 0x4E, 0x49]);
    }

    #[test]
    fn at_response_parse_vector() {
        // 88 01 4E 49 00 52 6F 75 74 65 -> frame id 1, "NI", OK, "Route"
        let payload = [0x88, 0x01, 0x4E, 0x49, 0x00, 0x52, 0x6F, 0x75, 0x74, 0x65];
        let Packet::AtCommandResponse(resp) = Packet::parse(&payload).unwrap() else {
            panic!("expected AT response");
        };
        assert_eq!(resp.frame_id, 0x01);
        assert_eq!(resp.command, AtCmd(*b"NI"));
        assert!(resp.status.is_ok());
        assert_eq!(&resp.value[..], b"Route");
    }

    #[test]
    fn at_cmd_matching_is_case_insensitive() {
        assert!(AtCmd(*b"ni").matches(&AtCmd(*b"NI")));
        assert!(!AtCmd(*b"NI").matches(&AtCmd(*b"NT")));
    }

    #[test]
    fn remote_at_roundtrip() {
        let packet = Packet::RemoteAtCommand(RemoteAtCommand {
            frame_id: 0x42,
            dest64: Addr64::from_u64(0x0013_A200_4001_0203),
            dest16: Addr16::UNKNOWN,
            options: REMOTE_APPLY_CHANGES,
            command: AtCmd(*b"D0"),
            parameter: Bytes::from_static(&[0x05]),
        });
        let parsed = Packet::parse(&packet.serialize()).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn truncated_response_is_malformed() {
        assert!(Packet::parse(&[0x88, 0x01, 0x4E]).is_err());
    }
}
