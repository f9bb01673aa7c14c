//! User data relay frames.
//!
//! Relay frames move bytes between a module's local interfaces (serial,
//! Bluetooth, MicroPython) without any RF transmission, so the radio never
//! generates a transmit status for them.

use bytes::{BufMut, Bytes, BytesMut};

use super::FieldReader;
use crate::{
    errors::{ProtocolError, Result},
    status::RelayInterface,
};

/// Maximum relay payload size.
pub const MAX_RELAY_DATA_LEN: usize = 255;

/// User data relay request (0x2D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDataRelay {
    /// Correlator (no status is ever generated; kept for the wire layout).
    pub frame_id: u8,
    /// Destination interface.
    pub dest: RelayInterface,
    /// Relayed bytes.
    pub data: Bytes,
}

impl UserDataRelay {
    /// Build a relay request, validating the payload size.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidArgument` if `data` exceeds
    ///   [`MAX_RELAY_DATA_LEN`].
    pub fn new(frame_id: u8, dest: RelayInterface, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_RELAY_DATA_LEN {
            return Err(ProtocolError::InvalidArgument("relay data exceeds 255 bytes"));
        }
        Ok(Self { frame_id, dest, data })
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_u8(self.dest.to_u8());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        let frame_id = r.u8("missing frame id")?;
        let interface = r.u8("missing interface")?;
        let dest = RelayInterface::from_u8(interface).ok_or(ProtocolError::MalformedPacket {
            frame_type: 0x2D,
            reason: "unknown relay interface",
        })?;
        Ok(Self { frame_id, dest, data: r.rest() })
    }
}

/// User data relay output (0xAD), bytes arriving from another interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDataRelayOutput {
    /// Interface the bytes came from.
    pub source: RelayInterface,
    /// Relayed bytes.
    pub data: Bytes,
}

impl UserDataRelayOutput {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.source.to_u8());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        let interface = r.u8("missing interface")?;
        let source = RelayInterface::from_u8(interface).ok_or(ProtocolError::MalformedPacket {
            frame_type: 0xAD,
            reason: "unknown relay interface",
        })?;
        Ok(Self { source, data: r.rest() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn relay_size_limit_enforced() {
        assert!(UserDataRelay::new(1, RelayInterface::Bluetooth, vec![0u8; 255]).is_ok());
        assert!(UserDataRelay::new(1, RelayInterface::Bluetooth, vec![0u8; 256]).is_err());
    }

    #[test]
    fn relay_output_roundtrip() {
        let packet = Packet::UserDataRelayOutput(UserDataRelayOutput {
            source: RelayInterface::MicroPython,
            data: Bytes::from_static(b"print(1)"),
        });
        assert_eq!(Packet::parse(&packet.serialize()).unwrap(), packet);
    }

    #[test]
    fn unknown_interface_is_malformed() {
        assert!(matches!(
            Packet::parse(&[0xAD, 0x07, 0x01]),
            Err(ProtocolError::MalformedPacket { .. })
        ));
    }
}
