//! Receive indicators, I/O sample indicators and modem status.

use bytes::{BufMut, Bytes, BytesMut};

use super::FieldReader;
use crate::{
    address::{Addr16, Addr64},
    errors::Result,
    status::ModemStatus,
    types::ReceiveOptions,
};

/// Receive indicator (0x90).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivePacket {
    /// Sender's 64-bit address.
    pub source64: Addr64,
    /// Sender's 16-bit address.
    pub source16: Addr16,
    /// Receive options.
    pub options: ReceiveOptions,
    /// Received data.
    pub data: Bytes,
}

impl ReceivePacket {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(self.source64.as_bytes());
        dst.put_slice(self.source16.as_bytes());
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source64: r.addr64()?,
            source16: r.addr16()?,
            options: ReceiveOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// Legacy 64-bit addressed receive indicator (0x80).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rx64 {
    /// Sender's 64-bit address.
    pub source: Addr64,
    /// Received signal strength, in -dBm.
    pub rssi: u8,
    /// Receive options.
    pub options: ReceiveOptions,
    /// Received data.
    pub data: Bytes,
}

impl Rx64 {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(self.source.as_bytes());
        dst.put_u8(self.rssi);
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source: r.addr64()?,
            rssi: r.u8("missing RSSI")?,
            options: ReceiveOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// Legacy 16-bit addressed receive indicator (0x81).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rx16 {
    /// Sender's 16-bit address.
    pub source: Addr16,
    /// Received signal strength, in -dBm.
    pub rssi: u8,
    /// Receive options.
    pub options: ReceiveOptions,
    /// Received data.
    pub data: Bytes,
}

impl Rx16 {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(self.source.as_bytes());
        dst.put_u8(self.rssi);
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source: r.addr16()?,
            rssi: r.u8("missing RSSI")?,
            options: ReceiveOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// Explicit addressing receive indicator (0x91).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitRx {
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
    /// Receive options.
    pub options: ReceiveOptions,
    /// Received data.
    pub data: Bytes,
}

impl ExplicitRx {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(self.source64.as_bytes());
        dst.put_slice(self.source16.as_bytes());
        dst.put_u8(self.src_endpoint);
        dst.put_u8(self.dst_endpoint);
        dst.put_u16(self.cluster_id);
        dst.put_u16(self.profile_id);
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source64: r.addr64()?,
            source16: r.addr16()?,
            src_endpoint: r.u8("missing source endpoint")?,
            dst_endpoint: r.u8("missing destination endpoint")?,
            cluster_id: r.u16("missing cluster id")?,
            profile_id: r.u16("missing profile id")?,
            options: ReceiveOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// I/O data sample receive indicator (0x92).
///
/// The sample bytes are kept raw; [`IoSample::parse`](super::IoSample)
/// gives them structure on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSampleRx {
    /// Sender's 64-bit address.
    pub source64: Addr64,
    /// Sender's 16-bit address.
    pub source16: Addr16,
    /// Receive options.
    pub options: ReceiveOptions,
    /// Raw sample set bytes.
    pub sample_data: Bytes,
}

impl IoSampleRx {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(self.source64.as_bytes());
        dst.put_slice(self.source16.as_bytes());
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.sample_data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source64: r.addr64()?,
            source16: r.addr16()?,
            options: ReceiveOptions::from_bits(r.u8("missing options")?),
            sample_data: r.rest(),
        })
    }
}

/// Legacy 64-bit addressed I/O sample indicator (0x82).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rx64Io {
    /// Sender's 64-bit address.
    pub source: Addr64,
    /// Received signal strength, in -dBm.
    pub rssi: u8,
    /// Receive options.
    pub options: ReceiveOptions,
    /// Raw sample set bytes (legacy layout).
    pub sample_data: Bytes,
}

impl Rx64Io {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(self.source.as_bytes());
        dst.put_u8(self.rssi);
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.sample_data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source: r.addr64()?,
            rssi: r.u8("missing RSSI")?,
            options: ReceiveOptions::from_bits(r.u8("missing options")?),
            sample_data: r.rest(),
        })
    }
}

/// Legacy 16-bit addressed I/O sample indicator (0x83).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rx16Io {
    /// Sender's 16-bit address.
    pub source: Addr16,
    /// Received signal strength, in -dBm.
    pub rssi: u8,
    /// Receive options.
    pub options: ReceiveOptions,
    /// Raw sample set bytes (legacy layout).
    pub sample_data: Bytes,
}

impl Rx16Io {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(self.source.as_bytes());
        dst.put_u8(self.rssi);
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.sample_data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            source: r.addr16()?,
            rssi: r.u8("missing RSSI")?,
            options: ReceiveOptions::from_bits(r.u8("missing options")?),
            sample_data: r.rest(),
        })
    }
}

/// Modem status indicator (0x8A).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemStatusPacket {
    /// Reported status.
    pub status: ModemStatus,
}

impl ModemStatusPacket {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.status.to_u8());
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { status: ModemStatus::from_u8(r.u8("missing status")?) })
    }
}

#[cfg(test)]
mod tests {
    use crate::packet::Packet;

    #[test]
    fn receive_parse_and_broadcast() {
        let mut payload = vec![0x90];
        payload.extend_from_slice(&0x0013_A200_4001_0203_u64.to_be_bytes());
        payload.extend_from_slice(&[0x56, 0x78]); // source16
        payload.push(0x02); // PAN broadcast
        payload.extend_from_slice(b"hello");

        let packet = Packet::parse(&payload).unwrap();
        assert!(packet.is_broadcast());
        let Packet::Receive(rx) = packet else { panic!("expected receive") };
        assert_eq!(rx.source16.to_u16(), 0x5678);
        assert_eq!(&rx.data[..], b"hello");
    }

    #[test]
    fn modem_status_parse() {
        let Packet::ModemStatus(status) = Packet::parse(&[0x8A, 0x00]).unwrap() else {
            panic!("expected modem status");
        };
        assert!(status.status.is_reset());
    }

    #[test]
    fn legacy_rx_keeps_rssi() {
        let mut payload = vec![0x81, 0x12, 0x34, 0x28, 0x00];
        payload.extend_from_slice(b"x");
        let Packet::Rx16(rx) = Packet::parse(&payload).unwrap() else {
            panic!("expected Rx16");
        };
        assert_eq!(rx.rssi, 0x28);
        assert!(!rx.options.is_broadcast());
    }
}
