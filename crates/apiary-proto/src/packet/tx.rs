//! Transmit request and transmit status frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::FieldReader;
use crate::{
    address::{Addr16, Addr64},
    errors::Result,
    status::DeliveryStatus,
    types::TransmitOptions,
};

/// Transmit request (0x10), the modern dual-addressed variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitRequest {
    /// Correlator; 0 suppresses the transmit status.
    pub frame_id: u8,
    /// Destination 64-bit address.
    pub dest64: Addr64,
    /// Destination 16-bit address ([`Addr16::UNKNOWN`] when unresolved).
    pub dest16: Addr16,
    /// Maximum broadcast hops (0 = network maximum).
    pub broadcast_radius: u8,
    /// Transmit options.
    pub options: TransmitOptions,
    /// Payload data.
    pub data: Bytes,
}

impl TransmitRequest {
    /// Unicast request with default radius and options.
    #[must_use]
    pub fn unicast(frame_id: u8, dest64: Addr64, dest16: Addr16, data: impl Into<Bytes>) -> Self {
        Self {
            frame_id,
            dest64,
            dest16,
            broadcast_radius: 0,
            options: TransmitOptions::NONE,
            data: data.into(),
        }
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(self.dest64.as_bytes());
        dst.put_slice(self.dest16.as_bytes());
        dst.put_u8(self.broadcast_radius);
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            dest64: r.addr64()?,
            dest16: r.addr16()?,
            broadcast_radius: r.u8("missing broadcast radius")?,
            options: TransmitOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// Explicit addressing transmit request (0x11).
///
/// A [`TransmitRequest`] with application-layer addressing: source and
/// destination endpoints, cluster and profile identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitAddressing {
    /// Correlator; 0 suppresses the transmit status.
    pub frame_id: u8,
    /// Destination 64-bit address.
    pub dest64: Addr64,
    /// Destination 16-bit address.
    pub dest16: Addr16,
    /// Source endpoint.
    pub src_endpoint: u8,
    /// Destination endpoint.
    pub dst_endpoint: u8,
    /// Cluster identifier.
    pub cluster_id: u16,
    /// Profile identifier.
    pub profile_id: u16,
    /// Maximum broadcast hops (0 = network maximum).
    pub broadcast_radius: u8,
    /// Transmit options.
    pub options: TransmitOptions,
    /// Payload data.
    pub data: Bytes,
}

impl ExplicitAddressing {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(self.dest64.as_bytes());
        dst.put_slice(self.dest16.as_bytes());
        dst.put_u8(self.src_endpoint);
        dst.put_u8(self.dst_endpoint);
        dst.put_u16(self.cluster_id);
        dst.put_u16(self.profile_id);
        dst.put_u8(self.broadcast_radius);
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            dest64: r.addr64()?,
            dest16: r.addr16()?,
            src_endpoint: r.u8("missing source endpoint")?,
            dst_endpoint: r.u8("missing destination endpoint")?,
            cluster_id: r.u16("missing cluster id")?,
            profile_id: r.u16("missing profile id")?,
            broadcast_radius: r.u8("missing broadcast radius")?,
            options: TransmitOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// Legacy 64-bit addressed transmit request (0x00), 802.15.4 only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx64 {
    /// Correlator; 0 suppresses the transmit status.
    pub frame_id: u8,
    /// Destination 64-bit address.
    pub dest: Addr64,
    /// Transmit options.
    pub options: TransmitOptions,
    /// Payload data.
    pub data: Bytes,
}

impl Tx64 {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(self.dest.as_bytes());
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            dest: r.addr64()?,
            options: TransmitOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// Legacy 16-bit addressed transmit request (0x01), 802.15.4 only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx16 {
    /// Correlator; 0 suppresses the transmit status.
    pub frame_id: u8,
    /// Destination 16-bit address.
    pub dest: Addr16,
    /// Transmit options.
    pub options: TransmitOptions,
    /// Payload data.
    pub data: Bytes,
}

impl Tx16 {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(self.dest.as_bytes());
        dst.put_u8(self.options.bits());
        dst.put_slice(&self.data);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            dest: r.addr16()?,
            options: TransmitOptions::from_bits(r.u8("missing options")?),
            data: r.rest(),
        })
    }
}

/// Transmit status (0x8B), answering a [`TransmitRequest`] or
/// [`ExplicitAddressing`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitStatus {
    /// Correlator copied from the request.
    pub frame_id: u8,
    /// 16-bit address the packet was actually delivered to.
    pub dest16: Addr16,
    /// Number of application transmission retries.
    pub retry_count: u8,
    /// Delivery result.
    pub delivery: DeliveryStatus,
    /// Route discovery overhead incurred.
    pub discovery: u8,
}

impl TransmitStatus {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_slice(self.dest16.as_bytes());
        dst.put_u8(self.retry_count);
        dst.put_u8(self.delivery.to_u8());
        dst.put_u8(self.discovery);
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            dest16: r.addr16()?,
            retry_count: r.u8("missing retry count")?,
            delivery: DeliveryStatus::from_u8(r.u8("missing delivery status")?),
            discovery: r.u8("missing discovery status")?,
        })
    }
}

/// Legacy transmit status (0x89), answering [`Tx64`] / [`Tx16`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatus {
    /// Correlator copied from the request.
    pub frame_id: u8,
    /// Delivery result.
    pub delivery: DeliveryStatus,
}

impl TxStatus {
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(self.frame_id);
        dst.put_u8(self.delivery.to_u8());
    }

    pub(crate) fn parse(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            frame_id: r.u8("missing frame id")?,
            delivery: DeliveryStatus::from_u8(r.u8("missing delivery status")?),
        })
    }
}
