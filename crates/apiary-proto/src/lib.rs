//! Wire layer for the XBee API frame protocol.
//!
//! XBee radios in API operating mode speak a framed binary protocol over a
//! byte stream: `0x7E | length (u16 BE) | payload | checksum`. The payload
//! begins with a one-byte frame type that selects the packet layout. In the
//! escaped variant of the protocol (`AP = 2`) every byte after the start
//! delimiter that collides with a reserved value is escaped so in-band
//! flow-control characters cannot corrupt the stream.
//!
//! # Architecture
//!
//! The codec and the packet model are deliberately separate layers:
//!
//! - [`codec`]: byte-level framing. [`FrameDecoder`] is a reentrant state
//!   machine that consumes a raw byte stream and yields checksum-verified
//!   frame payloads; [`codec::encode_frame`] produces the on-wire bytes for
//!   a payload in either serialization mode.
//! - [`packet`]: typed view. [`Packet`] is a tagged union over every frame
//!   type, parsed from (and serialized to) the payload bytes the codec
//!   handles. A consumer can decode frames without parsing them.
//!
//! Addresses ([`Addr64`], [`Addr16`]), frame types and status codes round
//! out the data model shared by both layers.

mod address;
pub mod codec;
mod errors;
pub mod packet;
mod status;
mod types;

pub use address::{Addr16, Addr64};
pub use codec::FrameDecoder;
pub use errors::{ProtocolError, Result};
pub use packet::{AtCmd, Packet};
pub use status::{
    AtCommandStatus, DeliveryStatus, IpProtocol, ModemStatus, RelayInterface,
};
pub use types::{FrameType, OperatingMode, ReceiveOptions, TransmitOptions};
