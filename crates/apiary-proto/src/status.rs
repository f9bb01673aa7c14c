//! Status codes carried by response and indicator frames.
//!
//! Every enum here round-trips through its raw wire byte; values the
//! firmware may add later are preserved in an `Unknown` variant instead of
//! failing the parse.

use std::fmt;

/// Status byte of an AT command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommandStatus {
    /// Command executed.
    Ok,
    /// Generic error.
    Error,
    /// Command name is not recognized.
    InvalidCommand,
    /// Parameter is out of range or malformed.
    InvalidParameter,
    /// Remote command could not be transmitted.
    TxFailure,
    /// Unrecognized status value.
    Unknown(u8),
}

impl AtCommandStatus {
    /// Parse from the wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Error,
            2 => Self::InvalidCommand,
            3 => Self::InvalidParameter,
            4 => Self::TxFailure,
            other => Self::Unknown(other),
        }
    }

    /// Wire byte for this status.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::InvalidCommand => 2,
            Self::InvalidParameter => 3,
            Self::TxFailure => 4,
            Self::Unknown(other) => other,
        }
    }

    /// Whether the command succeeded.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for AtCommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error => f.write_str("error"),
            Self::InvalidCommand => f.write_str("invalid command"),
            Self::InvalidParameter => f.write_str("invalid parameter"),
            Self::TxFailure => f.write_str("transmission failure"),
            Self::Unknown(value) => write!(f, "unknown status {value:#04x}"),
        }
    }
}

/// Delivery status of a transmit request, reported by both the modern
/// (0x8B) and legacy (0x89) status frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Delivered.
    Success,
    /// No acknowledgement received.
    NoAck,
    /// Clear-channel assessment failed.
    CcaFailure,
    /// Transmission purged before the stack was up.
    Purged,
    /// Destination endpoint is invalid.
    InvalidDestEndpoint,
    /// Network acknowledgement failed.
    NetworkAckFailure,
    /// Module is not joined to a network.
    NotJoined,
    /// Destination was this module itself.
    SelfAddressed,
    /// Address could not be resolved.
    AddressNotFound,
    /// No route to the destination.
    RouteNotFound,
    /// Broadcast source failed to hear a neighbor relay.
    BroadcastRelayFailure,
    /// Lack of free buffers, timers, or similar resources.
    ResourceError,
    /// Payload exceeds the maximum frame size.
    PayloadTooLarge,
    /// Indirect message was not requested.
    IndirectMessageUnrequested,
    /// Unrecognized status value.
    Unknown(u8),
}

impl DeliveryStatus {
    /// Parse from the wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::NoAck,
            0x02 => Self::CcaFailure,
            0x03 => Self::Purged,
            0x15 => Self::InvalidDestEndpoint,
            0x21 => Self::NetworkAckFailure,
            0x22 => Self::NotJoined,
            0x23 => Self::SelfAddressed,
            0x24 => Self::AddressNotFound,
            0x25 => Self::RouteNotFound,
            0x26 => Self::BroadcastRelayFailure,
            0x32 => Self::ResourceError,
            0x74 => Self::PayloadTooLarge,
            0x75 => Self::IndirectMessageUnrequested,
            other => Self::Unknown(other),
        }
    }

    /// Wire byte for this status.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::NoAck => 0x01,
            Self::CcaFailure => 0x02,
            Self::Purged => 0x03,
            Self::InvalidDestEndpoint => 0x15,
            Self::NetworkAckFailure => 0x21,
            Self::NotJoined => 0x22,
            Self::SelfAddressed => 0x23,
            Self::AddressNotFound => 0x24,
            Self::RouteNotFound => 0x25,
            Self::BroadcastRelayFailure => 0x26,
            Self::ResourceError => 0x32,
            Self::PayloadTooLarge => 0x74,
            Self::IndirectMessageUnrequested => 0x75,
            Self::Unknown(other) => other,
        }
    }

    /// Whether the transmission should be treated as delivered.
    ///
    /// A self-addressed transmit never leaves the module and counts as
    /// success.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SelfAddressed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::NoAck => f.write_str("no acknowledgement"),
            Self::CcaFailure => f.write_str("CCA failure"),
            Self::Purged => f.write_str("purged"),
            Self::InvalidDestEndpoint => f.write_str("invalid destination endpoint"),
            Self::NetworkAckFailure => f.write_str("network ACK failure"),
            Self::NotJoined => f.write_str("not joined to network"),
            Self::SelfAddressed => f.write_str("self-addressed"),
            Self::AddressNotFound => f.write_str("address not found"),
            Self::RouteNotFound => f.write_str("route not found"),
            Self::BroadcastRelayFailure => f.write_str("broadcast relay not heard"),
            Self::ResourceError => f.write_str("resource error"),
            Self::PayloadTooLarge => f.write_str("payload too large"),
            Self::IndirectMessageUnrequested => f.write_str("indirect message unrequested"),
            Self::Unknown(value) => write!(f, "unknown status {value:#04x}"),
        }
    }
}

/// Modem status event reported by frame type 0x8A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemStatus {
    /// Module powered up or was reset in hardware.
    HardwareReset,
    /// Watchdog timer expired and reset the module.
    WatchdogReset,
    /// Joined a network / associated.
    Associated,
    /// Left the network / disassociated.
    Disassociated,
    /// Coordinator started.
    CoordinatorStarted,
    /// Network security key was updated.
    SecurityKeyUpdated,
    /// Network woke up.
    NetworkWokeUp,
    /// Network went to sleep.
    NetworkWentToSleep,
    /// Supply voltage limit exceeded.
    VoltageExceeded,
    /// Module configuration changed while a join was in progress.
    ConfigChangedWhileJoining,
    /// Unrecognized status value.
    Unknown(u8),
}

impl ModemStatus {
    /// Parse from the wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::HardwareReset,
            0x01 => Self::WatchdogReset,
            0x02 => Self::Associated,
            0x03 => Self::Disassociated,
            0x06 => Self::CoordinatorStarted,
            0x07 => Self::SecurityKeyUpdated,
            0x0B => Self::NetworkWokeUp,
            0x0C => Self::NetworkWentToSleep,
            0x0D => Self::VoltageExceeded,
            0x11 => Self::ConfigChangedWhileJoining,
            other => Self::Unknown(other),
        }
    }

    /// Wire byte for this status.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::HardwareReset => 0x00,
            Self::WatchdogReset => 0x01,
            Self::Associated => 0x02,
            Self::Disassociated => 0x03,
            Self::CoordinatorStarted => 0x06,
            Self::SecurityKeyUpdated => 0x07,
            Self::NetworkWokeUp => 0x0B,
            Self::NetworkWentToSleep => 0x0C,
            Self::VoltageExceeded => 0x0D,
            Self::ConfigChangedWhileJoining => 0x11,
            Self::Unknown(other) => other,
        }
    }

    /// Whether this status signals a completed module reset.
    #[must_use]
    pub fn is_reset(self) -> bool {
        matches!(self, Self::HardwareReset | Self::WatchdogReset)
    }
}

/// Local interface addressed by user data relay frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RelayInterface {
    /// Serial / UART interface.
    Serial = 0,
    /// Bluetooth Low Energy interface.
    Bluetooth = 1,
    /// MicroPython interpreter running on the module.
    MicroPython = 2,
}

impl RelayInterface {
    /// Parse from the wire byte. Unknown interfaces are a parse error, not
    /// a preserved value: a relay frame for an interface this library does
    /// not know cannot be routed anywhere.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Serial),
            1 => Some(Self::Bluetooth),
            2 => Some(Self::MicroPython),
            _ => None,
        }
    }

    /// Wire byte for this interface.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Transport protocol of an IPv4 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    /// UDP datagram.
    Udp,
    /// TCP stream.
    Tcp,
    /// TLS over TCP.
    Tls,
    /// Unrecognized protocol value.
    Unknown(u8),
}

impl IpProtocol {
    /// Parse from the wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Udp,
            1 => Self::Tcp,
            4 => Self::Tls,
            other => Self::Unknown(other),
        }
    }

    /// Wire byte for this protocol.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Udp => 0,
            Self::Tcp => 1,
            Self::Tls => 4,
            Self::Unknown(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_value_roundtrip() {
        for value in 0..=u8::MAX {
            assert_eq!(AtCommandStatus::from_u8(value).to_u8(), value);
            assert_eq!(DeliveryStatus::from_u8(value).to_u8(), value);
            assert_eq!(ModemStatus::from_u8(value).to_u8(), value);
            assert_eq!(IpProtocol::from_u8(value).to_u8(), value);
        }
    }

    #[test]
    fn delivery_success_set() {
        assert!(DeliveryStatus::Success.is_success());
        assert!(DeliveryStatus::SelfAddressed.is_success());
        assert!(!DeliveryStatus::NetworkAckFailure.is_success());
        assert!(!DeliveryStatus::Unknown(0x42).is_success());
    }

    #[test]
    fn reset_statuses() {
        assert!(ModemStatus::HardwareReset.is_reset());
        assert!(ModemStatus::WatchdogReset.is_reset());
        assert!(!ModemStatus::Associated.is_reset());
    }
}
