//! Frame types, operating modes and option bitfields.

/// API frame type discriminant, the first byte of every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Legacy 64-bit addressed transmit request (802.15.4).
    Tx64 = 0x00,
    /// Legacy 16-bit addressed transmit request (802.15.4).
    Tx16 = 0x01,
    /// Local AT command request.
    AtCommand = 0x08,
    /// Local AT command request, queued until changes are applied.
    AtCommandQueue = 0x09,
    /// Transmit request (64-bit and 16-bit addressed).
    TransmitRequest = 0x10,
    /// Explicit addressing transmit request (endpoints, cluster, profile).
    ExplicitAddressing = 0x11,
    /// AT command relayed to a remote node.
    RemoteAtCommand = 0x17,
    /// SMS transmit request (cellular).
    TxSms = 0x1F,
    /// IPv4 transmit request (Wi-Fi / cellular).
    TxIpv4 = 0x20,
    /// User data relay request (inter-interface, no RF).
    UserDataRelay = 0x2D,
    /// Legacy 64-bit addressed receive indicator.
    Rx64 = 0x80,
    /// Legacy 16-bit addressed receive indicator.
    Rx16 = 0x81,
    /// Legacy 64-bit addressed I/O sample indicator.
    Rx64Io = 0x82,
    /// Legacy 16-bit addressed I/O sample indicator.
    Rx16Io = 0x83,
    /// Local AT command response.
    AtResponse = 0x88,
    /// Legacy transmit status.
    TxStatus = 0x89,
    /// Modem status indicator.
    ModemStatus = 0x8A,
    /// Transmit status (modern).
    TransmitStatus = 0x8B,
    /// Receive indicator (64-bit and 16-bit addressed).
    Receive = 0x90,
    /// Explicit addressing receive indicator.
    ExplicitRx = 0x91,
    /// I/O data sample receive indicator (modern).
    IoSampleRx = 0x92,
    /// Remote AT command response.
    RemoteAtResponse = 0x97,
    /// SMS receive indicator (cellular).
    RxSms = 0x9F,
    /// User data relay output.
    UserDataRelayOutput = 0xAD,
    /// IPv4 receive indicator (Wi-Fi / cellular).
    RxIpv4 = 0xB0,
}

impl FrameType {
    /// Parse a frame type byte. Returns `None` for unrecognized values.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let frame_type = match value {
            0x00 => Self::Tx64,
            0x01 => Self::Tx16,
            0x08 => Self::AtCommand,
            0x09 => Self::AtCommandQueue,
            0x10 => Self::TransmitRequest,
            0x11 => Self::ExplicitAddressing,
            0x17 => Self::RemoteAtCommand,
            0x1F => Self::TxSms,
            0x20 => Self::TxIpv4,
            0x2D => Self::UserDataRelay,
            0x80 => Self::Rx64,
            0x81 => Self::Rx16,
            0x82 => Self::Rx64Io,
            0x83 => Self::Rx16Io,
            0x88 => Self::AtResponse,
            0x89 => Self::TxStatus,
            0x8A => Self::ModemStatus,
            0x8B => Self::TransmitStatus,
            0x90 => Self::Receive,
            0x91 => Self::ExplicitRx,
            0x92 => Self::IoSampleRx,
            0x97 => Self::RemoteAtResponse,
            0x9F => Self::RxSms,
            0xAD => Self::UserDataRelayOutput,
            0xB0 => Self::RxIpv4,
            _ => return None,
        };
        Some(frame_type)
    }

    /// Wire value of this frame type.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Operating mode of the radio's serial interface.
///
/// The core only drives modules in [`Api`](Self::Api) or
/// [`ApiEscape`](Self::ApiEscape) mode; transparent ("AT") mode is detected
/// so it can be reported, never operated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Mode has not been determined yet.
    #[default]
    Unknown,
    /// Transparent mode (`AP = 0`): bytes pass through unframed.
    At,
    /// API mode without escaping (`AP = 1`).
    Api,
    /// API mode with reserved-byte escaping (`AP = 2`).
    ApiEscape,
}

impl OperatingMode {
    /// Mode corresponding to an `AP` parameter value, if any.
    #[must_use]
    pub fn from_ap_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::At),
            1 => Some(Self::Api),
            2 => Some(Self::ApiEscape),
            _ => None,
        }
    }

    /// Whether frames must be escaped in this mode.
    #[must_use]
    pub fn is_escaped(self) -> bool {
        self == Self::ApiEscape
    }

    /// Whether API frames can be exchanged in this mode.
    #[must_use]
    pub fn supports_api_frames(self) -> bool {
        matches!(self, Self::Api | Self::ApiEscape)
    }
}

/// Transmit options bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransmitOptions(u8);

impl TransmitOptions {
    /// No options set.
    pub const NONE: Self = Self(0);

    /// Disable acknowledgement.
    pub const DISABLE_ACK: Self = Self(0x01);

    /// Use the extended transmission timeout.
    pub const USE_EXTENDED_TIMEOUT: Self = Self(0x40);

    /// Build from a raw option byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw option byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Union of two option sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Receive options bitfield.
///
/// Bit 1 marks a PAN broadcast and bit 2 an address broadcast; either one
/// makes the carrying frame a broadcast reception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveOptions(u8);

impl ReceiveOptions {
    /// Packet was acknowledged.
    pub const ACKNOWLEDGED: Self = Self(0x01);

    /// Packet was a PAN broadcast.
    pub const PAN_BROADCAST: Self = Self(0x02);

    /// Packet was an address broadcast.
    pub const ADDRESS_BROADCAST: Self = Self(0x04);

    /// Build from a raw option byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw option byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether either broadcast bit is set.
    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        self.0 & (Self::PAN_BROADCAST.0 | Self::ADDRESS_BROADCAST.0) != 0
    }
}
