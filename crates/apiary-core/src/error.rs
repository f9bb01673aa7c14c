//! Error types for the session layer.
//!
//! Strongly-typed errors for the two layers the core spans: transport
//! failures (I/O, lifecycle) and device-level failures (mode handshake,
//! AT command status, transmit delivery). We avoid `std::io::Error` for
//! protocol logic to keep failures matchable.

use std::time::Duration;

use thiserror::Error;

use apiary_proto::{AtCmd, AtCommandStatus, DeliveryStatus, OperatingMode, ProtocolError};

/// Errors reported by a [`Transport`](crate::transport::Transport)
/// implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport is not open, or closed mid-operation.
    #[error("transport closed")]
    Closed,

    /// The operation did not complete within its window.
    #[error("transport timed out")]
    TimedOut,

    /// The transport does not support the requested operation
    /// (e.g. encryption keys on a serial port).
    #[error("operation not supported by this transport")]
    NotSupported,

    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Errors reported by device-level operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Caller-supplied value is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The session is closed.
    #[error("interface is closed")]
    InterfaceClosed,

    /// `open()` was called on an already-open session.
    #[error("interface is already open")]
    AlreadyOpen,

    /// The module's operating mode does not allow API frames.
    #[error("operating mode {0:?} does not support API frames")]
    InvalidMode(OperatingMode),

    /// No response arrived within the configured window.
    #[error("timed out after {0:?} waiting for a response")]
    Timeout(Duration),

    /// A transmit request was not delivered.
    #[error("transmit failed: {0}")]
    TransmitFailed(DeliveryStatus),

    /// An AT command returned a non-OK status.
    #[error("AT command {command} failed: {status}")]
    AtCommand {
        /// Command that failed.
        command: AtCmd,
        /// Status the module returned.
        status: AtCommandStatus,
    },

    /// An AT command answered OK with an empty value where one was
    /// expected.
    #[error("AT command {0} returned no value")]
    AtCommandEmpty(AtCmd),

    /// Wire-layer failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The device's derived protocol disagrees with the one the session
    /// was configured to expect.
    #[error("device speaks {found:?}, expected {expected:?}")]
    WrongProtocol {
        /// Protocol the session was configured for.
        expected: crate::protocol::XbeeProtocol,
        /// Protocol derived from the hardware/firmware versions.
        found: crate::protocol::XbeeProtocol,
    },

    /// Bluetooth authentication could not complete.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// The operation does not apply to this protocol or role.
    #[error("operation not supported: {0}")]
    OperationNotSupported(&'static str),

    /// Underlying transport failure.
    #[error(transparent)]
    Transport(TransportError),
}

impl DeviceError {
    /// Whether retrying the operation may succeed.
    ///
    /// Timeouts are transient; everything else indicates a configuration,
    /// protocol, or lifecycle problem that a retry will not fix.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(TransportError::TimedOut))
    }
}

/// Transport failures map onto the session lifecycle: a closed transport
/// means a closed interface, everything else stays a transport error.
impl From<TransportError> for DeviceError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Self::InterfaceClosed,
            other => Self::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient() {
        assert!(DeviceError::Timeout(Duration::from_millis(2000)).is_transient());
        assert!(DeviceError::Transport(TransportError::TimedOut).is_transient());
        assert!(!DeviceError::InterfaceClosed.is_transient());
        assert!(!DeviceError::TransmitFailed(DeliveryStatus::RouteNotFound).is_transient());
    }

    #[test]
    fn closed_transport_becomes_interface_closed() {
        assert_eq!(DeviceError::from(TransportError::Closed), DeviceError::InterfaceClosed);
        assert_eq!(
            DeviceError::from(TransportError::TimedOut),
            DeviceError::Transport(TransportError::TimedOut)
        );
    }
}
