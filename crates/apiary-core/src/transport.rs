//! Transport abstraction.
//!
//! The core drives any byte-stream transport — a serial port, a BLE GATT
//! connection, a TCP socket — through this seam. Concrete drivers live
//! outside the core; tests script one in memory.
//!
//! Read and write take `&self`: real transports (serial ports, sockets)
//! support concurrent read/write halves, and implementations keep whatever
//! interior state they need. The core guarantees it never issues two
//! concurrent writes (the session serializes the write path at frame
//! granularity) and only the reader task ever reads.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// What kind of link a transport is.
///
/// The session needs this once, at open: BLE links skip mode determination
/// (they are always API mode) and run the authentication handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// UART / serial port.
    Serial,
    /// Bluetooth Low Energy GATT link.
    Ble,
    /// TCP socket (e.g. a serial-over-network bridge).
    Tcp,
}

/// Session keys produced by the Bluetooth authentication handshake.
///
/// Installed into the transport, which performs per-frame encryption
/// transparently from then on; the core never sees ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// AES-256-CTR session key.
    pub key: [u8; 32],
    /// Counter nonce for the transmit direction.
    pub tx_nonce: [u8; 12],
    /// Counter nonce for the receive direction.
    pub rx_nonce: [u8; 12],
}

/// Byte-stream transport consumed by the session core.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the underlying link.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the underlying link. Blocked reads return promptly.
    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Kind of link this is.
    fn kind(&self) -> TransportKind;

    /// Read available bytes into `buf`, waiting up to `timeout`.
    ///
    /// Returns the number of bytes read; `0` means the timeout elapsed
    /// with no data, which is not an error.
    ///
    /// # Errors
    ///
    /// - `TransportError::Closed` once the link is closed.
    async fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Write all of `buf`.
    ///
    /// # Errors
    ///
    /// - `TransportError::Closed` once the link is closed.
    async fn write_all(&self, buf: &[u8]) -> Result<(), TransportError>;

    /// Install session encryption keys (BLE transports only).
    ///
    /// # Errors
    ///
    /// - `TransportError::NotSupported` for transports without a crypto
    ///   layer (the default).
    fn set_encryption_keys(&self, keys: SessionKeys) -> Result<(), TransportError> {
        let _ = keys;
        Err(TransportError::NotSupported)
    }
}

/// Bluetooth authentication collaborator.
///
/// The SRP handshake itself is out of scope for the core; whatever
/// implements it hands back the session keys to install into the
/// transport. Implementations carry their own credentials.
#[async_trait]
pub trait BleAuthenticator: Send + Sync {
    /// Run the handshake and return the negotiated session keys.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::AuthFailure`](crate::error::DeviceError::AuthFailure)
    ///   when the peer rejects the credentials or the handshake cannot
    ///   complete.
    async fn authenticate(&self) -> Result<SessionKeys, crate::error::DeviceError>;
}
