//! Error types for sketchport.
//!
//! Errors are layered: [`TransportError`] for byte-level port I/O,
//! [`UploadError`] for sketch delivery, [`SessionError`] for connection
//! lifecycle. Identification has no error type of its own — the probe
//! ladder absorbs every failure and degrades to the `generic` label.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Error type for byte-level transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port is held by another process, or a concurrent reader holds
    /// the transport handle.
    #[error("Port busy: {0}")]
    PortBusy(String),

    /// The device disappeared or the handle was already released.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A read or probe did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Another write is in flight; interleaving writes would corrupt the
    /// byte stream.
    #[error("A write is already in progress")]
    WriteInProgress,

    /// The operation was interrupted by `cancel()` or `disconnect()`.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error from the underlying port.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Error type for sketch uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Upload requested while the session is not connected. No bytes were
    /// written.
    #[error("No device connected")]
    NotConnected,

    /// A chunk write failed; remaining chunks were aborted. Chunks already
    /// sent are not rolled back, so the device may hold a truncated program.
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] TransportError),
}

/// Error type for session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A connection attempt is already in progress.
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    /// Access to the granted device was revoked while in use.
    #[error("Hardware access revoked: {0}")]
    HardwareRevoked(String),

    /// Transport-level failure while opening or probing the port.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
