//! # sketchport
//!
//! A library for detecting Arduino-compatible boards and uploading sketches
//! over serial.
//!
//! This crate provides the device-facing core of a sketch development tool:
//!
//! - USB descriptor-based board detection with a clone-aware signature table
//! - A layered identification ladder (descriptor → command probe →
//!   baud-rate detection → vendor fallback) that degrades, never fails
//! - Envelope wrapping for bare sketch logic (`setup()`/`loop()` markers)
//! - Chunked, paced sketch upload with cancellation
//! - A connection session state machine with observers, liveness polling,
//!   and silent auto-reconnect
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//! - **WASM** (experimental): Web browsers via the Web Serial API
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `wasm`: WASM/Web Serial API support (experimental)
//! - `serde`: Serialization support for port metadata
//!
//! ## Example
//!
//! ```rust,no_run
//! use sketchport::{Session, UploadOptions, upload};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Arc::new(Session::new());
//!
//!     // Pick the best candidate and connect (native only)
//!     #[cfg(feature = "native")]
//!     {
//!         let candidate = sketchport::auto_detect_port()?;
//!         let model = session.connect(&candidate, 9600)?;
//!         println!("Connected to {model}");
//!
//!         upload(
//!             &session,
//!             "digitalWrite(13, HIGH);\ndelay(500);",
//!             &UploadOptions::default(),
//!             |sent, total| println!("{sent}/{total}"),
//!         )?;
//!
//!         session.disconnect();
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod board;
pub mod error;
pub mod identify;
pub mod monitor;
pub mod port;
pub mod session;
pub mod sketch;
pub mod transport;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use {
    board::{auto_detect_port, find_port_by_pattern},
    port::{NativePort, NativePortEnumerator},
};
pub use {
    board::{
        BoardSignature, DetectedPort, GENERIC_BOARD, detect_board_ports, detect_ports,
        format_port_list, match_signature, vendor_fallback,
    },
    error::{SessionError, TransportError, UploadError},
    identify::{BAUD_CANDIDATES, detect_baud_rate, identify_model},
    monitor::{MonitorOptions, StatusMonitor},
    port::{DEFAULT_BAUD, Port, PortEnumerator, PortInfo, SerialConfig},
    session::{Session, SessionObserver, SessionState},
    sketch::{LOOP_MARKER, SETUP_MARKER, WrapOptions, is_wrapped, wrap},
    transport::{READ_CAP, Transport, line_or_cap},
    upload::{DEFAULT_CHUNK_DELAY, DEFAULT_CHUNK_SIZE, UploadOptions, upload},
};

#[cfg(feature = "wasm")]
pub use port::{WebSerialPort, WebSerialPortEnumerator};
