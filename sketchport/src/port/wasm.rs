//! WASM serial port implementation using Web Serial API.
//!
//! This module provides a serial port implementation for WASM targets
//! using the Web Serial API available in modern browsers.
//!
//! ## Requirements
//!
//! - Browser with Web Serial API support (Chrome, Edge, Opera)
//! - HTTPS or localhost (required for Web Serial API)
//! - User gesture to request port access
//!
//! ## Note
//!
//! The Web Serial API is inherently asynchronous, while our `Port` trait
//! is synchronous. This implementation uses blocking semantics where possible,
//! but full async support may be needed for optimal web performance.
//!
//! ## Example (JavaScript interop)
//!
//! ```javascript
//! // Request port from user
//! const port = await navigator.serial.requestPort();
//! await port.open({ baudRate: 9600 });
//!
//! // Pass to WASM
//! wasm_module.set_serial_port(port);
//! ```

use crate::error::TransportError;
use crate::port::{Port, PortEnumerator, PortInfo, SerialConfig};
use std::io::{Read, Write};
use std::time::Duration;

fn unsupported() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "Web Serial API support is not yet implemented",
    )
}

/// Web Serial port implementation.
///
/// This is a placeholder for future Web Serial API support.
/// The actual implementation will use `web-sys` bindings to the
/// Web Serial API.
pub struct WebSerialPort {
    name: String,
    baud_rate: u32,
    timeout: Duration,
    // TODO: Add web-sys Serial port handle once SerialPort stabilizes
    // port: web_sys::SerialPort,
    // reader: web_sys::ReadableStreamDefaultReader,
    // writer: web_sys::WritableStreamDefaultWriter,
}

impl WebSerialPort {
    /// Create a new Web Serial port.
    ///
    /// Note: In WASM, port opening must be initiated by a user gesture
    /// and is asynchronous. This constructor expects the port to already
    /// be opened from JavaScript.
    pub fn new(_config: &SerialConfig) -> Result<Self, TransportError> {
        Err(TransportError::DeviceUnavailable(
            "Web Serial API support is not yet implemented; use the native backend".to_string(),
        ))
    }

    /// Create from an existing JavaScript SerialPort object.
    ///
    /// This is the primary way to create a WebSerialPort in WASM,
    /// as port selection must be done via JavaScript user interaction.
    ///
    /// Note: This function is only available when targeting WASM and
    /// when the Web Serial API becomes stable in web-sys.
    #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
    pub fn from_js_port(
        _js_port: js_sys::Object, // Generic Object until web-sys stabilizes SerialPort
        name: String,
        baud_rate: u32,
    ) -> Result<Self, TransportError> {
        let _ = (&name, baud_rate);
        Err(TransportError::DeviceUnavailable(
            "Web Serial API support is not yet implemented".to_string(),
        ))
    }
}

impl Port for WebSerialPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        // Web Serial requires closing and reopening the port to change rate
        self.baud_rate = baud_rate;
        Err(TransportError::DeviceUnavailable(
            "Web Serial API support is not yet implemented".to_string(),
        ))
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl Read for WebSerialPort {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(unsupported())
    }
}

impl Write for WebSerialPort {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(unsupported())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Err(unsupported())
    }
}

/// Web Serial port enumerator.
///
/// The Web Serial API does not allow enumerating ports without user
/// interaction; `navigator.serial.getPorts()` only returns ports the user
/// has previously granted.
pub struct WebSerialPortEnumerator;

impl PortEnumerator for WebSerialPortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
        // TODO: bind navigator.serial.getPorts() once web-sys exposes it
        Ok(Vec::new())
    }
}
