//! Board discovery and classification.
//!
//! This module provides automatic serial port detection based on USB VID/PID,
//! similar to how espflash and arduino-cli resolve boards from port metadata.
//!
//! ## Signature table
//!
//! Arduino-compatible boards show up in three flavors:
//! - official boards with their own VID (0x2341 Arduino SA, 0x2A03 Arduino.org)
//!   and per-model PIDs,
//! - clones behind generic USB-UART bridges (CH340, FTDI, CP210x), where only
//!   the vendor id carries signal,
//! - vendor ecosystems with a house VID (Adafruit, SparkFun).
//!
//! The table therefore allows wildcard entries: an empty PID list matches the
//! vendor alone. The table is loaded once and immutable.

use crate::error::TransportError;
use crate::port::PortInfo;

#[cfg(feature = "native")]
use crate::port::{NativePortEnumerator, PortEnumerator};
#[cfg(feature = "native")]
use log::{debug, info, trace};

/// Sentinel label returned when identification degrades all the way down.
pub const GENERIC_BOARD: &str = "generic";

/// A static board signature: VID plus either specific PIDs or a wildcard.
#[derive(Debug, Clone, Copy)]
pub struct BoardSignature {
    /// USB vendor id.
    pub vid: u16,
    /// USB product ids; empty means "match vendor only" (clone wildcard).
    pub pids: &'static [u16],
    /// Board model label.
    pub label: &'static str,
}

/// Known USB signatures for Arduino-compatible boards.
///
/// Multiple entries share a vendor id: official Arduino VIDs carry one entry
/// per model, bridge-chip VIDs carry a single wildcard for the board most
/// commonly built around that bridge.
const BOARD_SIGNATURES: &[BoardSignature] = &[
    // Arduino SA
    BoardSignature { vid: 0x2341, pids: &[0x0043, 0x0001, 0x0243], label: "uno" },
    BoardSignature { vid: 0x2341, pids: &[0x0042, 0x0010], label: "mega2560" },
    BoardSignature { vid: 0x2341, pids: &[0x8036, 0x0036], label: "leonardo" },
    BoardSignature { vid: 0x2341, pids: &[0x8037, 0x0037], label: "micro" },
    BoardSignature { vid: 0x2341, pids: &[0x0058], label: "nano-every" },
    // Arduino.org (pre-merger boards reused the model PIDs)
    BoardSignature { vid: 0x2A03, pids: &[0x0043], label: "uno" },
    BoardSignature { vid: 0x2A03, pids: &[0x0042], label: "mega2560" },
    // USB-UART bridges: clones, identified by vendor alone
    BoardSignature { vid: 0x1A86, pids: &[], label: "uno" }, // CH340/CH341
    BoardSignature { vid: 0x0403, pids: &[], label: "nano" }, // FTDI
    BoardSignature { vid: 0x10C4, pids: &[], label: "esp32" }, // CP210x
    // Ecosystem vendors
    BoardSignature { vid: 0x239A, pids: &[], label: "feather" }, // Adafruit
    BoardSignature { vid: 0x1B4F, pids: &[], label: "pro-micro" }, // SparkFun
];

/// Single most common board per vendor, used as the last identification
/// strategy when no signature (including wildcards) matched the full pair.
const VENDOR_FALLBACK: &[(u16, &str)] = &[
    (0x2341, "uno"),
    (0x2A03, "uno"),
    (0x1A86, "uno"),
    (0x0403, "nano"),
    (0x10C4, "esp32"),
    (0x239A, "feather"),
    (0x1B4F, "pro-micro"),
];

/// Look up the exact VID/PID pair in the signature table.
///
/// Wildcard entries (empty PID list) match any product id for their vendor.
/// This is a pure table lookup with no device I/O.
#[must_use]
pub fn match_signature(vid: u16, pid: u16) -> Option<&'static str> {
    BOARD_SIGNATURES
        .iter()
        .find(|sig| sig.vid == vid && (sig.pids.is_empty() || sig.pids.contains(&pid)))
        .map(|sig| sig.label)
}

/// Map a bare vendor id to the most common board for that vendor.
#[must_use]
pub fn vendor_fallback(vid: u16) -> Option<&'static str> {
    VENDOR_FALLBACK
        .iter()
        .find(|(v, _)| *v == vid)
        .map(|(_, label)| *label)
}

/// Check whether a vendor id belongs to an official Arduino VID.
#[must_use]
pub fn is_official_vendor(vid: u16) -> bool {
    matches!(vid, 0x2341 | 0x2A03)
}

/// A discovered serial endpoint with its descriptor-matched board label.
#[derive(Debug, Clone)]
pub struct DetectedPort {
    /// Host-side port metadata.
    pub info: PortInfo,
    /// Board label from the signature table, if the descriptor matched.
    pub board: Option<&'static str>,
}

impl DetectedPort {
    /// Build from raw port metadata, running the descriptor match.
    #[must_use]
    pub fn from_info(info: PortInfo) -> Self {
        let board = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => match_signature(vid, pid),
            _ => None,
        };
        Self { info, board }
    }

    /// Check if the descriptor matched a known board signature.
    pub fn is_recognized(&self) -> bool {
        self.board.is_some()
    }

    /// Check if this port should be preferred during auto-selection.
    pub fn is_high_priority(&self) -> bool {
        self.info.vid.is_some_and(is_official_vendor)
    }
}

/// Detect all available serial ports, descriptor-matching each one.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|info| {
                let detected = DetectedPort::from_info(info);
                if let (Some(vid), Some(pid)) = (detected.info.vid, detected.info.pid) {
                    trace!(
                        "Found USB port: {} (VID: {vid:04X}, PID: {pid:04X}, board: {:?})",
                        detected.info.name, detected.board
                    );
                }
                detected
            })
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Detect all available serial ports (WASM stub - always returns empty).
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Detect ports whose descriptor matched a known board signature.
pub fn detect_board_ports() -> Vec<DetectedPort> {
    detect_ports()
        .into_iter()
        .filter(DetectedPort::is_recognized)
        .collect()
}

/// Auto-detect a single best board candidate.
///
/// Prefers official Arduino VIDs over bridge-chip clones, then any
/// recognized signature, then the first available port.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort, TransportError> {
    let ports = detect_ports();

    if let Some(port) = ports.iter().find(|p| p.is_high_priority()) {
        info!(
            "Auto-detected {} board: {}",
            port.board.unwrap_or(GENERIC_BOARD),
            port.info.name
        );
        return Ok(port.clone());
    }

    if let Some(port) = ports.iter().find(|p| p.is_recognized()) {
        info!(
            "Auto-detected likely {} (clone bridge): {}",
            port.board.unwrap_or(GENERIC_BOARD),
            port.info.name
        );
        return Ok(port.clone());
    }

    if let Some(port) = ports.into_iter().next() {
        info!("Using first available port: {}", port.info.name);
        return Ok(port);
    }

    Err(TransportError::DeviceUnavailable(
        "no serial ports found".to_string(),
    ))
}

/// Auto-detect a single board candidate (WASM stub - not supported).
#[cfg(not(feature = "native"))]
pub fn auto_detect_port() -> Result<DetectedPort, TransportError> {
    Err(TransportError::DeviceUnavailable(
        "port enumeration is not available in WASM; request a port via the Web Serial API"
            .to_string(),
    ))
}

/// Find an endpoint by name pattern.
#[cfg(feature = "native")]
pub fn find_port_by_pattern(pattern: &str) -> Result<DetectedPort, TransportError> {
    detect_ports()
        .into_iter()
        .find(|p| p.info.name.contains(pattern))
        .ok_or_else(|| TransportError::DeviceUnavailable(format!("no port matching '{pattern}'")))
}

/// Format a list of detected endpoints for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    let mut result = Vec::new();

    for port in ports {
        let board_info = if let Some(board) = port.board {
            format!(" [{board}]")
        } else if let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) {
            format!(" [VID:{vid:04X} PID:{pid:04X}]")
        } else {
            String::new()
        };

        let product_info = port
            .info
            .product
            .as_ref()
            .map(|p| format!(" - {p}"))
            .unwrap_or_default();

        result.push(format!("{}{}{}", port.info.name, board_info, product_info));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb_info(name: &str, vid: u16, pid: u16) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: Some(vid),
            pid: Some(pid),
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    #[test]
    fn test_match_signature_exact_pairs() {
        assert_eq!(match_signature(0x2341, 0x0043), Some("uno"));
        assert_eq!(match_signature(0x2341, 0x0042), Some("mega2560"));
        assert_eq!(match_signature(0x2341, 0x8036), Some("leonardo"));
        assert_eq!(match_signature(0x2A03, 0x0043), Some("uno"));
    }

    #[test]
    fn test_match_signature_wildcard_vendor() {
        // CH340 clones match on vendor alone, any PID
        assert_eq!(match_signature(0x1A86, 0x7523), Some("uno"));
        assert_eq!(match_signature(0x1A86, 0x0000), Some("uno"));
        assert_eq!(match_signature(0x10C4, 0xEA60), Some("esp32"));
    }

    #[test]
    fn test_match_signature_unknown_pair() {
        // Official vendor but unlisted PID: descriptor match fails,
        // leaving the vendor fallback to the identification ladder
        assert_eq!(match_signature(0x2341, 0xFFFF), None);
        assert_eq!(match_signature(0x1234, 0x5678), None);
    }

    #[test]
    fn test_vendor_fallback() {
        assert_eq!(vendor_fallback(0x2341), Some("uno"));
        assert_eq!(vendor_fallback(0x0403), Some("nano"));
        assert_eq!(vendor_fallback(0xBEEF), None);
    }

    #[test]
    fn test_detected_port_descriptor_match() {
        let port = DetectedPort::from_info(usb_info("/dev/ttyACM0", 0x2341, 0x0043));
        assert_eq!(port.board, Some("uno"));
        assert!(port.is_recognized());
        assert!(port.is_high_priority());
    }

    #[test]
    fn test_detected_port_clone_is_not_high_priority() {
        let port = DetectedPort::from_info(usb_info("/dev/ttyUSB0", 0x1A86, 0x7523));
        assert_eq!(port.board, Some("uno"));
        assert!(port.is_recognized());
        assert!(!port.is_high_priority());
    }

    #[test]
    fn test_detected_port_no_usb_metadata() {
        let port = DetectedPort::from_info(PortInfo {
            name: "/dev/ttyS0".to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        });
        assert!(port.board.is_none());
        assert!(!port.is_recognized());
        assert!(!port.is_high_priority());
    }

    #[test]
    fn test_format_port_list() {
        let ports = vec![
            DetectedPort::from_info(PortInfo {
                product: Some("Uno R3".to_string()),
                ..usb_info("/dev/ttyACM0", 0x2341, 0x0043)
            }),
            DetectedPort::from_info(usb_info("/dev/ttyUSB0", 0xBEEF, 0x0001)),
        ];

        let formatted = format_port_list(&ports);
        assert_eq!(formatted.len(), 2);
        assert!(formatted[0].contains("/dev/ttyACM0"));
        assert!(formatted[0].contains("[uno]"));
        assert!(formatted[0].contains("Uno R3"));
        assert!(formatted[1].contains("VID:BEEF"));
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_detect_ports_does_not_panic() {
        // Just make sure enumeration doesn't panic without hardware
        let _ = detect_ports();
    }
}
