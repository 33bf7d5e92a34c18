//! Layered board identification.
//!
//! Four escalating strategies, tried in fixed order, first success wins:
//!
//! 1. **Descriptor match** — VID/PID lookup in the signature table. No I/O.
//! 2. **Command/response probe** — a short list of known query strings, each
//!    with its own expected substring and timeout. A response that matches
//!    nothing is inconclusive, not an error.
//! 3. **Behavioral probe** — automatic baud-rate detection over a fixed
//!    candidate list, sniffing the first sane response for a board token.
//! 4. **Vendor fallback** — map the bare vendor id to its most common board,
//!    else the `generic` sentinel.
//!
//! Identification is advisory, not load-bearing: false negatives are
//! acceptable but hangs are not. Every probe carries its own timeout, every
//! failure is swallowed and logged, and `identify_model` always returns a
//! label.

use crate::board::{self, DetectedPort, GENERIC_BOARD};
use crate::transport::{Transport, line_or_cap};
use log::{debug, info};
use std::time::Duration;

/// One command/response probe: a query, the response substring that
/// confirms it, the board label it implies, and its own timeout.
#[derive(Debug)]
struct ProbeCommand {
    request: &'static [u8],
    expect: &'static str,
    label: &'static str,
    timeout: Duration,
}

/// Query strings known to elicit identifying responses. ESP AT firmware
/// answers `AT` with `OK`; common sketch conventions answer `ID?` with a
/// banner naming the board.
const PROBE_COMMANDS: &[ProbeCommand] = &[
    ProbeCommand {
        request: b"AT\r\n",
        expect: "ok",
        label: "esp8266",
        timeout: Duration::from_millis(500),
    },
    ProbeCommand {
        request: b"ID?\n",
        expect: "arduino",
        label: "uno",
        timeout: Duration::from_millis(400),
    },
    ProbeCommand {
        request: b"?\n",
        expect: "ready",
        label: "uno",
        timeout: Duration::from_millis(300),
    },
];

/// Ordered candidate rates for behavioral baud detection. 9600 first — the
/// classic sketch default — then descending by how common the rate is.
pub const BAUD_CANDIDATES: &[u32] = &[9600, 115_200, 57_600, 38_400, 19_200];

/// Per-rate response window during baud detection.
const BAUD_PROBE_TIMEOUT: Duration = Duration::from_millis(400);

/// Resolve a port to a best-effort board model label.
///
/// Never fails: exhaustion of all four strategies yields
/// [`GENERIC_BOARD`](crate::board::GENERIC_BOARD).
pub fn identify_model(transport: &Transport, port: &DetectedPort) -> String {
    // 1. Descriptor match: cheapest and most reliable signal, no I/O.
    if let Some(label) = descriptor_match(port) {
        info!("{}: identified '{label}' from USB descriptor", port.info.name);
        return label.to_string();
    }

    // 2..3. Increasingly speculative probes over the open transport.
    let probed = probe_commands(transport).or_else(|| behavioral_probe(transport));
    if let Some(label) = probed {
        info!("{}: identified '{label}' by probing", port.info.name);
        return label.to_string();
    }

    // 4. Vendor fallback, then the sentinel.
    let label = port
        .info
        .vid
        .and_then(board::vendor_fallback)
        .unwrap_or(GENERIC_BOARD);
    info!("{}: identification degraded to '{label}'", port.info.name);
    label.to_string()
}

/// Descriptor-match step alone (used by `scan`, which must not open ports).
#[must_use]
pub fn descriptor_match(port: &DetectedPort) -> Option<&'static str> {
    port.board.or_else(|| match (port.info.vid, port.info.pid) {
        (Some(vid), Some(pid)) => board::match_signature(vid, pid),
        _ => None,
    })
}

/// Send each probe command in order, stopping at the first response that
/// contains its expected substring. Write errors, timeouts, and unexpected
/// responses are all inconclusive.
fn probe_commands(transport: &Transport) -> Option<&'static str> {
    for probe in PROBE_COMMANDS {
        if let Err(e) = transport.clear_buffers() {
            debug!("probe {:?}: clear failed: {e}", probe.expect);
            continue;
        }
        if let Err(e) = transport.write(probe.request) {
            debug!("probe write failed: {e}");
            continue;
        }

        match transport.read_until(line_or_cap, probe.timeout) {
            Ok(response) => {
                let text = String::from_utf8_lossy(&response).to_lowercase();
                if text.contains(probe.expect) {
                    return Some(probe.label);
                }
                debug!("probe response did not match '{}': inconclusive", probe.expect);
            },
            Err(e) => {
                debug!("probe read failed: {e}");
            },
        }
    }
    None
}

/// Behavioral probe: find a rate the device answers at, then sniff the
/// response for a known board token. A live device with an unrecognizable
/// banner stays inconclusive and falls through to the vendor fallback.
fn behavioral_probe(transport: &Transport) -> Option<&'static str> {
    let (_, response) = detect_baud_rate_inner(transport)?;
    sniff_response(&response)
}

/// Cycle the candidate baud rates, returning the first that elicits a sane
/// response within its timeout, or `None` if none does.
///
/// Buffers are drained before and after every rate switch so a late reply
/// at the previous rate cannot be mistaken for the new rate's response.
/// Terminates within `BAUD_CANDIDATES.len() * BAUD_PROBE_TIMEOUT` of read
/// time.
pub fn detect_baud_rate(transport: &Transport) -> Option<u32> {
    detect_baud_rate_inner(transport).map(|(rate, _)| rate)
}

fn detect_baud_rate_inner(transport: &Transport) -> Option<(u32, Vec<u8>)> {
    let original = transport.baud_rate().ok();

    for &rate in BAUD_CANDIDATES {
        // Drain anything still queued from the previous rate before
        // switching, and again after, so stale bytes can't match.
        if let Err(e) = transport.clear_buffers() {
            debug!("baud {rate}: drain failed: {e}");
            continue;
        }
        if let Err(e) = transport.set_baud_rate(rate) {
            debug!("baud {rate}: switch failed: {e}");
            continue;
        }
        if transport.clear_buffers().is_err() {
            continue;
        }
        if let Err(e) = transport.write(b"\r\n") {
            debug!("baud {rate}: write failed: {e}");
            continue;
        }

        match transport.read_until(line_or_cap, BAUD_PROBE_TIMEOUT) {
            Ok(response) if is_sane_response(&response) => {
                info!("baud detection settled on {rate}");
                return Some((rate, response));
            },
            Ok(_) => debug!("baud {rate}: response not well-formed"),
            Err(e) => debug!("baud {rate}: {e}"),
        }
    }

    // No rate answered; put the port back where we found it.
    if let Some(rate) = original {
        let _ = transport.set_baud_rate(rate);
    }
    None
}

/// A sane response is non-empty and mostly printable ASCII/UTF-8 — line
/// noise from a mismatched rate shows up as high-bit garbage.
fn is_sane_response(response: &[u8]) -> bool {
    if response.is_empty() {
        return false;
    }
    let printable = response
        .iter()
        .filter(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
        .count();
    printable * 2 >= response.len()
}

/// Map a response banner to a board label.
fn sniff_response(response: &[u8]) -> Option<&'static str> {
    let text = String::from_utf8_lossy(response).to_lowercase();
    if text.contains("esp32") {
        Some("esp32")
    } else if text.contains("esp8266") || text.contains("nodemcu") {
        Some("esp8266")
    } else if text.contains("mega") {
        Some("mega2560")
    } else if text.contains("leonardo") {
        Some("leonardo")
    } else if text.contains("arduino") || text.contains("uno") {
        Some("uno")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortInfo;
    use crate::test_support::MockPort;
    use std::sync::atomic::Ordering;

    fn detected(vid: Option<u16>, pid: Option<u16>) -> DetectedPort {
        DetectedPort::from_info(PortInfo {
            name: "mock0".to_string(),
            vid,
            pid,
            manufacturer: None,
            product: None,
            serial_number: None,
        })
    }

    /// Eight junk replies: enough for every command probe and baud attempt,
    /// each terminated so reads return immediately instead of spinning out
    /// their timeouts.
    fn junk_script() -> Vec<Vec<u8>> {
        (0..8).map(|_| vec![0xFE, 0xFF, 0x81, 0x83, b'\n']).collect()
    }

    #[test]
    fn test_descriptor_match_requires_no_io() {
        let (port, handles) = MockPort::new(vec![b"should never be read\r\n".to_vec()]);
        let transport = Transport::from_port(Box::new(port));

        let label = identify_model(&transport, &detected(Some(0x2341), Some(0x0043)));

        assert_eq!(label, "uno");
        assert_eq!(handles.read_calls.load(Ordering::SeqCst), 0);
        assert!(handles.written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_probe_command_match() {
        // First probe (AT) gets an "OK" banner
        let (port, _) = MockPort::new(vec![b"OK\r\n".to_vec()]);
        let transport = Transport::from_port(Box::new(port));

        let label = identify_model(&transport, &detected(Some(0xBEEF), Some(0x0001)));
        assert_eq!(label, "esp8266");
    }

    #[test]
    fn test_probe_inconclusive_falls_through_to_next_command() {
        // AT probe gets an unrelated banner (inconclusive, not an error),
        // ID? probe then matches
        let (port, _) = MockPort::new(vec![
            b"booting...\r\n".to_vec(),
            b"Arduino Uno ID\r\n".to_vec(),
        ]);
        let transport = Transport::from_port(Box::new(port));

        let label = identify_model(&transport, &detected(Some(0xBEEF), Some(0x0001)));
        assert_eq!(label, "uno");
    }

    #[test]
    fn test_unknown_vendor_with_no_matches_yields_generic() {
        let (port, _) = MockPort::new(junk_script());
        let transport = Transport::from_port(Box::new(port));

        let label = identify_model(&transport, &detected(Some(0xBEEF), Some(0x0001)));
        assert_eq!(label, GENERIC_BOARD);
    }

    #[test]
    fn test_vendor_fallback_after_failed_probes() {
        // Official Arduino VID with an unlisted PID and a mute device:
        // strategies 1-3 fail, vendor fallback supplies "uno"
        let (port, _) = MockPort::new(junk_script());
        let transport = Transport::from_port(Box::new(port));

        let label = identify_model(&transport, &detected(Some(0x2341), Some(0xFFFF)));
        assert_eq!(label, "uno");
    }

    #[test]
    fn test_identification_survives_closed_transport() {
        let (port, _) = MockPort::new(vec![]);
        let transport = Transport::from_port(Box::new(port));
        transport.close();

        // Every probe errors out; identification still returns a label
        let label = identify_model(&transport, &detected(None, None));
        assert_eq!(label, GENERIC_BOARD);
    }

    #[test]
    fn test_detect_baud_rate_first_sane_rate_wins() {
        let (port, _) = MockPort::new(vec![]);
        let port = port.with_baud_responses(vec![
            (9600, vec![]),
            (115_200, vec![b"hello from sketch\r\n".to_vec()]),
            (57_600, vec![b"later\r\n".to_vec()]),
        ]);
        let transport = Transport::from_port(Box::new(port));

        assert_eq!(detect_baud_rate(&transport), Some(115_200));
        // The transport is left at the detected rate
        assert_eq!(transport.baud_rate().unwrap(), 115_200);
    }

    #[test]
    fn test_detect_baud_rate_none_when_device_mute() {
        // Garbage-only replies at every rate: terminated quickly but never sane
        let scripts: Vec<(u32, Vec<Vec<u8>>)> = BAUD_CANDIDATES
            .iter()
            .map(|&b| (b, vec![vec![0xFE, 0xFF, 0x81, 0x83, 0x90, 0x00, b'\n']]))
            .collect();
        let (port, _) = MockPort::new(vec![]);
        let port = port.with_baud_responses(scripts);
        let transport = Transport::from_port(Box::new(port));

        assert_eq!(detect_baud_rate(&transport), None);
        // Original rate restored after exhausting the candidates
        assert_eq!(transport.baud_rate().unwrap(), 9600);
    }

    #[test]
    fn test_sniff_response_tokens() {
        assert_eq!(sniff_response(b"ESP32 ready"), Some("esp32"));
        assert_eq!(sniff_response(b"Arduino Mega bootloader"), Some("mega2560"));
        assert_eq!(sniff_response(b"hello world"), None);
    }

    #[test]
    fn test_is_sane_response() {
        assert!(is_sane_response(b"hello\r\n"));
        assert!(!is_sane_response(b""));
        assert!(!is_sane_response(&[0xFE, 0xFF, 0x81, 0x83]));
    }
}
