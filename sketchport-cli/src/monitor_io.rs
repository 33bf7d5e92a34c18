//! Text handling for the serial monitor.
//!
//! Serial streams arrive in arbitrary byte chunks, so a UTF-8 sequence can
//! be split across reads. [`drain_lossy`] emits everything decodable now,
//! keeps an incomplete trailing sequence in the buffer for the next read,
//! and replaces genuinely invalid bytes with `�` instead of stalling.

/// Drain buffered bytes into displayable text.
pub fn drain_lossy(buffer: &mut Vec<u8>) -> String {
    let keep = incomplete_suffix_len(buffer);
    let ready_len = buffer.len() - keep;
    let out = String::from_utf8_lossy(&buffer[..ready_len]).into_owned();
    buffer.drain(..ready_len);
    out
}

/// Length of an incomplete UTF-8 sequence at the end of `buf`, if any.
///
/// Scans back at most three bytes looking for a multi-byte lead whose
/// sequence isn't finished yet. Anything else (ASCII, a completed
/// sequence, or plain garbage) drains immediately.
fn incomplete_suffix_len(buf: &[u8]) -> usize {
    for back in 1..=buf.len().min(3) {
        let byte = buf[buf.len() - back];
        if byte < 0x80 {
            // ASCII: nothing pending
            return 0;
        }
        if byte >= 0xC0 {
            // Lead byte: how many bytes should its sequence have?
            let need = if byte >= 0xF0 {
                4
            } else if byte >= 0xE0 {
                3
            } else {
                2
            };
            return if need > back { back } else { 0 };
        }
        // Continuation byte: keep scanning backwards
    }
    0
}

/// Filter non-printable control characters for cleaner monitor output.
///
/// Keeps `\n`, `\t`, and printable chars; converts `\r` to `\n`; drops
/// other control characters.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' | '\t' => out.push(ch),
            '\r' => out.push('\n'),
            _ if ch.is_control() => {},
            _ => out.push(ch),
        }
    }
    out
}
