//! Sketch envelope wrapping.
//!
//! Bare logic handed to the uploader is wrapped in the minimal sketch
//! boilerplate: an initialization section declaring the communication baud
//! rate, and a repeating execution section holding the caller's source.
//! Wrap detection keys on the two entry-point markers, which makes the
//! operation idempotent — wrapping already-wrapped source is a no-op.

use crate::port::DEFAULT_BAUD;
use std::fmt::Write as _;

/// Marker for the initialization section.
pub const SETUP_MARKER: &str = "void setup";

/// Marker for the repeating execution section.
pub const LOOP_MARKER: &str = "void loop";

/// Options controlling envelope generation.
#[derive(Debug, Clone)]
pub struct WrapOptions {
    /// Baud rate declared in the initialization section.
    pub baud: u32,
    /// Library headers to `#include` above the envelope. Entries may be
    /// given bare (`Servo.h`) or bracketed (`<Servo.h>`).
    pub includes: Vec<String>,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            includes: Vec::new(),
        }
    }
}

/// Check whether source already carries both entry-point markers.
#[must_use]
pub fn is_wrapped(source: &str) -> bool {
    source.contains(SETUP_MARKER) && source.contains(LOOP_MARKER)
}

/// Wrap bare source in the minimal sketch envelope.
///
/// Source that already contains both entry-point markers passes through
/// unchanged, so `wrap(wrap(s)) == wrap(s)` for any input.
#[must_use]
pub fn wrap(source: &str, options: &WrapOptions) -> String {
    if is_wrapped(source) {
        return source.to_string();
    }

    let mut out = String::with_capacity(source.len() + 128);

    for include in &options.includes {
        let header = include.trim().trim_start_matches('<').trim_end_matches('>');
        let _ = writeln!(out, "#include <{header}>");
    }
    if !options.includes.is_empty() {
        out.push('\n');
    }

    let _ = writeln!(out, "void setup() {{");
    let _ = writeln!(out, "  Serial.begin({});", options.baud);
    let _ = writeln!(out, "}}");
    out.push('\n');
    let _ = writeln!(out, "void loop() {{");
    for line in source.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, "  {line}");
        }
    }
    let _ = writeln!(out, "}}");

    out
}
