//! Rendering of received text into displayable line text.

use crate::domain::config::DisplayMode;
use std::fmt::Write;

/// Names of the ASCII control characters 0x00..=0x1F.
const CONTROL_NAMES: [&str; 32] = [
    "NUL", "SOH", "STX", "ETX", "EOT", "ENQ", "ACK", "BEL", "BS", "TAB", "LF", "VT", "FF", "CR",
    "SO", "SI", "DLE", "DC1", "DC2", "DC3", "DC4", "NAK", "SYN", "ETB", "CAN", "EM", "SUB", "ESC",
    "FS", "GS", "RS", "US",
];

/// Render one line segment (terminators already removed).
///
/// Text mode keeps printable characters, TAB and LF, and spells other control
/// characters as `<NAME>`. Hex mode prints every character as upper-case hex
/// followed by a space.
pub fn render(segment: &str, mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Text => render_text(segment),
        DisplayMode::Hex => render_hex(segment),
    }
}

fn render_text(segment: &str) -> String {
    if !segment.chars().any(needs_escape) {
        return segment.to_string();
    }

    let mut out = String::with_capacity(segment.len() + 8);
    for c in segment.chars() {
        if needs_escape(c) {
            out.push('<');
            out.push_str(CONTROL_NAMES[c as usize]);
            out.push('>');
        } else {
            out.push(c);
        }
    }
    out
}

fn render_hex(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() * 3);
    for c in segment.chars() {
        // Writing into a String cannot fail.
        let _ = write!(out, "{:02X} ", c as u32);
    }
    out
}

fn needs_escape(c: char) -> bool {
    (c as u32) < 0x20 && c != '\t' && c != '\n'
}
