// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured key events → terminal byte sequences.
//!
//! Raw printable text never comes through here; clients send it as stream
//! input. This encoder covers named keys plus chorded modifiers: ctrl on a
//! letter yields the C0 byte, alt prefixes ESC, and modified arrows use the
//! xterm `CSI 1;m` form.

use paseo_wire::KeyEvent;

/// Translate one key event. `None` for unknown keys.
pub fn encode_key(event: &KeyEvent) -> Option<Vec<u8>> {
    let lower = event.key.to_lowercase();

    // Arrows get the xterm modifier form when chorded.
    if let Some(letter) = arrow_letter(&lower) {
        let code = modifier_code(event);
        return Some(if code > 1 {
            format!("\x1b[1;{}{}", code, letter).into_bytes()
        } else {
            format!("\x1b[{}", letter).into_bytes()
        });
    }

    if let Some(named) = named_key(&lower) {
        return Some(apply_alt(event, named.to_vec()));
    }

    // Single characters: ctrl chords map to C0 controls.
    let mut chars = event.key.chars();
    let (Some(ch), None) = (chars.next(), chars.next()) else { return None };
    if event.ctrl {
        if ch.is_ascii_alphabetic() {
            let ctrl = (ch.to_ascii_uppercase() as u8).wrapping_sub(b'@');
            return Some(apply_alt(event, vec![ctrl]));
        }
        // Common non-letter control chords.
        let byte = match ch {
            '@' | ' ' => 0x00,
            '[' => 0x1b,
            '\\' => 0x1c,
            ']' => 0x1d,
            '^' => 0x1e,
            '_' => 0x1f,
            _ => return None,
        };
        return Some(apply_alt(event, vec![byte]));
    }
    if event.alt {
        let mut bytes = vec![0x1b];
        bytes.extend(ch.to_string().into_bytes());
        return Some(bytes);
    }
    None
}

fn arrow_letter(lower: &str) -> Option<char> {
    match lower {
        "up" | "arrowup" => Some('A'),
        "down" | "arrowdown" => Some('B'),
        "right" | "arrowright" => Some('C'),
        "left" | "arrowleft" => Some('D'),
        _ => None,
    }
}

/// xterm modifier parameter: 1 + shift(1) + alt(2) + ctrl(4) + meta(8).
fn modifier_code(event: &KeyEvent) -> u32 {
    1 + (event.shift as u32)
        + ((event.alt as u32) << 1)
        + ((event.ctrl as u32) << 2)
        + ((event.meta as u32) << 3)
}

fn apply_alt(event: &KeyEvent, bytes: Vec<u8>) -> Vec<u8> {
    if event.alt {
        let mut out = vec![0x1b];
        out.extend(bytes);
        out
    } else {
        bytes
    }
}

fn named_key(lower: &str) -> Option<&'static [u8]> {
    let bytes: &[u8] = match lower {
        "enter" | "return" => b"\r",
        "tab" => b"\t",
        "escape" | "esc" => b"\x1b",
        "backspace" => b"\x7f",
        "delete" | "del" => b"\x1b[3~",
        "home" => b"\x1b[H",
        "end" => b"\x1b[F",
        "pageup" | "page_up" => b"\x1b[5~",
        "pagedown" | "page_down" => b"\x1b[6~",
        "insert" => b"\x1b[2~",
        "space" => b" ",
        "f1" => b"\x1bOP",
        "f2" => b"\x1bOQ",
        "f3" => b"\x1bOR",
        "f4" => b"\x1bOS",
        "f5" => b"\x1b[15~",
        "f6" => b"\x1b[17~",
        "f7" => b"\x1b[18~",
        "f8" => b"\x1b[19~",
        "f9" => b"\x1b[20~",
        "f10" => b"\x1b[21~",
        "f11" => b"\x1b[23~",
        "f12" => b"\x1b[24~",
        _ => return None,
    };
    Some(bytes)
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
