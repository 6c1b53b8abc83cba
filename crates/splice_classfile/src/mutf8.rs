//! Modified UTF-8, the string encoding of `CONSTANT_Utf8` entries.
//!
//! Differs from UTF-8 in two ways: NUL is written as `C0 80`, and
//! supplementary characters are written as a surrogate pair of two
//! three-byte sequences.

use crate::error::{ClassFileError, ClassFileResult};

/// Encode a string as modified UTF-8.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut units = [0u16; 2];
    for ch in text.chars() {
        let code = ch as u32;
        if code == 0 {
            out.extend_from_slice(&[0xC0, 0x80]);
        } else if code < 0x80 {
            out.push(code as u8);
        } else if code < 0x800 {
            out.push(0xC0 | (code >> 6) as u8);
            out.push(0x80 | (code & 0x3F) as u8);
        } else {
            for unit in ch.encode_utf16(&mut units).iter() {
                let unit = u32::from(*unit);
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Decode modified UTF-8 into a `String`.
///
/// # Errors
///
/// Returns [`ClassFileError::InvalidUtf8`] on truncated sequences,
/// bad continuation bytes, or unpaired surrogates.
pub fn decode(bytes: &[u8]) -> ClassFileResult<String> {
    // Fast path: plain ASCII without NUL is identical in both encodings.
    if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
        return std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| ClassFileError::InvalidUtf8);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(ClassFileError::InvalidUtf8);
            }
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push((u16::from(b0 & 0x0F) << 12) | (u16::from(b1) << 6) | u16::from(b2));
            i += 3;
        } else {
            return Err(ClassFileError::InvalidUtf8);
        }
    }
    String::from_utf16(&units).map_err(|_| ClassFileError::InvalidUtf8)
}

fn continuation(bytes: &[u8], at: usize) -> ClassFileResult<u8> {
    match bytes.get(at) {
        Some(b) if b & 0xC0 == 0x80 => Ok(b & 0x3F),
        _ => Err(ClassFileError::InvalidUtf8),
    }
}
