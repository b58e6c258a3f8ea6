pub mod time;

use std::char::decode_utf16;

/// Decode a UTF-16LE byte slice into a `String`.
///
/// An odd trailing byte is rejected; a single trailing NUL code unit is
/// stripped (inline BinXml strings carry one, substitution strings usually
/// do not).
pub fn utf16_le_to_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let mut units = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        units.push(u16::from_le_bytes([pair[0], pair[1]]));
    }

    if units.last() == Some(&0) {
        units.pop();
    }

    decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// Split a UTF-16LE byte slice into NUL-terminated strings.
///
/// Used for string-typed value arrays, where elements are separated by a
/// NUL code unit and the final element may omit its terminator.
pub fn utf16_le_string_array(bytes: &[u8]) -> Option<Vec<String>> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let mut out = Vec::new();
    let mut current: Vec<u16> = Vec::new();

    for pair in bytes.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            out.push(decode_utf16(current.drain(..)).collect::<Result<String, _>>().ok()?);
        } else {
            current.push(unit);
        }
    }

    if !current.is_empty() {
        out.push(decode_utf16(current.drain(..)).collect::<Result<String, _>>().ok()?);
    }

    Some(out)
}
