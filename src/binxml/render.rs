//! Canonical text rendering of decoded values.
//!
//! Both the XML writer and the structured-field extractor go through this
//! single renderer so the two views can never disagree on formatting.

use std::fmt::Write;

use crate::binxml::value::BinXmlValue;
use crate::utils::time::{render_filetime, render_systemtime};

/// Render `value` into `out` as canonical text.
///
/// Nested BinXml values are the interpreter's concern and render as nothing
/// here; arrays join their elements with a comma.
pub(crate) fn write_value_text(out: &mut String, value: &BinXmlValue<'_>) {
    match value {
        BinXmlValue::Null => {}
        BinXmlValue::String(s) => out.push_str(s),
        BinXmlValue::AnsiString(s) => out.push_str(s),
        BinXmlValue::Int8(v) => write_int(out, *v as i64),
        BinXmlValue::UInt8(v) => write_uint(out, *v as u64),
        BinXmlValue::Int16(v) => write_int(out, *v as i64),
        BinXmlValue::UInt16(v) => write_uint(out, *v as u64),
        BinXmlValue::Int32(v) => write_int(out, *v as i64),
        BinXmlValue::UInt32(v) => write_uint(out, *v as u64),
        BinXmlValue::Int64(v) => write_int(out, *v),
        BinXmlValue::UInt64(v) => write_uint(out, *v),
        BinXmlValue::Real32(v) => {
            write!(out, "{v}").expect("writing to a String cannot fail")
        }
        BinXmlValue::Real64(v) => {
            write!(out, "{v}").expect("writing to a String cannot fail")
        }
        BinXmlValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        BinXmlValue::Binary(bytes) => {
            for b in *bytes {
                write!(out, "{b:02X}").expect("writing to a String cannot fail");
            }
        }
        BinXmlValue::Guid(guid) => {
            write!(out, "{guid}").expect("writing to a String cannot fail")
        }
        BinXmlValue::SizeT(v) => write_uint(out, *v),
        BinXmlValue::FileTime(ticks) => out.push_str(&render_filetime(*ticks)),
        BinXmlValue::SysTime(fields) => out.push_str(&render_systemtime(*fields)),
        BinXmlValue::Sid(sid) => {
            write!(out, "{sid}").expect("writing to a String cannot fail")
        }
        BinXmlValue::HexInt32(v) => {
            write!(out, "0x{v:08X}").expect("writing to a String cannot fail")
        }
        BinXmlValue::HexInt64(v) => {
            write!(out, "0x{v:016X}").expect("writing to a String cannot fail")
        }
        // Nested fragments are expanded by the interpreter before any
        // rendering; one reaching this point renders as nothing.
        BinXmlValue::BinXml(_) => {}
        BinXmlValue::Array(elements) => {
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value_text(out, element);
            }
        }
    }
}

pub(crate) fn render_value_text(value: &BinXmlValue<'_>) -> String {
    let mut out = String::new();
    write_value_text(&mut out, value);
    out
}

#[inline]
fn write_int(out: &mut String, v: i64) {
    write!(out, "{v}").expect("writing to a String cannot fail");
}

#[inline]
fn write_uint(out: &mut String, v: u64) {
    write!(out, "{v}").expect("writing to a String cannot fail");
}
