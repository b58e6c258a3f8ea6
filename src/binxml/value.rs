//! Typed BinXml value decoding.
//!
//! Values appear inline (`Value` tokens) and as substitution payloads; both
//! carry a one-byte type tag and an explicit byte length. Array types set
//! the high bit (`base | 0x80`) and concatenate elements of the base type.

use encoding::{DecoderTrap, EncodingRef};

use crate::err::{EvtxError, Result};
use crate::guid::Guid;
use crate::ntsid::Sid;
use crate::utils;

const ARRAY_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinXmlValueType {
    Null,
    String,
    AnsiString,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Real32,
    Real64,
    Bool,
    Binary,
    Guid,
    SizeT,
    FileTime,
    SysTime,
    Sid,
    HexInt32,
    HexInt64,
    BinXml,
}

impl BinXmlValueType {
    pub fn from_u8(byte: u8) -> Option<BinXmlValueType> {
        match byte {
            0x00 => Some(BinXmlValueType::Null),
            0x01 => Some(BinXmlValueType::String),
            0x02 => Some(BinXmlValueType::AnsiString),
            0x03 => Some(BinXmlValueType::Int8),
            0x04 => Some(BinXmlValueType::UInt8),
            0x05 => Some(BinXmlValueType::Int16),
            0x06 => Some(BinXmlValueType::UInt16),
            0x07 => Some(BinXmlValueType::Int32),
            0x08 => Some(BinXmlValueType::UInt32),
            0x09 => Some(BinXmlValueType::Int64),
            0x0a => Some(BinXmlValueType::UInt64),
            0x0b => Some(BinXmlValueType::Real32),
            0x0c => Some(BinXmlValueType::Real64),
            0x0d => Some(BinXmlValueType::Bool),
            0x0e => Some(BinXmlValueType::Binary),
            0x0f => Some(BinXmlValueType::Guid),
            0x10 => Some(BinXmlValueType::SizeT),
            0x11 => Some(BinXmlValueType::FileTime),
            0x12 => Some(BinXmlValueType::SysTime),
            0x13 => Some(BinXmlValueType::Sid),
            0x14 => Some(BinXmlValueType::HexInt32),
            0x15 => Some(BinXmlValueType::HexInt64),
            0x21 => Some(BinXmlValueType::BinXml),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BinXmlValueType::Null => "Null",
            BinXmlValueType::String => "String",
            BinXmlValueType::AnsiString => "AnsiString",
            BinXmlValueType::Int8 => "Int8",
            BinXmlValueType::UInt8 => "UInt8",
            BinXmlValueType::Int16 => "Int16",
            BinXmlValueType::UInt16 => "UInt16",
            BinXmlValueType::Int32 => "Int32",
            BinXmlValueType::UInt32 => "UInt32",
            BinXmlValueType::Int64 => "Int64",
            BinXmlValueType::UInt64 => "UInt64",
            BinXmlValueType::Real32 => "Real32",
            BinXmlValueType::Real64 => "Real64",
            BinXmlValueType::Bool => "Bool",
            BinXmlValueType::Binary => "Binary",
            BinXmlValueType::Guid => "Guid",
            BinXmlValueType::SizeT => "SizeT",
            BinXmlValueType::FileTime => "FileTime",
            BinXmlValueType::SysTime => "SysTime",
            BinXmlValueType::Sid => "Sid",
            BinXmlValueType::HexInt32 => "HexInt32",
            BinXmlValueType::HexInt64 => "HexInt64",
            BinXmlValueType::BinXml => "BinXml",
        }
    }

    /// Fixed element width, where one exists. Strings, binary, SIDs and
    /// nested BinXml are variable-width; `SizeT` is disambiguated by the
    /// descriptor size.
    fn fixed_width(&self) -> Option<usize> {
        match self {
            BinXmlValueType::Int8 | BinXmlValueType::UInt8 => Some(1),
            BinXmlValueType::Int16 | BinXmlValueType::UInt16 => Some(2),
            BinXmlValueType::Int32
            | BinXmlValueType::UInt32
            | BinXmlValueType::Real32
            | BinXmlValueType::Bool
            | BinXmlValueType::HexInt32 => Some(4),
            BinXmlValueType::Int64
            | BinXmlValueType::UInt64
            | BinXmlValueType::Real64
            | BinXmlValueType::FileTime
            | BinXmlValueType::HexInt64 => Some(8),
            BinXmlValueType::Guid | BinXmlValueType::SysTime => Some(16),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinXmlValue<'a> {
    Null,
    String(String),
    AnsiString(String),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Real32(f32),
    Real64(f64),
    Bool(bool),
    Binary(&'a [u8]),
    Guid(Guid),
    SizeT(u64),
    /// Raw FILETIME ticks; rendering converts to ISO-8601.
    FileTime(u64),
    SysTime([u16; 8]),
    Sid(Sid),
    HexInt32(u32),
    HexInt64(u64),
    /// A nested BinXml fragment. The codec does not interpret it; the
    /// interpreter renders the fragment's output in place.
    BinXml(&'a [u8]),
    Array(Vec<BinXmlValue<'a>>),
}

impl<'a> BinXmlValue<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, BinXmlValue::Null)
    }
}

fn decode_error(
    value_type: BinXmlValueType,
    offset: usize,
    wanted: usize,
    remaining: usize,
) -> EvtxError {
    EvtxError::ValueDecode {
        offset,
        value_type: value_type.name(),
        wanted,
        remaining,
    }
}

/// Decode a single value of `value_type` from `bytes`.
///
/// `offset` is the chunk-relative position of `bytes`, used only for error
/// context. Size-zero payloads decode to [`BinXmlValue::Null`].
pub fn decode_value<'a>(
    type_byte: u8,
    bytes: &'a [u8],
    offset: usize,
    ansi_codec: EncodingRef,
) -> Result<BinXmlValue<'a>> {
    if type_byte & ARRAY_FLAG != 0 {
        let base = BinXmlValueType::from_u8(type_byte & !ARRAY_FLAG)
            .ok_or(EvtxError::InvalidValueType {
                value: type_byte,
                offset,
            })?;
        return decode_array(base, bytes, offset, ansi_codec);
    }

    let value_type = BinXmlValueType::from_u8(type_byte).ok_or(EvtxError::InvalidValueType {
        value: type_byte,
        offset,
    })?;

    if bytes.is_empty() && value_type != BinXmlValueType::Null {
        return Ok(BinXmlValue::Null);
    }

    decode_scalar(value_type, bytes, offset, ansi_codec).map(|(value, _)| value)
}

/// Decode one element, returning it and the bytes it consumed.
fn decode_scalar<'a>(
    value_type: BinXmlValueType,
    bytes: &'a [u8],
    offset: usize,
    ansi_codec: EncodingRef,
) -> Result<(BinXmlValue<'a>, usize)> {
    if let Some(width) = value_type.fixed_width() {
        if bytes.len() < width {
            return Err(decode_error(value_type, offset, width, bytes.len()));
        }
    }

    let value = match value_type {
        BinXmlValueType::Null => (BinXmlValue::Null, bytes.len()),
        BinXmlValueType::String => {
            let s = utils::utf16_le_to_string(bytes)
                .ok_or(EvtxError::FailedToDecodeUTF16String { offset })?;
            (BinXmlValue::String(s), bytes.len())
        }
        BinXmlValueType::AnsiString => {
            let s = ansi_codec
                .decode(bytes, DecoderTrap::Replace)
                .map_err(|_| EvtxError::FailedToDecodeAnsiString {
                    encoding: ansi_codec.name(),
                    offset,
                })?;
            // Some providers NUL-terminate ansi payloads.
            (BinXmlValue::AnsiString(s.trim_end_matches('\0').to_string()), bytes.len())
        }
        BinXmlValueType::Int8 => (BinXmlValue::Int8(bytes[0] as i8), 1),
        BinXmlValueType::UInt8 => (BinXmlValue::UInt8(bytes[0]), 1),
        BinXmlValueType::Int16 => (BinXmlValue::Int16(le_u16(bytes) as i16), 2),
        BinXmlValueType::UInt16 => (BinXmlValue::UInt16(le_u16(bytes)), 2),
        BinXmlValueType::Int32 => (BinXmlValue::Int32(le_u32(bytes) as i32), 4),
        BinXmlValueType::UInt32 => (BinXmlValue::UInt32(le_u32(bytes)), 4),
        BinXmlValueType::Int64 => (BinXmlValue::Int64(le_u64(bytes) as i64), 8),
        BinXmlValueType::UInt64 => (BinXmlValue::UInt64(le_u64(bytes)), 8),
        BinXmlValueType::Real32 => (BinXmlValue::Real32(f32::from_bits(le_u32(bytes))), 4),
        BinXmlValueType::Real64 => (BinXmlValue::Real64(f64::from_bits(le_u64(bytes))), 8),
        // Bool is a 4-byte u32; any nonzero value is true.
        BinXmlValueType::Bool => (BinXmlValue::Bool(le_u32(bytes) != 0), 4),
        BinXmlValueType::Binary => (BinXmlValue::Binary(bytes), bytes.len()),
        BinXmlValueType::Guid => {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(&bytes[..16]);
            (BinXmlValue::Guid(Guid::from_le_bytes(&guid)), 16)
        }
        BinXmlValueType::SizeT => match bytes.len() {
            4 => (BinXmlValue::SizeT(u64::from(le_u32(bytes))), 4),
            8 => (BinXmlValue::SizeT(le_u64(bytes)), 8),
            other => return Err(decode_error(value_type, offset, 8, other)),
        },
        BinXmlValueType::FileTime => (BinXmlValue::FileTime(le_u64(bytes)), 8),
        BinXmlValueType::SysTime => {
            let mut fields = [0u16; 8];
            for (i, field) in fields.iter_mut().enumerate() {
                *field = le_u16(&bytes[i * 2..]);
            }
            (BinXmlValue::SysTime(fields), 16)
        }
        BinXmlValueType::Sid => {
            let (sid, consumed) = Sid::from_bytes(bytes)
                .ok_or_else(|| decode_error(value_type, offset, 8, bytes.len()))?;
            (BinXmlValue::Sid(sid), consumed)
        }
        BinXmlValueType::HexInt32 => (BinXmlValue::HexInt32(le_u32(bytes)), 4),
        BinXmlValueType::HexInt64 => (BinXmlValue::HexInt64(le_u64(bytes)), 8),
        BinXmlValueType::BinXml => (BinXmlValue::BinXml(bytes), bytes.len()),
    };

    Ok(value)
}

fn decode_array<'a>(
    base: BinXmlValueType,
    bytes: &'a [u8],
    offset: usize,
    ansi_codec: EncodingRef,
) -> Result<BinXmlValue<'a>> {
    // Nested BinXml does not array.
    if base == BinXmlValueType::BinXml {
        return Err(EvtxError::InvalidValueType {
            value: 0x21 | ARRAY_FLAG,
            offset,
        });
    }

    if bytes.is_empty() {
        return Ok(BinXmlValue::Array(Vec::new()));
    }

    // String array elements are NUL-terminated rather than length-prefixed.
    if base == BinXmlValueType::String {
        let strings = utils::utf16_le_string_array(bytes)
            .ok_or(EvtxError::FailedToDecodeUTF16String { offset })?;
        return Ok(BinXmlValue::Array(
            strings.into_iter().map(BinXmlValue::String).collect(),
        ));
    }

    let mut elements = Vec::new();
    let mut rest = bytes;
    let mut rest_offset = offset;

    while !rest.is_empty() {
        let (value, consumed) = decode_scalar(base, rest, rest_offset, ansi_codec)?;
        elements.push(value);
        rest = &rest[consumed..];
        rest_offset += consumed;
    }

    Ok(BinXmlValue::Array(elements))
}

#[inline]
fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[inline]
fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
fn le_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}
