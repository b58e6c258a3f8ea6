//! The BinXml token interpreter.
//!
//! A recursive-descent consumer over a single position into the chunk
//! bytes. It only ever seeks backward to read intern-table entries (names)
//! and template definitions. Substitution scope is an explicit stack of
//! instance frames: entering a template instance (or a nested BinXml
//! fragment's instance) pushes a frame, leaving pops it, so nested
//! substitutions always resolve against their own instance block.

use std::rc::Rc;

use encoding::EncodingRef;
use log::trace;

use crate::ChunkOffset;
use crate::binxml::name::NameTable;
use crate::binxml::render::render_value_text;
use crate::binxml::stream::ByteReader;
use crate::binxml::tokens::RawToken;
use crate::binxml::value::{BinXmlValue, decode_value};
use crate::err::{EvtxError, Result};
use crate::stats::{DefinitionInfo, TemplateStats};
use crate::template::{ChunkTemplateCache, GuidCache, TemplateBlob, TemplateDefinition, TemplateSource};
use crate::xml_output::{BinXmlOutput, XmlAttribute, XmlElement};

const MAX_ELEMENT_DEPTH: usize = 64;
const MAX_TEMPLATE_DEPTH: usize = 32;

/// Everything an interpreter run borrows from the surrounding chunk.
pub struct InterpreterContext<'a> {
    pub data: &'a [u8],
    pub chunk_index: u16,
    pub names: &'a NameTable,
    pub templates: &'a ChunkTemplateCache,
    pub global_templates: Option<&'a GuidCache>,
    pub ansi_codec: EncodingRef,
}

/// One substitution slot of the active template instance.
#[derive(Debug, Clone, Copy)]
struct SubstitutionEntry {
    /// Chunk-relative offset of the value bytes.
    offset: usize,
    size: u16,
    value_type: u8,
    /// Preserved but never interpreted.
    #[allow(dead_code)]
    reserved: u8,
}

struct Frame {
    substitutions: Vec<SubstitutionEntry>,
}

struct InterpState<'a, 'r> {
    ctx: &'r InterpreterContext<'a>,
    stats: &'r mut TemplateStats,
    frames: Vec<Frame>,
    depth: usize,
}

/// Interpret one record payload (a complete fragment, including its
/// FragmentHeader) starting at chunk offset `start`, emitting events into
/// `visitor`.
pub fn interpret_record(
    ctx: &InterpreterContext<'_>,
    start: usize,
    stats: &mut TemplateStats,
    visitor: &mut dyn BinXmlOutput,
) -> Result<()> {
    let mut state = InterpState {
        ctx,
        stats,
        frames: Vec::new(),
        depth: 0,
    };

    let mut reader = ByteReader::with_pos(ctx.data, start);
    visitor.visit_start_of_stream()?;
    run_body(&mut state, &mut reader, visitor)?;
    visitor.visit_end_of_stream()?;
    Ok(())
}

/// Consume tokens until EndOfStream at this nesting level.
fn run_body<'a>(
    state: &mut InterpState<'a, '_>,
    reader: &mut ByteReader<'a>,
    visitor: &mut dyn BinXmlOutput,
) -> Result<()> {
    loop {
        let offset = reader.pos();
        let byte = reader.read_u8()?;
        let token = RawToken::from_u8(byte).ok_or(EvtxError::InvalidToken {
            value: byte,
            offset,
        })?;
        trace!("{} at offset {}", token.name(), offset);

        match token {
            RawToken::EndOfStream => return Ok(()),
            RawToken::FragmentHeader => {
                // [major][minor][flags]
                reader.skip(3)?;
            }
            RawToken::OpenStartElement { has_attributes } => {
                parse_element(state, reader, visitor, has_attributes)?;
            }
            RawToken::TemplateInstance => {
                parse_template_instance(state, reader, visitor)?;
            }
            RawToken::Value { .. } => {
                let (value, value_offset) = read_inline_value(state, reader)?;
                emit_value(state, visitor, value, value_offset)?;
            }
            RawToken::NormalSubstitution => {
                content_substitution(state, reader, visitor, false)?;
            }
            RawToken::OptionalSubstitution => {
                content_substitution(state, reader, visitor, true)?;
            }
            RawToken::CDataSection => {
                let text = read_sized_utf16(reader)?;
                visitor.visit_cdata_section(&text)?;
            }
            RawToken::CharRef => {
                let value = reader.read_u16()?;
                visitor.visit_character_reference(value)?;
            }
            RawToken::EntityRef => {
                let name = read_name(state, reader)?;
                visitor.visit_entity_reference(&name)?;
            }
            RawToken::PITarget => {
                parse_processing_instruction(state, reader, visitor)?;
            }
            RawToken::EndElement
            | RawToken::CloseStartElement
            | RawToken::CloseEmptyElement
            | RawToken::Attribute { .. }
            | RawToken::PIData => {
                return Err(EvtxError::UnexpectedToken {
                    expected: "a fragment-level token",
                    found: byte,
                    offset,
                });
            }
        }
    }
}

fn parse_element<'a>(
    state: &mut InterpState<'a, '_>,
    reader: &mut ByteReader<'a>,
    visitor: &mut dyn BinXmlOutput,
    has_attributes: bool,
) -> Result<()> {
    if state.depth >= MAX_ELEMENT_DEPTH {
        return Err(EvtxError::NestingTooDeep {
            offset: reader.pos(),
            max_depth: MAX_ELEMENT_DEPTH,
        });
    }

    let _dependency_id = reader.read_u16()?;
    // The declared span is advisory here; termination is validated against
    // the EndElement token.
    let _data_size = reader.read_u32()?;
    let name = read_name(state, reader)?;

    let mut attributes = Vec::new();
    if has_attributes {
        while let Some(RawToken::Attribute { .. }) = RawToken::from_u8(reader.peek_u8()?) {
            reader.skip(1)?;
            let attr_name = read_name(state, reader)?;
            if let Some(value) = parse_attribute_value(state, reader)? {
                attributes.push(XmlAttribute {
                    name: attr_name,
                    value,
                });
            }
        }
    }

    let element = XmlElement {
        name: name.clone(),
        attributes,
    };

    let offset = reader.pos();
    let byte = reader.read_u8()?;
    match RawToken::from_u8(byte) {
        Some(RawToken::CloseStartElement) => {
            visitor.visit_open_start_element(&element)?;
            state.depth += 1;
            let result = parse_content(state, reader, visitor);
            state.depth -= 1;
            result?;
            visitor.visit_close_element(&name)?;
            Ok(())
        }
        Some(RawToken::CloseEmptyElement) => visitor.visit_empty_element(&element),
        _ => Err(EvtxError::UnexpectedToken {
            expected: "CloseStartElement or CloseEmptyElement",
            found: byte,
            offset,
        }),
    }
}

/// Consume element content until the matching EndElement.
fn parse_content<'a>(
    state: &mut InterpState<'a, '_>,
    reader: &mut ByteReader<'a>,
    visitor: &mut dyn BinXmlOutput,
) -> Result<()> {
    loop {
        let offset = reader.pos();
        let byte = reader.read_u8()?;
        let token = RawToken::from_u8(byte).ok_or(EvtxError::InvalidToken {
            value: byte,
            offset,
        })?;

        match token {
            RawToken::EndElement => return Ok(()),
            RawToken::OpenStartElement { has_attributes } => {
                parse_element(state, reader, visitor, has_attributes)?;
            }
            RawToken::Value { .. } => {
                let (value, value_offset) = read_inline_value(state, reader)?;
                emit_value(state, visitor, value, value_offset)?;
            }
            RawToken::NormalSubstitution => {
                content_substitution(state, reader, visitor, false)?;
            }
            RawToken::OptionalSubstitution => {
                content_substitution(state, reader, visitor, true)?;
            }
            RawToken::CDataSection => {
                let text = read_sized_utf16(reader)?;
                visitor.visit_cdata_section(&text)?;
            }
            RawToken::CharRef => {
                let value = reader.read_u16()?;
                visitor.visit_character_reference(value)?;
            }
            RawToken::EntityRef => {
                let name = read_name(state, reader)?;
                visitor.visit_entity_reference(&name)?;
            }
            RawToken::PITarget => {
                parse_processing_instruction(state, reader, visitor)?;
            }
            RawToken::TemplateInstance => {
                parse_template_instance(state, reader, visitor)?;
            }
            RawToken::FragmentHeader => {
                reader.skip(3)?;
            }
            RawToken::EndOfStream => {
                // A fragment that ends inside an open element is malformed.
                return Err(EvtxError::UnexpectedToken {
                    expected: "EndElement",
                    found: byte,
                    offset,
                });
            }
            RawToken::CloseStartElement
            | RawToken::CloseEmptyElement
            | RawToken::Attribute { .. }
            | RawToken::PIData => {
                return Err(EvtxError::UnexpectedToken {
                    expected: "element content",
                    found: byte,
                    offset,
                });
            }
        }
    }
}

/// Read the value-producing token of an attribute, returning the rendered
/// text, or `None` when the attribute is elided (an optional substitution
/// that resolved to null as the attribute's sole value).
fn parse_attribute_value<'a>(
    state: &mut InterpState<'a, '_>,
    reader: &mut ByteReader<'a>,
) -> Result<Option<String>> {
    let offset = reader.pos();
    let byte = reader.read_u8()?;
    let token = RawToken::from_u8(byte).ok_or(EvtxError::InvalidToken {
        value: byte,
        offset,
    })?;

    match token {
        RawToken::Value { more } => {
            let mut text = String::new();
            let (value, value_offset) = read_inline_value(state, reader)?;
            append_value_text(state, &mut text, value, value_offset)?;

            // The flag signals a multi-part value; keep appending while the
            // next token is still a Value.
            let mut continued = more;
            while continued {
                match RawToken::from_u8(reader.peek_u8()?) {
                    Some(RawToken::Value { more }) => {
                        reader.skip(1)?;
                        let (value, value_offset) = read_inline_value(state, reader)?;
                        append_value_text(state, &mut text, value, value_offset)?;
                        continued = more;
                    }
                    _ => break,
                }
            }

            Ok(Some(text))
        }
        RawToken::NormalSubstitution => attribute_substitution(state, reader, false),
        RawToken::OptionalSubstitution => attribute_substitution(state, reader, true),
        RawToken::CharRef => {
            let value = reader.read_u16()?;
            let mut text = String::new();
            if let Some(c) = char::from_u32(u32::from(value)) {
                text.push(c);
            }
            Ok(Some(text))
        }
        RawToken::EntityRef => {
            let name = read_name(state, reader)?;
            Ok(Some(expand_entity(&name)))
        }
        _ => Err(EvtxError::UnexpectedToken {
            expected: "a value-producing token",
            found: byte,
            offset,
        }),
    }
}

/// Resolve a substitution in attribute position.
fn attribute_substitution(
    state: &mut InterpState<'_, '_>,
    reader: &mut ByteReader<'_>,
    optional: bool,
) -> Result<Option<String>> {
    let offset = reader.pos();
    let index = reader.read_u16()?;
    let _expected_type = reader.read_u8()?;

    let entry = lookup_substitution(state, index, offset)?;

    if entry.size == 0 || entry.value_type == 0x00 {
        return if optional {
            Ok(None)
        } else {
            Ok(Some(String::new()))
        };
    }

    if entry.value_type == 0x21 {
        return Ok(Some(render_nested_fragment_to_string(state, entry)?));
    }

    let bytes = substitution_bytes(state, entry)?;
    let value = decode_value(entry.value_type, bytes, entry.offset, state.ctx.ansi_codec)?;
    Ok(Some(render_value_text(&value)))
}

/// Resolve a substitution in content position.
fn content_substitution(
    state: &mut InterpState<'_, '_>,
    reader: &mut ByteReader<'_>,
    visitor: &mut dyn BinXmlOutput,
    optional: bool,
) -> Result<()> {
    let offset = reader.pos();
    let index = reader.read_u16()?;
    let _expected_type = reader.read_u8()?;

    let entry = lookup_substitution(state, index, offset)?;

    if entry.size == 0 || entry.value_type == 0x00 {
        // Optional: the element stays but contains no text.
        // Normal: an explicit empty string, which serializes identically.
        return Ok(());
    }

    if entry.value_type == 0x21 {
        return interpret_nested_fragment(state, entry, visitor);
    }

    let bytes = substitution_bytes(state, entry)?;
    let value = decode_value(entry.value_type, bytes, entry.offset, state.ctx.ansi_codec)?;
    visitor.visit_characters(&render_value_text(&value))
}

fn lookup_substitution(
    state: &InterpState<'_, '_>,
    index: u16,
    offset: usize,
) -> Result<SubstitutionEntry> {
    let frame = state.frames.last().ok_or(EvtxError::SubstitutionIndexOutOfRange {
        index,
        count: 0,
        offset,
    })?;

    frame
        .substitutions
        .get(index as usize)
        .copied()
        .ok_or(EvtxError::SubstitutionIndexOutOfRange {
            index,
            count: frame.substitutions.len(),
            offset,
        })
}

fn substitution_bytes<'a>(
    state: &InterpState<'a, '_>,
    entry: SubstitutionEntry,
) -> Result<&'a [u8]> {
    state
        .ctx
        .data
        .get(entry.offset..entry.offset + entry.size as usize)
        .ok_or(EvtxError::Overrun {
            offset: entry.offset,
            wanted: entry.size as usize,
            remaining: state.ctx.data.len().saturating_sub(entry.offset),
        })
}

/// Interpret a nested BinXml substitution in place, with the same visitor.
fn interpret_nested_fragment(
    state: &mut InterpState<'_, '_>,
    entry: SubstitutionEntry,
    visitor: &mut dyn BinXmlOutput,
) -> Result<()> {
    // Bounds-check up front; the fragment's own EOF token terminates it.
    substitution_bytes(state, entry)?;
    let mut reader = ByteReader::with_pos(state.ctx.data, entry.offset);
    run_body(state, &mut reader, visitor)
}

/// Render a nested BinXml substitution into a string (attribute position).
fn render_nested_fragment_to_string(
    state: &mut InterpState<'_, '_>,
    entry: SubstitutionEntry,
) -> Result<String> {
    use crate::parser::ParserSettings;
    use crate::xml_output::XmlOutput;

    substitution_bytes(state, entry)?;
    let mut output = XmlOutput::with_writer(Vec::new(), &ParserSettings::default());
    let mut reader = ByteReader::with_pos(state.ctx.data, entry.offset);
    run_body(state, &mut reader, &mut output)?;

    String::from_utf8(output.into_writer()).map_err(EvtxError::from)
}

fn parse_template_instance(
    state: &mut InterpState<'_, '_>,
    reader: &mut ByteReader<'_>,
    visitor: &mut dyn BinXmlOutput,
) -> Result<()> {
    if state.frames.len() >= MAX_TEMPLATE_DEPTH {
        return Err(EvtxError::NestingTooDeep {
            offset: reader.pos(),
            max_depth: MAX_TEMPLATE_DEPTH,
        });
    }

    let _version = reader.read_u8()?;
    let def_offset = reader.read_u32()?;

    // The definition bytes are only present in the stream on first
    // encounter. The cache lookup resolves repeated references, while the
    // position check catches an inline definition whose offset a header
    // pointer slot already seeded: its bytes still must be consumed.
    let definition = if def_offset as usize == reader.pos() {
        let definition = match state.ctx.templates.get(def_offset) {
            Some(cached) => cached,
            None => {
                let parsed = TemplateDefinition::read_at(state.ctx.data, def_offset)?;
                register_definition(state, def_offset, &parsed);
                state.ctx.templates.insert(def_offset, parsed)
            }
        };
        reader.set_pos(definition.fragment.end);
        definition
    } else {
        match state.ctx.templates.get(def_offset) {
            Some(cached) => cached,
            None => {
                // Defined elsewhere in the chunk (e.g. a record that was
                // never parsed); read it out-of-line without moving the
                // stream.
                let parsed = TemplateDefinition::read_at(state.ctx.data, def_offset)
                    .map_err(|e| {
                        state.stats.missing += 1;
                        EvtxError::TemplateMissing {
                            def_offset,
                            reason: e.to_string(),
                        }
                    })?;
                register_definition(state, def_offset, &parsed);
                state.ctx.templates.insert(def_offset, parsed)
            }
        }
    };

    state.stats.references += 1;

    // Substitution block: descriptors, then the concatenated value bytes.
    let count = reader.read_u32()?;
    let mut descriptors = Vec::with_capacity(count.min(256) as usize);
    for _ in 0..count {
        let size = reader.read_u16()?;
        let value_type = reader.read_u8()?;
        let reserved = reader.read_u8()?;
        descriptors.push((size, value_type, reserved));
    }

    let mut substitutions = Vec::with_capacity(descriptors.len());
    for (size, value_type, reserved) in descriptors {
        let offset = reader.pos();
        reader.take(size as usize)?;
        substitutions.push(SubstitutionEntry {
            offset,
            size,
            value_type,
            reserved,
        });
    }

    state.frames.push(Frame { substitutions });
    let mut fragment_reader = ByteReader::with_pos(state.ctx.data, definition.fragment.start);
    let result = run_body(state, &mut fragment_reader, visitor);
    state.frames.pop();
    result
}

fn register_definition(
    state: &mut InterpState<'_, '_>,
    def_offset: ChunkOffset,
    definition: &TemplateDefinition,
) {
    let fragment = &state.ctx.data[definition.fragment.clone()];
    let fragment_crc32 = crc32fast::hash(fragment);

    state.stats.record_definition(
        definition.guid,
        DefinitionInfo {
            chunk_index: state.ctx.chunk_index,
            offset: def_offset,
            fragment_crc32,
        },
    );

    if let Some(global) = state.ctx.global_templates {
        global.insert_if_absent(TemplateBlob {
            guid: definition.guid,
            bytes: fragment.to_vec(),
            source: TemplateSource::Chunk {
                chunk_index: state.ctx.chunk_index,
                offset: def_offset,
            },
        });
    }
}

fn parse_processing_instruction(
    state: &mut InterpState<'_, '_>,
    reader: &mut ByteReader<'_>,
    visitor: &mut dyn BinXmlOutput,
) -> Result<()> {
    let target = read_name(state, reader)?;

    let offset = reader.pos();
    let byte = reader.read_u8()?;
    match RawToken::from_u8(byte) {
        Some(RawToken::PIData) => {
            let data = read_sized_utf16(reader)?;
            visitor.visit_processing_instruction(&target, &data)
        }
        _ => Err(EvtxError::UnexpectedToken {
            expected: "PIData",
            found: byte,
            offset,
        }),
    }
}

/// Read a `[name_offset:u32]` reference through the name table, skipping
/// the inline name bytes when the reference points at the current position.
fn read_name(state: &InterpState<'_, '_>, reader: &mut ByteReader<'_>) -> Result<Rc<str>> {
    let name_offset = reader.read_u32()?;
    let cached = state.ctx.names.get(state.ctx.data, name_offset)?;

    if name_offset as usize == reader.pos() {
        reader.skip(cached.byte_len as usize)?;
    }

    Ok(cached.name)
}

/// Read an inline `[value_type:u8][size:u16][bytes]` value.
fn read_inline_value<'a>(
    state: &InterpState<'a, '_>,
    reader: &mut ByteReader<'a>,
) -> Result<(BinXmlValue<'a>, usize)> {
    let type_byte = reader.read_u8()?;
    let size = reader.read_u16()? as usize;
    let offset = reader.pos();
    let bytes = reader.take(size)?;
    let value = decode_value(type_byte, bytes, offset, state.ctx.ansi_codec)?;
    Ok((value, offset))
}

/// Emit a decoded value as element content.
fn emit_value(
    state: &mut InterpState<'_, '_>,
    visitor: &mut dyn BinXmlOutput,
    value: BinXmlValue<'_>,
    value_offset: usize,
) -> Result<()> {
    match value {
        BinXmlValue::Null => Ok(()),
        BinXmlValue::BinXml(bytes) => {
            let entry = SubstitutionEntry {
                offset: value_offset,
                size: bytes.len() as u16,
                value_type: 0x21,
                reserved: 0,
            };
            interpret_nested_fragment(state, entry, visitor)
        }
        other => visitor.visit_characters(&render_value_text(&other)),
    }
}

/// Append a decoded value to an attribute text buffer.
fn append_value_text(
    state: &mut InterpState<'_, '_>,
    text: &mut String,
    value: BinXmlValue<'_>,
    value_offset: usize,
) -> Result<()> {
    match value {
        BinXmlValue::Null => Ok(()),
        BinXmlValue::BinXml(bytes) => {
            let entry = SubstitutionEntry {
                offset: value_offset,
                size: bytes.len() as u16,
                value_type: 0x21,
                reserved: 0,
            };
            text.push_str(&render_nested_fragment_to_string(state, entry)?);
            Ok(())
        }
        other => {
            text.push_str(&render_value_text(&other));
            Ok(())
        }
    }
}

/// Read a `[size:u16][utf16]` string where size counts UTF-16 code units.
fn read_sized_utf16(reader: &mut ByteReader<'_>) -> Result<String> {
    let start = reader.pos();
    let char_count = reader.read_u16()? as usize;
    let bytes = reader.take(char_count * 2)?;
    crate::utils::utf16_le_to_string(bytes)
        .ok_or(EvtxError::FailedToDecodeUTF16String { offset: start })
}

/// Expand the five predefined XML entities; unknown names pass through as
/// literal text.
fn expand_entity(name: &str) -> String {
    match name {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        other => format!("&{other};"),
    }
}
