//! Chunk-level parsing: header validation, record enumeration, and
//! per-record XML assembly.
//!
//! A chunk parse is pure CPU over an immutable 64KiB window; all of its
//! scratch state (name table, by-offset template index, render buffers) is
//! dropped when the [`ChunkResult`] is handed back to the driver.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};

use crate::binxml::interpreter::{InterpreterContext, interpret_record};
use crate::binxml::name::NameTable;
use crate::binxml::tree::TreeBuilder;
use crate::err::{EvtxError, ParseWarning, Result};
use crate::parser::ParserSettings;
use crate::record::{
    EVENT_RECORD_HEADER_SIZE, EVENT_RECORD_MIN_SIZE, EvtxRecordHeader, ParsedEventRecord,
};
use crate::stats::{DefinitionInfo, PartialStats, TemplateStats};
use crate::template::{ChunkTemplateCache, GuidCache, TemplateBlob, TemplateSource};
use crate::xml_output::XmlOutput;
use crate::{CHUNK_HEADER_SIZE, CHUNK_SIZE};

#[derive(Debug, PartialEq, Eq)]
pub struct EvtxChunkHeader {
    pub first_event_record_number: u64,
    pub last_event_record_number: u64,
    pub first_event_record_id: u64,
    pub last_event_record_id: u64,
    pub header_size: u32,
    pub last_event_record_data_offset: u32,
    pub free_space_offset: u32,
    pub events_checksum: u32,
    pub header_chunk_checksum: u32,
    pub common_string_offsets: [u32; 64],
    pub template_pointers: [u32; 32],
}

impl EvtxChunkHeader {
    pub fn has_signature(data: &[u8]) -> bool {
        data.get(..8) == Some(b"ElfChnk\x00".as_slice())
    }

    pub fn from_buf(data: &[u8]) -> Result<EvtxChunkHeader> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0_u8; 8];
        cursor.read_exact(&mut magic)?;
        debug_assert_eq!(&magic, b"ElfChnk\x00", "caller checks the signature first");

        let first_event_record_number = cursor.read_u64::<LittleEndian>()?;
        let last_event_record_number = cursor.read_u64::<LittleEndian>()?;
        let first_event_record_id = cursor.read_u64::<LittleEndian>()?;
        let last_event_record_id = cursor.read_u64::<LittleEndian>()?;

        let header_size = cursor.read_u32::<LittleEndian>()?;
        let last_event_record_data_offset = cursor.read_u32::<LittleEndian>()?;
        let free_space_offset = cursor.read_u32::<LittleEndian>()?;
        let events_checksum = cursor.read_u32::<LittleEndian>()?;

        // Reserved
        cursor.seek(SeekFrom::Current(64))?;
        // Flags
        cursor.seek(SeekFrom::Current(4))?;

        let header_chunk_checksum = cursor.read_u32::<LittleEndian>()?;

        let mut common_string_offsets = [0_u32; 64];
        cursor.read_u32_into::<LittleEndian>(&mut common_string_offsets)?;

        let mut template_pointers = [0_u32; 32];
        cursor.read_u32_into::<LittleEndian>(&mut template_pointers)?;

        Ok(EvtxChunkHeader {
            first_event_record_number,
            last_event_record_number,
            first_event_record_id,
            last_event_record_id,
            header_size,
            last_event_record_data_offset,
            free_space_offset,
            events_checksum,
            header_chunk_checksum,
            common_string_offsets,
            template_pointers,
        })
    }

    /// Header CRC covers bytes `[0,120) ∪ [128,512)`.
    pub fn verify_header_checksum(&self, data: &[u8]) -> Option<u32> {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..120]);
        hasher.update(&data[128..CHUNK_HEADER_SIZE]);
        let computed = hasher.finalize();
        (computed != self.header_chunk_checksum).then_some(computed)
    }

    /// Data CRC covers `[512, free_space_offset)`.
    pub fn verify_data_checksum(&self, data: &[u8]) -> Option<u32> {
        let end = (self.free_space_offset as usize).clamp(CHUNK_HEADER_SIZE, data.len());
        let computed = crc32fast::hash(&data[CHUNK_HEADER_SIZE..end]);
        (computed != self.events_checksum).then_some(computed)
    }
}

/// Everything a chunk produced, moved back to the driver.
#[derive(Debug, Default)]
pub struct ChunkResult {
    pub chunk_index: u16,
    pub bad_signature: bool,
    pub record_xmls: Vec<String>,
    pub records: Vec<ParsedEventRecord>,
    pub stats: PartialStats,
}

/// Parse one 64KiB chunk.
///
/// Header CRC and data CRC mismatches are warnings; a bad chunk signature
/// yields an empty result with `bad_signature` set. Record-level failures
/// are accumulated and never abort the chunk.
pub fn parse_chunk(
    data: &[u8],
    file_offset: u64,
    chunk_index: u16,
    settings: &ParserSettings,
    global_templates: Option<&GuidCache>,
    cancel: Option<&AtomicBool>,
) -> Result<ChunkResult> {
    if data.len() < CHUNK_SIZE {
        return Err(EvtxError::IncompleteChunk { len: data.len() });
    }

    let mut result = ChunkResult {
        chunk_index,
        ..ChunkResult::default()
    };

    if !EvtxChunkHeader::has_signature(data) {
        debug!("chunk {chunk_index} at file offset {file_offset} has a bad signature, skipping");
        result.bad_signature = true;
        result
            .stats
            .warnings
            .push(ParseWarning::ChunkSkipped { chunk_index });
        return Ok(result);
    }

    let header = EvtxChunkHeader::from_buf(data)?;

    if let Some(computed) = header.verify_header_checksum(data) {
        warn!("chunk {chunk_index}: header CRC mismatch");
        result.stats.warnings.push(ParseWarning::ChunkHeaderCrcMismatch {
            chunk_index,
            stored: header.header_chunk_checksum,
            computed,
        });
    }

    if let Some(computed) = header.verify_data_checksum(data) {
        warn!("chunk {chunk_index}: event records CRC mismatch");
        result.stats.warnings.push(ParseWarning::ChunkDataCrcMismatch {
            chunk_index,
            stored: header.events_checksum,
            computed,
        });
    }

    let names = NameTable::new();
    names.seed(data, &header.common_string_offsets);

    let templates = ChunkTemplateCache::new();
    templates.populate(
        data,
        &header.template_pointers,
        chunk_index,
        &mut result.stats.warnings,
    );
    register_seeded_definitions(
        data,
        chunk_index,
        &templates,
        global_templates,
        &mut result.stats.templates,
    );

    let ctx = InterpreterContext {
        data,
        chunk_index,
        names: &names,
        templates: &templates,
        global_templates,
        ansi_codec: settings.ansi_codec(),
    };

    let free_space_offset = (header.free_space_offset as usize).clamp(CHUNK_HEADER_SIZE, CHUNK_SIZE);
    let mut pos = CHUNK_HEADER_SIZE;
    let mut last_record_id = 0u64;
    let mut order_warned = false;

    while pos + EVENT_RECORD_HEADER_SIZE < free_space_offset {
        if let Some(cancel) = cancel {
            if cancel.load(Ordering::Relaxed) {
                debug!("chunk {chunk_index}: cancelled between records");
                break;
            }
        }

        // A non-record signature ends this chunk's records; it is not an
        // error (the remainder is free space).
        let Some(record_header) = EvtxRecordHeader::read(&data[pos..]) else {
            break;
        };

        let size = record_header.size;
        if size < EVENT_RECORD_MIN_SIZE {
            result.stats.warnings.push(ParseWarning::RecordTruncated {
                chunk_index,
                offset: pos,
                reason: "declared size below minimum",
            });
            break;
        }
        if pos + size as usize > free_space_offset {
            result.stats.warnings.push(ParseWarning::RecordTruncated {
                chunk_index,
                offset: pos,
                reason: "record extends past free space offset",
            });
            break;
        }

        let size_copy_at = pos + size as usize - 4;
        let size_copy = u32::from_le_bytes([
            data[size_copy_at],
            data[size_copy_at + 1],
            data[size_copy_at + 2],
            data[size_copy_at + 3],
        ]);
        if size_copy != size {
            result.stats.warnings.push(ParseWarning::RecordTruncated {
                chunk_index,
                offset: pos,
                reason: "trailing size copy disagrees with size",
            });
            break;
        }

        if record_header.record_id < last_record_id && !order_warned {
            result.stats.warnings.push(ParseWarning::RecordIdOrder {
                chunk_index,
                offset: pos,
            });
            order_warned = true;
        }
        last_record_id = record_header.record_id;

        let payload_start = pos + EVENT_RECORD_HEADER_SIZE;
        match render_record(&ctx, payload_start, settings, &mut result.stats.templates) {
            Ok((xml, nodes)) => {
                let parsed = ParsedEventRecord::extract(
                    record_header.record_id,
                    record_header.filetime,
                    xml.clone(),
                    &nodes,
                );
                result.record_xmls.push(xml);
                result.records.push(parsed);
                result.stats.records_parsed += 1;
            }
            Err(source) => {
                debug!(
                    "chunk {chunk_index}: record {} failed to deserialize: {source}",
                    record_header.record_id
                );
                result.stats.records_failed += 1;
                result.stats.templates.parse_errors += 1;
                result.stats.record_errors.push(crate::err::RecordError {
                    record_id: record_header.record_id,
                    offset: pos,
                    source,
                });
            }
        }

        pos += size as usize;
    }

    Ok(result)
}

/// Interpret one record payload twice: streamed into the XML writer, and
/// materialized for field extraction. Template bookkeeping is only counted
/// on the first pass.
fn render_record(
    ctx: &InterpreterContext<'_>,
    payload_start: usize,
    settings: &ParserSettings,
    template_stats: &mut TemplateStats,
) -> Result<(String, Vec<crate::binxml::tree::XmlNode>)> {
    let mut xml_output = XmlOutput::with_writer(Vec::with_capacity(512), settings);
    interpret_record(ctx, payload_start, template_stats, &mut xml_output)?;
    let xml = String::from_utf8(xml_output.into_writer())?;

    let mut scratch_stats = TemplateStats::default();
    let mut tree = TreeBuilder::new();
    interpret_record(ctx, payload_start, &mut scratch_stats, &mut tree)?;

    Ok((xml, tree.into_nodes()))
}

/// Definitions seeded from the header's template pointer slots count as
/// observed definitions of this chunk.
fn register_seeded_definitions(
    data: &[u8],
    chunk_index: u16,
    templates: &ChunkTemplateCache,
    global_templates: Option<&GuidCache>,
    stats: &mut TemplateStats,
) {
    for (offset, definition) in templates.entries() {
        let fragment = &data[definition.fragment.clone()];
        stats.record_definition(
            definition.guid,
            DefinitionInfo {
                chunk_index,
                offset,
                fragment_crc32: crc32fast::hash(fragment),
            },
        );

        if let Some(global) = global_templates {
            global.insert_if_absent(TemplateBlob {
                guid: definition.guid,
                bytes: fragment.to_vec(),
                source: TemplateSource::Chunk {
                    chunk_index,
                    offset,
                },
            });
        }
    }
}
