//! A decoder for the Windows XML Event Log (EVTX) binary format.
//!
//! EVTX files are a sequence of 64KiB chunks, each carrying event records
//! whose payload is a template-compressed binary XML ("BinXml") token stream.
//! This crate validates the file/chunk framing, interprets the token stream
//! (template instantiation, name interning, typed substitution values) and
//! produces per-record XML documents plus a structured event view.
//!
//! ```no_run
//! use evtxr::{EvtxParser, ParserSettings};
//!
//! let parser = EvtxParser::from_path("security.evtx")?
//!     .with_configuration(ParserSettings::new().num_threads(0));
//! let result = parser.parse()?;
//!
//! for record in &result.records {
//!     println!("{}", record.xml);
//! }
//! # Ok::<(), evtxr::err::EvtxError>(())
//! ```

pub mod err;

mod binxml;
mod chunk;
mod file_header;
mod filter;
mod guid;
mod ntsid;
mod parser;
mod record;
mod stats;
mod template;
mod utils;
mod xml_output;

#[cfg(feature = "wevt_templates")]
pub mod wevt;

pub use binxml::value::{BinXmlValue, BinXmlValueType};
pub use chunk::{ChunkResult, EvtxChunkHeader, parse_chunk};
pub use file_header::{EvtxFileHeader, HeaderFlags};
pub use filter::EvtxFilter;
pub use guid::Guid;
pub use ntsid::Sid;
pub use parser::{CancelHandle, EvtxParser, ParseResult, ParserSettings};
pub use record::{EventField, ParsedEventRecord};
pub use stats::{DefinitionInfo, PartialStats, ParseStats, TemplateStats};
pub use template::{GuidCache, TemplateBlob, TemplateSource};

/// A chunk-relative byte offset, as used by name and template references.
pub type ChunkOffset = u32;

/// Fixed length of the file header block.
pub const FILE_HEADER_BLOCK_SIZE: usize = 4096;

/// Fixed length of an EVTX chunk.
pub const CHUNK_SIZE: usize = 65536;

/// Offset of the first event record within a chunk.
pub const CHUNK_HEADER_SIZE: usize = 512;
