use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvtxError>;

#[derive(Debug, Error)]
pub enum EvtxError {
    #[error("An I/O error has occurred")]
    IO {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to open file {}", path.display())]
    FailedToOpenFile {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[error("Invalid EVTX file header magic, expected `ElfFile\\0`, found `{magic:02X?}`")]
    InvalidFileSignature { magic: [u8; 8] },

    #[error("Unsupported EVTX major version {major_version}, only version 3 is supported")]
    UnsupportedFormatVersion { major_version: u16 },

    #[error("File is too small to contain a valid header block ({len} bytes)")]
    IncompleteFileHeader { len: usize },

    #[error("Chunk is smaller than the fixed chunk length ({len} bytes)")]
    IncompleteChunk { len: usize },

    #[error("Offset {offset}: needed {wanted} more bytes, but only {remaining} remain")]
    Overrun {
        offset: usize,
        wanted: usize,
        remaining: usize,
    },

    #[error("Offset {offset}: byte `{value:#04x}` is not a valid binxml token")]
    InvalidToken { value: u8, offset: usize },

    #[error("Offset {offset}: byte `{value:#04x}` is not a valid binxml value type")]
    InvalidValueType { value: u8, offset: usize },

    #[error(
        "Offset {offset}: failed to decode a `{value_type}` value, wanted {wanted} bytes, got {remaining}"
    )]
    ValueDecode {
        offset: usize,
        value_type: &'static str,
        wanted: usize,
        remaining: usize,
    },

    #[error("Offset {offset}: expected {expected}, found token `{found:#04x}`")]
    UnexpectedToken {
        expected: &'static str,
        found: u8,
        offset: usize,
    },

    #[error("Offset {offset}: substitution index {index} is out of range (instance holds {count})")]
    SubstitutionIndexOutOfRange {
        index: u16,
        count: usize,
        offset: usize,
    },

    #[error("Offset {offset}: element nesting deeper than {max_depth} levels")]
    NestingTooDeep { offset: usize, max_depth: usize },

    #[error("Offset {offset}: failed to decode UTF-16 string")]
    FailedToDecodeUTF16String { offset: usize },

    #[error("Offset {offset}: failed to decode ansi string (encoding scheme {encoding})")]
    FailedToDecodeAnsiString {
        encoding: &'static str,
        offset: usize,
    },

    #[error("Template definition at offset {def_offset} could not be used: {reason}")]
    TemplateMissing { def_offset: u32, reason: String },

    #[error("Failed to deserialize record {record_id}")]
    FailedToDeserializeRecord {
        record_id: u64,
        source: Box<EvtxError>,
    },

    #[error("Record data contains invalid UTF-8")]
    RecordContainsInvalidUTF8 {
        #[from]
        source: std::string::FromUtf8Error,
    },

    #[error("Writing to XML failed")]
    XmlOutput {
        #[from]
        source: quick_xml::Error,
    },

    #[error("`serde_json` failed")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// A recoverable anomaly observed during parsing.
///
/// Warnings never abort a parse, they accumulate in [`crate::PartialStats`]
/// and are reported alongside the (possibly partial) record list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    #[error("File header CRC mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    FileCrcMismatch { stored: u32, computed: u32 },

    #[error("Chunk {chunk_index}: header CRC mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChunkHeaderCrcMismatch {
        chunk_index: u16,
        stored: u32,
        computed: u32,
    },

    #[error("Chunk {chunk_index}: event records CRC mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChunkDataCrcMismatch {
        chunk_index: u16,
        stored: u32,
        computed: u32,
    },

    #[error("Chunk {chunk_index}: bad chunk signature, chunk skipped")]
    ChunkSkipped { chunk_index: u16 },

    #[error("Chunk {chunk_index}: truncated record at offset {offset} ({reason}), iteration stopped")]
    RecordTruncated {
        chunk_index: u16,
        offset: usize,
        reason: &'static str,
    },

    #[error("Chunk {chunk_index}: record ids are not nondecreasing at offset {offset}")]
    RecordIdOrder { chunk_index: u16, offset: usize },

    #[error("Chunk {chunk_index}: template chain at offset {offset} contains a cycle")]
    TemplateChainCycle { chunk_index: u16, offset: u32 },

    #[error("Template {guid} was defined with diverging bodies across chunks")]
    TemplateDefinitionDiverged { guid: String },
}

/// A record that failed to deserialize; the rest of the chunk continues.
#[derive(Debug)]
pub struct RecordError {
    pub record_id: u64,
    /// Chunk-relative offset of the record header.
    pub offset: usize,
    pub source: EvtxError,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "record {} (chunk offset {}): {}",
            self.record_id, self.offset, self.source
        )
    }
}
