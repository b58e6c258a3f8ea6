//! The file-level driver: header validation, chunk discovery, worker
//! dispatch, and ordered merging of chunk results.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use encoding::EncodingRef;
use encoding::all::WINDOWS_1252;
use log::warn;

use crate::chunk::{ChunkResult, parse_chunk};
use crate::err::{EvtxError, ParseWarning, Result};
use crate::file_header::EvtxFileHeader;
use crate::record::ParsedEventRecord;
use crate::stats::ParseStats;
use crate::template::GuidCache;
use crate::{CHUNK_SIZE, FILE_HEADER_BLOCK_SIZE};

pub struct ParserSettings {
    num_threads: usize,
    indent: bool,
    ansi_codec: EncodingRef,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            // Use all cores by default when the multithreading feature is on.
            num_threads: 0,
            indent: false,
            ansi_codec: WINDOWS_1252,
        }
    }
}

impl Clone for ParserSettings {
    fn clone(&self) -> Self {
        ParserSettings {
            num_threads: self.num_threads,
            indent: self.indent,
            ansi_codec: self.ansi_codec,
        }
    }
}

impl std::fmt::Debug for ParserSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserSettings")
            .field("num_threads", &self.num_threads)
            .field("indent", &self.indent)
            .field("ansi_codec", &self.ansi_codec.name())
            .finish()
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    /// Worker count for chunk parsing; `0` means one worker per core,
    /// `1` forces single-threaded operation.
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    /// Indent the per-record XML output.
    pub fn indent(mut self, pretty: bool) -> Self {
        self.indent = pretty;
        self
    }

    /// Codec used for `AnsiString` values.
    pub fn ansi_codec_ref(mut self, codec: EncodingRef) -> Self {
        self.ansi_codec = codec;
        self
    }

    pub fn should_indent(&self) -> bool {
        self.indent
    }

    pub fn ansi_codec(&self) -> EncodingRef {
        self.ansi_codec
    }

    pub fn get_num_threads(&self) -> usize {
        self.num_threads
    }
}

/// Cooperative cancellation for an in-flight parse. In-flight chunk tasks
/// observe the flag between records.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The merged output of a whole-file parse.
#[derive(Debug)]
pub struct ParseResult {
    pub header: EvtxFileHeader,
    /// Canonical per-record XML, in chunk order then record order.
    pub record_xmls: Vec<String>,
    pub records: Vec<ParsedEventRecord>,
    pub stats: ParseStats,
    pub cancelled: bool,
}

pub struct EvtxParser {
    data: Vec<u8>,
    settings: ParserSettings,
    template_cache: Arc<GuidCache>,
    cancel: Arc<AtomicBool>,
}

impl EvtxParser {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| EvtxError::FailedToOpenFile {
            source,
            path: path.to_path_buf(),
        })?;

        Ok(Self::from_buffer(data))
    }

    pub fn from_buffer(data: Vec<u8>) -> Self {
        EvtxParser {
            data,
            settings: ParserSettings::default(),
            template_cache: Arc::new(GuidCache::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_configuration(mut self, settings: ParserSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a (possibly manifest-preseeded) template cache with this parse.
    pub fn with_template_cache(mut self, cache: Arc<GuidCache>) -> Self {
        self.template_cache = cache;
        self
    }

    pub fn template_cache(&self) -> Arc<GuidCache> {
        self.template_cache.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Offsets of all whole chunks: from 4096 in 64KiB strides.
    fn chunk_offsets(&self) -> Vec<u64> {
        let mut offsets = Vec::new();
        let mut offset = FILE_HEADER_BLOCK_SIZE as u64;
        while offset + CHUNK_SIZE as u64 <= self.data.len() as u64 {
            offsets.push(offset);
            offset += CHUNK_SIZE as u64;
        }
        offsets
    }

    /// Parse the whole image and merge chunk results in ascending chunk
    /// index, regardless of worker completion order.
    pub fn parse(&self) -> Result<ParseResult> {
        let header = EvtxFileHeader::from_buf(&self.data)?;

        if header.major_version != 3 {
            return Err(EvtxError::UnsupportedFormatVersion {
                major_version: header.major_version,
            });
        }

        let mut stats = ParseStats::default();
        if let Some(computed) = header.verify_checksum(&self.data) {
            warn!("file header CRC mismatch, continuing");
            stats.warnings.push(ParseWarning::FileCrcMismatch {
                stored: header.checksum,
                computed,
            });
        }

        let offsets = self.chunk_offsets();
        let chunk_results = self.dispatch(&offsets)?;

        let mut result = ParseResult {
            header,
            record_xmls: Vec::new(),
            records: Vec::new(),
            stats,
            cancelled: false,
        };

        for chunk in chunk_results {
            if chunk.bad_signature {
                result.stats.chunks_skipped += 1;
            } else {
                result.stats.chunks_parsed += 1;
            }

            result.record_xmls.extend(chunk.record_xmls);
            result.records.extend(chunk.records);
            result.stats.absorb(chunk.stats);
        }

        result.cancelled = self.cancel.load(Ordering::Relaxed);
        Ok(result)
    }

    fn parse_single_chunk(&self, index: usize, offset: u64) -> Result<ChunkResult> {
        let slice = &self.data[offset as usize..offset as usize + CHUNK_SIZE];
        parse_chunk(
            slice,
            offset,
            index as u16,
            &self.settings,
            Some(&self.template_cache),
            Some(&self.cancel),
        )
    }

    #[cfg(feature = "multithreading")]
    fn dispatch(&self, offsets: &[u64]) -> Result<Vec<ChunkResult>> {
        use rayon::prelude::*;

        if self.settings.get_num_threads() == 1 || offsets.len() <= 1 {
            return self.dispatch_sequential(offsets);
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.get_num_threads())
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("failed to build worker pool ({e}), falling back to a single thread");
                return self.dispatch_sequential(offsets);
            }
        };

        // `collect` on an indexed parallel iterator preserves input order.
        pool.install(|| {
            offsets
                .par_iter()
                .enumerate()
                .map(|(index, &offset)| self.parse_single_chunk(index, offset))
                .collect()
        })
    }

    #[cfg(not(feature = "multithreading"))]
    fn dispatch(&self, offsets: &[u64]) -> Result<Vec<ChunkResult>> {
        self.dispatch_sequential(offsets)
    }

    fn dispatch_sequential(&self, offsets: &[u64]) -> Result<Vec<ChunkResult>> {
        offsets
            .iter()
            .enumerate()
            .map(|(index, &offset)| self.parse_single_chunk(index, offset))
            .collect()
    }
}
