//! Shared test fixtures: bit-exact synthetic EVTX images and a minimal PE
//! carrying a `WEVT_TEMPLATE` resource.
//!
//! Real event logs cannot be redistributed with the crate, so the suites
//! build their own images. The builders patch element spans, CRCs and
//! chunk-relative offsets the same way `wevtutil`-produced files carry
//! them, which keeps the decoder honest about offset arithmetic.

#![allow(dead_code)]

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
pub fn ensure_env_logger_initialized() {
    LOGGER_INIT.call_once(env_logger::init);
}

pub const CHUNK_SIZE: usize = 65536;
pub const CHUNK_HEADER_SIZE: usize = 512;
pub const FILE_HEADER_BLOCK_SIZE: usize = 4096;

fn utf16_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn name_hash(s: &str) -> u16 {
    let mut hash: u32 = 0;
    for unit in s.encode_utf16() {
        hash = hash.wrapping_mul(65599).wrapping_add(u32::from(unit));
    }
    (hash & 0xffff) as u16
}

/// A substitution slot for a template instance.
pub enum Sub {
    /// `(value_type, raw bytes)`
    Data(u8, Vec<u8>),
    /// A nested BinXml fragment (type 0x21), built against its final
    /// chunk-relative position.
    Fragment(Box<dyn FnOnce(&mut BinXmlWriter)>),
}

impl Sub {
    pub fn utf16(s: &str) -> Sub {
        Sub::Data(0x01, utf16_bytes(s))
    }

    pub fn guid(bytes: [u8; 16]) -> Sub {
        Sub::Data(0x0f, bytes.to_vec())
    }

    pub fn null(value_type: u8) -> Sub {
        Sub::Data(value_type, Vec::new())
    }
}

/// Writes BinXml token streams at a fixed chunk-relative base offset.
///
/// Inline names, template definition offsets and nested fragments all
/// depend on absolute chunk positions, so the writer tracks them.
pub struct BinXmlWriter {
    buf: Vec<u8>,
    base: u32,
    open_elements: Vec<usize>,
}

impl BinXmlWriter {
    pub fn new(base: u32) -> Self {
        BinXmlWriter {
            buf: Vec::new(),
            base,
            open_elements: Vec::new(),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        assert!(
            self.open_elements.is_empty(),
            "fixture bug: unclosed element"
        );
        self.buf
    }

    /// Current chunk-relative position.
    pub fn abs(&self) -> u32 {
        self.base + self.buf.len() as u32
    }

    pub fn fragment_header(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x0f, 0x01, 0x01, 0x00]);
        self
    }

    pub fn eof(&mut self) -> &mut Self {
        self.buf.push(0x00);
        self
    }

    fn push_name_inline(&mut self, name: &str) -> u32 {
        let offset = self.abs();
        self.buf.extend_from_slice(&0u32.to_le_bytes()); // next-string link
        self.buf.extend_from_slice(&name_hash(name).to_le_bytes());
        self.buf
            .extend_from_slice(&(name.encode_utf16().count() as u16).to_le_bytes());
        self.buf.extend_from_slice(&utf16_bytes(name));
        self.buf.extend_from_slice(&[0, 0]);
        offset
    }

    /// Open an element carrying its name inline; returns the name's
    /// chunk-relative offset for later by-reference use.
    pub fn open_element(&mut self, name: &str, has_attributes: bool) -> u32 {
        self.buf.push(if has_attributes { 0x41 } else { 0x01 });
        self.buf.extend_from_slice(&0xffffu16.to_le_bytes()); // dependency id
        self.open_elements.push(self.buf.len());
        self.buf.extend_from_slice(&0u32.to_le_bytes()); // data size, patched
        let name_offset = self.abs() + 4;
        self.buf.extend_from_slice(&name_offset.to_le_bytes());
        self.push_name_inline(name);
        name_offset
    }

    /// Open an element whose name was interned earlier.
    pub fn open_element_ref(&mut self, name_offset: u32, has_attributes: bool) -> &mut Self {
        self.buf.push(if has_attributes { 0x41 } else { 0x01 });
        self.buf.extend_from_slice(&0xffffu16.to_le_bytes());
        self.open_elements.push(self.buf.len());
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        self.buf.extend_from_slice(&name_offset.to_le_bytes());
        self
    }

    /// Attribute token with an inline name; returns the name offset.
    pub fn attr(&mut self, name: &str) -> u32 {
        self.buf.push(0x06);
        let name_offset = self.abs() + 4;
        self.buf.extend_from_slice(&name_offset.to_le_bytes());
        self.push_name_inline(name);
        name_offset
    }

    pub fn attr_ref(&mut self, name_offset: u32) -> &mut Self {
        self.buf.push(0x06);
        self.buf.extend_from_slice(&name_offset.to_le_bytes());
        self
    }

    pub fn close_start(&mut self) -> &mut Self {
        self.buf.push(0x02);
        self
    }

    fn patch_open_element(&mut self) {
        let patch_at = self
            .open_elements
            .pop()
            .expect("fixture bug: close without open");
        // The declared span covers everything after the size field,
        // through the closing token just written.
        let span = (self.buf.len() - (patch_at + 4)) as u32;
        self.buf[patch_at..patch_at + 4].copy_from_slice(&span.to_le_bytes());
    }

    pub fn close_empty(&mut self) -> &mut Self {
        self.buf.push(0x03);
        self.patch_open_element();
        self
    }

    pub fn end_element(&mut self) -> &mut Self {
        self.buf.push(0x04);
        self.patch_open_element();
        self
    }

    pub fn value_utf16(&mut self, s: &str) -> &mut Self {
        self.value_typed(0x01, &utf16_bytes(s))
    }

    pub fn value_typed(&mut self, value_type: u8, bytes: &[u8]) -> &mut Self {
        self.buf.push(0x05);
        self.buf.push(value_type);
        self.buf
            .extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn substitution(&mut self, index: u16, value_type: u8, optional: bool) -> &mut Self {
        self.buf.push(if optional { 0x0e } else { 0x0d });
        self.buf.extend_from_slice(&index.to_le_bytes());
        self.buf.push(value_type);
        self
    }

    pub fn cdata(&mut self, s: &str) -> &mut Self {
        self.buf.push(0x07);
        self.buf
            .extend_from_slice(&(s.encode_utf16().count() as u16).to_le_bytes());
        self.buf.extend_from_slice(&utf16_bytes(s));
        self
    }

    pub fn char_ref(&mut self, value: u16) -> &mut Self {
        self.buf.push(0x08);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn entity_ref(&mut self, name: &str) -> &mut Self {
        self.buf.push(0x09);
        let name_offset = self.abs() + 4;
        self.buf.extend_from_slice(&name_offset.to_le_bytes());
        self.push_name_inline(name);
        self
    }

    /// First encounter: inline definition followed by the substitution
    /// block. Returns the definition offset for reuse by later records.
    pub fn template_instance(
        &mut self,
        guid: [u8; 16],
        fragment: impl FnOnce(&mut BinXmlWriter),
        subs: Vec<Sub>,
    ) -> u32 {
        self.buf.push(0x0c);
        self.buf.push(0x01);
        let def_offset = self.abs() + 4;
        self.buf.extend_from_slice(&def_offset.to_le_bytes());

        // Definition: [next:u32][guid:16][data_size:u32][fragment]
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        self.buf.extend_from_slice(&guid);
        let size_patch = self.buf.len();
        self.buf.extend_from_slice(&0u32.to_le_bytes());

        let fragment_base = self.abs();
        let mut fragment_writer = BinXmlWriter::new(fragment_base);
        fragment(&mut fragment_writer);
        let fragment_bytes = fragment_writer.finish();
        let data_size = fragment_bytes.len() as u32;
        self.buf[size_patch..size_patch + 4].copy_from_slice(&data_size.to_le_bytes());
        self.buf.extend_from_slice(&fragment_bytes);

        self.substitution_block(subs);
        def_offset
    }

    /// Later encounter: the definition bytes are not repeated.
    pub fn template_instance_ref(&mut self, def_offset: u32, subs: Vec<Sub>) -> &mut Self {
        self.buf.push(0x0c);
        self.buf.push(0x01);
        self.buf.extend_from_slice(&def_offset.to_le_bytes());
        self.substitution_block(subs);
        self
    }

    fn substitution_block(&mut self, subs: Vec<Sub>) {
        let count = subs.len() as u32;
        let data_start = self.abs() + 4 + 4 * count;

        let mut payloads: Vec<(u8, Vec<u8>)> = Vec::with_capacity(subs.len());
        let mut running = data_start;
        for sub in subs {
            let (value_type, bytes) = match sub {
                Sub::Data(value_type, bytes) => (value_type, bytes),
                Sub::Fragment(build) => {
                    let mut writer = BinXmlWriter::new(running);
                    build(&mut writer);
                    (0x21, writer.finish())
                }
            };
            running += bytes.len() as u32;
            payloads.push((value_type, bytes));
        }

        self.buf.extend_from_slice(&count.to_le_bytes());
        for (value_type, bytes) in &payloads {
            self.buf
                .extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            self.buf.push(*value_type);
            self.buf.push(0x00); // reserved
        }
        for (_, bytes) in &payloads {
            self.buf.extend_from_slice(bytes);
        }
    }
}

/// Builds one 64KiB chunk with correct CRCs and offsets.
#[derive(Default)]
pub struct ChunkBuilder {
    records: Vec<u8>,
    record_ids: Vec<u64>,
    last_record_offset: u32,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        ChunkBuilder::default()
    }

    /// Append a record whose payload is produced by `build`, which receives
    /// a writer already positioned at the payload's chunk offset.
    pub fn record_with(
        &mut self,
        record_id: u64,
        filetime: u64,
        build: impl FnOnce(&mut BinXmlWriter),
    ) -> &mut Self {
        let record_offset = CHUNK_HEADER_SIZE + self.records.len();
        self.last_record_offset = record_offset as u32;

        let payload_base = (record_offset + 24) as u32;
        let mut writer = BinXmlWriter::new(payload_base);
        build(&mut writer);
        let payload = writer.finish();

        let size = (24 + payload.len() + 4) as u32;
        self.records.extend_from_slice(&0x2a2au32.to_le_bytes());
        self.records.extend_from_slice(&size.to_le_bytes());
        self.records.extend_from_slice(&record_id.to_le_bytes());
        self.records.extend_from_slice(&filetime.to_le_bytes());
        self.records.extend_from_slice(&payload);
        self.records.extend_from_slice(&size.to_le_bytes());
        self.record_ids.push(record_id);
        self
    }

    /// A record holding a simple template-free `<Event>...</Event>` body.
    pub fn simple_record(&mut self, record_id: u64, filetime: u64, text: &str) -> &mut Self {
        let text = text.to_string();
        self.record_with(record_id, filetime, move |w| {
            w.fragment_header();
            w.open_element("Event", false);
            w.close_start();
            w.value_utf16(&text);
            w.end_element();
            w.eof();
        })
    }

    /// Corrupt the trailing size copy of the last record.
    pub fn corrupt_last_size_copy(&mut self) -> &mut Self {
        let len = self.records.len();
        self.records[len - 4..].copy_from_slice(&0xdeadbeefu32.to_le_bytes());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        assert!(
            CHUNK_HEADER_SIZE + self.records.len() <= CHUNK_SIZE,
            "fixture bug: records overflow the chunk"
        );

        let first_id = self.record_ids.first().copied().unwrap_or(0);
        let last_id = self.record_ids.last().copied().unwrap_or(0);
        let free_space_offset = (CHUNK_HEADER_SIZE + self.records.len()) as u32;

        let mut chunk = Vec::with_capacity(CHUNK_SIZE);
        chunk.extend_from_slice(b"ElfChnk\x00");
        chunk.extend_from_slice(&first_id.to_le_bytes());
        chunk.extend_from_slice(&last_id.to_le_bytes());
        chunk.extend_from_slice(&first_id.to_le_bytes());
        chunk.extend_from_slice(&last_id.to_le_bytes());
        chunk.extend_from_slice(&128u32.to_le_bytes()); // header size
        chunk.extend_from_slice(&self.last_record_offset.to_le_bytes());
        chunk.extend_from_slice(&free_space_offset.to_le_bytes());

        let events_crc = crc32fast::hash(&self.records);
        chunk.extend_from_slice(&events_crc.to_le_bytes());

        chunk.resize(124, 0); // reserved + flags
        chunk.extend_from_slice(&0u32.to_le_bytes()); // header crc, patched below
        chunk.resize(CHUNK_HEADER_SIZE, 0); // string offsets + template pointers

        chunk.extend_from_slice(&self.records);
        chunk.resize(CHUNK_SIZE, 0);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&chunk[..120]);
        hasher.update(&chunk[128..CHUNK_HEADER_SIZE]);
        let header_crc = hasher.finalize();
        chunk[124..128].copy_from_slice(&header_crc.to_le_bytes());

        chunk
    }

    /// Build the chunk, then stomp the signature.
    pub fn build_with_bad_signature(&self) -> Vec<u8> {
        let mut chunk = self.build();
        chunk[..8].copy_from_slice(b"BadChnk\x00");
        chunk
    }
}

/// Assembles a complete EVTX image: 4096-byte file header plus chunks.
pub struct EvtxImageBuilder {
    chunks: Vec<Vec<u8>>,
    next_record_id: u64,
}

impl EvtxImageBuilder {
    pub fn new() -> Self {
        EvtxImageBuilder {
            chunks: Vec::new(),
            next_record_id: 1,
        }
    }

    pub fn chunk(mut self, chunk: Vec<u8>) -> Self {
        assert_eq!(chunk.len(), CHUNK_SIZE, "fixture bug: wrong chunk length");
        self.chunks.push(chunk);
        self
    }

    pub fn next_record_id(mut self, id: u64) -> Self {
        self.next_record_id = id;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let chunk_count = self.chunks.len() as u16;

        let mut image = Vec::with_capacity(FILE_HEADER_BLOCK_SIZE + self.chunks.len() * CHUNK_SIZE);
        image.extend_from_slice(b"ElfFile\x00");
        image.extend_from_slice(&0u64.to_le_bytes()); // first chunk number
        image.extend_from_slice(&(chunk_count.saturating_sub(1) as u64).to_le_bytes());
        image.extend_from_slice(&self.next_record_id.to_le_bytes());
        image.extend_from_slice(&128u32.to_le_bytes()); // header size
        image.extend_from_slice(&1u16.to_le_bytes()); // minor version
        image.extend_from_slice(&3u16.to_le_bytes()); // major version
        image.extend_from_slice(&4096u16.to_le_bytes()); // header block size
        image.extend_from_slice(&chunk_count.to_le_bytes());
        image.resize(120, 0); // reserved
        let crc = crc32fast::hash(&image[..120]);
        image.resize(124, 0); // flags left zero
        image.extend_from_slice(&crc.to_le_bytes());
        image.resize(FILE_HEADER_BLOCK_SIZE, 0);

        for chunk in self.chunks {
            image.extend_from_slice(&chunk);
        }
        image
    }
}

// === Minimal PE image with a WEVT_TEMPLATE resource ===

const RSRC_RVA: u32 = 0x1000;
const RSRC_FILE_OFFSET: u32 = 0x400;
const RESOURCE_DATA_OFFSET: u32 = 0x80;

/// Build a minimal PE32+ image whose `.rsrc` section carries one
/// `WEVT_TEMPLATE` resource (language 1033) containing `payload`.
pub fn minimal_pe_with_wevt_resource(payload: &[u8]) -> Vec<u8> {
    let rsrc = build_rsrc_section(payload);
    let raw_size = rsrc.len().div_ceil(0x200) * 0x200;

    let e_lfanew: u32 = 0x80;
    let mut pe = vec![0u8; 0x40];
    pe[0] = b'M';
    pe[1] = b'Z';
    pe[0x3c..0x40].copy_from_slice(&e_lfanew.to_le_bytes());
    pe.resize(e_lfanew as usize, 0);

    // PE signature + COFF header
    pe.extend_from_slice(b"PE\x00\x00");
    pe.extend_from_slice(&0x8664u16.to_le_bytes()); // machine: x86-64
    pe.extend_from_slice(&1u16.to_le_bytes()); // one section
    pe.extend_from_slice(&0u32.to_le_bytes()); // timestamp
    pe.extend_from_slice(&0u32.to_le_bytes()); // symbol table
    pe.extend_from_slice(&0u32.to_le_bytes()); // symbol count
    pe.extend_from_slice(&240u16.to_le_bytes()); // optional header size (PE32+)
    pe.extend_from_slice(&0x2022u16.to_le_bytes()); // characteristics

    // Optional header (PE32+)
    let optional_start = pe.len();
    pe.extend_from_slice(&0x20bu16.to_le_bytes()); // magic
    pe.extend_from_slice(&[14, 0]); // linker version
    pe.extend_from_slice(&0u32.to_le_bytes()); // size of code
    pe.extend_from_slice(&(raw_size as u32).to_le_bytes()); // initialized data
    pe.extend_from_slice(&0u32.to_le_bytes()); // uninitialized data
    pe.extend_from_slice(&0u32.to_le_bytes()); // entry point
    pe.extend_from_slice(&0u32.to_le_bytes()); // base of code
    pe.extend_from_slice(&0x1_8000_0000u64.to_le_bytes()); // image base
    pe.extend_from_slice(&0x1000u32.to_le_bytes()); // section alignment
    pe.extend_from_slice(&0x200u32.to_le_bytes()); // file alignment
    pe.extend_from_slice(&[6, 0, 0, 0]); // os version
    pe.extend_from_slice(&[0, 0, 0, 0]); // image version
    pe.extend_from_slice(&[6, 0, 0, 0]); // subsystem version
    pe.extend_from_slice(&0u32.to_le_bytes()); // win32 version
    pe.extend_from_slice(&0x2000u32.to_le_bytes()); // size of image
    pe.extend_from_slice(&0x400u32.to_le_bytes()); // size of headers
    pe.extend_from_slice(&0u32.to_le_bytes()); // checksum
    pe.extend_from_slice(&2u16.to_le_bytes()); // subsystem: GUI
    pe.extend_from_slice(&0u16.to_le_bytes()); // dll characteristics
    pe.extend_from_slice(&0x100000u64.to_le_bytes()); // stack reserve
    pe.extend_from_slice(&0x1000u64.to_le_bytes()); // stack commit
    pe.extend_from_slice(&0x100000u64.to_le_bytes()); // heap reserve
    pe.extend_from_slice(&0x1000u64.to_le_bytes()); // heap commit
    pe.extend_from_slice(&0u32.to_le_bytes()); // loader flags
    pe.extend_from_slice(&16u32.to_le_bytes()); // number of data directories

    // 16 data directories; index 2 is the resource table.
    for index in 0..16u32 {
        if index == 2 {
            pe.extend_from_slice(&RSRC_RVA.to_le_bytes());
            pe.extend_from_slice(&(rsrc.len() as u32).to_le_bytes());
        } else {
            pe.extend_from_slice(&0u64.to_le_bytes());
        }
    }
    assert_eq!(pe.len() - optional_start, 240);

    // Section table: .rsrc
    pe.extend_from_slice(b".rsrc\x00\x00\x00");
    pe.extend_from_slice(&(rsrc.len() as u32).to_le_bytes()); // virtual size
    pe.extend_from_slice(&RSRC_RVA.to_le_bytes());
    pe.extend_from_slice(&(raw_size as u32).to_le_bytes());
    pe.extend_from_slice(&RSRC_FILE_OFFSET.to_le_bytes());
    pe.extend_from_slice(&[0u8; 12]); // relocations/line numbers
    pe.extend_from_slice(&0x4000_0040u32.to_le_bytes()); // initialized data | readable

    pe.resize(RSRC_FILE_OFFSET as usize, 0);
    pe.extend_from_slice(&rsrc);
    pe.resize(RSRC_FILE_OFFSET as usize + raw_size, 0);
    pe
}

/// root / "WEVT_TEMPLATE" / id 1 / lang 1033 -> data
fn build_rsrc_section(payload: &[u8]) -> Vec<u8> {
    let mut rsrc = Vec::new();

    // Root directory: one named entry.
    rsrc.extend_from_slice(&[0u8; 12]);
    rsrc.extend_from_slice(&1u16.to_le_bytes()); // named entries
    rsrc.extend_from_slice(&0u16.to_le_bytes()); // id entries
    rsrc.extend_from_slice(&(0x8000_0000u32 | 0x58).to_le_bytes()); // name at 0x58
    rsrc.extend_from_slice(&(0x8000_0000u32 | 0x18).to_le_bytes()); // dir at 0x18

    // Type directory (WEVT_TEMPLATE): one id entry (resource id 1).
    assert_eq!(rsrc.len(), 0x18);
    rsrc.extend_from_slice(&[0u8; 12]);
    rsrc.extend_from_slice(&0u16.to_le_bytes());
    rsrc.extend_from_slice(&1u16.to_le_bytes());
    rsrc.extend_from_slice(&1u32.to_le_bytes());
    rsrc.extend_from_slice(&(0x8000_0000u32 | 0x30).to_le_bytes());

    // Language directory: one id entry (1033) pointing at the data entry.
    assert_eq!(rsrc.len(), 0x30);
    rsrc.extend_from_slice(&[0u8; 12]);
    rsrc.extend_from_slice(&0u16.to_le_bytes());
    rsrc.extend_from_slice(&1u16.to_le_bytes());
    rsrc.extend_from_slice(&1033u32.to_le_bytes());
    rsrc.extend_from_slice(&0x48u32.to_le_bytes());

    // Data entry.
    assert_eq!(rsrc.len(), 0x48);
    rsrc.extend_from_slice(&(RSRC_RVA + RESOURCE_DATA_OFFSET).to_le_bytes());
    rsrc.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    rsrc.extend_from_slice(&0u32.to_le_bytes()); // code page
    rsrc.extend_from_slice(&0u32.to_le_bytes()); // reserved

    // Resource name: [char_count:u16][utf16]
    assert_eq!(rsrc.len(), 0x58);
    let name = "WEVT_TEMPLATE";
    rsrc.extend_from_slice(&(name.len() as u16).to_le_bytes());
    rsrc.extend_from_slice(&utf16_bytes(name));

    rsrc.resize(RESOURCE_DATA_OFFSET as usize, 0);
    rsrc.extend_from_slice(payload);
    rsrc
}

/// A CRIM manifest with one provider and the given `(guid, binxml)`
/// templates in a single TTBL.
pub fn synthetic_crim_blob(templates: &[([u8; 16], Vec<u8>)]) -> Vec<u8> {
    let provider_data_off: u32 = 16 + 20;
    let wevt_size: u32 = 20 + 8;
    let ttbl_off: u32 = provider_data_off + wevt_size;

    let mut temps = Vec::new();
    for (guid, binxml) in templates {
        let temp_size = 40 + binxml.len() as u32;
        let temp_off = ttbl_off + 12 + temps.len() as u32;
        temps.extend_from_slice(b"TEMP");
        temps.extend_from_slice(&temp_size.to_le_bytes());
        temps.extend_from_slice(&0u32.to_le_bytes()); // item descriptor count
        temps.extend_from_slice(&0u32.to_le_bytes()); // item name count
        temps.extend_from_slice(&(temp_off + temp_size).to_le_bytes()); // items offset
        temps.extend_from_slice(&1u32.to_le_bytes()); // event type
        temps.extend_from_slice(guid);
        temps.extend_from_slice(binxml);
    }

    let ttbl_size = 12 + temps.len() as u32;
    let total = (ttbl_off + ttbl_size) as usize;

    let mut blob = Vec::with_capacity(total);
    blob.extend_from_slice(b"CRIM");
    blob.extend_from_slice(&(total as u32).to_le_bytes());
    blob.extend_from_slice(&3u16.to_le_bytes());
    blob.extend_from_slice(&1u16.to_le_bytes());
    blob.extend_from_slice(&1u32.to_le_bytes()); // provider count
    blob.extend_from_slice(&[0u8; 16]); // provider guid
    blob.extend_from_slice(&provider_data_off.to_le_bytes());

    blob.extend_from_slice(b"WEVT");
    blob.extend_from_slice(&wevt_size.to_le_bytes());
    blob.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
    blob.extend_from_slice(&1u32.to_le_bytes()); // descriptor count
    blob.extend_from_slice(&0u32.to_le_bytes()); // unknown count
    blob.extend_from_slice(&ttbl_off.to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());

    blob.extend_from_slice(b"TTBL");
    blob.extend_from_slice(&ttbl_size.to_le_bytes());
    blob.extend_from_slice(&(templates.len() as u32).to_le_bytes());
    blob.extend_from_slice(&temps);

    assert_eq!(blob.len(), total);
    blob
}
