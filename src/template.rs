//! Template definition caching.
//!
//! Definitions are cached twice: per chunk by chunk-relative offset (the
//! interpreter's hot path, strictly thread-local) and process-wide by GUID
//! (shared across workers, first-wins). Rendering always uses the
//! definition the chunk itself observed; the global map exists for
//! cross-chunk statistics and manifest preloads.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Mutex;

use hashbrown::{HashMap, HashSet};
use log::warn;

use crate::ChunkOffset;
use crate::binxml::stream::ByteReader;
use crate::err::{ParseWarning, Result};
use crate::guid::Guid;

/// `[next_def_offset:u32][guid:16][data_size:u32]` precede the fragment.
pub(crate) const TEMPLATE_DEFINITION_HEADER_SIZE: usize = 24;

/// A template definition compiled against a specific chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDefinition {
    pub guid: Guid,
    pub next_offset: u32,
    pub data_size: u32,
    /// Chunk-relative byte range of the BinXml fragment body.
    pub fragment: Range<usize>,
}

impl TemplateDefinition {
    /// Parse the definition header at `offset` and bounds-check the
    /// fragment it declares.
    pub fn read_at(data: &[u8], offset: ChunkOffset) -> Result<TemplateDefinition> {
        let mut reader = ByteReader::with_pos(data, offset as usize);
        let next_offset = reader.read_u32()?;
        let guid = reader.read_guid()?;
        let data_size = reader.read_u32()?;

        let fragment_start = reader.pos();
        // Bounds-check by consuming; the returned range borrows nothing.
        reader.take(data_size as usize)?;

        Ok(TemplateDefinition {
            guid,
            next_offset,
            data_size,
            fragment: fragment_start..fragment_start + data_size as usize,
        })
    }
}

/// Per-chunk `offset -> definition` index.
#[derive(Default)]
pub struct ChunkTemplateCache {
    map: RefCell<HashMap<ChunkOffset, Rc<TemplateDefinition>>>,
}

impl ChunkTemplateCache {
    pub fn new() -> Self {
        ChunkTemplateCache::default()
    }

    pub fn get(&self, offset: ChunkOffset) -> Option<Rc<TemplateDefinition>> {
        self.map.borrow().get(&offset).cloned()
    }

    pub fn insert(&self, offset: ChunkOffset, definition: TemplateDefinition) -> Rc<TemplateDefinition> {
        let definition = Rc::new(definition);
        self.map.borrow_mut().insert(offset, definition.clone());
        definition
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }

    pub fn entries(&self) -> Vec<(ChunkOffset, Rc<TemplateDefinition>)> {
        self.map
            .borrow()
            .iter()
            .map(|(offset, def)| (*offset, def.clone()))
            .collect()
    }

    /// Seed the index from the chunk header's 32 template pointer slots,
    /// following each slot's `next_definition_offset` chain.
    pub fn populate(
        &self,
        data: &[u8],
        slots: &[ChunkOffset],
        chunk_index: u16,
        warnings: &mut Vec<ParseWarning>,
    ) {
        for &slot in slots.iter().filter(|&&o| o > 0) {
            let mut seen: HashSet<ChunkOffset> = HashSet::new();
            let mut offset = slot;

            while offset > 0 {
                if !seen.insert(offset) {
                    warnings.push(ParseWarning::TemplateChainCycle {
                        chunk_index,
                        offset,
                    });
                    break;
                }

                // A previous slot may already have walked this suffix.
                if let Some(cached) = self.get(offset) {
                    offset = cached.next_offset;
                    continue;
                }

                match TemplateDefinition::read_at(data, offset) {
                    Ok(definition) => {
                        let next = definition.next_offset;
                        self.insert(offset, definition);
                        offset = next;
                    }
                    Err(e) => {
                        warn!(
                            "chunk {chunk_index}: template pointer slot chain broke at offset {offset}: {e}"
                        );
                        break;
                    }
                }
            }
        }
    }
}

/// Where a globally cached template body was first observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource {
    Chunk { chunk_index: u16, offset: ChunkOffset },
    Manifest,
}

/// A template body owned independently of any file image.
#[derive(Debug, Clone)]
pub struct TemplateBlob {
    pub guid: Guid,
    pub bytes: Vec<u8>,
    pub source: TemplateSource,
}

const SHARD_COUNT: usize = 16;

type Shard = Mutex<HashMap<Guid, std::sync::Arc<TemplateBlob>, ahash::RandomState>>;

/// Process-wide `GUID -> template` cache.
///
/// First-wins under concurrent insertion: once a GUID is present, later
/// inserts (other chunks, repeated manifest loads) are ignored. Sharded so
/// parallel chunk workers rarely contend on the same lock.
pub struct GuidCache {
    shards: Vec<Shard>,
    hasher: ahash::RandomState,
}

impl Default for GuidCache {
    fn default() -> Self {
        GuidCache {
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(HashMap::with_hasher(ahash::RandomState::new())))
                .collect(),
            hasher: ahash::RandomState::new(),
        }
    }
}

impl GuidCache {
    pub fn new() -> Self {
        GuidCache::default()
    }

    fn shard_for(&self, guid: &Guid) -> &Shard {
        use std::hash::BuildHasher;
        let hash = self.hasher.hash_one(guid);
        &self.shards[(hash as usize) % SHARD_COUNT]
    }

    /// Insert unless the GUID is already present. Returns whether the
    /// insertion occurred.
    pub fn insert_if_absent(&self, blob: TemplateBlob) -> bool {
        let shard = self.shard_for(&blob.guid);
        let mut map = shard.lock().expect("template cache lock poisoned");
        match map.entry(blob.guid) {
            hashbrown::hash_map::Entry::Occupied(_) => false,
            hashbrown::hash_map::Entry::Vacant(v) => {
                v.insert(std::sync::Arc::new(blob));
                true
            }
        }
    }

    pub fn get(&self, guid: &Guid) -> Option<std::sync::Arc<TemplateBlob>> {
        self.shard_for(guid)
            .lock()
            .expect("template cache lock poisoned")
            .get(guid)
            .cloned()
    }

    /// Preseed from manifest-extracted `{guid, bytes}` pairs. Returns the
    /// number of templates actually inserted (duplicates lose).
    pub fn populate_from_manifest<I>(&self, templates: I) -> usize
    where
        I: IntoIterator<Item = (Guid, Vec<u8>)>,
    {
        let mut inserted = 0;
        for (guid, bytes) in templates {
            if self.insert_if_absent(TemplateBlob {
                guid,
                bytes,
                source: TemplateSource::Manifest,
            }) {
                inserted += 1;
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().expect("template cache lock poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guid(tag: u8) -> Guid {
        Guid::from_le_bytes(&[tag; 16])
    }

    fn definition_bytes(next: u32, guid_tag: u8, fragment: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&next.to_le_bytes());
        buf.extend_from_slice(&[guid_tag; 16]);
        buf.extend_from_slice(&(fragment.len() as u32).to_le_bytes());
        buf.extend_from_slice(fragment);
        buf
    }

    #[test]
    fn reads_definition_and_fragment_range() {
        let bytes = definition_bytes(0, 0xaa, &[0x0f, 0x01, 0x01, 0x00, 0x00]);
        let def = TemplateDefinition::read_at(&bytes, 0).unwrap();
        assert_eq!(def.guid, guid(0xaa));
        assert_eq!(def.next_offset, 0);
        assert_eq!(def.data_size, 5);
        assert_eq!(def.fragment, 24..29);
    }

    #[test]
    fn definition_fragment_is_bounds_checked() {
        let mut bytes = definition_bytes(0, 0xaa, &[0u8; 8]);
        bytes.truncate(bytes.len() - 4);
        assert!(TemplateDefinition::read_at(&bytes, 0).is_err());
    }

    #[test]
    fn populate_follows_chains() {
        let first = definition_bytes(0, 0xaa, &[0x00]);
        let second_offset = first.len() as u32;
        let mut data = first;
        data.extend(definition_bytes(0, 0xbb, &[0x00]));
        data[0..4].copy_from_slice(&second_offset.to_le_bytes());

        let cache = ChunkTemplateCache::new();
        let mut warnings = Vec::new();
        cache.populate(&data, &[0], 0, &mut warnings);

        assert_eq!(cache.len(), 2);
        assert!(warnings.is_empty());
        assert!(cache.get(0).is_some());
        assert!(cache.get(second_offset).is_some());
    }

    #[test]
    fn populate_detects_chain_cycles() {
        // A -> B -> A
        let first = definition_bytes(0, 0xaa, &[0x00]);
        let second_offset = first.len() as u32;
        let mut data = first;
        data.extend(definition_bytes(0, 0xbb, &[0x00]));
        data[0..4].copy_from_slice(&second_offset.to_le_bytes());
        // Second definition's next link loops back onto itself.
        data[second_offset as usize..second_offset as usize + 4]
            .copy_from_slice(&second_offset.to_le_bytes());

        let cache = ChunkTemplateCache::new();
        let mut warnings = Vec::new();
        cache.populate(&data, &[0], 3, &mut warnings);

        assert_eq!(cache.len(), 2);
        assert_eq!(
            warnings,
            vec![ParseWarning::TemplateChainCycle {
                chunk_index: 3,
                offset: second_offset
            }]
        );
    }

    #[test]
    fn guid_cache_is_first_wins() {
        let cache = GuidCache::new();
        assert!(cache.insert_if_absent(TemplateBlob {
            guid: guid(0x11),
            bytes: vec![1, 2, 3],
            source: TemplateSource::Manifest,
        }));
        assert!(!cache.insert_if_absent(TemplateBlob {
            guid: guid(0x11),
            bytes: vec![4, 5, 6],
            source: TemplateSource::Chunk {
                chunk_index: 0,
                offset: 512
            },
        }));

        let blob = cache.get(&guid(0x11)).unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(blob.source, TemplateSource::Manifest);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn populate_from_manifest_counts_only_new_guids() {
        let cache = GuidCache::new();
        let templates = vec![(guid(0x01), vec![1]), (guid(0x02), vec![2])];

        assert_eq!(cache.populate_from_manifest(templates.clone()), 2);
        assert_eq!(cache.populate_from_manifest(templates), 0);
        assert_eq!(cache.len(), 2);
    }
}
