//! Per-chunk interning of element and attribute names.
//!
//! Names are referenced by chunk-relative offset and laid out as
//! `[next:u32][hash:u16][char_count:u16][utf16][nul:u16]`. A name may be
//! referenced before the position where its bytes live, so decoding is a
//! pure function of `(chunk bytes, offset)` and is memoized on first use.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use log::warn;

use crate::ChunkOffset;
use crate::binxml::stream::ByteReader;
use crate::err::Result;

/// Bytes preceding the length-prefixed string: the `next` link and hash.
const NAME_LINK_SIZE: usize = 6;

#[derive(Debug, Clone)]
pub struct CachedName {
    pub name: Rc<str>,
    /// Total byte length of the name structure, for skipping inline names.
    pub byte_len: u32,
}

#[derive(Default)]
pub struct NameTable {
    cache: RefCell<HashMap<ChunkOffset, CachedName>>,
}

impl NameTable {
    pub fn new() -> Self {
        NameTable::default()
    }

    /// Eagerly decode the names listed in the chunk header's common-string
    /// slots. Purely an optimization; offsets that fail to decode are left
    /// to the lazy path of whatever record references them.
    pub fn seed(&self, data: &[u8], offsets: &[ChunkOffset]) {
        for &offset in offsets.iter().filter(|&&o| o > 0) {
            if let Err(e) = self.get(data, offset) {
                warn!("common-string slot at offset {offset} failed to decode: {e}");
            }
        }
    }

    /// Resolve the name at `offset`, decoding and memoizing on first use.
    pub fn get(&self, data: &[u8], offset: ChunkOffset) -> Result<CachedName> {
        if let Some(cached) = self.cache.borrow().get(&offset) {
            return Ok(cached.clone());
        }

        let decoded = Self::decode_at(data, offset)?;
        self.cache.borrow_mut().insert(offset, decoded.clone());
        Ok(decoded)
    }

    fn decode_at(data: &[u8], offset: ChunkOffset) -> Result<CachedName> {
        let mut reader = ByteReader::with_pos(data, offset as usize);
        reader.skip(NAME_LINK_SIZE)?;
        let name = reader.read_len_prefixed_utf16(true)?;
        let byte_len = (reader.pos() - offset as usize) as u32;

        Ok(CachedName {
            name: Rc::from(name.as_str()),
            byte_len,
        })
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_struct(name: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 4]; // next link
        buf.extend_from_slice(&0u16.to_le_bytes()); // hash (not validated)
        buf.extend_from_slice(&(name.encode_utf16().count() as u16).to_le_bytes());
        buf.extend(name.encode_utf16().flat_map(|u| u.to_le_bytes()));
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    #[test]
    fn decodes_name_at_offset() {
        let mut data = vec![0xffu8; 16];
        data.extend(name_struct("Provider"));

        let table = NameTable::new();
        let cached = table.get(&data, 16).unwrap();
        assert_eq!(&*cached.name, "Provider");
        assert_eq!(cached.byte_len as usize, 6 + 2 + 16 + 2);
    }

    #[test]
    fn repeated_reads_hit_the_cache() {
        let data = name_struct("Event");
        let table = NameTable::new();

        let first = table.get(&data, 0).unwrap();
        let second = table.get(&data, 0).unwrap();
        assert!(Rc::ptr_eq(&first.name, &second.name));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn out_of_bounds_offset_errors() {
        let data = name_struct("Event");
        let table = NameTable::new();
        assert!(table.get(&data, 4096).is_err());
    }
}
