use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::FILE_HEADER_BLOCK_SIZE;
use crate::err::{EvtxError, Result};

/// Byte span covered by the file header CRC.
const HEADER_CRC_RANGE: usize = 120;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        const DIRTY = 0x1;
        const FULL = 0x2;
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct EvtxFileHeader {
    pub first_chunk_number: u64,
    pub last_chunk_number: u64,
    pub next_record_id: u64,
    pub header_size: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub header_block_size: u16,
    pub chunk_count: u16,
    pub flags: HeaderFlags,
    /// CRC32 over the first 120 bytes of the header.
    pub checksum: u32,
}

impl EvtxFileHeader {
    pub fn from_buf(buf: &[u8]) -> Result<EvtxFileHeader> {
        if buf.len() < FILE_HEADER_BLOCK_SIZE {
            return Err(EvtxError::IncompleteFileHeader { len: buf.len() });
        }

        let mut cursor = Cursor::new(buf);

        let mut magic = [0_u8; 8];
        cursor.read_exact(&mut magic)?;
        if &magic != b"ElfFile\x00" {
            return Err(EvtxError::InvalidFileSignature { magic });
        }

        let first_chunk_number = cursor.read_u64::<LittleEndian>()?;
        let last_chunk_number = cursor.read_u64::<LittleEndian>()?;
        let next_record_id = cursor.read_u64::<LittleEndian>()?;
        let header_size = cursor.read_u32::<LittleEndian>()?;
        let minor_version = cursor.read_u16::<LittleEndian>()?;
        let major_version = cursor.read_u16::<LittleEndian>()?;
        let header_block_size = cursor.read_u16::<LittleEndian>()?;
        let chunk_count = cursor.read_u16::<LittleEndian>()?;

        // Reserved
        cursor.seek(SeekFrom::Current(76))?;
        // Unknown flag bits are preserved rather than rejected.
        let flags = HeaderFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let checksum = cursor.read_u32::<LittleEndian>()?;

        Ok(EvtxFileHeader {
            first_chunk_number,
            last_chunk_number,
            next_record_id,
            header_size,
            minor_version,
            major_version,
            header_block_size,
            chunk_count,
            flags,
            checksum,
        })
    }

    /// Recompute the CRC over the first 120 bytes and compare against the
    /// stored value. A mismatch is a warning, not an error.
    pub fn verify_checksum(&self, buf: &[u8]) -> Option<u32> {
        let computed = crc32fast::hash(&buf[..HEADER_CRC_RANGE]);
        (computed != self.checksum).then_some(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_block() -> Vec<u8> {
        let mut buf = Vec::with_capacity(FILE_HEADER_BLOCK_SIZE);
        buf.extend_from_slice(b"ElfFile\x00");
        buf.extend_from_slice(&0u64.to_le_bytes()); // first chunk
        buf.extend_from_slice(&25u64.to_le_bytes()); // last chunk
        buf.extend_from_slice(&2226u64.to_le_bytes()); // next record id
        buf.extend_from_slice(&128u32.to_le_bytes()); // header size
        buf.extend_from_slice(&1u16.to_le_bytes()); // minor
        buf.extend_from_slice(&3u16.to_le_bytes()); // major
        buf.extend_from_slice(&4096u16.to_le_bytes()); // header block size
        buf.extend_from_slice(&26u16.to_le_bytes()); // chunk count
        buf.resize(120, 0);
        buf.extend_from_slice(&HeaderFlags::DIRTY.bits().to_le_bytes());
        let crc = crc32fast::hash(&buf[..120]);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.resize(FILE_HEADER_BLOCK_SIZE, 0);
        buf
    }

    #[test]
    fn parses_file_header() {
        let buf = header_block();
        let header = EvtxFileHeader::from_buf(&buf).unwrap();

        assert_eq!(
            header,
            EvtxFileHeader {
                first_chunk_number: 0,
                last_chunk_number: 25,
                next_record_id: 2226,
                header_size: 128,
                minor_version: 1,
                major_version: 3,
                header_block_size: 4096,
                chunk_count: 26,
                flags: HeaderFlags::DIRTY,
                checksum: crc32fast::hash(&buf[..120]),
            }
        );
        assert_eq!(header.verify_checksum(&buf), None);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut buf = header_block();
        buf[0] = b'X';
        assert!(matches!(
            EvtxFileHeader::from_buf(&buf),
            Err(EvtxError::InvalidFileSignature { .. })
        ));
    }

    #[test]
    fn checksum_mismatch_is_reported_not_fatal() {
        let mut buf = header_block();
        buf[8] ^= 0xff; // corrupt a covered byte
        let header = EvtxFileHeader::from_buf(&buf).unwrap();
        assert!(header.verify_checksum(&buf).is_some());
    }
}
