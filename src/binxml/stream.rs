//! A positioned reader over an immutable chunk byte window.
//!
//! All multi-byte reads are little-endian. Reads never panic; running off
//! the end yields [`EvtxError::Overrun`] carrying the failing offset so the
//! interpreter can attach it to the current record.

use crate::err::{EvtxError, Result};
use crate::guid::Guid;

#[derive(Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn with_pos(data: &'a [u8], pos: usize) -> Self {
        ByteReader { data, pos }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        match self.data.get(self.pos..self.pos + len) {
            Some(slice) => {
                self.pos += len;
                Ok(slice)
            }
            None => Err(EvtxError::Overrun {
                offset: self.pos,
                wanted: len,
                remaining: self.remaining(),
            }),
        }
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(EvtxError::Overrun {
            offset: self.pos,
            wanted: 1,
            remaining: 0,
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        let b = self.take(16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(b);
        Ok(Guid::from_le_bytes(&bytes))
    }

    /// Read a `[char_count:u16][utf16]` length-prefixed string, optionally
    /// consuming a trailing NUL code unit.
    pub fn read_len_prefixed_utf16(&mut self, null_terminated: bool) -> Result<String> {
        let start = self.pos;
        let char_count = self.read_u16()? as usize;
        let bytes = self.take(char_count * 2)?;

        if null_terminated {
            self.skip(2)?;
        }

        crate::utils::utf16_le_to_string(bytes)
            .ok_or(EvtxError::FailedToDecodeUTF16String { offset: start })
    }
}
