//! Bounds-checked little-endian reads over a borrowed byte slice.
//!
//! Every decoder owns its own [`ByteCursor`]; cursors never share a position, so several can be
//! spawned over the same buffer with [`ByteCursor::fork_at`].

use crate::error::{malformed, ParseResult};

pub(crate) const CHUNK_HEADER_SIZE: usize = 8;

pub(crate) const RES_NULL_TYPE: u16 = 0x0000;
pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub(crate) const RES_TABLE_TYPE: u16 = 0x0002;
pub(crate) const RES_XML_TYPE: u16 = 0x0003;

pub(crate) const RES_XML_FIRST_CHUNK_TYPE: u16 = 0x0100;
pub(crate) const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
pub(crate) const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
pub(crate) const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub(crate) const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub(crate) const RES_XML_CDATA_TYPE: u16 = 0x0104;
pub(crate) const RES_XML_LAST_CHUNK_TYPE: u16 = 0x017f;
pub(crate) const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

pub(crate) const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub(crate) const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
pub(crate) const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;
pub(crate) const RES_TABLE_LIBRARY_TYPE: u16 = 0x0203;
pub(crate) const RES_TABLE_OVERLAYABLE_TYPE: u16 = 0x0204;
pub(crate) const RES_TABLE_OVERLAYABLE_POLICY_TYPE: u16 = 0x0205;
pub(crate) const RES_TABLE_STAGED_ALIAS_TYPE: u16 = 0x0206;

/// A position-carrying view over a shared, read-only buffer.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, pos: 0 }
    }

    /// A fresh cursor over the same buffer, positioned at `pos`.
    pub fn fork_at(&self, pos: usize) -> ParseResult<ByteCursor<'a>> {
        let mut cursor = ByteCursor::new(self.data);
        cursor.seek(pos)?;
        Ok(cursor)
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, count: usize, what: &str) -> ParseResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                malformed!(
                    "unexpected end of buffer reading {} at 0x{:x} (len 0x{:x})",
                    what,
                    self.pos,
                    self.data.len()
                )
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> ParseResult<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn read_u16(&mut self) -> ParseResult<u16> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> ParseResult<u32> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> ParseResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> ParseResult<u64> {
        let b = self.take(8, "u64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_bytes(&mut self, count: usize) -> ParseResult<&'a [u8]> {
        self.take(count, "byte run")
    }

    pub fn skip(&mut self, count: usize) -> ParseResult<()> {
        self.take(count, "padding").map(|_| ())
    }

    pub fn seek(&mut self, offset: usize) -> ParseResult<()> {
        if offset > self.data.len() {
            return Err(malformed!(
                "seek to 0x{:x} past end of buffer (len 0x{:x})",
                offset,
                self.data.len()
            ));
        }
        self.pos = offset;
        Ok(())
    }

    /// Borrow `len` bytes starting at `start` without moving the cursor.
    pub fn slice(&self, start: usize, len: usize) -> ParseResult<&'a [u8]> {
        start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .map(|end| &self.data[start..end])
            .ok_or_else(|| malformed!("slice 0x{:x}+0x{:x} out of bounds", start, len))
    }

    /// Read a fixed-width UTF-16 field of `chars` code units, stopping at the first NUL.
    /// The whole field is consumed regardless of where the terminator sits.
    pub fn read_fixed_utf16(&mut self, chars: usize) -> ParseResult<String> {
        let raw = self.take(chars * 2, "fixed UTF-16 string")?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|unit| *unit != 0)
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Read a NUL-terminated UTF-16 string.
    pub fn read_terminated_utf16(&mut self) -> ParseResult<String> {
        let mut units = Vec::new();
        loop {
            let unit = self.read_u16()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    pub fn read_chunk_header(&mut self) -> ParseResult<ChunkHeader> {
        let start = self.pos;
        if self.remaining() < CHUNK_HEADER_SIZE {
            return Err(malformed!("truncated chunk header at 0x{:x}", start));
        }
        let chunk_type = self.read_u16()?;
        let header_size = self.read_u16()?;
        let chunk_size = self.read_u32()?;
        if (header_size as usize) < CHUNK_HEADER_SIZE || chunk_size < header_size as u32 {
            return Err(malformed!(
                "invalid sizing for chunk 0x{:04x} at 0x{:x}: header {} chunk {}",
                chunk_type,
                start,
                header_size,
                chunk_size
            ));
        }
        let end = start
            .checked_add(chunk_size as usize)
            .ok_or_else(|| malformed!("chunk size overflow at 0x{:x}", start))?;
        if end > self.data.len() {
            return Err(malformed!(
                "chunk 0x{:04x} at 0x{:x} extends past end of buffer (0x{:x} > 0x{:x})",
                chunk_type,
                start,
                end,
                self.data.len()
            ));
        }
        Ok(ChunkHeader {
            chunk_type,
            header_size,
            chunk_size,
            start,
        })
    }
}

/// The `(type, header size, chunk size)` triple that starts every ARSC and AXML chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: u16,
    pub header_size: u16,
    pub chunk_size: u32,
    pub start: usize,
}

impl ChunkHeader {
    pub fn end(&self) -> usize {
        self.start + self.chunk_size as usize
    }

    pub fn body_start(&self) -> usize {
        self.start + self.header_size as usize
    }

    pub fn body_size(&self) -> usize {
        self.chunk_size as usize - self.header_size as usize
    }
}
