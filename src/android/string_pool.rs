//! The `ResStringPool` chunk shared by resource tables and binary XML.

use crate::android::buffer::{ByteCursor, ChunkHeader};
use crate::error::{ParseError, ParseResult};
use bitflags::bitflags;
use std::collections::HashMap;
use std::rc::Rc;

/// Index value meaning "no string".
pub const NO_ENTRY_INDEX: u32 = 0xFFFF_FFFF;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StringPoolFlags: u32 {
        const SORTED = 0x0000_0001;
        const UTF8 = 0x0000_0100;
    }
}

/// A decoded string pool. Strings are reference counted so every structure that refers to
/// an entry by index can hold it without copying.
#[derive(Clone, Debug, Default)]
pub struct StringPool {
    strings: Vec<Rc<str>>,
    flags: StringPoolFlags,
    style_count: u32,
}

impl StringPool {
    pub fn empty() -> Self {
        StringPool::default()
    }

    /// Decode the pool whose header has already been read into `header`.
    /// `cursor` must sit right after the common 8-byte chunk header.
    pub fn parse(cursor: &mut ByteCursor<'_>, header: &ChunkHeader) -> ParseResult<Self> {
        let string_count = cursor.read_u32()? as usize;
        let style_count = cursor.read_u32()?;
        let flags = StringPoolFlags::from_bits_retain(cursor.read_u32()?);
        let strings_start = cursor.read_u32()? as usize;
        let _styles_start = cursor.read_u32()?;

        cursor.seek(header.body_start())?;
        let table_bytes = string_count
            .checked_mul(4)
            .filter(|size| *size <= cursor.remaining())
            .ok_or_else(|| {
                ParseError::MalformedPool(format!(
                    "{} string offsets do not fit in the pool at 0x{:x}",
                    string_count, header.start
                ))
            })?;
        let mut offsets = Vec::with_capacity(table_bytes / 4);
        for _ in 0..string_count {
            offsets.push(cursor.read_u32()? as usize);
        }
        // style offsets and span records are not needed for metadata
        cursor.seek(header.end())?;

        let body_size = header.chunk_size as usize;
        let data = cursor.data();
        let mut strings = Vec::with_capacity(string_count);
        let mut by_offset: HashMap<usize, Rc<str>> = HashMap::new();
        for (idx, offset) in offsets.into_iter().enumerate() {
            if let Some(shared) = by_offset.get(&offset) {
                strings.push(Rc::clone(shared));
                continue;
            }
            let relative = strings_start.checked_add(offset).filter(|pos| *pos < body_size);
            let absolute = match relative {
                Some(pos) => header.start + pos,
                None => {
                    return Err(ParseError::MalformedPool(format!(
                        "string #{} offset 0x{:x} exceeds pool size 0x{:x}",
                        idx, offset, body_size
                    )))
                }
            };
            let text: Rc<str> = if flags.contains(StringPoolFlags::UTF8) {
                read_utf8_string(data, absolute, header.end())?
            } else {
                read_utf16_string(data, absolute, header.end())?
            }
            .into();
            by_offset.insert(offset, Rc::clone(&text));
            strings.push(text);
        }

        Ok(StringPool {
            strings,
            flags,
            style_count,
        })
    }

    /// Look up a string by index. `NO_ENTRY_INDEX` yields `None`, anything else out of range
    /// is an error.
    pub fn get(&self, idx: u32) -> ParseResult<Option<Rc<str>>> {
        if idx == NO_ENTRY_INDEX {
            return Ok(None);
        }
        self.strings
            .get(idx as usize)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                ParseError::MalformedPool(format!(
                    "string index {} out of range ({} strings)",
                    idx,
                    self.strings.len()
                ))
            })
    }

    /// Like [`StringPool::get`] but treats a missing string as empty.
    pub fn get_or_empty(&self, idx: u32) -> ParseResult<Rc<str>> {
        Ok(self.get(idx)?.unwrap_or_else(|| Rc::from("")))
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.flags.contains(StringPoolFlags::UTF8)
    }

    pub fn is_sorted(&self) -> bool {
        self.flags.contains(StringPoolFlags::SORTED)
    }

    pub fn style_count(&self) -> u32 {
        self.style_count
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| s.as_ref())
    }
}

fn pool_error(msg: &str, offset: usize) -> ParseError {
    ParseError::MalformedPool(format!("{msg} at 0x{offset:x}"))
}

fn read_utf8_string(data: &[u8], offset: usize, limit: usize) -> ParseResult<String> {
    let mut cursor = offset;
    // the first length counts UTF-16 units and is only informative
    let (_, len_bytes) = read_utf8_length(data, cursor, limit)?;
    cursor += len_bytes;
    let (byte_len, byte_len_size) = read_utf8_length(data, cursor, limit)?;
    cursor += byte_len_size;
    if cursor + byte_len > limit {
        return Err(pool_error("UTF-8 string exceeds chunk bounds", offset));
    }
    let slice = &data[cursor..cursor + byte_len];
    let text = match std::str::from_utf8(slice) {
        Ok(text) => text.to_string(),
        Err(_) => match cesu8::from_java_cesu8(slice) {
            Ok(text) => text.into_owned(),
            Err(_) => String::from_utf8_lossy(slice).into_owned(),
        },
    };
    Ok(text)
}

fn read_utf16_string(data: &[u8], offset: usize, limit: usize) -> ParseResult<String> {
    let mut cursor = offset;
    let (char_count, header_bytes) = read_utf16_length(data, cursor, limit)?;
    cursor += header_bytes;
    let byte_len = char_count * 2;
    if cursor + byte_len > limit {
        return Err(pool_error("UTF-16 string exceeds chunk bounds", offset));
    }
    let units: Vec<u16> = data[cursor..cursor + byte_len]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

fn read_utf8_length(data: &[u8], offset: usize, limit: usize) -> ParseResult<(usize, usize)> {
    if offset >= limit {
        return Err(pool_error("invalid UTF-8 length offset", offset));
    }
    let first = data[offset];
    if (first & 0x80) == 0 {
        Ok((first as usize, 1))
    } else {
        if offset + 1 >= limit {
            return Err(pool_error("truncated UTF-8 length", offset));
        }
        let second = data[offset + 1];
        Ok(((((first & 0x7F) as usize) << 8) | second as usize, 2))
    }
}

fn read_utf16_length(data: &[u8], offset: usize, limit: usize) -> ParseResult<(usize, usize)> {
    if offset + 2 > limit {
        return Err(pool_error("invalid UTF-16 length offset", offset));
    }
    let first = u16::from_le_bytes([data[offset], data[offset + 1]]);
    if (first & 0x8000) == 0 {
        Ok((first as usize, 2))
    } else {
        if offset + 4 > limit {
            return Err(pool_error("truncated UTF-16 length", offset));
        }
        let second = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
        Ok(((((first & 0x7FFF) as usize) << 16) | second as usize, 4))
    }
}
