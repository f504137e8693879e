//! BER data values: identifier and length octets, definite and indefinite lengths, and the
//! OBJECT IDENTIFIER content codec.

use crate::asn1::Asn1Error;

pub const CLASS_UNIVERSAL: u8 = 0;
pub const CLASS_APPLICATION: u8 = 1;
pub const CLASS_CONTEXT_SPECIFIC: u8 = 2;
pub const CLASS_PRIVATE: u8 = 3;

pub const TAG_BOOLEAN: u32 = 0x01;
pub const TAG_INTEGER: u32 = 0x02;
pub const TAG_BIT_STRING: u32 = 0x03;
pub const TAG_OCTET_STRING: u32 = 0x04;
pub const TAG_NULL: u32 = 0x05;
pub const TAG_OBJECT_IDENTIFIER: u32 = 0x06;
pub const TAG_UTF8_STRING: u32 = 0x0c;
pub const TAG_SEQUENCE: u32 = 0x10;
pub const TAG_SET: u32 = 0x11;
pub const TAG_PRINTABLE_STRING: u32 = 0x13;
pub const TAG_UTC_TIME: u32 = 0x17;
pub const TAG_GENERALIZED_TIME: u32 = 0x18;

const CONSTRUCTED_FLAG: u8 = 0x20;
const MAX_NESTING: usize = 64;

/// One decoded tag-length-value. Slices borrow the input buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BerValue<'a> {
    pub tag_class: u8,
    pub tag_number: u32,
    pub constructed: bool,
    /// The whole TLV, including an end-of-contents marker for indefinite lengths.
    pub encoded: &'a [u8],
    pub contents: &'a [u8],
}

impl<'a> BerValue<'a> {
    pub fn contents_reader(&self) -> BerReader<'a> {
        BerReader::new(self.contents)
    }

    pub fn is_universal(&self, tag_number: u32) -> bool {
        self.tag_class == CLASS_UNIVERSAL && self.tag_number == tag_number
    }
}

/// Reads consecutive data values from a buffer.
#[derive(Clone, Debug)]
pub struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> BerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BerReader {
            data,
            pos: 0,
            depth: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// The next data value, or `None` once the buffer is exhausted.
    pub fn read_value(&mut self) -> Result<Option<BerValue<'a>>, Asn1Error> {
        if self.is_finished() {
            return Ok(None);
        }
        let start = self.pos;
        let (tag_class, constructed, tag_number) = self.read_identifier()?;
        let length = self.read_length()?;
        let contents_start = self.pos;
        let (contents, end) = match length {
            Some(len) => {
                let end = contents_start
                    .checked_add(len)
                    .filter(|end| *end <= self.data.len())
                    .ok_or_else(|| {
                        Asn1Error::Decoding(format!(
                            "length {} at offset {} runs past the end of the input",
                            len, start
                        ))
                    })?;
                (&self.data[contents_start..end], end)
            }
            None => {
                if !constructed {
                    return Err(Asn1Error::Decoding(format!(
                        "indefinite length on primitive value at offset {start}"
                    )));
                }
                let contents_end = self.skip_to_end_of_contents()?;
                (&self.data[contents_start..contents_end], contents_end + 2)
            }
        };
        self.pos = end;
        Ok(Some(BerValue {
            tag_class,
            tag_number,
            constructed,
            encoded: &self.data[start..end],
            contents,
        }))
    }

    fn next_byte(&mut self) -> Result<u8, Asn1Error> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Asn1Error::Decoding("truncated data value".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_identifier(&mut self) -> Result<(u8, bool, u32), Asn1Error> {
        let first = self.next_byte()?;
        let tag_class = first >> 6;
        let constructed = first & CONSTRUCTED_FLAG != 0;
        let mut tag_number = (first & 0x1f) as u32;
        if tag_number == 0x1f {
            // high tag number form: base-128, most significant group first
            tag_number = 0;
            loop {
                let byte = self.next_byte()?;
                if tag_number > (u32::MAX >> 7) {
                    return Err(Asn1Error::Unsupported("tag number too large".to_string()));
                }
                tag_number = (tag_number << 7) | (byte & 0x7f) as u32;
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }
        Ok((tag_class, constructed, tag_number))
    }

    /// `None` for the indefinite form.
    fn read_length(&mut self) -> Result<Option<usize>, Asn1Error> {
        let first = self.next_byte()?;
        if first & 0x80 == 0 {
            return Ok(Some(first as usize));
        }
        let count = (first & 0x7f) as usize;
        if count == 0 {
            return Ok(None);
        }
        if count > 4 {
            return Err(Asn1Error::Unsupported(format!(
                "length of length {count} exceeds 4 bytes"
            )));
        }
        let mut length = 0usize;
        for _ in 0..count {
            length = (length << 8) | self.next_byte()? as usize;
        }
        Ok(Some(length))
    }

    /// Advance over nested values until the end-of-contents marker and return its offset.
    fn skip_to_end_of_contents(&mut self) -> Result<usize, Asn1Error> {
        if self.depth >= MAX_NESTING {
            return Err(Asn1Error::Decoding(
                "indefinite-length values nested too deeply".to_string(),
            ));
        }
        loop {
            if self.data.len() - self.pos < 2 {
                return Err(Asn1Error::Decoding(
                    "missing end-of-contents marker".to_string(),
                ));
            }
            if self.data[self.pos] == 0 && self.data[self.pos + 1] == 0 {
                return Ok(self.pos);
            }
            let mut nested = BerReader {
                data: self.data,
                pos: self.pos,
                depth: self.depth + 1,
            };
            nested.read_value()?;
            self.pos = nested.pos;
        }
    }
}

/// Identifier octets for a tag.
pub fn write_identifier(out: &mut Vec<u8>, tag_class: u8, constructed: bool, tag_number: u32) {
    let lead = (tag_class << 6) | if constructed { CONSTRUCTED_FLAG } else { 0 };
    if tag_number < 0x1f {
        out.push(lead | tag_number as u8);
        return;
    }
    out.push(lead | 0x1f);
    write_base128(out, tag_number as u64);
}

/// Length octets: short form below 0x80, otherwise the minimal long form.
pub fn write_length(out: &mut Vec<u8>, length: usize) -> Result<(), Asn1Error> {
    if length < 0x80 {
        out.push(length as u8);
        return Ok(());
    }
    let length = u32::try_from(length)
        .map_err(|_| Asn1Error::Encoding(format!("length {length} does not fit in 4 bytes")))?;
    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (4 - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
    Ok(())
}

/// Number of identifier octets at the start of an encoded value.
pub fn identifier_len(encoded: &[u8]) -> Result<usize, Asn1Error> {
    let first = *encoded
        .first()
        .ok_or_else(|| Asn1Error::Encoding("empty encoded value".to_string()))?;
    if first & 0x1f != 0x1f {
        return Ok(1);
    }
    encoded[1..]
        .iter()
        .position(|b| b & 0x80 == 0)
        .map(|idx| idx + 2)
        .ok_or_else(|| Asn1Error::Encoding("truncated high tag number".to_string()))
}

fn write_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut groups = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        groups.push(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    groups.reverse();
    out.extend_from_slice(&groups);
}

fn read_base128(contents: &[u8], pos: &mut usize) -> Result<u64, Asn1Error> {
    let mut value: u64 = 0;
    while let Some(&byte) = contents.get(*pos) {
        *pos += 1;
        if value > (u64::MAX >> 7) {
            return Err(Asn1Error::Decoding("base-128 number too large".to_string()));
        }
        value = (value << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Asn1Error::Decoding(
        "truncated base-128 number: missing terminating byte".to_string(),
    ))
}

/// Decode OBJECT IDENTIFIER contents to dotted-decimal.
pub fn decode_oid(contents: &[u8]) -> Result<String, Asn1Error> {
    if contents.is_empty() {
        return Err(Asn1Error::Decoding("empty OBJECT IDENTIFIER".to_string()));
    }
    let mut pos = 0;
    // the first component packs the first two arcs as X * 40 + Y with X <= 2
    let first = read_base128(contents, &mut pos)?;
    let first_arc = (first / 40).min(2);
    let mut dotted = format!("{}.{}", first_arc, first - first_arc * 40);
    while pos < contents.len() {
        let arc = read_base128(contents, &mut pos)?;
        dotted.push('.');
        dotted.push_str(&arc.to_string());
    }
    Ok(dotted)
}

/// Encode dotted-decimal to OBJECT IDENTIFIER contents.
pub fn encode_oid(dotted: &str) -> Result<Vec<u8>, Asn1Error> {
    let arcs = dotted
        .split('.')
        .map(|arc| arc.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Asn1Error::Encoding(format!("invalid OBJECT IDENTIFIER {dotted:?}")))?;
    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
        return Err(Asn1Error::Encoding(format!(
            "invalid OBJECT IDENTIFIER {dotted:?}"
        )));
    }
    let mut out = Vec::new();
    let first = arcs[0]
        .checked_mul(40)
        .and_then(|v| v.checked_add(arcs[1]))
        .ok_or_else(|| Asn1Error::Encoding(format!("OBJECT IDENTIFIER {dotted:?} overflows")))?;
    write_base128(&mut out, first);
    for arc in &arcs[2..] {
        write_base128(&mut out, *arc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_data_oid_round_trips() {
        let encoded = [0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
        let value = BerReader::new(&encoded).read_value().unwrap().unwrap();
        assert!(value.is_universal(TAG_OBJECT_IDENTIFIER));
        let dotted = decode_oid(value.contents).unwrap();
        assert_eq!(dotted, "1.2.840.113549.1.7.2");
        assert_eq!(encode_oid(&dotted).unwrap(), &encoded[2..]);
    }

    #[test]
    fn joint_iso_arcs() {
        // 2.999.3: first component 1079
        let contents = encode_oid("2.999.3").unwrap();
        assert_eq!(contents, vec![0x88, 0x37, 0x03]);
        assert_eq!(decode_oid(&contents).unwrap(), "2.999.3");
        assert!(encode_oid("1.40").is_err());
        assert!(encode_oid("1").is_err());
    }

    #[test]
    fn long_form_lengths() {
        let mut data = vec![0x04, 0x82, 0x01, 0x00];
        data.extend(std::iter::repeat(0xab).take(256));
        let value = BerReader::new(&data).read_value().unwrap().unwrap();
        assert_eq!(value.contents.len(), 256);
        assert_eq!(value.encoded.len(), 260);

        let mut out = Vec::new();
        write_length(&mut out, 256).unwrap();
        assert_eq!(out, vec![0x82, 0x01, 0x00]);
        out.clear();
        write_length(&mut out, 0x7f).unwrap();
        assert_eq!(out, vec![0x7f]);
    }

    #[test]
    fn high_tag_numbers() {
        let data = [0xbf, 0x81, 0x00, 0x01, 0xff];
        let value = BerReader::new(&data).read_value().unwrap().unwrap();
        assert_eq!(value.tag_class, CLASS_CONTEXT_SPECIFIC);
        assert!(value.constructed);
        assert_eq!(value.tag_number, 128);
        let mut out = Vec::new();
        write_identifier(&mut out, CLASS_CONTEXT_SPECIFIC, true, 128);
        assert_eq!(out, vec![0xbf, 0x81, 0x00]);
        assert_eq!(identifier_len(&data).unwrap(), 3);
    }

    #[test]
    fn indefinite_length_is_scanned() {
        // SEQUENCE (indefinite) { [0] (indefinite) { INTEGER 5 } , NULL }
        let data = [
            0x30, 0x80, 0xa0, 0x80, 0x02, 0x01, 0x05, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01,
        ];
        let mut reader = BerReader::new(&data);
        let value = reader.read_value().unwrap().unwrap();
        assert_eq!(value.encoded.len(), 13);
        assert_eq!(value.contents, &data[2..11]);
        let mut inner = value.contents_reader();
        let tagged = inner.read_value().unwrap().unwrap();
        assert_eq!(tagged.tag_number, 0);
        assert_eq!(tagged.contents, &[0x02, 0x01, 0x05]);
        assert!(inner.read_value().unwrap().unwrap().is_universal(TAG_NULL));
        assert_eq!(inner.read_value().unwrap(), None);
        // the trailing byte is a truncated value
        assert!(reader.read_value().is_err());
    }

    #[test]
    fn rejects_overruns() {
        assert!(BerReader::new(&[0x04, 0x05, 0x00]).read_value().is_err());
        assert!(BerReader::new(&[0x04, 0x80, 0x00, 0x00]).read_value().is_err());
        assert!(BerReader::new(&[0x30, 0x80, 0x02, 0x01, 0x05]).read_value().is_err());
        assert!(BerReader::new(&[0x04, 0x85, 1, 1, 1, 1, 1]).read_value().is_err());
    }
}
