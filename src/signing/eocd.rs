//! End-of-central-directory lookup and APK Signing Block framing.

use crate::error::{ParseError, ParseResult};
use log::{debug, warn};
use nom::bytes::complete::tag;
use nom::number::complete::{le_u16, le_u32, le_u64};
use nom::sequence::tuple;
use nom::IResult;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const EOCD_SIZE: usize = 22;
/// The record may be followed by a comment; scanning stops this far from the end.
const EOCD_SCAN_WINDOW: usize = 100 * 1024;

pub const APK_SIG_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";
const APK_SIG_BLOCK_MIN_SIZE: u64 = 32;

/// The fixed fields of the end-of-central-directory record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Eocd {
    /// Offset of the signature within the file.
    pub offset: usize,
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub cd_records_on_disk: u16,
    pub cd_records_total: u16,
    pub cd_size: u32,
    pub cd_start: u32,
    pub comment_len: u16,
}

fn eocd_fields(input: &[u8]) -> IResult<&[u8], (u16, u16, u16, u16, u32, u32, u16)> {
    let (input, _) = tag(EOCD_SIGNATURE.to_le_bytes().as_slice())(input)?;
    tuple((le_u16, le_u16, le_u16, le_u16, le_u32, le_u32, le_u16))(input)
}

/// Scan backwards over the tail of the file for the EOCD record.
///
/// Every match in the window is decoded and the one at the lowest offset is kept.
pub fn find_eocd(data: &[u8]) -> ParseResult<Eocd> {
    if data.len() < EOCD_SIZE {
        return Err(ParseError::MalformedContainer(format!(
            "{} bytes is too short for a ZIP archive",
            data.len()
        )));
    }
    let last = data.len() - EOCD_SIZE;
    let first = data.len().saturating_sub(EOCD_SCAN_WINDOW);
    let mut found = None;
    for offset in (first..=last).rev() {
        let Ok((_, fields)) = eocd_fields(&data[offset..]) else {
            continue;
        };
        let (disk, cd_disk, on_disk, total, cd_size, cd_start, comment_len) = fields;
        found = Some(Eocd {
            offset,
            disk_number: disk,
            cd_start_disk: cd_disk,
            cd_records_on_disk: on_disk,
            cd_records_total: total,
            cd_size,
            cd_start,
            comment_len,
        });
    }
    found.ok_or_else(|| {
        ParseError::MalformedContainer("end of central directory record not found".to_string())
    })
}

/// The (id, value) pair area of the APK Signing Block, or `None` when the archive has no block
/// or its two size fields disagree.
pub fn find_signing_block(data: &[u8]) -> ParseResult<Option<&[u8]>> {
    let eocd = find_eocd(data)?;
    let cd_start = eocd.cd_start as usize;
    if cd_start > eocd.offset {
        return Err(ParseError::MalformedContainer(format!(
            "central directory offset {} is past the EOCD record at {}",
            cd_start, eocd.offset
        )));
    }
    if cd_start < APK_SIG_BLOCK_MAGIC.len() + 8
        || &data[cd_start - APK_SIG_BLOCK_MAGIC.len()..cd_start] != APK_SIG_BLOCK_MAGIC
    {
        debug!("no APK signing block before central directory at {}", cd_start);
        return Ok(None);
    }

    let footer = cd_start - APK_SIG_BLOCK_MAGIC.len() - 8;
    let size = read_u64(&data[footer..])?;
    // the header size field sits `size` bytes before the central directory
    let header = match (size as usize)
        .checked_add(8)
        .and_then(|span| cd_start.checked_sub(span))
    {
        Some(header) if size >= APK_SIG_BLOCK_MIN_SIZE && size <= cd_start as u64 => header,
        _ => {
            warn!("APK signing block size {} does not fit in the archive", size);
            return Ok(None);
        }
    };
    let header_size = read_u64(&data[header..])?;
    if header_size != size {
        warn!(
            "APK signing block size fields disagree: header {} footer {}",
            header_size, size
        );
        return Ok(None);
    }
    Ok(Some(&data[header + 8..footer]))
}

fn read_u64(input: &[u8]) -> ParseResult<u64> {
    le_u64::<_, nom::error::Error<&[u8]>>(input)
        .map(|(_, value)| value)
        .map_err(|_| ParseError::MalformedContainer("truncated signing block size".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tests::fixtures::{signing_block, with_signing_block, zip_archive};

    #[test]
    fn finds_eocd_of_plain_zip() {
        let zip = zip_archive(&[("a.txt", b"hello")]);
        let eocd = find_eocd(&zip).unwrap();
        assert_eq!(eocd.offset, zip.len() - 22);
        assert_eq!(eocd.cd_records_total, 1);
        assert_eq!(eocd.comment_len, 0);
        assert_eq!((eocd.cd_start + eocd.cd_size) as usize, eocd.offset);
    }

    #[test]
    fn too_short_or_missing() {
        let err = find_eocd(&[0u8; 21]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
        let err = find_eocd(&[0u8; 64]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    }

    #[test]
    fn scan_is_bounded() {
        // a record further than the window from the end is not found
        let mut data = vec![0u8; EOCD_SCAN_WINDOW + 64];
        data[..4].copy_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        assert!(find_eocd(&data).is_err());
        let at = data.len() - EOCD_SCAN_WINDOW;
        data[at..at + 4].copy_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        assert_eq!(find_eocd(&data).unwrap().offset, at);
    }

    #[test]
    fn lowest_match_wins() {
        let mut data = vec![0u8; 80];
        data[10..14].copy_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        data[50..54].copy_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        assert_eq!(find_eocd(&data).unwrap().offset, 10);
    }

    #[test]
    fn locates_signing_block_pairs() {
        let zip = zip_archive(&[("a.txt", b"hello")]);
        let block = signing_block(&[(0x1234_5678, vec![1, 2, 3])]);
        let apk = with_signing_block(&zip, &block);
        let pairs = find_signing_block(&apk).unwrap().expect("signing block");
        assert_eq!(pairs, &block[8..block.len() - 24]);
        assert_eq!(find_signing_block(&zip).unwrap(), None);
    }

    #[test]
    fn mismatched_sizes_mean_absent() {
        let zip = zip_archive(&[("a.txt", b"hello")]);
        let mut block = signing_block(&[(0x1234_5678, vec![1, 2, 3])]);
        block[0] ^= 0x01;
        let apk = with_signing_block(&zip, &block);
        assert_eq!(find_signing_block(&apk).unwrap(), None);
    }
}
