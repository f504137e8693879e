//! APK Signature Scheme v2 and v3 blocks.
//!
//! The signing block is a run of `u64 length | u32 id | value` pairs. The v2 and v3 values are
//! a length-prefixed list of signers; only the certificate chain and SDK range of each signer are
//! decoded here.

use crate::error::{ParseError, ParseResult};
use log::debug;
use nom::bytes::complete::take;
use nom::multi::many0;
use nom::number::complete::{le_u32, le_u64};
use nom::sequence::pair;
use nom::IResult;
use serde::Serialize;

pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109_871a;
pub const SIGNATURE_SCHEME_V3_BLOCK_ID: u32 = 0xf053_68c0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SignatureScheme {
    V2,
    V3,
}

/// One signer of a v2 or v3 signature block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerBlock {
    pub scheme: SignatureScheme,
    /// DER certificates, signing certificate first.
    pub certificates: Vec<Vec<u8>>,
    pub min_sdk: Option<u32>,
    pub max_sdk: Option<u32>,
}

type Input<'a> = &'a [u8];

fn length_prefixed(input: Input) -> IResult<Input, Input> {
    let (input, len) = le_u32(input)?;
    take(len)(input)
}

fn id_value_pair(input: Input) -> IResult<Input, (u32, Input)> {
    let (input, len) = le_u64(input)?;
    let (input, body) = take(len)(input)?;
    let (value, id) = le_u32(body)?;
    Ok((input, (id, value)))
}

/// Split a length-prefixed list into its items.
fn sequence(input: Input) -> IResult<Input, Vec<Input>> {
    let (rest, list) = length_prefixed(input)?;
    let (_, items) = all_consuming_many(list, length_prefixed)?;
    Ok((rest, items))
}

fn all_consuming_many<'a, O>(
    input: Input<'a>,
    item: fn(Input<'a>) -> IResult<Input<'a>, O>,
) -> IResult<Input<'a>, Vec<O>> {
    let (rest, items) = many0(item)(input)?;
    if !rest.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Eof,
        )));
    }
    Ok((rest, items))
}

fn signer(scheme: SignatureScheme) -> impl Fn(Input) -> IResult<Input, SignerBlock> {
    move |input| {
        let (input, signed_data) = length_prefixed(input)?;
        // digests, then certificates
        let (signed_rest, _digests) = length_prefixed(signed_data)?;
        let (_, certificates) = sequence(signed_rest)?;
        let (min_sdk, max_sdk) = match scheme {
            SignatureScheme::V2 => (None, None),
            SignatureScheme::V3 => {
                let (_, (min, max)) = pair(le_u32, le_u32)(input)?;
                (Some(min), Some(max))
            }
        };
        Ok((
            input,
            SignerBlock {
                scheme,
                certificates: certificates.into_iter().map(<[u8]>::to_vec).collect(),
                min_sdk,
                max_sdk,
            },
        ))
    }
}

/// Decode the signers of every v2 and v3 block in the pair area of a signing block.
pub fn parse_signing_block(pairs: &[u8]) -> ParseResult<Vec<SignerBlock>> {
    let (_, entries) = all_consuming_many(pairs, id_value_pair).map_err(malformed_block)?;
    let mut signers = Vec::new();
    for (id, value) in entries {
        let scheme = match id {
            SIGNATURE_SCHEME_V2_BLOCK_ID => SignatureScheme::V2,
            SIGNATURE_SCHEME_V3_BLOCK_ID => SignatureScheme::V3,
            other => {
                debug!("skipping signing block entry 0x{other:08x}");
                continue;
            }
        };
        let (_, items) = sequence(value).map_err(malformed_block)?;
        for item in items {
            let (_, block) = signer(scheme)(item).map_err(malformed_block)?;
            signers.push(block);
        }
    }
    Ok(signers)
}

fn malformed_block(err: nom::Err<nom::error::Error<&[u8]>>) -> ParseError {
    let detail = match err {
        nom::Err::Incomplete(_) => "truncated".to_string(),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            format!("{:?} with {} bytes left", e.code, e.input.len())
        }
    };
    ParseError::MalformedContainer(format!("malformed APK signing block: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::signer_block_value;

    fn pairs(entries: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, value) in entries {
            out.extend_from_slice(&(value.len() as u64 + 4).to_le_bytes());
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(value);
        }
        out
    }

    #[test]
    fn v2_and_v3_signers() {
        let certs = vec![vec![0x30, 0x01, 0x00], vec![0x30, 0x00]];
        let area = pairs(&[
            (SIGNATURE_SCHEME_V2_BLOCK_ID, signer_block_value(&certs, None)),
            (0x4272_7265, vec![0; 12]),
            (SIGNATURE_SCHEME_V3_BLOCK_ID, signer_block_value(&certs[..1], Some((24, 34)))),
        ]);
        let signers = parse_signing_block(&area).unwrap();
        assert_eq!(signers.len(), 2);
        assert_eq!(signers[0].scheme, SignatureScheme::V2);
        assert_eq!(signers[0].certificates, certs);
        assert_eq!(signers[0].min_sdk, None);
        assert_eq!(signers[1].scheme, SignatureScheme::V3);
        assert_eq!(signers[1].certificates, certs[..1].to_vec());
        assert_eq!((signers[1].min_sdk, signers[1].max_sdk), (Some(24), Some(34)));
    }

    #[test]
    fn truncated_pairs_fail() {
        let mut area = pairs(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, signer_block_value(&[vec![1]], None))]);
        area.truncate(area.len() - 3);
        assert!(parse_signing_block(&area).is_err());
        assert!(parse_signing_block(&[]).unwrap().is_empty());
    }
}
