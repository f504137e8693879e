//! PKCS#7 SignedData and X.509 certificate schemas, with typed views over the decoded trees.

use crate::asn1::ber::{BerReader, TAG_GENERALIZED_TIME, TAG_OCTET_STRING, TAG_UTC_TIME};
use crate::asn1::schema::{Asn1Field, Asn1Schema, Asn1Type};
use crate::asn1::value::{Asn1Integer, Asn1Struct};
use crate::asn1::{decode, Asn1Error};

pub const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
pub const OID_SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";

pub static ALGORITHM_IDENTIFIER: Asn1Schema = Asn1Schema::sequence(
    "AlgorithmIdentifier",
    &[
        Asn1Field::new("algorithm", 0, Asn1Type::ObjectIdentifier),
        Asn1Field::new("parameters", 1, Asn1Type::Any).optional(),
    ],
);

pub static CONTENT_INFO: Asn1Schema = Asn1Schema::sequence(
    "ContentInfo",
    &[
        Asn1Field::new("contentType", 0, Asn1Type::ObjectIdentifier),
        Asn1Field::new("content", 1, Asn1Type::Any).explicit(0).optional(),
    ],
);

pub static ENCAPSULATED_CONTENT_INFO: Asn1Schema = Asn1Schema::sequence(
    "EncapsulatedContentInfo",
    &[
        Asn1Field::new("eContentType", 0, Asn1Type::ObjectIdentifier),
        Asn1Field::new("eContent", 1, Asn1Type::Any).explicit(0).optional(),
    ],
);

pub static SIGNED_DATA: Asn1Schema = Asn1Schema::sequence(
    "SignedData",
    &[
        Asn1Field::new("version", 0, Asn1Type::Integer),
        Asn1Field::new("digestAlgorithms", 1, Asn1Type::SetOf).of(&ALGORITHM_IDENTIFIER),
        Asn1Field::new("encapContentInfo", 2, Asn1Type::Sequence).of(&ENCAPSULATED_CONTENT_INFO),
        Asn1Field::new("certificates", 3, Asn1Type::SetOf).implicit(0).optional(),
        Asn1Field::new("crls", 4, Asn1Type::SetOf).implicit(1).optional(),
        Asn1Field::new("signerInfos", 5, Asn1Type::SetOf).of(&SIGNER_INFO),
    ],
);

pub static ISSUER_AND_SERIAL_NUMBER: Asn1Schema = Asn1Schema::sequence(
    "IssuerAndSerialNumber",
    &[
        Asn1Field::new("issuer", 0, Asn1Type::Any),
        Asn1Field::new("serialNumber", 1, Asn1Type::Integer),
    ],
);

pub static SIGNER_IDENTIFIER: Asn1Schema = Asn1Schema::choice(
    "SignerIdentifier",
    &[
        Asn1Field::new("issuerAndSerialNumber", 0, Asn1Type::Sequence)
            .of(&ISSUER_AND_SERIAL_NUMBER),
        Asn1Field::new("subjectKeyIdentifier", 1, Asn1Type::OctetString).implicit(0),
    ],
);

pub static SIGNER_INFO: Asn1Schema = Asn1Schema::sequence(
    "SignerInfo",
    &[
        Asn1Field::new("version", 0, Asn1Type::Integer),
        Asn1Field::new("sid", 1, Asn1Type::Choice).of(&SIGNER_IDENTIFIER),
        Asn1Field::new("digestAlgorithm", 2, Asn1Type::Sequence).of(&ALGORITHM_IDENTIFIER),
        Asn1Field::new("signedAttrs", 3, Asn1Type::SetOf).implicit(0).optional(),
        Asn1Field::new("signatureAlgorithm", 4, Asn1Type::Sequence).of(&ALGORITHM_IDENTIFIER),
        Asn1Field::new("signature", 5, Asn1Type::OctetString),
        Asn1Field::new("unsignedAttrs", 6, Asn1Type::SetOf).implicit(1).optional(),
    ],
);

pub static VALIDITY: Asn1Schema = Asn1Schema::sequence(
    "Validity",
    &[
        Asn1Field::new("notBefore", 0, Asn1Type::Any),
        Asn1Field::new("notAfter", 1, Asn1Type::Any),
    ],
);

pub static EXTENSION: Asn1Schema = Asn1Schema::sequence(
    "Extension",
    &[
        Asn1Field::new("extnID", 0, Asn1Type::ObjectIdentifier),
        Asn1Field::new("critical", 1, Asn1Type::Boolean).optional(),
        Asn1Field::new("extnValue", 2, Asn1Type::OctetString),
    ],
);

pub static TBS_CERTIFICATE: Asn1Schema = Asn1Schema::sequence(
    "TBSCertificate",
    &[
        Asn1Field::new("version", 0, Asn1Type::Integer).explicit(0).optional(),
        Asn1Field::new("serialNumber", 1, Asn1Type::Integer),
        Asn1Field::new("signature", 2, Asn1Type::Sequence).of(&ALGORITHM_IDENTIFIER),
        Asn1Field::new("issuer", 3, Asn1Type::Any),
        Asn1Field::new("validity", 4, Asn1Type::Sequence).of(&VALIDITY),
        Asn1Field::new("subject", 5, Asn1Type::Any),
        Asn1Field::new("subjectPublicKeyInfo", 6, Asn1Type::Any),
        Asn1Field::new("issuerUniqueID", 7, Asn1Type::Any).implicit(1).optional(),
        Asn1Field::new("subjectUniqueID", 8, Asn1Type::Any).implicit(2).optional(),
        Asn1Field::new("extensions", 9, Asn1Type::SequenceOf)
            .explicit(3)
            .optional()
            .of(&EXTENSION),
    ],
);

pub static CERTIFICATE: Asn1Schema = Asn1Schema::sequence(
    "Certificate",
    &[
        Asn1Field::new("tbsCertificate", 0, Asn1Type::Sequence).of(&TBS_CERTIFICATE),
        Asn1Field::new("signatureAlgorithm", 1, Asn1Type::Sequence).of(&ALGORITHM_IDENTIFIER),
        Asn1Field::new("signatureValue", 2, Asn1Type::Any),
    ],
);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignerIdentifier {
    IssuerAndSerialNumber {
        /// Encoded issuer `Name`.
        issuer: Vec<u8>,
        serial: Asn1Integer,
    },
    SubjectKeyIdentifier(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerInfo {
    pub sid: SignerIdentifier,
    pub digest_algorithm: String,
    pub signature_algorithm: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedData {
    /// Encoded certificates in the order they appear in the set.
    pub certificates: Vec<Vec<u8>>,
    pub signer_infos: Vec<SignerInfo>,
}

impl SignedData {
    /// Parse a `ContentInfo` wrapping `SignedData`.
    pub fn from_ber(data: &[u8]) -> Result<SignedData, Asn1Error> {
        let content_info = decode(data, &CONTENT_INFO)?;
        let content_type = content_info.oid("contentType")?;
        if content_type != OID_SIGNED_DATA {
            return Err(Asn1Error::Unsupported(format!(
                "content type {content_type} is not SignedData"
            )));
        }
        let signed_data = decode(content_info.encoded("content")?, &SIGNED_DATA)?;

        let certificates = signed_data
            .list_or_empty("certificates")?
            .iter()
            .filter_map(|item| item.as_encoded().map(<[u8]>::to_vec))
            .collect();
        let signer_infos = signed_data
            .list("signerInfos")?
            .iter()
            .filter_map(|item| item.as_struct())
            .map(SignerInfo::from_struct)
            .collect::<Result<_, _>>()?;
        Ok(SignedData {
            certificates,
            signer_infos,
        })
    }
}

impl SignerInfo {
    fn from_struct(info: &Asn1Struct) -> Result<SignerInfo, Asn1Error> {
        let sid = info.structure("sid")?;
        let sid = match sid.selected() {
            Some(("issuerAndSerialNumber", _)) => {
                let inner = sid.structure("issuerAndSerialNumber")?;
                SignerIdentifier::IssuerAndSerialNumber {
                    issuer: inner.encoded("issuer")?.to_vec(),
                    serial: inner.integer("serialNumber")?.clone(),
                }
            }
            _ => SignerIdentifier::SubjectKeyIdentifier(
                sid.octets("subjectKeyIdentifier")?.to_vec(),
            ),
        };
        Ok(SignerInfo {
            sid,
            digest_algorithm: info.structure("digestAlgorithm")?.oid("algorithm")?.to_string(),
            signature_algorithm: info
                .structure("signatureAlgorithm")?
                .oid("algorithm")?
                .to_string(),
        })
    }
}

/// The certificate fields metadata extraction needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct X509Certificate {
    pub serial: Asn1Integer,
    pub issuer: Vec<u8>,
    pub subject: Vec<u8>,
    pub signature_algorithm: String,
    /// `YYYY-MM-DDTHH:MM:SSZ`
    pub not_before: String,
    pub not_after: String,
    pub subject_key_identifier: Option<Vec<u8>>,
}

impl X509Certificate {
    pub fn from_der(data: &[u8]) -> Result<X509Certificate, Asn1Error> {
        let cert = decode(data, &CERTIFICATE)?;
        let tbs = cert.structure("tbsCertificate")?;
        let validity = tbs.structure("validity")?;

        let mut subject_key_identifier = None;
        for ext in tbs.list_or_empty("extensions")? {
            let Some(ext) = ext.as_struct() else { continue };
            if ext.oid("extnID")? == OID_SUBJECT_KEY_IDENTIFIER {
                // extnValue wraps a DER OCTET STRING
                let inner = BerReader::new(ext.octets("extnValue")?)
                    .read_value()?
                    .filter(|value| value.is_universal(TAG_OCTET_STRING))
                    .ok_or_else(|| {
                        Asn1Error::Decoding("malformed subject key identifier".to_string())
                    })?;
                subject_key_identifier = Some(inner.contents.to_vec());
            }
        }

        Ok(X509Certificate {
            serial: tbs.integer("serialNumber")?.clone(),
            issuer: tbs.encoded("issuer")?.to_vec(),
            subject: tbs.encoded("subject")?.to_vec(),
            signature_algorithm: cert
                .structure("signatureAlgorithm")?
                .oid("algorithm")?
                .to_string(),
            not_before: render_time(validity.encoded("notBefore")?)?,
            not_after: render_time(validity.encoded("notAfter")?)?,
            subject_key_identifier,
        })
    }

    pub fn is_signed_by(&self, sid: &SignerIdentifier) -> bool {
        match sid {
            SignerIdentifier::IssuerAndSerialNumber { issuer, serial } => {
                self.issuer == *issuer && self.serial == *serial
            }
            SignerIdentifier::SubjectKeyIdentifier(key_id) => {
                self.subject_key_identifier.as_ref() == Some(key_id)
            }
        }
    }
}

/// Render a UTCTime or GeneralizedTime value as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn render_time(encoded: &[u8]) -> Result<String, Asn1Error> {
    let value = BerReader::new(encoded)
        .read_value()?
        .ok_or_else(|| Asn1Error::Decoding("missing time value".to_string()))?;
    let text = std::str::from_utf8(value.contents)
        .map_err(|_| Asn1Error::Decoding("time is not ASCII".to_string()))?;
    let digits = text.strip_suffix('Z').unwrap_or(text);
    let (year, rest) = if value.is_universal(TAG_UTC_TIME) {
        let yy: u32 = parse_digits(digits.get(..2))?;
        // RFC 5280: two-digit years from 50 belong to the twentieth century
        let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
        (year, &digits[2..])
    } else if value.is_universal(TAG_GENERALIZED_TIME) {
        (parse_digits(digits.get(..4))?, digits.get(4..).unwrap_or(""))
    } else {
        return Err(Asn1Error::UnexpectedTag(format!(
            "time value has tag number {}",
            value.tag_number
        )));
    };
    let field = |idx: usize| -> Result<u32, Asn1Error> { parse_digits(rest.get(idx..idx + 2)) };
    let seconds = if rest.len() >= 10 { field(8)? } else { 0 };
    Ok(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        field(0)?,
        field(2)?,
        field(4)?,
        field(6)?,
        seconds
    ))
}

fn parse_digits(text: Option<&str>) -> Result<u32, Asn1Error> {
    text.filter(|t| t.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| Asn1Error::Decoding(format!("invalid time digits {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{
        signed_data, test_certificate, SignerRef, OID_SHA1_WITH_RSA, TEST_NOT_AFTER,
        TEST_NOT_BEFORE,
    };

    #[test]
    fn schemas_are_valid() {
        for schema in [&CONTENT_INFO, &SIGNED_DATA, &CERTIFICATE] {
            schema.validate().unwrap();
        }
    }

    #[test]
    fn reads_certificate_fields() {
        let cert = test_certificate("Example", 0x34);
        let parsed = X509Certificate::from_der(&cert.der).unwrap();
        assert_eq!(parsed.signature_algorithm, OID_SHA1_WITH_RSA);
        assert_eq!(parsed.not_before, TEST_NOT_BEFORE);
        assert_eq!(parsed.not_after, TEST_NOT_AFTER);
        assert_eq!(parsed.serial.as_bytes(), &cert.serial[..]);
        assert_eq!(parsed.issuer, cert.issuer);
        assert_eq!(parsed.subject, cert.issuer);
        assert_eq!(parsed.subject_key_identifier.as_deref(), Some(&cert.key_id[..]));
    }

    #[test]
    fn matches_signers_by_either_identifier() {
        let first = test_certificate("First", 1);
        let second = test_certificate("Second", 2);
        let blob = signed_data(
            &[&first, &second],
            &[(&second, SignerRef::IssuerAndSerial), (&first, SignerRef::KeyId)],
        );
        let signed = SignedData::from_ber(&blob).unwrap();
        assert_eq!(signed.certificates.len(), 2);
        assert!(signed.certificates.contains(&first.der));
        assert!(signed.certificates.contains(&second.der));
        assert_eq!(signed.signer_infos.len(), 2);

        let first_cert = X509Certificate::from_der(&first.der).unwrap();
        let second_cert = X509Certificate::from_der(&second.der).unwrap();
        for info in &signed.signer_infos {
            assert_eq!(info.digest_algorithm, "2.16.840.1.101.3.4.2.1");
            match &info.sid {
                SignerIdentifier::SubjectKeyIdentifier(key_id) => {
                    assert_eq!(key_id, &first.key_id);
                    assert!(first_cert.is_signed_by(&info.sid));
                    assert!(!second_cert.is_signed_by(&info.sid));
                }
                SignerIdentifier::IssuerAndSerialNumber { .. } => {
                    assert!(second_cert.is_signed_by(&info.sid));
                    assert!(!first_cert.is_signed_by(&info.sid));
                }
            }
        }
    }

    #[test]
    fn time_forms() {
        let utc = [&[0x17, 0x0d][..], b"991231235959Z"].concat();
        assert_eq!(render_time(&utc).unwrap(), "1999-12-31T23:59:59Z");
        let generalized = [&[0x18, 0x0f][..], b"20500101000000Z"].concat();
        assert_eq!(render_time(&generalized).unwrap(), "2050-01-01T00:00:00Z");
        assert!(render_time(&[0x04, 0x01, b'1']).is_err());
    }

    #[test]
    fn rejects_other_content_types() {
        // ContentInfo { data }
        let blob = [0x30, 0x0b, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];
        assert!(matches!(SignedData::from_ber(&blob), Err(Asn1Error::Unsupported(_))));
    }
}
