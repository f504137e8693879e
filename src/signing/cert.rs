//! Certificate metadata, from PKCS#7 signature files or bare DER certificates.
//!
//! Two interchangeable backends decode the structures: the crate's own schema-driven ASN.1
//! engine and the RustCrypto `cms`/`x509-cert` types. Both yield the same [`CertificateMeta`].

use crate::asn1::pkcs7::{SignedData, X509Certificate};
use crate::error::ParseResult;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData as CmsSignedData, SignerIdentifier as CmsSignerIdentifier};
use der::asn1::OctetString;
use der::{Decode, Encode};
use log::warn;
use serde::Serialize;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use x509_cert::Certificate;

const OID_SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";

/// Which decoder reads certificates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CertificateBackend {
    #[default]
    Asn1,
    X509,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CertificateMeta {
    /// Upper-cased algorithm name such as `SHA256WITHRSA`, or the OID when it is not known.
    pub sign_algorithm: String,
    pub sign_algorithm_oid: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    /// MD5 of the upper-case hex rendering of the certificate.
    pub cert_base64_md5: String,
    pub cert_md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl CertificateMeta {
    fn new(data: Vec<u8>, sign_algorithm_oid: String, start_date: String, end_date: String) -> Self {
        let upper_hex = const_hex::encode_upper(&data);
        CertificateMeta {
            sign_algorithm: signature_algorithm_name(&sign_algorithm_oid)
                .map(str::to_uppercase)
                .unwrap_or_else(|| sign_algorithm_oid.clone()),
            sign_algorithm_oid,
            start_date,
            end_date,
            cert_base64_md5: format!("{:x}", md5::compute(upper_hex.as_bytes())),
            cert_md5: format!("{:x}", md5::compute(&data)),
            sha1: const_hex::encode(Sha1::digest(&data)),
            sha256: const_hex::encode(Sha256::digest(&data)),
            data,
        }
    }
}

/// Signature algorithm names by OID.
pub fn signature_algorithm_name(oid: &str) -> Option<&'static str> {
    Some(match oid {
        "1.2.840.113549.1.1.4" => "MD5withRSA",
        "1.2.840.113549.1.1.5" => "SHA1withRSA",
        "1.2.840.113549.1.1.10" => "RSASSA-PSS",
        "1.2.840.113549.1.1.11" => "SHA256withRSA",
        "1.2.840.113549.1.1.12" => "SHA384withRSA",
        "1.2.840.113549.1.1.13" => "SHA512withRSA",
        "1.2.840.113549.1.1.14" => "SHA224withRSA",
        "1.2.840.10040.4.3" => "SHA1withDSA",
        "2.16.840.1.101.3.4.3.1" => "SHA224withDSA",
        "2.16.840.1.101.3.4.3.2" => "SHA256withDSA",
        "1.2.840.10045.4.1" => "SHA1withECDSA",
        "1.2.840.10045.4.3.1" => "SHA224withECDSA",
        "1.2.840.10045.4.3.2" => "SHA256withECDSA",
        "1.2.840.10045.4.3.3" => "SHA384withECDSA",
        "1.2.840.10045.4.3.4" => "SHA512withECDSA",
        "1.3.101.112" => "Ed25519",
        _ => return None,
    })
}

/// Certificates of the signers of a PKCS#7 signature file, in signer order.
pub fn parse_pkcs7(data: &[u8], backend: CertificateBackend) -> ParseResult<Vec<CertificateMeta>> {
    match backend {
        CertificateBackend::Asn1 => pkcs7_with_asn1(data),
        CertificateBackend::X509 => pkcs7_with_x509(data),
    }
}

/// Metadata for bare DER certificates, as stored in v2 and v3 signer blocks.
pub fn parse_certificates(
    certificates: &[Vec<u8>],
    backend: CertificateBackend,
) -> ParseResult<Vec<CertificateMeta>> {
    certificates
        .iter()
        .map(|der| match backend {
            CertificateBackend::Asn1 => meta_from_asn1(der.clone()),
            CertificateBackend::X509 => meta_from_x509(&Certificate::from_der(der)?),
        })
        .collect()
}

fn meta_from_asn1(der: Vec<u8>) -> ParseResult<CertificateMeta> {
    let cert = X509Certificate::from_der(&der)?;
    Ok(CertificateMeta::new(
        der,
        cert.signature_algorithm,
        cert.not_before,
        cert.not_after,
    ))
}

fn pkcs7_with_asn1(data: &[u8]) -> ParseResult<Vec<CertificateMeta>> {
    let signed = SignedData::from_ber(data)?;
    let certificates = signed
        .certificates
        .iter()
        .map(|der| Ok((der, X509Certificate::from_der(der)?)))
        .collect::<ParseResult<Vec<_>>>()?;
    let mut metas = Vec::new();
    for info in &signed.signer_infos {
        let before = metas.len();
        for (der, cert) in certificates.iter().filter(|(_, cert)| cert.is_signed_by(&info.sid)) {
            metas.push(CertificateMeta::new(
                der.to_vec(),
                cert.signature_algorithm.clone(),
                cert.not_before.clone(),
                cert.not_after.clone(),
            ));
        }
        if metas.len() == before {
            warn!("no certificate matches signer {:?}", info.sid);
        }
    }
    Ok(metas)
}

fn meta_from_x509(cert: &Certificate) -> ParseResult<CertificateMeta> {
    let validity = &cert.tbs_certificate.validity;
    Ok(CertificateMeta::new(
        cert.to_der()?,
        cert.signature_algorithm.oid.to_string(),
        render_date_time(validity.not_before.to_date_time()),
        render_date_time(validity.not_after.to_date_time()),
    ))
}

fn render_date_time(time: der::DateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minutes(),
        time.seconds()
    )
}

fn subject_key_identifier(cert: &Certificate) -> Option<Vec<u8>> {
    let extension = cert
        .tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id.to_string() == OID_SUBJECT_KEY_IDENTIFIER)?;
    OctetString::from_der(extension.extn_value.as_bytes())
        .ok()
        .map(|key| key.as_bytes().to_vec())
}

fn x509_signed_by(cert: &Certificate, sid: &CmsSignerIdentifier) -> bool {
    match sid {
        CmsSignerIdentifier::IssuerAndSerialNumber(isn) => {
            cert.tbs_certificate.issuer == isn.issuer
                && cert.tbs_certificate.serial_number == isn.serial_number
        }
        CmsSignerIdentifier::SubjectKeyIdentifier(ski) => {
            subject_key_identifier(cert).as_deref() == Some(ski.0.as_bytes())
        }
    }
}

fn pkcs7_with_x509(data: &[u8]) -> ParseResult<Vec<CertificateMeta>> {
    let content_info = ContentInfo::from_der(data)?;
    let signed = content_info.content.decode_as::<CmsSignedData>()?;
    let certificates: Vec<&Certificate> = signed
        .certificates
        .as_ref()
        .map(|set| {
            set.0
                .iter()
                .filter_map(|choice| match choice {
                    CertificateChoices::Certificate(cert) => Some(cert),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let mut metas = Vec::new();
    for info in signed.signer_infos.0.iter() {
        let before = metas.len();
        for cert in certificates.iter().filter(|cert| x509_signed_by(cert, &info.sid)) {
            metas.push(meta_from_x509(cert)?);
        }
        if metas.len() == before {
            warn!("no certificate matches signer {:?}", info.sid);
        }
    }
    Ok(metas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tests::fixtures::{
        signed_data, test_certificate, SignerRef, OID_SHA1_WITH_RSA, TEST_NOT_AFTER,
        TEST_NOT_BEFORE,
    };

    #[test]
    fn rsa_signature_file() {
        let cert = test_certificate("Release", 7);
        let blob = signed_data(&[&cert], &[(&cert, SignerRef::IssuerAndSerial)]);
        let metas = parse_pkcs7(&blob, CertificateBackend::Asn1).unwrap();
        assert_eq!(metas.len(), 1);
        let meta = &metas[0];
        assert_eq!(meta.sign_algorithm, "SHA1WITHRSA");
        assert_eq!(meta.sign_algorithm_oid, OID_SHA1_WITH_RSA);
        assert_eq!(meta.start_date, TEST_NOT_BEFORE);
        assert_eq!(meta.end_date, TEST_NOT_AFTER);
        assert_eq!(meta.data, cert.der);
        assert_eq!(meta.cert_md5, format!("{:x}", md5::compute(&cert.der)));
        assert_eq!(meta.sha256.len(), 64);
        assert_eq!(meta.sha1.len(), 40);
    }

    #[test]
    fn backends_agree() {
        let first = test_certificate("First", 3);
        let second = test_certificate("Second", 4);
        let unused = test_certificate("Unused", 5);
        let blob = signed_data(
            &[&first, &second, &unused],
            &[(&first, SignerRef::IssuerAndSerial), (&second, SignerRef::KeyId)],
        );
        let asn1 = parse_pkcs7(&blob, CertificateBackend::Asn1).unwrap();
        let x509 = parse_pkcs7(&blob, CertificateBackend::X509).unwrap();
        assert_eq!(asn1.len(), 2);
        assert_eq!(asn1, x509);
        assert!(asn1.iter().all(|meta| meta.data != unused.der));

        let bare = vec![first.der.clone(), unused.der.clone()];
        assert_eq!(
            parse_certificates(&bare, CertificateBackend::Asn1).unwrap(),
            parse_certificates(&bare, CertificateBackend::X509).unwrap()
        );
    }

    #[test]
    fn signer_without_its_certificate_yields_nothing() {
        let shipped = test_certificate("Shipped", 8);
        let missing = test_certificate("Missing", 9);
        let blob = signed_data(&[&shipped], &[(&missing, SignerRef::IssuerAndSerial)]);
        for backend in [CertificateBackend::Asn1, CertificateBackend::X509] {
            assert!(parse_pkcs7(&blob, backend).unwrap().is_empty());
        }
    }

    #[test]
    fn garbage_is_a_decoding_failure() {
        for backend in [CertificateBackend::Asn1, CertificateBackend::X509] {
            let err = parse_pkcs7(&[0x30, 0x03, 0x02, 0x01], backend).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Asn1DecodingFailure);
        }
    }

    #[test]
    fn unknown_algorithms_keep_their_oid() {
        assert_eq!(signature_algorithm_name("1.2.840.113549.1.1.11"), Some("SHA256withRSA"));
        assert_eq!(signature_algorithm_name("1.2.3.4"), None);
    }
}
