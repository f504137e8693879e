//! APK signer discovery: v1 signature files and the v2/v3 APK Signing Block.

pub mod block;
pub mod cert;
pub mod eocd;

use serde::Serialize;

pub use block::{parse_signing_block, SignatureScheme, SignerBlock};
pub use cert::{parse_certificates, parse_pkcs7, CertificateBackend, CertificateMeta};
pub use eocd::{find_eocd, find_signing_block, Eocd};

/// A v1 signer: one `META-INF/*.RSA` or `*.DSA` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApkSigner {
    pub path: String,
    pub certificates: Vec<CertificateMeta>,
}

/// A signer from a v2 or v3 signature scheme block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApkV2Signer {
    pub scheme: SignatureScheme,
    pub min_sdk: Option<u32>,
    pub max_sdk: Option<u32>,
    pub certificates: Vec<CertificateMeta>,
}
