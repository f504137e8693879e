//! A small schema-driven ASN.1 engine.
//!
//! Types are described by static [`Asn1Schema`] tables. [`decode`] reads BER (definite and
//! indefinite lengths, high tag numbers) into an [`Asn1Struct`] tree and [`encode`] writes that
//! tree back as DER. [`pkcs7`] declares the schemas needed to read APK signature files.

pub mod ber;
pub mod decode;
pub mod encode;
pub mod pkcs7;
pub mod schema;
pub mod value;

use std::fmt;

pub use decode::{decode, decode_set_of_contents};
pub use encode::encode;
pub use schema::{Asn1Field, Asn1Schema, Asn1Type, SchemaKind, TagClass, Tagging};
pub use value::{Asn1Integer, Asn1Struct, Asn1Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asn1Error {
    /// Malformed or truncated input.
    Decoding(String),
    /// A data value carries a tag the schema does not allow at that position.
    UnexpectedTag(String),
    /// The schema itself is inconsistent.
    InvalidSchema(String),
    Unsupported(String),
    IntegerOverflow(String),
    Encoding(String),
}

impl fmt::Display for Asn1Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asn1Error::Decoding(msg) => write!(f, "ASN.1 decoding error: {msg}"),
            Asn1Error::UnexpectedTag(msg) => write!(f, "unexpected ASN.1 tag: {msg}"),
            Asn1Error::InvalidSchema(msg) => write!(f, "invalid ASN.1 schema: {msg}"),
            Asn1Error::Unsupported(msg) => write!(f, "unsupported ASN.1 construct: {msg}"),
            Asn1Error::IntegerOverflow(msg) => write!(f, "ASN.1 INTEGER overflow: {msg}"),
            Asn1Error::Encoding(msg) => write!(f, "ASN.1 encoding error: {msg}"),
        }
    }
}

impl std::error::Error for Asn1Error {}
