//! Decoded value tree.

use crate::asn1::schema::{Asn1Schema, SchemaKind};
use crate::asn1::Asn1Error;
use num_traits::{NumCast, PrimInt};

/// A two's complement big-endian INTEGER.
///
/// The raw bytes are the arbitrary-precision view; [`Asn1Integer::to`] gives fixed-width views.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Asn1Integer {
    bytes: Vec<u8>,
}

impl Asn1Integer {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Asn1Integer {
            bytes: bytes.to_vec(),
        }
    }

    /// Minimal encoding of `value`.
    pub fn from_i64(value: i64) -> Self {
        let bytes = value.to_be_bytes();
        let mut skip = 0;
        while skip < 7 {
            let redundant = (bytes[skip] == 0x00 && bytes[skip + 1] & 0x80 == 0)
                || (bytes[skip] == 0xff && bytes[skip + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            skip += 1;
        }
        Asn1Integer::from_bytes(&bytes[skip..])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_negative(&self) -> bool {
        self.bytes.first().is_some_and(|b| b & 0x80 != 0)
    }

    /// Lowercase hex of the raw bytes.
    pub fn to_hex(&self) -> String {
        const_hex::encode(&self.bytes)
    }

    /// The value as `T`, or `IntegerOverflow` when it does not fit.
    pub fn to<T: PrimInt>(&self) -> Result<T, Asn1Error> {
        let overflow = || {
            Asn1Error::IntegerOverflow(format!(
                "0x{} does not fit in {} bytes",
                self.to_hex(),
                std::mem::size_of::<T>()
            ))
        };
        let fill = if self.is_negative() { 0xff } else { 0x00 };
        // sign extension bytes carry no magnitude
        let significant = self
            .bytes
            .iter()
            .position(|b| *b != fill)
            .map_or(&self.bytes[self.bytes.len().saturating_sub(1)..], |idx| {
                &self.bytes[idx.saturating_sub(1)..]
            });
        if significant.len() > 16 {
            return Err(overflow());
        }
        let mut wide = if self.is_negative() { -1i128 } else { 0i128 };
        for byte in significant {
            wide = (wide << 8) | *byte as i128;
        }
        <T as NumCast>::from(wide).ok_or_else(overflow)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Asn1Value {
    /// A SEQUENCE, or a CHOICE with its single selected alternative.
    Struct(Asn1Struct),
    /// SET OF and SEQUENCE OF elements, in encountered order.
    List(Vec<Asn1Value>),
    Integer(Asn1Integer),
    ObjectIdentifier(String),
    OctetString(Vec<u8>),
    Boolean(bool),
    /// A complete encoded data value.
    Encoded(Vec<u8>),
}

impl Asn1Value {
    pub fn as_struct(&self) -> Option<&Asn1Struct> {
        match self {
            Asn1Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Asn1Value]> {
        match self {
            Asn1Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<&Asn1Integer> {
        match self {
            Asn1Value::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&str> {
        match self {
            Asn1Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn as_octets(&self) -> Option<&[u8]> {
        match self {
            Asn1Value::OctetString(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Asn1Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_encoded(&self) -> Option<&[u8]> {
        match self {
            Asn1Value::Encoded(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Named field values of a SEQUENCE or CHOICE, in decoding order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asn1Struct {
    schema: &'static Asn1Schema,
    fields: Vec<(&'static str, Asn1Value)>,
}

impl Asn1Struct {
    pub fn new(schema: &'static Asn1Schema) -> Self {
        Asn1Struct {
            schema,
            fields: Vec::new(),
        }
    }

    pub fn schema(&self) -> &'static Asn1Schema {
        self.schema
    }

    /// Set a field, replacing an earlier value. Names must exist in the schema.
    pub fn set(&mut self, name: &str, value: Asn1Value) -> Result<(), Asn1Error> {
        let field = self.schema.field(name).ok_or_else(|| {
            Asn1Error::Encoding(format!("{} has no field {name:?}", self.schema.name))
        })?;
        if self.schema.kind == SchemaKind::Choice {
            self.fields.clear();
        }
        self.fields.retain(|(existing, _)| *existing != field.name);
        self.fields.push((field.name, value));
        Ok(())
    }

    pub fn with(mut self, name: &str, value: Asn1Value) -> Result<Self, Asn1Error> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Asn1Value> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// The selected alternative of a CHOICE.
    pub fn selected(&self) -> Option<(&'static str, &Asn1Value)> {
        self.fields.first().map(|(name, value)| (*name, value))
    }

    fn require(&self, name: &str) -> Result<&Asn1Value, Asn1Error> {
        self.get(name).ok_or_else(|| {
            Asn1Error::Decoding(format!("{}.{name} is absent", self.schema.name))
        })
    }

    fn mismatch(&self, name: &str, expected: &str) -> Asn1Error {
        Asn1Error::Decoding(format!(
            "{}.{name} is not {expected}",
            self.schema.name
        ))
    }

    pub fn integer(&self, name: &str) -> Result<&Asn1Integer, Asn1Error> {
        self.require(name)?
            .as_integer()
            .ok_or_else(|| self.mismatch(name, "an INTEGER"))
    }

    pub fn oid(&self, name: &str) -> Result<&str, Asn1Error> {
        self.require(name)?
            .as_oid()
            .ok_or_else(|| self.mismatch(name, "an OBJECT IDENTIFIER"))
    }

    pub fn octets(&self, name: &str) -> Result<&[u8], Asn1Error> {
        self.require(name)?
            .as_octets()
            .ok_or_else(|| self.mismatch(name, "an OCTET STRING"))
    }

    pub fn encoded(&self, name: &str) -> Result<&[u8], Asn1Error> {
        self.require(name)?
            .as_encoded()
            .ok_or_else(|| self.mismatch(name, "an encoded value"))
    }

    pub fn structure(&self, name: &str) -> Result<&Asn1Struct, Asn1Error> {
        self.require(name)?
            .as_struct()
            .ok_or_else(|| self.mismatch(name, "a SEQUENCE or CHOICE"))
    }

    pub fn list(&self, name: &str) -> Result<&[Asn1Value], Asn1Error> {
        self.require(name)?
            .as_list()
            .ok_or_else(|| self.mismatch(name, "a SET OF or SEQUENCE OF"))
    }

    /// A collection field that may be absent, as an empty slice.
    pub fn list_or_empty(&self, name: &str) -> Result<&[Asn1Value], Asn1Error> {
        match self.get(name) {
            None => Ok(&[]),
            Some(_) => self.list(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_views() {
        let small = Asn1Integer::from_bytes(&[0x01, 0x00]);
        assert_eq!(small.to::<u16>().unwrap(), 256);
        assert_eq!(small.to::<i32>().unwrap(), 256);
        assert!(matches!(small.to::<u8>(), Err(Asn1Error::IntegerOverflow(_))));

        let negative = Asn1Integer::from_bytes(&[0xff, 0x7f]);
        assert_eq!(negative.to::<i16>().unwrap(), -129);
        assert!(matches!(negative.to::<u64>(), Err(Asn1Error::IntegerOverflow(_))));

        // leading zero keeps 0x80 positive
        let padded = Asn1Integer::from_bytes(&[0x00, 0x80]);
        assert_eq!(padded.to::<u8>().unwrap(), 0x80);
        assert!(matches!(padded.to::<i8>(), Err(Asn1Error::IntegerOverflow(_))));

        let serial = Asn1Integer::from_bytes(&[0x01; 20]);
        assert!(matches!(serial.to::<i64>(), Err(Asn1Error::IntegerOverflow(_))));
        assert_eq!(serial.as_bytes().len(), 20);
    }

    #[test]
    fn minimal_encodings() {
        assert_eq!(Asn1Integer::from_i64(0).as_bytes(), &[0x00]);
        assert_eq!(Asn1Integer::from_i64(127).as_bytes(), &[0x7f]);
        assert_eq!(Asn1Integer::from_i64(128).as_bytes(), &[0x00, 0x80]);
        assert_eq!(Asn1Integer::from_i64(-128).as_bytes(), &[0x80]);
        assert_eq!(Asn1Integer::from_i64(-129).as_bytes(), &[0xff, 0x7f]);
        assert_eq!(Asn1Integer::from_i64(-1).to::<i64>().unwrap(), -1);
    }
}
