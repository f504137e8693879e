//! DER encoding of value trees.

use crate::asn1::ber::{
    encode_oid, identifier_len, write_identifier, write_length, CLASS_UNIVERSAL, TAG_BOOLEAN,
    TAG_INTEGER, TAG_OBJECT_IDENTIFIER, TAG_OCTET_STRING, TAG_SEQUENCE, TAG_SET,
};
use crate::asn1::schema::{Asn1Field, Asn1Type, SchemaKind, Tagging};
use crate::asn1::value::{Asn1Struct, Asn1Value};
use crate::asn1::Asn1Error;

/// DER-encode a SEQUENCE or CHOICE value.
pub fn encode(value: &Asn1Struct) -> Result<Vec<u8>, Asn1Error> {
    value.schema().validate()?;
    encode_struct(value)
}

fn encode_struct(value: &Asn1Struct) -> Result<Vec<u8>, Asn1Error> {
    let schema = value.schema();
    match schema.kind {
        SchemaKind::Sequence => {
            let mut contents = Vec::new();
            for field in schema.ordered_fields() {
                match value.get(field.name) {
                    Some(field_value) => contents.extend(encode_field(field, field_value)?),
                    None if field.optional => {}
                    None => {
                        return Err(Asn1Error::Encoding(format!(
                            "{}.{} is mandatory",
                            schema.name, field.name
                        )))
                    }
                }
            }
            tlv(CLASS_UNIVERSAL, true, TAG_SEQUENCE, &contents)
        }
        SchemaKind::Choice => {
            let (name, selected) = value.selected().ok_or_else(|| {
                Asn1Error::Encoding(format!("{}: no alternative selected", schema.name))
            })?;
            let field = schema.field(name).ok_or_else(|| {
                Asn1Error::Encoding(format!("{} has no alternative {name}", schema.name))
            })?;
            encode_field(field, selected)
        }
    }
}

fn encode_field(field: &Asn1Field, value: &Asn1Value) -> Result<Vec<u8>, Asn1Error> {
    let encoded = encode_value(field, value)?;
    let Some(number) = field.tag_number else {
        return Ok(encoded);
    };
    let class = field.class.wire(field.tag_number);
    match field.tagging {
        Tagging::Explicit => tlv(class, true, number, &encoded),
        Tagging::Implicit | Tagging::Normal => {
            let constructed = encoded.first().is_some_and(|b| b & 0x20 != 0);
            let skip = identifier_len(&encoded)?;
            let mut out = Vec::with_capacity(encoded.len() + 4);
            write_identifier(&mut out, class, constructed, number);
            out.extend_from_slice(&encoded[skip..]);
            Ok(out)
        }
    }
}

fn encode_value(field: &Asn1Field, value: &Asn1Value) -> Result<Vec<u8>, Asn1Error> {
    let mismatch = || {
        Asn1Error::Encoding(format!(
            "{}: {:?} field cannot hold {:?}",
            field.name, field.ty, value
        ))
    };
    match (field.ty, value) {
        (Asn1Type::Sequence | Asn1Type::Choice, Asn1Value::Struct(inner)) => encode_struct(inner),
        (Asn1Type::SetOf | Asn1Type::SequenceOf, Asn1Value::List(items)) => {
            let mut elements = items
                .iter()
                .map(encode_element)
                .collect::<Result<Vec<_>, _>>()?;
            let tag = if field.ty == Asn1Type::SetOf {
                // DER orders SET OF elements by their encodings
                elements.sort();
                TAG_SET
            } else {
                TAG_SEQUENCE
            };
            tlv(CLASS_UNIVERSAL, true, tag, &elements.concat())
        }
        (Asn1Type::Integer, Asn1Value::Integer(integer)) => {
            let bytes = match integer.as_bytes() {
                [] => &[0u8][..],
                bytes => bytes,
            };
            tlv(CLASS_UNIVERSAL, false, TAG_INTEGER, bytes)
        }
        (Asn1Type::ObjectIdentifier, Asn1Value::ObjectIdentifier(oid)) => {
            tlv(CLASS_UNIVERSAL, false, TAG_OBJECT_IDENTIFIER, &encode_oid(oid)?)
        }
        (Asn1Type::OctetString, Asn1Value::OctetString(bytes)) => {
            tlv(CLASS_UNIVERSAL, false, TAG_OCTET_STRING, bytes)
        }
        (Asn1Type::Boolean, Asn1Value::Boolean(flag)) => {
            tlv(CLASS_UNIVERSAL, false, TAG_BOOLEAN, &[if *flag { 0xff } else { 0x00 }])
        }
        (Asn1Type::Any, Asn1Value::Encoded(bytes)) => Ok(bytes.clone()),
        _ => Err(mismatch()),
    }
}

fn encode_element(value: &Asn1Value) -> Result<Vec<u8>, Asn1Error> {
    match value {
        Asn1Value::Struct(inner) => encode_struct(inner),
        Asn1Value::Encoded(bytes) => Ok(bytes.clone()),
        other => Err(Asn1Error::Encoding(format!(
            "collection element {other:?} needs a schema"
        ))),
    }
}

fn tlv(class: u8, constructed: bool, number: u32, contents: &[u8]) -> Result<Vec<u8>, Asn1Error> {
    let mut out = Vec::with_capacity(contents.len() + 6);
    write_identifier(&mut out, class, constructed, number);
    write_length(&mut out, contents.len())?;
    out.extend_from_slice(contents);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::decode::decode;
    use crate::asn1::schema::Asn1Schema;
    use crate::asn1::value::Asn1Integer;

    static ENTRY: Asn1Schema = Asn1Schema::sequence(
        "Entry",
        &[
            // declared out of order on purpose
            Asn1Field::new("note", 2, Asn1Type::OctetString).implicit(0).optional(),
            Asn1Field::new("id", 0, Asn1Type::Integer),
            Asn1Field::new("kind", 1, Asn1Type::ObjectIdentifier).explicit(5),
            Asn1Field::new("members", 3, Asn1Type::SetOf).optional(),
        ],
    );

    fn entry() -> Asn1Struct {
        Asn1Struct::new(&ENTRY)
            .with("id", Asn1Value::Integer(Asn1Integer::from_i64(300)))
            .and_then(|s| s.with("kind", Asn1Value::ObjectIdentifier("1.2.840.113549.1.7.2".into())))
            .unwrap()
    }

    #[test]
    fn fields_follow_index_order() {
        let der = encode(&entry()).unwrap();
        assert_eq!(
            der,
            vec![
                0x30, 0x11, 0x02, 0x02, 0x01, 0x2c, 0xa5, 0x0b, 0x06, 0x09, 0x2a, 0x86, 0x48,
                0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02
            ]
        );
        assert_eq!(decode(&der, &ENTRY).unwrap(), entry());
    }

    #[test]
    fn implicit_tag_replaces_identifier() {
        let mut value = entry();
        value.set("note", Asn1Value::OctetString(b"ok".to_vec())).unwrap();
        let der = encode(&value).unwrap();
        assert_eq!(&der[der.len() - 4..], &[0x80, 0x02, b'o', b'k']);
        assert_eq!(decode(&der, &ENTRY).unwrap().octets("note").unwrap(), b"ok");
    }

    #[test]
    fn set_of_elements_are_sorted() {
        let mut value = entry();
        value
            .set(
                "members",
                Asn1Value::List(vec![
                    Asn1Value::Encoded(vec![0x02, 0x01, 0x09]),
                    Asn1Value::Encoded(vec![0x02, 0x01, 0x03]),
                    Asn1Value::Encoded(vec![0x01, 0x01, 0xff]),
                ]),
            )
            .unwrap();
        let der = encode(&value).unwrap();
        assert_eq!(
            &der[der.len() - 11..],
            &[0x31, 0x09, 0x01, 0x01, 0xff, 0x02, 0x01, 0x03, 0x02, 0x01, 0x09]
        );
    }

    #[test]
    fn missing_mandatory_field() {
        let value = Asn1Struct::new(&ENTRY)
            .with("id", Asn1Value::Integer(Asn1Integer::from_i64(1)))
            .unwrap();
        assert!(matches!(encode(&value), Err(Asn1Error::Encoding(_))));

        let wrong = Asn1Struct::new(&ENTRY)
            .with("id", Asn1Value::Boolean(true))
            .and_then(|s| s.with("kind", Asn1Value::ObjectIdentifier("1.2".into())))
            .unwrap();
        assert!(matches!(encode(&wrong), Err(Asn1Error::Encoding(_))));
    }

    #[test]
    fn long_contents_use_long_form_length() {
        let mut value = entry();
        value.set("note", Asn1Value::OctetString(vec![0x55; 200])).unwrap();
        let der = encode(&value).unwrap();
        assert_eq!(&der[..3], &[0x30, 0x81, 0xdc]);
        assert_eq!(decode(&der, &ENTRY).unwrap().octets("note").unwrap().len(), 200);
    }
}
