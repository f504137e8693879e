//! Schema-driven BER decoding.

use crate::asn1::ber::{decode_oid, BerReader, BerValue, TAG_SEQUENCE};
use crate::asn1::schema::{Asn1Field, Asn1Schema, Asn1Type, SchemaKind, Tagging};
use crate::asn1::value::{Asn1Integer, Asn1Struct, Asn1Value};
use crate::asn1::Asn1Error;
use log::{debug, trace};

/// Decode one data value from the start of `data` against `schema`.
///
/// The schema is validated before the buffer is read.
pub fn decode(data: &[u8], schema: &'static Asn1Schema) -> Result<Asn1Struct, Asn1Error> {
    schema.validate()?;
    let value = BerReader::new(data)
        .read_value()?
        .ok_or_else(|| Asn1Error::Decoding(format!("no data value for {}", schema.name)))?;
    match schema.kind {
        SchemaKind::Sequence => {
            if !value.is_universal(TAG_SEQUENCE) {
                return Err(Asn1Error::UnexpectedTag(format!(
                    "{} expects a SEQUENCE, found class {} number {}",
                    schema.name, value.tag_class, value.tag_number
                )));
            }
            decode_sequence(&value, schema)
        }
        SchemaKind::Choice => decode_choice(&value, schema),
    }
}

/// Decode the contents of a SET OF whose tag has already been consumed, such as an
/// implicitly tagged certificate set.
pub fn decode_set_of_contents(
    contents: &[u8],
    element: &'static Asn1Schema,
) -> Result<Vec<Asn1Struct>, Asn1Error> {
    element.validate()?;
    let mut reader = BerReader::new(contents);
    let mut items = Vec::new();
    while let Some(value) = reader.read_value()? {
        items.push(decode_struct(&value, element)?);
    }
    Ok(items)
}

fn decode_struct(value: &BerValue, schema: &'static Asn1Schema) -> Result<Asn1Struct, Asn1Error> {
    match schema.kind {
        SchemaKind::Sequence => decode_sequence(value, schema),
        SchemaKind::Choice => decode_choice(value, schema),
    }
}

fn decode_sequence(value: &BerValue, schema: &'static Asn1Schema) -> Result<Asn1Struct, Asn1Error> {
    let fields = schema.ordered_fields();
    let mut result = Asn1Struct::new(schema);
    let mut next_field = 0;
    let mut reader = value.contents_reader();
    while let Some(element) = reader.read_value()? {
        let mut matched = false;
        while next_field < fields.len() {
            let field = fields[next_field];
            next_field += 1;
            if !field_matches(field, &element) {
                if field.optional {
                    continue;
                }
                return Err(Asn1Error::UnexpectedTag(format!(
                    "{}.{}: unexpected class {} number {}",
                    schema.name, field.name, element.tag_class, element.tag_number
                )));
            }
            result.set(field.name, decode_field(field, &element)?)?;
            matched = true;
            break;
        }
        if !matched {
            debug!(
                "{}: ignoring trailing element class {} number {}",
                schema.name, element.tag_class, element.tag_number
            );
        }
    }
    if let Some(missing) = fields[next_field..]
        .iter()
        .find(|field| !field.optional)
    {
        return Err(Asn1Error::Decoding(format!(
            "{}.{} is missing",
            schema.name, missing.name
        )));
    }
    Ok(result)
}

fn decode_choice(value: &BerValue, schema: &'static Asn1Schema) -> Result<Asn1Struct, Asn1Error> {
    for field in schema.fields {
        if field_matches(field, value) {
            trace!("{}: selected {}", schema.name, field.name);
            let mut result = Asn1Struct::new(schema);
            result.set(field.name, decode_field(field, value)?)?;
            return Ok(result);
        }
    }
    Err(Asn1Error::UnexpectedTag(format!(
        "{}: no alternative for class {} number {}",
        schema.name, value.tag_class, value.tag_number
    )))
}

/// Whether `value` carries the tag `field` expects. Untagged CHOICE fields match when any of
/// their alternatives does, untagged ANY fields match anything.
fn field_matches(field: &Asn1Field, value: &BerValue) -> bool {
    match field.wire_tag() {
        Some((class, number)) => value.tag_class == class && value.tag_number == number,
        None => match (field.ty, field.schema) {
            (Asn1Type::Choice, Some(choice)) => {
                choice.fields.iter().any(|alt| field_matches(alt, value))
            }
            _ => true,
        },
    }
}

fn decode_field(field: &Asn1Field, value: &BerValue) -> Result<Asn1Value, Asn1Error> {
    if field.tagging == Tagging::Explicit {
        let inner = value.contents_reader().read_value()?.ok_or_else(|| {
            Asn1Error::Decoding(format!("{}: empty explicit tag", field.name))
        })?;
        return convert(field, &inner);
    }
    convert(field, value)
}

fn convert(field: &Asn1Field, value: &BerValue) -> Result<Asn1Value, Asn1Error> {
    Ok(match field.ty {
        Asn1Type::Sequence | Asn1Type::Choice => {
            let schema = field.schema.ok_or_else(|| {
                Asn1Error::InvalidSchema(format!("{} has no nested schema", field.name))
            })?;
            Asn1Value::Struct(decode_struct(value, schema)?)
        }
        Asn1Type::SetOf | Asn1Type::SequenceOf => {
            let mut reader = value.contents_reader();
            let mut items = Vec::new();
            while let Some(element) = reader.read_value()? {
                items.push(match field.schema {
                    Some(schema) => Asn1Value::Struct(decode_struct(&element, schema)?),
                    None => Asn1Value::Encoded(element.encoded.to_vec()),
                });
            }
            Asn1Value::List(items)
        }
        Asn1Type::Integer => {
            if value.contents.is_empty() {
                return Err(Asn1Error::Decoding(format!("{}: empty INTEGER", field.name)));
            }
            Asn1Value::Integer(Asn1Integer::from_bytes(value.contents))
        }
        Asn1Type::ObjectIdentifier => Asn1Value::ObjectIdentifier(decode_oid(value.contents)?),
        Asn1Type::OctetString => Asn1Value::OctetString(value.contents.to_vec()),
        Asn1Type::Boolean => match value.contents {
            [byte] => Asn1Value::Boolean(*byte != 0),
            _ => {
                return Err(Asn1Error::Decoding(format!(
                    "{}: BOOLEAN must be one byte",
                    field.name
                )))
            }
        },
        Asn1Type::Any => Asn1Value::Encoded(value.encoded.to_vec()),
    })
}
