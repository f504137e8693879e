//! Static schema tables describing SEQUENCE and CHOICE types.
//!
//! A schema is a list of field descriptors, each naming its ASN.1 type, tag class, tagging mode
//! and optionality. Schemas are declared as `static` items and nest by reference.

use crate::asn1::ber::{
    CLASS_APPLICATION, CLASS_CONTEXT_SPECIFIC, CLASS_PRIVATE, CLASS_UNIVERSAL, TAG_BOOLEAN,
    TAG_INTEGER, TAG_OBJECT_IDENTIFIER, TAG_OCTET_STRING, TAG_SEQUENCE, TAG_SET,
};
use crate::asn1::Asn1Error;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Asn1Type {
    Sequence,
    Choice,
    SetOf,
    SequenceOf,
    Integer,
    ObjectIdentifier,
    OctetString,
    Boolean,
    /// Any single data value, kept as its encoded bytes.
    Any,
}

impl Asn1Type {
    /// The universal tag number of an untagged value of this type.
    pub fn universal_tag(self) -> Option<u32> {
        match self {
            Asn1Type::Sequence | Asn1Type::SequenceOf => Some(TAG_SEQUENCE),
            Asn1Type::SetOf => Some(TAG_SET),
            Asn1Type::Integer => Some(TAG_INTEGER),
            Asn1Type::ObjectIdentifier => Some(TAG_OBJECT_IDENTIFIER),
            Asn1Type::OctetString => Some(TAG_OCTET_STRING),
            Asn1Type::Boolean => Some(TAG_BOOLEAN),
            Asn1Type::Choice | Asn1Type::Any => None,
        }
    }

    pub fn is_constructed(self) -> bool {
        matches!(
            self,
            Asn1Type::Sequence | Asn1Type::SequenceOf | Asn1Type::SetOf
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
    /// Context-specific when the field has a tag number, universal otherwise.
    Automatic,
}

impl TagClass {
    pub fn wire(self, tag_number: Option<u32>) -> u8 {
        match self {
            TagClass::Universal => CLASS_UNIVERSAL,
            TagClass::Application => CLASS_APPLICATION,
            TagClass::ContextSpecific => CLASS_CONTEXT_SPECIFIC,
            TagClass::Private => CLASS_PRIVATE,
            TagClass::Automatic if tag_number.is_some() => CLASS_CONTEXT_SPECIFIC,
            TagClass::Automatic => CLASS_UNIVERSAL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tagging {
    Normal,
    /// The field tag replaces the type's own tag.
    Implicit,
    /// The field tag wraps the type's own encoding.
    Explicit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Asn1Field {
    pub name: &'static str,
    /// Position within a SEQUENCE; fields are matched in ascending index order.
    pub index: u32,
    pub ty: Asn1Type,
    pub class: TagClass,
    pub tagging: Tagging,
    pub tag_number: Option<u32>,
    pub optional: bool,
    /// Nested schema for SEQUENCE and CHOICE fields, element schema for SET OF and SEQUENCE OF.
    /// Without one, collection elements are kept as encoded bytes.
    pub schema: Option<&'static Asn1Schema>,
}

impl Asn1Field {
    pub const fn new(name: &'static str, index: u32, ty: Asn1Type) -> Self {
        Asn1Field {
            name,
            index,
            ty,
            class: TagClass::Automatic,
            tagging: Tagging::Normal,
            tag_number: None,
            optional: false,
            schema: None,
        }
    }

    pub const fn implicit(mut self, tag_number: u32) -> Self {
        self.tagging = Tagging::Implicit;
        self.tag_number = Some(tag_number);
        self
    }

    pub const fn explicit(mut self, tag_number: u32) -> Self {
        self.tagging = Tagging::Explicit;
        self.tag_number = Some(tag_number);
        self
    }

    pub const fn class(mut self, class: TagClass) -> Self {
        self.class = class;
        self
    }

    pub const fn tagging(mut self, tagging: Tagging) -> Self {
        self.tagging = tagging;
        self
    }

    pub const fn tag_number(mut self, tag_number: u32) -> Self {
        self.tag_number = Some(tag_number);
        self
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub const fn of(mut self, schema: &'static Asn1Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Wire class and number this field is identified by, when it has a fixed tag.
    pub fn wire_tag(&self) -> Option<(u8, u32)> {
        let number = self.tag_number.or_else(|| self.ty.universal_tag())?;
        Some((self.class.wire(self.tag_number), number))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Sequence,
    Choice,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Asn1Schema {
    pub name: &'static str,
    pub kind: SchemaKind,
    pub fields: &'static [Asn1Field],
}

impl Asn1Schema {
    pub const fn sequence(name: &'static str, fields: &'static [Asn1Field]) -> Self {
        Asn1Schema {
            name,
            kind: SchemaKind::Sequence,
            fields,
        }
    }

    pub const fn choice(name: &'static str, fields: &'static [Asn1Field]) -> Self {
        Asn1Schema {
            name,
            kind: SchemaKind::Choice,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static Asn1Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Fields in the order a SEQUENCE lays them out.
    pub fn ordered_fields(&self) -> Vec<&'static Asn1Field> {
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_by_key(|field| field.index);
        fields
    }

    /// Check this schema and every schema it references.
    pub fn validate(&'static self) -> Result<(), Asn1Error> {
        let mut seen = HashSet::new();
        self.validate_nested(&mut seen)
    }

    fn validate_nested(&'static self, seen: &mut HashSet<*const Asn1Schema>) -> Result<(), Asn1Error> {
        if !seen.insert(self as *const Asn1Schema) {
            return Ok(());
        }
        match self.kind {
            SchemaKind::Sequence => {
                let mut indices = HashSet::new();
                for field in self.fields {
                    if !indices.insert(field.index) {
                        return Err(Asn1Error::InvalidSchema(format!(
                            "{}: duplicate field index {}",
                            self.name, field.index
                        )));
                    }
                }
            }
            SchemaKind::Choice => {
                let mut tags = HashSet::new();
                for field in self.fields {
                    if let Some(tag) = field.wire_tag() {
                        if !tags.insert(tag) {
                            return Err(Asn1Error::InvalidSchema(format!(
                                "{}: alternatives share tag class {} number {}",
                                self.name, tag.0, tag.1
                            )));
                        }
                    }
                }
            }
        }
        for field in self.fields {
            if field.tagging != Tagging::Normal && field.tag_number.is_none() {
                return Err(Asn1Error::InvalidSchema(format!(
                    "{}.{}: {:?} tagging without a tag number",
                    self.name, field.name, field.tagging
                )));
            }
            let needs_schema = matches!(field.ty, Asn1Type::Sequence | Asn1Type::Choice);
            match field.schema {
                Some(nested) => {
                    let expected = match field.ty {
                        Asn1Type::Choice => Some(SchemaKind::Choice),
                        Asn1Type::Sequence => Some(SchemaKind::Sequence),
                        _ => None,
                    };
                    if expected.is_some_and(|kind| kind != nested.kind) {
                        return Err(Asn1Error::InvalidSchema(format!(
                            "{}.{}: nested schema {} is a {:?}",
                            self.name, field.name, nested.name, nested.kind
                        )));
                    }
                    nested.validate_nested(seen)?;
                }
                None if needs_schema => {
                    return Err(Asn1Error::InvalidSchema(format!(
                        "{}.{}: {:?} field without a nested schema",
                        self.name, field.name, field.ty
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static POINT: Asn1Schema = Asn1Schema::sequence(
        "Point",
        &[
            Asn1Field::new("x", 0, Asn1Type::Integer),
            Asn1Field::new("y", 1, Asn1Type::Integer),
        ],
    );

    static DUPLICATE_INDEX: Asn1Schema = Asn1Schema::sequence(
        "Broken",
        &[
            Asn1Field::new("a", 0, Asn1Type::Integer),
            Asn1Field::new("b", 0, Asn1Type::Boolean),
        ],
    );

    static CLASHING_CHOICE: Asn1Schema = Asn1Schema::choice(
        "Clash",
        &[
            Asn1Field::new("a", 0, Asn1Type::OctetString).implicit(1),
            Asn1Field::new("b", 1, Asn1Type::Integer).implicit(1),
        ],
    );

    static UNTAGGED_IMPLICIT: Asn1Schema = Asn1Schema::sequence(
        "Untagged",
        &[Asn1Field::new("a", 0, Asn1Type::Integer).tagging(Tagging::Implicit)],
    );

    static NESTS_BROKEN: Asn1Schema = Asn1Schema::sequence(
        "Outer",
        &[Asn1Field::new("inner", 0, Asn1Type::Sequence).of(&DUPLICATE_INDEX)],
    );

    #[test]
    fn automatic_class() {
        let tagged = Asn1Field::new("a", 0, Asn1Type::Integer).implicit(3);
        assert_eq!(tagged.wire_tag(), Some((CLASS_CONTEXT_SPECIFIC, 3)));
        let plain = Asn1Field::new("a", 0, Asn1Type::Integer);
        assert_eq!(plain.wire_tag(), Some((CLASS_UNIVERSAL, TAG_INTEGER)));
        let any = Asn1Field::new("a", 0, Asn1Type::Any);
        assert_eq!(any.wire_tag(), None);
        let app = Asn1Field::new("a", 0, Asn1Type::Integer)
            .class(TagClass::Application)
            .implicit(7);
        assert_eq!(app.wire_tag(), Some((CLASS_APPLICATION, 7)));
    }

    #[test]
    fn validation() {
        assert!(POINT.validate().is_ok());
        for schema in [&DUPLICATE_INDEX, &CLASHING_CHOICE, &UNTAGGED_IMPLICIT, &NESTS_BROKEN] {
            assert!(
                matches!(schema.validate(), Err(Asn1Error::InvalidSchema(_))),
                "{} should be rejected",
                schema.name
            );
        }
    }

    #[test]
    fn ordered_by_index() {
        static REVERSED: Asn1Schema = Asn1Schema::sequence(
            "Reversed",
            &[
                Asn1Field::new("second", 1, Asn1Type::Integer),
                Asn1Field::new("first", 0, Asn1Type::Integer),
            ],
        );
        let names: Vec<_> = REVERSED.ordered_fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
