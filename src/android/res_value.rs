//! `Res_value`: the typed value cell used by resource entries and binary XML attributes.

use crate::android::buffer::ByteCursor;
use crate::android::string_pool::StringPool;
use crate::error::ParseResult;
use std::rc::Rc;

pub const TYPE_NULL: u8 = 0x00;
pub const TYPE_REFERENCE: u8 = 0x01;
pub const TYPE_ATTRIBUTE: u8 = 0x02;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_FLOAT: u8 = 0x04;
pub const TYPE_DIMENSION: u8 = 0x05;
pub const TYPE_FRACTION: u8 = 0x06;
pub const TYPE_DYNAMIC_REFERENCE: u8 = 0x07;
pub const TYPE_INT_DEC: u8 = 0x10;
pub const TYPE_INT_HEX: u8 = 0x11;
pub const TYPE_INT_BOOLEAN: u8 = 0x12;
pub const TYPE_INT_COLOR_ARGB8: u8 = 0x1c;
pub const TYPE_INT_COLOR_RGB8: u8 = 0x1d;
pub const TYPE_INT_COLOR_ARGB4: u8 = 0x1e;
pub const TYPE_INT_COLOR_RGB4: u8 = 0x1f;

const COMPLEX_UNIT_MASK: u32 = 0xf;

/// A decoded `Res_value`. String values hold the pool's shared string.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceValue {
    Null,
    Reference(u32),
    Attribute(u32),
    String(Rc<str>),
    Float(f32),
    Dimension(u32),
    Fraction(u32),
    Decimal(i32),
    Hex(u32),
    Boolean(bool),
    /// ARGB colours keep their alpha channel when rendered.
    Color { argb: u32, with_alpha: bool },
    Raw { data_type: u8, data: u32 },
}

impl ResourceValue {
    /// Read the 8-byte `Res_value` structure. `None` means a string value pointing at the
    /// "no string" index.
    pub fn read(cursor: &mut ByteCursor<'_>, pool: &StringPool) -> ParseResult<Option<Self>> {
        let size = cursor.read_u16()?;
        let _res0 = cursor.read_u8()?;
        let data_type = cursor.read_u8()?;
        let data = cursor.read_u32()?;
        // sizes above 8 are reserved for future fields
        if size > 8 {
            cursor.skip(size as usize - 8)?;
        }
        Self::from_parts(data_type, data, pool)
    }

    pub fn from_parts(data_type: u8, data: u32, pool: &StringPool) -> ParseResult<Option<Self>> {
        let value = match data_type {
            TYPE_NULL => ResourceValue::Null,
            TYPE_REFERENCE | TYPE_DYNAMIC_REFERENCE => ResourceValue::Reference(data),
            TYPE_ATTRIBUTE => ResourceValue::Attribute(data),
            TYPE_STRING => match pool.get(data)? {
                Some(text) => ResourceValue::String(text),
                None => return Ok(None),
            },
            TYPE_FLOAT => ResourceValue::Float(f32::from_bits(data)),
            TYPE_DIMENSION => ResourceValue::Dimension(data),
            TYPE_FRACTION => ResourceValue::Fraction(data),
            TYPE_INT_DEC => ResourceValue::Decimal(data as i32),
            TYPE_INT_HEX => ResourceValue::Hex(data),
            TYPE_INT_BOOLEAN => ResourceValue::Boolean(data != 0),
            TYPE_INT_COLOR_ARGB8 | TYPE_INT_COLOR_ARGB4 => ResourceValue::Color {
                argb: data,
                with_alpha: true,
            },
            TYPE_INT_COLOR_RGB8 | TYPE_INT_COLOR_RGB4 => ResourceValue::Color {
                argb: data,
                with_alpha: false,
            },
            _ => ResourceValue::Raw { data_type, data },
        };
        Ok(Some(value))
    }

    pub fn reference_id(&self) -> Option<u32> {
        match self {
            ResourceValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// True for values whose rendering is purely numeric, which is when the attribute
    /// token tables apply.
    pub fn is_integer(&self) -> bool {
        matches!(self, ResourceValue::Decimal(_) | ResourceValue::Hex(_))
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ResourceValue::Decimal(v) => Some(*v as u32),
            ResourceValue::Hex(v) => Some(*v),
            _ => None,
        }
    }

    /// Render every variant that does not need a resource table. References render as
    /// `resourceId:0x...`; callers with a table use `ResourceTable::render_value`.
    pub fn render_plain(&self) -> String {
        match self {
            ResourceValue::Null => String::new(),
            ResourceValue::Reference(id) => format!("resourceId:0x{id:x}"),
            ResourceValue::Attribute(id) => format!("?0x{id:08x}"),
            ResourceValue::String(text) => text.to_string(),
            ResourceValue::Float(value) => format!("{value:?}"),
            ResourceValue::Dimension(data) => render_dimension(*data),
            ResourceValue::Fraction(data) => render_fraction(*data),
            ResourceValue::Decimal(value) => value.to_string(),
            ResourceValue::Hex(value) => format!("0x{value:x}"),
            ResourceValue::Boolean(flag) => flag.to_string(),
            ResourceValue::Color { argb, with_alpha } => {
                if *with_alpha {
                    format!("#{argb:08x}")
                } else {
                    format!("#{:06x}", argb & 0x00ff_ffff)
                }
            }
            ResourceValue::Raw { data_type, data } => {
                format!("{{type:0x{data_type:x}, data:0x{data:x}}}")
            }
        }
    }
}

fn render_dimension(data: u32) -> String {
    let unit = match data & COMPLEX_UNIT_MASK {
        0 => "px",
        1 => "dp",
        2 => "sp",
        3 => "pt",
        4 => "in",
        5 => "mm",
        other => return format!("{}unit:0x{:x}", (data as i32) >> 8, other),
    };
    format!("{}{}", (data as i32) >> 8, unit)
}

fn render_fraction(data: u32) -> String {
    let suffix = if data & COMPLEX_UNIT_MASK == 1 { "%p" } else { "%" };
    let value = f32::from_bits(data & 0xffff_fff0);
    format!("{value:?}{suffix}")
}
