//! `ResTable_config` and the locale/density policy used to pick between configurations.

use crate::android::buffer::ByteCursor;
use crate::error::{malformed, ParseResult};
use serde::Serialize;
use std::fmt;

pub const DENSITY_DEFAULT: u16 = 0;
pub const DENSITY_LOW: u16 = 120;
pub const DENSITY_MEDIUM: u16 = 160;
pub const DENSITY_TV: u16 = 213;
pub const DENSITY_HIGH: u16 = 240;
pub const DENSITY_XHIGH: u16 = 320;
pub const DENSITY_XXHIGH: u16 = 480;
pub const DENSITY_XXXHIGH: u16 = 640;
pub const DENSITY_ANY: u16 = 0xfffe;
pub const DENSITY_NONE: u16 = 0xffff;

/// A language/country pair. Both parts empty means "locale neutral".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Locale {
    pub language: String,
    pub country: String,
}

impl Locale {
    pub fn new(language: impl Into<String>, country: impl Into<String>) -> Self {
        Locale {
            language: language.into(),
            country: country.into(),
        }
    }

    /// The locale-neutral locale.
    pub fn any() -> Self {
        Locale::default()
    }

    pub fn is_any(&self) -> bool {
        self.language.is_empty() && self.country.is_empty()
    }

    /// How well a resource configured for `candidate` fits this preferred locale.
    /// Higher is better; 0 means unrelated.
    pub fn match_level(&self, candidate: &Locale) -> i32 {
        if self.language == candidate.language {
            if self.country == candidate.country {
                3
            } else if candidate.country.is_empty() {
                2
            } else {
                1
            }
        } else if candidate.is_any() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.language.is_empty(), self.country.is_empty()) {
            (true, true) => Ok(()),
            (false, true) => f.write_str(&self.language),
            (true, false) => write!(f, "_{}", self.country),
            (false, false) => write!(f, "{}_{}", self.language, self.country),
        }
    }
}

/// The subset of `ResTable_config` that metadata extraction cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResTableConfig {
    pub size: u32,
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
}

impl ResTableConfig {
    /// Read a config at the cursor and leave the cursor just past its declared size.
    pub fn parse(cursor: &mut ByteCursor<'_>) -> ParseResult<Self> {
        let start = cursor.position();
        let size = cursor.read_u32()?;
        if size < 4 {
            return Err(malformed!("config at 0x{:x} declares size {}", start, size));
        }
        let mut config = ResTableConfig {
            size,
            ..ResTableConfig::default()
        };
        // older tables carry truncated configs; missing fields keep their defaults
        if size >= 16 {
            config.mcc = cursor.read_u16()?;
            config.mnc = cursor.read_u16()?;
            config.language = [cursor.read_u8()?, cursor.read_u8()?];
            config.country = [cursor.read_u8()?, cursor.read_u8()?];
            config.orientation = cursor.read_u8()?;
            config.touchscreen = cursor.read_u8()?;
            config.density = cursor.read_u16()?;
        }
        cursor.seek(start + size as usize)?;
        Ok(config)
    }

    pub fn language(&self) -> String {
        unpack_code(self.language, b'a')
    }

    pub fn country(&self) -> String {
        unpack_code(self.country, b'0')
    }

    pub fn locale(&self) -> Locale {
        Locale::new(self.language(), self.country())
    }
}

/// Decode a two-byte language/region code. Codes with the high bit set pack three
/// 5-bit letters.
fn unpack_code(code: [u8; 2], base: u8) -> String {
    if code[0] == 0 && code[1] == 0 {
        return String::new();
    }
    if code[0] & 0x80 != 0 {
        let first = code[1] & 0x1f;
        let second = ((code[1] & 0xe0) >> 5) | ((code[0] & 0x03) << 3);
        let third = (code[0] & 0x7c) >> 2;
        return [first, second, third]
            .iter()
            .map(|part| (part + base) as char)
            .collect();
    }
    code.iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect()
}

/// Rank a configuration density for icon selection. `ANY`/`NONE` rank below everything.
pub fn density_level(density: u16) -> i32 {
    if density == DENSITY_ANY || density == DENSITY_NONE {
        -1
    } else {
        density as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_match_levels() {
        let preferred = Locale::new("en", "US");
        assert_eq!(preferred.match_level(&Locale::new("en", "US")), 3);
        assert_eq!(preferred.match_level(&Locale::new("en", "")), 2);
        assert_eq!(preferred.match_level(&Locale::new("en", "GB")), 1);
        assert_eq!(preferred.match_level(&Locale::any()), 1);
        assert_eq!(preferred.match_level(&Locale::new("fr", "FR")), 0);
        assert_eq!(Locale::any().match_level(&Locale::any()), 3);
    }

    #[test]
    fn config_reads_locale_and_skips_tail() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&64u32.to_le_bytes());
        raw.extend_from_slice(&310u16.to_le_bytes());
        raw.extend_from_slice(&260u16.to_le_bytes());
        raw.extend_from_slice(b"fr");
        raw.extend_from_slice(b"CA");
        raw.push(1);
        raw.push(3);
        raw.extend_from_slice(&DENSITY_XHIGH.to_le_bytes());
        raw.resize(64, 0);
        raw.push(0x5a);
        let mut cursor = ByteCursor::new(&raw);
        let config = ResTableConfig::parse(&mut cursor).expect("config");
        assert_eq!(config.locale(), Locale::new("fr", "CA"));
        assert_eq!(config.density, DENSITY_XHIGH);
        assert_eq!(config.mcc, 310);
        assert_eq!(cursor.read_u8().unwrap(), 0x5a);
    }

    #[test]
    fn packed_three_letter_language() {
        // "fil" packed per ResTable_config::packLanguage
        let f = b'f' - b'a';
        let i = b'i' - b'a';
        let l = b'l' - b'a';
        let packed = [0x80 | (l << 2) | (i >> 3), ((i & 0x07) << 5) | f];
        assert_eq!(unpack_code(packed, b'a'), "fil");
    }

    #[test]
    fn density_levels() {
        assert_eq!(density_level(DENSITY_ANY), -1);
        assert_eq!(density_level(DENSITY_NONE), -1);
        assert!(density_level(DENSITY_XXHIGH) > density_level(DENSITY_HIGH));
    }
}
