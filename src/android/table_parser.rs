//! Decoder for the chunked `resources.arsc` format.
//!
//! ```text
//! TABLE
//!   STRING_POOL                 global value strings
//!   TABLE_PACKAGE*
//!     STRING_POOL               type names, key names (located by header offsets)
//!     TABLE_TYPE_SPEC | TABLE_TYPE | TABLE_LIBRARY ...
//! ```

use crate::android::buffer::*;
use crate::android::config::ResTableConfig;
use crate::android::resource_table::{
    LibraryEntry, OffsetLayout, ResourcePackage, ResourceTable, Type, TypeFlags, TypeSpec,
};
use crate::android::string_pool::StringPool;
use crate::error::{bail_malformed, malformed, ParseResult};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::rc::Rc;

const PACKAGE_NAME_CHARS: usize = 128;

impl ResourceTable {
    /// Decode a complete `resources.arsc` buffer.
    pub fn parse(data: impl Into<Rc<[u8]>>) -> ParseResult<Self> {
        let data: Rc<[u8]> = data.into();
        TableParser { data: Rc::clone(&data) }.parse()
    }
}

struct TableParser {
    data: Rc<[u8]>,
}

impl TableParser {
    fn parse(&self) -> ParseResult<ResourceTable> {
        let mut cursor = ByteCursor::new(&self.data);
        let header = cursor.read_chunk_header()?;
        if header.chunk_type != RES_TABLE_TYPE {
            bail_malformed!(
                "expected resource table chunk, found 0x{:04x}",
                header.chunk_type
            );
        }
        let package_count = cursor.read_u32()?;
        cursor.seek(header.body_start())?;

        let mut string_pool: Option<Rc<StringPool>> = None;
        let mut packages = BTreeMap::new();
        while cursor.position() < header.end() {
            let chunk = cursor.read_chunk_header()?;
            match chunk.chunk_type {
                RES_STRING_POOL_TYPE if string_pool.is_none() => {
                    string_pool = Some(Rc::new(StringPool::parse(&mut cursor, &chunk)?));
                }
                RES_TABLE_PACKAGE_TYPE => {
                    let pool = match &string_pool {
                        Some(pool) => Rc::clone(pool),
                        None => bail_malformed!("package chunk before the global string pool"),
                    };
                    let package = self.parse_package(&chunk, pool)?;
                    debug!("decoded resource package 0x{:02x} {}", package.id, package.name);
                    packages.insert(package.id, package);
                }
                RES_NULL_TYPE => {}
                other => bail_malformed!(
                    "unexpected chunk 0x{:04x} at 0x{:x} in resource table",
                    other,
                    chunk.start
                ),
            }
            cursor.seek(chunk.end())?;
        }

        if packages.len() as u32 != package_count {
            warn!(
                "resource table declares {} packages but contains {}",
                package_count,
                packages.len()
            );
        }
        Ok(ResourceTable {
            string_pool: string_pool.unwrap_or_default(),
            packages,
        })
    }

    fn parse_package(
        &self,
        header: &ChunkHeader,
        strings: Rc<StringPool>,
    ) -> ParseResult<ResourcePackage> {
        let mut cursor = ByteCursor::new(&self.data).fork_at(header.start + CHUNK_HEADER_SIZE)?;
        let id = cursor.read_u32()?;
        if id > 0xff {
            bail_malformed!("package id 0x{:x} does not fit in a resource id", id);
        }
        let name = cursor.read_fixed_utf16(PACKAGE_NAME_CHARS)?;
        let type_strings_offset = cursor.read_u32()? as usize;
        let _last_public_type = cursor.read_u32()?;
        let key_strings_offset = cursor.read_u32()? as usize;
        let _last_public_key = cursor.read_u32()?;

        let type_strings = Rc::new(self.package_pool(header, type_strings_offset, "type")?);
        let key_strings = Rc::new(self.package_pool(header, key_strings_offset, "key")?);

        let mut package = ResourcePackage {
            id: id as u8,
            name,
            type_strings,
            key_strings,
            type_specs: BTreeMap::new(),
            types: BTreeMap::new(),
            libraries: Vec::new(),
        };

        cursor.seek(header.body_start())?;
        while cursor.position() < header.end() {
            let chunk = cursor.read_chunk_header()?;
            if chunk.end() > header.end() {
                bail_malformed!(
                    "chunk at 0x{:x} overruns package {}",
                    chunk.start,
                    package.name
                );
            }
            match chunk.chunk_type {
                // the type and key pools, already read through the header offsets
                RES_STRING_POOL_TYPE => {}
                RES_TABLE_TYPE_SPEC_TYPE => {
                    let spec = self.parse_type_spec(&mut cursor, &package)?;
                    package.type_specs.insert(spec.id, spec);
                }
                RES_TABLE_TYPE_TYPE => {
                    let ty = self.parse_type(&mut cursor, &chunk, &package, Rc::clone(&strings))?;
                    package.types.entry(ty.id).or_default().push(ty);
                }
                RES_TABLE_LIBRARY_TYPE => {
                    let count = cursor.read_u32()?;
                    cursor.seek(chunk.body_start())?;
                    for _ in 0..count {
                        let package_id = cursor.read_u32()?;
                        let name = cursor.read_fixed_utf16(PACKAGE_NAME_CHARS)?;
                        package.libraries.push(LibraryEntry { package_id, name });
                    }
                }
                RES_TABLE_OVERLAYABLE_TYPE
                | RES_TABLE_OVERLAYABLE_POLICY_TYPE
                | RES_TABLE_STAGED_ALIAS_TYPE
                | RES_NULL_TYPE => {
                    debug!(
                        "skipping chunk 0x{:04x} in package {}",
                        chunk.chunk_type, package.name
                    );
                }
                other => bail_malformed!(
                    "unexpected chunk 0x{:04x} at 0x{:x} in package {}",
                    other,
                    chunk.start,
                    package.name
                ),
            }
            cursor.seek(chunk.end())?;
        }
        Ok(package)
    }

    /// Read a type/key pool at `offset` from the package start. Zero means the package
    /// inherits the pool from its base and has none of its own.
    fn package_pool(
        &self,
        package: &ChunkHeader,
        offset: usize,
        what: &str,
    ) -> ParseResult<StringPool> {
        if offset == 0 {
            warn!("package at 0x{:x} has no {} string pool", package.start, what);
            return Ok(StringPool::empty());
        }
        let mut cursor = ByteCursor::new(&self.data).fork_at(package.start + offset)?;
        let header = cursor.read_chunk_header()?;
        if header.chunk_type != RES_STRING_POOL_TYPE {
            return Err(malformed!(
                "{} pool offset 0x{:x} points at chunk 0x{:04x}",
                what,
                offset,
                header.chunk_type
            ));
        }
        StringPool::parse(&mut cursor, &header)
    }

    fn parse_type_spec(
        &self,
        cursor: &mut ByteCursor<'_>,
        package: &ResourcePackage,
    ) -> ParseResult<TypeSpec> {
        let id = cursor.read_u8()?;
        let _res0 = cursor.read_u8()?;
        let _types_count = cursor.read_u16()?;
        let entry_count = cursor.read_u32()?;
        if entry_count as usize > cursor.remaining() / 4 {
            bail_malformed!("type spec 0x{:02x} declares {} entries", id, entry_count);
        }
        let mut entry_flags = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entry_flags.push(cursor.read_u32()?);
        }
        Ok(TypeSpec {
            id,
            name: type_name(package, id),
            entry_flags,
        })
    }

    fn parse_type(
        &self,
        cursor: &mut ByteCursor<'_>,
        chunk: &ChunkHeader,
        package: &ResourcePackage,
        strings: Rc<StringPool>,
    ) -> ParseResult<Type> {
        let id = cursor.read_u8()?;
        let flags = TypeFlags::from_bits_retain(cursor.read_u8()?);
        let _reserved = cursor.read_u16()?;
        let entry_count = cursor.read_u32()?;
        let entries_start = cursor.read_u32()? as usize;
        let config = ResTableConfig::parse(cursor)?;

        let layout = if flags.contains(TypeFlags::SPARSE) {
            OffsetLayout::Sparse
        } else if flags.contains(TypeFlags::OFFSET16) {
            OffsetLayout::Dense16
        } else {
            OffsetLayout::Dense32
        };
        let entry_width = match layout {
            OffsetLayout::Dense16 => 2,
            OffsetLayout::Dense32 | OffsetLayout::Sparse => 4,
        };
        let offsets_start = chunk.body_start();
        let offsets_end = (entry_count as usize)
            .checked_mul(entry_width)
            .and_then(|size| offsets_start.checked_add(size))
            .filter(|end| *end <= chunk.end())
            .ok_or_else(|| malformed!("type 0x{:02x} offset table overruns its chunk", id))?;
        let entries_start = chunk.start + entries_start;
        if entries_start < offsets_end || entries_start > chunk.end() {
            bail_malformed!(
                "type 0x{:02x} entries start 0x{:x} outside chunk 0x{:x}..0x{:x}",
                id,
                entries_start,
                offsets_end,
                chunk.end()
            );
        }

        Ok(Type {
            id,
            name: type_name(package, id),
            flags,
            entry_count,
            config,
            data: Rc::clone(&self.data),
            offsets_start,
            entries_start,
            layout,
            key_strings: Rc::clone(&package.key_strings),
            string_pool: strings,
        })
    }
}

/// Type ids are 1-based indices into the package's type-name pool.
fn type_name(package: &ResourcePackage, id: u8) -> Rc<str> {
    id.checked_sub(1)
        .and_then(|idx| package.type_strings.get(idx as u32).ok().flatten())
        .unwrap_or_else(|| Rc::from(format!("type{id}").as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android::config::{Locale, DENSITY_DEFAULT, DENSITY_XHIGH};
    use crate::android::res_value::{ResourceValue, TYPE_INT_DEC, TYPE_REFERENCE, TYPE_STRING};
    use crate::error::ErrorKind;
    use crate::tests::fixtures::{ArscBuilder, TypeConfig};

    #[test]
    fn single_decimal_entry_resolves() {
        let mut builder = ArscBuilder::new("com.example");
        builder.add_entry("integer", TypeConfig::default(), "answer", TYPE_INT_DEC, 42);
        let table = ResourceTable::parse(builder.build()).expect("parse table");

        let resources = table.get_resources_by_id(0x7f01_0000).expect("lookup");
        assert_eq!(resources.len(), 1);
        let value = resources[0].value().expect("value");
        assert_eq!(table.render_value(value, Some(&Locale::any())), "42");
        assert_eq!(&*resources[0].entry.key, "answer");
        assert_eq!(&*resources[0].ty.name, "integer");
    }

    #[test]
    fn lookup_returns_every_configuration() {
        let mut builder = ArscBuilder::new("com.example");
        let app_name = builder.add_global_string("Example");
        let app_name_fr = builder.add_global_string("Exemple");
        builder.add_entry("string", TypeConfig::default(), "app_name", TYPE_STRING, app_name);
        builder.add_entry("string", TypeConfig::locale("fr", ""), "app_name", TYPE_STRING, app_name_fr);
        let table = ResourceTable::parse(builder.build()).expect("parse table");

        let resources = table.get_resources_by_id(0x7f01_0000).expect("lookup");
        assert_eq!(resources.len(), 2);

        let reference = ResourceValue::Reference(0x7f01_0000);
        assert_eq!(table.render_value(&reference, Some(&Locale::any())), "Example");
        assert_eq!(table.render_value(&reference, Some(&Locale::new("fr", "FR"))), "Exemple");
        assert_eq!(table.render_value(&reference, None), "@string/app_name");
        let locales = table.locales();
        assert!(locales.contains(&Locale::new("fr", "")));
    }

    #[test]
    fn self_reference_is_filtered() {
        let mut builder = ArscBuilder::new("com.example");
        builder.add_entry("drawable", TypeConfig::default(), "loop", TYPE_REFERENCE, 0x7f01_0000);
        builder.add_entry("drawable", TypeConfig::density(DENSITY_XHIGH), "loop", TYPE_INT_DEC, 7);
        let table = ResourceTable::parse(builder.build()).expect("parse table");

        let resources = table.get_resources_by_id(0x7f01_0000).expect("lookup");
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].ty.density(), DENSITY_XHIGH);
        assert_ne!(resources[0].ty.density(), DENSITY_DEFAULT);
    }

    #[test]
    fn absent_entries_are_skipped() {
        let mut builder = ArscBuilder::new("com.example");
        builder.add_entry("string", TypeConfig::default(), "first", TYPE_INT_DEC, 1);
        builder.add_entry("string", TypeConfig::default(), "second", TYPE_INT_DEC, 2);
        builder.add_entry("string", TypeConfig::locale("de", ""), "second", TYPE_INT_DEC, 3);
        let table = ResourceTable::parse(builder.build()).expect("parse table");

        // "first" only exists in the default configuration
        assert_eq!(table.get_resources_by_id(0x7f01_0000).unwrap().len(), 1);
        assert_eq!(table.get_resources_by_id(0x7f01_0001).unwrap().len(), 2);
        // past the type spec, in an unknown type, in an unknown package
        assert!(table.get_resources_by_id(0x7f01_0002).unwrap().is_empty());
        assert!(table.get_resources_by_id(0x7f09_0000).unwrap().is_empty());
        assert!(table.get_resources_by_id(0x0101_0000).unwrap().is_empty());
    }

    #[test]
    fn rejects_wrong_root_chunk() {
        let mut data = ArscBuilder::new("com.example").build();
        data[0] = 0x03;
        let err = ResourceTable::parse(data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedChunk);
    }
}
