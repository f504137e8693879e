//! The decoded resource table (`resources.arsc`) and resource-id lookup.

use crate::android::buffer::ByteCursor;
use crate::android::config::{density_level, Locale, ResTableConfig};
use crate::android::res_value::ResourceValue;
use crate::android::string_pool::{StringPool, NO_ENTRY_INDEX};
use crate::error::{malformed, ParseResult};
use bitflags::bitflags;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Reference chains longer than this render as the bare id.
const MAX_REFERENCE_DEPTH: usize = 8;

bitflags! {
    /// `ResTable_entry` flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EntryFlags: u16 {
        const COMPLEX = 0x0001;
        const PUBLIC = 0x0002;
        const WEAK = 0x0004;
        const COMPACT = 0x0008;
    }
}

bitflags! {
    /// `ResTable_type` flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TypeFlags: u8 {
        const SPARSE = 0x01;
        const OFFSET16 = 0x02;
    }
}

/// A `0xPPTTEEEE` resource identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub fn compose(package_id: u8, type_id: u8, entry_index: u16) -> Self {
        ResourceId(((package_id as u32) << 24) | ((type_id as u32) << 16) | entry_index as u32)
    }

    pub fn package_id(self) -> u8 {
        ((self.0 >> 24) & 0xff) as u8
    }

    pub fn type_id(self) -> u8 {
        ((self.0 >> 16) & 0xff) as u8
    }

    pub fn entry_index(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// One decoded `ResTable_entry`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceEntry {
    pub key: Rc<str>,
    pub flags: EntryFlags,
    pub kind: EntryKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntryKind {
    Simple(Option<ResourceValue>),
    /// A bag such as a style or plural: parent reference plus name/value pairs.
    Map {
        parent: u32,
        values: Vec<ResourceMapEntry>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceMapEntry {
    pub name: u32,
    pub value: Option<ResourceValue>,
}

impl ResourceEntry {
    fn parse(
        cursor: &mut ByteCursor<'_>,
        keys: &StringPool,
        strings: &StringPool,
    ) -> ParseResult<Self> {
        let begin = cursor.position();
        let size = cursor.read_u16()?;
        let flags = EntryFlags::from_bits_retain(cursor.read_u16()?);

        if flags.contains(EntryFlags::COMPACT) {
            // the size field holds the key index and the high flag byte the value type
            let data = cursor.read_u32()?;
            let data_type = (flags.bits() >> 8) as u8;
            return Ok(ResourceEntry {
                key: key_name(keys, size as u32)?,
                flags,
                kind: EntryKind::Simple(ResourceValue::from_parts(data_type, data, strings)?),
            });
        }

        let key = key_name(keys, cursor.read_u32()?)?;
        if flags.contains(EntryFlags::COMPLEX) {
            let parent = cursor.read_u32()?;
            let count = cursor.read_u32()?;
            cursor.seek(begin + size as usize)?;
            let mut values = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let name = cursor.read_u32()?;
                let value = ResourceValue::read(cursor, strings)?;
                values.push(ResourceMapEntry { name, value });
            }
            Ok(ResourceEntry {
                key,
                flags,
                kind: EntryKind::Map { parent, values },
            })
        } else {
            cursor.seek(begin + size as usize)?;
            Ok(ResourceEntry {
                key,
                flags,
                kind: EntryKind::Simple(ResourceValue::read(cursor, strings)?),
            })
        }
    }

    /// The single value of a simple entry. Map entries have none.
    pub fn value(&self) -> Option<&ResourceValue> {
        match &self.kind {
            EntryKind::Simple(value) => value.as_ref(),
            EntryKind::Map { .. } => None,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, EntryKind::Map { .. })
    }
}

fn key_name(keys: &StringPool, idx: u32) -> ParseResult<Rc<str>> {
    // packages without their own key pool inherit names we do not have
    if keys.is_empty() || idx == NO_ENTRY_INDEX {
        return Ok(Rc::from(""));
    }
    keys.get_or_empty(idx)
}

/// Which entry indices exist for one type id.
#[derive(Clone, Debug)]
pub struct TypeSpec {
    pub id: u8,
    pub name: Rc<str>,
    pub entry_flags: Vec<u32>,
}

impl TypeSpec {
    pub fn exists(&self, index: u16) -> bool {
        (index as usize) < self.entry_flags.len()
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum OffsetLayout {
    Dense32,
    Dense16,
    Sparse,
}

/// One configuration-specific `ResTable_type` chunk. Entries are decoded on access.
#[derive(Clone, Debug)]
pub struct Type {
    pub id: u8,
    pub name: Rc<str>,
    pub flags: TypeFlags,
    pub entry_count: u32,
    pub config: ResTableConfig,
    pub(crate) data: Rc<[u8]>,
    pub(crate) offsets_start: usize,
    pub(crate) entries_start: usize,
    pub(crate) layout: OffsetLayout,
    pub(crate) key_strings: Rc<StringPool>,
    pub(crate) string_pool: Rc<StringPool>,
}

impl Type {
    pub fn locale(&self) -> Locale {
        self.config.locale()
    }

    pub fn density(&self) -> u16 {
        self.config.density
    }

    /// Decode the entry at `index`, or `None` if this configuration does not define it.
    pub fn entry(&self, index: u16) -> ParseResult<Option<ResourceEntry>> {
        let offset = match self.entry_offset(index)? {
            Some(offset) => offset,
            None => return Ok(None),
        };
        let mut cursor = ByteCursor::new(&self.data);
        let pos = self
            .entries_start
            .checked_add(offset)
            .ok_or_else(|| malformed!("entry offset overflow in type {}", self.name))?;
        cursor.seek(pos)?;
        ResourceEntry::parse(&mut cursor, &self.key_strings, &self.string_pool).map(Some)
    }

    fn entry_offset(&self, index: u16) -> ParseResult<Option<usize>> {
        let cursor = ByteCursor::new(&self.data);
        match self.layout {
            OffsetLayout::Dense32 => {
                if index as u32 >= self.entry_count {
                    return Ok(None);
                }
                let mut cursor = cursor.fork_at(self.offsets_start + index as usize * 4)?;
                let offset = cursor.read_u32()?;
                Ok((offset != NO_ENTRY_INDEX).then_some(offset as usize))
            }
            OffsetLayout::Dense16 => {
                if index as u32 >= self.entry_count {
                    return Ok(None);
                }
                let mut cursor = cursor.fork_at(self.offsets_start + index as usize * 2)?;
                let offset = cursor.read_u16()?;
                Ok((offset != 0xffff).then_some(offset as usize * 4))
            }
            OffsetLayout::Sparse => {
                // (index, offset / 4) pairs sorted by index
                let (mut low, mut high) = (0usize, self.entry_count as usize);
                while low < high {
                    let mid = (low + high) / 2;
                    let mut cursor = cursor.fork_at(self.offsets_start + mid * 4)?;
                    let entry_index = cursor.read_u16()?;
                    let offset = cursor.read_u16()?;
                    match entry_index.cmp(&index) {
                        std::cmp::Ordering::Equal => return Ok(Some(offset as usize * 4)),
                        std::cmp::Ordering::Less => low = mid + 1,
                        std::cmp::Ordering::Greater => high = mid,
                    }
                }
                Ok(None)
            }
        }
    }
}

/// A `TABLE_LIBRARY` mapping from a shared-library package id to its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryEntry {
    pub package_id: u32,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct ResourcePackage {
    pub id: u8,
    pub name: String,
    pub(crate) type_strings: Rc<StringPool>,
    pub(crate) key_strings: Rc<StringPool>,
    pub(crate) type_specs: BTreeMap<u8, TypeSpec>,
    pub(crate) types: BTreeMap<u8, Vec<Type>>,
    pub(crate) libraries: Vec<LibraryEntry>,
}

impl ResourcePackage {
    pub fn type_spec(&self, type_id: u8) -> Option<&TypeSpec> {
        self.type_specs.get(&type_id)
    }

    pub fn types(&self, type_id: u8) -> &[Type] {
        self.types.get(&type_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.type_strings.iter()
    }

    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.key_strings.iter()
    }

    pub fn libraries(&self) -> &[LibraryEntry] {
        &self.libraries
    }
}

/// One configuration-specific candidate returned by [`ResourceTable::get_resources_by_id`].
#[derive(Clone, Debug)]
pub struct Resource<'a> {
    pub id: ResourceId,
    pub type_spec: &'a TypeSpec,
    pub ty: &'a Type,
    pub entry: ResourceEntry,
}

impl Resource<'_> {
    pub fn value(&self) -> Option<&ResourceValue> {
        self.entry.value()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceTable {
    pub(crate) string_pool: Rc<StringPool>,
    pub(crate) packages: BTreeMap<u8, ResourcePackage>,
}

impl ResourceTable {
    /// The table used when an APK ships no `resources.arsc`.
    pub fn empty() -> Self {
        ResourceTable::default()
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.string_pool
    }

    pub fn package(&self, id: u8) -> Option<&ResourcePackage> {
        self.packages.get(&id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &ResourcePackage> {
        self.packages.values()
    }

    /// Every locale some Type chunk is configured for.
    pub fn locales(&self) -> BTreeSet<Locale> {
        self.packages
            .values()
            .flat_map(|pkg| pkg.types.values().flatten())
            .map(Type::locale)
            .collect()
    }

    /// All configuration-specific candidates for `id`. Choosing between them is up to
    /// the caller.
    pub fn get_resources_by_id(&self, id: u32) -> ParseResult<Vec<Resource<'_>>> {
        let rid = ResourceId(id);
        let mut resources = Vec::new();
        let package = match self.packages.get(&rid.package_id()) {
            Some(package) => package,
            None => return Ok(resources),
        };
        let type_spec = match package.type_spec(rid.type_id()) {
            Some(spec) if spec.exists(rid.entry_index()) => spec,
            _ => return Ok(resources),
        };
        for ty in package.types(rid.type_id()) {
            let entry = match ty.entry(rid.entry_index())? {
                Some(entry) => entry,
                None => continue,
            };
            match entry.value() {
                None => continue,
                Some(ResourceValue::Reference(target)) if *target == id => continue,
                Some(_) => {}
            }
            resources.push(Resource {
                id: rid,
                type_spec,
                ty,
                entry,
            });
        }
        Ok(resources)
    }

    /// Render a value, resolving references against this table. Without a locale,
    /// references render symbolically as `@type/key`.
    pub fn render_value(&self, value: &ResourceValue, locale: Option<&Locale>) -> String {
        self.render_at_depth(value, locale, 0)
    }

    fn render_at_depth(&self, value: &ResourceValue, locale: Option<&Locale>, depth: usize) -> String {
        match value {
            ResourceValue::Reference(id) => self.render_reference(*id, locale, depth),
            other => other.render_plain(),
        }
    }

    fn render_reference(&self, id: u32, locale: Option<&Locale>, depth: usize) -> String {
        let fallback = || format!("resourceId:0x{id:x}");
        if depth >= MAX_REFERENCE_DEPTH {
            return fallback();
        }
        let resources = match self.get_resources_by_id(id) {
            Ok(resources) => resources,
            Err(err) => {
                warn!("failed to look up resource 0x{id:08x}: {err}");
                return fallback();
            }
        };
        let locale = match locale {
            Some(locale) => locale,
            None => {
                return resources
                    .first()
                    .map(|r| format!("@{}/{}", r.ty.name, r.entry.key))
                    .unwrap_or_else(fallback)
            }
        };
        match select_best(&resources, locale).and_then(Resource::value) {
            Some(selected) => self.render_at_depth(selected, Some(locale), depth + 1),
            None => fallback(),
        }
    }
}

/// Pick the candidate that best fits `locale`, breaking ties by the higher density and
/// then by document order.
pub fn select_best<'r, 'a>(resources: &'r [Resource<'a>], locale: &Locale) -> Option<&'r Resource<'a>> {
    let mut best: Option<(&Resource<'a>, (i32, i32))> = None;
    for resource in resources {
        let score = (
            locale.match_level(&resource.ty.locale()),
            density_level(resource.ty.density()),
        );
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((resource, score)),
        }
    }
    best.map(|(resource, _)| resource)
}
