use crate::apk::ArchiveSource;
use crate::error::ParseResult;
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path};
use zip::read::ZipArchive;

/// Compression used by an APK entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApkCompression {
    Stored,
    Deflated,
    Other,
}

/// A single file entry stored in [`ApkFile`].
#[derive(Clone, Debug)]
pub struct ApkEntry {
    pub data: Vec<u8>,
    pub compression: ApkCompression,
}

/// An in-memory, read-only view of an APK (ZIP) file.
///
/// Entries live in a deterministic `BTreeMap`; the raw archive bytes are kept as well for the
/// signing block scan.
pub struct ApkFile {
    raw: Vec<u8>,
    entries: BTreeMap<String, ApkEntry>,
}

impl ApkFile {
    /// Load an APK from disk into memory.
    pub fn from_file(path: impl AsRef<Path>) -> ParseResult<Self> {
        ApkFile::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(raw: Vec<u8>) -> ParseResult<Self> {
        let entries = read_entries(&raw)?;
        Ok(ApkFile { raw, entries })
    }

    /// Iterate over entry names.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Borrow an entry by name (e.g., `AndroidManifest.xml`).
    pub fn entry(&self, name: &str) -> Option<&ApkEntry> {
        self.entries.get(name)
    }
}

impl ArchiveSource for ApkFile {
    fn file_data(&self, path: &str) -> ParseResult<Option<Vec<u8>>> {
        Ok(self.entries.get(path).map(|entry| entry.data.clone()))
    }

    fn whole_file(&self) -> ParseResult<Vec<u8>> {
        Ok(self.raw.clone())
    }

    fn certificate_entries(&self) -> ParseResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .iter()
            .filter(|(name, _)| is_signature_file(name))
            .map(|(name, entry)| (name.clone(), entry.data.clone()))
            .collect())
    }
}

fn read_entries(raw: &[u8]) -> ParseResult<BTreeMap<String, ApkEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(raw))?;
    let mut entries = BTreeMap::new();
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry_name(entry.name()) else {
            debug!("skipping entry with unsafe name {:?}", entry.name());
            continue;
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        let compression = match entry.compression() {
            zip::CompressionMethod::Stored => ApkCompression::Stored,
            zip::CompressionMethod::Deflated => ApkCompression::Deflated,
            _ => ApkCompression::Other,
        };
        entries.insert(name, ApkEntry { data, compression });
    }
    Ok(entries)
}

/// `META-INF/CERT.RSA` style signature files, matched case-insensitively.
pub fn is_signature_file(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.ends_with(".RSA") || upper.ends_with(".DSA")
}

/// Normalize an archive path, rejecting absolute paths and parent components.
fn entry_name(raw: &str) -> Option<String> {
    let mut components = Vec::new();
    for comp in Path::new(raw).components() {
        match comp {
            Component::Normal(part) => components.push(part.to_string_lossy().replace('\\', "/")),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => return None,
        }
    }
    if components.is_empty() {
        return None;
    }
    Some(components.join("/"))
}
