//! The APK façade: ties the archive, the resource table, the manifest and the signatures
//! together and memoizes everything that is expensive to decode.
//!
//! An [`ApkParser`] is single-threaded. Each cached value is computed on first access; changing
//! the preferred locale drops only the manifest-derived state, never the resource table.

use crate::android::binary_xml::{BinaryXmlDecoder, CompositeVisitor};
use crate::android::config::Locale;
use crate::android::icon::{validate_vector, ApkIcon, IconDensity, IconExtractor};
use crate::android::manifest::{ApkMeta, ApkMetaTranslator, IconPath};
use crate::android::resource_table::ResourceTable;
use crate::android::xml_translator::XmlTranslator;
use crate::android::zip::ApkFile;
use crate::error::{ParseError, ParseResult};
use crate::signing::{
    find_signing_block, parse_certificates, parse_pkcs7, parse_signing_block, ApkSigner,
    ApkV2Signer, CertificateBackend,
};
use log::{debug, warn};
use once_cell::unsync::OnceCell;
use std::collections::BTreeSet;
use std::path::Path;

pub const MANIFEST_PATH: &str = "AndroidManifest.xml";
pub const RESOURCE_TABLE_PATH: &str = "resources.arsc";

/// Adaptive icons may point at other adaptive icons; stop following them after this many hops.
const MAX_ICON_DEPTH: usize = 4;

/// Where the façade gets its bytes from.
pub trait ArchiveSource {
    /// Contents of one entry, `None` when the archive has no such entry.
    fn file_data(&self, path: &str) -> ParseResult<Option<Vec<u8>>>;

    /// The complete archive, for the signing block scan.
    fn whole_file(&self) -> ParseResult<Vec<u8>>;

    /// Every `.RSA`/`.DSA` signature file with its contents.
    fn certificate_entries(&self) -> ParseResult<Vec<(String, Vec<u8>)>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// Locale used to resolve string and resource references in the manifest.
    pub preferred_locale: Locale,
    pub certificate_backend: CertificateBackend,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            preferred_locale: Locale::any(),
            certificate_backend: CertificateBackend::default(),
        }
    }
}

impl ParseOptions {
    pub fn with_preferred_locale(mut self, locale: Locale) -> Self {
        self.preferred_locale = locale;
        self
    }

    pub fn with_certificate_backend(mut self, backend: CertificateBackend) -> Self {
        self.certificate_backend = backend;
        self
    }
}

/// Everything derived from `AndroidManifest.xml` under the current locale.
struct ManifestState {
    xml: String,
    meta: ApkMeta,
    icon_paths: Vec<IconPath>,
}

pub struct ApkParser<A: ArchiveSource> {
    source: A,
    options: ParseOptions,
    resource_table: OnceCell<ResourceTable>,
    manifest: OnceCell<ManifestState>,
    signers: OnceCell<Vec<ApkSigner>>,
    v2_signers: OnceCell<Vec<ApkV2Signer>>,
}

impl ApkParser<ApkFile> {
    /// Read an APK from disk.
    pub fn open(path: impl AsRef<Path>) -> ParseResult<Self> {
        Ok(ApkParser::new(ApkFile::from_file(path)?))
    }
}

impl<A: ArchiveSource> ApkParser<A> {
    pub fn new(source: A) -> Self {
        ApkParser::with_options(source, ParseOptions::default())
    }

    pub fn with_options(source: A, options: ParseOptions) -> Self {
        ApkParser {
            source,
            options,
            resource_table: OnceCell::new(),
            manifest: OnceCell::new(),
            signers: OnceCell::new(),
            v2_signers: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &A {
        &self.source
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn preferred_locale(&self) -> &Locale {
        &self.options.preferred_locale
    }

    pub fn set_preferred_locale(&mut self, locale: Locale) {
        if self.options.preferred_locale != locale {
            self.options.preferred_locale = locale;
            self.invalidate();
        }
    }

    /// Drop the manifest-derived state so the next access re-translates it.
    pub fn invalidate(&mut self) {
        self.manifest.take();
    }

    /// The decoded `resources.arsc`, or an empty table when the APK has none.
    pub fn resource_table(&self) -> ParseResult<&ResourceTable> {
        self.resource_table.get_or_try_init(|| {
            match self.source.file_data(RESOURCE_TABLE_PATH)? {
                Some(data) => ResourceTable::parse(data),
                None => {
                    debug!("no {RESOURCE_TABLE_PATH}, using an empty resource table");
                    Ok(ResourceTable::empty())
                }
            }
        })
    }

    /// Locales the resource table has configurations for.
    pub fn locales(&self) -> ParseResult<BTreeSet<Locale>> {
        Ok(self.resource_table()?.locales())
    }

    fn manifest(&self) -> ParseResult<&ManifestState> {
        self.manifest.get_or_try_init(|| {
            let data = self
                .source
                .file_data(MANIFEST_PATH)?
                .ok_or_else(|| ParseError::MissingEntry(MANIFEST_PATH.to_string()))?;
            let table = self.resource_table()?;
            let locale = Some(&self.options.preferred_locale);
            let mut translator = XmlTranslator::new();
            let mut meta = ApkMetaTranslator::new(table, locale);
            BinaryXmlDecoder::new(&data, table)
                .with_locale(locale)
                .decode(&mut CompositeVisitor::new().with(&mut translator).with(&mut meta))?;
            let (meta, icon_paths) = meta.into_parts();
            Ok(ManifestState {
                xml: translator.into_xml(),
                meta,
                icon_paths,
            })
        })
    }

    /// The manifest rendered as indented XML text.
    pub fn manifest_xml(&self) -> ParseResult<&str> {
        Ok(self.manifest()?.xml.as_str())
    }

    pub fn apk_meta(&self) -> ParseResult<&ApkMeta> {
        Ok(&self.manifest()?.meta)
    }

    /// Every configuration-specific file the application icon resolves to.
    pub fn icon_paths(&self) -> ParseResult<&[IconPath]> {
        Ok(self.manifest()?.icon_paths.as_slice())
    }

    /// Load every application icon candidate. A broken icon is reported in its own slot and
    /// does not affect the others.
    pub fn icons(&self) -> ParseResult<Vec<ParseResult<ApkIcon>>> {
        let icons = self
            .icon_paths()?
            .iter()
            .map(|icon| self.load_icon(&icon.path, IconDensity::from_config(icon.density), 0))
            .collect();
        Ok(icons)
    }

    fn load_icon(&self, path: &str, density: IconDensity, depth: usize) -> ParseResult<ApkIcon> {
        if path.starts_with('#') {
            return Ok(ApkIcon::Color {
                value: path.to_string(),
            });
        }
        if path.is_empty() {
            return Ok(ApkIcon::Empty { path: None });
        }
        let data = match self.source.file_data(path)? {
            Some(data) => data,
            None => {
                debug!("icon {path} is not in the archive");
                return Ok(ApkIcon::Empty {
                    path: Some(path.to_string()),
                });
            }
        };
        if !path.ends_with(".xml") {
            return Ok(ApkIcon::Raster {
                path: path.to_string(),
                density,
                data,
            });
        }

        let table = self.resource_table()?;
        let locale = Some(&self.options.preferred_locale);
        let mut extractor = IconExtractor::new();
        let mut translator = XmlTranslator::new();
        BinaryXmlDecoder::new(&data, table)
            .with_locale(locale)
            .decode(&mut CompositeVisitor::new().with(&mut extractor).with(&mut translator))?;

        if !extractor.is_adaptive() {
            let xml = translator.into_xml();
            validate_vector(path, &xml)?;
            return Ok(ApkIcon::Vector {
                path: path.to_string(),
                xml,
            });
        }
        if depth >= MAX_ICON_DEPTH {
            warn!("adaptive icon {path} nests too deeply, not following its layers");
            return Ok(ApkIcon::Empty {
                path: Some(path.to_string()),
            });
        }
        let layers = extractor.layers();
        let layer = |layer: Option<&String>| -> Option<Box<ApkIcon>> {
            let layer = layer?;
            match self.load_icon(layer, density, depth + 1) {
                Ok(icon) => Some(Box::new(icon)),
                Err(err) => {
                    warn!("adaptive icon {path}: layer {layer} failed: {err}");
                    None
                }
            }
        };
        Ok(ApkIcon::Adaptive {
            path: path.to_string(),
            foreground: layer(layers.foreground.as_ref()),
            background: layer(layers.background.as_ref()),
        })
    }

    /// Render any binary XML entry (layouts, drawables, ...) as text. `None` when the entry
    /// does not exist.
    pub fn trans_binary_xml(&self, path: &str) -> ParseResult<Option<String>> {
        let data = match self.source.file_data(path)? {
            Some(data) => data,
            None => return Ok(None),
        };
        let table = self.resource_table()?;
        let mut translator = XmlTranslator::new();
        BinaryXmlDecoder::new(&data, table)
            .with_locale(Some(&self.options.preferred_locale))
            .decode(&mut translator)?;
        Ok(Some(translator.into_xml()))
    }

    /// v1 signers, one per signature file. Files that fail to decode are logged and skipped.
    pub fn signers(&self) -> ParseResult<&[ApkSigner]> {
        let signers = self.signers.get_or_try_init(|| {
            let mut signers = Vec::new();
            for (path, data) in self.source.certificate_entries()? {
                match parse_pkcs7(&data, self.options.certificate_backend) {
                    Ok(certificates) => signers.push(ApkSigner { path, certificates }),
                    Err(err) => warn!("skipping signature file {path}: {err}"),
                }
            }
            Ok::<_, ParseError>(signers)
        })?;
        Ok(signers.as_slice())
    }

    /// The id/value pair area of the APK Signing Block, if the archive carries one.
    pub fn signing_block(&self) -> ParseResult<Option<Vec<u8>>> {
        let data = self.source.whole_file()?;
        Ok(find_signing_block(&data)?.map(<[u8]>::to_vec))
    }

    /// v2 and v3 signers from the signing block. A signer whose certificates fail to decode is
    /// logged and skipped.
    pub fn v2_signers(&self) -> ParseResult<&[ApkV2Signer]> {
        let signers = self.v2_signers.get_or_try_init(|| {
            let pairs = match self.signing_block()? {
                Some(pairs) => pairs,
                None => return Ok(Vec::new()),
            };
            let mut signers = Vec::new();
            for block in parse_signing_block(&pairs)? {
                match parse_certificates(&block.certificates, self.options.certificate_backend) {
                    Ok(certificates) => signers.push(ApkV2Signer {
                        scheme: block.scheme,
                        min_sdk: block.min_sdk,
                        max_sdk: block.max_sdk,
                        certificates,
                    }),
                    Err(err) => warn!("skipping {:?} signer: {err}", block.scheme),
                }
            }
            Ok::<_, ParseError>(signers)
        })?;
        Ok(signers.as_slice())
    }
}
