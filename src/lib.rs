//! # apkmeta
//!
//! A library for reading metadata out of Android APK files: the manifest, the compiled
//! resource table, application icons and the certificates of v1, v2 and v3 signers.
//!
//! ```no_run
//!  use apkmeta::{ApkParser, Locale};
//!
//!  let mut apk = ApkParser::open("app-release.apk").unwrap();
//!  apk.set_preferred_locale(Locale::new("en", "US"));
//!  let meta = apk.apk_meta().unwrap();
//!  println!("{:?} {:?}", meta.package_name, meta.version_name);
//!  for signer in apk.signers().unwrap() {
//!      println!("{}: {} certificate(s)", signer.path, signer.certificates.len());
//!  }
//! ```

pub mod android;
pub mod apk;
pub mod asn1;
pub mod error;
pub mod signing;
mod tests;

pub use android::config::Locale;
pub use android::icon::{ApkIcon, IconDensity};
pub use android::manifest::{ApkMeta, GlEsVersion, IconPath, Permission, UseFeature};
pub use android::resource_table::ResourceTable;
pub use android::zip::ApkFile;
pub use apk::{ApkParser, ArchiveSource, ParseOptions};
pub use error::{ErrorKind, ParseError, ParseResult};
pub use signing::{ApkSigner, ApkV2Signer, CertificateBackend, CertificateMeta};
