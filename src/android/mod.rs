//! Android binary formats: the compiled resource table (`resources.arsc`), binary XML
//! (`AndroidManifest.xml`, drawables, layouts) and the in-memory APK archive.

pub mod attrs;
pub mod binary_xml;
pub mod buffer;
pub mod config;
pub mod icon;
pub mod manifest;
pub mod res_value;
pub mod resource_table;
pub mod string_pool;
pub(crate) mod table_parser;
pub mod xml_translator;
pub mod zip;
