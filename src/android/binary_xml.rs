//! Push decoder for Android binary XML (`AndroidManifest.xml`, layouts, drawables).
//!
//! The decoder never builds a tree. Each node chunk is decoded and handed to an
//! [`XmlVisitor`] in document order.

use crate::android::attrs::{attribute_token, system_attribute_name};
use crate::android::buffer::*;
use crate::android::config::Locale;
use crate::android::res_value::ResourceValue;
use crate::android::resource_table::ResourceTable;
use crate::android::string_pool::StringPool;
use crate::error::{bail_malformed, malformed, ParseResult};
use log::{debug, warn};
use std::rc::Rc;

pub const ANDROID_NAMESPACE_URI: &str = "http://schemas.android.com/apk/res/android";
/// Prefix used for attributes with no namespace or the framework namespace.
pub const ANDROID_PREFIX: &str = "android";

const MIN_ATTRIBUTE_SIZE: u16 = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlNamespace {
    pub line: u32,
    pub prefix: Option<Rc<str>>,
    pub uri: Option<Rc<str>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct XmlAttribute {
    /// `android` for the framework namespace and for attributes with no namespace,
    /// otherwise the namespace URI.
    pub namespace: Rc<str>,
    pub name: Rc<str>,
    pub raw_value: Option<Rc<str>>,
    pub typed_value: Option<ResourceValue>,
    /// The raw string if present, else the typed value rendered through the resource table.
    pub value: String,
    pub resource_id: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct XmlStartElement {
    pub line: u32,
    pub namespace: Option<Rc<str>>,
    pub name: Rc<str>,
    pub attributes: Vec<XmlAttribute>,
}

impl XmlStartElement {
    /// Find an attribute by local name, ignoring its namespace.
    pub fn attribute(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes.iter().find(|attr| &*attr.name == name)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.attribute(name).map(|attr| attr.value.as_str())
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.get_string(name) {
            Some(value) if value.eq_ignore_ascii_case("true") => true,
            Some(value) if value.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        let value = self.get_string(name)?.trim();
        match value.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => value.parse().ok(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlEndElement {
    pub line: u32,
    pub namespace: Option<Rc<str>>,
    pub name: Rc<str>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct XmlCData {
    pub line: u32,
    pub data: String,
}

/// Receives the decoded node stream.
pub trait XmlVisitor {
    fn on_namespace_start(&mut self, _namespace: &XmlNamespace) {}

    fn on_namespace_end(&mut self, _namespace: &XmlNamespace) {}

    fn on_start_element(&mut self, element: &XmlStartElement);

    fn on_end_element(&mut self, element: &XmlEndElement);

    fn on_cdata(&mut self, _cdata: &XmlCData) {}
}

/// Fans every event out to several visitors, in order.
#[derive(Default)]
pub struct CompositeVisitor<'a> {
    visitors: Vec<&'a mut dyn XmlVisitor>,
}

impl<'a> CompositeVisitor<'a> {
    pub fn new() -> Self {
        CompositeVisitor {
            visitors: Vec::new(),
        }
    }

    pub fn with(mut self, visitor: &'a mut dyn XmlVisitor) -> Self {
        self.visitors.push(visitor);
        self
    }
}

impl XmlVisitor for CompositeVisitor<'_> {
    fn on_namespace_start(&mut self, namespace: &XmlNamespace) {
        self.visitors
            .iter_mut()
            .for_each(|v| v.on_namespace_start(namespace));
    }

    fn on_namespace_end(&mut self, namespace: &XmlNamespace) {
        self.visitors
            .iter_mut()
            .for_each(|v| v.on_namespace_end(namespace));
    }

    fn on_start_element(&mut self, element: &XmlStartElement) {
        self.visitors
            .iter_mut()
            .for_each(|v| v.on_start_element(element));
    }

    fn on_end_element(&mut self, element: &XmlEndElement) {
        self.visitors
            .iter_mut()
            .for_each(|v| v.on_end_element(element));
    }

    fn on_cdata(&mut self, cdata: &XmlCData) {
        self.visitors.iter_mut().for_each(|v| v.on_cdata(cdata));
    }
}

/// Decodes one binary XML buffer, resolving attribute references against `table`.
pub struct BinaryXmlDecoder<'a> {
    data: &'a [u8],
    table: &'a ResourceTable,
    locale: Option<&'a Locale>,
}

struct DecodeState {
    pool: StringPool,
    resource_map: Vec<u32>,
    elements: Vec<(Option<Rc<str>>, Rc<str>)>,
    namespaces: Vec<XmlNamespace>,
}

impl<'a> BinaryXmlDecoder<'a> {
    pub fn new(data: &'a [u8], table: &'a ResourceTable) -> Self {
        BinaryXmlDecoder {
            data,
            table,
            locale: None,
        }
    }

    /// Locale used to pick between configuration-specific values of referenced resources.
    /// Without one, references render as `@type/key`.
    pub fn with_locale(mut self, locale: Option<&'a Locale>) -> Self {
        self.locale = locale;
        self
    }

    pub fn decode(&self, visitor: &mut dyn XmlVisitor) -> ParseResult<()> {
        if self.data.is_empty() {
            return Ok(());
        }
        let mut cursor = ByteCursor::new(self.data);
        let header = cursor.read_chunk_header()?;
        if header.chunk_type != RES_XML_TYPE && header.chunk_type != RES_NULL_TYPE {
            bail_malformed!(
                "expected binary XML chunk, found 0x{:04x}",
                header.chunk_type
            );
        }
        let doc_end = header.end();
        cursor.seek(header.body_start())?;

        let pool_header = cursor.read_chunk_header()?;
        if pool_header.chunk_type != RES_STRING_POOL_TYPE {
            bail_malformed!(
                "expected string pool after XML header, found 0x{:04x}",
                pool_header.chunk_type
            );
        }
        let mut state = DecodeState {
            pool: StringPool::parse(&mut cursor, &pool_header)?,
            resource_map: Vec::new(),
            elements: Vec::new(),
            namespaces: Vec::new(),
        };
        cursor.seek(pool_header.end())?;

        while cursor.position() < doc_end {
            let chunk = cursor.read_chunk_header()?;
            if chunk.end() > doc_end {
                bail_malformed!("chunk at 0x{:x} overruns the XML document", chunk.start);
            }
            match chunk.chunk_type {
                RES_XML_RESOURCE_MAP_TYPE => {
                    cursor.seek(chunk.body_start())?;
                    let count = chunk.body_size() / 4;
                    state.resource_map = (0..count)
                        .map(|_| cursor.read_u32())
                        .collect::<ParseResult<_>>()?;
                }
                RES_XML_START_NAMESPACE_TYPE => {
                    let namespace = self.read_namespace(&mut cursor, &chunk, &state)?;
                    visitor.on_namespace_start(&namespace);
                    state.namespaces.push(namespace);
                }
                RES_XML_END_NAMESPACE_TYPE => {
                    let namespace = self.read_namespace(&mut cursor, &chunk, &state)?;
                    match state.namespaces.last() {
                        Some(open) if open.prefix == namespace.prefix && open.uri == namespace.uri => {}
                        _ => bail_malformed!(
                            "namespace end at line {} does not match the open namespace",
                            namespace.line
                        ),
                    }
                    state.namespaces.pop();
                    visitor.on_namespace_end(&namespace);
                }
                RES_XML_START_ELEMENT_TYPE => {
                    let element = self.read_start_element(&mut cursor, &chunk, &state)?;
                    state
                        .elements
                        .push((element.namespace.clone(), Rc::clone(&element.name)));
                    visitor.on_start_element(&element);
                }
                RES_XML_END_ELEMENT_TYPE => {
                    let element = self.read_end_element(&mut cursor, &chunk, &state)?;
                    match state.elements.pop() {
                        Some((ns, name)) if ns == element.namespace && name == element.name => {}
                        _ => bail_malformed!(
                            "unbalanced end tag </{}> at line {}",
                            element.name,
                            element.line
                        ),
                    }
                    visitor.on_end_element(&element);
                }
                RES_XML_CDATA_TYPE => {
                    let cdata = self.read_cdata(&mut cursor, &chunk, &state)?;
                    visitor.on_cdata(&cdata);
                }
                t if (RES_XML_FIRST_CHUNK_TYPE..=RES_XML_LAST_CHUNK_TYPE).contains(&t) => {
                    debug!("skipping unknown XML node chunk 0x{:04x}", t);
                }
                RES_NULL_TYPE => {}
                other => bail_malformed!(
                    "unexpected chunk 0x{:04x} at 0x{:x} in binary XML",
                    other,
                    chunk.start
                ),
            }
            cursor.seek(chunk.end())?;
        }

        if let Some((_, name)) = state.elements.last() {
            bail_malformed!("element <{}> is never closed", name);
        }
        if !state.namespaces.is_empty() {
            warn!("{} namespace(s) left open at end of document", state.namespaces.len());
        }
        Ok(())
    }

    /// Read the line/comment node header and position the cursor on the node body.
    fn read_node_header(cursor: &mut ByteCursor<'_>, chunk: &ChunkHeader) -> ParseResult<u32> {
        let line = cursor.read_u32()?;
        let _comment = cursor.read_u32()?;
        cursor.seek(chunk.body_start())?;
        Ok(line)
    }

    fn read_namespace(
        &self,
        cursor: &mut ByteCursor<'_>,
        chunk: &ChunkHeader,
        state: &DecodeState,
    ) -> ParseResult<XmlNamespace> {
        let line = Self::read_node_header(cursor, chunk)?;
        let prefix = state.pool.get(cursor.read_u32()?)?;
        let uri = state.pool.get(cursor.read_u32()?)?;
        Ok(XmlNamespace { line, prefix, uri })
    }

    fn read_start_element(
        &self,
        cursor: &mut ByteCursor<'_>,
        chunk: &ChunkHeader,
        state: &DecodeState,
    ) -> ParseResult<XmlStartElement> {
        let line = Self::read_node_header(cursor, chunk)?;
        let ext_start = cursor.position();
        let namespace = state.pool.get(cursor.read_u32()?)?;
        let name = state.pool.get_or_empty(cursor.read_u32()?)?;
        let attribute_start = cursor.read_u16()?;
        let attribute_size = cursor.read_u16()?;
        let attribute_count = cursor.read_u16()?;
        let _id_index = cursor.read_u16()?;
        let _class_index = cursor.read_u16()?;
        let _style_index = cursor.read_u16()?;
        if attribute_count > 0 && attribute_size < MIN_ATTRIBUTE_SIZE {
            bail_malformed!(
                "attribute size {} too small in <{}> at line {}",
                attribute_size,
                name,
                line
            );
        }

        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for idx in 0..attribute_count as usize {
            let pos = ext_start + attribute_start as usize + idx * attribute_size as usize;
            if pos + MIN_ATTRIBUTE_SIZE as usize > chunk.end() {
                bail_malformed!("attribute #{} of <{}> overruns its chunk", idx, name);
            }
            cursor.seek(pos)?;
            attributes.push(self.read_attribute(cursor, state)?);
        }
        Ok(XmlStartElement {
            line,
            namespace,
            name,
            attributes,
        })
    }

    fn read_attribute(
        &self,
        cursor: &mut ByteCursor<'_>,
        state: &DecodeState,
    ) -> ParseResult<XmlAttribute> {
        let namespace = state.pool.get(cursor.read_u32()?)?;
        let name_index = cursor.read_u32()?;
        let raw_value = state.pool.get(cursor.read_u32()?)?;
        let typed_value = ResourceValue::read(cursor, &state.pool)?;

        let resource_id = state.resource_map.get(name_index as usize).copied();
        let mut name = state.pool.get_or_empty(name_index)?;
        if name.is_empty() {
            // some packers blank attribute names and rely on the resource map
            if let Some(id) = resource_id {
                name = match system_attribute_name(id) {
                    Some(known) => Rc::from(known),
                    None => Rc::from(format!("AttrId:0x{id:x}").as_str()),
                };
            }
        }

        let namespace: Rc<str> = match namespace {
            Some(uri) if !uri.is_empty() && &*uri != ANDROID_NAMESPACE_URI => uri,
            _ => Rc::from(ANDROID_PREFIX),
        };

        let mut value = match (&raw_value, &typed_value) {
            (Some(raw), _) => raw.to_string(),
            (None, Some(typed)) => self.table.render_value(typed, self.locale),
            (None, None) => String::new(),
        };
        if let Ok(number) = value.parse::<i64>() {
            if let Some(token) = attribute_token(&name, number as u32) {
                value = token;
            }
        }

        Ok(XmlAttribute {
            namespace,
            name,
            raw_value,
            typed_value,
            value,
            resource_id,
        })
    }

    fn read_end_element(
        &self,
        cursor: &mut ByteCursor<'_>,
        chunk: &ChunkHeader,
        state: &DecodeState,
    ) -> ParseResult<XmlEndElement> {
        let line = Self::read_node_header(cursor, chunk)?;
        let namespace = state.pool.get(cursor.read_u32()?)?;
        let name = state.pool.get_or_empty(cursor.read_u32()?)?;
        Ok(XmlEndElement {
            line,
            namespace,
            name,
        })
    }

    fn read_cdata(
        &self,
        cursor: &mut ByteCursor<'_>,
        chunk: &ChunkHeader,
        state: &DecodeState,
    ) -> ParseResult<XmlCData> {
        let line = Self::read_node_header(cursor, chunk)?;
        let raw = state.pool.get(cursor.read_u32()?)?;
        let typed = ResourceValue::read(cursor, &state.pool)?;
        let data = match (raw, typed) {
            (Some(raw), _) => raw.to_string(),
            (None, Some(typed)) => self.table.render_value(&typed, self.locale),
            (None, None) => return Err(malformed!("empty CDATA node at line {}", line)),
        };
        Ok(XmlCData { line, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android::res_value::{TYPE_INT_BOOLEAN, TYPE_INT_DEC};
    use crate::error::ErrorKind;
    use crate::tests::fixtures::{AttrValue, XmlBuilder};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl XmlVisitor for Recorder {
        fn on_namespace_start(&mut self, namespace: &XmlNamespace) {
            self.events
                .push(format!("ns+ {}", namespace.prefix.as_deref().unwrap_or("")));
        }

        fn on_namespace_end(&mut self, namespace: &XmlNamespace) {
            self.events
                .push(format!("ns- {}", namespace.prefix.as_deref().unwrap_or("")));
        }

        fn on_start_element(&mut self, element: &XmlStartElement) {
            let attrs: Vec<String> = element
                .attributes
                .iter()
                .map(|a| format!("{}:{}={}", a.namespace, a.name, a.value))
                .collect();
            self.events
                .push(format!("<{} {}>", element.name, attrs.join(" ")));
        }

        fn on_end_element(&mut self, element: &XmlEndElement) {
            self.events.push(format!("</{}>", element.name));
        }

        fn on_cdata(&mut self, cdata: &XmlCData) {
            self.events.push(format!("text {}", cdata.data));
        }
    }

    fn decode(data: &[u8]) -> ParseResult<Vec<String>> {
        let table = ResourceTable::empty();
        let mut recorder = Recorder::default();
        BinaryXmlDecoder::new(data, &table).decode(&mut recorder)?;
        Ok(recorder.events)
    }

    #[test]
    fn streams_events_in_document_order() {
        let mut xml = XmlBuilder::new();
        xml.start_namespace("android", ANDROID_NAMESPACE_URI);
        xml.start_element(
            "manifest",
            vec![
                XmlBuilder::attr(None, "package", None, AttrValue::Str("com.example".into())),
                XmlBuilder::android_attr("versionCode", 0x0101_021b, AttrValue::Int(TYPE_INT_DEC, 7)),
            ],
        );
        xml.start_element(
            "application",
            vec![XmlBuilder::android_attr(
                "debuggable",
                0x0101_000f,
                AttrValue::Int(TYPE_INT_BOOLEAN, 0xffff_ffff),
            )],
        );
        xml.cdata("hello");
        xml.end_element("application");
        xml.end_element("manifest");
        xml.end_namespace("android", ANDROID_NAMESPACE_URI);

        let events = decode(&xml.build()).expect("decode");
        assert_eq!(
            events,
            vec![
                "ns+ android",
                "<manifest android:package=com.example android:versionCode=7>",
                "<application android:debuggable=true>",
                "text hello",
                "</application>",
                "</manifest>",
                "ns- android",
            ]
        );
    }

    #[test]
    fn blank_names_fall_back_to_resource_map() {
        let mut xml = XmlBuilder::new();
        xml.blank_attribute_names();
        xml.start_element(
            "manifest",
            vec![
                XmlBuilder::android_attr("versionCode", 0x0101_021b, AttrValue::Int(TYPE_INT_DEC, 3)),
                XmlBuilder::android_attr("mystery", 0x0101_7777, AttrValue::Int(TYPE_INT_DEC, 1)),
            ],
        );
        xml.end_element("manifest");
        let events = decode(&xml.build()).expect("decode");
        assert_eq!(
            events[0],
            "<manifest android:versionCode=3 android:AttrId:0x1017777=1>"
        );
    }

    #[test]
    fn numeric_enum_attributes_get_tokens() {
        let mut xml = XmlBuilder::new();
        xml.start_element(
            "activity",
            vec![
                XmlBuilder::android_attr("screenOrientation", 0x0101_001e, AttrValue::Int(TYPE_INT_DEC, 1)),
                XmlBuilder::android_attr("launchMode", 0x0101_001d, AttrValue::Int(TYPE_INT_DEC, 2)),
            ],
        );
        xml.end_element("activity");
        let events = decode(&xml.build()).expect("decode");
        assert_eq!(
            events[0],
            "<activity android:screenOrientation=portrait android:launchMode=singleTask>"
        );
    }

    #[test]
    fn mismatched_end_tag_is_rejected() {
        let mut xml = XmlBuilder::new();
        xml.start_element("manifest", vec![]);
        xml.end_element("application");
        let err = decode(&xml.build()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedChunk);
    }

    #[test]
    fn unknown_top_level_chunk_is_rejected() {
        let mut xml = XmlBuilder::new();
        xml.start_element("manifest", vec![]);
        xml.raw_chunk(0x0777, &[0u8; 8]);
        xml.end_element("manifest");
        let err = decode(&xml.build()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedChunk);
    }

    #[test]
    fn unknown_node_chunks_are_skipped() {
        let mut xml = XmlBuilder::new();
        xml.start_element("manifest", vec![]);
        xml.raw_chunk(0x0150, &[0u8; 8]);
        xml.end_element("manifest");
        assert_eq!(decode(&xml.build()).expect("decode").len(), 2);
    }
}
