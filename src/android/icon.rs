//! Icon variants and the visitor that reads adaptive-icon descriptors.

use crate::android::binary_xml::{XmlEndElement, XmlStartElement, XmlVisitor};
use crate::android::config::{DENSITY_ANY, DENSITY_DEFAULT, DENSITY_NONE};
use crate::error::{ParseError, ParseResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;

/// Density of an icon file. The non-`Dpi` variants are markers, never selection metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum IconDensity {
    /// A configuration density, `0` for the default configuration.
    Dpi(u16),
    /// Vector drawables scale to every density.
    Vector,
    /// Plain colours have no density.
    None,
    /// Adaptive icons are composed from two other icons.
    Composite,
}

impl IconDensity {
    /// Map a `ResTable_config` density, folding the `any`/`none` codes into markers.
    pub fn from_config(density: u16) -> Self {
        match density {
            DENSITY_ANY => IconDensity::Vector,
            DENSITY_NONE => IconDensity::None,
            dpi => IconDensity::Dpi(dpi),
        }
    }

    pub fn is_default(self) -> bool {
        self == IconDensity::Dpi(DENSITY_DEFAULT)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ApkIcon {
    Raster {
        path: String,
        density: IconDensity,
        #[serde(skip)]
        data: Vec<u8>,
    },
    Vector {
        path: String,
        xml: String,
    },
    Color {
        value: String,
    },
    Adaptive {
        path: String,
        foreground: Option<Box<ApkIcon>>,
        background: Option<Box<ApkIcon>>,
    },
    Empty {
        path: Option<String>,
    },
}

impl ApkIcon {
    pub fn density(&self) -> IconDensity {
        match self {
            ApkIcon::Raster { density, .. } => *density,
            ApkIcon::Vector { .. } => IconDensity::Vector,
            ApkIcon::Color { .. } | ApkIcon::Empty { .. } => IconDensity::None,
            ApkIcon::Adaptive { .. } => IconDensity::Composite,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            ApkIcon::Raster { path, .. }
            | ApkIcon::Vector { path, .. }
            | ApkIcon::Adaptive { path, .. } => Some(path),
            ApkIcon::Color { .. } => None,
            ApkIcon::Empty { path } => path.as_deref(),
        }
    }
}

/// Layers of an `<adaptive-icon>` descriptor, as rendered attribute values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdaptiveIconLayers {
    pub background: Option<String>,
    pub foreground: Option<String>,
    pub monochrome: Option<String>,
}

/// Records the root tag of a drawable XML and the layer drawables of an adaptive icon.
#[derive(Debug, Default)]
pub struct IconExtractor {
    root: Option<String>,
    depth: usize,
    layers: AdaptiveIconLayers,
}

impl IconExtractor {
    pub fn new() -> Self {
        IconExtractor::default()
    }

    pub fn root_tag(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn is_adaptive(&self) -> bool {
        self.root.as_deref() == Some("adaptive-icon")
    }

    pub fn layers(&self) -> &AdaptiveIconLayers {
        &self.layers
    }

    fn layer_drawable(element: &XmlStartElement) -> Option<String> {
        element
            .get_string("drawable")
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

impl XmlVisitor for IconExtractor {
    fn on_start_element(&mut self, element: &XmlStartElement) {
        self.depth += 1;
        if self.depth == 1 {
            self.root = Some(element.name.to_string());
            return;
        }
        // layers sit directly under the root
        if self.depth != 2 || !self.is_adaptive() {
            return;
        }
        let slot = match &*element.name {
            "background" => &mut self.layers.background,
            "foreground" => &mut self.layers.foreground,
            "monochrome" => &mut self.layers.monochrome,
            _ => return,
        };
        if slot.is_none() {
            *slot = Self::layer_drawable(element);
        }
    }

    fn on_end_element(&mut self, _element: &XmlEndElement) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Check that reconstructed drawable text has a `<vector>` root.
pub fn validate_vector(path: &str, xml: &str) -> ParseResult<()> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                return if tag.name().as_ref() == b"vector" {
                    Ok(())
                } else {
                    Err(ParseError::UnsupportedVectorIcon(format!(
                        "{path}: root element is <{}>",
                        String::from_utf8_lossy(tag.name().as_ref())
                    )))
                };
            }
            Ok(Event::Eof) => {
                return Err(ParseError::UnsupportedVectorIcon(format!(
                    "{path}: no root element"
                )))
            }
            Ok(_) => {}
            Err(err) => {
                return Err(ParseError::UnsupportedVectorIcon(format!("{path}: {err}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android::binary_xml::BinaryXmlDecoder;
    use crate::android::resource_table::ResourceTable;
    use crate::error::ErrorKind;
    use crate::tests::fixtures::{AttrValue, XmlBuilder};

    #[test]
    fn density_markers() {
        assert_eq!(IconDensity::from_config(320), IconDensity::Dpi(320));
        assert_eq!(IconDensity::from_config(DENSITY_ANY), IconDensity::Vector);
        assert_eq!(IconDensity::from_config(DENSITY_NONE), IconDensity::None);
        assert!(IconDensity::from_config(0).is_default());
        let color = ApkIcon::Color {
            value: "#ff000000".into(),
        };
        assert_eq!(color.density(), IconDensity::None);
        assert_eq!(color.path(), None);
    }

    #[test]
    fn extracts_adaptive_layers() {
        let mut xml = XmlBuilder::new();
        xml.start_element("adaptive-icon", vec![]);
        xml.start_element(
            "background",
            vec![XmlBuilder::android_attr("drawable", 0x0101_0199, AttrValue::Str("#ffffff".into()))],
        );
        xml.end_element("background");
        xml.start_element(
            "foreground",
            vec![XmlBuilder::android_attr(
                "drawable",
                0x0101_0199,
                AttrValue::Str("res/drawable/fg.png".into()),
            )],
        );
        xml.end_element("foreground");
        xml.end_element("adaptive-icon");

        let table = ResourceTable::empty();
        let mut extractor = IconExtractor::new();
        BinaryXmlDecoder::new(&xml.build(), &table)
            .decode(&mut extractor)
            .expect("decode");
        assert!(extractor.is_adaptive());
        assert_eq!(extractor.layers().background.as_deref(), Some("#ffffff"));
        assert_eq!(extractor.layers().foreground.as_deref(), Some("res/drawable/fg.png"));
        assert_eq!(extractor.layers().monochrome, None);
    }

    #[test]
    fn other_roots_are_not_adaptive() {
        let mut xml = XmlBuilder::new();
        xml.start_element("vector", vec![]);
        xml.start_element(
            "background",
            vec![XmlBuilder::android_attr("drawable", 0x0101_0199, AttrValue::Str("x".into()))],
        );
        xml.end_element("background");
        xml.end_element("vector");

        let table = ResourceTable::empty();
        let mut extractor = IconExtractor::new();
        BinaryXmlDecoder::new(&xml.build(), &table)
            .decode(&mut extractor)
            .expect("decode");
        assert_eq!(extractor.root_tag(), Some("vector"));
        assert!(!extractor.is_adaptive());
        assert_eq!(extractor.layers(), &AdaptiveIconLayers::default());
    }

    #[test]
    fn vector_validation() {
        let ok = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<vector android:width=\"24dp\">\n</vector>\n";
        assert!(validate_vector("res/drawable/v.xml", ok).is_ok());

        let shape = "<?xml version=\"1.0\"?>\n<shape />\n";
        let err = validate_vector("res/drawable/s.xml", shape).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVectorIcon);

        let err = validate_vector("res/drawable/e.xml", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVectorIcon);
    }
}
