//! Rebuilds indented, namespace-aware XML text from the binary XML event stream.

use crate::android::binary_xml::{
    XmlCData, XmlEndElement, XmlNamespace, XmlStartElement, XmlVisitor,
};
use quick_xml::escape::escape;
use std::rc::Rc;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Namespaces currently in scope, plus the ones declared since the last start tag.
#[derive(Debug, Default)]
struct Namespaces {
    in_scope: Vec<XmlNamespace>,
    pending: Vec<XmlNamespace>,
}

impl Namespaces {
    fn add(&mut self, namespace: &XmlNamespace) {
        self.in_scope.push(namespace.clone());
        self.pending.push(namespace.clone());
    }

    fn remove(&mut self, namespace: &XmlNamespace) {
        let same = |ns: &XmlNamespace| ns.prefix == namespace.prefix && ns.uri == namespace.uri;
        if let Some(idx) = self.in_scope.iter().rposition(same) {
            self.in_scope.remove(idx);
        }
        self.pending.retain(|ns| !same(ns));
    }

    fn prefix_for(&self, uri: &str) -> Option<Rc<str>> {
        self.in_scope
            .iter()
            .rev()
            .find(|ns| ns.uri.as_deref() == Some(uri))
            .and_then(|ns| ns.prefix.clone())
    }

    fn take_pending(&mut self) -> Vec<XmlNamespace> {
        std::mem::take(&mut self.pending)
    }
}

/// An [`XmlVisitor`] that writes XML text.
#[derive(Debug)]
pub struct XmlTranslator {
    out: String,
    depth: usize,
    namespaces: Namespaces,
    start_tag_open: bool,
}

impl Default for XmlTranslator {
    fn default() -> Self {
        XmlTranslator::new()
    }
}

impl XmlTranslator {
    pub fn new() -> Self {
        XmlTranslator {
            out: String::from(XML_DECLARATION),
            depth: 0,
            namespaces: Namespaces::default(),
            start_tag_open: false,
        }
    }

    pub fn xml(&self) -> &str {
        &self.out
    }

    pub fn into_xml(self) -> String {
        self.out
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
    }

    fn close_open_start_tag(&mut self) {
        if self.start_tag_open {
            self.out.push_str(">\n");
            self.start_tag_open = false;
        }
    }

    fn qualified(&self, namespace: Option<&str>, name: &str) -> String {
        match namespace {
            Some(ns) if !ns.is_empty() => {
                let prefix = self.namespaces.prefix_for(ns);
                format!("{}:{}", prefix.as_deref().unwrap_or(ns), name)
            }
            _ => name.to_string(),
        }
    }
}

impl XmlVisitor for XmlTranslator {
    fn on_namespace_start(&mut self, namespace: &XmlNamespace) {
        self.namespaces.add(namespace);
    }

    fn on_namespace_end(&mut self, namespace: &XmlNamespace) {
        self.namespaces.remove(namespace);
    }

    fn on_start_element(&mut self, element: &XmlStartElement) {
        self.close_open_start_tag();
        self.indent();
        let tag = self.qualified(element.namespace.as_deref(), &element.name);
        self.out.push('<');
        self.out.push_str(&tag);

        for ns in self.namespaces.take_pending() {
            let prefix = ns.prefix.as_deref().unwrap_or("");
            let uri = ns.uri.as_deref().unwrap_or("");
            self.out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(uri)));
        }
        for attr in &element.attributes {
            let name = self.qualified(Some(&*attr.namespace), &attr.name);
            self.out
                .push_str(&format!(" {}=\"{}\"", name, escape(attr.value.as_str())));
        }
        self.start_tag_open = true;
        self.depth += 1;
    }

    fn on_end_element(&mut self, element: &XmlEndElement) {
        self.depth = self.depth.saturating_sub(1);
        if self.start_tag_open {
            self.out.push_str(" />\n");
            self.start_tag_open = false;
            return;
        }
        self.indent();
        let tag = self.qualified(element.namespace.as_deref(), &element.name);
        self.out.push_str(&format!("</{tag}>\n"));
    }

    fn on_cdata(&mut self, cdata: &XmlCData) {
        self.close_open_start_tag();
        self.indent();
        self.out.push_str(&escape(cdata.data.as_str()));
        self.out.push('\n');
    }
}
