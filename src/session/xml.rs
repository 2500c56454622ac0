//! Minimal XML element tree
//!
//! Device descriptions, SCPD documents, SOAP envelopes and host lists are
//! all small, so they are read into a tree once and navigated by local
//! name. Namespaces are ignored.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::{Error, Result};

/// An XML element with its text content and child elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name (namespace prefix stripped)
    pub name: String,
    /// Concatenated text content directly inside this element
    pub text: String,
    /// Child elements in document order
    pub children: Vec<Element>,
}

impl Element {
    /// First direct child with the given local name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first direct child with the given name
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    /// Depth-first search for the first descendant with the given name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Self> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Follow a path of direct child names
    #[must_use]
    pub fn path(&self, names: &[&str]) -> Option<&Self> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }
}

/// Parse a document and return its root element
///
/// # Errors
///
/// Returns [`Error::Xml`] if the document is malformed or empty
pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Synthetic document node; the real root becomes its only child
    let mut stack = vec![Element::default()];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(Element {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).to_string(),
                    ..Element::default()
                });
            }
            Ok(Event::Empty(e)) => {
                let element = Element {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).to_string(),
                    ..Element::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(Error::Xml("unbalanced closing tag".to_string()));
                }
                if let Some(done) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(done);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::Xml(format!("bad text: {err}")))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(Error::Xml("unexpected end of document".to_string()));
    }

    stack
        .pop()
        .and_then(|doc| doc.children.into_iter().next())
        .ok_or_else(|| Error::Xml("empty document".to_string()))
}

/// Escape text for inclusion in an element body
#[must_use]
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}
