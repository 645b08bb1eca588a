//! Owned XML element tree built from `quick-xml` events.
//!
//! E-utilities and PubTator responses are held in memory whole; callers look
//! elements up by child path or scan descendants by tag name.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::CurateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, CurateError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| CurateError::Xml(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| CurateError::Xml(err.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |element| element.name == name)
    }

    /// Every element matching a slash-separated path of child names, in
    /// document order.
    pub fn find_all<'a>(&'a self, path: &str) -> Vec<&'a Element> {
        let mut current = vec![self];
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|element| element.elements().filter(move |e| e.name == segment))
                .collect();
        }
        current
    }

    pub fn find<'a>(&'a self, path: &str) -> Option<&'a Element> {
        self.find_all(path).into_iter().next()
    }

    /// Trimmed text of the first element on `path`; empty when missing.
    pub fn find_text(&self, path: &str) -> String {
        self.find(path).map(Element::text).unwrap_or_default()
    }

    /// Text nodes directly under this element, trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            if let Node::Text(value) = node {
                text.push_str(value);
            }
        }
        text.trim().to_string()
    }

    /// All text under this element including nested markup, trimmed.
    pub fn inner_text(&self) -> String {
        let mut text = String::new();
        collect_text(self, &mut text);
        text.trim().to_string()
    }

    /// Descendant elements in pre-order, excluding `self`.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut items = Vec::new();
        let mut stack: Vec<&Element> = self.elements().collect();
        stack.reverse();
        while let Some(element) = stack.pop() {
            items.push(element);
            let mut children: Vec<&Element> = element.elements().collect();
            children.reverse();
            stack.extend(children);
        }
        items
    }

    /// `self` followed by its descendants.
    pub fn iter(&self) -> Vec<&Element> {
        let mut items = vec![self];
        items.extend(self.descendants());
        items
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(value) => out.push_str(value),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

pub fn parse(xml: &str) -> Result<Element, CurateError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|err| {
            CurateError::Xml(format!(
                "{err} at position {}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(ref start) => {
                stack.push(Element::from_start(start)?);
            }
            Event::Empty(ref start) => {
                let element = Element::from_start(start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CurateError::Xml("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(ref text) => {
                if let Some(parent) = stack.last_mut() {
                    let value = match text.unescape() {
                        Ok(value) => value.into_owned(),
                        Err(_) => String::from_utf8_lossy(text).into_owned(),
                    };
                    parent.children.push(Node::Text(value));
                }
            }
            Event::CData(cdata) => {
                if let Some(parent) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                    parent.children.push(Node::Text(value));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(CurateError::Xml("unclosed element at end of input".to_string()));
    }
    root.ok_or_else(|| CurateError::Xml("document has no root element".to_string()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), CurateError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(CurateError::Xml("multiple root elements".to_string())),
    }
}
