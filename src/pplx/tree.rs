//! Owned XML tree over quick-xml events.
//!
//! Text and attribute values are kept exactly as they appear in the source
//! (still escaped) so that writing an untouched tree reproduces the input.
//! Only nodes that are explicitly mutated get re-escaped.

use quick_xml::escape::{escape, unescape};
use quick_xml::events::attributes::{AttrError, Attribute};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error("invalid attribute: {0}")]
    Attr(#[from] AttrError),

    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(Element),
    /// Escaped text as read
    Text(String),
    CData(String),
    /// Comments, declarations, processing instructions, doctype
    Other(Event<'static>),
}

#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    /// (name, escaped value)
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
    self_closing: bool,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, TreeError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = std::str::from_utf8(&attr.value)?.to_string();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
            self_closing: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unescaped attribute value
    pub fn attr(&self, key: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, raw)| unescape_lossy(raw))
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, String)> {
        self.attrs.iter().map(|(k, raw)| (k.as_str(), unescape_lossy(raw)))
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        let escaped = escape(value).into_owned();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, raw)) => *raw = escaped,
            None => self.attrs.push((key.to_string(), escaped)),
        }
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |el| el.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Children matching `name`, mutable
    pub fn children_named_mut<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut Element> + 'a {
        self.children.iter_mut().filter_map(move |node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Unescaped text content, `None` when the element has no text node
    pub fn text(&self) -> Option<String> {
        let mut out: Option<String> = None;
        for node in &self.children {
            match node {
                XmlNode::Text(raw) => out.get_or_insert_with(String::new).push_str(&unescape_lossy(raw)),
                XmlNode::CData(raw) => out.get_or_insert_with(String::new).push_str(raw),
                _ => {}
            }
        }
        out
    }

    /// Replace all text content with `value`
    pub fn set_text(&mut self, value: &str) {
        self.children
            .retain(|node| !matches!(node, XmlNode::Text(_) | XmlNode::CData(_)));
        self.children.insert(0, XmlNode::Text(escape(value).into_owned()));
        self.self_closing = false;
    }

    /// Append a child element, reusing the sibling indentation when the
    /// element is pretty-printed.
    pub fn append_child(&mut self, child: Element) {
        self.self_closing = false;
        let indent = self.children.iter().rev().skip(1).find_map(|node| match node {
            XmlNode::Text(t) if t.trim().is_empty() => Some(t.clone()),
            _ => None,
        });
        match (self.children.last(), indent) {
            (Some(XmlNode::Text(closing)), Some(indent)) if closing.trim().is_empty() => {
                let at = self.children.len() - 1;
                self.children.insert(at, XmlNode::Element(child));
                self.children.insert(at, XmlNode::Text(indent));
            }
            _ => self.children.push(XmlNode::Element(child)),
        }
    }

    /// Index paths of all descendants named `name`, in document order
    pub fn descendant_paths(&self, name: &str) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_paths(name, &mut prefix, &mut out);
        out
    }

    fn collect_paths(&self, name: &str, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (index, node) in self.children.iter().enumerate() {
            if let XmlNode::Element(el) = node {
                prefix.push(index);
                if el.name == name {
                    out.push(prefix.clone());
                }
                el.collect_paths(name, prefix, out);
                prefix.pop();
            }
        }
    }

    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &index in path {
            current = match current.children.get(index)? {
                XmlNode::Element(el) => el,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &index in path {
            current = match current.children.get_mut(index)? {
                XmlNode::Element(el) => el,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Visit this element and every descendant element
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        visit(self);
        for child in self.child_elements() {
            child.walk(visit);
        }
    }
}

fn unescape_lossy(raw: &str) -> String {
    unescape(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

#[derive(Debug, Clone)]
pub struct XmlTree {
    prolog: Vec<XmlNode>,
    root: Element,
    epilog: Vec<XmlNode>,
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    prolog: &mut Vec<XmlNode>,
    epilog: &mut Vec<XmlNode>,
    node: XmlNode,
) -> Result<(), TreeError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        XmlNode::Element(el) => {
            if root.is_some() {
                return Err(TreeError::Malformed("multiple root elements"));
            }
            *root = Some(el);
        }
        other if root.is_none() => prolog.push(other),
        other => epilog.push(other),
    }
    Ok(())
}

impl XmlTree {
    pub fn parse(bytes: &[u8]) -> Result<Self, TreeError> {
        let text = std::str::from_utf8(bytes)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let mut el = Element::from_start(&start)?;
                    el.self_closing = true;
                    attach(&mut stack, &mut root, &mut prolog, &mut epilog, XmlNode::Element(el))?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or(TreeError::Malformed("closing tag without opening tag"))?;
                    attach(&mut stack, &mut root, &mut prolog, &mut epilog, XmlNode::Element(el))?;
                }
                Event::Text(t) => {
                    let raw = std::str::from_utf8(&t)?.to_string();
                    if stack.is_empty() && !raw.trim().is_empty() {
                        return Err(TreeError::Malformed("text outside the root element"));
                    }
                    attach(&mut stack, &mut root, &mut prolog, &mut epilog, XmlNode::Text(raw))?;
                }
                Event::CData(c) => {
                    if stack.is_empty() {
                        return Err(TreeError::Malformed("CDATA outside the root element"));
                    }
                    let raw = std::str::from_utf8(&c)?.to_string();
                    attach(&mut stack, &mut root, &mut prolog, &mut epilog, XmlNode::CData(raw))?;
                }
                Event::Eof => break,
                other => {
                    attach(&mut stack, &mut root, &mut prolog, &mut epilog, XmlNode::Other(other.into_owned()))?;
                }
            }
        }

        if !stack.is_empty() {
            return Err(TreeError::Malformed("unclosed element at end of document"));
        }
        let root = root.ok_or(TreeError::Malformed("no root element"))?;

        Ok(Self { prolog, root, epilog })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn has_declaration(&self) -> bool {
        self.prolog
            .iter()
            .any(|node| matches!(node, XmlNode::Other(Event::Decl(_))))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TreeError> {
        let mut writer = Writer::new(Vec::new());
        if !self.has_declaration() {
            writer.write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("utf-8"), None)))?;
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
        }
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }
        Ok(writer.into_inner())
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), TreeError> {
    match node {
        XmlNode::Element(el) => write_element(writer, el)?,
        XmlNode::Text(raw) => writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str())))?,
        XmlNode::CData(raw) => writer.write_event(Event::CData(BytesCData::new(raw.as_str())))?,
        XmlNode::Other(event) => writer.write_event(event.clone())?,
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), TreeError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, raw) in &el.attrs {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Borrowed(raw.as_bytes()),
        });
    }

    if el.self_closing && el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}
