//! Namespace-resolving XML tree and the path expressions evaluated against it.
//!
//! Paths are a small XPath subset: `/`-separated element steps written as
//! `prefix:name`, `name` (no namespace) or `*`, optionally ending in `text()`
//! or `@attr` / `@prefix:attr`. A path is evaluated from the document node, so
//! its first step matches the root element.
//!
//! A `text()` target yields one value per direct text node, so text split by
//! a comment or a child element comes back as separate values.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Document has no root element")]
    NoRoot,

    #[error("Unbound namespace prefix '{prefix}' in path '{path}'")]
    UnboundPrefix { prefix: String, path: String },

    #[error("Invalid path expression '{0}'")]
    InvalidPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Parses a whole document and returns its root element.
    pub fn parse(xml: &str) -> Result<XmlElement, XmlError> {
        let mut reader = NsReader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            // Resolve the namespace eagerly so the reader is free to borrow again.
            let resolved = reader
                .read_resolved_event()
                .map(|(ns, event)| (namespace_of(ns), event));
            match resolved {
                Ok((ns, Event::Start(e))) => {
                    let namespace = ns.map_err(|m| malformed(&reader, m))?;
                    let element =
                        open_element(&reader, namespace, &e).map_err(|m| malformed(&reader, m))?;
                    stack.push(element);
                }
                Ok((ns, Event::Empty(e))) => {
                    let namespace = ns.map_err(|m| malformed(&reader, m))?;
                    let element =
                        open_element(&reader, namespace, &e).map_err(|m| malformed(&reader, m))?;
                    attach(&mut stack, &mut root, element);
                }
                Ok((_, Event::End(_))) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| malformed(&reader, "unexpected end tag".to_string()))?;
                    attach(&mut stack, &mut root, element);
                }
                Ok((_, Event::Text(t))) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = t.unescape().map_err(|e| malformed(&reader, e.to_string()))?;
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
                Ok((_, Event::CData(c))) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                        parent.children.push(XmlNode::Text(text));
                    }
                }
                Ok((_, Event::Eof)) => break,
                Ok(_) => {}
                Err(e) => return Err(malformed(&reader, e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Malformed {
                position: xml.len() as u64,
                message: "unclosed element".to_string(),
            });
        }
        root.ok_or(XmlError::NoRoot)
    }

    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.name == name
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn child(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.is(namespace, name))
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.is(namespace, name))
    }

    pub fn attribute(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == namespace && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Direct text children, one item per text node.
    pub fn text_nodes(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Text(t) => Some(t.as_str()),
            XmlNode::Element(_) => None,
        })
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        self.text_nodes().collect()
    }

    /// Concatenated text of the whole subtree.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(element: &XmlElement, out: &mut String) {
    for child in &element.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
        }
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn malformed(reader: &NsReader<&[u8]>, message: String) -> XmlError {
    XmlError::Malformed {
        position: reader.buffer_position() as u64,
        message,
    }
}

fn namespace_of(result: ResolveResult) -> Result<Option<String>, String> {
    match result {
        ResolveResult::Bound(Namespace(ns)) => Ok(Some(String::from_utf8_lossy(ns).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) if prefix == b"xml" => Ok(Some(XML_NAMESPACE.to_string())),
        ResolveResult::Unknown(prefix) => Err(format!(
            "unbound prefix '{}'",
            String::from_utf8_lossy(&prefix)
        )),
    }
}

fn open_element(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart,
) -> Result<XmlElement, String> {
    let mut element = XmlElement {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..Default::default()
    };

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (attr_ns, local) = reader.resolve_attribute(attr.key);
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        element.attributes.push(XmlAttribute {
            namespace: namespace_of(attr_ns)?,
            name: String::from_utf8_lossy(local.as_ref()).into_owned(),
            value: value.into_owned(),
        });
    }

    Ok(element)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    namespace: Option<String>,
    /// `None` matches any element name
    name: Option<String>,
}

impl Step {
    fn matches(&self, element: &XmlElement) -> bool {
        match &self.name {
            None => true,
            Some(name) => element.namespace == self.namespace && &element.name == name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Text,
    Attribute {
        namespace: Option<String>,
        name: String,
    },
    StringValue,
}

/// Compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPath {
    steps: Vec<Step>,
    target: Target,
}

impl XmlPath {
    /// Compiles `expr`, resolving prefixes against `namespaces` (prefix, uri).
    pub fn compile(expr: &str, namespaces: &[(String, String)]) -> Result<XmlPath, XmlError> {
        let resolve = |prefix: &str| -> Result<String, XmlError> {
            if prefix == "xml" {
                return Ok(XML_NAMESPACE.to_string());
            }
            namespaces
                .iter()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| uri.clone())
                .ok_or_else(|| XmlError::UnboundPrefix {
                    prefix: prefix.to_string(),
                    path: expr.to_string(),
                })
        };
        let qualified = |qname: &str| -> Result<(Option<String>, String), XmlError> {
            match qname.split_once(':') {
                Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
                    Ok((Some(resolve(prefix)?), local.to_string()))
                }
                Some(_) => Err(XmlError::InvalidPath(expr.to_string())),
                None => Ok((None, qname.to_string())),
            }
        };

        let mut segments: Vec<&str> = expr.trim().split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(XmlError::InvalidPath(expr.to_string()));
        }

        let target = match segments.last().copied() {
            Some("text()") => {
                segments.pop();
                Target::Text
            }
            Some(last) if last.starts_with('@') => {
                segments.pop();
                let (namespace, name) = qualified(&last[1..])?;
                Target::Attribute { namespace, name }
            }
            _ => Target::StringValue,
        };

        let steps = segments
            .into_iter()
            .map(|segment| {
                if segment == "*" {
                    return Ok(Step {
                        namespace: None,
                        name: None,
                    });
                }
                let (namespace, name) = qualified(segment)?;
                Ok(Step {
                    namespace,
                    name: Some(name),
                })
            })
            .collect::<Result<Vec<_>, XmlError>>()?;

        if steps.is_empty() {
            return Err(XmlError::InvalidPath(expr.to_string()));
        }

        Ok(XmlPath { steps, target })
    }

    /// Values selected from `root`, in document order. Whitespace-only values are skipped.
    pub fn evaluate(&self, root: &XmlElement) -> Vec<String> {
        let mut current: Vec<&XmlElement> = match self.steps.first() {
            Some(step) if step.matches(root) => vec![root],
            _ => return Vec::new(),
        };
        for step in &self.steps[1..] {
            current = current
                .into_iter()
                .flat_map(|e| e.elements().filter(|child| step.matches(child)))
                .collect();
        }

        current
            .into_iter()
            .flat_map(|e| match &self.target {
                Target::Text => e.text_nodes().map(str::to_string).collect(),
                Target::StringValue => vec![e.deep_text()],
                Target::Attribute { namespace, name } => e
                    .attribute(namespace.as_deref(), name)
                    .map(str::to_string)
                    .into_iter()
                    .collect(),
            })
            .filter_map(|value| {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            })
            .collect()
    }
}
