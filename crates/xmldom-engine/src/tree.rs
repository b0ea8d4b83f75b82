//! Engine-native document tree.

use std::path::PathBuf;

/// A parsed document as built by a parser context.
///
/// `nodes` holds every top-level node in document order: comments and
/// processing instructions of the prolog and epilog, and the root element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlTree {
    /// Location the document was loaded from, if any.
    pub url: Option<PathBuf>,

    /// `version` from the XML declaration.
    pub version: Option<String>,

    /// `encoding` from the XML declaration.
    pub encoding: Option<String>,

    /// `standalone` from the XML declaration.
    pub standalone: Option<bool>,

    pub nodes: Vec<Node>,
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),

    /// Character data, with entity and character references resolved.
    Text(String),

    /// A CDATA section, kept verbatim.
    CData(String),

    Comment(String),

    ProcessingInstruction { target: String, data: String },

    /// Marks where an XInclude substitution begins; holds the original
    /// `include` element without its children.
    XIncludeStart(Element),

    /// Marks where an XInclude substitution ends.
    XIncludeEnd,
}

/// An element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// The local name (without namespace prefix).
    pub name: String,

    /// Namespace prefix, if any (e.g., "xi" in `<xi:include>`).
    pub prefix: Option<String>,

    pub attributes: Vec<Attribute>,

    pub children: Vec<Node>,

    /// 1-based line of the start tag.
    pub line: u32,
}

/// An attribute, including namespace declarations.
///
/// `xmlns="..."` is stored with name `xmlns` and no prefix;
/// `xmlns:p="..."` with name `p` and prefix `xmlns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub prefix: Option<String>,
    /// The attribute value (after unescaping XML entities).
    pub value: String,
}

/// Split a qualified name into `(local, prefix)`.
pub(crate) fn split_qname(qname: &str) -> (String, Option<String>) {
    match qname.split_once(':') {
        Some((prefix, local)) => (local.to_string(), Some(prefix.to_string())),
        None => (qname.to_string(), None),
    }
}

impl XmlTree {
    /// The document element.
    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(Node::as_element)
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Node::Element(_))
    }
}

impl Element {
    /// Create an element with no attributes or children.
    pub fn new(name: impl Into<String>, prefix: Option<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            prefix,
            attributes: Vec::new(),
            children: Vec::new(),
            line,
        }
    }

    /// `prefix:name`, or just `name` without a prefix.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }

    /// Get an unprefixed attribute value by name.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.get_attribute_ns(None, name)
    }

    /// Get an attribute value by prefix and local name.
    pub fn get_attribute_ns(&self, prefix: Option<&str>, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.prefix.as_deref() == prefix)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, replacing an existing one with the same name.
    pub fn set_attribute(&mut self, prefix: Option<&str>, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name == name && a.prefix.as_deref() == prefix)
        {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                prefix: prefix.map(str::to_string),
                value,
            }),
        }
    }

    /// Check if this element has child elements.
    pub fn has_elements(&self) -> bool {
        self.children.iter().any(Node::is_element)
    }

    /// Check if this element has no children at all.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Get child elements by local name.
    pub fn get_children(&self, name: &str) -> Vec<&Element> {
        self.all_children()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Get all child elements (ignoring text and other nodes).
    pub fn all_children(&self) -> Vec<&Element> {
        self.children.iter().filter_map(Node::as_element).collect()
    }

    /// Concatenated text and CDATA content, if the element has only those.
    pub fn text(&self) -> Option<String> {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(content) | Node::CData(content) => out.push_str(content),
                Node::Comment(_) | Node::ProcessingInstruction { .. } => {}
                _ => return None,
            }
        }
        (!self.children.is_empty()).then_some(out)
    }

    /// A copy of this element without its children.
    pub(crate) fn shallow_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
            line: self.line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, prefix: Option<&str>, value: &str) -> Attribute {
        Attribute {
            name: name.to_string(),
            prefix: prefix.map(str::to_string),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_element_get_attribute() {
        let mut element = Element::new("test", None, 1);
        element.attributes.push(attr("name", None, "value"));
        element.attributes.push(attr("base", Some("xml"), "dir/"));

        assert_eq!(element.get_attribute("name"), Some("value"));
        assert_eq!(element.get_attribute("base"), None);
        assert_eq!(element.get_attribute_ns(Some("xml"), "base"), Some("dir/"));
        assert_eq!(element.get_attribute("missing"), None);
    }

    #[test]
    fn test_set_attribute_replaces() {
        let mut element = Element::new("test", None, 1);
        element.set_attribute(Some("xml"), "base", "a/");
        element.set_attribute(Some("xml"), "base", "b/");
        assert_eq!(element.attributes.len(), 1);
        assert_eq!(element.get_attribute_ns(Some("xml"), "base"), Some("b/"));
    }

    #[test]
    fn test_element_children() {
        let mut parent = Element::new("parent", None, 1);
        parent.children.push(Node::Text("\n  ".to_string()));
        parent.children.push(Node::Element(Element::new("child", None, 2)));
        parent.children.push(Node::Element(Element::new("other", None, 3)));

        assert!(parent.has_elements());
        assert_eq!(parent.all_children().len(), 2);
        assert_eq!(parent.get_children("child").len(), 1);
        assert_eq!(parent.text(), None);
    }

    #[test]
    fn test_element_text() {
        let mut element = Element::new("text", Some("csl".to_string()), 1);
        element.children.push(Node::Text("Hello, ".to_string()));
        element.children.push(Node::CData("world!".to_string()));

        assert_eq!(element.qualified_name(), "csl:text");
        assert_eq!(element.text().as_deref(), Some("Hello, world!"));
        assert_eq!(Element::new("empty", None, 1).text(), None);
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("xi:include"), ("include".to_string(), Some("xi".to_string())));
        assert_eq!(split_qname("root"), ("root".to_string(), None));
    }
}
