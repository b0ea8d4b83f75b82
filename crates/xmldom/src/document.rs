//! The persistent result of a successful parse.

use std::path::Path;

use xmldom_engine::{Element, Node, XmlTree};

/// A parsed document. It exclusively owns its tree; no parser state refers
/// to it once it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    tree: XmlTree,
}

impl Document {
    pub(crate) fn new(tree: XmlTree) -> Self {
        Self { tree }
    }

    /// The document element.
    pub fn root(&self) -> Option<&Element> {
        self.tree.root()
    }

    /// Where the document was loaded from, if it came from a file.
    pub fn url(&self) -> Option<&Path> {
        self.tree.url.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.tree.version.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.tree.encoding.as_deref()
    }

    /// Top-level nodes in document order.
    pub fn nodes(&self) -> &[Node] {
        &self.tree.nodes
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    pub fn into_tree(self) -> XmlTree {
        self.tree
    }
}
