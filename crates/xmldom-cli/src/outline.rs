//! Indented element outline of a parsed document.

use std::fmt::Write;

use xmldom::Document;
use xmldom_engine::{Element, Node};

/// One line per element, indented by depth, with attributes and any simple
/// text content. XInclude markers show up as `[include href]` / `[/include]`.
pub fn render(doc: &Document) -> String {
    let mut out = String::new();
    for node in doc.nodes() {
        render_node(&mut out, node, 0);
    }
    out
}

fn render_node(out: &mut String, node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        Node::Element(element) => {
            let _ = writeln!(out, "{}{}", indent, element_line(element));
            for child in &element.children {
                render_node(out, child, depth + 1);
            }
        }
        Node::XIncludeStart(include) => {
            let href = include.get_attribute("href").unwrap_or("?");
            let _ = writeln!(out, "{}[include {}]", indent, href);
        }
        Node::XIncludeEnd => {
            let _ = writeln!(out, "{}[/include]", indent);
        }
        Node::Text(_) | Node::CData(_) | Node::Comment(_) | Node::ProcessingInstruction { .. } => {}
    }
}

fn element_line(element: &Element) -> String {
    let mut line = element.qualified_name();
    for attr in &element.attributes {
        match &attr.prefix {
            Some(prefix) => {
                let _ = write!(line, " {}:{}=\"{}\"", prefix, attr.name, attr.value);
            }
            None => {
                let _ = write!(line, " {}=\"{}\"", attr.name, attr.value);
            }
        }
    }
    if let Some(text) = element.text() {
        let text = text.trim();
        if !text.is_empty() {
            let _ = write!(line, " \"{}\"", text);
        }
    }
    line
}
