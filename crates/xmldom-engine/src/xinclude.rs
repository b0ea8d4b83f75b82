//! XInclude substitution over a finished tree.
//!
//! `xi:include` elements are replaced by the resource their `href` names,
//! parsed as XML or inserted as text. Resources are loaded through an
//! [`IncludeResolver`] so callers can substitute the filesystem.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::context::{MAX_ELEMENT_DEPTH, ParserContext, parser_directory};
use crate::tree::{Element, Node, XmlTree};
use crate::{EngineError, ErrorCode, ParseFlags};

pub const XINCLUDE_NS: &str = "http://www.w3.org/2001/XInclude";
/// Namespace used by early drafts; still found in the wild.
pub const XINCLUDE_OLD_NS: &str = "http://www.w3.org/2003/XInclude";

/// Nested inclusion deeper than this is refused.
pub const MAX_DEPTH: usize = 40;

/// Trait for loading included resources.
pub trait IncludeResolver {
    /// Load the resource `href` names, relative to `base_dir`.
    fn load(&self, href: &str, base_dir: &Path) -> io::Result<Vec<u8>>;
}

/// Resolver that reads included resources from the filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileSystemResolver;

impl IncludeResolver for FileSystemResolver {
    fn load(&self, href: &str, base_dir: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(resolve_href(href, base_dir))
    }
}

/// Resolver that serves resources from an in-memory map keyed by `href`.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, href: impl Into<String>, content: impl Into<Vec<u8>>) -> &mut Self {
        self.resources.insert(href.into(), content.into());
        self
    }

    pub fn with_resources(
        resources: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) -> Self {
        let mut resolver = Self::new();
        for (href, content) in resources {
            resolver.add(href, content);
        }
        resolver
    }
}

impl IncludeResolver for MemoryResolver {
    fn load(&self, href: &str, _base_dir: &Path) -> io::Result<Vec<u8>> {
        self.resources.get(href).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no resource named {}", href),
            )
        })
    }
}

/// Resolve `href` against `base_dir`, lexically.
pub fn resolve_href(href: &str, base_dir: &Path) -> PathBuf {
    let href = Path::new(href);
    if href.is_absolute() {
        normalize_path(href)
    } else {
        normalize_path(&base_dir.join(href))
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Run XInclude substitution over `tree`, resolving relative references
/// against `base_dir`.
///
/// Returns how many include elements were substituted in `tree` itself;
/// inclusions inside included documents are not counted.
pub fn process(
    tree: &mut XmlTree,
    flags: ParseFlags,
    base_dir: &Path,
    resolver: &dyn IncludeResolver,
) -> Result<usize, EngineError> {
    let mut processor = Processor {
        flags,
        resolver,
        chain: tree.url.iter().map(|url| normalize_path(url)).collect(),
        count: 0,
    };
    processor.process_nodes(&mut tree.nodes, &mut Vec::new(), base_dir, 1)?;

    tracing::debug!(substitutions = processor.count, "xinclude pass finished");
    Ok(processor.count)
}

/// A failed inclusion: resource failures can be recovered by a fallback.
enum Failure {
    Resource(EngineError),
    Fatal(EngineError),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Directive {
    Include,
    Fallback,
}

/// In-scope namespace declarations, `""` for the default namespace.
type Scope = Vec<(String, String)>;

struct Processor<'r> {
    flags: ParseFlags,
    resolver: &'r dyn IncludeResolver,
    /// Documents currently being included, outermost first.
    chain: Vec<PathBuf>,
    count: usize,
}

impl Processor<'_> {
    /// `depth` is the nesting depth of the elements in `nodes`, counted in
    /// the final tree.
    fn process_nodes(
        &mut self,
        nodes: &mut Vec<Node>,
        scope: &mut Scope,
        base_dir: &Path,
        depth: usize,
    ) -> Result<(), EngineError> {
        let mut i = 0;
        while i < nodes.len() {
            let Node::Element(element) = &mut nodes[i] else {
                i += 1;
                continue;
            };
            if depth > MAX_ELEMENT_DEPTH {
                let message = format!(
                    "included content nests elements deeper than {}",
                    MAX_ELEMENT_DEPTH
                );
                return Err(self.error(element, message));
            }

            let mark = scope.len();
            push_declarations(element, scope);

            match directive(element, scope) {
                Some(Directive::Include) => {
                    let replacement = self.expand(element, scope, base_dir, depth);
                    scope.truncate(mark);
                    let replacement = replacement?;
                    let len = replacement.len();
                    nodes.splice(i..=i, replacement);
                    self.count += 1;
                    i += len;
                }
                Some(Directive::Fallback) => {
                    return Err(self.error(element, "fallback is not the child of an 'include'"));
                }
                None => {
                    let result = self.process_nodes(&mut element.children, scope, base_dir, depth + 1);
                    scope.truncate(mark);
                    result?;
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// The nodes an include element is replaced by.
    fn expand(
        &mut self,
        include: &Element,
        scope: &mut Scope,
        base_dir: &Path,
        depth: usize,
    ) -> Result<Vec<Node>, EngineError> {
        if include.get_attribute("xpointer").is_some() {
            return Err(self.error(include, "xpointer is not supported"));
        }
        let Some(href) = include.get_attribute("href") else {
            return Err(self.error(include, "include has no href"));
        };

        let loaded = match include.get_attribute("parse").unwrap_or("xml") {
            "xml" => self.load_xml(include, href, base_dir, depth),
            "text" => self.load_text(include, href, base_dir),
            other => {
                let message = format!("invalid value {} for 'parse'", other);
                return Err(self.error(include, message));
            }
        };

        let content = match loaded {
            Ok(content) => content,
            Err(Failure::Fatal(err)) => return Err(err),
            Err(Failure::Resource(err)) => match self.fallback(include, scope, base_dir, depth)? {
                Some(content) => {
                    tracing::debug!(href, "using fallback content");
                    content
                }
                None => return Err(err),
            },
        };

        if self.flags.contains(ParseFlags::NOXINCNODE) {
            return Ok(content);
        }

        let mut nodes = Vec::with_capacity(content.len() + 2);
        nodes.push(Node::XIncludeStart(include.shallow_clone()));
        nodes.extend(content);
        nodes.push(Node::XIncludeEnd);
        Ok(nodes)
    }

    fn load_xml(
        &mut self,
        include: &Element,
        href: &str,
        base_dir: &Path,
        depth: usize,
    ) -> Result<Vec<Node>, Failure> {
        let path = resolve_href(href, base_dir);
        if self.chain.contains(&path) {
            let message = format!("detected a recursion in {}", href);
            return Err(Failure::Fatal(self.error(include, message)));
        }
        if self.chain.len() >= MAX_DEPTH {
            let message = format!("maximum include depth exceeded at {}", href);
            return Err(Failure::Fatal(self.error(include, message)));
        }

        let bytes = self.load(include, href, base_dir)?;
        let mut context = ParserContext::from_memory(&bytes).map_err(|err| {
            Failure::Resource(self.error(include, format!("could not parse {}: {}", href, err)))
        })?;
        context.set_url(&path);
        context.set_directory(parser_directory(&path));
        context.apply_options(self.flags);

        let tree = match context.parse_document() {
            Ok(()) => context.take_document(),
            Err(_) => None,
        };
        let Some(mut tree) = tree else {
            let detail = context
                .errors()
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            let message = format!("could not parse {}: {}", href, detail);
            return Err(Failure::Resource(self.error(include, message)));
        };

        let mut nested = Processor {
            flags: self.flags,
            resolver: self.resolver,
            chain: self.chain.clone(),
            count: 0,
        };
        nested.chain.push(path.clone());
        nested
            .process_nodes(&mut tree.nodes, &mut Vec::new(), &parser_directory(&path), depth)
            .map_err(Failure::Fatal)?;

        let mut nodes = tree.nodes;
        if !self.flags.contains(ParseFlags::NOBASEFIX) {
            fix_base(&mut nodes, href);
        }
        Ok(nodes)
    }

    fn load_text(&mut self, include: &Element, href: &str, base_dir: &Path) -> Result<Vec<Node>, Failure> {
        if let Some(encoding) = include.get_attribute("encoding") {
            let supported = ["utf-8", "utf8", "us-ascii", "ascii"]
                .iter()
                .any(|known| known.eq_ignore_ascii_case(encoding));
            if !supported {
                let message = format!("encoding {} not supported", encoding);
                return Err(Failure::Fatal(self.error(include, message)));
            }
        }

        let bytes = self.load(include, href, base_dir)?;
        let text = String::from_utf8(bytes).map_err(|_| {
            Failure::Resource(self.error(include, format!("{} is not valid UTF-8", href)))
        })?;

        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Node::Text(text)])
    }

    fn load(&self, include: &Element, href: &str, base_dir: &Path) -> Result<Vec<u8>, Failure> {
        self.resolver.load(href, base_dir).map_err(|err| {
            Failure::Resource(self.error(include, format!("could not load {}: {}", href, err)))
        })
    }

    /// Content of the include's `fallback` child, with its own includes
    /// processed. `None` when there is no fallback.
    fn fallback(
        &mut self,
        include: &Element,
        scope: &mut Scope,
        base_dir: &Path,
        depth: usize,
    ) -> Result<Option<Vec<Node>>, EngineError> {
        for child in include.all_children() {
            let mark = scope.len();
            push_declarations(child, scope);
            let found = directive(child, scope) == Some(Directive::Fallback);
            if found {
                let mut content = child.children.clone();
                let result = self.process_nodes(&mut content, scope, base_dir, depth);
                scope.truncate(mark);
                result?;
                return Ok(Some(content));
            }
            scope.truncate(mark);
        }
        Ok(None)
    }

    fn error(&self, element: &Element, message: impl Into<String>) -> EngineError {
        let err = EngineError::error(ErrorCode::XIncludeError, message)
            .at(element.line, 0)
            .in_file(self.chain.last().map(PathBuf::as_path));
        crate::globals::set_last_error(&err);
        err
    }
}

fn push_declarations(element: &Element, scope: &mut Scope) {
    for attr in &element.attributes {
        match (attr.prefix.as_deref(), attr.name.as_str()) {
            (Some("xmlns"), prefix) => scope.push((prefix.to_string(), attr.value.clone())),
            (None, "xmlns") => scope.push((String::new(), attr.value.clone())),
            _ => {}
        }
    }
}

fn directive(element: &Element, scope: &Scope) -> Option<Directive> {
    let prefix = element.prefix.as_deref().unwrap_or("");
    let namespace = scope
        .iter()
        .rev()
        .find(|(declared, _)| declared == prefix)
        .map(|(_, uri)| uri.as_str())?;
    if namespace != XINCLUDE_NS && namespace != XINCLUDE_OLD_NS {
        return None;
    }
    match element.name.as_str() {
        "include" => Some(Directive::Include),
        "fallback" => Some(Directive::Fallback),
        _ => None,
    }
}

/// Record where included elements came from when `href` leaves the
/// including document's directory.
fn fix_base(nodes: &mut [Node], href: &str) {
    let Some((dir, _)) = href.rsplit_once('/') else {
        return;
    };
    for node in nodes {
        if let Node::Element(element) = node {
            let base = match element.get_attribute_ns(Some("xml"), "base") {
                Some(existing) => format!("{}/{}", dir, existing),
                None => href.to_string(),
            };
            element.set_attribute(Some("xml"), "base", base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> XmlTree {
        let mut context = ParserContext::from_memory(content.as_bytes()).unwrap();
        context.parse_document().unwrap();
        context.take_document().unwrap()
    }

    fn run(tree: &mut XmlTree, flags: ParseFlags, resolver: &MemoryResolver) -> Result<usize, EngineError> {
        process(tree, ParseFlags::XINCLUDE | flags, Path::new("."), resolver)
    }

    const XI: &str = r#"xmlns:xi="http://www.w3.org/2001/XInclude""#;

    #[test]
    fn test_include_xml_with_markers() {
        let resolver = MemoryResolver::with_resources([("chapter.xml", "<chapter>One</chapter>")]);
        let mut tree = parse(&format!(r#"<book {XI}><xi:include href="chapter.xml"/></book>"#));

        assert_eq!(run(&mut tree, ParseFlags::NONE, &resolver).unwrap(), 1);

        let root = tree.root().unwrap();
        assert_eq!(root.children.len(), 3);
        assert!(matches!(&root.children[0], Node::XIncludeStart(e) if e.name == "include"));
        assert_eq!(root.get_children("chapter")[0].text().as_deref(), Some("One"));
        assert_eq!(root.children[2], Node::XIncludeEnd);
    }

    #[test]
    fn test_include_without_markers() {
        let resolver = MemoryResolver::with_resources([("chapter.xml", "<chapter/>")]);
        let mut tree = parse(&format!(r#"<book {XI}><xi:include href="chapter.xml"/></book>"#));

        run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(root.children, vec![Node::Element(Element::new("chapter", None, 1))]);
    }

    #[test]
    fn test_include_text() {
        let resolver = MemoryResolver::with_resources([("note.txt", "a < b")]);
        let mut tree = parse(&format!(
            r#"<doc {XI}><xi:include href="note.txt" parse="text"/></doc>"#
        ));

        run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap();
        assert_eq!(tree.root().unwrap().text().as_deref(), Some("a < b"));
    }

    #[test]
    fn test_fallback_used_when_missing() {
        let resolver = MemoryResolver::new();
        let mut tree = parse(&format!(
            r#"<doc {XI}><xi:include href="missing.xml"><xi:fallback><none/></xi:fallback></xi:include></doc>"#
        ));

        assert_eq!(run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap(), 1);
        assert_eq!(tree.root().unwrap().all_children()[0].name, "none");
    }

    #[test]
    fn test_missing_resource_without_fallback() {
        let resolver = MemoryResolver::new();
        let mut tree = parse(&format!(r#"<doc {XI}>
  <xi:include href="missing.xml"/>
</doc>"#));

        let err = run(&mut tree, ParseFlags::NONE, &resolver).unwrap_err();
        assert_eq!(err.code, ErrorCode::XIncludeError);
        assert_eq!(err.line, 2);
        assert!(err.message.starts_with("could not load missing.xml"));
    }

    #[test]
    fn test_recursion_is_detected() {
        let resolver = MemoryResolver::with_resources([(
            "self.xml",
            format!(r#"<part {XI}><xi:include href="self.xml"/></part>"#),
        )]);
        let mut tree = parse(&format!(r#"<doc {XI}><xi:include href="self.xml"/></doc>"#));

        let err = run(&mut tree, ParseFlags::NONE, &resolver).unwrap_err();
        assert_eq!(err.message, "detected a recursion in self.xml");
    }

    #[test]
    fn test_nested_includes_not_counted() {
        let resolver = MemoryResolver::with_resources([
            ("outer.xml", format!(r#"<outer {XI}><xi:include href="inner.xml"/></outer>"#)),
            ("inner.xml", "<inner/>".to_string()),
        ]);
        let mut tree = parse(&format!(r#"<doc {XI}><xi:include href="outer.xml"/></doc>"#));

        assert_eq!(run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap(), 1);
        let outer = tree.root().unwrap().all_children()[0];
        assert_eq!(outer.all_children()[0].name, "inner");
    }

    #[test]
    fn test_included_content_respects_depth_limit() {
        let nested = |depth: usize| format!("{}{}", "<n>".repeat(depth), "</n>".repeat(depth));
        let resolver = MemoryResolver::with_resources([("deep.xml", nested(100))]);
        let including = |depth: usize| {
            format!(
                r#"<doc {XI}>{}<xi:include href="deep.xml"/>{}</doc>"#,
                "<d>".repeat(depth - 2),
                "</d>".repeat(depth - 2)
            )
        };

        let mut tree = parse(&including(150));
        assert_eq!(run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap(), 1);

        let mut tree = parse(&including(200));
        let err = run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap_err();
        assert_eq!(err.message, "included content nests elements deeper than 256");
    }

    #[test]
    fn test_base_fixup() {
        let resolver = MemoryResolver::with_resources([("parts/a.xml", "<a/>")]);
        let source = format!(r#"<doc {XI}><xi:include href="parts/a.xml"/></doc>"#);

        let mut tree = parse(&source);
        run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap();
        let included = tree.root().unwrap().all_children()[0];
        assert_eq!(included.get_attribute_ns(Some("xml"), "base"), Some("parts/a.xml"));

        let mut tree = parse(&source);
        run(&mut tree, ParseFlags::NOXINCNODE | ParseFlags::NOBASEFIX, &resolver).unwrap();
        let included = tree.root().unwrap().all_children()[0];
        assert_eq!(included.get_attribute_ns(Some("xml"), "base"), None);
    }

    #[test]
    fn test_old_namespace_and_default_prefix() {
        let resolver = MemoryResolver::with_resources([("a.xml", "<a/>")]);
        let mut tree = parse(
            r#"<doc><include xmlns="http://www.w3.org/2003/XInclude" href="a.xml"/></doc>"#,
        );
        assert_eq!(run(&mut tree, ParseFlags::NOXINCNODE, &resolver).unwrap(), 1);
    }

    #[test]
    fn test_other_namespaces_are_untouched() {
        let resolver = MemoryResolver::new();
        let mut tree = parse(r#"<doc xmlns:xi="urn:other"><xi:include href="a.xml"/></doc>"#);
        assert_eq!(run(&mut tree, ParseFlags::NONE, &resolver).unwrap(), 0);
    }

    #[test]
    fn test_stray_fallback() {
        let mut tree = parse(&format!(r#"<doc {XI}><xi:fallback/></doc>"#));
        let err = run(&mut tree, ParseFlags::NONE, &MemoryResolver::new()).unwrap_err();
        assert!(err.message.contains("fallback"));
    }

    #[test]
    fn test_xpointer_and_bad_parse_values() {
        let resolver = MemoryResolver::with_resources([("a.xml", "<a/>")]);
        let mut tree = parse(&format!(r#"<doc {XI}><xi:include href="a.xml" xpointer="x"/></doc>"#));
        assert!(run(&mut tree, ParseFlags::NONE, &resolver).is_err());

        let mut tree = parse(&format!(r#"<doc {XI}><xi:include href="a.xml" parse="html"/></doc>"#));
        let err = run(&mut tree, ParseFlags::NONE, &resolver).unwrap_err();
        assert_eq!(err.message, "invalid value html for 'parse'");
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("a.xml", Path::new("docs")), PathBuf::from("docs/a.xml"));
        assert_eq!(resolve_href("../a.xml", Path::new("docs/book")), PathBuf::from("docs/a.xml"));
        assert_eq!(resolve_href("./a.xml", Path::new(".")), PathBuf::from("a.xml"));
        assert_eq!(resolve_href("/abs/a.xml", Path::new("docs")), PathBuf::from("/abs/a.xml"));
    }

    #[test]
    fn test_filesystem_resolver() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("part.xml"), "<part/>").unwrap();

        let resolver = FileSystemResolver;
        assert_eq!(resolver.load("part.xml", dir.path()).unwrap(), b"<part/>");
        assert!(resolver.load("missing.xml", dir.path()).is_err());
    }
}
