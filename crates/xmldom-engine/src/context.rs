//! Parser contexts: the transient state of one parse.
//!
//! A context is created over a file, a memory buffer, or as a push context
//! that is fed chunk by chunk. All three share the same incremental builder:
//! bytes are appended to a pending buffer and turned into nodes as soon as
//! complete markup is available. Whole-input contexts simply have all of
//! their bytes pending before [`ParserContext::parse_document`] runs.

use std::borrow::Cow;
use std::mem;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};

use crate::globals::{self, keep_blanks_default};
use crate::tree::{Attribute, Element, Node, XmlTree, split_qname};
use crate::{CreateError, EngineError, ErrorCode, ParseFlags, Severity};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Elements nested deeper than this are refused.
pub(crate) const MAX_ELEMENT_DEPTH: usize = 256;

/// What a context was created over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    File,
    Memory,
    Push,
}

/// Transient state of one parse.
///
/// The context owns the tree it builds until [`take_document`](Self::take_document)
/// moves it out; dropping the context drops a tree that was never taken.
#[derive(Debug)]
pub struct ParserContext {
    kind: InputKind,
    url: Option<PathBuf>,
    directory: Option<PathBuf>,
    keep_blanks: bool,
    merge_cdata: bool,

    /// Bytes received but not yet turned into nodes.
    pending: Vec<u8>,
    /// Absolute offset of `pending[0]`.
    offset: usize,
    /// Offset where the document proper starts (after a byte order mark).
    doc_start: usize,
    bom_checked: bool,
    /// Absolute end of the last window whose trailing markup was incomplete.
    resume_hint: usize,
    /// Bytes handed to the tokenizer, counting rescans.
    bytes_scanned: usize,

    /// Absolute offset up to which newlines have been counted.
    line_pos: usize,
    line: u32,
    line_start: usize,

    builder: Builder,
    my_doc: Option<XmlTree>,

    errors: Vec<EngineError>,
    well_formed: bool,
    halted: bool,
    terminated: bool,

    chunks_fed: usize,
    bytes_fed: usize,
}

/// Nodes under construction.
#[derive(Debug, Default)]
struct Builder {
    /// Open elements, innermost last.
    stack: Vec<Element>,
    /// Completed top-level nodes.
    nodes: Vec<Node>,
    /// Character data whose end has not arrived yet.
    text: Option<TextRun>,
    root_done: bool,
    seen_markup: bool,
    version: Option<String>,
    encoding: Option<String>,
    standalone: Option<bool>,
}

#[derive(Debug)]
struct TextRun {
    /// Still escaped; entities and line ends are resolved once the run ends.
    raw: Vec<u8>,
    line: u32,
    column: u32,
}

/// Derive the directory relative references in `path` resolve against.
pub fn parser_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl ParserContext {
    fn new(kind: InputKind, pending: Vec<u8>) -> Self {
        Self {
            kind,
            url: None,
            directory: None,
            keep_blanks: keep_blanks_default(),
            merge_cdata: false,
            pending,
            offset: 0,
            doc_start: 0,
            bom_checked: false,
            resume_hint: 0,
            bytes_scanned: 0,
            line_pos: 0,
            line: 1,
            line_start: 0,
            builder: Builder::default(),
            my_doc: None,
            errors: Vec::new(),
            well_formed: true,
            halted: false,
            terminated: false,
            chunks_fed: 0,
            bytes_fed: 0,
        }
    }

    /// Create a context that parses the file at `path`.
    ///
    /// The file is read up front; failure to read it is recorded as the
    /// thread's last error. The context has no directory yet.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CreateError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| {
            let err = EngineError::fatal(
                ErrorCode::IoError,
                format!("failed to load external entity \"{}\": {}", path.display(), source),
            );
            globals::set_last_error(&err);
            CreateError::Load {
                path: path.to_path_buf(),
                source,
            }
        })?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "created file parser context");
        let mut context = Self::new(InputKind::File, bytes);
        context.url = Some(path.to_path_buf());
        Ok(context)
    }

    /// Create a context over an in-memory buffer of exactly `bytes.len()` bytes.
    pub fn from_memory(bytes: &[u8]) -> Result<Self, CreateError> {
        if bytes.is_empty() {
            return Err(CreateError::EmptyBuffer);
        }
        tracing::debug!(bytes = bytes.len(), "created memory parser context");
        Ok(Self::new(InputKind::Memory, bytes.to_vec()))
    }

    /// Create a push context with no bound resource; the tree is built
    /// purely from the data passed to [`parse_chunk`](Self::parse_chunk).
    pub fn push() -> Self {
        tracing::debug!("created push parser context");
        Self::new(InputKind::Push, Vec::new())
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn url(&self) -> Option<&Path> {
        self.url.as_deref()
    }

    pub fn set_url(&mut self, url: impl Into<PathBuf>) {
        self.url = Some(url.into());
    }

    /// Directory relative references resolve against.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = Some(directory.into());
    }

    pub fn keep_blanks(&self) -> bool {
        self.keep_blanks
    }

    /// Apply parser options. `NOBLANKS` and `NOCDATA` switch their behaviour
    /// on; options that are not set leave the context's defaults alone.
    pub fn apply_options(&mut self, flags: ParseFlags) {
        if flags.contains(ParseFlags::NOBLANKS) {
            self.keep_blanks = false;
        }
        if flags.contains(ParseFlags::NOCDATA) {
            self.merge_cdata = true;
        }
    }

    /// Parse everything the context holds and finish the document.
    pub fn parse_document(&mut self) -> Result<(), ErrorCode> {
        self.feed(&[], true)
    }

    /// Feed one chunk. With `terminate` set, the input ends here and the
    /// document is finished.
    ///
    /// After a fatal error the context keeps accepting chunks but builds
    /// nothing more; every call then returns the first error's code.
    pub fn parse_chunk(&mut self, chunk: &[u8], terminate: bool) -> Result<(), ErrorCode> {
        self.chunks_fed += 1;
        self.bytes_fed += chunk.len();
        tracing::trace!(bytes = chunk.len(), terminate, "parse_chunk");
        self.feed(chunk, terminate)
    }

    fn feed(&mut self, chunk: &[u8], terminate: bool) -> Result<(), ErrorCode> {
        if self.terminated {
            if !chunk.is_empty() && !self.halted {
                self.record_error(EngineError::fatal(
                    ErrorCode::DocumentEnd,
                    "Extra content at the end of the document",
                ));
            }
            return self.status();
        }
        if terminate {
            self.terminated = true;
        }
        if self.halted {
            return self.status();
        }

        self.pending.extend_from_slice(chunk);
        self.pump(terminate);
        if terminate && !self.halted {
            self.finish();
        }
        self.status()
    }

    fn status(&self) -> Result<(), ErrorCode> {
        match self.errors.iter().find(|e| e.severity == Severity::Fatal) {
            Some(err) => Err(err.code),
            None => Ok(()),
        }
    }

    /// Record an error raised outside the builder (for example a failed read
    /// of the input stream). Fatal errors stop tree construction.
    pub fn record_error(&mut self, err: EngineError) {
        tracing::debug!(code = err.code.as_i32(), message = %err.message, "parser error");
        globals::set_last_error(&err);
        if err.severity == Severity::Fatal {
            self.well_formed = false;
            self.halted = true;
        }
        self.errors.push(err);
    }

    /// Record an I/O error from whatever was supplying chunks.
    pub fn record_io_error(&mut self, err: &std::io::Error) {
        let err = EngineError::fatal(ErrorCode::IoError, format!("read error: {}", err))
            .in_file(self.url.as_deref());
        self.record_error(err);
    }

    /// Every error recorded so far, in order.
    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    pub fn chunks_fed(&self) -> usize {
        self.chunks_fed
    }

    pub fn bytes_fed(&self) -> usize {
        self.bytes_fed
    }

    /// The finished tree, while the context still owns it.
    pub fn document(&self) -> Option<&XmlTree> {
        self.my_doc.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut XmlTree> {
        self.my_doc.as_mut()
    }

    /// Move the tree out; the context no longer owns it afterwards.
    pub fn take_document(&mut self) -> Option<XmlTree> {
        self.my_doc.take()
    }

    fn pump(&mut self, terminate: bool) {
        if !self.bom_checked {
            if self.pending.len() < UTF8_BOM.len()
                && UTF8_BOM.starts_with(&self.pending)
                && !terminate
            {
                return;
            }
            self.bom_checked = true;
            if self.pending.starts_with(UTF8_BOM) {
                self.pending.drain(..UTF8_BOM.len());
                self.offset = UTF8_BOM.len();
                self.doc_start = self.offset;
                self.line_pos = self.offset;
                self.line_start = self.offset;
            }
        }

        let window = mem::take(&mut self.pending);
        let committed = if self.still_incomplete(&window, terminate) {
            0
        } else {
            self.bytes_scanned += window.len();
            self.scan(&window, terminate)
        };
        self.locate(&window, committed);
        if !terminate && committed < window.len() {
            self.resume_hint = self.offset + window.len();
        }

        self.pending = window;
        self.pending.drain(..committed);
        self.offset += committed;
    }

    /// Every markup construct ends with `>`. When the last scan stopped on
    /// incomplete markup and no `>` has arrived since, it is still incomplete.
    fn still_incomplete(&self, window: &[u8], terminate: bool) -> bool {
        if terminate {
            return false;
        }
        let seen = self.resume_hint.saturating_sub(self.offset);
        seen > 0 && seen <= window.len() && !window[seen..].contains(&b'>')
    }

    /// Turn complete markup at the front of `window` into nodes.
    ///
    /// Returns how many bytes were consumed. Character data is consumed as it
    /// arrives but only becomes a node once the markup that ends it has been
    /// read (or at the end of input), so a text run split across chunks
    /// becomes a single node.
    fn scan(&mut self, window: &[u8], terminate: bool) -> usize {
        let mut reader = Reader::from_reader(window);
        let config = reader.config_mut();
        config.trim_text_start = false;
        config.trim_text_end = false;
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = true;

        let mut committed = 0usize;

        while !self.halted {
            let start = reader.buffer_position() as usize;
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    if !terminate && matches!(err, quick_xml::Error::Syntax(_)) {
                        // Incomplete markup; wait for more input.
                        break;
                    }
                    self.flush_text();
                    if !self.halted {
                        let at = reader.error_position() as usize;
                        self.fail(ErrorCode::from(&err), err.to_string(), window, at);
                    }
                    break;
                }
            };

            match event {
                Event::Eof => {
                    if terminate {
                        self.flush_text();
                    }
                    committed = window.len();
                    break;
                }
                Event::Text(text) => self.collect_text(window, &text, start),
                event => {
                    self.flush_text();
                    if self.halted {
                        break;
                    }
                    self.handle_event(window, event, start);
                }
            }
            committed = reader.buffer_position() as usize;
        }

        committed
    }

    fn handle_event(&mut self, window: &[u8], event: Event<'_>, start: usize) {
        match event {
            Event::Start(e) => self.handle_start(window, &e, start, false),
            Event::Empty(e) => self.handle_start(window, &e, start, true),
            Event::End(e) => self.handle_end(window, &e, start),
            Event::CData(e) => self.handle_cdata(window, &e, start),
            Event::Comment(e) => self.handle_comment(window, &e, start),
            Event::PI(e) => self.handle_pi(window, &e, start),
            Event::Decl(e) => self.handle_decl(window, &e, start),
            Event::DocType(_) => self.handle_doctype(window, start),
            Event::Text(_) | Event::Eof => {}
        }
    }

    fn handle_start(&mut self, window: &[u8], e: &BytesStart<'_>, start: usize, empty: bool) {
        self.builder.seen_markup = true;
        if self.builder.stack.is_empty() && self.builder.root_done {
            return self.extra_content(window, start);
        }
        if self.builder.stack.len() >= MAX_ELEMENT_DEPTH {
            let message = format!("Excessive depth in document: {}", MAX_ELEMENT_DEPTH);
            return self.fail(ErrorCode::InternalError, message, window, start);
        }

        let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let (name, prefix) = split_qname(&qname);
        let (line, _) = self.locate(window, start);

        let mut element = Element::new(name, prefix, line);
        match parse_attributes(e) {
            Ok(attributes) => element.attributes = attributes,
            Err((code, message)) => return self.fail(code, message, window, start),
        }

        if empty {
            self.close_element(element);
        } else {
            self.builder.stack.push(element);
        }
    }

    fn handle_end(&mut self, window: &[u8], e: &BytesEnd<'_>, start: usize) {
        let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();

        let Some(element) = self.builder.stack.pop() else {
            if self.builder.root_done {
                return self.extra_content(window, start);
            }
            return self.fail(
                ErrorCode::DocumentEmpty,
                "Start tag expected, '<' not found",
                window,
                start,
            );
        };

        let open = element.qualified_name();
        if open != qname {
            let message = format!(
                "Opening and ending tag mismatch: {} line {} and {}",
                open, element.line, qname
            );
            return self.fail(ErrorCode::TagNameMismatch, message, window, start);
        }

        self.close_element(element);
    }

    fn close_element(&mut self, element: Element) {
        match self.builder.stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => {
                self.builder.nodes.push(Node::Element(element));
                self.builder.root_done = true;
            }
        }
    }

    fn collect_text(&mut self, window: &[u8], text: &BytesText<'_>, start: usize) {
        if text.is_empty() {
            return;
        }
        if self.builder.text.is_none() {
            let (line, column) = self.locate(window, start);
            self.builder.text = Some(TextRun {
                raw: Vec::new(),
                line,
                column,
            });
        }
        if let Some(run) = self.builder.text.as_mut() {
            run.raw.extend_from_slice(text);
        }
    }

    /// Turn the open text run into a node of the innermost open element.
    fn flush_text(&mut self) {
        let Some(run) = self.builder.text.take() else {
            return;
        };
        let (line, column) = (run.line, run.column);
        let Ok(raw) = std::str::from_utf8(&run.raw) else {
            return self.fail_at(
                ErrorCode::InvalidChar,
                "Input is not proper UTF-8, indicate encoding !",
                line,
                column,
            );
        };

        if self.builder.stack.is_empty() {
            if !is_blank(raw) {
                self.builder.seen_markup = true;
                if self.builder.root_done {
                    return self.fail_at(
                        ErrorCode::DocumentEnd,
                        "Extra content at the end of the document",
                        line,
                        column,
                    );
                }
                return self.fail_at(
                    ErrorCode::DocumentEmpty,
                    "Start tag expected, '<' not found",
                    line,
                    column,
                );
            }
            return;
        }

        if !self.keep_blanks && is_blank(raw) {
            return;
        }

        let content = match quick_xml::escape::unescape(raw) {
            Ok(content) => content,
            Err(err) => {
                return self.fail_at(ErrorCode::UndeclaredEntity, err.to_string(), line, column);
            }
        };
        let content = normalize_newlines(content);
        if let Some(parent) = self.builder.stack.last_mut() {
            append_text(&mut parent.children, &content);
        }
    }

    fn handle_cdata(&mut self, window: &[u8], e: &BytesCData<'_>, start: usize) {
        let Ok(content) = std::str::from_utf8(e) else {
            return self.fail(
                ErrorCode::InvalidChar,
                "Input is not proper UTF-8, indicate encoding !",
                window,
                start,
            );
        };

        let merge = self.merge_cdata;
        let Some(parent) = self.builder.stack.last_mut() else {
            self.builder.seen_markup = true;
            if self.builder.root_done {
                return self.extra_content(window, start);
            }
            return self.fail(
                ErrorCode::DocumentEmpty,
                "Start tag expected, '<' not found",
                window,
                start,
            );
        };

        if merge {
            append_text(&mut parent.children, content);
        } else {
            parent.children.push(Node::CData(content.to_string()));
        }
    }

    fn handle_comment(&mut self, window: &[u8], e: &BytesText<'_>, start: usize) {
        self.builder.seen_markup = true;
        match std::str::from_utf8(e) {
            Ok(content) => self.push_node(Node::Comment(content.to_string())),
            Err(_) => self.fail(
                ErrorCode::InvalidChar,
                "Comment not in UTF-8",
                window,
                start,
            ),
        }
    }

    fn handle_pi(&mut self, window: &[u8], e: &BytesPI<'_>, start: usize) {
        self.builder.seen_markup = true;
        let raw = String::from_utf8_lossy(e);
        let (target, data) = match raw.split_once(|c: char| c.is_ascii_whitespace()) {
            Some((target, data)) => (target, data.trim_start()),
            None => (&*raw, ""),
        };

        if target.eq_ignore_ascii_case("xml") {
            return self.fail(
                ErrorCode::ReservedXmlName,
                "XML declaration allowed only at the start of the document",
                window,
                start,
            );
        }

        self.push_node(Node::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
    }

    fn handle_decl(&mut self, window: &[u8], e: &BytesDecl<'_>, start: usize) {
        if self.offset + start != self.doc_start || self.builder.seen_markup {
            return self.fail(
                ErrorCode::ReservedXmlName,
                "XML declaration allowed only at the start of the document",
                window,
                start,
            );
        }
        self.builder.seen_markup = true;

        let version = match e.version() {
            Ok(version) => String::from_utf8_lossy(&version).into_owned(),
            Err(_) => {
                return self.fail(
                    ErrorCode::VersionMissing,
                    "Malformed declaration expecting version",
                    window,
                    start,
                );
            }
        };

        let encoding = match e.encoding() {
            Some(Ok(encoding)) => Some(String::from_utf8_lossy(&encoding).into_owned()),
            Some(Err(err)) => {
                return self.fail(ErrorCode::AttributeError, err.to_string(), window, start);
            }
            None => None,
        };
        if let Some(encoding) = &encoding {
            if !is_supported_encoding(encoding) {
                let message = format!("Unsupported encoding {}", encoding);
                return self.fail(ErrorCode::UnsupportedEncoding, message, window, start);
            }
        }

        let standalone = match e.standalone() {
            Some(Ok(value)) => Some(&*value == b"yes"),
            _ => None,
        };

        self.builder.version = Some(version);
        self.builder.encoding = encoding;
        self.builder.standalone = standalone;
    }

    fn handle_doctype(&mut self, window: &[u8], start: usize) {
        if self.builder.root_done || !self.builder.stack.is_empty() {
            return self.extra_content(window, start);
        }
        self.builder.seen_markup = true;
        tracing::trace!("document type declaration skipped");
    }

    fn push_node(&mut self, node: Node) {
        match self.builder.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.builder.nodes.push(node),
        }
    }

    fn extra_content(&mut self, window: &[u8], start: usize) {
        self.fail(
            ErrorCode::DocumentEnd,
            "Extra content at the end of the document",
            window,
            start,
        );
    }

    /// Check the end state and hand the finished tree to `my_doc`.
    fn finish(&mut self) {
        if let Some(open) = self.builder.stack.last() {
            let message = format!(
                "Premature end of data in tag {} line {}",
                open.qualified_name(),
                open.line
            );
            return self.fail(ErrorCode::TagNotFinished, message, &[], 0);
        }
        if !self.builder.root_done {
            let message = if self.builder.seen_markup {
                "Start tag expected, '<' not found"
            } else {
                "Document is empty"
            };
            return self.fail(ErrorCode::DocumentEmpty, message, &[], 0);
        }

        let builder = mem::take(&mut self.builder);
        tracing::debug!(nodes = builder.nodes.len(), "document finished");
        self.my_doc = Some(XmlTree {
            url: self.url.clone(),
            version: builder.version,
            encoding: builder.encoding,
            standalone: builder.standalone,
            nodes: builder.nodes,
        });
    }

    fn fail(&mut self, code: ErrorCode, message: impl Into<String>, window: &[u8], at: usize) {
        let (line, column) = self.locate(window, at);
        self.fail_at(code, message, line, column);
    }

    fn fail_at(&mut self, code: ErrorCode, message: impl Into<String>, line: u32, column: u32) {
        let err = EngineError::fatal(code, message)
            .at(line, column)
            .in_file(self.url.as_deref());
        self.record_error(err);
    }

    /// Line and column of `window[at]`, counting newlines forward from the
    /// last located position.
    fn locate(&mut self, window: &[u8], at: usize) -> (u32, u32) {
        let at = at.min(window.len());
        let from = self.line_pos.saturating_sub(self.offset).min(at);
        for (i, byte) in window[from..at].iter().enumerate() {
            if *byte == b'\n' {
                self.line += 1;
                self.line_start = self.offset + from + i + 1;
            }
        }
        self.line_pos = self.line_pos.max(self.offset + at);

        let column = (self.offset + at).saturating_sub(self.line_start) + 1;
        (self.line, u32::try_from(column).unwrap_or(u32::MAX))
    }
}

fn parse_attributes(e: &BytesStart<'_>) -> Result<Vec<Attribute>, (ErrorCode, String)> {
    let mut attributes = Vec::new();

    for attr_result in e.attributes() {
        let attr = attr_result
            .map_err(|err| (ErrorCode::AttributeError, format!("Attribute error: {}", err)))?;

        let qname = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let (name, prefix) = split_qname(&qname);

        let value = attr.unescape_value().map_err(|err| {
            (
                ErrorCode::UndeclaredEntity,
                format!("Invalid attribute value: {}", err),
            )
        })?;

        attributes.push(Attribute {
            name,
            prefix,
            value: value.into_owned(),
        });
    }

    Ok(attributes)
}

fn append_text(children: &mut Vec<Node>, content: &str) {
    if content.is_empty() {
        return;
    }
    match children.last_mut() {
        Some(Node::Text(existing)) => existing.push_str(content),
        _ => children.push(Node::Text(content.to_string())),
    }
}

fn is_blank(text: &str) -> bool {
    text.bytes()
        .all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

/// Line ends are normalised to `\n`, as XML requires.
fn normalize_newlines(text: Cow<'_, str>) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        text
    }
}

fn is_supported_encoding(name: &str) -> bool {
    ["utf-8", "utf8", "us-ascii", "ascii"]
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
}
