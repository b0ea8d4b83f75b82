//! Parse sessions.
//!
//! A [`ParseSession`] drives one parser context at a time from a file, a
//! buffer or a stream. Every mode converges on the same completion step:
//! check the engine's error record, run XInclude substitution, then move the
//! tree out of the context into a [`Document`] and drop the context.

use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use xmldom_engine::{
    EngineScope, FileSystemResolver, IncludeResolver, ParseFlags, ParserContext, parser_directory,
};

use crate::aggregate::{self, CallStatus, Operation};
use crate::config::{ConfigError, ParserConfig};
use crate::document::Document;
use crate::error::{ParseError, Result};
use crate::feeder::ChunkFeeder;
use crate::options::{ParserOptions, XIncludeOptions};
use crate::xinclude::LinkInclusionProcessor;

/// What a session holds between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No document; either nothing was parsed yet or the last parse failed.
    Idle,
    /// The last parse succeeded and its document is available.
    DocumentReady,
}

/// Turns files, buffers and streams into owned [`Document`]s.
///
/// A session is reusable: each parse releases whatever the previous one left
/// behind before starting. Failures release everything and produce no
/// document.
pub struct ParseSession {
    document: Option<Document>,
    xinclude: XIncludeOptions,
    overrides: ParserOptions,
    keep_blanks: bool,
    resolver: Box<dyn IncludeResolver>,
}

impl fmt::Debug for ParseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseSession")
            .field("document", &self.document)
            .field("xinclude", &self.xinclude)
            .field("overrides", &self.overrides)
            .field("keep_blanks", &self.keep_blanks)
            .finish_non_exhaustive()
    }
}

impl Default for ParseSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseSession {
    pub fn new() -> Self {
        Self {
            document: None,
            xinclude: XIncludeOptions::default(),
            overrides: ParserOptions::default(),
            keep_blanks: EngineScope::DEFAULT_KEEP_BLANKS,
            resolver: Box::new(FileSystemResolver),
        }
    }

    /// A session set up from a loaded configuration.
    pub fn with_config(config: &ParserConfig) -> std::result::Result<Self, ConfigError> {
        let mut session = Self::new();
        session.keep_blanks = config.keep_blanks;
        session.xinclude = config.xinclude;
        session.overrides = config.parser_options()?;
        Ok(session)
    }

    /// Load XInclude resources through `resolver` instead of the filesystem.
    pub fn with_resolver(mut self, resolver: impl IncludeResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn xinclude_options(&self) -> XIncludeOptions {
        self.xinclude
    }

    pub fn set_xinclude_options(&mut self, options: XIncludeOptions) {
        self.xinclude = options;
    }

    pub fn parser_options(&self) -> ParserOptions {
        self.overrides
    }

    /// Force option bits on (`set`) or off (`clear`) for every parse.
    pub fn set_parser_options(&mut self, set: ParseFlags, clear: ParseFlags) {
        self.overrides = ParserOptions::new(set, clear);
    }

    pub fn keep_blanks(&self) -> bool {
        self.keep_blanks
    }

    pub fn set_keep_blanks(&mut self, keep: bool) {
        self.keep_blanks = keep;
    }

    pub fn state(&self) -> SessionState {
        if self.document.is_some() {
            SessionState::DocumentReady
        } else {
            SessionState::Idle
        }
    }

    /// The document of the last successful parse.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    /// Move the document out, leaving the session idle.
    pub fn take_document(&mut self) -> Option<Document> {
        self.document.take()
    }

    /// Drop the document. Safe to call repeatedly.
    pub fn release(&mut self) {
        self.document = None;
    }

    /// Parse the file at `path`. Relative XInclude references resolve against
    /// the file's directory.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<&Document> {
        let path = path.as_ref();
        self.release();
        let _scope = EngineScope::enter(self.keep_blanks);
        tracing::debug!(path = %path.display(), "parse_file");

        let mut context = match ParserContext::from_file(path) {
            Ok(context) => context,
            Err(err) => return Err(self.creation_failed(&err)),
        };
        if context.directory().is_none() {
            context.set_directory(parser_directory(path));
        }
        self.initialize_context(&mut context);

        let result = context.parse_document();
        self.complete(context, CallStatus::from_result(Operation::ParseDocument, result))
    }

    /// Parse exactly the bytes of `buffer`.
    pub fn parse_memory(&mut self, buffer: &[u8]) -> Result<&Document> {
        self.release();
        let _scope = EngineScope::enter(self.keep_blanks);
        tracing::debug!(bytes = buffer.len(), "parse_memory");

        let mut context = match ParserContext::from_memory(buffer) {
            Ok(context) => context,
            Err(err) => return Err(self.creation_failed(&err)),
        };
        self.initialize_context(&mut context);

        let result = context.parse_document();
        self.complete(context, CallStatus::from_result(Operation::ParseDocument, result))
    }

    /// Parse a stream, feeding it to the engine line by line.
    pub fn parse_stream<R: BufRead>(&mut self, reader: R) -> Result<&Document> {
        self.release();
        let _scope = EngineScope::enter(self.keep_blanks);
        tracing::debug!("parse_stream");

        let mut context = ParserContext::push();
        self.initialize_context(&mut context);

        let report = ChunkFeeder::new(&mut context).feed(reader);
        self.complete(context, report.status())
    }

    fn creation_failed(&mut self, err: &xmldom_engine::CreateError) -> ParseError {
        tracing::debug!(error = %err, "context creation failed");
        self.release();
        ParseError::ContextCreation {
            diagnostic: aggregate::context_creation_diagnostic(),
        }
    }

    fn initialize_context(&self, context: &mut ParserContext) {
        let flags = self.overrides.merge(self.xinclude.to_flags());
        context.apply_options(flags);
        tracing::debug!(options = ?flags.names(), keep_blanks = context.keep_blanks(), "context created");
    }

    /// Shared tail of every parse mode: error check, XInclude, transfer.
    /// The context is dropped on every path out.
    fn complete(&mut self, mut context: ParserContext, status: CallStatus) -> Result<&Document> {
        if let Some(diagnostic) = aggregate::diagnostic(&context, &status) {
            tracing::debug!(?status, "content parse failed");
            return Err(ParseError::ContentParse { diagnostic });
        }
        tracing::debug!("content parsed");

        let base_dir = context
            .directory()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let processor =
            LinkInclusionProcessor::new(self.xinclude, self.overrides, self.resolver.as_ref());
        if let Some(tree) = context.document_mut() {
            let substitutions = processor.process(tree, &base_dir)?;
            tracing::debug!(substitutions, "link inclusion done");
        }

        let Some(tree) = context.take_document() else {
            return Err(ParseError::ContentParse {
                diagnostic: "parse_document() failed.".to_string(),
            });
        };
        drop(context);

        tracing::debug!("document ready");
        Ok(self.document.insert(Document::new(tree)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureCategory;
    use std::io::Cursor;
    use xmldom_engine::{MemoryResolver, Node, keep_blanks_default};

    const SIMPLE: &str = "<root>\n  <child name=\"a\"/>\n</root>\n";

    #[test]
    fn test_new_session_is_idle() {
        let session = ParseSession::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.has_document());
        assert!(session.document().is_none());
    }

    #[test]
    fn test_parse_memory() {
        let mut session = ParseSession::new();
        let doc = session.parse_memory(SIMPLE.as_bytes()).unwrap();
        assert_eq!(doc.root().unwrap().name, "root");
        assert_eq!(session.state(), SessionState::DocumentReady);
    }

    #[test]
    fn test_failure_leaves_nothing_behind() {
        let mut session = ParseSession::new();
        session.parse_memory(SIMPLE.as_bytes()).unwrap();

        let err = session.parse_memory(b"<root><a></b></root>").unwrap_err();
        assert_eq!(err.category(), FailureCategory::ContentParse);
        assert!(err.diagnostic().starts_with("Document not well-formed.\n"));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut session = ParseSession::new();
        session.parse_memory(SIMPLE.as_bytes()).unwrap();
        session.release();
        session.release();
        assert!(!session.has_document());

        // usable again afterwards
        assert!(session.parse_memory(SIMPLE.as_bytes()).is_ok());
    }

    #[test]
    fn test_deep_nesting_is_refused() {
        let depth = 100_000;
        let content = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));

        let mut session = ParseSession::new();
        let err = session.parse_memory(content.as_bytes()).unwrap_err();
        assert_eq!(err.category(), FailureCategory::ContentParse);
        assert!(err.diagnostic().contains("Excessive depth in document: 256"));

        let err = session.parse_stream(Cursor::new(content)).unwrap_err();
        assert_eq!(err.category(), FailureCategory::ContentParse);

        session.release();
        assert!(session.parse_memory(SIMPLE.as_bytes()).is_ok());
        session.release();
    }

    #[test]
    fn test_empty_buffer_is_context_creation() {
        let mut session = ParseSession::new();
        let err = session.parse_memory(b"").unwrap_err();
        assert_eq!(err.category(), FailureCategory::ContextCreation);
        assert_eq!(err.diagnostic(), "Could not create parser context");
    }

    #[test]
    fn test_stream_matches_memory() {
        let mut session = ParseSession::new();
        let from_memory = session.parse_memory(SIMPLE.as_bytes()).unwrap().clone();
        let from_stream = session.parse_stream(Cursor::new(SIMPLE)).unwrap();
        assert_eq!(from_stream, &from_memory);
    }

    #[test]
    fn test_empty_stream_is_content_parse() {
        let mut session = ParseSession::new();
        let err = session.parse_stream(Cursor::new("")).unwrap_err();
        assert_eq!(err.category(), FailureCategory::ContentParse);
        assert!(err.diagnostic().contains("Document is empty"));
    }

    #[test]
    fn test_keep_blanks_is_scoped() {
        let mut session = ParseSession::new();
        session.set_keep_blanks(false);

        let doc = session.parse_memory(SIMPLE.as_bytes()).unwrap();
        assert_eq!(doc.root().unwrap().children.len(), 1);
        assert!(keep_blanks_default());

        assert!(session.parse_memory(b"<a></b>").is_err());
        assert!(keep_blanks_default());
    }

    #[test]
    fn test_parser_option_overrides() {
        let mut session = ParseSession::new();
        session.set_parser_options(ParseFlags::NOBLANKS, ParseFlags::NONE);
        let doc = session.parse_memory(SIMPLE.as_bytes()).unwrap();
        assert_eq!(doc.root().unwrap().children.len(), 1);
        assert_eq!(
            session.parser_options(),
            ParserOptions::new(ParseFlags::NOBLANKS, ParseFlags::NONE)
        );
    }

    #[test]
    fn test_xinclude_through_resolver() {
        let resolver = MemoryResolver::with_resources([("part.xml", "<part/>")]);
        let mut session = ParseSession::new().with_resolver(resolver);
        session.set_xinclude_options(XIncludeOptions::new(true, false, true));
        assert!(session.xinclude_options().process);

        let doc = session
            .parse_memory(br#"<doc xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="part.xml"/></doc>"#)
            .unwrap();
        assert_eq!(
            doc.root().unwrap().children,
            vec![Node::Element(xmldom_engine::Element::new("part", None, 1))]
        );
    }

    #[test]
    fn test_xinclude_failure_is_link_inclusion() {
        let mut session = ParseSession::new().with_resolver(MemoryResolver::new());
        session.set_xinclude_options(XIncludeOptions::new(true, true, true));

        let err = session
            .parse_memory(br#"<doc xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="gone.xml"/></doc>"#)
            .unwrap_err();
        assert_eq!(err.category(), FailureCategory::LinkInclusion);
        assert!(err.diagnostic().starts_with("Couldn't process XInclude\n"));
        assert!(!session.has_document());
    }

    #[test]
    fn test_take_document() {
        let mut session = ParseSession::new();
        session.parse_memory(SIMPLE.as_bytes()).unwrap();
        let doc = session.take_document().unwrap();
        assert_eq!(doc.root().unwrap().name, "root");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_with_config() {
        let config = ParserConfig::from_toml_str("keep_blanks = false\nset = [\"nocdata\"]").unwrap();
        let session = ParseSession::with_config(&config).unwrap();
        assert!(!session.keep_blanks());
        assert_eq!(session.parser_options().set, ParseFlags::NOCDATA);

        let bad = ParserConfig {
            clear: vec!["bogus".to_string()],
            ..ParserConfig::default()
        };
        assert!(ParseSession::with_config(&bad).is_err());
    }
}
