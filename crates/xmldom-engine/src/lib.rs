//! Incremental XML parsing engine.
//!
//! This crate provides parser contexts that build a document tree from a file,
//! an in-memory buffer, or a sequence of pushed chunks. It wraps [`quick-xml`]
//! and adds the pieces a DOM front end needs on top of a pull parser:
//!
//! - [`ParserContext`]: the transient state of one parse, owning the tree it
//!   builds until [`ParserContext::take_document`] moves it out
//! - [`XmlTree`], [`Element`], [`Node`]: the engine-native tree
//! - [`EngineError`] and [`ErrorCode`]: recorded errors, in libxml2 numbering
//! - [`EngineScope`]: scoped per-thread configuration
//! - [`xinclude::process`]: XInclude substitution over a finished tree
//!
//! # Example
//!
//! ```rust
//! use xmldom_engine::ParserContext;
//!
//! let mut context = ParserContext::push();
//! context.parse_chunk(b"<style version=\"1.0\">\n", false).unwrap();
//! context.parse_chunk(b"  <info/>\n</style>\n", false).unwrap();
//! context.parse_chunk(&[], true).unwrap();
//!
//! let tree = context.take_document().unwrap();
//! let root = tree.root().unwrap();
//! assert_eq!(root.name, "style");
//! assert_eq!(root.get_children("info").len(), 1);
//! ```

pub mod context;
pub mod error;
pub mod flags;
pub mod globals;
pub mod tree;
pub mod xinclude;

pub use context::{InputKind, ParserContext, parser_directory};
pub use error::{CreateError, EngineError, ErrorCode, Severity};
pub use flags::ParseFlags;
pub use globals::{EngineScope, keep_blanks_default, last_error, reset_last_error};
pub use tree::{Attribute, Element, Node, XmlTree};
pub use xinclude::{FileSystemResolver, IncludeResolver, MemoryResolver};
