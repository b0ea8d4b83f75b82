//! Parse sessions for XML documents.
//!
//! This crate drives the incremental parser in [`xmldom_engine`] from three
//! input modes and hands back an owned [`Document`] on success:
//!
//! - [`ParseSession::parse_file`]: a file on disk
//! - [`ParseSession::parse_memory`]: an in-memory buffer
//! - [`ParseSession::parse_stream`]: any [`BufRead`](std::io::BufRead), fed line by line
//!
//! Failures come back as a [`ParseError`] whose [`FailureCategory`] says
//! which stage failed, carrying the engine's diagnostics as text. A failed
//! parse never leaves a partial document behind.
//!
//! # Example
//!
//! ```rust
//! use xmldom::ParseSession;
//!
//! let mut session = ParseSession::new();
//! let doc = session
//!     .parse_memory(br#"<style version="1.0"><info/></style>"#)
//!     .unwrap();
//!
//! let root = doc.root().unwrap();
//! assert_eq!(root.name, "style");
//! assert_eq!(root.get_attribute("version"), Some("1.0"));
//! ```
//!
//! # XInclude
//!
//! ```rust
//! use xmldom::{ParseSession, XIncludeOptions};
//! use xmldom_engine::MemoryResolver;
//!
//! let resolver = MemoryResolver::with_resources([("info.xml", "<info/>")]);
//! let mut session = ParseSession::new().with_resolver(resolver);
//! session.set_xinclude_options(XIncludeOptions::new(true, false, true));
//!
//! let doc = session
//!     .parse_memory(br#"<style xmlns:xi="http://www.w3.org/2001/XInclude">
//!   <xi:include href="info.xml"/>
//! </style>"#)
//!     .unwrap();
//! assert_eq!(doc.root().unwrap().get_children("info").len(), 1);
//! ```

pub mod aggregate;
pub mod config;
pub mod document;
pub mod error;
pub mod feeder;
pub mod options;
pub mod session;
pub mod xinclude;

pub use config::{ConfigError, ParserConfig};
pub use document::Document;
pub use error::{FailureCategory, ParseError, Result};
pub use feeder::{ChunkFeeder, FeedReport};
pub use options::{ParserOptions, XIncludeOptions};
pub use session::{ParseSession, SessionState};
pub use xinclude::LinkInclusionProcessor;
