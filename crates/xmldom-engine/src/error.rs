//! Error records kept by parser contexts.

use std::fmt;
use std::path::{Path, PathBuf};

use quick_xml::errors::IllFormedError;

/// Numeric error codes reported by the engine.
///
/// Values follow libxml2's `xmlParserErrors` numbering where an equivalent
/// error exists, so diagnostics that only carry a code stay recognisable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    InternalError = 1,
    DocumentEmpty = 4,
    DocumentEnd = 5,
    InvalidChar = 9,
    UndeclaredEntity = 26,
    UnsupportedEncoding = 32,
    AttributeError = 41,
    ReservedXmlName = 64,
    GtRequired = 73,
    TagNameMismatch = 76,
    TagNotFinished = 77,
    HyphenInComment = 80,
    NotWellBalanced = 85,
    VersionMissing = 96,
    IoError = 1549,
    XIncludeError = 1600,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

impl From<&quick_xml::Error> for ErrorCode {
    fn from(err: &quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Syntax(_) => ErrorCode::GtRequired,
            quick_xml::Error::IllFormed(IllFormedError::DoubleHyphenInComment) => {
                ErrorCode::HyphenInComment
            }
            quick_xml::Error::InvalidAttr(_) => ErrorCode::AttributeError,
            _ => ErrorCode::NotWellBalanced,
        }
    }
}

/// How serious a recorded error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The document could still be used (XInclude problems, I/O after parsing).
    Error,
    /// Well-formedness was lost; the context stops building its tree.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Fatal => f.write_str("fatal error"),
        }
    }
}

/// A single error recorded by the engine.
///
/// Formats as `File F, line L, column C (fatal error): message`, leaving out
/// whichever location parts are unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    pub file: Option<PathBuf>,
    /// 1-based line, 0 when unknown.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    pub column: u32,
}

impl EngineError {
    pub fn fatal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Fatal,
            message: message.into(),
            file: None,
            line: 0,
            column: 0,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::fatal(code, message)
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn in_file(mut self, file: Option<&Path>) -> Self {
        self.file = file.map(Path::to_path_buf);
        self
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut location = Vec::new();
        if let Some(file) = &self.file {
            location.push(format!("File {}", file.display()));
        }
        if self.line > 0 {
            location.push(format!("line {}", self.line));
        }
        if self.column > 0 {
            location.push(format!("column {}", self.column));
        }

        if !location.is_empty() {
            write!(f, "{} ", location.join(", "))?;
        }
        write!(f, "({}): {}", self.severity, self.message)
    }
}

impl std::error::Error for EngineError {}

/// Why a parser context could not be created.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("failed to load \"{path}\": {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input buffer is empty")]
    EmptyBuffer,
}
