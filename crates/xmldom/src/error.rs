//! Parse failures.

use std::fmt;

use thiserror::Error;

/// Result type alias for parse operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Which stage of a parse failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// The engine could not set up parsing for the input.
    ContextCreation,
    /// The input is not a well-formed document.
    ContentParse,
    /// XInclude substitution failed.
    LinkInclusion,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCategory::ContextCreation => f.write_str("context creation"),
            FailureCategory::ContentParse => f.write_str("content parse"),
            FailureCategory::LinkInclusion => f.write_str("link inclusion"),
        }
    }
}

/// A failed parse. No document is produced and all parser state has been
/// released by the time the caller sees this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{diagnostic}")]
    ContextCreation { diagnostic: String },

    #[error("{diagnostic}")]
    ContentParse { diagnostic: String },

    #[error("{diagnostic}")]
    LinkInclusion { diagnostic: String },
}

impl ParseError {
    pub fn new(category: FailureCategory, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        match category {
            FailureCategory::ContextCreation => ParseError::ContextCreation { diagnostic },
            FailureCategory::ContentParse => ParseError::ContentParse { diagnostic },
            FailureCategory::LinkInclusion => ParseError::LinkInclusion { diagnostic },
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            ParseError::ContextCreation { .. } => FailureCategory::ContextCreation,
            ParseError::ContentParse { .. } => FailureCategory::ContentParse,
            ParseError::LinkInclusion { .. } => FailureCategory::LinkInclusion,
        }
    }

    /// The human-readable diagnostic, never empty.
    pub fn diagnostic(&self) -> &str {
        match self {
            ParseError::ContextCreation { diagnostic }
            | ParseError::ContentParse { diagnostic }
            | ParseError::LinkInclusion { diagnostic } => diagnostic,
        }
    }
}
