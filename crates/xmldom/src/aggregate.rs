//! Turning engine error records into diagnostics.
//!
//! Every stage that can fail reduces to the same question: did the engine
//! leave an error record, and if not, did the call itself report failure?
//! The detailed record always wins; codes and generic messages only fill in
//! when the engine said nothing.

use xmldom_engine::{EngineError, ErrorCode, ParserContext, last_error};

/// Engine call whose outcome is being judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateContext,
    ParseDocument,
    ParseChunk,
}

impl Operation {
    fn generic_message(self) -> &'static str {
        match self {
            Operation::CreateContext => "Could not create parser context",
            Operation::ParseDocument => "parse_document() failed.",
            Operation::ParseChunk => "parse_chunk() failed.",
        }
    }

    fn code_message(self, code: ErrorCode) -> String {
        match self {
            Operation::CreateContext => self.generic_message().to_string(),
            Operation::ParseDocument => format!("Error code from parse_document(): {}", code),
            Operation::ParseChunk => format!("Error code from parse_chunk(): {}", code),
        }
    }
}

/// How the engine call(s) of one parse ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Succeeded,
    Failed {
        operation: Operation,
        code: Option<ErrorCode>,
    },
}

impl CallStatus {
    pub fn from_result(operation: Operation, result: Result<(), ErrorCode>) -> Self {
        match result {
            Ok(()) => CallStatus::Succeeded,
            Err(code) => CallStatus::Failed {
                operation,
                code: Some(code),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CallStatus::Failed { .. })
    }
}

/// The context's error record as one string; empty when nothing was recorded.
pub fn format_parser_error(context: &ParserContext) -> String {
    let errors = context.errors();
    if errors.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    if !context.is_well_formed() {
        out.push_str("Document not well-formed.\n");
    }
    let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
    out.push_str(&lines.join("\n"));
    out
}

/// The diagnostic for a finished parse, or `None` if it succeeded.
///
/// A non-empty error record means failure even when the call reported
/// success.
pub fn diagnostic(context: &ParserContext, status: &CallStatus) -> Option<String> {
    let recorded = format_parser_error(context);
    if !recorded.is_empty() {
        return Some(recorded);
    }

    match status {
        CallStatus::Succeeded => None,
        CallStatus::Failed {
            operation,
            code: Some(code),
        } => Some(operation.code_message(*code)),
        CallStatus::Failed {
            operation,
            code: None,
        } => Some(operation.generic_message().to_string()),
    }
}

/// Diagnostic for a context that could not be created, using the thread's
/// last engine error when there is one.
pub fn context_creation_diagnostic() -> String {
    let mut out = Operation::CreateContext.generic_message().to_string();
    if let Some(err) = last_error() {
        out.push('\n');
        out.push_str(&err.to_string());
    }
    out
}

/// Diagnostic for a failed XInclude pass.
pub fn include_diagnostic(err: &EngineError) -> String {
    format!("Couldn't process XInclude\n{}", err)
}
