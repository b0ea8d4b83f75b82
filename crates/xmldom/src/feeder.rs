//! Line-by-line feeding of a push context.

use std::io::BufRead;

use xmldom_engine::{ErrorCode, ParserContext};

use crate::aggregate::{CallStatus, Operation};

/// What a feeder run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedReport {
    /// Lines passed to the engine.
    pub lines: usize,
    /// Bytes the engine received during the run, including the re-appended
    /// newlines.
    pub bytes: usize,
    /// Code of the first engine call that failed.
    pub first_error: Option<ErrorCode>,
}

impl FeedReport {
    fn note(&mut self, result: Result<(), ErrorCode>) {
        if let Err(code) = result {
            self.first_error.get_or_insert(code);
        }
    }

    pub fn status(&self) -> CallStatus {
        match self.first_error {
            None => CallStatus::Succeeded,
            Some(code) => CallStatus::Failed {
                operation: Operation::ParseChunk,
                code: Some(code),
            },
        }
    }
}

/// Feeds a reader to a push context one line at a time.
///
/// Each line is passed on as raw bytes with a single `\n` appended, whatever
/// the source's line ending. Feeding continues past engine errors so the
/// context sees the whole input, and always ends with a terminating empty
/// chunk.
pub struct ChunkFeeder<'c> {
    context: &'c mut ParserContext,
}

impl<'c> ChunkFeeder<'c> {
    pub fn new(context: &'c mut ParserContext) -> Self {
        Self { context }
    }

    pub fn feed<R: BufRead>(self, reader: R) -> FeedReport {
        let mut report = FeedReport::default();
        let bytes_before = self.context.bytes_fed();

        for line in reader.split(b'\n') {
            match line {
                Ok(mut line) => {
                    line.push(b'\n');
                    report.lines += 1;
                    let result = self.context.parse_chunk(&line, false);
                    report.note(result);
                }
                Err(err) => {
                    tracing::warn!(error = %err, lines = report.lines, "stream read failed");
                    self.context.record_io_error(&err);
                    report.note(Err(ErrorCode::IoError));
                    break;
                }
            }
        }

        let result = self.context.parse_chunk(&[], true);
        report.note(result);
        report.bytes = self.context.bytes_fed() - bytes_before;

        tracing::debug!(
            lines = report.lines,
            bytes = report.bytes,
            first_error = ?report.first_error,
            "stream fed"
        );
        report
    }
}
