//! The post-parse XInclude step.

use std::path::Path;

use xmldom_engine::{IncludeResolver, ParseFlags, XmlTree, xinclude};

use crate::aggregate::include_diagnostic;
use crate::error::{ParseError, Result};
use crate::options::{ParserOptions, XIncludeOptions};

/// Runs XInclude substitution with a session's stored options and overrides.
pub struct LinkInclusionProcessor<'a> {
    options: XIncludeOptions,
    overrides: ParserOptions,
    resolver: &'a dyn IncludeResolver,
}

impl<'a> LinkInclusionProcessor<'a> {
    pub fn new(
        options: XIncludeOptions,
        overrides: ParserOptions,
        resolver: &'a dyn IncludeResolver,
    ) -> Self {
        Self {
            options,
            overrides,
            resolver,
        }
    }

    /// Stored options merged with the forced overrides.
    pub fn effective_flags(&self) -> ParseFlags {
        self.overrides.merge(self.options.to_flags())
    }

    /// Substitute includes in `tree`, returning how many were replaced.
    ///
    /// Does nothing, and reports zero, when processing is disabled.
    pub fn process(&self, tree: &mut XmlTree, base_dir: &Path) -> Result<usize> {
        let flags = self.effective_flags();
        if !flags.contains(ParseFlags::XINCLUDE) {
            return Ok(0);
        }

        tracing::debug!(flags = ?flags.names(), base = %base_dir.display(), "processing xinclude");
        xinclude::process(tree, flags, base_dir, self.resolver).map_err(|err| {
            ParseError::LinkInclusion {
                diagnostic: include_diagnostic(&err),
            }
        })
    }
}
