//! Per-thread engine configuration.
//!
//! The engine keeps two pieces of ambient state that parser contexts read when
//! they are created: the default whitespace policy and the last recorded
//! error. Both are thread-local, so independent threads never observe each
//! other's settings. Parse entry points wrap them in an [`EngineScope`].

use std::cell::{Cell, RefCell};

use crate::EngineError;

thread_local! {
    static KEEP_BLANKS: Cell<bool> = const { Cell::new(true) };
    static LAST_ERROR: RefCell<Option<EngineError>> = const { RefCell::new(None) };
}

/// Whitespace policy new parser contexts start with.
pub fn keep_blanks_default() -> bool {
    KEEP_BLANKS.with(Cell::get)
}

/// Set the whitespace policy for new contexts, returning the previous value.
pub fn set_keep_blanks_default(keep: bool) -> bool {
    KEEP_BLANKS.with(|cell| cell.replace(keep))
}

/// The most recent error recorded by any context on this thread.
pub fn last_error() -> Option<EngineError> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub fn reset_last_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().take());
}

pub(crate) fn set_last_error(err: &EngineError) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.clone()));
}

/// Scoped acquisition of the engine's per-thread configuration.
///
/// Entering a scope installs the requested whitespace default and clears the
/// last error; dropping it restores the whitespace default that was in effect
/// before, on every exit path.
#[must_use = "the previous configuration is restored when the scope is dropped"]
#[derive(Debug)]
pub struct EngineScope {
    previous_keep_blanks: bool,
}

impl EngineScope {
    /// libxml2's default: whitespace-only text is kept.
    pub const DEFAULT_KEEP_BLANKS: bool = true;

    pub fn enter(keep_blanks: bool) -> Self {
        let previous_keep_blanks = set_keep_blanks_default(keep_blanks);
        reset_last_error();
        tracing::trace!(keep_blanks, previous_keep_blanks, "entered engine scope");
        Self {
            previous_keep_blanks,
        }
    }
}

impl Drop for EngineScope {
    fn drop(&mut self) {
        set_keep_blanks_default(self.previous_keep_blanks);
    }
}
