//! Parse options.

use serde::Deserialize;
use xmldom_engine::ParseFlags;

/// XInclude behaviour, as three independent toggles.
///
/// Encoded into engine flags only when the pass runs: `XINCLUDE` when
/// `process` is on, `NOXINCNODE` when `generate_nodes` is off, `NOBASEFIX`
/// when `fixup_base_uris` is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct XIncludeOptions {
    /// Substitute `xi:include` elements after parsing.
    pub process: bool,
    /// Surround substituted content with start/end marker nodes.
    pub generate_nodes: bool,
    /// Add `xml:base` to included elements from other directories.
    pub fixup_base_uris: bool,
}

impl Default for XIncludeOptions {
    fn default() -> Self {
        Self {
            process: false,
            generate_nodes: true,
            fixup_base_uris: true,
        }
    }
}

impl XIncludeOptions {
    pub fn new(process: bool, generate_nodes: bool, fixup_base_uris: bool) -> Self {
        Self {
            process,
            generate_nodes,
            fixup_base_uris,
        }
    }

    pub fn to_flags(self) -> ParseFlags {
        let mut flags = ParseFlags::NONE;
        flags.set(ParseFlags::XINCLUDE, self.process);
        flags.set(ParseFlags::NOXINCNODE, !self.generate_nodes);
        flags.set(ParseFlags::NOBASEFIX, !self.fixup_base_uris);
        flags
    }
}

/// Forced overrides applied on top of stored options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Bits forced on.
    pub set: ParseFlags,
    /// Bits forced off; wins over `set`.
    pub clear: ParseFlags,
}

impl ParserOptions {
    pub fn new(set: ParseFlags, clear: ParseFlags) -> Self {
        Self { set, clear }
    }

    /// `(stored | set) & !clear`
    pub fn merge(self, stored: ParseFlags) -> ParseFlags {
        (stored | self.set) & !self.clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = XIncludeOptions::default();
        assert!(!options.process);
        assert!(options.generate_nodes);
        assert!(options.fixup_base_uris);
        assert!(options.to_flags().is_empty());
    }

    #[test]
    fn test_flag_encoding() {
        let flags = XIncludeOptions::new(true, false, false).to_flags();
        assert_eq!(
            flags,
            ParseFlags::XINCLUDE | ParseFlags::NOXINCNODE | ParseFlags::NOBASEFIX
        );

        let flags = XIncludeOptions::new(true, true, true).to_flags();
        assert_eq!(flags, ParseFlags::XINCLUDE);
    }

    #[test]
    fn test_merge_law() {
        let stored = ParseFlags::XINCLUDE | ParseFlags::NOBASEFIX;

        let overrides = ParserOptions::new(ParseFlags::NOXINCNODE, ParseFlags::XINCLUDE);
        assert_eq!(
            overrides.merge(stored),
            ParseFlags::NOBASEFIX | ParseFlags::NOXINCNODE
        );

        // clear wins when a bit is both set and cleared
        let both = ParserOptions::new(ParseFlags::NOBLANKS, ParseFlags::NOBLANKS);
        assert!(!both.merge(stored).contains(ParseFlags::NOBLANKS));

        assert_eq!(ParserOptions::default().merge(stored), stored);
    }

    #[test]
    fn test_merge_forces_every_known_option() {
        let all = ParseFlags::NOBLANKS
            | ParseFlags::XINCLUDE
            | ParseFlags::NOCDATA
            | ParseFlags::NOXINCNODE
            | ParseFlags::NOBASEFIX;

        // nothing stored, everything set, nothing cleared
        assert_eq!(ParserOptions::new(all, ParseFlags::NONE).merge(ParseFlags::NONE), all);

        // everything stored and cleared: nothing survives, whatever is set
        let sets = [
            ParseFlags::NONE,
            ParseFlags::NOBLANKS,
            ParseFlags::XINCLUDE | ParseFlags::NOCDATA,
            all,
        ];
        for set in sets {
            let merged = ParserOptions::new(set, all).merge(all);
            assert_eq!(merged & all, ParseFlags::NONE, "set {:?}", set.names());
        }
    }
}
