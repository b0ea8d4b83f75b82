//! Parser option bitmask.

use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Bitmask of parser options, laid out like libxml2's `xmlParserOption`.
///
/// Only the bits the engine acts on are named; unknown bits are carried
/// through untouched so masks supplied by callers merge losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParseFlags(u32);

impl ParseFlags {
    pub const NONE: Self = Self(0);
    /// Drop whitespace-only text nodes.
    pub const NOBLANKS: Self = Self(1 << 8);
    /// Run XInclude substitution after parsing.
    pub const XINCLUDE: Self = Self(1 << 10);
    /// Merge CDATA sections into text nodes.
    pub const NOCDATA: Self = Self(1 << 14);
    /// Don't leave XInclude start/end marker nodes in the tree.
    pub const NOXINCNODE: Self = Self(1 << 15);
    /// Don't add `xml:base` to included elements.
    pub const NOBASEFIX: Self = Self(1 << 18);

    const NAMED: [(&'static str, ParseFlags); 5] = [
        ("noblanks", Self::NOBLANKS),
        ("xinclude", Self::XINCLUDE),
        ("nocdata", Self::NOCDATA),
        ("noxincnode", Self::NOXINCNODE),
        ("nobasefix", Self::NOBASEFIX),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Look up a named option, case-insensitively (`"noblanks"`, `"xinclude"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, flag)| *flag)
    }

    /// Names of the known options set in this mask.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for ParseFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParseFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ParseFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for ParseFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for ParseFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_values() {
        assert_eq!(ParseFlags::NOBLANKS.bits(), 256);
        assert_eq!(ParseFlags::XINCLUDE.bits(), 1024);
        assert_eq!(ParseFlags::NOXINCNODE.bits(), 32_768);
        assert_eq!(ParseFlags::NOBASEFIX.bits(), 262_144);
    }

    #[test]
    fn test_set_and_contains() {
        let mut flags = ParseFlags::NONE;
        flags.set(ParseFlags::XINCLUDE, true);
        flags.set(ParseFlags::NOBLANKS, true);
        assert!(flags.contains(ParseFlags::XINCLUDE | ParseFlags::NOBLANKS));

        flags.set(ParseFlags::XINCLUDE, false);
        assert!(!flags.contains(ParseFlags::XINCLUDE));
        assert!(flags.contains(ParseFlags::NOBLANKS));
    }

    #[test]
    fn test_names_round_trip() {
        assert_eq!(ParseFlags::from_name("NoBlanks"), Some(ParseFlags::NOBLANKS));
        assert_eq!(ParseFlags::from_name("recover"), None);

        let flags = ParseFlags::XINCLUDE | ParseFlags::NOBASEFIX;
        assert_eq!(flags.names(), vec!["xinclude", "nobasefix"]);
    }

    #[test]
    fn test_unknown_bits_survive_merging() {
        let custom = ParseFlags::from_bits(1 << 2);
        let merged = (custom | ParseFlags::XINCLUDE) & !ParseFlags::NOBLANKS;
        assert_eq!(merged.bits(), (1 << 2) | (1 << 10));
    }
}
