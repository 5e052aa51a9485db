//! Diagnostic levels.
//!
//! One bit per level so masks can filter reporting. Bit positions are
//! stable; scripts observe them as integer level codes.

use bitflags::bitflags;

/// Bit positions for each level.
pub const B_ERROR: u32 = 0;
pub const B_WARNING: u32 = 1;
pub const B_PARSE: u32 = 2;
pub const B_NOTICE: u32 = 3;
pub const B_CORE_ERROR: u32 = 4;
pub const B_CORE_WARNING: u32 = 5;
pub const B_COMPILE_ERROR: u32 = 6;
pub const B_COMPILE_WARNING: u32 = 7;
pub const B_USER_ERROR: u32 = 8;
pub const B_USER_WARNING: u32 = 9;
pub const B_USER_NOTICE: u32 = 10;
pub const B_STRICT: u32 = 11;
pub const B_RECOVERABLE_ERROR: u32 = 12;
pub const B_DEPRECATED: u32 = 13;
pub const B_USER_DEPRECATED: u32 = 14;

/// Number of level bits in use.
pub const NUM_LEVELS: usize = 15;

bitflags! {
    /// Diagnostic level mask.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Level: u32 {
        const ERROR = 1 << B_ERROR;
        const WARNING = 1 << B_WARNING;
        const PARSE = 1 << B_PARSE;
        const NOTICE = 1 << B_NOTICE;
        const CORE_ERROR = 1 << B_CORE_ERROR;
        const CORE_WARNING = 1 << B_CORE_WARNING;
        const COMPILE_ERROR = 1 << B_COMPILE_ERROR;
        const COMPILE_WARNING = 1 << B_COMPILE_WARNING;
        const USER_ERROR = 1 << B_USER_ERROR;
        const USER_WARNING = 1 << B_USER_WARNING;
        const USER_NOTICE = 1 << B_USER_NOTICE;
        const STRICT = 1 << B_STRICT;
        const RECOVERABLE_ERROR = 1 << B_RECOVERABLE_ERROR;
        const DEPRECATED = 1 << B_DEPRECATED;
        const USER_DEPRECATED = 1 << B_USER_DEPRECATED;
    }
}

impl Level {
    /// Levels that abort the run when unhandled.
    pub const FATAL: Level = Level::ERROR
        .union(Level::PARSE)
        .union(Level::CORE_ERROR)
        .union(Level::COMPILE_ERROR)
        .union(Level::USER_ERROR);

    /// The default reporting mask: everything except strict and deprecated.
    pub const DEFAULT_MASK: Level = Level::all()
        .difference(Level::STRICT)
        .difference(Level::DEPRECATED)
        .difference(Level::USER_DEPRECATED);

    /// The single bit position for a one-bit level.
    ///
    /// Returns `None` for empty or multi-bit masks.
    pub fn bit(self) -> Option<u32> {
        let raw = self.bits();
        if raw != 0 && raw.is_power_of_two() {
            Some(raw.trailing_zeros())
        } else {
            None
        }
    }

    /// True if this level aborts the run when no handler intervenes.
    #[inline]
    pub fn is_fatal(self) -> bool {
        Level::FATAL.intersects(self)
    }

    /// Human-readable prefix for reported messages.
    pub fn prefix(self) -> &'static str {
        match self {
            Level::ERROR | Level::CORE_ERROR | Level::COMPILE_ERROR | Level::USER_ERROR => {
                "Fatal Error: "
            }
            Level::PARSE => "Parse Error: ",
            Level::WARNING | Level::CORE_WARNING | Level::COMPILE_WARNING | Level::USER_WARNING => {
                "Warning: "
            }
            Level::NOTICE | Level::USER_NOTICE => "Notice: ",
            Level::STRICT => "Strict Standards: ",
            Level::RECOVERABLE_ERROR => "Recoverable Fatal Error: ",
            Level::DEPRECATED | Level::USER_DEPRECATED => "Deprecated: ",
            _ => "Error: ",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_levels() {
        assert!(Level::ERROR.is_fatal());
        assert!(Level::USER_ERROR.is_fatal());
        assert!(!Level::WARNING.is_fatal());
        assert!(!Level::NOTICE.is_fatal());
        assert!(!Level::RECOVERABLE_ERROR.is_fatal());
    }

    #[test]
    fn default_mask_excludes_strict_and_deprecated() {
        assert!(!Level::DEFAULT_MASK.contains(Level::STRICT));
        assert!(!Level::DEFAULT_MASK.contains(Level::DEPRECATED));
        assert!(Level::DEFAULT_MASK.contains(Level::NOTICE));
    }

    #[test]
    fn bit_of_single_level() {
        assert_eq!(Level::WARNING.bit(), Some(B_WARNING));
        assert_eq!(Level::USER_DEPRECATED.bit(), Some(B_USER_DEPRECATED));
        assert_eq!((Level::ERROR | Level::WARNING).bit(), None);
        assert_eq!(Level::empty().bit(), None);
    }
}
