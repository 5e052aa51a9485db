//! Diagnostic records and the fatal error type.

use crate::Level;
use std::fmt;

/// Source location attached to a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Location {
    /// Script file name, if known.
    pub file: Option<String>,
    /// 1-based line number; 0 when unknown.
    pub line: u32,
}

impl Location {
    /// A location with file and line.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Location {
            file: Some(file.into()),
            line,
        }
    }

    /// True when neither file nor line is known.
    pub fn is_unknown(&self) -> bool {
        self.file.is_none() && self.line == 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), 0) => write!(f, "{file}"),
            (Some(file), line) => write!(f, "{file}:{line}"),
            (None, line) if line > 0 => write!(f, "line {line}"),
            _ => Ok(()),
        }
    }
}

/// A single reported condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// The one-bit level this was raised at.
    pub level: Level,
    /// Message text, without prefix or location.
    pub message: String,
    /// Where it was raised, when known.
    pub location: Location,
}

impl Diagnostic {
    /// Create a diagnostic with no location.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Diagnostic {
            level,
            message: message.into(),
            location: Location::default(),
        }
    }

    /// Attach a location.
    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.level.prefix(), self.message)?;
        if !self.location.is_unknown() {
            write!(f, " in {}", self.location)?;
        }
        Ok(())
    }
}

/// A fatal condition that aborts the current run.
///
/// Raised for unhandled fatal-level diagnostics and for internal
/// invariant violations (corrupted table ids, missing parents).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeError {
    /// Level the error was raised at.
    pub level: Level,
    /// Message text.
    pub message: String,
    /// Where it was raised, when known.
    pub location: Location,
}

impl RuntimeError {
    /// A fatal error at `Level::ERROR`.
    pub fn fatal(message: impl Into<String>) -> Self {
        RuntimeError {
            level: Level::ERROR,
            message: message.into(),
            location: Location::default(),
        }
    }

    /// A recoverable fatal error.
    pub fn recoverable(message: impl Into<String>) -> Self {
        RuntimeError {
            level: Level::RECOVERABLE_ERROR,
            message: message.into(),
            location: Location::default(),
        }
    }

    /// Attach a location.
    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.level.prefix(), self.message)?;
        if !self.location.is_unknown() {
            write!(f, " in {}", self.location)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Result alias for operations that can abort the run.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diagnostic_display_includes_prefix_and_location() {
        let diag = Diagnostic::new(Level::WARNING, "undefined index: foo")
            .at(Location::new("index.php", 12));
        assert_eq!(
            diag.to_string(),
            "Warning: undefined index: foo in index.php:12"
        );
    }

    #[test]
    fn diagnostic_without_location_omits_suffix() {
        let diag = Diagnostic::new(Level::NOTICE, "undefined variable: a");
        assert_eq!(diag.to_string(), "Notice: undefined variable: a");
    }

    #[test]
    fn runtime_error_is_fatal_level() {
        let err = RuntimeError::fatal("class 'Foo' not found");
        assert!(err.level.is_fatal());
        assert_eq!(err.to_string(), "Fatal Error: class 'Foo' not found");
    }
}
