//! Error types
//!
//! Errors are reported with [`error_stack::Report`]. The top level context of
//! everything returned by the [`Renderer`](crate::Renderer) is a [`RenderError`];
//! the more specific contexts below it in the report ([`ParseError`], [`ExecError`],
//! [`FuncError`], [`ConfigError`], [`FileError`]) carry the details.

use std::error;
use std::fmt;
use std::path::Path;

/// Top level error, one variant per failing stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    /// The configuration is absent or failed its own validation
    Configuration,
    /// A delimiter is empty
    Delimiter,
    /// The template text could not be parsed
    Parse,
    /// The parsed template could not be executed
    Execution,
    /// Nested `render` calls went past the configured bound
    RecursionLimit,
    /// Reading the template or writing the output failed
    Io,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Invalid configuration."),
            Self::Delimiter => write!(f, "Invalid delimiter."),
            Self::Parse => write!(f, "Can't parse the template."),
            Self::Execution => write!(f, "Can't execute the template."),
            Self::RecursionLimit => write!(f, "Too many nested renders."),
            Self::Io => write!(f, "Could not read or write the template."),
        }
    }
}

impl error::Error for RenderError {}

/// Line and column of a byte offset inside a named template
///
/// The line is 1-based, the column is the 0-based byte offset within the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub name: String,
    pub line: usize,
    pub col: usize,
}

impl Location {
    /// Locate the byte offset `pos` inside `text`
    pub fn new(name: &str, text: &str, pos: usize) -> Self {
        let pos = pos.min(text.len());
        let before = &text.as_bytes()[..pos];
        let line = 1 + before.iter().filter(|b| **b == b'\n').count();
        let col = match before.iter().rposition(|b| *b == b'\n') {
            Some(i) => pos - i - 1,
            None => pos,
        };
        Self {
            name: name.to_string(),
            line,
            col,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.line, self.col)
    }
}

/// Syntax error in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "template: {}: {}", self.location, self.message)
    }
}

impl error::Error for ParseError {}

/// Error evaluating a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    /// Where in the source the failing node is
    pub location: Location,
    /// Name of the template (or `define` block) being executed
    pub executing: String,
    /// The failing node, printed back as template source
    pub node: String,
    pub message: String,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "template: {}: executing \"{}\" at <{}>: {}",
            self.location, self.executing, self.node, self.message
        )
    }
}

impl error::Error for ExecError {}

/// Error raised by a template function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncError {
    pub reason: String,
}

impl FuncError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FuncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl error::Error for FuncError {}

/// Error loading or validating a configuration
#[derive(Debug)]
pub struct ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Configuration is invalid.")
    }
}

impl error::Error for ConfigError {}

/// An option literal that is not one of the recognized ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionError {
    pub literal: String,
}

impl fmt::Display for OptionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unexpected option: '{}', option must be in: '{}, {}'",
            self.literal,
            crate::constants::MISSING_KEY_INVALID,
            crate::constants::MISSING_KEY_ERROR
        )
    }
}

impl error::Error for OptionError {}

/// Error related to reading or writing a file
#[derive(Debug)]
pub struct FileError {
    /// The path that caused the error, as a string. Empty for stdin/stdout
    pub path: String,
}

impl<P> From<&P> for FileError
where
    P: AsRef<Path> + ?Sized,
{
    fn from(p: &P) -> Self {
        Self {
            path: p.as_ref().display().to_string(),
        }
    }
}

impl fmt::Display for FileError {
    #[cfg(windows)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // remove the `\\?\` prefix returned by `canonicalize` on windows
        let path = self.path.strip_prefix(r"\\?\").unwrap_or(&self.path);
        Self::fmt_internal(path, f)
    }
    #[cfg(not(windows))]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Self::fmt_internal(&self.path, f)
    }
}

impl error::Error for FileError {}

impl FileError {
    fn fmt_internal(p: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if p.is_empty() {
            write!(f, "Error in standard stream")
        } else {
            write!(f, "Error in path `{p}`")
        }
    }
}

#[cfg(test)]
mod ut {
    use super::*;

    #[test]
    fn test_location_first_line() {
        let loc = Location::new("stdin", "{{ .missing }}", 3);
        assert_eq!(1, loc.line);
        assert_eq!(3, loc.col);
        assert_eq!("stdin:1:3", loc.to_string());
    }

    #[test]
    fn test_location_after_newline() {
        let text = "a\nbc\n  {{ x }}";
        let loc = Location::new("t", text, text.find("x").unwrap());
        assert_eq!("t:3:5", loc.to_string());
    }

    #[test]
    fn test_location_clamped() {
        let loc = Location::new("t", "ab", 10);
        assert_eq!("t:1:2", loc.to_string());
    }

    #[test]
    fn test_exec_error_message() {
        let e = ExecError {
            location: Location::new("stdin", "{{ .missing }}", 3),
            executing: "stdin".to_string(),
            node: ".missing".to_string(),
            message: "map has no entry for key \"missing\"".to_string(),
        };
        assert_eq!(
            "template: stdin:1:3: executing \"stdin\" at <.missing>: map has no entry for key \"missing\"",
            e.to_string()
        );
    }
}
