//! nginx configuration parsing
//!
//! The pipeline is split the same way nginx itself works: a lexer turns
//! bytes into tokens, a context parser builds statements and validates them
//! against a directive rule table, and an include resolver expands `include`
//! patterns into further files to parse.

pub mod nginx;

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{message} in {}:{line}", .file.display())]
    Syntax {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{message} in {}:{line}", .file.display())]
    Directive {
        file: PathBuf,
        line: usize,
        message: String,
        violation: Violation,
    },

    #[error("{message} in {}:{line}", .file.display())]
    DirectiveArguments {
        file: PathBuf,
        line: usize,
        message: String,
        violation: Violation,
    },

    #[error("{message} in {}:{line}", .file.display())]
    DirectiveContext {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{source}: '{}'", .path.display())]
    Io {
        path: PathBuf,
        line: Option<usize>,
        #[source]
        source: io::Error,
    },
}

impl ParseError {
    pub fn syntax(file: &Path, line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            file: file.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            line: None,
            source,
        }
    }

    /// Attach the line of the statement that referenced a missing file
    pub fn at_line(mut self, at: usize) -> Self {
        if let Self::Io { line, .. } = &mut self {
            *line = Some(at);
        }
        self
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. }
            | Self::Directive { line, .. }
            | Self::DirectiveArguments { line, .. }
            | Self::DirectiveContext { line, .. } => Some(*line),
            Self::Io { line, .. } => *line,
        }
    }

    /// Why the error happened, without the location suffix
    pub fn reason(&self) -> String {
        match self {
            Self::Syntax { message, .. }
            | Self::Directive { message, .. }
            | Self::DirectiveArguments { message, .. }
            | Self::DirectiveContext { message, .. } => message.clone(),
            Self::Io { .. } => self.to_string(),
        }
    }

    /// Which directive rule was broken, if this is a directive error
    pub fn violation(&self) -> Option<Violation> {
        match self {
            Self::Directive { violation, .. } | Self::DirectiveArguments { violation, .. } => {
                Some(*violation)
            }
            Self::DirectiveContext { .. } => Some(Violation::NotAllowedHere),
            _ => None,
        }
    }

    pub fn is_directive_error(&self) -> bool {
        self.violation().is_some()
    }
}

/// The directive rule that a statement broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    UnknownDirective,
    NotAllowedHere,
    MissingBlock,
    NotTerminated,
    ArgumentCount,
    InvalidFlag,
}

/// How the context parser reacts to directive errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// The first directive error aborts the file
    Strict,
    /// Directive errors are recorded and the offending block is skipped
    #[default]
    Tolerant,
}

/// Parser options
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Error handling mode
    pub mode: ParseMode,
    /// Follow include directives
    pub follow_includes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            mode: ParseMode::Tolerant,
            follow_includes: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_matches_nginx() {
        let err = ParseError::syntax(Path::new("/etc/nginx/nginx.conf"), 11, "unexpected \"}\"");
        assert_eq!(err.to_string(), "unexpected \"}\" in /etc/nginx/nginx.conf:11");
        assert_eq!(err.line(), Some(11));
        assert!(!err.is_directive_error());
    }

    #[test]
    fn test_io_error_line_attachment() {
        let source = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let err = ParseError::io(Path::new("/etc/nginx/missing.conf"), source).at_line(13);
        assert_eq!(err.line(), Some(13));
        assert_eq!(
            err.reason(),
            "No such file or directory: '/etc/nginx/missing.conf'"
        );
    }

    #[test]
    fn test_context_error_violation() {
        let err = ParseError::DirectiveContext {
            file: PathBuf::from("nginx.conf"),
            line: 9,
            message: "\"http\" directive is not allowed here".to_string(),
        };
        assert_eq!(err.violation(), Some(Violation::NotAllowedHere));
        assert_eq!(
            err.to_string(),
            "\"http\" directive is not allowed here in nginx.conf:9"
        );
    }
}
