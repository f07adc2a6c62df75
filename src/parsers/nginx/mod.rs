//! nginx configuration parser

mod densify;
mod include;
mod lexer;
mod parser;
mod rules;

pub use densify::{
    argstring, densify, enquote, merge_blocks, split_args, store_directive, unescape, Densified,
    IGNORED_DIRECTIVES,
};
pub use include::{absolutize, has_magic, iglob, normalize, IncludeResolver};
pub use lexer::{tokenize, tokenize_str, BalancedTokens, RawTokens, Token};
pub use parser::{NginxParser, ParseOutput};
pub use rules::{Context, ContextPath, DirectiveRules, Rule};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A nginx directive (simple or block)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub directive: String,
    pub line: usize,
    pub args: Vec<String>,
    /// Files an `include` statement expanded to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Vec<Statement>>,
}

impl Statement {
    pub fn new(directive: impl Into<String>, line: usize) -> Self {
        Self {
            directive: directive.into(),
            line,
            args: Vec::new(),
            includes: None,
            block: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Check if this is a block directive
    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }

    /// Get the first argument
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// Find child directive by name
    pub fn find_directive(&self, name: &str) -> Option<&Statement> {
        self.children().iter().find(|d| d.directive == name)
    }

    /// Get block children
    pub fn children(&self) -> &[Statement] {
        self.block.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Ok,
    Failed,
}

/// An error recorded against one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    pub line: Option<usize>,
    pub error: String,
}

/// An error in the pass-wide error feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadError {
    pub file: PathBuf,
    pub line: Option<usize>,
    pub error: String,
}

/// Parse result of one physical file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseUnit {
    pub file: PathBuf,
    pub status: Status,
    pub errors: Vec<UnitError>,
    pub parsed: Vec<Statement>,
}

impl ParseUnit {
    pub fn new(file: PathBuf) -> Self {
        Self {
            file,
            status: Status::Ok,
            errors: Vec::new(),
            parsed: Vec::new(),
        }
    }
}

/// Every file parsed during one pass, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsePayload {
    pub status: Status,
    pub errors: Vec<PayloadError>,
    pub config: Vec<ParseUnit>,
}

impl ParsePayload {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn unit(&self, file: &Path) -> Option<&ParseUnit> {
        self.config.iter().find(|u| u.file == file)
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.config.iter().map(|u| u.file.as_path())
    }

    /// Record an error on the unit at `index` and in the pass-wide feed
    pub fn record_error(&mut self, index: usize, line: Option<usize>, error: String) {
        let Some(unit) = self.config.get_mut(index) else {
            return;
        };
        unit.status = Status::Failed;
        unit.errors.push(UnitError {
            line,
            error: error.clone(),
        });
        self.status = Status::Failed;
        self.errors.push(PayloadError {
            file: unit.file.clone(),
            line,
            error,
        });
    }
}
