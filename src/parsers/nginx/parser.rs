//! nginx configuration parser

use super::include::{has_magic, IncludeResolver};
use super::lexer::{tokenize, Token};
use super::rules::{ContextPath, DirectiveRules};
use super::{ParsePayload, ParseUnit, Statement};
use crate::inventory::FsFailure;
use crate::parsers::{ParseError, ParseMode, ParseOptions};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of parsing a main config file and everything it includes
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub payload: ParsePayload,
    /// Directories that could not be listed while expanding includes
    pub broken_directories: BTreeMap<PathBuf, FsFailure>,
}

/// nginx configuration parser
pub struct NginxParser<'r> {
    rules: &'r DirectiveRules,
    options: ParseOptions,
}

impl<'r> NginxParser<'r> {
    pub fn new(rules: &'r DirectiveRules, options: ParseOptions) -> Self {
        Self { rules, options }
    }

    /// Parse `main` and every file it includes, each exactly once.
    ///
    /// Only an unreadable main file is an `Err`; every other problem is
    /// recorded in the payload.
    pub fn parse(&self, main: &Path) -> Result<ParseOutput, ParseError> {
        fs::File::open(main).map_err(|e| ParseError::io(main, e))?;

        let mut pass = Pass::new(self, main, self.options.follow_includes);
        pass.queue.push((main.to_path_buf(), ContextPath::root()));

        let mut next = 0;
        while next < pass.queue.len() {
            let (file, ctx) = pass.queue[next].clone();
            next += 1;
            if !pass.seen.insert(file.clone()) {
                continue;
            }
            pass.parse_file(file, &ctx);
        }

        info!(
            file = %main.display(),
            files = pass.payload.config.len(),
            errors = pass.payload.errors.len(),
            "parsed configuration"
        );
        Ok(ParseOutput {
            payload: pass.payload,
            broken_directories: pass.resolver.take_broken_directories(),
        })
    }

    /// Parse a single source text as if it were `file`.
    /// Includes are expanded but not followed.
    pub fn parse_source(&self, file: &Path, input: &str) -> ParseUnit {
        let mut pass = Pass::new(self, file, false);
        pass.payload.config.push(ParseUnit::new(file.to_path_buf()));
        pass.parse_text(0, file, input, &ContextPath::root());
        pass.payload
            .config
            .pop()
            .unwrap_or_else(|| ParseUnit::new(file.to_path_buf()))
    }
}

/// State of one parse pass
struct Pass<'p> {
    rules: &'p DirectiveRules,
    mode: ParseMode,
    follow_includes: bool,
    resolver: IncludeResolver,
    queue: Vec<(PathBuf, ContextPath)>,
    seen: HashSet<PathBuf>,
    payload: ParsePayload,
}

impl<'p> Pass<'p> {
    fn new(parser: &NginxParser<'p>, main: &Path, follow_includes: bool) -> Self {
        Self {
            rules: parser.rules,
            mode: parser.options.mode,
            follow_includes,
            resolver: IncludeResolver::new(main),
            queue: Vec::new(),
            seen: HashSet::new(),
            payload: ParsePayload::default(),
        }
    }

    fn parse_file(&mut self, file: PathBuf, ctx: &ContextPath) {
        debug!(file = %file.display(), "parsing file");
        let index = self.payload.config.len();
        self.payload.config.push(ParseUnit::new(file.clone()));

        match fs::read(&file) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                self.parse_text(index, &file, &text, ctx);
            }
            Err(e) => {
                let err = ParseError::io(&file, e);
                warn!(error = %err, "failed to read config file");
                self.payload.record_error(index, None, err.reason());
            }
        }
    }

    fn parse_text(&mut self, index: usize, file: &Path, text: &str, ctx: &ContextPath) {
        let mut tokens = tokenize(text, file);
        match self.parse_block(index, file, &mut tokens, ctx) {
            Ok(parsed) => self.payload.config[index].parsed = parsed,
            Err(e) => {
                info!(error = %e, "failed to parse config file");
                self.payload.record_error(index, e.line(), e.reason());
            }
        }
    }

    /// Parse statements until the closing `}` of the current block or EOF
    fn parse_block<I>(
        &mut self,
        index: usize,
        file: &Path,
        tokens: &mut I,
        ctx: &ContextPath,
    ) -> Result<Vec<Statement>, ParseError>
    where
        I: Iterator<Item = Result<Token, ParseError>>,
    {
        let mut parsed = Vec::new();

        while let Some(token) = tokens.next() {
            let token = token?;
            if token.is("}") {
                break;
            }
            if token.is("{") || token.is(";") {
                return Err(ParseError::syntax(
                    file,
                    token.line,
                    format!("unexpected \"{}\"", token.text),
                ));
            }

            let mut stmt = Statement::new(token.text, token.line);
            let mut last_line = token.line;
            let terminator = loop {
                let Some(arg) = tokens.next().transpose()? else {
                    return Err(ParseError::syntax(
                        file,
                        last_line,
                        "unexpected end of file, expecting \";\" or \"}\"",
                    ));
                };
                last_line = arg.line;
                if arg.is("{") || arg.is(";") {
                    break arg;
                }
                if arg.is("}") {
                    return Err(ParseError::syntax(file, arg.line, "unexpected \"}\""));
                }
                stmt.args.push(arg.text);
            };
            let opens_block = terminator.is("{");

            if stmt.directive == "if" {
                strip_if_parens(&mut stmt.args);
            }

            if let Err(e) = self.rules.analyze(file, &stmt, opens_block, ctx) {
                match self.mode {
                    ParseMode::Strict => return Err(e),
                    ParseMode::Tolerant => {
                        debug!(error = %e, "skipping invalid directive");
                        self.payload.record_error(index, e.line(), e.reason());
                        if opens_block {
                            consume_block(tokens)?;
                        }
                        continue;
                    }
                }
            }

            if stmt.directive == "include" {
                if let Some(pattern) = stmt.args.first().cloned() {
                    self.queue_include(index, &mut stmt, &pattern, ctx);
                }
            }

            if opens_block {
                let inner = ctx.enter(&stmt.directive);
                stmt.block = Some(self.parse_block(index, file, tokens, &inner)?);
            }

            parsed.push(stmt);
        }

        Ok(parsed)
    }

    fn queue_include(
        &mut self,
        index: usize,
        stmt: &mut Statement,
        pattern: &str,
        ctx: &ContextPath,
    ) {
        let paths = self.resolver.expand(pattern);
        if self.follow_includes {
            for path in &paths {
                if !has_magic(pattern) {
                    if let Err(e) = fs::File::open(path) {
                        let err = ParseError::io(path, e).at_line(stmt.line);
                        warn!(error = %err, line = stmt.line, "include target missing");
                        self.payload.record_error(index, err.line(), err.reason());
                        continue;
                    }
                }
                self.queue.push((path.clone(), ctx.clone()));
            }
        }
        stmt.includes = Some(paths);
    }
}

/// Discard tokens up to the `}` matching an already consumed `{`
fn consume_block<I>(tokens: &mut I) -> Result<(), ParseError>
where
    I: Iterator<Item = Result<Token, ParseError>>,
{
    let mut depth = 1usize;
    for token in tokens {
        let token = token?;
        if token.is("{") {
            depth += 1;
        } else if token.is("}") {
            depth -= 1;
            if depth == 0 {
                break;
            }
        }
    }
    Ok(())
}

/// `if ($a = b)` lexes as `($a`, `=`, `b)`; drop the parentheses
fn strip_if_parens(args: &mut Vec<String>) {
    let wrapped = match (args.first(), args.last()) {
        (Some(first), Some(last)) => first.starts_with('(') && last.ends_with(')'),
        _ => false,
    };
    if !wrapped {
        return;
    }

    let n = args.len();
    args[0] = args[0][1..].trim_start().to_string();
    let last = &args[n - 1];
    args[n - 1] = last[..last.len() - 1].trim_end().to_string();

    if args.last().is_some_and(|a| a.is_empty()) {
        args.pop();
    }
    if args.first().is_some_and(|a| a.is_empty()) {
        args.remove(0);
    }
}
