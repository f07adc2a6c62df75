//! nginx configuration lexer
//!
//! Lexing happens in two stages. [`RawTokens`] splits text into tokens and
//! knows about quoting, escaping, comments and `${...}` expansions.
//! [`BalancedTokens`] wraps any token stream and fails on unbalanced braces.
//! The raw stage is usable on fragments where brace balance is meaningless.

use crate::parsers::ParseError;
use std::collections::VecDeque;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

/// A lexed token and the line it starts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub line: usize,
    /// Came from a quoted string, so it is never structural
    pub quoted: bool,
}

impl Token {
    fn bare(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
            quoted: false,
        }
    }

    /// `{`, `}` or `;` outside of quotes
    pub fn is_structural(&self) -> bool {
        !self.quoted && matches!(self.text.as_str(), "{" | "}" | ";")
    }

    pub fn is(&self, text: &str) -> bool {
        !self.quoted && self.text == text
    }
}

/// One logical character: a backslash always binds to the character after it
#[derive(Debug, Clone, Copy)]
struct Glyph {
    first: char,
    escaped: Option<char>,
}

impl Glyph {
    fn is(&self, c: char) -> bool {
        self.escaped.is_none() && self.first == c
    }

    fn is_space(&self) -> bool {
        self.escaped.is_none() && self.first.is_whitespace()
    }

    fn ends_line(&self) -> bool {
        self.escaped.unwrap_or(self.first) == '\n'
    }

    fn push_to(&self, buf: &mut String) {
        buf.push(self.first);
        if let Some(c) = self.escaped {
            buf.push(c);
        }
    }
}

/// Escape-aware character iterator that also counts lines
struct Glyphs<'a> {
    chars: Chars<'a>,
    line: usize,
}

impl Iterator for Glyphs<'_> {
    type Item = (Glyph, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.chars.next()?;
        let escaped = if first == '\\' { self.chars.next() } else { None };
        let glyph = Glyph { first, escaped };
        if glyph.ends_line() {
            self.line += 1;
        }
        Some((glyph, self.line))
    }
}

/// First lexing stage: tokens without brace balance checking
pub struct RawTokens<'a> {
    glyphs: Peekable<Glyphs<'a>>,
    file: PathBuf,
    buffer: String,
    buffer_line: usize,
    pending: VecDeque<Token>,
    failed: bool,
}

impl<'a> RawTokens<'a> {
    pub fn new(input: &'a str, file: &Path) -> Self {
        Self {
            glyphs: Glyphs {
                chars: input.chars(),
                line: 1,
            }
            .peekable(),
            file: file.to_path_buf(),
            buffer: String::new(),
            buffer_line: 0,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    fn flush(&mut self) -> Token {
        Token::bare(std::mem::take(&mut self.buffer), self.buffer_line)
    }

    /// Emit the pending buffer first (if any), then `token`
    fn emit_after_buffer(&mut self, token: Token) -> Token {
        if self.buffer.is_empty() {
            token
        } else {
            self.pending.push_back(token);
            self.flush()
        }
    }

    fn skip_comment(&mut self) {
        // escaped newlines do not end a comment
        for (glyph, _) in self.glyphs.by_ref() {
            if glyph.first == '\n' && glyph.escaped.is_none() {
                break;
            }
        }
    }

    fn read_expansion(&mut self, open: Glyph) {
        open.push_to(&mut self.buffer);
        while let Some((glyph, _)) = self.glyphs.peek().copied() {
            if glyph.is_space() {
                break;
            }
            self.glyphs.next();
            glyph.push_to(&mut self.buffer);
            if glyph.is('}') {
                break;
            }
        }
    }

    fn read_quoted(&mut self, quote: char, line: usize) -> Result<Token, ParseError> {
        let mut text = String::new();
        loop {
            let Some((glyph, _)) = self.glyphs.next() else {
                return Err(ParseError::syntax(
                    &self.file,
                    line,
                    format!("unexpected end of file, expecting '{}'", quote),
                ));
            };
            if glyph.is(quote) {
                break;
            }
            if glyph.first == '\\' && glyph.escaped == Some(quote) {
                text.push(quote);
            } else {
                glyph.push_to(&mut text);
            }
        }
        Ok(Token {
            text,
            line,
            quoted: true,
        })
    }
}

impl Iterator for RawTokens<'_> {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.pop_front() {
            return Some(Ok(token));
        }
        if self.failed {
            return None;
        }

        loop {
            let Some((glyph, line)) = self.glyphs.next() else {
                if self.buffer.is_empty() {
                    return None;
                }
                return Some(Ok(self.flush()));
            };

            if glyph.is_space() {
                if !self.buffer.is_empty() {
                    return Some(Ok(self.flush()));
                }
                continue;
            }

            if self.buffer.is_empty() && glyph.is('#') {
                self.skip_comment();
                continue;
            }

            if self.buffer.is_empty() {
                self.buffer_line = line;
            }

            if self.buffer.ends_with('$') && glyph.is('{') {
                self.read_expansion(glyph);
                continue;
            }

            if glyph.is('"') || glyph.is('\'') {
                return match self.read_quoted(glyph.first, line) {
                    Ok(quoted) => Some(Ok(self.emit_after_buffer(quoted))),
                    Err(e) => {
                        self.failed = true;
                        Some(Err(e))
                    }
                };
            }

            if glyph.is('{') || glyph.is('}') || glyph.is(';') {
                let structural = Token::bare(glyph.first.to_string(), line);
                return Some(Ok(self.emit_after_buffer(structural)));
            }

            glyph.push_to(&mut self.buffer);
        }
    }
}

/// Second lexing stage: fails on unmatched `}` or missing `}` at the end
pub struct BalancedTokens<I> {
    inner: I,
    file: PathBuf,
    depth: usize,
    last_line: usize,
    done: bool,
}

impl<I> BalancedTokens<I>
where
    I: Iterator<Item = Result<Token, ParseError>>,
{
    pub fn new(inner: I, file: &Path) -> Self {
        Self {
            inner,
            file: file.to_path_buf(),
            depth: 0,
            last_line: 1,
            done: false,
        }
    }
}

impl<I> Iterator for BalancedTokens<I>
where
    I: Iterator<Item = Result<Token, ParseError>>,
{
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let token = match self.inner.next() {
            Some(Ok(token)) => token,
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            None => {
                self.done = true;
                if self.depth > 0 {
                    return Some(Err(ParseError::syntax(
                        &self.file,
                        self.last_line,
                        "unexpected end of file, expecting \"}\"",
                    )));
                }
                return None;
            }
        };

        self.last_line = token.line;
        if token.is("{") {
            self.depth += 1;
        } else if token.is("}") {
            if self.depth == 0 {
                self.done = true;
                return Some(Err(ParseError::syntax(&self.file, token.line, "unexpected \"}\"")));
            }
            self.depth -= 1;
        }

        Some(Ok(token))
    }
}

/// Lex a complete configuration file's text
pub fn tokenize<'a>(input: &'a str, file: &Path) -> BalancedTokens<RawTokens<'a>> {
    BalancedTokens::new(RawTokens::new(input, file), file)
}

/// Lex a configuration snippet, collecting every token
pub fn tokenize_str(input: &str) -> Result<Vec<Token>, ParseError> {
    tokenize(input, Path::new("<string>")).collect()
}
