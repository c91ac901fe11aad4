// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Lexical analysis for Python source.
//!
//! Lexing happens in two layers:
//!
//! 1. A character scanner producing raw tokens: identifiers and keywords,
//!    string literals (including `r`/`b`/`u`/`f` prefixes and triple quotes),
//!    numbers (decimal, hex, octal, binary, long, imaginary), operators,
//!    comments, and physical newlines.
//! 2. An indentation layer that tracks bracket depth, collapses consecutive
//!    blank lines into one logical [`TokenKind::NewLine`], and converts
//!    indentation changes into [`TokenKind::Indent`]/[`TokenKind::Dedent`]
//!    tokens. Newlines inside brackets are suppressed.
//!
//! Lexical errors never abort the scan: the lexer always produces a token
//! stream ending in [`TokenKind::Eof`], accumulating positioned diagnostics
//! on the side. This matters because the input is usually an editor buffer
//! mid-edit.

use ecow::EcoString;

use super::error::{Diagnostic, Severity};
use super::span::Span;
use super::token::{Token, TokenKind};

/// Lexer configuration.
#[derive(Debug, Clone, Copy)]
pub struct LexOptions {
    /// Emit comment and magic-line tokens instead of dropping them.
    pub scan_comments: bool,
    /// Honor indentation on the final line even when it precedes EOF.
    pub keep_eof_indent: bool,
}

impl Default for LexOptions {
    fn default() -> Self {
        Self {
            scan_comments: true,
            keep_eof_indent: false,
        }
    }
}

/// Tokenizes `source`, returning the token stream and any lexical errors.
///
/// The stream always ends with an [`TokenKind::Eof`] token, and trailing
/// dedents are emitted before it so every `Indent` is balanced.
#[must_use]
pub fn lex(source: &str, options: LexOptions) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(source, options);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind().is_eof();
        tokens.push(token);
        if done {
            break;
        }
    }
    (tokens, lexer.scanner.errors)
}

/// A raw token from the character scanner, before indentation handling.
struct RawToken {
    kind: RawKind,
    span: Span,
}

enum RawKind {
    Token(TokenKind),
    /// Physical newline; `indent` is the whitespace that begins the next line.
    NewLine { indent: EcoString },
    /// A backslash-newline pair, dropped entirely by the indentation layer.
    LineContinuation,
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    /// True when the previous raw token ended a line, for `%magic` detection.
    at_line_start: bool,
    errors: Vec<Diagnostic>,
}

/// Returns true if `ch` can begin an identifier per the Python lexical rules.
fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || (!ch.is_ascii() && ch.is_alphabetic())
}

/// Returns true if `ch` can continue an identifier.
fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || (!ch.is_ascii() && ch.is_alphanumeric())
}

fn is_inline_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\x0c' | '\x0b' | '\u{a0}')
}

/// String literal prefix modifiers: any one- or two-char combination of
/// `r`, `b`, `u`, `f` (case-insensitive).
fn is_string_prefix(s: &str) -> bool {
    (1..=2).contains(&s.len()) && s.chars().all(|c| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U' | 'f' | 'F'))
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        let mut scanner = Self {
            src,
            pos: 0,
            at_line_start: true,
            errors: Vec::new(),
        };
        // Skip a byte order mark at the very start of the buffer.
        if src.starts_with('\u{feff}') {
            scanner.pos = '\u{feff}'.len_utf8();
        }
        scanner
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn take(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            return true;
        }
        false
    }

    fn error(&mut self, span: Span, message: impl Into<EcoString>) {
        self.errors.push(Diagnostic::new(Severity::Error, message.into(), span));
    }

    fn skip_inline_whitespace(&mut self) {
        while self.peek().is_some_and(is_inline_space) {
            self.bump();
        }
    }

    fn text(&self, from: usize) -> EcoString {
        self.src[from..self.pos].into()
    }

    /// Scans the next raw token. Inline whitespace between tokens is skipped;
    /// whitespace after a newline is captured as the line's indentation.
    fn scan(&mut self) -> RawToken {
        self.skip_inline_whitespace();
        let begin = self.pos;
        let was_line_start = self.at_line_start;
        self.at_line_start = false;

        let Some(ch) = self.bump() else {
            return self.raw(begin, RawKind::Token(TokenKind::Eof));
        };

        if is_ident_start(ch) {
            self.pos = begin;
            return self.scan_ident_or_string(begin);
        }
        if ch.is_ascii_digit() {
            self.pos = begin;
            let kind = self.scan_number(false);
            return self.raw(begin, RawKind::Token(kind));
        }

        let kind = match ch {
            '\n' | '\r' => {
                // Treat \n\r, \r\n, and lone \n/\r all as one physical line end.
                if (ch == '\n' && self.peek() == Some('\r'))
                    || (ch == '\r' && self.peek() == Some('\n'))
                {
                    self.bump();
                }
                let indent_from = self.pos;
                self.skip_inline_whitespace();
                self.at_line_start = true;
                let end = indent_from;
                let indent = self.text(indent_from);
                return RawToken {
                    kind: RawKind::NewLine { indent },
                    span: Span::from(begin..end),
                };
            }
            '\\' => {
                if matches!(self.peek(), Some('\n' | '\r')) {
                    while matches!(self.peek(), Some('\n' | '\r')) {
                        self.bump();
                    }
                    return self.raw(begin, RawKind::LineContinuation);
                }
                self.error(Span::from(begin..self.pos), "backslash not followed by newline");
                TokenKind::Illegal("\\".into())
            }
            '"' | '\'' => {
                let literal = self.scan_string(begin, ch);
                TokenKind::Str(literal)
            }
            '#' => {
                self.scan_to_line_end();
                TokenKind::Comment(self.text(begin))
            }
            '.' => {
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos = begin;
                    self.scan_number(true)
                } else {
                    TokenKind::Period
                }
            }
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::Lparen,
            ')' => TokenKind::Rparen,
            '[' => TokenKind::Lbrack,
            ']' => TokenKind::Rbrack,
            '{' => TokenKind::Lbrace,
            '}' => TokenKind::Rbrace,
            '@' => TokenKind::At,
            '`' => TokenKind::Backtick,
            ':' => TokenKind::Colon,
            '~' => TokenKind::BitNot,
            '+' => self.switch2(TokenKind::Add, TokenKind::AddAssign),
            '-' => {
                if self.take('>') {
                    TokenKind::Arrow
                } else {
                    self.switch2(TokenKind::Sub, TokenKind::SubAssign)
                }
            }
            '*' => self.switch4(TokenKind::Mul, TokenKind::MulAssign, '*', TokenKind::Pow, TokenKind::PowAssign),
            '/' => self.switch4(TokenKind::Div, TokenKind::DivAssign, '/', TokenKind::Truediv, TokenKind::TruedivAssign),
            '<' => {
                if self.take('>') {
                    TokenKind::Lg
                } else {
                    self.switch4(TokenKind::Lt, TokenKind::Le, '<', TokenKind::BitLshift, TokenKind::BitLshiftAssign)
                }
            }
            '>' => self.switch4(TokenKind::Gt, TokenKind::Ge, '>', TokenKind::BitRshift, TokenKind::BitRshiftAssign),
            '%' => {
                // IPython magic: a % starting a line, followed by % or a letter.
                if was_line_start && self.peek().is_some_and(|c| c == '%' || is_ident_start(c)) {
                    self.scan_to_line_end();
                    TokenKind::Magic(self.text(begin))
                } else {
                    self.switch2(TokenKind::Pct, TokenKind::PctAssign)
                }
            }
            '=' => self.switch2(TokenKind::Assign, TokenKind::Eq),
            '&' => self.switch2(TokenKind::BitAnd, TokenKind::BitAndAssign),
            '|' => self.switch2(TokenKind::BitOr, TokenKind::BitOrAssign),
            '^' => self.switch2(TokenKind::BitXor, TokenKind::BitXorAssign),
            '!' => {
                if self.take('=') {
                    TokenKind::Ne
                } else {
                    self.error(Span::from(begin..self.pos), "'!' not allowed outside '!='");
                    TokenKind::Illegal("!".into())
                }
            }
            _ => {
                self.error(
                    Span::from(begin..self.pos),
                    format!("illegal character {ch:?}"),
                );
                TokenKind::Illegal(self.text(begin))
            }
        };
        self.raw(begin, RawKind::Token(kind))
    }

    fn raw(&self, begin: usize, kind: RawKind) -> RawToken {
        RawToken {
            kind,
            span: Span::from(begin..self.pos),
        }
    }

    fn switch2(&mut self, plain: TokenKind, with_eq: TokenKind) -> TokenKind {
        if self.take('=') { with_eq } else { plain }
    }

    fn switch4(
        &mut self,
        plain: TokenKind,
        with_eq: TokenKind,
        second: char,
        doubled: TokenKind,
        doubled_eq: TokenKind,
    ) -> TokenKind {
        if self.take('=') {
            return with_eq;
        }
        if self.take(second) {
            if self.take('=') {
                return doubled_eq;
            }
            return doubled;
        }
        plain
    }

    fn scan_to_line_end(&mut self) {
        while self.peek().is_some_and(|c| c != '\n' && c != '\r') {
            self.bump();
        }
    }

    fn scan_ident_or_string(&mut self, begin: usize) -> RawToken {
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let ident = &self.src[begin..self.pos];
        // A string prefix directly followed by a quote begins a string
        // literal, e.g. r"raw" or b'''bytes'''.
        if is_string_prefix(ident) && matches!(self.peek(), Some('"' | '\'')) {
            let quote = self.bump().unwrap_or('"');
            self.scan_string(begin, quote);
            return self.raw(begin, RawKind::Token(TokenKind::Str(self.text(begin))));
        }
        self.raw(begin, RawKind::Token(TokenKind::lookup_ident(ident)))
    }

    /// Scans a string literal body; the opening quote is already consumed.
    /// Returns the full literal text from `begin`.
    fn scan_string(&mut self, begin: usize, quote: char) -> EcoString {
        if self.take(quote) {
            if self.take(quote) {
                self.scan_multiline_string(begin, quote);
            }
            // Otherwise it was an empty string.
            return self.text(begin);
        }
        loop {
            let Some(ch) = self.peek() else {
                self.error(Span::from(begin..self.pos), "string literal not terminated");
                break;
            };
            if ch == '\n' || ch == '\r' {
                self.error(Span::from(begin..self.pos), "string literal not terminated");
                break;
            }
            self.bump();
            if ch == quote {
                break;
            }
            if ch == '\\' {
                // Escape: skip the next character unconditionally. Valid
                // escape sequences never contain quotes or backslashes past
                // the first two characters, so this is sufficient.
                self.bump();
            }
        }
        self.text(begin)
    }

    fn scan_multiline_string(&mut self, begin: usize, quote: char) {
        let mut quotes = 0;
        loop {
            let Some(ch) = self.bump() else {
                self.error(
                    Span::from(begin..self.pos),
                    "multi-line string literal not terminated",
                );
                break;
            };
            if ch == quote {
                quotes += 1;
                if quotes == 3 {
                    break;
                }
            } else {
                quotes = 0;
            }
            if ch == '\\' {
                self.bump();
            }
        }
    }

    fn scan_digits(&mut self, radix: u32) -> usize {
        let mut count = 0;
        while self.peek().is_some_and(|c| c.is_digit(radix)) {
            self.bump();
            count += 1;
        }
        count
    }

    fn scan_number(&mut self, seen_decimal_point: bool) -> TokenKind {
        let begin = self.pos;
        if seen_decimal_point {
            self.bump(); // the '.'
            self.scan_digits(10);
            self.scan_exponent();
            if matches!(self.peek(), Some('j' | 'J')) {
                self.bump();
                return TokenKind::Imag(self.text(begin));
            }
            return TokenKind::Float(self.text(begin));
        }

        if self.peek() == Some('0') && matches!(self.peek2(), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            self.bump();
            let radix = match self.bump() {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            if self.scan_digits(radix) == 0 && radix == 16 {
                self.error(Span::from(begin..self.pos), "illegal hexadecimal number");
            }
            if matches!(self.peek(), Some('l' | 'L')) {
                self.bump();
                return TokenKind::Long(self.text(begin));
            }
            return TokenKind::Int(self.text(begin));
        }

        self.scan_digits(10);
        let mut float = false;
        if self.peek() == Some('.') {
            float = true;
            self.bump();
            self.scan_digits(10);
        }
        if self.scan_exponent() {
            float = true;
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            self.bump();
            return TokenKind::Imag(self.text(begin));
        }
        if !float && matches!(self.peek(), Some('l' | 'L')) {
            self.bump();
            return TokenKind::Long(self.text(begin));
        }
        if float {
            TokenKind::Float(self.text(begin))
        } else {
            TokenKind::Int(self.text(begin))
        }
    }

    fn scan_exponent(&mut self) -> bool {
        if matches!(self.peek(), Some('e' | 'E'))
            && (self.peek2().is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek2(), Some('+' | '-'))))
        {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            self.scan_digits(10);
            return true;
        }
        false
    }
}

/// The indentation layer: wraps the scanner and synthesizes logical
/// `NewLine`/`Indent`/`Dedent` tokens.
struct Lexer<'a> {
    scanner: Scanner<'a>,
    options: LexOptions,
    /// Open bracket depth; newlines inside brackets are suppressed.
    paren_depth: u32,
    indents: Vec<u32>,
    queue: std::collections::VecDeque<Token>,
    current_indent: EcoString,
    needs_newline: bool,
    has_first: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, options: LexOptions) -> Self {
        Self {
            scanner: Scanner::new(src),
            options,
            paren_depth: 0,
            indents: Vec::new(),
            queue: std::collections::VecDeque::new(),
            current_indent: EcoString::new(),
            needs_newline: false,
            has_first: false,
        }
    }

    /// Computes an indentation level; a tab advances to the next multiple of 8.
    fn indent_level(&mut self, indent: &str, at: Span) -> u32 {
        let mut level = 0u32;
        for ch in indent.chars() {
            match ch {
                ' ' | '\u{a0}' => level += 1,
                '\t' => level += 8 - (level % 8),
                _ => {
                    // Keep processing: count the bad character as one column.
                    level += 1;
                    self.scanner.errors.push(Diagnostic::new(
                        Severity::Error,
                        format!("invalid character {ch:?} within indentation whitespace"),
                        at,
                    ));
                }
            }
        }
        level
    }

    fn process_indent(&mut self, indent: &str, span: Span) {
        let last = self.indents.last().copied().unwrap_or(0);
        let level = self.indent_level(indent, span);
        if level == last {
            return;
        }
        if level > last {
            self.indents.push(level);
            self.queue.push_back(Token::new(TokenKind::Indent, span));
            return;
        }
        let mut dedents = 0;
        while self.indents.last().copied().unwrap_or(0) > level {
            self.indents.pop();
            dedents += 1;
        }
        if self.indents.last().copied().unwrap_or(0) != level {
            self.scanner.errors.push(Diagnostic::new(
                Severity::Error,
                "invalid indentation level",
                span,
            ));
            // Adopt the new level so processing can continue; this uses up
            // one of the dedents since indents and dedents must pair exactly.
            self.indents.push(level);
            dedents -= 1;
        }
        for _ in 0..dedents {
            self.queue.push_back(Token::new(TokenKind::Dedent, span));
        }
    }

    fn next_token(&mut self) -> Token {
        if let Some(token) = self.queue.pop_front() {
            return token;
        }

        let mut newline_span: Option<Span> = None;

        loop {
            let raw = self.scanner.scan();
            let (kind, span) = match raw.kind {
                RawKind::LineContinuation => continue,
                RawKind::NewLine { indent } => {
                    self.current_indent = indent;
                    if self.paren_depth == 0 {
                        // Consecutive newlines collapse: just extend the span.
                        self.needs_newline = true;
                    }
                    newline_span = Some(match newline_span {
                        Some(prev) => prev.merge(raw.span),
                        None => raw.span,
                    });
                    continue;
                }
                RawKind::Token(kind) => (kind, raw.span),
            };

            match &kind {
                TokenKind::Lparen | TokenKind::Lbrack | TokenKind::Lbrace => {
                    self.paren_depth += 1;
                }
                TokenKind::Rparen | TokenKind::Rbrack | TokenKind::Rbrace => {
                    self.paren_depth = self.paren_depth.saturating_sub(1);
                }
                // A keyword that can never appear inside brackets means an
                // unbalanced bracket earlier in the buffer; drop back out so
                // the rest of the file still gets statement structure.
                TokenKind::Class
                | TokenKind::Def
                | TokenKind::Del
                | TokenKind::Pass
                | TokenKind::With
                | TokenKind::Raise
                | TokenKind::Import
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Assert
                | TokenKind::Except
                | TokenKind::Finally
                | TokenKind::Global
                | TokenKind::Try
                | TokenKind::While
                | TokenKind::Semicolon
                | TokenKind::NonLocal => {
                    if self.paren_depth != 0 {
                        self.scanner.errors.push(Diagnostic::new(
                            Severity::Error,
                            format!("invalid keyword in parenthesized region: {kind}"),
                            span,
                        ));
                        self.paren_depth = 0;
                    }
                }
                _ => {}
            }

            if matches!(kind, TokenKind::Comment(_) | TokenKind::Magic(_)) && !self.options.scan_comments {
                continue;
            }

            if matches!(kind, TokenKind::Comment(_) | TokenKind::Magic(_)) {
                return Token::new(kind, span);
            }

            if self.needs_newline && self.has_first {
                let mut nl_span = newline_span.unwrap_or(span);
                if kind.is_eof() {
                    if !self.options.keep_eof_indent {
                        self.current_indent = EcoString::new();
                    }
                    nl_span = span;
                }
                let indent = std::mem::take(&mut self.current_indent);
                self.process_indent(&indent, span);
                self.queue.push_back(Token::new(kind, span));
                self.needs_newline = false;
                return Token::new(TokenKind::NewLine, nl_span);
            }

            self.needs_newline = false;
            self.has_first = true;
            return Token::new(kind, span);
        }
    }
}
