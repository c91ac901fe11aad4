// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Recursive descent parser for Python source code.
//!
//! The parser builds an AST from the token stream produced by
//! [`super::lexer::lex`]. It is designed for IDE use on in-flight edits:
//!
//! - **Error recovery** - in [`ErrorMode::Recover`] a syntax error abandons
//!   the current statement, resynchronizes at the next token that can begin
//!   a statement, and records the skipped region as a [`StmtKind::Bad`]
//!   placeholder. Parsing then continues, so one broken line never hides the
//!   rest of the file.
//! - **Multiple errors** - every recovered error is kept as a [`Diagnostic`],
//!   in source order.
//! - **Cursor tolerance** - with [`ParseOptions::cursor`] set, a dangling
//!   `foo.` directly before the cursor parses as an attribute access with an
//!   empty member name instead of failing.
//!
//! Grammar productions live in two sibling modules: [`expressions`] and
//! [`statements`]. Each production is one method on [`Parser`], built from
//! the primitives `at`/`take`/`expect` defined here.

use ecow::EcoString;

use crate::ast::{Expr, ExprKind, Module, NodeIdGen, Span, Stmt, StmtKind};
use crate::cancel::CancelToken;

use super::error::{Diagnostic, ParseError};
use super::token::{Token, TokenKind};

mod expressions;
mod statements;

#[cfg(test)]
mod property_tests;

/// How many times recovery may resynchronize without consuming input
/// before the whole parse is abandoned.
const MAX_RECOVERIES: u32 = 10;

/// Default expression nesting depth limit.
///
/// Prevents stack overflow on deeply nested input such as `((((((...))))))`.
/// Each nesting level costs several stack frames through the precedence
/// chain, so this is deliberately far below any realistic program's depth.
const DEFAULT_MAX_DEPTH: usize = 100;

/// What the parser does when it hits a syntax error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Return on the first error. The result is either a fully valid tree
    /// or no tree at all; it never contains Bad nodes.
    #[default]
    FailFast,
    /// Resynchronize at the next statement boundary and keep going. The
    /// result may contain [`StmtKind::Bad`] placeholder nodes.
    Recover,
}

/// Configuration for a single parse call.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub error_mode: ErrorMode,
    /// Run the regex-based reconstructor over Bad regions after parsing.
    /// Implies [`ErrorMode::Recover`].
    pub approximate: bool,
    /// Expression nesting depth limit; exceeding it is a syntax error.
    pub max_depth: usize,
    /// Byte offset of the editing cursor, if any. Enables the cursor
    /// pseudo-token for dangling attribute accesses.
    pub cursor: Option<u32>,
    /// Emit a `tracing` event per statement parsed.
    pub trace: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::default(),
            approximate: false,
            max_depth: DEFAULT_MAX_DEPTH,
            cursor: None,
            trace: false,
        }
    }
}

/// Internal failure raised by productions and propagated with `?`.
///
/// `Syntax` is the only recoverable variant: statement-level recovery
/// catches it and resynchronizes. The other two always abort the parse.
#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Syntax(Diagnostic),
    Exhausted(Span),
    Cancelled,
}

impl Failure {
    fn into_parse_error(self) -> ParseError {
        match self {
            Self::Syntax(d) => ParseError::Syntax(d),
            Self::Exhausted(span) => ParseError::RecoveryExhausted(span),
            Self::Cancelled => ParseError::Cancelled(crate::cancel::Cancelled),
        }
    }
}

pub(crate) type PResult<T> = Result<T, Failure>;

/// Parses a token stream as a whole module.
///
/// In [`ErrorMode::Recover`] the accumulated diagnostics are returned
/// alongside the tree; in [`ErrorMode::FailFast`] the first error aborts.
pub(crate) fn parse_module_tokens(
    tokens: Vec<Token>,
    options: &ParseOptions,
    cancel: &CancelToken,
) -> Result<(Module, Vec<Diagnostic>), ParseError> {
    let mut parser = Parser::new(tokens, options, cancel);
    let module = parser.parse_module().map_err(Failure::into_parse_error)?;
    Ok((module, parser.diagnostics))
}

/// Parses a token stream as a single small or compound statement
/// followed by end of input.
pub(crate) fn parse_statement_tokens(
    tokens: Vec<Token>,
    options: &ParseOptions,
    cancel: &CancelToken,
) -> Result<(Stmt, Vec<Diagnostic>), ParseError> {
    let mut parser = Parser::new(tokens, options, cancel);
    let stmt = parser
        .parse_statement_eof()
        .map_err(Failure::into_parse_error)?;
    Ok((stmt, parser.diagnostics))
}

/// The parser state.
pub(super) struct Parser {
    /// The tokens being parsed, trivia already removed.
    tokens: Vec<Token>,
    /// Current token index.
    pos: usize,
    /// End offset of the most recently consumed token.
    prev_end: Option<u32>,
    /// Node id allocator for the tree under construction.
    ids: NodeIdGen,
    /// Recovered errors, in source order.
    diagnostics: Vec<Diagnostic>,

    mode: ErrorMode,
    max_depth: usize,
    depth: usize,
    trace: bool,

    // Recovery progress tracking: if resynchronization lands on the same
    // offset repeatedly the input is not being consumed and we must bail.
    recover_pos: u32,
    recover_count: u32,

    cursor: Option<u32>,
    cursor_seen: bool,

    cancel: CancelToken,
}

impl Parser {
    fn new(tokens: Vec<Token>, options: &ParseOptions, cancel: &CancelToken) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| !t.kind().is_trivia())
            .collect();
        if !tokens.last().is_some_and(|t| t.kind().is_eof()) {
            let end = tokens.last().map_or(0, |t| t.span().end());
            tokens.push(Token::new(TokenKind::Eof, Span::at(end)));
        }
        Self {
            tokens,
            pos: 0,
            prev_end: None,
            ids: NodeIdGen::new(),
            diagnostics: Vec::new(),
            mode: options.error_mode,
            max_depth: options.max_depth,
            depth: 0,
            trace: options.trace,
            recover_pos: 0,
            recover_count: 0,
            cursor: options.cursor,
            cursor_seen: false,
            cancel: cancel.clone(),
        }
    }

    // ========================================================================
    // Token management
    // ========================================================================

    pub(super) fn current(&self) -> &Token {
        // The stream always ends with Eof and next() refuses to move past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(super) fn current_kind(&self) -> &TokenKind {
        self.current().kind()
    }

    pub(super) fn current_span(&self) -> Span {
        self.current().span()
    }

    /// End offset of the last consumed token; used to close node spans.
    pub(super) fn last_end(&self) -> u32 {
        self.prev_end.unwrap_or(0)
    }

    /// Span from `start` to the end of the last consumed token.
    pub(super) fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.last_end())
    }

    /// Consumes the current token and returns it.
    pub(super) fn next(&mut self) -> Token {
        let token = self.current().clone();
        self.prev_end = Some(token.span().end());
        if !token.kind().is_eof() {
            self.pos += 1;
        }
        token
    }

    /// True if the current token is exactly `kind` (payload kinds have
    /// their own predicates below).
    pub(super) fn at(&self, kind: TokenKind) -> bool {
        *self.current_kind() == kind
    }

    pub(super) fn at_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.iter().any(|k| self.at(k.clone()))
    }

    pub(super) fn at_ident(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Ident(_))
    }

    pub(super) fn at_str(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Str(_))
    }

    pub(super) fn at_number(&self) -> bool {
        self.current_kind().is_number()
    }

    /// Consumes the current token if it is `kind`.
    pub(super) fn take(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) { Some(self.next()) } else { None }
    }

    pub(super) fn take_any(&mut self, kinds: &[TokenKind]) -> Option<Token> {
        if self.at_any(kinds) {
            Some(self.next())
        } else {
            None
        }
    }

    /// Consumes the current token if it is `kind`, reporting whether it did.
    pub(super) fn eat(&mut self, kind: TokenKind) -> bool {
        self.take(kind).is_some()
    }

    /// Consumes the current token or fails with "expected ...".
    pub(super) fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(kind.clone()) {
            Ok(self.next())
        } else {
            Err(self.fail_expected(&kind.to_string()))
        }
    }

    /// Consumes an identifier token, returning its text and span.
    pub(super) fn expect_ident(&mut self) -> PResult<(EcoString, Span)> {
        if self.at_ident() {
            let token = self.next();
            let span = token.span();
            match token.into_kind() {
                TokenKind::Ident(text) => Ok((text, span)),
                _ => unreachable!("at_ident checked the kind"),
            }
        } else {
            Err(self.fail_expected("identifier"))
        }
    }

    /// Like [`Self::expect_ident`], but if the previous token ends exactly at
    /// the editing cursor, yields a virtual empty identifier there instead of
    /// failing. Fires at most once per parse, so `foo.` under the cursor
    /// becomes an attribute access with an empty member name.
    pub(super) fn expect_ident_or_cursor(&mut self) -> PResult<(EcoString, Span)> {
        if self.at_ident() {
            return self.expect_ident();
        }
        if !self.cursor_seen
            && let (Some(cursor), Some(prev_end)) = (self.cursor, self.prev_end)
            && prev_end == cursor
        {
            self.cursor_seen = true;
            return Ok((EcoString::new(), Span::at(cursor)));
        }
        Err(self.fail_expected("identifier or cursor"))
    }

    /// True if the current token can begin a test expression.
    pub(super) fn at_test(&self) -> bool {
        matches!(
            self.current_kind(),
            TokenKind::Ident(_)
                | TokenKind::Int(_)
                | TokenKind::Long(_)
                | TokenKind::Float(_)
                | TokenKind::Imag(_)
                | TokenKind::Str(_)
                | TokenKind::Add
                | TokenKind::Sub
                | TokenKind::BitNot
                | TokenKind::Lparen
                | TokenKind::Lbrack
                | TokenKind::Lbrace
                | TokenKind::Backtick
                | TokenKind::Not
                | TokenKind::Lambda
                | TokenKind::Period
                | TokenKind::Await
        )
    }

    /// True if the current token can begin a subscript. Same as
    /// [`Self::at_test`] plus `.` (ellipsis) and `:` (open-ended slice).
    pub(super) fn at_subscript(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Period | TokenKind::Colon) || self.at_test()
    }

    // ========================================================================
    // Errors, cancellation, depth
    // ========================================================================

    /// Records a diagnostic and returns the failure carrying it.
    pub(super) fn fail(&mut self, span: Span, message: impl Into<EcoString>) -> Failure {
        let diagnostic = Diagnostic::error(message, span);
        self.diagnostics.push(diagnostic.clone());
        Failure::Syntax(diagnostic)
    }

    /// Records an "expected X, found Y" diagnostic at the current token.
    pub(super) fn fail_expected(&mut self, expected: &str) -> Failure {
        let span = self.current_span();
        let found = self.current_kind().to_string();
        self.fail(span, format!("expected {expected}, found '{found}'"))
    }

    pub(super) fn check_cancel(&mut self) -> PResult<()> {
        if self.cancel.is_cancelled() {
            Err(Failure::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs `f` one nesting level deeper, failing if the depth limit is hit.
    pub(super) fn descend<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<T> {
        if self.depth >= self.max_depth {
            let span = self.current_span();
            return Err(self.fail(span, "expression nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Skips tokens until one that can legally begin a statement.
    ///
    /// Deliberately excludes `if`, `for`, newlines and semicolons so a Bad
    /// region can swallow the tail of a broken multi-line construct instead
    /// of retrying on every line fragment.
    fn sync_stmt(&mut self) -> PResult<()> {
        let begin = self.current_span().start();
        if begin == self.recover_pos {
            if self.recover_count >= MAX_RECOVERIES {
                return Err(Failure::Exhausted(self.current_span()));
            }
            self.recover_count += 1;
        } else {
            self.recover_count = 0;
            self.recover_pos = begin;
        }

        while !self.current_kind().begins_stmt() {
            self.check_cancel()?;
            self.next();
        }
        Ok(())
    }

    /// Statement-boundary recovery: turns a syntax failure into a Bad
    /// statement spanning from `begin` to the resynchronization point.
    /// Everything parsed for the statement so far is discarded; in
    /// fail-fast mode the failure propagates unchanged.
    pub(super) fn recover_stmt(&mut self, begin: u32, failure: Failure) -> PResult<Stmt> {
        match failure {
            Failure::Syntax(_) if self.mode == ErrorMode::Recover => {
                self.sync_stmt()?;
                if self.trace {
                    tracing::trace!(
                        begin,
                        resync = self.current_span().start(),
                        "recovered to statement boundary"
                    );
                }
                let span = Span::new(begin, self.current_span().start());
                Ok(self.stmt(span, StmtKind::Bad {
                    approximations: Vec::new(),
                }))
            }
            other => Err(other),
        }
    }

    // ========================================================================
    // Node construction
    // ========================================================================

    pub(super) fn expr(&mut self, span: Span, kind: ExprKind) -> Expr {
        Expr::new(self.ids.fresh(), span, kind)
    }

    pub(super) fn stmt(&mut self, span: Span, kind: StmtKind) -> Stmt {
        Stmt::new(self.ids.fresh(), span, kind)
    }

    /// Appends a statement to a body, merging runs of consecutive Bad
    /// statements into a single node.
    pub(super) fn push_stmt(body: &mut Vec<Stmt>, stmt: Stmt) {
        if stmt.is_bad()
            && let Some(last) = body.last_mut()
            && last.is_bad()
        {
            last.span = last.span.merge(stmt.span);
            return;
        }
        body.push(stmt);
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Parses a complete source file.
    fn parse_module(&mut self) -> PResult<Module> {
        let id = self.ids.fresh();
        let mut body = Vec::new();
        while !self.current_kind().is_eof() {
            self.check_cancel()?;
            if self.eat(TokenKind::NewLine) {
                continue;
            }
            for stmt in self.parse_stmt()? {
                Self::push_stmt(&mut body, stmt);
            }
        }
        let end = self.current_span().end();
        Ok(Module {
            id,
            span: Span::new(0, end),
            body,
            id_bound: self.ids.bound(),
        })
    }

    /// Parses one statement followed immediately by end of input.
    fn parse_statement_eof(&mut self) -> PResult<Stmt> {
        // tolerate leading blank lines so "\nfoo()" from editors still parses
        while self.eat(TokenKind::NewLine) {}
        let mut stmts = if self.at_compound_stmt() {
            vec![self.parse_compound_stmt()?]
        } else {
            self.parse_simple_stmt()?
        };
        self.expect(TokenKind::Eof)?;
        let first = stmts.swap_remove(0);
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_analysis::lexer::{LexOptions, lex};

    fn parse_source(source: &str, options: ParseOptions) -> Result<(Module, Vec<Diagnostic>), ParseError> {
        let (tokens, _) = lex(source, LexOptions::default());
        parse_module_tokens(tokens, &options, &CancelToken::none())
    }

    fn recover() -> ParseOptions {
        ParseOptions {
            error_mode: ErrorMode::Recover,
            ..ParseOptions::default()
        }
    }

    #[test]
    fn parses_clean_module() {
        let (module, diagnostics) = parse_source("x = 1\ny = x + 2\n", recover()).unwrap();
        assert_eq!(module.body.len(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn fail_fast_returns_syntax_error() {
        let err = parse_source("def f(:\n    pass\n", ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
    }

    #[test]
    fn recover_produces_bad_stmt_and_diagnostic() {
        let (module, diagnostics) = parse_source("x = = 1\ny = 2\n", recover()).unwrap();
        assert!(!diagnostics.is_empty());
        assert!(module.body[0].is_bad());
        // the good statement after the broken one is still parsed
        assert!(matches!(
            module.body.last().map(|s| &s.kind),
            Some(StmtKind::Assign { .. })
        ));
    }

    #[test]
    fn bad_stmt_spans_to_resync_point() {
        let source = "x = = 1\nreturn 2\n";
        let (module, _) = parse_source(source, recover()).unwrap();
        let bad = &module.body[0];
        assert!(bad.is_bad());
        assert_eq!(bad.span.start(), 0);
        // recovery syncs on the `return` keyword
        assert_eq!(bad.span.end(), source.find("return").unwrap() as u32);
    }

    #[test]
    fn consecutive_bad_stmts_merge() {
        // both lines fail and resync on `del`; one merged Bad node results
        let (module, _) = parse_source("x = = 1\ny = = 2\ndel z\n", recover()).unwrap();
        let bad_count = module.body.iter().filter(|s| s.is_bad()).count();
        assert_eq!(bad_count, 1);
    }

    #[test]
    fn recovery_exhaustion_aborts() {
        // class tokens all at offset zero: resynchronization can never advance
        let tokens: Vec<Token> = std::iter::repeat_n(
            Token::new(TokenKind::Class, Span::at(0)),
            2 * MAX_RECOVERIES as usize,
        )
        .chain(std::iter::once(Token::new(TokenKind::Eof, Span::at(0))))
        .collect();
        let err = parse_module_tokens(tokens, &recover(), &CancelToken::none()).unwrap_err();
        assert!(matches!(err, ParseError::RecoveryExhausted(_)));
    }

    #[test]
    fn cancellation_aborts_parse() {
        let token = CancelToken::none();
        token.cancel();
        let (tokens, _) = lex("x = 1\n", LexOptions::default());
        let err = parse_module_tokens(tokens, &recover(), &token).unwrap_err();
        assert!(matches!(err, ParseError::Cancelled(_)));
    }

    #[test]
    fn cursor_after_dot_parses_attribute() {
        let options = ParseOptions {
            error_mode: ErrorMode::Recover,
            cursor: Some(4),
            ..ParseOptions::default()
        };
        let (module, _) = parse_source("foo.\n", options).unwrap();
        let StmtKind::Expr { value } = &module.body[0].kind else {
            panic!("expected expression statement, got {:?}", module.body[0].kind);
        };
        let ExprKind::Attribute {
            attribute,
            attribute_span,
            ..
        } = &value.kind
        else {
            panic!("expected attribute expression, got {:?}", value.kind);
        };
        assert!(attribute.is_empty());
        assert_eq!(*attribute_span, Span::at(4));
    }

    #[test]
    fn cursor_without_option_still_fails() {
        let (module, diagnostics) = parse_source("foo.\n", recover()).unwrap();
        assert!(!diagnostics.is_empty());
        assert!(module.body[0].is_bad());
    }

    #[test]
    fn nesting_depth_limit_is_a_syntax_error() {
        let source = format!("x = {}1{}\n", "(".repeat(300), ")".repeat(300));
        let options = ParseOptions {
            max_depth: 100,
            ..ParseOptions::default()
        };
        let err = parse_source(&source, options).unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
    }

    #[test]
    fn parse_statement_entry_parses_one_stmt() {
        let (tokens, _) = lex("return x + 1", LexOptions::default());
        let (stmt, diagnostics) =
            parse_statement_tokens(tokens, &ParseOptions::default(), &CancelToken::none())
                .unwrap();
        assert!(matches!(stmt.kind, StmtKind::Return { .. }));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn node_ids_are_unique_and_bounded() {
        let (module, _) = parse_source("def f(a, b):\n    return a\n", recover()).unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![crate::ast::NodeRef::Stmt(&module.body[0])];
        while let Some(node) = stack.pop() {
            assert!(seen.insert(node.id()));
            assert!(node.id() < module.id_bound);
            crate::ast::each_child(node, &mut |child| stack.push(child));
        }
    }
}
