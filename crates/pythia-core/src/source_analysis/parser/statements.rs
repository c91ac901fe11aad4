// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Statement productions.
//!
//! Statements come in two shapes: simple statements (one or more small
//! statements joined by `;`, ended by a newline) and compound statements
//! (a header plus an indented suite). Error recovery happens here and only
//! here: both shapes catch syntax failures from their productions, discard
//! the partial statement, and resynchronize.
//!
//! `print` and `exec` are scanned as ordinary identifiers for Python 3
//! compatibility and special-cased at statement level, so both the Python 2
//! statement form and the Python 3 call form parse.

use crate::ast::{
    BinaryOp, Branch, DottedAsName, ExceptClause, Expr, ExprKind, ImportAsName, Span, Stmt,
    StmtKind, Usage, WithItem,
};

use super::super::token::TokenKind;
use super::{PResult, Parser};

impl Parser {
    pub(super) fn at_compound_stmt(&self) -> bool {
        matches!(
            self.current_kind(),
            TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Try
                | TokenKind::With
                | TokenKind::Def
                | TokenKind::Class
                | TokenKind::At
                | TokenKind::Async
        )
    }

    /// Parses one statement. Simple statements may expand into several
    /// small statements (`a = 1; b = 2`).
    pub(super) fn parse_stmt(&mut self) -> PResult<Vec<Stmt>> {
        if self.trace {
            tracing::trace!(
                offset = self.current_span().start(),
                token = %self.current_kind(),
                "statement"
            );
        }
        if self.at_compound_stmt() {
            Ok(vec![self.parse_compound_stmt()?])
        } else {
            self.parse_simple_stmt()
        }
    }

    // ========================================================================
    // Simple statements
    // ========================================================================

    /// A newline-terminated run of `;`-separated small statements, with
    /// statement-level error recovery. On recovery every small statement
    /// of the run is discarded: in `foo(); bar(); baz(:` all three are
    /// technically suspect, so one Bad node covers the whole line.
    pub(super) fn parse_simple_stmt(&mut self) -> PResult<Vec<Stmt>> {
        let begin = self.current_span().start();
        match self.parse_simple_stmt_inner() {
            Ok(stmts) => Ok(stmts),
            Err(failure) => Ok(vec![self.recover_stmt(begin, failure)?]),
        }
    }

    fn parse_simple_stmt_inner(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_stmt()?];
        while self.eat(TokenKind::Semicolon) {
            if self.at(TokenKind::NewLine) || self.current_kind().is_eof() {
                break;
            }
            self.check_cancel()?;
            stmts.push(self.parse_small_stmt()?);
        }
        // an EOF terminator is left in the stream for the caller
        if !self.current_kind().is_eof() {
            self.expect(TokenKind::NewLine)?;
        }
        Ok(stmts)
    }

    fn parse_small_stmt(&mut self) -> PResult<Stmt> {
        // recovery can resynchronize onto a dedent; it never starts a
        // small statement
        if self.at(TokenKind::Dedent) {
            let span = self.current_span();
            self.next();
            return Err(self.fail(span, "unexpected dedent"));
        }

        if let TokenKind::Ident(name) = self.current_kind() {
            match name.as_str() {
                "print" => return self.parse_print_stmt(),
                "exec" => return self.parse_exec_stmt(),
                _ => {}
            }
        }

        match self.current_kind() {
            TokenKind::Del => self.parse_del_stmt(),
            TokenKind::Pass => self.parse_keyword_stmt(TokenKind::Pass, StmtKind::Pass),
            TokenKind::Import | TokenKind::From => self.parse_import_stmt(),
            TokenKind::Global => self.parse_name_list_stmt(TokenKind::Global),
            TokenKind::NonLocal => self.parse_name_list_stmt(TokenKind::NonLocal),
            TokenKind::Assert => self.parse_assert_stmt(),
            TokenKind::Break => self.parse_keyword_stmt(TokenKind::Break, StmtKind::Break),
            TokenKind::Continue => {
                self.parse_keyword_stmt(TokenKind::Continue, StmtKind::Continue)
            }
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Raise => self.parse_raise_stmt(),
            TokenKind::Yield => self.parse_yield_stmt(),
            _ => {
                if !self.at_test() {
                    return Err(self.fail_expected("statement"));
                }
                self.parse_expr_stmt()
            }
        }
    }

    /// A bare one-keyword statement: `pass`, `break`, `continue`.
    fn parse_keyword_stmt(&mut self, keyword: TokenKind, kind: StmtKind) -> PResult<Stmt> {
        let token = self.expect(keyword)?;
        Ok(self.stmt(token.span(), kind))
    }

    /// Python 2 `print` statement or Python 3 `print(...)` call.
    fn parse_print_stmt(&mut self) -> PResult<Stmt> {
        let (ident, name_span) = self.expect_ident()?;
        let start = name_span.start();

        if self.at(TokenKind::Lparen) {
            return self.parse_builtin_call_stmt(ident, name_span);
        }

        let dest = if self.eat(TokenKind::BitRshift) {
            let dest = self.parse_test_expr()?;
            self.eat(TokenKind::Comma);
            Some(dest)
        } else {
            None
        };

        let mut values = Vec::new();
        while self.at_test() {
            values.push(self.parse_test_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        let span = self.span_from(start);
        Ok(self.stmt(span, StmtKind::Print { dest, values }))
    }

    /// Python 2 `exec body in globals, locals` or Python 3 `exec(...)` call.
    fn parse_exec_stmt(&mut self) -> PResult<Stmt> {
        let (ident, name_span) = self.expect_ident()?;
        let start = name_span.start();

        if self.at(TokenKind::Lparen) {
            return self.parse_builtin_call_stmt(ident, name_span);
        }

        let body = self.parse_expr()?;
        let mut globals = None;
        let mut locals = None;
        if self.eat(TokenKind::In) {
            globals = Some(self.parse_test_expr()?);
            if self.eat(TokenKind::Comma) {
                locals = Some(self.parse_test_expr()?);
            }
        }

        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::Exec {
                body,
                globals,
                locals,
            },
        ))
    }

    /// The Python 3 call form of `print`/`exec`. Anything after the closing
    /// paren up to the end of the line is skipped, since mixing the two
    /// forms on one line is not otherwise parseable.
    fn parse_builtin_call_stmt(
        &mut self,
        ident: ecow::EcoString,
        name_span: Span,
    ) -> PResult<Stmt> {
        let func = self.expr(
            name_span,
            ExprKind::Name {
                ident,
                usage: Usage::default(),
            },
        );
        let call = self.parse_call_after_func(func)?;
        while !self.at(TokenKind::NewLine) && !self.current_kind().is_eof() {
            self.check_cancel()?;
            self.next();
        }
        let span = call.span;
        Ok(self.stmt(span, StmtKind::Expr { value: call }))
    }

    fn parse_del_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Del)?.span().start();
        let targets = self.parse_expr_list()?;
        let span = self.span_from(start);
        Ok(self.stmt(span, StmtKind::Del { targets }))
    }

    /// `global a, b` / `nonlocal a, b`.
    fn parse_name_list_stmt(&mut self, keyword: TokenKind) -> PResult<Stmt> {
        let global = keyword == TokenKind::Global;
        let start = self.expect(keyword)?.span().start();
        let mut names = vec![self.parse_name()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.parse_name()?);
        }
        let span = self.span_from(start);
        let kind = if global {
            StmtKind::Global { names }
        } else {
            StmtKind::NonLocal { names }
        };
        Ok(self.stmt(span, kind))
    }

    fn parse_assert_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Assert)?.span().start();
        let test = self.parse_test_expr()?;
        let message = if self.eat(TokenKind::Comma) {
            Some(self.parse_test_expr()?)
        } else {
            None
        };
        let span = self.span_from(start);
        Ok(self.stmt(span, StmtKind::Assert { test, message }))
    }

    fn parse_return_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Return)?.span().start();
        let value = if self.at_test() {
            Some(self.parse_test_list()?)
        } else {
            None
        };
        let span = self.span_from(start);
        Ok(self.stmt(span, StmtKind::Return { value }))
    }

    /// `raise`, `raise instance`, the Python 2 three-part
    /// `raise exc, instance, traceback`, and Python 3 `raise exc from cause`
    /// (the cause lands in `instance`).
    fn parse_raise_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Raise)?.span().start();
        let mut exc = None;
        let mut instance = None;
        let mut traceback = None;
        if self.at_test() {
            let first = self.parse_test_expr()?;
            if self.eat(TokenKind::From) {
                exc = Some(first);
                instance = Some(self.parse_test_expr()?);
            } else if self.eat(TokenKind::Comma) {
                exc = Some(first);
                instance = Some(self.parse_test_expr()?);
                if self.eat(TokenKind::Comma) {
                    traceback = Some(self.parse_test_expr()?);
                }
            } else {
                // a single expression is the raised instance
                instance = Some(first);
            }
        }
        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::Raise {
                exc,
                instance,
                traceback,
            },
        ))
    }

    /// A bare `yield [...]` at statement level; kept as an expression
    /// statement wrapping the yield expression.
    fn parse_yield_stmt(&mut self) -> PResult<Stmt> {
        let value = self.parse_yield_expr()?;
        let span = value.span;
        Ok(self.stmt(span, StmtKind::Expr { value }))
    }

    // ========================================================================
    // Imports
    // ========================================================================

    fn parse_import_stmt(&mut self) -> PResult<Stmt> {
        if self.at(TokenKind::From) {
            self.parse_import_from_stmt()
        } else {
            self.parse_import_name_stmt()
        }
    }

    fn parse_import_as_name(&mut self) -> PResult<ImportAsName> {
        let external = self.parse_name()?;
        let start = external.span.start();
        let internal = if self.eat(TokenKind::As) {
            Some(self.parse_name()?)
        } else {
            None
        };
        Ok(ImportAsName {
            span: self.span_from(start),
            external,
            internal,
        })
    }

    fn parse_dotted_as_name(&mut self) -> PResult<DottedAsName> {
        let external = self.parse_dotted_name()?;
        let start = external.span.start();
        let internal = if self.eat(TokenKind::As) {
            Some(self.parse_name()?)
        } else {
            None
        };
        Ok(DottedAsName {
            span: self.span_from(start),
            external,
            internal,
        })
    }

    fn parse_import_name_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Import)?.span().start();
        let mut names = vec![self.parse_dotted_as_name()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.parse_dotted_as_name()?);
        }
        let span = self.span_from(start);
        Ok(self.stmt(span, StmtKind::Import { names }))
    }

    /// `from [.]*pkg import (a as b, c)` / `from pkg import *`.
    fn parse_import_from_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::From)?.span().start();

        let mut dots = 0u32;
        while self.eat(TokenKind::Period) {
            dots += 1;
        }

        let package = if dots == 0 || self.at_ident() {
            Some(self.parse_dotted_name()?)
        } else {
            None
        };
        self.expect(TokenKind::Import)?;

        let mut names = Vec::new();
        let mut wildcard = false;
        if self.eat(TokenKind::Mul) {
            wildcard = true;
        } else {
            let parenthesized = self.eat(TokenKind::Lparen);
            names.push(self.parse_import_as_name()?);
            while let Some(comma) = self.take(TokenKind::Comma) {
                if !self.at_ident() {
                    if parenthesized {
                        break;
                    }
                    return Err(self.fail(
                        comma.span(),
                        "trailing comma not allowed without parentheses",
                    ));
                }
                names.push(self.parse_import_as_name()?);
            }
            if parenthesized {
                self.expect(TokenKind::Rparen)?;
            }
        }

        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::ImportFrom {
                dots,
                package,
                names,
                wildcard,
            },
        ))
    }

    // ========================================================================
    // Assignments and expression statements
    // ========================================================================

    fn take_aug_assign_op(&mut self) -> Option<BinaryOp> {
        let op = match self.current_kind() {
            TokenKind::AddAssign => BinaryOp::Add,
            TokenKind::SubAssign => BinaryOp::Sub,
            TokenKind::MulAssign => BinaryOp::Mul,
            TokenKind::DivAssign => BinaryOp::Div,
            TokenKind::TruedivAssign => BinaryOp::TrueDiv,
            TokenKind::PctAssign => BinaryOp::Mod,
            TokenKind::PowAssign => BinaryOp::Pow,
            TokenKind::BitAndAssign => BinaryOp::BitAnd,
            TokenKind::BitOrAssign => BinaryOp::BitOr,
            TokenKind::BitXorAssign => BinaryOp::BitXor,
            TokenKind::BitLshiftAssign => BinaryOp::LShift,
            TokenKind::BitRshiftAssign => BinaryOp::RShift,
            _ => return None,
        };
        self.next();
        Some(op)
    }

    /// An assignment (`a = b = c`, possibly annotated), an augmented
    /// assignment, a bare annotation (`x: int`), or a plain expression.
    fn parse_expr_stmt(&mut self) -> PResult<Stmt> {
        let lhs = self.parse_test_list()?;
        let start = lhs.span.start();

        // a single assignable expression may carry an annotation
        let annotation = if matches!(lhs.kind, ExprKind::Tuple { .. }) {
            None
        } else {
            self.parse_annotation()?
        };

        if self.at(TokenKind::Assign) {
            let mut items = vec![lhs];
            while self.eat(TokenKind::Assign) {
                self.check_cancel()?;
                if self.at(TokenKind::Yield) {
                    items.push(self.parse_yield_expr()?);
                } else {
                    items.push(self.parse_test_list()?);
                }
            }
            if annotation.is_some() && items.len() > 2 {
                let span = items[2].span;
                return Err(self.fail(span, "annotations not allowed in chained assignments"));
            }
            // the last item is the value; everything before it is a target
            let value = items.pop();
            let span = self.span_from(start);
            return Ok(self.stmt(
                span,
                StmtKind::Assign {
                    targets: items,
                    annotation,
                    value,
                },
            ));
        }

        if let Some(op) = self.take_aug_assign_op() {
            let value = if self.at(TokenKind::Yield) {
                self.parse_yield_expr()?
            } else {
                self.parse_test_list()?
            };
            let span = self.span_from(start);
            return Ok(self.stmt(
                span,
                StmtKind::AugAssign {
                    target: lhs,
                    op,
                    value,
                },
            ));
        }

        if annotation.is_some() {
            // uninitialized variable annotation: `x: int`
            let span = self.span_from(start);
            return Ok(self.stmt(
                span,
                StmtKind::Assign {
                    targets: vec![lhs],
                    annotation,
                    value: None,
                },
            ));
        }

        let span = lhs.span;
        Ok(self.stmt(span, StmtKind::Expr { value: lhs }))
    }

    // ========================================================================
    // Compound statements
    // ========================================================================

    /// A compound statement with statement-level error recovery.
    pub(super) fn parse_compound_stmt(&mut self) -> PResult<Stmt> {
        let begin = self.current_span().start();
        match self.parse_compound_stmt_inner() {
            Ok(stmt) => Ok(stmt),
            Err(failure) => self.recover_stmt(begin, failure),
        }
    }

    fn parse_compound_stmt_inner(&mut self) -> PResult<Stmt> {
        match self.current_kind() {
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(false),
            TokenKind::Try => self.parse_try_stmt(),
            TokenKind::With => self.parse_with_stmt(false),
            TokenKind::Def => self.parse_function_def(),
            TokenKind::Class => self.parse_class_def(),
            TokenKind::At => self.parse_decorated_stmt(),
            TokenKind::Async => self.parse_async_stmt(false),
            _ => Err(self.fail_expected("statement")),
        }
    }

    /// An indented block, or the same-line simple-statement form of a suite.
    pub(super) fn parse_suite(&mut self) -> PResult<Vec<Stmt>> {
        if self.eat(TokenKind::NewLine) {
            self.expect(TokenKind::Indent)?;
            let mut stmts = Vec::new();
            for stmt in self.parse_stmt()? {
                Self::push_stmt(&mut stmts, stmt);
            }
            // recovery may have consumed the dedent or run to end of input
            while !self.eat(TokenKind::Dedent) && !self.current_kind().is_eof() {
                self.check_cancel()?;
                for stmt in self.parse_stmt()? {
                    Self::push_stmt(&mut stmts, stmt);
                }
            }
            Ok(stmts)
        } else {
            self.parse_simple_stmt()
        }
    }

    /// One `if`/`elif` arm: condition, colon, suite.
    fn parse_branch(&mut self) -> PResult<Branch> {
        let test = self.parse_test_expr()?;
        let start = test.span.start();
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(Branch {
            span: self.span_from(start),
            test,
            body,
        })
    }

    fn parse_if_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::If)?.span().start();
        let mut branches = vec![self.parse_branch()?];
        while self.eat(TokenKind::Elif) {
            self.check_cancel()?;
            branches.push(self.parse_branch()?);
        }
        let orelse = if self.eat(TokenKind::Else) {
            self.expect(TokenKind::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };
        let span = self.span_from(start);
        Ok(self.stmt(span, StmtKind::If { branches, orelse }))
    }

    fn parse_while_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::While)?.span().start();
        let test = self.parse_test_expr()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let orelse = if self.eat(TokenKind::Else) {
            self.expect(TokenKind::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };
        let span = self.span_from(start);
        Ok(self.stmt(span, StmtKind::While { test, body, orelse }))
    }

    fn parse_for_stmt(&mut self, is_async: bool) -> PResult<Stmt> {
        let start = self.expect(TokenKind::For)?.span().start();
        let targets = self.parse_expr_list()?;
        self.expect(TokenKind::In)?;
        let iterable = self.parse_test_list()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let orelse = if self.eat(TokenKind::Else) {
            self.expect(TokenKind::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };
        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::For {
                targets,
                iterable,
                body,
                orelse,
                is_async,
            },
        ))
    }

    /// `except [type [as|, target]]: suite`.
    fn parse_except_clause(&mut self) -> PResult<ExceptClause> {
        let start = self.expect(TokenKind::Except)?.span().start();
        let mut exception = None;
        let mut target = None;
        if self.at_test() {
            exception = Some(self.parse_test_expr()?);
            if self.eat(TokenKind::As) || self.eat(TokenKind::Comma) {
                target = Some(self.parse_test_expr()?);
            }
        }
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(ExceptClause {
            span: self.span_from(start),
            exception,
            target,
            body,
        })
    }

    fn parse_try_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Try)?.span().start();
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;

        let mut handlers = Vec::new();
        while self.at(TokenKind::Except) {
            self.check_cancel()?;
            handlers.push(self.parse_except_clause()?);
        }

        // an else block is only meaningful after at least one handler
        let orelse = if !handlers.is_empty() && self.eat(TokenKind::Else) {
            self.expect(TokenKind::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };

        let finally = if self.eat(TokenKind::Finally) {
            self.expect(TokenKind::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };

        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finally,
            },
        ))
    }

    fn parse_with_item(&mut self) -> PResult<WithItem> {
        let value = self.parse_test_expr()?;
        let start = value.span.start();
        let target = if self.eat(TokenKind::As) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(WithItem {
            span: self.span_from(start),
            value,
            target,
        })
    }

    fn parse_with_stmt(&mut self, is_async: bool) -> PResult<Stmt> {
        let start = self.expect(TokenKind::With)?.span().start();
        let mut items = vec![self.parse_with_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_with_item()?);
        }
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::With {
                items,
                body,
                is_async,
            },
        ))
    }

    fn parse_function_def(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Def)?.span().start();
        let name = self.parse_name()?;
        self.expect(TokenKind::Lparen)?;
        let params = self.parse_parameter_list(true)?;
        self.expect(TokenKind::Rparen)?;
        let return_annotation = if self.eat(TokenKind::Arrow) {
            Some(self.parse_test_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::FunctionDef {
                name,
                params,
                return_annotation,
                body,
                decorators: Vec::new(),
                is_async: false,
            },
        ))
    }

    /// `async def` / `async with` / `async for`. Inside a decorator chain
    /// only `async def` is legal.
    fn parse_async_stmt(&mut self, func_only: bool) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Async)?.span().start();
        let mut stmt = match self.current_kind() {
            TokenKind::Def => self.parse_function_def()?,
            TokenKind::With if !func_only => self.parse_with_stmt(true)?,
            TokenKind::For if !func_only => self.parse_for_stmt(true)?,
            _ => {
                return Err(self.fail_expected(if func_only {
                    "function definition"
                } else {
                    "function definition, with, or for statement"
                }));
            }
        };
        if let StmtKind::FunctionDef { is_async, .. } = &mut stmt.kind {
            *is_async = true;
        }
        stmt.span = Span::new(start, stmt.span.end());
        Ok(stmt)
    }

    fn parse_class_def(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Class)?.span().start();
        let name = self.parse_name()?;

        let (mut args, mut vararg, mut kwarg) = (Vec::new(), None, None);
        if self.eat(TokenKind::Lparen) {
            if !self.at(TokenKind::Rparen) {
                (args, vararg, kwarg) = self.parse_argument_list()?;
            }
            self.expect(TokenKind::Rparen)?;
        }

        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let span = self.span_from(start);
        Ok(self.stmt(
            span,
            StmtKind::ClassDef {
                name,
                args,
                vararg,
                kwarg,
                body,
                decorators: Vec::new(),
            },
        ))
    }

    /// `@dotted.name[(args)]` followed by a newline.
    fn parse_decorator(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::At)?;
        let mut decorator = self.parse_name()?;
        while self.eat(TokenKind::Period) {
            let (attribute, attribute_span) = self.expect_ident_or_cursor()?;
            let span = Span::new(decorator.span.start(), attribute_span.end());
            decorator = self.expr(
                span,
                ExprKind::Attribute {
                    value: Box::new(decorator),
                    attribute,
                    attribute_span,
                    usage: Usage::default(),
                },
            );
        }
        if self.at(TokenKind::Lparen) {
            decorator = self.parse_call_after_func(decorator)?;
        }
        self.expect(TokenKind::NewLine)?;
        Ok(decorator)
    }

    fn parse_decorated_stmt(&mut self) -> PResult<Stmt> {
        let start = self.current_span().start();
        let mut decorators = vec![self.parse_decorator()?];
        while self.at(TokenKind::At) {
            self.check_cancel()?;
            decorators.push(self.parse_decorator()?);
        }

        let mut stmt = match self.current_kind() {
            TokenKind::Async => self.parse_async_stmt(true)?,
            TokenKind::Def => self.parse_function_def()?,
            TokenKind::Class => self.parse_class_def()?,
            _ => return Err(self.fail_expected("function or class definition")),
        };
        match &mut stmt.kind {
            StmtKind::FunctionDef {
                decorators: slot, ..
            }
            | StmtKind::ClassDef {
                decorators: slot, ..
            } => *slot = decorators,
            _ => {}
        }
        stmt.span = Span::new(start, stmt.span.end());
        Ok(stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ErrorMode, ParseOptions, parse_module_tokens};
    use super::*;
    use crate::ast::Module;
    use crate::cancel::CancelToken;
    use crate::source_analysis::lexer::{LexOptions, lex};

    fn parse_ok(source: &str) -> Module {
        let (tokens, errors) = lex(source, LexOptions::default());
        assert!(errors.is_empty(), "lex errors: {errors:?}");
        let (module, diagnostics) =
            parse_module_tokens(tokens, &ParseOptions::default(), &CancelToken::none()).unwrap();
        assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:?}");
        module
    }

    fn first_stmt(source: &str) -> Stmt {
        let mut module = parse_ok(source);
        module.body.remove(0)
    }

    fn parse_fails(source: &str) {
        let (tokens, _) = lex(source, LexOptions::default());
        assert!(
            parse_module_tokens(tokens, &ParseOptions::default(), &CancelToken::none()).is_err(),
            "expected parse failure for {source:?}"
        );
    }

    #[test]
    fn python2_print_statement() {
        let stmt = first_stmt("print >>f, a, b\n");
        let StmtKind::Print { dest, values } = &stmt.kind else {
            panic!("expected print, got {:?}", stmt.kind);
        };
        assert!(dest.is_some());
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn python3_print_call() {
        let stmt = first_stmt("print('hi', end='')\n");
        let StmtKind::Expr { value } = &stmt.kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(value.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn exec_statement_with_globals_and_locals() {
        let stmt = first_stmt("exec code in g, l\n");
        let StmtKind::Exec {
            globals, locals, ..
        } = &stmt.kind
        else {
            panic!("expected exec");
        };
        assert!(globals.is_some());
        assert!(locals.is_some());
    }

    #[test]
    fn import_with_aliases() {
        let stmt = first_stmt("import os.path as p, sys\n");
        let StmtKind::Import { names } = &stmt.kind else {
            panic!("expected import");
        };
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].external.join(), "os.path");
        assert!(names[0].internal.is_some());
        assert!(names[1].internal.is_none());
    }

    #[test]
    fn relative_import_with_dots() {
        let stmt = first_stmt("from ..pkg import a as b, c\n");
        let StmtKind::ImportFrom {
            dots,
            package,
            names,
            wildcard,
        } = &stmt.kind
        else {
            panic!("expected from-import");
        };
        assert_eq!(*dots, 2);
        assert_eq!(package.as_ref().unwrap().join(), "pkg");
        assert_eq!(names.len(), 2);
        assert!(!wildcard);
    }

    #[test]
    fn dots_only_relative_import() {
        let stmt = first_stmt("from .. import a\n");
        let StmtKind::ImportFrom { dots, package, .. } = &stmt.kind else {
            panic!("expected from-import");
        };
        assert_eq!(*dots, 2);
        assert!(package.is_none());
    }

    #[test]
    fn wildcard_import() {
        let stmt = first_stmt("from os import *\n");
        assert!(matches!(
            stmt.kind,
            StmtKind::ImportFrom { wildcard: true, .. }
        ));
    }

    #[test]
    fn parenthesized_import_allows_trailing_comma() {
        let stmt = first_stmt("from os import (path, sep,)\n");
        let StmtKind::ImportFrom { names, .. } = &stmt.kind else {
            panic!("expected from-import");
        };
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn unparenthesized_trailing_comma_fails() {
        parse_fails("from os import path,\n");
    }

    #[test]
    fn chained_assignment() {
        let stmt = first_stmt("a = b = c = 1\n");
        let StmtKind::Assign { targets, value, .. } = &stmt.kind else {
            panic!("expected assign");
        };
        assert_eq!(targets.len(), 3);
        assert!(value.is_some());
    }

    #[test]
    fn annotated_assignment_and_bare_annotation() {
        let stmt = first_stmt("x: int = 1\n");
        let StmtKind::Assign {
            annotation, value, ..
        } = &stmt.kind
        else {
            panic!("expected assign");
        };
        assert!(annotation.is_some());
        assert!(value.is_some());

        let stmt = first_stmt("x: int\n");
        let StmtKind::Assign {
            annotation, value, ..
        } = &stmt.kind
        else {
            panic!("expected assign");
        };
        assert!(annotation.is_some());
        assert!(value.is_none());
    }

    #[test]
    fn annotation_in_chained_assignment_fails() {
        parse_fails("x: int = y = 1\n");
    }

    #[test]
    fn augmented_assignment() {
        let stmt = first_stmt("x //= 2\n");
        let StmtKind::AugAssign { op, .. } = &stmt.kind else {
            panic!("expected aug-assign");
        };
        assert_eq!(*op, BinaryOp::TrueDiv);
    }

    #[test]
    fn semicolon_separated_small_stmts() {
        let module = parse_ok("a = 1; b = 2; c = 3\n");
        assert_eq!(module.body.len(), 3);
    }

    #[test]
    fn raise_forms() {
        assert!(matches!(
            first_stmt("raise\n").kind,
            StmtKind::Raise {
                exc: None,
                instance: None,
                traceback: None
            }
        ));
        let StmtKind::Raise { exc, instance, .. } = first_stmt("raise E\n").kind else {
            panic!("expected raise");
        };
        assert!(exc.is_none());
        assert!(instance.is_some());

        let StmtKind::Raise {
            exc,
            instance,
            traceback,
        } = first_stmt("raise E, v, tb\n").kind
        else {
            panic!("expected raise");
        };
        assert!(exc.is_some() && instance.is_some() && traceback.is_some());

        let StmtKind::Raise { exc, instance, .. } = first_stmt("raise E from cause\n").kind
        else {
            panic!("expected raise");
        };
        assert!(exc.is_some() && instance.is_some());
    }

    #[test]
    fn if_elif_else_branches() {
        let stmt = first_stmt("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let StmtKind::If { branches, orelse } = &stmt.kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn while_and_for_with_else() {
        let StmtKind::While { orelse, .. } =
            first_stmt("while a:\n    pass\nelse:\n    pass\n").kind
        else {
            panic!("expected while");
        };
        assert_eq!(orelse.len(), 1);

        let StmtKind::For {
            targets,
            orelse,
            is_async,
            ..
        } = first_stmt("for i, j in pairs:\n    pass\nelse:\n    pass\n").kind
        else {
            panic!("expected for");
        };
        assert_eq!(targets.len(), 2);
        assert_eq!(orelse.len(), 1);
        assert!(!is_async);
    }

    #[test]
    fn try_except_else_finally() {
        let source = "try:\n    a()\nexcept ValueError as e:\n    b()\nexcept:\n    c()\nelse:\n    d()\nfinally:\n    e()\n";
        let StmtKind::Try {
            handlers,
            orelse,
            finally,
            ..
        } = first_stmt(source).kind
        else {
            panic!("expected try");
        };
        assert_eq!(handlers.len(), 2);
        assert!(handlers[0].target.is_some());
        assert!(handlers[1].exception.is_none());
        assert_eq!(orelse.len(), 1);
        assert_eq!(finally.len(), 1);
    }

    #[test]
    fn python2_except_comma_target() {
        let StmtKind::Try { handlers, .. } =
            first_stmt("try:\n    pass\nexcept E, e:\n    pass\n").kind
        else {
            panic!("expected try");
        };
        assert!(handlers[0].target.is_some());
    }

    #[test]
    fn with_statement_items() {
        let StmtKind::With { items, .. } =
            first_stmt("with open(f) as fh, lock:\n    pass\n").kind
        else {
            panic!("expected with");
        };
        assert_eq!(items.len(), 2);
        assert!(items[0].target.is_some());
        assert!(items[1].target.is_none());
    }

    #[test]
    fn function_def_with_annotations_and_kwonly() {
        let source = "def f(a: int, b=1, *args, c: str = 'x', **kw) -> bool:\n    return c\n";
        let StmtKind::FunctionDef {
            params,
            return_annotation,
            is_async,
            ..
        } = first_stmt(source).kind
        else {
            panic!("expected def");
        };
        assert_eq!(params.params.len(), 3);
        assert!(params.params[0].annotation.is_some());
        assert!(params.params[2].keyword_only);
        assert!(params.vararg.is_some());
        assert!(params.kwarg.is_some());
        assert!(return_annotation.is_some());
        assert!(!is_async);
    }

    #[test]
    fn nested_tuple_parameters() {
        let StmtKind::FunctionDef { params, .. } =
            first_stmt("def f(a, (b, c)):\n    pass\n").kind
        else {
            panic!("expected def");
        };
        assert!(matches!(params.params[1].name.kind, ExprKind::Tuple { .. }));
    }

    #[test]
    fn async_statements() {
        assert!(matches!(
            first_stmt("async def f():\n    pass\n").kind,
            StmtKind::FunctionDef { is_async: true, .. }
        ));
        assert!(matches!(
            first_stmt("async with a:\n    pass\n").kind,
            StmtKind::With { is_async: true, .. }
        ));
        assert!(matches!(
            first_stmt("async for x in y:\n    pass\n").kind,
            StmtKind::For { is_async: true, .. }
        ));
    }

    #[test]
    fn async_span_starts_at_keyword() {
        let stmt = first_stmt("async def f():\n    pass\n");
        assert_eq!(stmt.span.start(), 0);
    }

    #[test]
    fn decorated_function_and_class() {
        let source = "@app.route('/x')\n@cached\ndef handler():\n    pass\n";
        let stmt = first_stmt(source);
        let StmtKind::FunctionDef { decorators, .. } = &stmt.kind else {
            panic!("expected def");
        };
        assert_eq!(decorators.len(), 2);
        assert!(matches!(decorators[0].kind, ExprKind::Call { .. }));
        assert_eq!(stmt.span.start(), 0);

        let StmtKind::ClassDef { decorators, .. } =
            first_stmt("@register\nclass C:\n    pass\n").kind
        else {
            panic!("expected class");
        };
        assert_eq!(decorators.len(), 1);
    }

    #[test]
    fn decorator_on_plain_statement_fails() {
        parse_fails("@foo\nx = 1\n");
    }

    #[test]
    fn class_with_bases_and_keywords() {
        let StmtKind::ClassDef { args, kwarg, .. } =
            first_stmt("class C(Base, metaclass=M, **extra):\n    pass\n").kind
        else {
            panic!("expected class");
        };
        assert_eq!(args.len(), 2);
        assert!(kwarg.is_some());
    }

    #[test]
    fn same_line_suite() {
        let StmtKind::If { branches, .. } = first_stmt("if a: b = 1; c = 2\n").kind else {
            panic!("expected if");
        };
        assert_eq!(branches[0].body.len(), 2);
    }

    #[test]
    fn yield_statement_wraps_expression() {
        let source = "def f():\n    yield 1, 2\n";
        let StmtKind::FunctionDef { body, .. } = first_stmt(source).kind else {
            panic!("expected def");
        };
        let StmtKind::Expr { value } = &body[0].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(value.kind, ExprKind::Yield { .. }));
    }

    #[test]
    fn del_and_global_and_assert() {
        assert!(matches!(
            first_stmt("del a, b[0]\n").kind,
            StmtKind::Del { ref targets } if targets.len() == 2
        ));
        assert!(matches!(
            first_stmt("global a, b\n").kind,
            StmtKind::Global { ref names } if names.len() == 2
        ));
        assert!(matches!(
            first_stmt("nonlocal x\n").kind,
            StmtKind::NonLocal { .. }
        ));
        assert!(matches!(
            first_stmt("assert x, 'msg'\n").kind,
            StmtKind::Assert {
                message: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn recovery_inside_suite_keeps_following_stmts() {
        let (tokens, _) = lex("def f():\n    x = = 1\n    return 2\ny = 3\n", LexOptions::default());
        let options = ParseOptions {
            error_mode: ErrorMode::Recover,
            ..ParseOptions::default()
        };
        let (module, diagnostics) =
            parse_module_tokens(tokens, &options, &CancelToken::none()).unwrap();
        assert!(!diagnostics.is_empty());
        let StmtKind::FunctionDef { body, .. } = &module.body[0].kind else {
            panic!("expected def, got {:?}", module.body[0].kind);
        };
        assert!(body[0].is_bad());
        assert!(matches!(body[1].kind, StmtKind::Return { .. }));
        assert!(matches!(
            module.body[1].kind,
            StmtKind::Assign { .. }
        ));
    }
}
