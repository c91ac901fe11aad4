// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Expression productions.
//!
//! Binary operators are organized as a precedence chain, lowest binding
//! at the top: `or` → `and` → `not` → comparison → `|` → `^` → `&` →
//! shift → arithmetic → term → factor → power → atom trailers. Each level
//! loops on its own operators, so chains associate to the left.

use ecow::EcoString;

use crate::ast::{
    ArgsParameter, Argument, BinaryOp, Comprehension, DottedName, Expr, ExprKind, KeyValue,
    NumberKind, ParameterList, Parameter, Span, Subscript, SubscriptKind, UnaryOp, Usage,
};

use super::super::token::TokenKind;
use super::{Failure, PResult, Parser};

impl Parser {
    // ========================================================================
    // Atoms
    // ========================================================================

    pub(super) fn parse_name(&mut self) -> PResult<Expr> {
        let (ident, span) = self.expect_ident()?;
        Ok(self.expr(
            span,
            ExprKind::Name {
                ident,
                usage: Usage::default(),
            },
        ))
    }

    /// A dotted module path: `os.path.join`. Each component is kept as a
    /// name expression so usage marking and resolution treat it uniformly.
    pub(super) fn parse_dotted_name(&mut self) -> PResult<DottedName> {
        let first = self.parse_name()?;
        let start = first.span.start();
        let mut names = vec![first];
        while self.eat(TokenKind::Period) {
            names.push(self.parse_name()?);
        }
        Ok(DottedName {
            span: self.span_from(start),
            names,
        })
    }

    /// One or more adjacent string literals, concatenated into a single
    /// node whose span covers all of them.
    fn parse_string_literal(&mut self) -> PResult<Expr> {
        let first = self.current_span();
        let mut literal = EcoString::new();
        let mut any = false;
        while self.at_str() {
            let token = self.next();
            if let TokenKind::Str(text) = token.into_kind() {
                literal.push_str(&text);
            }
            any = true;
        }
        if !any {
            return Err(self.fail_expected("string literal"));
        }
        let span = self.span_from(first.start());
        Ok(self.expr(span, ExprKind::Str { literal }))
    }

    fn parse_number_literal(&mut self) -> PResult<Expr> {
        if !self.at_number() {
            return Err(self.fail_expected("number literal"));
        }
        let token = self.next();
        let span = token.span();
        let (literal, number) = match token.into_kind() {
            TokenKind::Int(text) => (text, NumberKind::Int),
            TokenKind::Long(text) => (text, NumberKind::Long),
            TokenKind::Float(text) => (text, NumberKind::Float),
            TokenKind::Imag(text) => (text, NumberKind::Imag),
            _ => unreachable!("at_number checked the kind"),
        };
        Ok(self.expr(span, ExprKind::Num { literal, number }))
    }

    /// The `...` literal; represented as the builtin name it evaluates to.
    fn parse_ellipsis(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Period)?.span().start();
        self.expect(TokenKind::Period)?;
        self.expect(TokenKind::Period)?;
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::Name {
                ident: "Ellipsis".into(),
                usage: Usage::default(),
            },
        ))
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        match self.current_kind() {
            TokenKind::Lparen => {
                let start = self.next().span().start();
                if self.at(TokenKind::Yield) {
                    let expr = self.parse_yield_expr()?;
                    self.expect(TokenKind::Rparen)?;
                    return Ok(expr);
                }
                self.parse_paren_expr(start)
            }
            TokenKind::Lbrack => self.parse_list_maker(),
            TokenKind::Lbrace => self.parse_dict_or_set_maker(),
            TokenKind::Backtick => self.parse_repr_expr(),
            TokenKind::Ident(_) => self.parse_name(),
            TokenKind::Str(_) => self.parse_string_literal(),
            TokenKind::Int(_) | TokenKind::Long(_) | TokenKind::Float(_) | TokenKind::Imag(_) => {
                self.parse_number_literal()
            }
            TokenKind::Period => self.parse_ellipsis(),
            _ => Err(self.fail_expected("expression")),
        }
    }

    // ========================================================================
    // Displays and comprehensions
    // ========================================================================

    /// One `for targets in iterable [if cond]*` comprehension clause.
    fn parse_generator(&mut self) -> PResult<Comprehension> {
        let is_async = self.at(TokenKind::Async);
        let start = self.current_span().start();
        if is_async {
            self.next();
        }
        self.expect(TokenKind::For)?;
        let targets = self.parse_expr_list()?;
        self.expect(TokenKind::In)?;
        let iterable = self.parse_or_expr()?;
        let mut conditions = Vec::new();
        while self.eat(TokenKind::If) {
            conditions.push(self.parse_or_expr()?);
        }
        Ok(Comprehension {
            span: self.span_from(start),
            targets,
            iterable,
            conditions,
            is_async,
        })
    }

    fn parse_generator_chain(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = vec![self.parse_generator()?];
        while self.at(TokenKind::For) || self.at(TokenKind::Async) {
            self.check_cancel()?;
            generators.push(self.parse_generator()?);
        }
        Ok(generators)
    }

    fn at_generator(&self) -> bool {
        self.at(TokenKind::For) || self.at(TokenKind::Async)
    }

    /// A list display or list comprehension:
    /// `[]`, `[1, 2, 3]`, `[x + 1 for x in y if z]`.
    fn parse_list_maker(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Lbrack)?.span().start();

        if self.eat(TokenKind::Rbrack) {
            let span = self.span_from(start);
            return Ok(self.expr(
                span,
                ExprKind::List {
                    elements: Vec::new(),
                    usage: Usage::default(),
                },
            ));
        }

        let first = self.parse_test_expr()?;
        if self.at_generator() {
            let generators = self.parse_generator_chain()?;
            self.expect(TokenKind::Rbrack)?;
            let span = self.span_from(start);
            return Ok(self.expr(
                span,
                ExprKind::ListComp {
                    element: Box::new(first),
                    generators,
                },
            ));
        }

        let mut elements = vec![first];
        while self.eat(TokenKind::Comma) {
            if !self.at_test() {
                break;
            }
            self.check_cancel()?;
            elements.push(self.parse_test_expr()?);
        }
        self.expect(TokenKind::Rbrack)?;
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::List {
                elements,
                usage: Usage::default(),
            },
        ))
    }

    /// A dict or set display, or the comprehension form of either:
    /// `{}`, `{a, b}`, `{k: v}`, `{x for x in y}`, `{k: v for k in y}`.
    fn parse_dict_or_set_maker(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Lbrace)?.span().start();

        if self.eat(TokenKind::Rbrace) {
            let span = self.span_from(start);
            return Ok(self.expr(span, ExprKind::Dict { items: Vec::new() }));
        }

        let first = self.parse_test_expr()?;
        if self.at_generator() {
            let generators = self.parse_generator_chain()?;
            self.expect(TokenKind::Rbrace)?;
            let span = self.span_from(start);
            return Ok(self.expr(
                span,
                ExprKind::SetComp {
                    element: Box::new(first),
                    generators,
                },
            ));
        }

        if self.eat(TokenKind::Colon) {
            let key = first;
            let value = self.parse_test_expr()?;
            if self.at_generator() {
                let generators = self.parse_generator_chain()?;
                self.expect(TokenKind::Rbrace)?;
                let span = self.span_from(start);
                return Ok(self.expr(
                    span,
                    ExprKind::DictComp {
                        key: Box::new(key),
                        value: Box::new(value),
                        generators,
                    },
                ));
            }

            let mut items = vec![KeyValue {
                span: key.span.merge(value.span),
                key,
                value,
            }];
            while self.eat(TokenKind::Comma) {
                if !self.at_test() {
                    break;
                }
                self.check_cancel()?;
                let key = self.parse_test_expr()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_test_expr()?;
                items.push(KeyValue {
                    span: key.span.merge(value.span),
                    key,
                    value,
                });
            }
            self.expect(TokenKind::Rbrace)?;
            let span = self.span_from(start);
            return Ok(self.expr(span, ExprKind::Dict { items }));
        }

        let mut elements = vec![first];
        while self.eat(TokenKind::Comma) {
            if !self.at_test() {
                break;
            }
            self.check_cancel()?;
            elements.push(self.parse_test_expr()?);
        }
        self.expect(TokenKind::Rbrace)?;
        let span = self.span_from(start);
        Ok(self.expr(span, ExprKind::Set { elements }))
    }

    /// A parenthesized expression after the `(` has been consumed: the empty
    /// tuple, a generator expression, a tuple display, or plain grouping
    /// (which yields the inner expression unchanged).
    fn parse_paren_expr(&mut self, start: u32) -> PResult<Expr> {
        if self.eat(TokenKind::Rparen) {
            let span = self.span_from(start);
            return Ok(self.expr(
                span,
                ExprKind::Tuple {
                    elements: Vec::new(),
                    usage: Usage::default(),
                },
            ));
        }

        let first = self.parse_test_expr()?;
        if self.at_generator() {
            let generators = self.parse_generator_chain()?;
            self.expect(TokenKind::Rparen)?;
            let span = self.span_from(start);
            return Ok(self.expr(
                span,
                ExprKind::Generator {
                    element: Box::new(first),
                    generators,
                },
            ));
        }

        let mut elements = vec![first];
        let mut commas = 0usize;
        while self.eat(TokenKind::Comma) {
            commas += 1;
            if !self.at_test() {
                break;
            }
            self.check_cancel()?;
            elements.push(self.parse_test_expr()?);
        }
        self.expect(TokenKind::Rparen)?;
        if commas == 0 {
            // grouping parentheses, not a tuple
            return Ok(elements.pop().unwrap_or_else(|| unreachable!()));
        }
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::Tuple {
                elements,
                usage: Usage::default(),
            },
        ))
    }

    pub(super) fn parse_yield_expr(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Yield)?.span().start();
        let value = if self.at_test() {
            Some(Box::new(self.parse_test_list()?))
        } else {
            None
        };
        let span = self.span_from(start);
        Ok(self.expr(span, ExprKind::Yield { value }))
    }

    /// Old-style backtick repr: `` `foo` ``.
    fn parse_repr_expr(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Backtick)?.span().start();
        let value = self.parse_test_expr()?;
        self.expect(TokenKind::Backtick)?;
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::Repr {
                value: Box::new(value),
            },
        ))
    }

    // ========================================================================
    // Trailers: calls, subscripts, attributes
    // ========================================================================

    /// A call with the callee already parsed: `()`, `(x, y=1, *a, **kw)`.
    pub(super) fn parse_call_after_func(&mut self, func: Expr) -> PResult<Expr> {
        let start = func.span.start();
        self.expect(TokenKind::Lparen)?;
        let (args, vararg, kwarg) = if self.at(TokenKind::Rparen) {
            (Vec::new(), None, None)
        } else {
            self.parse_argument_list()?
        };
        self.expect(TokenKind::Rparen)?;
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::Call {
                func: Box::new(func),
                args,
                vararg: vararg.map(Box::new),
                kwarg: kwarg.map(Box::new),
            },
        ))
    }

    /// One subscript: `...`, `x`, `x:y`, `:`, `x:y:step`, `::step`.
    fn parse_subscript(&mut self) -> PResult<Subscript> {
        let start = self.current_span().start();

        if self.eat(TokenKind::Period) {
            self.expect(TokenKind::Period)?;
            self.expect(TokenKind::Period)?;
            return Ok(Subscript {
                span: self.span_from(start),
                kind: SubscriptKind::Ellipsis,
            });
        }

        let mut lower = None;
        if !self.at(TokenKind::Colon) {
            let value = self.parse_test_expr()?;
            if !self.at(TokenKind::Colon) {
                return Ok(Subscript {
                    span: self.span_from(start),
                    kind: SubscriptKind::Index(value),
                });
            }
            lower = Some(value);
        }

        self.expect(TokenKind::Colon)?;
        let upper = if self.at_test() {
            Some(self.parse_test_expr()?)
        } else {
            None
        };
        let step = if self.eat(TokenKind::Colon) && self.at_test() {
            Some(self.parse_test_expr()?)
        } else {
            None
        };
        Ok(Subscript {
            span: self.span_from(start),
            kind: SubscriptKind::Slice { lower, upper, step },
        })
    }

    fn parse_subscript_list(&mut self) -> PResult<Vec<Subscript>> {
        let mut subscripts = vec![self.parse_subscript()?];
        while self.eat(TokenKind::Comma) {
            if !self.at_subscript() {
                break;
            }
            self.check_cancel()?;
            subscripts.push(self.parse_subscript()?);
        }
        Ok(subscripts)
    }

    fn parse_index_after_value(&mut self, value: Expr) -> PResult<Expr> {
        let start = value.span.start();
        self.expect(TokenKind::Lbrack)?;
        let subscripts = self.parse_subscript_list()?;
        self.expect(TokenKind::Rbrack)?;
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::Index {
                value: Box::new(value),
                subscripts,
                usage: Usage::default(),
            },
        ))
    }

    fn parse_attribute_after_value(&mut self, value: Expr) -> PResult<Expr> {
        let start = value.span.start();
        self.expect(TokenKind::Period)?;
        let (attribute, attribute_span) = self.expect_ident_or_cursor()?;
        let span = Span::new(start, attribute_span.end());
        Ok(self.expr(
            span,
            ExprKind::Attribute {
                value: Box::new(value),
                attribute,
                attribute_span,
                usage: Usage::default(),
            },
        ))
    }

    /// An atom followed by any number of call/index/attribute trailers,
    /// optionally wrapped in `await` and followed by a right-associative
    /// `**` power.
    fn parse_power_expr(&mut self) -> PResult<Expr> {
        let await_token = self.take(TokenKind::Await);

        let mut left = self.parse_atom()?;
        loop {
            left = match self.current_kind() {
                TokenKind::Lparen => self.parse_call_after_func(left)?,
                TokenKind::Lbrack => self.parse_index_after_value(left)?,
                TokenKind::Period => self.parse_attribute_after_value(left)?,
                _ => break,
            };
        }

        if let Some(await_token) = await_token {
            let span = Span::new(await_token.span().start(), left.span.end());
            left = self.expr(
                span,
                ExprKind::Await {
                    value: Box::new(left),
                },
            );
        }

        if self.eat(TokenKind::Pow) {
            let right = self.parse_factor_expr()?;
            let span = left.span.merge(right.span);
            return Ok(self.expr(
                span,
                ExprKind::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            ));
        }
        Ok(left)
    }

    // ========================================================================
    // Precedence chain
    // ========================================================================

    fn parse_factor_expr(&mut self) -> PResult<Expr> {
        self.descend(|p| {
            let op = match p.current_kind() {
                TokenKind::Add => Some(UnaryOp::Pos),
                TokenKind::Sub => Some(UnaryOp::Neg),
                TokenKind::BitNot => Some(UnaryOp::Invert),
                _ => None,
            };
            if let Some(op) = op {
                let start = p.next().span().start();
                let operand = p.parse_factor_expr()?;
                let span = p.span_from(start);
                return Ok(p.expr(
                    span,
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                ));
            }
            p.parse_power_expr()
        })
    }

    /// One left-associative binary level: parses `operand (op operand)*`.
    fn parse_binary_level(
        &mut self,
        operand: fn(&mut Self) -> PResult<Expr>,
        ops: &[(TokenKind, BinaryOp)],
    ) -> PResult<Expr> {
        let mut left = operand(self)?;
        'outer: loop {
            for (kind, op) in ops {
                if self.eat(kind.clone()) {
                    let right = operand(self)?;
                    let span = left.span.merge(right.span);
                    left = self.expr(
                        span,
                        ExprKind::Binary {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                    );
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_term_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(
            Self::parse_factor_expr,
            &[
                (TokenKind::Mul, BinaryOp::Mul),
                (TokenKind::Div, BinaryOp::Div),
                (TokenKind::Pct, BinaryOp::Mod),
                (TokenKind::Truediv, BinaryOp::TrueDiv),
            ],
        )
    }

    fn parse_arithmetic_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(
            Self::parse_term_expr,
            &[
                (TokenKind::Add, BinaryOp::Add),
                (TokenKind::Sub, BinaryOp::Sub),
            ],
        )
    }

    fn parse_shift_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(
            Self::parse_arithmetic_expr,
            &[
                (TokenKind::BitLshift, BinaryOp::LShift),
                (TokenKind::BitRshift, BinaryOp::RShift),
            ],
        )
    }

    fn parse_bit_and_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_shift_expr, &[(TokenKind::BitAnd, BinaryOp::BitAnd)])
    }

    fn parse_bit_xor_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(
            Self::parse_bit_and_expr,
            &[(TokenKind::BitXor, BinaryOp::BitXor)],
        )
    }

    /// An "expr" in the grammar sense: everything below comparisons. Used
    /// where the boolean connectives are not allowed, e.g. `for` targets.
    pub(super) fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(
            Self::parse_bit_xor_expr,
            &[(TokenKind::BitOr, BinaryOp::BitOr)],
        )
    }

    /// Consumes a comparison operator if one is next, including the
    /// two-word forms `not in` and `is not`.
    fn try_comparison_op(&mut self) -> Option<BinaryOp> {
        if self.eat(TokenKind::Not) {
            // only grammatical as `not in`; tolerate a missing `in`
            self.eat(TokenKind::In);
            return Some(BinaryOp::NotIn);
        }
        if self.eat(TokenKind::Is) {
            return Some(if self.eat(TokenKind::Not) {
                BinaryOp::IsNot
            } else {
                BinaryOp::Is
            });
        }
        static OPS: &[(TokenKind, BinaryOp)] = &[
            (TokenKind::Lt, BinaryOp::Lt),
            (TokenKind::Gt, BinaryOp::Gt),
            (TokenKind::Eq, BinaryOp::Eq),
            (TokenKind::Ge, BinaryOp::Ge),
            (TokenKind::Le, BinaryOp::Le),
            (TokenKind::Lg, BinaryOp::Ne),
            (TokenKind::Ne, BinaryOp::Ne),
            (TokenKind::In, BinaryOp::In),
        ];
        for (kind, op) in OPS {
            if self.eat(kind.clone()) {
                return Some(*op);
            }
        }
        None
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_expr()?;
        while let Some(op) = self.try_comparison_op() {
            let right = self.parse_expr()?;
            let span = left.span.merge(right.span);
            left = self.expr(
                span,
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> PResult<Expr> {
        if let Some(token) = self.take(TokenKind::Not) {
            let operand = self.parse_not_expr()?;
            let span = Span::new(token.span().start(), operand.span.end());
            return Ok(self.expr(
                span,
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            ));
        }
        self.parse_comparison()
    }

    fn parse_and_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_not_expr, &[(TokenKind::And, BinaryOp::And)])
    }

    pub(super) fn parse_or_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_and_expr, &[(TokenKind::Or, BinaryOp::Or)])
    }

    // ========================================================================
    // Test expressions
    // ========================================================================

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Lambda)?.span().start();
        let params = self.parse_parameter_list(false)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_test_expr()?;
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::Lambda {
                params: Box::new(params),
                body: Box::new(body),
            },
        ))
    }

    /// `body if test else orelse`, with `body` already parsed.
    fn parse_if_else_after_body(&mut self, body: Expr) -> PResult<Expr> {
        let start = body.span.start();
        self.expect(TokenKind::If)?;
        let test = self.parse_test_expr()?;
        self.expect(TokenKind::Else)?;
        let orelse = self.parse_test_expr()?;
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::IfElse {
                body: Box::new(body),
                test: Box::new(test),
                orelse: Box::new(orelse),
            },
        ))
    }

    /// A full "test" expression: lambda, conditional expression, or the
    /// boolean/comparison chain. This is the general entry point for a
    /// single expression.
    pub(super) fn parse_test_expr(&mut self) -> PResult<Expr> {
        self.descend(|p| {
            if p.at(TokenKind::Lambda) {
                return p.parse_lambda();
            }
            let expr = p.parse_or_expr()?;
            if p.at(TokenKind::If) {
                return p.parse_if_else_after_body(expr);
            }
            Ok(expr)
        })
    }

    /// A comma-separated list of grammar "expr" nodes (no conditionals),
    /// as used for `for`/`del` targets.
    pub(super) fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(TokenKind::Comma) {
            if !self.at_test() {
                break;
            }
            self.check_cancel()?;
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    /// A comma-separated list of test expressions. Any comma, including a
    /// trailing one, makes the result a tuple.
    pub(super) fn parse_test_list(&mut self) -> PResult<Expr> {
        let first = self.parse_test_expr()?;
        let start = first.span.start();
        let mut elements = vec![first];
        let mut commas = 0usize;
        while self.eat(TokenKind::Comma) {
            commas += 1;
            if !self.at_test() {
                break;
            }
            self.check_cancel()?;
            elements.push(self.parse_test_expr()?);
        }
        if commas == 0 {
            return Ok(elements.pop().unwrap_or_else(|| unreachable!()));
        }
        let span = self.span_from(start);
        Ok(self.expr(
            span,
            ExprKind::Tuple {
                elements,
                usage: Usage::default(),
            },
        ))
    }

    // ========================================================================
    // Call arguments and parameters
    // ========================================================================

    /// One call argument: `value`, `name=value`, or an unparenthesized
    /// generator expression.
    fn parse_argument(&mut self) -> PResult<Argument> {
        let value = self.parse_test_expr()?;
        let start = value.span.start();

        if self.at(TokenKind::Assign) {
            // the keyword part of `name=value` must be a plain name
            if value.as_name().is_none() {
                let span = value.span;
                return Err(self.fail(span, "keyword argument name must be an identifier"));
            }
            self.expect(TokenKind::Assign)?;
            let name = value;
            let value = self.parse_test_expr()?;
            return Ok(Argument {
                span: self.span_from(start),
                name: Some(name),
                value,
            });
        }

        if self.at_generator() {
            let generators = self.parse_generator_chain()?;
            let span = self.span_from(start);
            let value = self.expr(
                span,
                ExprKind::Generator {
                    element: Box::new(value),
                    generators,
                },
            );
            return Ok(Argument {
                span,
                name: None,
                value,
            });
        }

        Ok(Argument {
            span: value.span,
            name: None,
            value,
        })
    }

    /// The argument list of a call (or class header), after the opening
    /// paren. `*expr` and `**expr` may each appear once; positional
    /// arguments may not follow `**`.
    pub(super) fn parse_argument_list(
        &mut self,
    ) -> PResult<(Vec<Argument>, Option<Expr>, Option<Expr>)> {
        let mut args = Vec::new();
        let mut vararg: Option<Expr> = None;
        let mut kwarg: Option<Expr> = None;

        loop {
            self.check_cancel()?;
            if self.eat(TokenKind::Pow) {
                if kwarg.is_some() {
                    let span = self.current_span();
                    return Err(self.fail(span, "only one argument can be expanded with **"));
                }
                kwarg = Some(self.parse_test_expr()?);
            } else if self.eat(TokenKind::Mul) {
                if vararg.is_some() {
                    let span = self.current_span();
                    return Err(self.fail(span, "only one argument can be expanded with *"));
                }
                if kwarg.is_some() {
                    let span = self.current_span();
                    return Err(self.fail(span, "*args cannot appear after **kwargs"));
                }
                vararg = Some(self.parse_test_expr()?);
            } else {
                if kwarg.is_some() {
                    let span = self.current_span();
                    return Err(self.fail(span, "argument cannot appear after **kwargs"));
                }
                args.push(self.parse_argument()?);
            }

            let comma = self.eat(TokenKind::Comma);
            if !(comma
                && (self.at(TokenKind::Pow) || self.at(TokenKind::Mul) || self.at_test()))
            {
                break;
            }
        }

        Ok((args, vararg, kwarg))
    }

    /// One function parameter: a name, or the Python 2 nested tuple form
    /// `(x, (y, z))`.
    fn parse_parameter_name(&mut self) -> PResult<Expr> {
        if let Some(lparen) = self.take(TokenKind::Lparen) {
            let start = lparen.span().start();
            let mut elements = vec![self.parse_parameter_name()?];
            while self.eat(TokenKind::Comma) {
                if !(self.at_ident() || self.at(TokenKind::Lparen)) {
                    break;
                }
                elements.push(self.parse_parameter_name()?);
            }
            self.expect(TokenKind::Rparen)?;
            let span = self.span_from(start);
            return Ok(self.expr(
                span,
                ExprKind::Tuple {
                    elements,
                    usage: Usage::default(),
                },
            ));
        }
        self.parse_name()
    }

    /// An optional `: annotation`.
    pub(super) fn parse_annotation(&mut self) -> PResult<Option<Expr>> {
        if self.eat(TokenKind::Colon) {
            Ok(Some(self.parse_test_expr()?))
        } else {
            Ok(None)
        }
    }

    /// The parameter list of a def or lambda (annotations are legal only
    /// in defs). Handles defaults, `*args` anywhere (then keyword-only
    /// parameters), a bare `*`, trailing `**kwargs`, and a trailing comma.
    pub(super) fn parse_parameter_list(&mut self, annotations: bool) -> PResult<ParameterList> {
        let mut params = Vec::new();
        let mut vararg: Option<ArgsParameter> = None;
        let mut keyword_only = false;

        while self.at_ident() || self.at(TokenKind::Lparen) || self.at(TokenKind::Mul) {
            self.check_cancel()?;
            if let Some(star) = self.take(TokenKind::Mul) {
                if keyword_only {
                    let span = star.span();
                    return Err(self.fail(span, "multiple *args not permitted"));
                }
                let name = if self.at_ident() {
                    Some(self.parse_name()?)
                } else {
                    None
                };
                let annotation = if annotations && name.is_some() {
                    self.parse_annotation()?
                } else {
                    None
                };
                vararg = Some(ArgsParameter {
                    span: Span::new(star.span().start(), self.last_end().max(star.span().end())),
                    name,
                    annotation,
                });
                keyword_only = true;
            } else {
                let name = self.parse_parameter_name()?;
                let start = name.span.start();
                let annotation = if annotations {
                    self.parse_annotation()?
                } else {
                    None
                };
                let default = if self.eat(TokenKind::Assign) {
                    Some(self.parse_test_expr()?)
                } else {
                    None
                };
                params.push(Parameter {
                    span: self.span_from(start),
                    name,
                    annotation,
                    default,
                    keyword_only,
                });
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        let kwarg = if let Some(star) = self.take(TokenKind::Pow) {
            let name = self.parse_name()?;
            let annotation = if annotations {
                self.parse_annotation()?
            } else {
                None
            };
            Some(ArgsParameter {
                span: Span::new(star.span().start(), self.last_end()),
                name: Some(name),
                annotation,
            })
        } else {
            None
        };

        // trailing comma after **kwargs is legal in python 3
        self.eat(TokenKind::Comma);

        Ok(ParameterList {
            params,
            vararg,
            kwarg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ErrorMode, ParseOptions, parse_module_tokens};
    use super::*;
    use crate::ast::{Module, Stmt, StmtKind};
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

    fn parse_expr_stmt(source: &str) -> Expr {
        let mut module = parse_ok(source);
        match module.body.remove(0) {
            Stmt {
                kind: StmtKind::Expr { value },
                ..
            } => value,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn parse_fails(source: &str) {
        let (tokens, _) = lex(source, LexOptions::default());
        let result = parse_module_tokens(
            tokens,
            &ParseOptions {
                error_mode: ErrorMode::FailFast,
                ..ParseOptions::default()
            },
            &CancelToken::none(),
        );
        assert!(result.is_err(), "expected parse failure for {source:?}");
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let expr = parse_expr_stmt("a + b * c\n");
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary, got {:?}", expr.kind);
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn left_associative_subtraction() {
        // (a - b) - c
        let expr = parse_expr_stmt("a - b - c\n");
        let ExprKind::Binary { op, left, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Sub);
        assert!(matches!(
            left.kind,
            ExprKind::Binary {
                op: BinaryOp::Sub,
                ..
            }
        ));
    }

    #[test]
    fn power_is_right_associative() {
        // a ** (b ** c)
        let expr = parse_expr_stmt("a ** b ** c\n");
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Pow);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn two_word_comparison_operators() {
        let expr = parse_expr_stmt("a not in b\n");
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::NotIn,
                ..
            }
        ));
        let expr = parse_expr_stmt("a is not b\n");
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::IsNot,
                ..
            }
        ));
    }

    #[test]
    fn attribute_chain_spans_nest() {
        let expr = parse_expr_stmt("a.b.c\n");
        let ExprKind::Attribute {
            value, attribute, ..
        } = &expr.kind
        else {
            panic!("expected attribute");
        };
        assert_eq!(attribute, "c");
        assert_eq!(expr.span, Span::new(0, 5));
        assert_eq!(value.span, Span::new(0, 3));
    }

    #[test]
    fn call_with_all_argument_forms() {
        let expr = parse_expr_stmt("f(x, y=1, *a, **kw)\n");
        let ExprKind::Call {
            args,
            vararg,
            kwarg,
            ..
        } = &expr.kind
        else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(args[0].name.is_none());
        assert!(args[1].name.is_some());
        assert!(vararg.is_some());
        assert!(kwarg.is_some());
    }

    #[test]
    fn positional_after_kwargs_is_an_error() {
        parse_fails("f(**kw, x)\n");
    }

    #[test]
    fn keyword_argument_name_must_be_a_name() {
        parse_fails("f(a.b=1)\n");
    }

    #[test]
    fn paren_grouping_is_not_a_tuple() {
        let expr = parse_expr_stmt("(a)\n");
        assert!(matches!(expr.kind, ExprKind::Name { .. }));
    }

    #[test]
    fn trailing_comma_makes_a_tuple() {
        let expr = parse_expr_stmt("(a,)\n");
        let ExprKind::Tuple { elements, .. } = &expr.kind else {
            panic!("expected tuple");
        };
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn bare_testlist_tuple() {
        let expr = parse_expr_stmt("a, b\n");
        assert!(matches!(expr.kind, ExprKind::Tuple { .. }));
    }

    #[test]
    fn comprehension_forms() {
        assert!(matches!(
            parse_expr_stmt("[x for x in y if x]\n").kind,
            ExprKind::ListComp { .. }
        ));
        assert!(matches!(
            parse_expr_stmt("{x for x in y}\n").kind,
            ExprKind::SetComp { .. }
        ));
        assert!(matches!(
            parse_expr_stmt("{x: y for x in z}\n").kind,
            ExprKind::DictComp { .. }
        ));
        assert!(matches!(
            parse_expr_stmt("(x for x in y)\n").kind,
            ExprKind::Generator { .. }
        ));
    }

    #[test]
    fn chained_generators_with_filters() {
        let expr = parse_expr_stmt("[a for a in b for c in d if a if c]\n");
        let ExprKind::ListComp { generators, .. } = &expr.kind else {
            panic!("expected list comprehension");
        };
        assert_eq!(generators.len(), 2);
        assert_eq!(generators[1].conditions.len(), 2);
    }

    #[test]
    fn dict_and_set_literals() {
        assert!(matches!(
            parse_expr_stmt("{}\n").kind,
            ExprKind::Dict { .. }
        ));
        let expr = parse_expr_stmt("{1: 'a', 2: 'b'}\n");
        let ExprKind::Dict { items } = &expr.kind else {
            panic!("expected dict");
        };
        assert_eq!(items.len(), 2);
        let expr = parse_expr_stmt("{1, 2, 3}\n");
        assert!(matches!(expr.kind, ExprKind::Set { elements, .. } if elements.len() == 3));
    }

    #[test]
    fn slices_and_ellipsis_subscripts() {
        let expr = parse_expr_stmt("a[1:2:3, ..., :, x]\n");
        let ExprKind::Index { subscripts, .. } = &expr.kind else {
            panic!("expected index");
        };
        assert_eq!(subscripts.len(), 4);
        assert!(matches!(subscripts[0].kind, SubscriptKind::Slice { .. }));
        assert!(matches!(subscripts[1].kind, SubscriptKind::Ellipsis));
        assert!(matches!(
            subscripts[2].kind,
            SubscriptKind::Slice {
                lower: None,
                upper: None,
                step: None
            }
        ));
        assert!(matches!(subscripts[3].kind, SubscriptKind::Index(_)));
    }

    #[test]
    fn adjacent_strings_concatenate() {
        let expr = parse_expr_stmt("'a' \"b\"\n");
        let ExprKind::Str { literal } = &expr.kind else {
            panic!("expected string");
        };
        assert_eq!(literal, "'a'\"b\"");
        assert_eq!(expr.span, Span::new(0, 7));
    }

    #[test]
    fn lambda_with_defaults_and_star_args() {
        let expr = parse_expr_stmt("lambda a, b=1, *args, **kw: a\n");
        let ExprKind::Lambda { params, .. } = &expr.kind else {
            panic!("expected lambda");
        };
        assert_eq!(params.params.len(), 2);
        assert!(params.params[1].default.is_some());
        assert!(params.vararg.is_some());
        assert!(params.kwarg.is_some());
    }

    #[test]
    fn conditional_expression() {
        let expr = parse_expr_stmt("a if b else c\n");
        assert!(matches!(expr.kind, ExprKind::IfElse { .. }));
    }

    #[test]
    fn await_wraps_full_trailer_chain() {
        let expr = parse_expr_stmt("await foo.bar()\n");
        let ExprKind::Await { value } = &expr.kind else {
            panic!("expected await");
        };
        assert!(matches!(value.kind, ExprKind::Call { .. }));
        assert_eq!(expr.span.start(), 0);
    }

    #[test]
    fn backtick_repr() {
        let expr = parse_expr_stmt("`x`\n");
        assert!(matches!(expr.kind, ExprKind::Repr { .. }));
        assert_eq!(expr.span, Span::new(0, 3));
    }

    #[test]
    fn ellipsis_atom_is_the_builtin_name() {
        let expr = parse_expr_stmt("...\n");
        assert!(matches!(
            expr.kind,
            ExprKind::Name { ref ident, .. } if ident == "Ellipsis"
        ));
    }

    #[test]
    fn unary_chain() {
        let expr = parse_expr_stmt("--~x\n");
        let ExprKind::Unary { op, operand } = &expr.kind else {
            panic!("expected unary");
        };
        assert_eq!(*op, UnaryOp::Neg);
        assert!(matches!(operand.kind, ExprKind::Unary { .. }));
    }

    #[test]
    fn parenthesized_yield() {
        let module = parse_ok("def f():\n    x = (yield 1)\n");
        let StmtKind::FunctionDef { body, .. } = &module.body[0].kind else {
            panic!("expected def");
        };
        let StmtKind::Assign { value, .. } = &body[0].kind else {
            panic!("expected assign");
        };
        assert!(matches!(
            value.as_ref().map(|v| &v.kind),
            Some(ExprKind::Yield { .. })
        ));
    }

    #[test]
    fn every_expr_span_contains_its_children() {
        let module = parse_ok("x = [a + b * -c for a in f(1, k=2) if a]\n");
        let mut stack: Vec<crate::ast::NodeRef<'_>> =
            module.body.iter().map(crate::ast::NodeRef::Stmt).collect();
        while let Some(node) = stack.pop() {
            crate::ast::each_child(node, &mut |child| {
                assert!(
                    node.span().contains(child.span()),
                    "{:?} does not contain {:?}",
                    node.span(),
                    child.span()
                );
                stack.push(child);
            });
        }
    }
}
