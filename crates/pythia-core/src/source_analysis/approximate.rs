// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Approximate reconstruction of unparsable regions.
//!
//! Recovery leaves Bad statements covering the source it could not parse.
//! Editor buffers are full of these regions, and they usually still contain
//! salvageable structure: an import the user is halfway through typing, a
//! call missing its closing paren, a `def` header without a suite. This
//! module scans each Bad region with a battery of regex matchers, re-parses
//! the matched text with small single-line partial parsers, and attaches the
//! results as approximation sub-trees.
//!
//! Matchers run in a fixed priority order: import-from, import-name,
//! assignments, class/def headers, if/with/while/for headers, function
//! calls, bare dotted names. A candidate whose span overlaps one already
//! claimed by an earlier matcher is dropped, so the attached approximations
//! are pairwise disjoint.
//!
//! Comments are blanked to whitespace before matching, and matches that fall
//! inside string literal tokens are ignored.

use std::sync::LazyLock;

use ecow::EcoString;
use regex::Regex;

use crate::ast::{
    Argument, Branch, DottedAsName, DottedName, Expr, ExprKind, ImportAsName, Module, NodeIdGen,
    NumberKind, Parameter, ParameterList, Span, Stmt, StmtKind, Usage, WithItem,
};
use crate::cancel::{CancelToken, Cancelled};

use super::token::{Token, TokenKind};

// nested partial calls deeper than this are left as Bad segments
const MAX_CALL_DEPTH: u32 = 10;

static IMPORT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // (^|\n) anchor avoids triggering on the `import` inside a from-import
    Regex::new(r"(?:^|\n)[\t ]*(?P<kw>import)[\t ]*(?P<names>[a-zA-Z0-9._, ]+)?")
        .unwrap_or_else(|e| unreachable!("{e}"))
});

static IMPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|\n)[\t ]*(?P<kw>from)(?:[\t ]+(?P<dots>\.*)(?P<pkg>[a-zA-Z_][a-zA-Z0-9._]*)?(?:[\t ]+import[\t ]+(?P<names>[a-zA-Z0-9._, ]+|\*)?)?)?",
    )
    .unwrap_or_else(|e| unreachable!("{e}"))
});

static AS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<ext>[a-zA-Z_][a-zA-Z0-9._]*)\s+as\s+(?P<int>[a-zA-Z_][a-zA-Z0-9._]*)")
        .unwrap_or_else(|e| unreachable!("{e}"))
});

static DOTTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z_][a-zA-Z0-9._]*").unwrap_or_else(|e| unreachable!("{e}")));

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<func>[a-zA-Z0-9._]+)\(").unwrap_or_else(|e| unreachable!("{e}"))
});

static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<lhs>[a-zA-Z_][a-zA-Z0-9._]*)\s+=\s+(?P<rhs>[a-zA-Z_][a-zA-Z0-9._]*)\(")
        .unwrap_or_else(|e| unreachable!("{e}"))
});

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\n)[\t ]*(?P<kw>class|def)\s+(?P<name>[a-zA-Z_][a-zA-Z0-9_]*)")
        .unwrap_or_else(|e| unreachable!("{e}"))
});

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\n)[\t ]*(?P<kw>if|with|while|for)[\t ]+")
        .unwrap_or_else(|e| unreachable!("{e}"))
});

static KWARG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[a-zA-Z_][a-zA-Z0-9_]*)\s*=\s*(?P<value>[^=].*)$")
        .unwrap_or_else(|e| unreachable!("{e}"))
});

/// Attaches approximation sub-trees to every Bad statement in the module.
///
/// `tokens` must be the stream the module was parsed from, with comments
/// included; string and comment token spans guide what the matchers skip.
pub fn approximate_bad_regions(
    module: &mut Module,
    source: &str,
    tokens: &[Token],
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    let mut rec = Reconstructor {
        source: blank_trivia(source, tokens),
        tokens,
        ids: NodeIdGen::starting_at(module.id_bound),
        cancel,
    };
    rec.visit_stmts(&mut module.body)?;
    module.id_bound = rec.ids.bound();
    Ok(())
}

/// Replaces comment and magic-line tokens with equal-length whitespace so
/// the regexes cannot match inside them.
fn blank_trivia(source: &str, tokens: &[Token]) -> String {
    let mut out = String::from(source);
    for token in tokens {
        if matches!(token.kind(), TokenKind::Comment(_) | TokenKind::Magic(_)) {
            let range = token.span().as_range();
            out.replace_range(range.clone(), &" ".repeat(range.len()));
        }
    }
    out
}

/// Spans already claimed by an approximation within one Bad region.
#[derive(Default)]
struct IntervalSet {
    claimed: Vec<Span>,
}

impl IntervalSet {
    fn try_claim(&mut self, span: Span) -> bool {
        if self.claimed.iter().any(|c| c.overlaps(span)) {
            return false;
        }
        self.claimed.push(span);
        true
    }
}

struct Reconstructor<'a> {
    /// Comment-blanked copy of the source.
    source: String,
    tokens: &'a [Token],
    ids: NodeIdGen,
    cancel: &'a CancelToken,
}

impl Reconstructor<'_> {
    fn expr(&mut self, span: Span, kind: ExprKind) -> Expr {
        Expr::new(self.ids.fresh(), span, kind)
    }

    fn stmt(&mut self, span: Span, kind: StmtKind) -> Stmt {
        Stmt::new(self.ids.fresh(), span, kind)
    }

    fn bad_stmt_at(&mut self, offset: u32) -> Stmt {
        self.stmt(
            Span::at(offset),
            StmtKind::Bad {
                approximations: Vec::new(),
            },
        )
    }

    /// Returns true if the absolute offset falls inside a string literal.
    fn in_string(&self, pos: u32) -> bool {
        self.tokens.iter().any(|t| {
            matches!(t.kind(), TokenKind::Str(_)) && t.span().contains_offset(pos)
        })
    }

    /// Caps `region` at the end of the line containing `begin`.
    fn line_of(region: &str, begin: usize) -> &str {
        match region[begin..].find('\n') {
            Some(nl) => &region[begin..begin + nl],
            None => &region[begin..],
        }
    }

    // ========================================================================
    // Tree walk
    // ========================================================================

    fn visit_stmts(&mut self, stmts: &mut [Stmt]) -> Result<(), Cancelled> {
        for stmt in stmts {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> Result<(), Cancelled> {
        self.cancel.check()?;
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Bad { approximations } => {
                *approximations = self.reconstruct_region(span)?;
            }
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    self.visit_stmts(&mut branch.body)?;
                }
                self.visit_stmts(orelse)?;
            }
            StmtKind::While { body, orelse, .. } | StmtKind::For { body, orelse, .. } => {
                self.visit_stmts(body)?;
                self.visit_stmts(orelse)?;
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finally,
            } => {
                self.visit_stmts(body)?;
                for handler in handlers {
                    self.visit_stmts(&mut handler.body)?;
                }
                self.visit_stmts(orelse)?;
                self.visit_stmts(finally)?;
            }
            StmtKind::With { body, .. }
            | StmtKind::FunctionDef { body, .. }
            | StmtKind::ClassDef { body, .. } => {
                self.visit_stmts(body)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Runs the matcher battery over one Bad region, keeping candidates in
    /// priority order and rejecting any that overlap a claimed span.
    fn reconstruct_region(&mut self, span: Span) -> Result<Vec<Stmt>, Cancelled> {
        let region = self.source[span.as_range()].to_string();
        let offset = span.start();
        let mut intervals = IntervalSet::default();
        let mut out = Vec::new();

        let batches = [
            self.extract_import_from(&region, offset),
            self.extract_import_name(&region, offset),
            self.extract_assignments(&region, offset)?,
            self.extract_definitions(&region, offset)?,
            self.extract_headers(&region, offset)?,
            self.extract_calls(&region, offset)?
                .into_iter()
                .map(|e| {
                    let span = e.span;
                    self.stmt(span, StmtKind::Expr { value: e })
                })
                .collect(),
            self.extract_dotted(&region, offset)?
                .into_iter()
                .map(|e| {
                    let span = e.span;
                    self.stmt(span, StmtKind::Expr { value: e })
                })
                .collect(),
        ];

        for batch in batches {
            for stmt in batch {
                if intervals.try_claim(stmt.span) {
                    out.push(stmt);
                }
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Leaf builders
    // ========================================================================

    fn name(&mut self, text: &str, start: u32) -> Expr {
        self.expr(
            Span::new(start, start + text.len() as u32),
            ExprKind::Name {
                ident: text.into(),
                usage: Usage::default(),
            },
        )
    }

    /// Builds an attribute chain from dotted text, right-to-left. Empty
    /// components become empty attribute names, matching the cursor shape.
    fn dotted_expr(&mut self, text: &str, start: u32) -> Expr {
        match text.rfind('.') {
            None => self.name(text, start),
            Some(dot) => {
                let value = self.dotted_expr(&text[..dot], start);
                let attribute: EcoString = text[dot + 1..].into();
                let attribute_span =
                    Span::new(start + dot as u32 + 1, start + text.len() as u32);
                let span = Span::new(value.span.start(), start + text.len() as u32);
                let value = Box::new(value);
                self.expr(
                    span,
                    ExprKind::Attribute {
                        value,
                        attribute,
                        attribute_span,
                        usage: Usage::default(),
                    },
                )
            }
        }
    }

    /// Builds a [`DottedName`] from dotted text, one name per component.
    fn dotted_name(&mut self, text: &str, start: u32) -> DottedName {
        let mut names = Vec::new();
        let mut at = start;
        for part in text.split('.') {
            names.push(self.name(part, at));
            at += part.len() as u32 + 1;
        }
        DottedName {
            span: Span::new(start, start + text.len() as u32),
            names,
        }
    }

    // ========================================================================
    // Partial parsers
    // ========================================================================

    /// Parses a single-line call starting at a function name, tolerating a
    /// missing closing paren. Argument segments that do not parse become Bad
    /// expressions; a trailing comma in an unclosed call yields a trailing
    /// Bad argument.
    fn partial_call(&mut self, line: &str, offset: u32, depth: u32) -> Option<Expr> {
        let lparen = line.find('(')?;
        if lparen == 0 {
            return None;
        }
        let func = self.dotted_expr(line[..lparen].trim_end(), offset);

        // split the argument text into top-level comma segments
        let args_begin = lparen + 1;
        let mut segments: Vec<(usize, usize)> = Vec::new();
        let mut seg_start = args_begin;
        let mut bracket_depth = 0u32;
        let mut quote: Option<char> = None;
        let mut rparen: Option<usize> = None;
        for (i, ch) in line[args_begin..].char_indices() {
            let i = args_begin + i;
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' => quote = Some(ch),
                '(' | '[' | '{' => bracket_depth += 1,
                ')' if bracket_depth == 0 => {
                    rparen = Some(i);
                    break;
                }
                ')' | ']' | '}' => bracket_depth = bracket_depth.saturating_sub(1),
                ',' if bracket_depth == 0 => {
                    segments.push((seg_start, i));
                    seg_start = i + 1;
                }
                _ => {}
            }
        }
        let args_end = rparen.unwrap_or(line.len());
        segments.push((seg_start, args_end));

        let closed = rparen.is_some();
        // a lone empty segment is an empty argument list
        if segments.len() == 1 && line[segments[0].0..segments[0].1].trim().is_empty() {
            segments.clear();
        }
        // a trailing empty segment only survives when the call is unclosed,
        // where it marks the argument being typed
        if closed
            && segments.len() > 1
            && line[segments[segments.len() - 1].0..segments[segments.len() - 1].1]
                .trim()
                .is_empty()
        {
            segments.pop();
        }

        let mut args = Vec::new();
        for (seg_begin, seg_end) in segments {
            args.push(self.partial_argument(line, seg_begin, seg_end, offset, depth));
        }

        let end = offset + rparen.map_or(line.trim_end().len(), |r| r + 1) as u32;
        let span = Span::new(func.span.start(), end);
        Some(self.expr(
            span,
            ExprKind::Call {
                func: Box::new(func),
                args,
                vararg: None,
                kwarg: None,
            },
        ))
    }

    fn partial_argument(
        &mut self,
        line: &str,
        seg_begin: usize,
        seg_end: usize,
        offset: u32,
        depth: u32,
    ) -> Argument {
        let text = &line[seg_begin..seg_end];
        let trimmed = text.trim();
        let lead = seg_begin + (text.len() - text.trim_start().len());
        let span = if trimmed.is_empty() {
            Span::at(offset + seg_begin as u32)
        } else {
            Span::new(offset + lead as u32, offset + (lead + trimmed.len()) as u32)
        };

        if let Some(caps) = KWARG_RE.captures(trimmed) {
            let name_m = caps.name("name").unwrap_or_else(|| unreachable!());
            let value_m = caps.name("value").unwrap_or_else(|| unreachable!());
            let name_start = offset + (lead + name_m.start()) as u32;
            let name = self.name(name_m.as_str(), name_start);
            let value_start = offset + (lead + value_m.start()) as u32;
            let value = self.partial_value(value_m.as_str(), value_start, depth);
            return Argument {
                span,
                name: Some(name),
                value,
            };
        }

        let value = if trimmed.is_empty() {
            self.expr(
                span,
                ExprKind::Bad {
                    approximations: Vec::new(),
                },
            )
        } else {
            self.partial_value(trimmed, span.start(), depth)
        };
        Argument {
            span,
            name: None,
            value,
        }
    }

    /// Best-effort parse of one argument segment.
    fn partial_value(&mut self, text: &str, start: u32, depth: u32) -> Expr {
        let span = Span::new(start, start + text.len() as u32);

        if text.starts_with('\'') || text.starts_with('"') {
            return self.expr(span, ExprKind::Str { literal: text.into() });
        }

        if text.starts_with(|c: char| c.is_ascii_digit()) {
            if let Some(kind) = classify_number(text) {
                return self.expr(
                    span,
                    ExprKind::Num {
                        literal: text.into(),
                        number: kind,
                    },
                );
            }
        }

        if depth < MAX_CALL_DEPTH && text.contains('(') {
            if let Some(m) = CALL_RE.find(text) {
                if m.start() == 0 {
                    if let Some(call) = self.partial_call(text, start, depth + 1) {
                        return call;
                    }
                }
            }
        }

        if let Some(m) = DOTTED_RE.find(text) {
            if m.start() == 0 && m.end() == text.len() {
                return self.dotted_expr(text, start);
            }
        }

        self.expr(
            span,
            ExprKind::Bad {
                approximations: Vec::new(),
            },
        )
    }

    /// Parses `if`/`while` tests, `with` values, and `for` iterables: a call
    /// or a dotted name at the start of the text.
    fn partial_expr(&mut self, text: &str, start: u32) -> Option<Expr> {
        let trimmed = text.trim_end().trim_end_matches(':').trim_end();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.contains('(') {
            if let Some(call) = self.partial_call(trimmed, start, 0) {
                return Some(call);
            }
        }
        let m = DOTTED_RE.find(trimmed)?;
        if m.start() != 0 {
            return None;
        }
        Some(self.dotted_expr(m.as_str(), start))
    }

    // ========================================================================
    // Matchers, in priority order
    // ========================================================================

    fn extract_import_from(&mut self, region: &str, offset: u32) -> Vec<Stmt> {
        let mut out = Vec::new();
        let captures: Vec<_> = IMPORT_FROM_RE.captures_iter(region).collect();
        for caps in captures {
            let kw = match caps.name("kw") {
                Some(kw) => kw,
                None => continue,
            };
            let mut end = kw.end();

            let dots = caps.name("dots").map_or(0, |m| {
                end = end.max(m.end());
                m.len() as u32
            });

            let package = caps.name("pkg").map(|m| {
                end = end.max(m.end());
                self.dotted_name(m.as_str(), offset + m.start() as u32)
            });

            let mut names = Vec::new();
            if let Some(names_m) = caps.name("names") {
                end = end.max(names_m.end());
                names = self.import_as_names(names_m.as_str(), offset + names_m.start() as u32);
            }

            let span = Span::new(offset + kw.start() as u32, offset + end as u32);
            out.push(self.stmt(
                span,
                StmtKind::ImportFrom {
                    dots,
                    package,
                    names,
                    wildcard: false,
                },
            ));
        }
        out
    }

    fn import_as_names(&mut self, text: &str, offset: u32) -> Vec<ImportAsName> {
        let mut names = Vec::new();
        let mut at = offset;
        for part in text.split(',') {
            if let Some(caps) = AS_RE.captures(part) {
                let ext = caps.name("ext").unwrap_or_else(|| unreachable!());
                let int = caps.name("int").unwrap_or_else(|| unreachable!());
                let external = self.name(ext.as_str(), at + ext.start() as u32);
                let internal = self.name(int.as_str(), at + int.start() as u32);
                names.push(ImportAsName {
                    span: Span::new(external.span.start(), internal.span.end()),
                    external,
                    internal: Some(internal),
                });
            } else if let Some(m) = DOTTED_RE.find(part) {
                let external = self.name(m.as_str(), at + m.start() as u32);
                names.push(ImportAsName {
                    span: external.span,
                    external,
                    internal: None,
                });
            }
            at += part.len() as u32 + 1;
        }
        names
    }

    fn extract_import_name(&mut self, region: &str, offset: u32) -> Vec<Stmt> {
        let mut out = Vec::new();
        let captures: Vec<_> = IMPORT_NAME_RE.captures_iter(region).collect();
        for caps in captures {
            let kw = match caps.name("kw") {
                Some(kw) => kw,
                None => continue,
            };
            let mut end = kw.end();
            let mut names = Vec::new();
            if let Some(names_m) = caps.name("names") {
                end = end.max(names_m.end());
                let mut at = offset + names_m.start() as u32;
                for part in names_m.as_str().split(',') {
                    if let Some(name) = self.dotted_as_name(part, at) {
                        names.push(name);
                    }
                    at += part.len() as u32 + 1;
                }
            }
            let span = Span::new(offset + kw.start() as u32, offset + end as u32);
            out.push(self.stmt(span, StmtKind::Import { names }));
        }
        out
    }

    fn dotted_as_name(&mut self, part: &str, offset: u32) -> Option<DottedAsName> {
        if let Some(caps) = AS_RE.captures(part) {
            let ext = caps.name("ext").unwrap_or_else(|| unreachable!());
            let int = caps.name("int").unwrap_or_else(|| unreachable!());
            let external = self.dotted_name(ext.as_str(), offset + ext.start() as u32);
            let internal = self.name(int.as_str(), offset + int.start() as u32);
            return Some(DottedAsName {
                span: Span::new(external.span.start(), internal.span.end()),
                external,
                internal: Some(internal),
            });
        }
        let m = DOTTED_RE.find(part)?;
        let external = self.dotted_name(m.as_str(), offset + m.start() as u32);
        Some(DottedAsName {
            span: external.span,
            external,
            internal: None,
        })
    }

    /// `x = foo.bar(...)` call assignments.
    fn extract_assignments(&mut self, region: &str, offset: u32) -> Result<Vec<Stmt>, Cancelled> {
        let mut out = Vec::new();
        let captures: Vec<_> = ASSIGN_RE.captures_iter(region).collect();
        for caps in captures {
            self.cancel.check()?;
            let lhs = match caps.name("lhs") {
                Some(lhs) => lhs,
                None => continue,
            };
            let rhs = match caps.name("rhs") {
                Some(rhs) => rhs,
                None => continue,
            };
            if self.in_string(offset + lhs.start() as u32) {
                continue;
            }
            let target = self.dotted_expr(lhs.as_str(), offset + lhs.start() as u32);
            let line = Self::line_of(region, rhs.start());
            let Some(value) = self.partial_call(line, offset + rhs.start() as u32, 0) else {
                continue;
            };
            let span = Span::new(target.span.start(), value.span.end());
            out.push(self.stmt(
                span,
                StmtKind::Assign {
                    targets: vec![target],
                    annotation: None,
                    value: Some(value),
                },
            ));
        }
        Ok(out)
    }

    /// `class`/`def` headers, parsed without their suites; the missing body
    /// becomes an empty Bad placeholder.
    fn extract_definitions(&mut self, region: &str, offset: u32) -> Result<Vec<Stmt>, Cancelled> {
        let mut out = Vec::new();
        let captures: Vec<_> = DEF_RE.captures_iter(region).collect();
        for caps in captures {
            self.cancel.check()?;
            let kw = match caps.name("kw") {
                Some(kw) => kw,
                None => continue,
            };
            let name_m = match caps.name("name") {
                Some(name) => name,
                None => continue,
            };
            if self.in_string(offset + kw.start() as u32) {
                continue;
            }

            let name = self.name(name_m.as_str(), offset + name_m.start() as u32);
            let line = Self::line_of(region, name_m.start());
            // header arguments come from the partial call form `name(...)`
            let header_call = if line[name_m.len()..].trim_start().starts_with('(') {
                self.partial_call(line, offset + name_m.start() as u32, 0)
            } else {
                None
            };

            let end = header_call
                .as_ref()
                .map_or(name.span.end(), |c| c.span.end());
            let body = vec![self.bad_stmt_at(end)];
            let span = Span::new(offset + kw.start() as u32, end);

            let stmt = if kw.as_str() == "class" {
                let args = match header_call {
                    Some(call) => match call.kind {
                        ExprKind::Call { args, .. } => args
                            .into_iter()
                            .filter(|a| !a.value.is_bad())
                            .collect(),
                        _ => Vec::new(),
                    },
                    None => Vec::new(),
                };
                self.stmt(
                    span,
                    StmtKind::ClassDef {
                        name,
                        args,
                        vararg: None,
                        kwarg: None,
                        body,
                        decorators: Vec::new(),
                    },
                )
            } else {
                let mut params = ParameterList::default();
                if let Some(call) = header_call {
                    if let ExprKind::Call { args, .. } = call.kind {
                        for arg in args {
                            if matches!(arg.value.kind, ExprKind::Name { .. }) {
                                params.params.push(Parameter {
                                    span: arg.value.span,
                                    name: arg.value,
                                    annotation: None,
                                    default: None,
                                    keyword_only: false,
                                });
                            }
                        }
                    }
                }
                self.stmt(
                    span,
                    StmtKind::FunctionDef {
                        name,
                        params,
                        return_annotation: None,
                        body,
                        decorators: Vec::new(),
                        is_async: false,
                    },
                )
            };
            out.push(stmt);
        }
        Ok(out)
    }

    /// `if`/`with`/`while`/`for` headers without their suites.
    fn extract_headers(&mut self, region: &str, offset: u32) -> Result<Vec<Stmt>, Cancelled> {
        let mut out = Vec::new();
        let captures: Vec<_> = HEADER_RE.captures_iter(region).collect();
        for caps in captures {
            self.cancel.check()?;
            let kw = match caps.name("kw") {
                Some(kw) => kw,
                None => continue,
            };
            if self.in_string(offset + kw.start() as u32) {
                continue;
            }
            let whole = caps.get(0).unwrap_or_else(|| unreachable!());
            let rest_begin = whole.end();
            let line = Self::line_of(region, rest_begin);
            let start = offset + kw.start() as u32;
            if let Some(stmt) =
                self.partial_header(kw.as_str(), line, offset + rest_begin as u32, start)
            {
                out.push(stmt);
            }
        }
        Ok(out)
    }

    fn partial_header(
        &mut self,
        keyword: &str,
        line: &str,
        line_offset: u32,
        start: u32,
    ) -> Option<Stmt> {
        match keyword {
            "if" => {
                let test = self.partial_expr(line, line_offset)?;
                let end = test.span.end();
                let body = vec![self.bad_stmt_at(end)];
                let branch = Branch {
                    span: Span::new(test.span.start(), end),
                    test,
                    body,
                };
                Some(self.stmt(
                    Span::new(start, end),
                    StmtKind::If {
                        branches: vec![branch],
                        orelse: Vec::new(),
                    },
                ))
            }
            "while" => {
                let test = self.partial_expr(line, line_offset)?;
                let end = test.span.end();
                let body = vec![self.bad_stmt_at(end)];
                Some(self.stmt(
                    Span::new(start, end),
                    StmtKind::While {
                        test,
                        body,
                        orelse: Vec::new(),
                    },
                ))
            }
            "with" => {
                let value = self.partial_expr(line, line_offset)?;
                let mut end = value.span.end();
                // optional `as target` clause after the value
                let after = &line[(end - line_offset) as usize..];
                let trimmed = after.trim_start();
                let target = trimmed.strip_prefix("as ").and_then(|rest| {
                    let rest = rest.trim_start();
                    let rest_off = end + (after.len() - rest.len()) as u32;
                    DOTTED_RE.find(rest).filter(|m| m.start() == 0).map(|m| {
                        let t = self.dotted_expr(m.as_str(), rest_off);
                        end = t.span.end();
                        t
                    })
                });
                let item = WithItem {
                    span: Span::new(value.span.start(), end),
                    value,
                    target,
                };
                let body = vec![self.bad_stmt_at(end)];
                Some(self.stmt(
                    Span::new(start, end),
                    StmtKind::With {
                        items: vec![item],
                        body,
                        is_async: false,
                    },
                ))
            }
            "for" => {
                let in_pos = line.find(" in ")?;
                let mut targets = Vec::new();
                let mut at = line_offset;
                for part in line[..in_pos].split(',') {
                    if let Some(m) = DOTTED_RE.find(part) {
                        targets.push(self.dotted_expr(m.as_str(), at + m.start() as u32));
                    }
                    at += part.len() as u32 + 1;
                }
                if targets.is_empty() {
                    return None;
                }
                let iter_begin = in_pos + 4;
                let iterable =
                    self.partial_expr(&line[iter_begin..], line_offset + iter_begin as u32)?;
                let end = iterable.span.end();
                let body = vec![self.bad_stmt_at(end)];
                Some(self.stmt(
                    Span::new(start, end),
                    StmtKind::For {
                        targets,
                        iterable,
                        body,
                        orelse: Vec::new(),
                        is_async: false,
                    },
                ))
            }
            _ => None,
        }
    }

    /// Function calls, innermost nesting included via the segment parser.
    fn extract_calls(&mut self, region: &str, offset: u32) -> Result<Vec<Expr>, Cancelled> {
        let mut out = Vec::new();
        let matches: Vec<_> = CALL_RE
            .captures_iter(region)
            .filter_map(|c| c.name("func"))
            .map(|m| (m.start(), m.end()))
            .collect();
        for (begin, _) in matches {
            self.cancel.check()?;
            if self.in_string(offset + begin as u32) {
                continue;
            }
            let line = Self::line_of(region, begin);
            if let Some(call) = self.partial_call(line, offset + begin as u32, 0) {
                out.push(call);
            }
        }
        Ok(out)
    }

    /// Bare dotted names; plain keywords are skipped.
    fn extract_dotted(&mut self, region: &str, offset: u32) -> Result<Vec<Expr>, Cancelled> {
        let mut out = Vec::new();
        let matches: Vec<(usize, String)> = DOTTED_RE
            .find_iter(region)
            .map(|m| (m.start(), m.as_str().to_string()))
            .collect();
        for (begin, text) in matches {
            self.cancel.check()?;
            if self.in_string(offset + begin as u32) {
                continue;
            }
            if !text.contains('.') && TokenKind::lookup_ident(&text).is_keyword() {
                continue;
            }
            out.push(self.dotted_expr(&text, offset + begin as u32));
        }
        Ok(out)
    }
}

fn classify_number(text: &str) -> Option<NumberKind> {
    let body = text.trim_end_matches(['l', 'L', 'j', 'J']);
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return None;
    }
    if text.ends_with(['j', 'J']) {
        Some(NumberKind::Imag)
    } else if text.ends_with(['l', 'L']) {
        Some(NumberKind::Long)
    } else if body.contains('.') || (body.contains(['e', 'E']) && !body.starts_with("0x")) {
        Some(NumberKind::Float)
    } else {
        Some(NumberKind::Int)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_analysis::lexer::{lex, LexOptions};
    use crate::source_analysis::parser::{parse_module_tokens, ErrorMode, ParseOptions};

    fn approx(source: &str) -> Module {
        let (tokens, _) = lex(source, LexOptions::default());
        let options = ParseOptions {
            error_mode: ErrorMode::Recover,
            ..ParseOptions::default()
        };
        let (mut module, _) =
            parse_module_tokens(tokens.clone(), &options, &CancelToken::none()).unwrap();
        approximate_bad_regions(&mut module, source, &tokens, &CancelToken::none()).unwrap();
        module
    }

    fn bad_approximations(stmt: &Stmt) -> &[Stmt] {
        let StmtKind::Bad { approximations } = &stmt.kind else {
            panic!("expected Bad statement, got {:?}", stmt.kind);
        };
        approximations
    }

    #[test]
    fn class_header_and_unclosed_call() {
        let module = approx("class foo()\nbar(x,\n");
        let approximations = bad_approximations(&module.body[0]);
        assert_eq!(approximations.len(), 2);

        let StmtKind::ClassDef { name, args, body, .. } = &approximations[0].kind else {
            panic!("expected class header, got {:?}", approximations[0].kind);
        };
        assert_eq!(name.as_name().unwrap(), "foo");
        assert!(args.is_empty());
        assert!(body[0].is_bad());

        let StmtKind::Expr { value } = &approximations[1].kind else {
            panic!("expected call, got {:?}", approximations[1].kind);
        };
        let ExprKind::Call { func, args, .. } = &value.kind else {
            panic!("expected call");
        };
        assert_eq!(func.as_name().unwrap(), "bar");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].value.as_name().unwrap(), "x");
        assert!(args[1].value.is_bad());
    }

    #[test]
    fn empty_argument_between_commas_is_bad() {
        let module = approx("zoo(,bar)  =\n");
        let approximations = bad_approximations(&module.body[0]);
        let StmtKind::Expr { value } = &approximations[0].kind else {
            panic!("expected call");
        };
        let ExprKind::Call { args, .. } = &value.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(args[0].value.is_bad());
        assert_eq!(args[1].value.as_name().unwrap(), "bar");
    }

    #[test]
    fn assignment_with_call_value() {
        let module = approx("def f():\n    x = zoo(,bar)\n    print(foo, zar)\n");
        let StmtKind::FunctionDef { body, .. } = &module.body[0].kind else {
            panic!("expected def");
        };
        let approximations = bad_approximations(&body[0]);
        let StmtKind::Assign { targets, value, .. } = &approximations[0].kind else {
            panic!("expected assign, got {:?}", approximations[0].kind);
        };
        assert_eq!(targets[0].as_name().unwrap(), "x");
        assert!(matches!(
            value.as_ref().unwrap().kind,
            ExprKind::Call { .. }
        ));
        // the second line's call is claimed by the call matcher
        let StmtKind::Expr { value } = &approximations[1].kind else {
            panic!("expected call stmt");
        };
        let ExprKind::Call { func, args, .. } = &value.kind else {
            panic!("expected call");
        };
        assert_eq!(func.as_name().unwrap(), "print");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn import_statements_reconstructed() {
        let module = approx("import os.path as p, sys =\nfrom ..pkg import a as b, c =\n");
        let approximations = bad_approximations(&module.body[0]);

        // the from-import matcher runs first, so it leads the list
        let StmtKind::Import { names } = &approximations[1].kind else {
            panic!("expected import, got {:?}", approximations[1].kind);
        };
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].external.join(), "os.path");
        assert!(names[0].internal.is_some());

        let StmtKind::ImportFrom {
            dots,
            package,
            names,
            ..
        } = &approximations[0].kind
        else {
            panic!("expected from-import, got {:?}", approximations[0].kind);
        };
        assert_eq!(*dots, 2);
        assert_eq!(package.as_ref().unwrap().join(), "pkg");
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn header_statements_reconstructed() {
        let module = approx("if b() =\nwhile f =\nfor g in h =\nwith c() =\n");
        let approximations = bad_approximations(&module.body[0]);
        let kinds: Vec<_> = approximations
            .iter()
            .map(|s| match &s.kind {
                StmtKind::If { .. } => "if",
                StmtKind::While { .. } => "while",
                StmtKind::For { .. } => "for",
                StmtKind::With { .. } => "with",
                other => panic!("unexpected approximation {other:?}"),
            })
            .collect();
        assert_eq!(kinds, ["if", "while", "for", "with"]);

        let StmtKind::If { branches, .. } = &approximations[0].kind else {
            unreachable!();
        };
        assert!(matches!(branches[0].test.kind, ExprKind::Call { .. }));
        assert!(branches[0].body[0].is_bad());
    }

    #[test]
    fn matches_inside_strings_and_comments_are_skipped() {
        let module = approx("x = = 'import os'  # fetch(1)\n");
        let approximations = bad_approximations(&module.body[0]);
        for stmt in approximations {
            assert!(
                !matches!(stmt.kind, StmtKind::Import { .. }),
                "matched inside a string literal"
            );
            if let StmtKind::Expr { value } = &stmt.kind {
                assert!(
                    !matches!(value.kind, ExprKind::Call { .. }),
                    "matched inside a comment"
                );
            }
        }
    }

    #[test]
    fn approximations_do_not_overlap() {
        let sources = [
            "class foo()\nbar(x,\n",
            "i = j.k() =\n",
            "hello.world(a, nested(b), c =\n",
        ];
        for source in sources {
            let module = approx(source);
            for stmt in &module.body {
                if let StmtKind::Bad { approximations } = &stmt.kind {
                    for (i, a) in approximations.iter().enumerate() {
                        for b in &approximations[i + 1..] {
                            assert!(
                                !a.span.overlaps(b.span),
                                "approximations overlap in {source:?}: {:?} vs {:?}",
                                a.span,
                                b.span
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn dotted_names_fall_through_as_last_resort() {
        let module = approx("def f():\n    a = wrong^\n");
        let StmtKind::FunctionDef { body, .. } = &module.body[0].kind else {
            panic!("expected def");
        };
        let approximations = bad_approximations(&body[0]);
        let names: Vec<_> = approximations
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Expr { value } => value.as_name().map(ToString::to_string),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["a", "wrong"]);
    }

    #[test]
    fn nested_call_in_assignment_is_not_duplicated() {
        let module = approx("x = zoo(inner())  =\n");
        let approximations = bad_approximations(&module.body[0]);
        // the assignment claims the whole region; the call matcher's separate
        // candidates for zoo( and inner( must be rejected as overlaps
        assert_eq!(
            approximations
                .iter()
                .filter(|s| matches!(s.kind, StmtKind::Assign { .. }))
                .count(),
            1
        );
        for window in approximations.windows(2) {
            assert!(!window[0].span.overlaps(window[1].span));
        }
    }

    #[test]
    fn ids_extend_the_module_bound() {
        let module = approx("class foo()\nbar(x,\n");
        let mut max_id = 0;
        let mut stack: Vec<crate::ast::NodeRef<'_>> =
            module.body.iter().map(crate::ast::NodeRef::Stmt).collect();
        while let Some(node) = stack.pop() {
            max_id = max_id.max(node.id());
            crate::ast::each_child(node, &mut |child| stack.push(child));
        }
        assert!(max_id < module.id_bound);
    }
}
