// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Source analysis for Python code.
//!
//! **DDD Context:** Source Analysis
//!
//! This module turns source text into a usage-annotated AST. The pipeline is:
//!
//! 1. [`lex`] converts text into [`Token`]s, each positioned by a [`Span`].
//!    Invalid characters and bad indentation become [`Diagnostic`]s, not
//!    aborts.
//! 2. The parser builds a [`Module`](crate::ast::Module). In
//!    [`ErrorMode::Recover`] it resynchronizes at statement boundaries and
//!    leaves `Bad` placeholder nodes behind; in [`ErrorMode::FailFast`] the
//!    first violation aborts.
//! 3. With [`ParseOptions::approximate`] set, the reconstructor re-examines
//!    each `Bad` region with pattern matchers and attaches best-effort
//!    sub-trees (imports, calls, definitions, headers, dotted names).
//! 4. The usage marker annotates every name, attribute, index, tuple, and
//!    list with how it is used (evaluated, assigned, deleted, imported).
//!
//! [`parse`] runs the whole pipeline. Pass a [`ParseCache`] to memoize
//! results keyed by content hash; pass a
//! [`CancelToken`](crate::cancel::CancelToken) to abandon long parses
//! cooperatively.
//!
//! Malformed user source never panics the core; it produces diagnostics and
//! `Bad` nodes instead.

mod approximate;
mod cache;
mod error;
pub(crate) mod lexer;
pub(crate) mod parser;
mod span;
mod token;
mod usage;

pub use cache::ParseCache;
pub use error::{Diagnostic, ParseError, Severity};
pub use lexer::{lex, LexOptions};
pub use parser::{ErrorMode, ParseOptions};
pub use span::Span;
pub use token::{Token, TokenKind};
pub use usage::{mark_stmt_usages, mark_usages};

use std::sync::Arc;

use crate::ast::{Module, Stmt};
use crate::cancel::CancelToken;

/// The result of a successful [`parse`] call.
///
/// The module is behind an [`Arc`] so cached results can be shared between
/// callers without copying the tree.
#[derive(Debug, Clone)]
pub struct Parse {
    /// The parsed module, with usages marked on every reference expression.
    pub module: Arc<Module>,
    /// Recovered problems in source order. Empty for clean input.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses Python source text into a usage-annotated module.
///
/// Runs the full pipeline: lex, parse, approximate reconstruction of `Bad`
/// regions (when [`ParseOptions::approximate`] is set, which implies
/// [`ErrorMode::Recover`]), and usage marking. When a [`ParseCache`] is
/// supplied, a previous result for the same source and options is returned
/// without re-parsing, and fresh results are stored for next time.
///
/// # Errors
///
/// Fails on the first syntax error in [`ErrorMode::FailFast`], when recovery
/// stops making progress, or when `cancel` fires.
pub fn parse(
    source: &str,
    options: ParseOptions,
    cache: Option<&ParseCache>,
    cancel: &CancelToken,
) -> Result<Parse, ParseError> {
    let mut options = options;
    if options.approximate {
        options.error_mode = ErrorMode::Recover;
    }

    let hash = cache.map(|_| ParseCache::content_hash(source, &options));
    if let (Some(cache), Some(hash)) = (cache, hash) {
        if let Some((module, diagnostics)) = cache.get(hash) {
            return Ok(Parse {
                module,
                diagnostics,
            });
        }
    }

    let (tokens, mut diagnostics) = lex(source, LexOptions::default());
    let (mut module, parse_diagnostics) =
        parser::parse_module_tokens(tokens.clone(), &options, cancel)?;
    diagnostics.extend(parse_diagnostics);
    diagnostics.sort_by_key(|d| d.span().start());

    if options.approximate {
        approximate::approximate_bad_regions(&mut module, source, &tokens, cancel)?;
    }
    mark_usages(&mut module, cancel)?;

    let module = Arc::new(module);
    if let (Some(cache), Some(hash)) = (cache, hash) {
        cache.put(hash, Arc::clone(&module), diagnostics.clone());
    }
    Ok(Parse {
        module,
        diagnostics,
    })
}

/// Parses a single simple or compound statement.
///
/// Used for partial parsing, such as evaluating one editor line. The
/// statement must be followed by end of input. The result is usage-marked
/// like a full module parse, but never cached.
///
/// # Errors
///
/// Same failure modes as [`parse`].
pub fn parse_statement(
    source: &str,
    options: &ParseOptions,
    cancel: &CancelToken,
) -> Result<(Stmt, Vec<Diagnostic>), ParseError> {
    let (tokens, mut diagnostics) = lex(source, LexOptions::default());
    let (mut stmt, parse_diagnostics) = parser::parse_statement_tokens(tokens, options, cancel)?;
    diagnostics.extend(parse_diagnostics);
    diagnostics.sort_by_key(|d| d.span().start());
    mark_stmt_usages(&mut stmt, cancel)?;
    Ok((stmt, diagnostics))
}

/// Parses an already-lexed token list as a module.
///
/// Callers that lex once and parse several ways (the reconstructor's partial
/// parsers do this) can skip the lexing step. No approximation or caching is
/// applied; usages are marked.
///
/// # Errors
///
/// Same failure modes as [`parse`].
pub fn parse_words(
    tokens: Vec<Token>,
    options: &ParseOptions,
    cancel: &CancelToken,
) -> Result<(Module, Vec<Diagnostic>), ParseError> {
    let (mut module, diagnostics) = parser::parse_module_tokens(tokens, options, cancel)?;
    mark_usages(&mut module, cancel)?;
    Ok((module, diagnostics))
}

#[cfg(test)]
mod tests {
    use ecow::EcoString;

    use super::*;
    use crate::ast::{each_child, ExprKind, NodeRef, StmtKind, Usage};

    #[test]
    fn parse_marks_usages() {
        let parse = parse(
            "x = f(y)\n",
            ParseOptions::default(),
            None,
            &CancelToken::none(),
        )
        .unwrap();
        assert!(parse.diagnostics.is_empty());

        let mut seen = Vec::new();
        let StmtKind::Assign { targets, value, .. } = &parse.module.body[0].kind else {
            panic!("expected assignment");
        };
        for expr in targets.iter().chain(value.iter()) {
            each_child(NodeRef::Expr(expr), &mut |child| {
                if let NodeRef::Expr(e) = child {
                    if let ExprKind::Name { ident, usage } = &e.kind {
                        seen.push((ident.clone(), *usage));
                    }
                }
            });
            if let ExprKind::Name { ident, usage } = &expr.kind {
                seen.push((ident.clone(), *usage));
            }
        }
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            seen,
            vec![
                (EcoString::from("f"), Usage::Evaluate),
                (EcoString::from("x"), Usage::Assign),
                (EcoString::from("y"), Usage::Evaluate),
            ]
        );
    }

    #[test]
    fn approximate_implies_recovery() {
        let options = ParseOptions {
            approximate: true,
            ..ParseOptions::default()
        };
        let parse = parse("import os\nclass foo(\n", options, None, &CancelToken::none()).unwrap();
        assert!(!parse.diagnostics.is_empty());
        assert!(parse.module.body.iter().any(|s| s.is_bad()));
    }

    #[test]
    fn cache_returns_shared_module() {
        let cache = ParseCache::default();
        let first = parse(
            "a = 1\n",
            ParseOptions::default(),
            Some(&cache),
            &CancelToken::none(),
        )
        .unwrap();
        let second = parse(
            "a = 1\n",
            ParseOptions::default(),
            Some(&cache),
            &CancelToken::none(),
        )
        .unwrap();
        assert!(Arc::ptr_eq(&first.module, &second.module));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_distinguishes_options() {
        let cache = ParseCache::default();
        let strict = parse(
            "return 1\n1 +\n",
            ParseOptions::default(),
            Some(&cache),
            &CancelToken::none(),
        );
        assert!(strict.is_err());

        let options = ParseOptions {
            error_mode: ErrorMode::Recover,
            ..ParseOptions::default()
        };
        let recovered = parse("return 1\n1 +\n", options, Some(&cache), &CancelToken::none());
        assert!(recovered.is_ok());
    }

    #[test]
    fn parse_statement_handles_one_line() {
        let (stmt, diagnostics) = parse_statement(
            "del x, y\n",
            &ParseOptions::default(),
            &CancelToken::none(),
        )
        .unwrap();
        assert!(diagnostics.is_empty());
        let StmtKind::Del { targets } = &stmt.kind else {
            panic!("expected del statement");
        };
        assert_eq!(targets.len(), 2);
        for target in targets {
            assert_eq!(target.usage(), Some(Usage::Delete));
        }
    }

    #[test]
    fn parse_words_accepts_prelexed_tokens() {
        let (tokens, lex_diagnostics) = lex("pass\n", LexOptions::default());
        assert!(lex_diagnostics.is_empty());
        let (module, diagnostics) =
            parse_words(tokens, &ParseOptions::default(), &CancelToken::none()).unwrap();
        assert!(diagnostics.is_empty());
        assert!(matches!(module.body[0].kind, StmtKind::Pass));
    }

    #[test]
    fn cancelled_parse_reports_cancellation() {
        let cancel = CancelToken::none();
        cancel.cancel();
        let result = parse("x = 1\n", ParseOptions::default(), None, &cancel);
        assert!(matches!(result, Err(ParseError::Cancelled(_))));
    }
}
