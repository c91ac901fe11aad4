// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Property-based tests for the Python parser.
//!
//! These tests use `proptest` to verify parser invariants over generated
//! inputs:
//!
//! 1. **Parser never panics** — arbitrary string input always returns a result
//! 2. **Diagnostic spans within input** — all spans have `end <= input.len()`
//! 3. **Bad nodes produce diagnostics** — `StmtKind::Bad` ⟹ non-empty diagnostics
//! 4. **Child spans nest** — every node's span contains its children's spans

use proptest::prelude::*;

use crate::ast::{each_child, Module, NodeRef, StmtKind};
use crate::cancel::CancelToken;
use crate::source_analysis::lexer::{lex, LexOptions};
use crate::source_analysis::parser::{parse_module_tokens, ErrorMode, ParseOptions};

// ============================================================================
// Near-valid Python generators
// ============================================================================

/// Python source fragments for composing near-valid inputs.
///
/// Most are valid Python; truncation and mutation generators below turn them
/// into the kinds of half-typed code an editor produces mid-keystroke.
const FRAGMENTS: &[&str] = &[
    "x = 42\n",
    "x, y = y, x\n",
    "print('hello')\n",
    "print >>log, a, b\n",
    "import os.path as p\n",
    "from ..pkg import a as b, c\n",
    "def f(a, b=1, *args, **kw):\n    return a + b\n",
    "async def g():\n    await f()\n",
    "class C(Base, metaclass=M):\n    def method(self):\n        pass\n",
    "@decorator\ndef handler():\n    yield 1\n",
    "if a:\n    b()\nelif c:\n    d()\nelse:\n    e()\n",
    "for i in range(10):\n    total += i\nelse:\n    done()\n",
    "while x < 10:\n    x **= 2\n",
    "try:\n    risky()\nexcept ValueError as e:\n    handle(e)\nfinally:\n    cleanup()\n",
    "with open(f) as fh:\n    data = fh.read()\n",
    "result = [a + b for a in xs if a]\n",
    "d = {k: v for k, v in items}\n",
    "lambda a, b=1: a if b else -a\n",
    "x = a[1:2:3, ..., :]\n",
    "raise ValueError('bad') from cause\n",
    "assert x == y, 'mismatch'\n",
    "global counter\n",
    "del cache[key]\n",
    "x: int = f(*args, **kwargs)\n",
];

fn valid_fragment() -> impl Strategy<Value = String> {
    prop::sample::select(FRAGMENTS).prop_map(std::string::ToString::to_string)
}

/// Generates a truncated fragment (cut at a random char boundary).
fn truncated_fragment() -> impl Strategy<Value = String> {
    valid_fragment().prop_flat_map(|s| {
        let len = s.len();
        if len <= 1 {
            Just(s).boxed()
        } else {
            (1..len)
                .prop_map(move |cut| {
                    let safe_cut = s.floor_char_boundary(cut);
                    if safe_cut == 0 {
                        s.clone()
                    } else {
                        s[..safe_cut].to_string()
                    }
                })
                .boxed()
        }
    })
}

/// Generates input with mismatched brackets via single-pass char mapping.
fn mismatched_brackets() -> impl Strategy<Value = String> {
    valid_fragment().prop_map(|s| {
        let mut result = String::with_capacity(s.len());
        for ch in s.chars() {
            let mapped = match ch {
                '[' => '(',
                ']' => '}',
                '(' => '[',
                _ => ch,
            };
            result.push(mapped);
        }
        result
    })
}

/// Generates input with the colons of compound headers removed.
fn missing_colons() -> impl Strategy<Value = String> {
    valid_fragment().prop_map(|s| s.replace(":\n", "\n").replace("):", ")"))
}

/// Generates input with duplicated operators.
fn duplicated_operators() -> impl Strategy<Value = String> {
    valid_fragment().prop_map(|s| s.replace('+', "+ +").replace('=', "= ="))
}

/// Generates two fragments glued together without a separating newline.
fn glued_fragments() -> impl Strategy<Value = String> {
    (valid_fragment(), valid_fragment()).prop_map(|(a, b)| {
        let mut out = a.trim_end().to_string();
        out.push_str(&b);
        out
    })
}

fn near_valid_python() -> impl Strategy<Value = String> {
    prop_oneof![
        valid_fragment(),
        truncated_fragment(),
        mismatched_brackets(),
        missing_colons(),
        duplicated_operators(),
        glued_fragments(),
    ]
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_recovering(input: &str) -> Option<(Module, Vec<crate::source_analysis::Diagnostic>)> {
    let (tokens, _lex_errors) = lex(input, LexOptions::default());
    let options = ParseOptions {
        error_mode: ErrorMode::Recover,
        ..ParseOptions::default()
    };
    parse_module_tokens(tokens, &options, &CancelToken::none()).ok()
}

fn module_has_bad_nodes(module: &Module) -> bool {
    let mut stack: Vec<NodeRef<'_>> = module.body.iter().map(NodeRef::Stmt).collect();
    while let Some(node) = stack.pop() {
        if let NodeRef::Stmt(stmt) = node {
            if matches!(stmt.kind, StmtKind::Bad { .. }) {
                return true;
            }
        }
        each_child(node, &mut |child| stack.push(child));
    }
    false
}

/// Default is 512 cases for standard CI; override via `PROPTEST_CASES` env var
/// for nightly extended runs.
fn proptest_config() -> ProptestConfig {
    let default = ProptestConfig::default();
    ProptestConfig {
        cases: default.cases.max(512),
        ..default
    }
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #![proptest_config(proptest_config())]

    /// Property 1: the parser never panics on arbitrary string input.
    ///
    /// Recovery must either produce a module or report exhaustion; it must
    /// never loop or crash, even on byte soup.
    #[test]
    fn parser_never_panics(input in "\\PC{0,500}") {
        let _ = parse_recovering(&input);
    }

    /// Property 1b: same, on near-valid structured input that exercises
    /// recovery more deeply.
    #[test]
    fn parser_never_panics_near_valid(input in near_valid_python()) {
        let _ = parse_recovering(&input);
    }

    /// Property 2: all diagnostic spans lie within the input bounds.
    #[test]
    fn diagnostic_spans_within_input(input in near_valid_python()) {
        if let Some((_module, diagnostics)) = parse_recovering(&input) {
            let input_len = u32::try_from(input.len()).unwrap_or(u32::MAX);
            for diag in &diagnostics {
                prop_assert!(
                    diag.span().end() <= input_len,
                    "diagnostic span end {} exceeds input length {} for input {:?}: {}",
                    diag.span().end(),
                    input_len,
                    input,
                    diag.message(),
                );
                prop_assert!(
                    diag.span().start() <= diag.span().end(),
                    "diagnostic span start {} > end {} for input {:?}: {}",
                    diag.span().start(),
                    diag.span().end(),
                    input,
                    diag.message(),
                );
            }
        }
    }

    /// Property 3: a module containing Bad statements always carries at
    /// least one diagnostic explaining them.
    #[test]
    fn bad_nodes_produce_diagnostics(input in near_valid_python()) {
        if let Some((module, diagnostics)) = parse_recovering(&input) {
            if module_has_bad_nodes(&module) {
                prop_assert!(
                    !diagnostics.is_empty(),
                    "module contains Bad node(s) but no diagnostics for input: {:?}",
                    input,
                );
            }
        }
    }

    /// Property 4: every node's span contains the spans of its children.
    #[test]
    fn child_spans_nest(input in near_valid_python()) {
        if let Some((module, _diagnostics)) = parse_recovering(&input) {
            let mut stack: Vec<NodeRef<'_>> = module.body.iter().map(NodeRef::Stmt).collect();
            while let Some(node) = stack.pop() {
                each_child(node, &mut |child| {
                    assert!(
                        node.span().contains(child.span()),
                        "parent span {:?} does not contain child span {:?} for input {:?}",
                        node.span(),
                        child.span(),
                        input,
                    );
                    stack.push(child);
                });
            }
        }
    }
}
