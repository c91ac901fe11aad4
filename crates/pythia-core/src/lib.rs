// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Pythia analysis core.
//!
//! This crate contains the core analysis functionality:
//! - Lexical analysis (tokenization)
//! - Fault-tolerant parsing (AST construction with error recovery)
//! - Approximate reconstruction of unparseable regions
//! - Static name resolution against a symbol graph
//!
//! The analyzer is designed as a language service, prioritizing
//! responsiveness on broken editor buffers over batch throughput.

pub mod ast;
pub mod cancel;
pub mod semantic_analysis;
pub mod source_analysis;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::ast::{Expr, Module, NodeId, Stmt, Usage};
    pub use crate::cancel::CancelToken;
    pub use crate::semantic_analysis::{ResolvedTree, Resolver, SymbolGraph, Value};
    pub use crate::source_analysis::{parse, ParseCache, ParseOptions, Span};
}
