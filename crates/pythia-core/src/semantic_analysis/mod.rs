// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! # DDD Context: Semantic Analysis
//!
//! Resolves the syntax trees produced by [`crate::source_analysis`]: every
//! expression is mapped to the value it could hold at runtime, backed by
//! symbol tables for each scope and a caller-provided [`SymbolGraph`] of
//! external packages.
//!
//! Resolution is flow-insensitive and multi-pass. Each pass walks the whole
//! module, evaluating expressions against the bindings accumulated so far
//! and uniting every value assigned to a name. Names bound anywhere in the
//! module are therefore visible everywhere by the final pass, which is the
//! one whose expression resolutions are kept. Values are approximate by
//! construction: a name holds a [`Value::Union`] when control flow could
//! leave it with more than one, and expressions nobody can resolve simply
//! map to nothing rather than failing the analysis.
//!
//! Entry point: [`Resolver::resolve`].

mod error;
mod graph;
mod propagate;
mod resolver;
mod scope;
mod value;

pub use error::ResolveError;
pub use graph::{GraphKind, GraphNode, SymbolGraph, TypeInducer};
pub use propagate::PropagateObserver;
pub use resolver::{ResolveOptions, ResolvedTree, Resolver};
pub use scope::{ScopeId, Scopes, Symbol, SymbolId};
pub use value::{
    disjuncts, unite, unite2, widen_constants, ClassId, ClassInfo, FunctionId, FunctionInfo,
    ParameterInfo, Value, Values, MAX_TRACKED_INT, MAX_UNION_CONSTITUENTS,
};
