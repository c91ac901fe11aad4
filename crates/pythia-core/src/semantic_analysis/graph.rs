// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The external symbol graph interface.
//!
//! The resolver consults a read-only, process-lifetime index of known
//! packages, modules, and members. The graph is loaded by the surrounding
//! layer; the core sees it only through [`SymbolGraph`]. Handles are opaque
//! [`GraphNode`] values whose meaning is private to the implementation.

use ecow::EcoString;

/// Opaque handle to an entry in the symbol graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphNode(pub u64);

/// Coarse classification of a graph entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Module,
    /// A class; calling it yields an instance.
    Type,
    Function,
    /// Anything else: constants, instances, descriptors.
    Object,
}

/// Read-only index of externally known symbols.
///
/// Implementations must be immutable after load; the resolver shares one
/// graph across unlimited concurrent resolve calls without locking.
pub trait SymbolGraph: Send + Sync {
    /// Looks up a canonical dotted path such as `os.path.join`.
    fn lookup(&self, dotted: &str) -> Option<GraphNode>;

    /// Looks up a direct member of `node`.
    fn member(&self, node: GraphNode, name: &str) -> Option<GraphNode>;

    fn kind(&self, node: GraphNode) -> GraphKind;

    /// Names of the direct members of `node`, used for wildcard imports.
    /// Implementations that cannot enumerate may return an empty list.
    fn member_names(&self, node: GraphNode) -> Vec<EcoString> {
        let _ = node;
        Vec::new()
    }
}

/// Optional collaborator supplying probabilistic return types for external
/// callables. Consulted when the graph alone cannot say what a call returns;
/// never required for correctness.
pub trait TypeInducer: Send + Sync {
    /// Candidate return types for calling `func`, with probabilities.
    fn returns(&self, func: GraphNode) -> Vec<(GraphNode, f64)>;
}
