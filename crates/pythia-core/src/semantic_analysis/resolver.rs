// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Driving the passes and packaging the result.
//!
//! [`Resolver::resolve`] runs a fixed number of propagation passes over a
//! module. Because symbol bindings persist between passes, the final pass
//! sees names bound anywhere in the module, which is how forward references
//! resolve without a separate declaration pass. Only the final pass's
//! expression resolutions are kept.

use std::sync::Arc;

use camino::Utf8PathBuf;
use ecow::eco_format;
use rustc_hash::FxHashMap;

use crate::ast::{each_child, ExprKind, Module, NodeId, NodeRef, StmtKind};
use crate::cancel::CancelToken;

use super::error::ResolveError;
use super::graph::{SymbolGraph, TypeInducer};
use super::propagate::{Assembly, PropagateObserver, Propagator};
use super::scope::{ScopeId, Scopes};
use super::value::{Value, Values};

/// Two passes resolve everything that does not require a fixpoint: the
/// first pass binds every name, the second reads the accumulated bindings.
const NUM_PASSES: usize = 2;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Path of the file being analyzed. Only used for `__file__` and the
    /// module name; nothing is read from disk.
    pub path: Utf8PathBuf,
    /// Number of propagation passes.
    pub passes: usize,
    /// Emit `tracing` events per pass, evaluation, and produced value.
    pub trace: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            path: Utf8PathBuf::from("<unknown>.py"),
            passes: NUM_PASSES,
            trace: false,
        }
    }
}

/// Resolves the names and expressions of parsed modules against a symbol
/// graph. Cheap to clone; holds no per-module state.
#[derive(Clone)]
pub struct Resolver {
    graph: Arc<dyn SymbolGraph>,
    inducer: Option<Arc<dyn TypeInducer>>,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(graph: Arc<dyn SymbolGraph>, options: ResolveOptions) -> Self {
        Self {
            graph,
            inducer: None,
            options,
        }
    }

    /// Adds a probabilistic return-type source for external function calls.
    #[must_use]
    pub fn with_inducer(mut self, inducer: Arc<dyn TypeInducer>) -> Self {
        self.inducer = Some(inducer);
        self
    }

    pub fn resolve(
        &self,
        module: &Module,
        cancel: &CancelToken,
    ) -> Result<ResolvedTree, ResolveError> {
        validate(module)?;

        let name = self.options.path.file_stem().unwrap_or("module");
        let mut asm = Assembly::new(self.graph.as_ref(), name, self.options.path.as_str());
        let mut collector = Collector::default();

        let passes = self.options.passes.max(1);
        for pass in 0..passes {
            if self.options.trace {
                tracing::debug!(pass, passes, "propagation pass");
            }
            collector.pass(pass, passes);
            let mut propagator = Propagator::new(
                &mut asm,
                self.graph.as_ref(),
                self.inducer.as_deref(),
                &mut collector,
                cancel,
                self.options.trace,
            );
            propagator.propagate_module(module)?;
        }

        let mut nav = Navigation::default();
        nav.tables.insert(module.id, asm.module_scope);
        for stmt in &module.body {
            nav.visit(NodeRef::Stmt(stmt), module.id, None, module.id, &asm);
        }

        Ok(ResolvedTree {
            root: module.clone(),
            references: collector.references,
            parent: nav.parent,
            parent_stmt: nav.parent_stmt,
            order: nav.order,
            tables: nav.tables,
            scope_of: nav.scope_of,
            module_value: Value::Module(asm.module_scope),
            scopes: Arc::new(asm.scopes),
            values: Arc::new(asm.values),
        })
    }
}

/// A fully resolved module: the tree plus every side table produced by
/// resolution. Self-contained; does not borrow the input module.
#[derive(Clone)]
pub struct ResolvedTree {
    pub root: Module,
    /// Final resolution of every expression. A key with a `None` value is
    /// an expression that was evaluated but could not be resolved.
    references: FxHashMap<NodeId, Option<Value>>,
    parent: FxHashMap<NodeId, NodeId>,
    parent_stmt: FxHashMap<NodeId, NodeId>,
    order: FxHashMap<NodeId, usize>,
    /// Scope-owning node (module, def, class, lambda, comprehension) to
    /// its symbol table.
    tables: FxHashMap<NodeId, ScopeId>,
    /// Every node to its nearest enclosing scope-owning node.
    scope_of: FxHashMap<NodeId, NodeId>,
    module_value: Value,
    scopes: Arc<Scopes>,
    values: Arc<Values>,
}

impl ResolvedTree {
    /// The value an expression resolved to, if it resolved at all.
    pub fn value_of(&self, node: NodeId) -> Option<&Value> {
        self.references.get(&node).and_then(Option::as_ref)
    }

    /// Whether the expression was evaluated during the final pass.
    pub fn is_evaluated(&self, node: NodeId) -> bool {
        self.references.contains_key(&node)
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.parent.get(&node).copied()
    }

    /// The statement the node hangs off, if it is not itself top level.
    pub fn parent_stmt_of(&self, node: NodeId) -> Option<NodeId> {
        self.parent_stmt.get(&node).copied()
    }

    /// Pre-order position of the node in the tree.
    pub fn order_of(&self, node: NodeId) -> Option<usize> {
        self.order.get(&node).copied()
    }

    /// The scope-owning node enclosing this one.
    pub fn scope_node_of(&self, node: NodeId) -> Option<NodeId> {
        self.scope_of.get(&node).copied()
    }

    /// The symbol table a scope-owning node introduces.
    pub fn table_for(&self, node: NodeId) -> Option<ScopeId> {
        self.tables.get(&node).copied()
    }

    pub fn module_value(&self) -> &Value {
        &self.module_value
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Duplicates the tree with fresh node ids and all side tables remapped
    /// onto them. The symbol tables and value stores are shared with the
    /// original, not copied.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let (root, map) = self.root.deep_copy();
        let id = |old: &NodeId| map.get(old).copied();
        Self {
            references: self
                .references
                .iter()
                .filter_map(|(k, v)| Some((id(k)?, v.clone())))
                .collect(),
            parent: self
                .parent
                .iter()
                .filter_map(|(k, v)| Some((id(k)?, id(v)?)))
                .collect(),
            parent_stmt: self
                .parent_stmt
                .iter()
                .filter_map(|(k, v)| Some((id(k)?, id(v)?)))
                .collect(),
            order: self
                .order
                .iter()
                .filter_map(|(k, v)| Some((id(k)?, *v)))
                .collect(),
            tables: self
                .tables
                .iter()
                .filter_map(|(k, v)| Some((id(k)?, *v)))
                .collect(),
            scope_of: self
                .scope_of
                .iter()
                .filter_map(|(k, v)| Some((id(k)?, id(v)?)))
                .collect(),
            module_value: self.module_value.clone(),
            scopes: Arc::clone(&self.scopes),
            values: Arc::clone(&self.values),
            root,
        }
    }
}

/// Keeps only the final pass's resolutions. Earlier passes exist to bind
/// names; their intermediate values are superseded.
#[derive(Default)]
struct Collector {
    references: FxHashMap<NodeId, Option<Value>>,
    collecting: bool,
}

impl PropagateObserver for Collector {
    fn pass(&mut self, current: usize, total: usize) {
        self.collecting = current + 1 == total;
        if self.collecting {
            self.references = FxHashMap::default();
        }
    }

    fn resolved(&mut self, expr: NodeId, value: Option<&Value>) {
        if self.collecting {
            // later emissions win: an assignment target's final value
            // overwrites its pre-assignment evaluation
            self.references.insert(expr, value.cloned());
        }
    }
}

#[derive(Default)]
struct Navigation {
    parent: FxHashMap<NodeId, NodeId>,
    parent_stmt: FxHashMap<NodeId, NodeId>,
    order: FxHashMap<NodeId, usize>,
    tables: FxHashMap<NodeId, ScopeId>,
    scope_of: FxHashMap<NodeId, NodeId>,
}

impl Navigation {
    fn visit(
        &mut self,
        node: NodeRef<'_>,
        parent: NodeId,
        parent_stmt: Option<NodeId>,
        scope_node: NodeId,
        asm: &Assembly,
    ) {
        let id = node.id();
        self.parent.insert(id, parent);
        if let Some(stmt) = parent_stmt {
            self.parent_stmt.insert(id, stmt);
        }
        self.order.insert(id, self.order.len());
        self.scope_of.insert(id, scope_node);

        let own_table = match node {
            NodeRef::Stmt(stmt) => match &stmt.kind {
                StmtKind::FunctionDef { .. } => asm
                    .functions_by_node
                    .get(&id)
                    .map(|&f| asm.values.function(f).locals),
                StmtKind::ClassDef { .. } => asm
                    .classes_by_stmt
                    .get(&id)
                    .map(|&c| asm.values.class(c).members),
                _ => None,
            },
            NodeRef::Expr(expr) => match &expr.kind {
                ExprKind::Lambda { .. } => asm
                    .functions_by_node
                    .get(&id)
                    .map(|&f| asm.values.function(f).locals),
                ExprKind::ListComp { .. }
                | ExprKind::SetComp { .. }
                | ExprKind::DictComp { .. }
                | ExprKind::Generator { .. } => asm.comprehension_scopes.get(&id).copied(),
                _ => None,
            },
        };
        let child_scope = match own_table {
            Some(table) => {
                self.tables.insert(id, table);
                id
            }
            None => scope_node,
        };
        let next_stmt = match node {
            NodeRef::Stmt(_) => Some(id),
            NodeRef::Expr(_) => parent_stmt,
        };
        each_child(node, &mut |child| {
            self.visit(child, id, next_stmt, child_scope, asm);
        });
    }
}

/// External trees (hand-built or stitched from multiple parses) can carry
/// ids outside the module's range, which would corrupt the side tables.
fn validate(module: &Module) -> Result<(), ResolveError> {
    let bound = module.id_bound;
    let mut bad: Option<NodeId> = None;
    let mut check = |id: NodeId| {
        if id >= bound && bad.is_none() {
            bad = Some(id);
        }
    };
    check(module.id);
    for stmt in &module.body {
        check_ids(NodeRef::Stmt(stmt), &mut check);
    }
    match bad {
        Some(id) => Err(ResolveError::MalformedTree(eco_format!(
            "node id {id} is outside the module's id bound {bound}"
        ))),
        None => Ok(()),
    }
}

fn check_ids(node: NodeRef<'_>, check: &mut impl FnMut(NodeId)) {
    check(node.id());
    each_child(node, &mut |child| check_ids(child, check));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::semantic_analysis::graph::test_graph::TestGraph;
    use crate::semantic_analysis::graph::GraphKind;
    use crate::semantic_analysis::value::disjuncts;
    use crate::source_analysis::{parse, ParseOptions};

    fn builtins_graph() -> TestGraph {
        TestGraph::new(&[
            ("builtins.map", GraphKind::Function),
            ("builtins.str", GraphKind::Type),
            ("builtins.len", GraphKind::Function),
            ("builtins.isinstance", GraphKind::Function),
            ("builtins.issubclass", GraphKind::Function),
            ("builtins.super", GraphKind::Function),
            ("json.loads", GraphKind::Function),
            ("os.path.join", GraphKind::Function),
        ])
    }

    fn resolve_source(source: &str) -> ResolvedTree {
        resolve_with(source, builtins_graph(), ResolveOptions::default())
    }

    fn resolve_with(source: &str, graph: TestGraph, options: ResolveOptions) -> ResolvedTree {
        let cancel = CancelToken::none();
        let parsed = parse(source, ParseOptions::default(), None, &cancel).unwrap();
        Resolver::new(Arc::new(graph), options)
            .resolve(&parsed.module, &cancel)
            .unwrap()
    }

    /// All `Name` expressions spelled `ident`, in source order.
    fn names(tree: &ResolvedTree, ident: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        for stmt in &tree.root.body {
            collect_names(NodeRef::Stmt(stmt), ident, &mut found);
        }
        found
    }

    fn collect_names(node: NodeRef<'_>, ident: &str, found: &mut Vec<NodeId>) {
        if let NodeRef::Expr(Expr {
            id,
            kind: ExprKind::Name { ident: name, .. },
            ..
        }) = node
        {
            if name == ident {
                found.push(*id);
            }
        }
        each_child(node, &mut |child| collect_names(child, ident, found));
    }

    fn attribute_node(tree: &ResolvedTree, attr: &str) -> NodeId {
        let mut found = None;
        for stmt in &tree.root.body {
            find_attribute(NodeRef::Stmt(stmt), attr, &mut found);
        }
        found.unwrap()
    }

    fn find_attribute(node: NodeRef<'_>, attr: &str, found: &mut Option<NodeId>) {
        if let NodeRef::Expr(Expr {
            id,
            kind: ExprKind::Attribute { attribute, .. },
            ..
        }) = node
        {
            if attribute == attr {
                *found = Some(*id);
            }
        }
        each_child(node, &mut |child| find_attribute(child, attr, found));
    }

    #[test]
    fn builtins_resolve_without_import() {
        let graph = builtins_graph();
        let map_node = graph.node("builtins.map");
        let tree = resolve_with(
            "x = map(str, [1, 2, 3])\n",
            graph,
            ResolveOptions::default(),
        );
        let map_name = names(&tree, "map")[0];
        assert_eq!(tree.value_of(map_name), Some(&Value::External(map_node)));
    }

    #[test]
    fn imported_names_resolve_through_the_graph() {
        let graph = builtins_graph();
        let loads = graph.node("json.loads");
        let join = graph.node("os.path.join");
        let tree = resolve_with(
            "import os.path\nfrom json import loads\na = loads\nb = os.path.join\n",
            graph,
            ResolveOptions::default(),
        );
        let a = *names(&tree, "a").last().unwrap();
        assert_eq!(tree.value_of(a), Some(&Value::External(loads)));
        let b = *names(&tree, "b").last().unwrap();
        assert_eq!(tree.value_of(b), Some(&Value::External(join)));
    }

    #[test]
    fn forward_reference_resolves_on_second_pass() {
        let source = "def f():\n    return Later()\n\nclass Later:\n    pass\n\nx = f()\n";
        let tree = resolve_source(source);
        let x = names(&tree, "x")[0];
        match tree.value_of(x) {
            Some(Value::Instance(class)) => {
                assert_eq!(tree.values().class(*class).name, "Later");
            }
            other => panic!("expected an instance of Later, got {other:?}"),
        }
    }

    #[test]
    fn single_pass_misses_forward_references() {
        let source = "def f():\n    return Later()\n\nclass Later:\n    pass\n\nx = f()\n";
        let options = ResolveOptions {
            passes: 1,
            ..ResolveOptions::default()
        };
        let tree = resolve_with(source, builtins_graph(), options);
        let x = names(&tree, "x")[0];
        assert!(tree.is_evaluated(x));
        assert_eq!(tree.value_of(x), None);
    }

    #[test]
    fn classmethod_receives_the_class() {
        let source = "\
class C:
    @classmethod
    def make(cls, a):
        return cls

C.make(123)
";
        let tree = resolve_source(source);
        let cls = names(&tree, "cls");
        for node in cls {
            match tree.value_of(node) {
                Some(Value::Class(class)) => {
                    assert_eq!(tree.values().class(*class).name, "C");
                }
                other => panic!("expected class C, got {other:?}"),
            }
        }
        let a = names(&tree, "a")[0];
        assert_eq!(tree.value_of(a), Some(&Value::Int(123)));
    }

    #[test]
    fn methods_receive_an_instance() {
        let source = "\
class C:
    def ping(self):
        return self
";
        let tree = resolve_source(source);
        let this = names(&tree, "self")[0];
        match tree.value_of(this) {
            Some(Value::Instance(class)) => {
                assert_eq!(tree.values().class(*class).name, "C");
            }
            other => panic!("expected an instance of C, got {other:?}"),
        }
    }

    #[test]
    fn super_calls_reach_the_base_class() {
        let source = "\
class Base:
    def greet(self):
        return 1

class Child(Base):
    def greet(self):
        return super().greet()
";
        let tree = resolve_source(source);
        let greet = attribute_node(&tree, "greet");
        match tree.value_of(greet) {
            Some(Value::Function(fid)) => {
                let class = tree.values().function(*fid).class.unwrap();
                assert_eq!(tree.values().class(class).name, "Base");
            }
            other => panic!("expected Base.greet, got {other:?}"),
        }
    }

    #[test]
    fn branches_unite_into_a_union() {
        let source = "\
import os
if os.path:
    x = 1
else:
    x = 'one'
y = x
";
        let tree = resolve_source(source);
        let y = names(&tree, "y")[0];
        let value = tree.value_of(y).unwrap();
        let mut parts = disjuncts(value);
        parts.sort_by_key(|v| matches!(v, Value::Str(_)));
        assert_eq!(parts, vec![Value::Int(1), Value::Str("one".into())]);
    }

    #[test]
    fn attributes_assigned_in_init_are_visible_on_instances() {
        let source = "\
class Point:
    def __init__(self, x):
        self.x = x

p = Point(5)
q = p.x
";
        let tree = resolve_source(source);
        let q = names(&tree, "q")[0];
        assert_eq!(tree.value_of(q), Some(&Value::Int(5)));
    }

    #[test]
    fn comprehension_variables_stay_local() {
        let source = "xs = [i * 2 for i in [1, 2]]\n";
        let tree = resolve_source(source);
        // the comprehension owns a scope distinct from the module's
        let module_table = tree.table_for(tree.root.id).unwrap();
        assert!(tree.scopes().local(module_table, "i").is_none());
        let i = names(&tree, "i")[0];
        let comp_node = tree.scope_node_of(i).unwrap();
        let comp_table = tree.table_for(comp_node).unwrap();
        assert!(tree.scopes().local(comp_table, "i").is_some());
    }

    #[test]
    fn navigation_tables_cover_every_node() {
        let source = "def f(a):\n    return a + 1\n\nz = f(2)\n";
        let tree = resolve_source(source);
        let a_nodes = names(&tree, "a");
        for node in &a_nodes {
            let def_stmt = tree.scope_node_of(*node).unwrap();
            assert!(tree.table_for(def_stmt).is_some());
            assert!(tree.parent_of(*node).is_some());
            assert!(tree.parent_stmt_of(*node).is_some());
            assert!(tree.order_of(*node).is_some());
        }
    }

    #[test]
    fn deep_copy_remaps_resolutions_onto_fresh_ids() {
        let tree = resolve_source("x = 1\ny = x\n");
        let copy = tree.deep_copy();
        assert_ne!(tree.root.id, copy.root.id);
        let y = names(&copy, "y")[0];
        assert!(y >= tree.root.id_bound);
        assert_eq!(copy.value_of(y), Some(&Value::Int(1)));
        // symbol tables are shared
        assert!(Arc::ptr_eq(&tree.scopes, &copy.scopes));
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let cancel = CancelToken::none();
        let parsed = parse("x = 1\n", ParseOptions::default(), None, &cancel).unwrap();
        let mut module = (*parsed.module).clone();
        module.id_bound = module.id;
        let result = Resolver::new(Arc::new(builtins_graph()), ResolveOptions::default())
            .resolve(&module, &cancel);
        assert!(matches!(result, Err(ResolveError::MalformedTree(_))));
    }

    #[test]
    fn cancellation_aborts_resolution() {
        let cancel = CancelToken::none();
        let parsed = parse("x = 1\n", ParseOptions::default(), None, &cancel).unwrap();
        cancel.cancel();
        let result = Resolver::new(Arc::new(builtins_graph()), ResolveOptions::default())
            .resolve(&parsed.module, &cancel);
        assert!(matches!(result, Err(ResolveError::Cancelled(_))));
    }

    #[test]
    fn unresolved_expressions_still_get_entries() {
        let tree = resolve_source("mystery_name\n");
        let node = names(&tree, "mystery_name")[0];
        assert!(tree.is_evaluated(node));
        assert_eq!(tree.value_of(node), None);
    }

    #[test]
    fn isinstance_asserts_narrow_the_argument() {
        let source = "\
def f(v):
    assert isinstance(v, str)
    return v
";
        let graph = builtins_graph();
        let str_node = graph.node("builtins.str");
        let tree = resolve_with(source, graph, ResolveOptions::default());
        let v = *names(&tree, "v").last().unwrap();
        assert_eq!(
            tree.value_of(v),
            Some(&Value::ExternalInstance(str_node))
        );
    }

    #[test]
    fn wildcard_import_binds_every_member() {
        let graph = TestGraph::new(&[
            ("builtins.object", GraphKind::Type),
            ("pkg.alpha", GraphKind::Function),
            ("pkg.beta", GraphKind::Function),
        ]);
        let alpha = graph.node("pkg.alpha");
        let tree = resolve_with(
            "from pkg import *\nx = alpha\n",
            graph,
            ResolveOptions::default(),
        );
        let x = names(&tree, "x")[0];
        assert_eq!(tree.value_of(x), Some(&Value::External(alpha)));
    }

    #[test]
    fn missing_graph_entries_leave_names_unresolved() {
        let tree = resolve_with(
            "import enum\nx = enum\n",
            builtins_graph(),
            ResolveOptions::default(),
        );
        let x = names(&tree, "x")[0];
        assert!(tree.is_evaluated(x));
        assert_eq!(tree.value_of(x), None);
    }
}
