// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The Python syntax tree.
//!
//! Statements and expressions are closed sum types ([`StmtKind`],
//! [`ExprKind`]) wrapped in [`Stmt`]/[`Expr`] structs that carry a [`Span`]
//! and a [`NodeId`]. The tree owns its children outright; all cross-cutting
//! indexes (parent maps, resolved values, evaluation order) live in side
//! tables keyed by `NodeId`, never inside the nodes. That keeps ownership
//! unambiguous and makes [`Module::deep_copy`] a mechanical re-stamp of ids.
//!
//! Two invariants hold for every well-formed tree:
//!
//! - **Containment**: a parent's span fully contains every child's span.
//! - **Non-overlap**: the approximation sub-trees attached to a single
//!   [`StmtKind::Bad`]/[`ExprKind::Bad`] node never overlap in byte range.
//!
//! `Bad` nodes stand in for regions that failed to parse under the full
//! grammar; the approximate reconstructor may attach best-effort sub-trees
//! to them after parsing.

use ecow::EcoString;
use rustc_hash::FxHashMap;

pub use crate::source_analysis::Span;

/// Identity of a statement or expression, unique within one parse.
pub type NodeId = u32;

/// Allocates fresh [`NodeId`]s.
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: NodeId,
}

impl NodeIdGen {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes allocation above an existing module's ids.
    #[must_use]
    pub fn starting_at(next: NodeId) -> Self {
        Self { next }
    }

    pub fn fresh(&mut self) -> NodeId {
        let id = self.next;
        self.next += 1;
        id
    }

    #[must_use]
    pub fn bound(&self) -> NodeId {
        self.next
    }
}

/// How a name-like expression is used, determined by structural context.
///
/// Assigned by the usage marker after parsing; `Undecided` must not survive
/// marking on any name/attribute/index/tuple/list node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Usage {
    #[default]
    Undecided,
    /// The expression's value is read.
    Evaluate,
    /// The expression is the target of an assignment.
    Assign,
    /// The expression is the target of a `del` statement.
    Delete,
    /// The expression names an imported module or member.
    Import,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Pos,
    Neg,
    Invert,
    Not,
}

/// Binary operators, including comparisons and boolean connectives.
/// Comparison chains (`a < b < c`) parse as nested `Binary` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    TrueDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    In,
    NotIn,
}

impl BinaryOp {
    /// True for operators whose result is always a boolean.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Ne
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::Is
                | Self::IsNot
                | Self::In
                | Self::NotIn
        )
    }
}

/// Which numeric literal form a [`ExprKind::Num`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Int,
    Long,
    Float,
    Imag,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

impl Expr {
    #[must_use]
    pub fn new(id: NodeId, span: Span, kind: ExprKind) -> Self {
        Self { id, span, kind }
    }

    /// Returns true if this is a placeholder for an unparsable region.
    #[must_use]
    pub const fn is_bad(&self) -> bool {
        matches!(self.kind, ExprKind::Bad { .. })
    }

    /// Returns the usage for name-like expressions, if this is one.
    #[must_use]
    pub fn usage(&self) -> Option<Usage> {
        match &self.kind {
            ExprKind::Name { usage, .. }
            | ExprKind::Attribute { usage, .. }
            | ExprKind::Index { usage, .. }
            | ExprKind::Tuple { usage, .. }
            | ExprKind::List { usage, .. } => Some(*usage),
            _ => None,
        }
    }

    /// Returns the identifier if this is a plain name expression.
    #[must_use]
    pub fn as_name(&self) -> Option<&EcoString> {
        match &self.kind {
            ExprKind::Name { ident, .. } => Some(ident),
            _ => None,
        }
    }
}

/// Key/value entry of a dict display.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub span: Span,
    pub key: Expr,
    pub value: Expr,
}

/// One `for ... in ... [if ...]` clause of a comprehension.
///
/// Each comprehension expression introduces its own scope (Python 3 rules);
/// the scope's identity is the comprehension expression's `NodeId`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub span: Span,
    pub targets: Vec<Expr>,
    pub iterable: Expr,
    pub conditions: Vec<Expr>,
    pub is_async: bool,
}

/// One subscript of an index expression: `a[i]`, `a[i:j:k]`, `a[...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscript {
    pub span: Span,
    pub kind: SubscriptKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptKind {
    Index(Expr),
    Slice {
        lower: Option<Expr>,
        upper: Option<Expr>,
        step: Option<Expr>,
    },
    Ellipsis,
}

/// A call argument, positional or keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub span: Span,
    /// Keyword name for `name=value` arguments.
    pub name: Option<Expr>,
    pub value: Expr,
}

/// An ordinary parameter. `name` is a name expression, or a tuple for the
/// Python 2 nested-tuple form `def f(a, (b, c))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub span: Span,
    pub name: Expr,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
    /// True for parameters after a bare or named `*`.
    pub keyword_only: bool,
}

/// A `*args` or `**kwargs` parameter. `name` is absent for a bare `*`
/// separating keyword-only parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgsParameter {
    pub span: Span,
    pub name: Option<Expr>,
    pub annotation: Option<Expr>,
}

/// The full parameter list of a function or lambda.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList {
    pub params: Vec<Parameter>,
    pub vararg: Option<ArgsParameter>,
    pub kwarg: Option<ArgsParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name {
        ident: EcoString,
        usage: Usage,
    },
    /// `value.attribute`; an empty attribute with an empty `attribute_span`
    /// is the cursor placeholder produced in cursor-completion mode.
    Attribute {
        value: Box<Expr>,
        attribute: EcoString,
        attribute_span: Span,
        usage: Usage,
    },
    Index {
        value: Box<Expr>,
        subscripts: Vec<Subscript>,
        usage: Usage,
    },
    Tuple {
        elements: Vec<Expr>,
        usage: Usage,
    },
    List {
        elements: Vec<Expr>,
        usage: Usage,
    },
    Set {
        elements: Vec<Expr>,
    },
    Dict {
        items: Vec<KeyValue>,
    },
    Num {
        literal: EcoString,
        number: NumberKind,
    },
    /// Adjacent string literals are concatenated into one node whose span
    /// covers all of them.
    Str {
        literal: EcoString,
    },
    /// Python 2 backtick repr: `` `x` ``
    Repr {
        value: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Argument>,
        vararg: Option<Box<Expr>>,
        kwarg: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Lambda {
        params: Box<ParameterList>,
        body: Box<Expr>,
    },
    /// `body if test else orelse`
    IfElse {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    Yield {
        value: Option<Box<Expr>>,
    },
    Await {
        value: Box<Expr>,
    },
    ListComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Generator {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    /// Placeholder for an unparsable expression region. `approximations`
    /// holds best-effort sub-trees attached by the reconstructor; their
    /// spans are pairwise disjoint.
    Bad {
        approximations: Vec<Expr>,
    },
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

impl Stmt {
    #[must_use]
    pub fn new(id: NodeId, span: Span, kind: StmtKind) -> Self {
        Self { id, span, kind }
    }

    /// Returns true if this is a placeholder for an unparsable region.
    #[must_use]
    pub const fn is_bad(&self) -> bool {
        matches!(self.kind, StmtKind::Bad { .. })
    }
}

/// A dotted module path in an import: `os.path`. Each component is a name
/// expression so the usage marker and resolver see ordinary names.
#[derive(Debug, Clone, PartialEq)]
pub struct DottedName {
    pub span: Span,
    pub names: Vec<Expr>,
}

impl DottedName {
    /// Joins the components with dots: `os.path`.
    #[must_use]
    pub fn join(&self) -> EcoString {
        let mut out = EcoString::new();
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            if let Some(ident) = name.as_name() {
                out.push_str(ident);
            }
        }
        out
    }
}

/// `import external as internal`
#[derive(Debug, Clone, PartialEq)]
pub struct DottedAsName {
    pub span: Span,
    pub external: DottedName,
    pub internal: Option<Expr>,
}

/// `from pkg import external as internal`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportAsName {
    pub span: Span,
    pub external: Expr,
    pub internal: Option<Expr>,
}

/// One `if`/`elif` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub span: Span,
    pub test: Expr,
    pub body: Vec<Stmt>,
}

/// One `except` clause of a try statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptClause {
    pub span: Span,
    pub exception: Option<Expr>,
    pub target: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// One `value as target` item of a with statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub span: Span,
    pub value: Expr,
    pub target: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr {
        value: Expr,
    },
    /// `targets[0] = targets[1] = ... = value`; `annotation` for
    /// `target: annotation [= value]`, in which case `value` may be absent.
    Assign {
        targets: Vec<Expr>,
        annotation: Option<Expr>,
        value: Option<Expr>,
    },
    AugAssign {
        target: Expr,
        op: BinaryOp,
        value: Expr,
    },
    Pass,
    Break,
    Continue,
    Del {
        targets: Vec<Expr>,
    },
    /// Python 2 print statement, including `print >>dest, ...`.
    Print {
        dest: Option<Expr>,
        values: Vec<Expr>,
    },
    /// Python 2 `exec body in globals, locals`.
    Exec {
        body: Expr,
        globals: Option<Expr>,
        locals: Option<Expr>,
    },
    Return {
        value: Option<Expr>,
    },
    /// `raise exc, instance, traceback` (Python 2 commas) or
    /// `raise exc from instance` (Python 3 maps `from` onto `instance`).
    Raise {
        exc: Option<Expr>,
        instance: Option<Expr>,
        traceback: Option<Expr>,
    },
    Global {
        names: Vec<Expr>,
    },
    NonLocal {
        names: Vec<Expr>,
    },
    Assert {
        test: Expr,
        message: Option<Expr>,
    },
    Import {
        names: Vec<DottedAsName>,
    },
    /// `from ...pkg import names` / `from pkg import *`.
    ImportFrom {
        dots: u32,
        package: Option<DottedName>,
        names: Vec<ImportAsName>,
        wildcard: bool,
    },
    If {
        branches: Vec<Branch>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        targets: Vec<Expr>,
        iterable: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
        is_async: bool,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptClause>,
        orelse: Vec<Stmt>,
        finally: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
        is_async: bool,
    },
    FunctionDef {
        name: Expr,
        params: ParameterList,
        return_annotation: Option<Expr>,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
        is_async: bool,
    },
    ClassDef {
        name: Expr,
        args: Vec<Argument>,
        vararg: Option<Expr>,
        kwarg: Option<Expr>,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
    },
    /// Placeholder for an unparsable statement region, spanning from the
    /// statement start to the recovery resynchronization point.
    Bad {
        approximations: Vec<Stmt>,
    },
}

/// The root of a parsed file. The module itself is a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub id: NodeId,
    pub span: Span,
    pub body: Vec<Stmt>,
    /// One past the highest `NodeId` in this tree; deep copies and node
    /// surgery allocate from here.
    pub id_bound: NodeId,
}

impl Module {
    /// Duplicates the whole tree with fresh node ids starting at `id_bound`.
    ///
    /// Returns the copy and the old-id to new-id map, which callers use to
    /// remap any side tables (resolved values, parent maps, scope tables)
    /// onto the copied nodes.
    #[must_use]
    pub fn deep_copy(&self) -> (Self, FxHashMap<NodeId, NodeId>) {
        let mut copy = self.clone();
        let mut restamp = Restamp {
            r#gen: NodeIdGen::starting_at(self.id_bound),
            map: FxHashMap::default(),
        };
        let old_module_id = copy.id;
        copy.id = restamp.r#gen.fresh();
        restamp.map.insert(old_module_id, copy.id);
        for stmt in &mut copy.body {
            visit_mut_stmt(stmt, &mut restamp);
        }
        copy.id_bound = restamp.r#gen.bound();
        (copy, restamp.map)
    }
}

struct Restamp {
    r#gen: NodeIdGen,
    map: FxHashMap<NodeId, NodeId>,
}

impl MutVisitor for Restamp {
    fn node(&mut self, id: &mut NodeId, _span: &mut Span) {
        let fresh = self.r#gen.fresh();
        self.map.insert(*id, fresh);
        *id = fresh;
    }
}

/// A shared reference to a statement or expression.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

impl NodeRef<'_> {
    #[must_use]
    pub fn id(self) -> NodeId {
        match self {
            Self::Stmt(s) => s.id,
            Self::Expr(e) => e.id,
        }
    }

    #[must_use]
    pub fn span(self) -> Span {
        match self {
            Self::Stmt(s) => s.span,
            Self::Expr(e) => e.span,
        }
    }
}

/// Calls `f` for every direct statement/expression child of `node`.
/// Auxiliary nodes (arguments, parameters, clauses) are transparent: their
/// contained expressions and statements are reported directly.
pub fn each_child<'a>(node: NodeRef<'a>, f: &mut impl FnMut(NodeRef<'a>)) {
    match node {
        NodeRef::Stmt(stmt) => each_stmt_child(stmt, f),
        NodeRef::Expr(expr) => each_expr_child(expr, f),
    }
}

fn opt<'a>(e: &'a Option<Expr>, f: &mut impl FnMut(NodeRef<'a>)) {
    if let Some(e) = e {
        f(NodeRef::Expr(e));
    }
}

fn boxed_opt<'a>(e: &'a Option<Box<Expr>>, f: &mut impl FnMut(NodeRef<'a>)) {
    if let Some(e) = e {
        f(NodeRef::Expr(e));
    }
}

fn exprs<'a>(es: &'a [Expr], f: &mut impl FnMut(NodeRef<'a>)) {
    for e in es {
        f(NodeRef::Expr(e));
    }
}

fn stmts<'a>(ss: &'a [Stmt], f: &mut impl FnMut(NodeRef<'a>)) {
    for s in ss {
        f(NodeRef::Stmt(s));
    }
}

fn params<'a>(list: &'a ParameterList, f: &mut impl FnMut(NodeRef<'a>)) {
    for p in &list.params {
        f(NodeRef::Expr(&p.name));
        opt(&p.annotation, f);
        opt(&p.default, f);
    }
    for args in [&list.vararg, &list.kwarg].into_iter().flatten() {
        opt(&args.name, f);
        opt(&args.annotation, f);
    }
}

fn comprehensions<'a>(gens: &'a [Comprehension], f: &mut impl FnMut(NodeRef<'a>)) {
    for r#gen in gens {
        exprs(&r#gen.targets, f);
        f(NodeRef::Expr(&r#gen.iterable));
        exprs(&r#gen.conditions, f);
    }
}

fn each_expr_child<'a>(expr: &'a Expr, f: &mut impl FnMut(NodeRef<'a>)) {
    match &expr.kind {
        ExprKind::Name { .. } | ExprKind::Num { .. } | ExprKind::Str { .. } => {}
        ExprKind::Attribute { value, .. }
        | ExprKind::Repr { value }
        | ExprKind::Await { value } => f(NodeRef::Expr(value)),
        ExprKind::Index {
            value, subscripts, ..
        } => {
            f(NodeRef::Expr(value));
            for sub in subscripts {
                match &sub.kind {
                    SubscriptKind::Index(e) => f(NodeRef::Expr(e)),
                    SubscriptKind::Slice { lower, upper, step } => {
                        opt(lower, f);
                        opt(upper, f);
                        opt(step, f);
                    }
                    SubscriptKind::Ellipsis => {}
                }
            }
        }
        ExprKind::Tuple { elements, .. }
        | ExprKind::List { elements, .. }
        | ExprKind::Set { elements } => exprs(elements, f),
        ExprKind::Dict { items } => {
            for item in items {
                f(NodeRef::Expr(&item.key));
                f(NodeRef::Expr(&item.value));
            }
        }
        ExprKind::Call {
            func,
            args,
            vararg,
            kwarg,
        } => {
            f(NodeRef::Expr(func));
            for arg in args {
                opt(&arg.name, f);
                f(NodeRef::Expr(&arg.value));
            }
            boxed_opt(vararg, f);
            boxed_opt(kwarg, f);
        }
        ExprKind::Unary { operand, .. } => f(NodeRef::Expr(operand)),
        ExprKind::Binary { left, right, .. } => {
            f(NodeRef::Expr(left));
            f(NodeRef::Expr(right));
        }
        ExprKind::Lambda { params: list, body } => {
            params(list, f);
            f(NodeRef::Expr(body));
        }
        ExprKind::IfElse { body, test, orelse } => {
            f(NodeRef::Expr(body));
            f(NodeRef::Expr(test));
            f(NodeRef::Expr(orelse));
        }
        ExprKind::Yield { value } => boxed_opt(value, f),
        ExprKind::ListComp {
            element,
            generators,
        }
        | ExprKind::SetComp {
            element,
            generators,
        }
        | ExprKind::Generator {
            element,
            generators,
        } => {
            f(NodeRef::Expr(element));
            comprehensions(generators, f);
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            f(NodeRef::Expr(key));
            f(NodeRef::Expr(value));
            comprehensions(generators, f);
        }
        ExprKind::Bad { approximations } => exprs(approximations, f),
    }
}

fn each_stmt_child<'a>(stmt: &'a Stmt, f: &mut impl FnMut(NodeRef<'a>)) {
    match &stmt.kind {
        StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        StmtKind::Expr { value } => f(NodeRef::Expr(value)),
        StmtKind::Assign {
            targets,
            annotation,
            value,
        } => {
            exprs(targets, f);
            opt(annotation, f);
            opt(value, f);
        }
        StmtKind::AugAssign { target, value, .. } => {
            f(NodeRef::Expr(target));
            f(NodeRef::Expr(value));
        }
        StmtKind::Del { targets } => exprs(targets, f),
        StmtKind::Print { dest, values } => {
            opt(dest, f);
            exprs(values, f);
        }
        StmtKind::Exec {
            body,
            globals,
            locals,
        } => {
            f(NodeRef::Expr(body));
            opt(globals, f);
            opt(locals, f);
        }
        StmtKind::Return { value } => opt(value, f),
        StmtKind::Raise {
            exc,
            instance,
            traceback,
        } => {
            opt(exc, f);
            opt(instance, f);
            opt(traceback, f);
        }
        StmtKind::Global { names } | StmtKind::NonLocal { names } => exprs(names, f),
        StmtKind::Assert { test, message } => {
            f(NodeRef::Expr(test));
            opt(message, f);
        }
        StmtKind::Import { names } => {
            for name in names {
                exprs(&name.external.names, f);
                opt(&name.internal, f);
            }
        }
        StmtKind::ImportFrom { package, names, .. } => {
            if let Some(package) = package {
                exprs(&package.names, f);
            }
            for name in names {
                f(NodeRef::Expr(&name.external));
                opt(&name.internal, f);
            }
        }
        StmtKind::If { branches, orelse } => {
            for branch in branches {
                f(NodeRef::Expr(&branch.test));
                stmts(&branch.body, f);
            }
            stmts(orelse, f);
        }
        StmtKind::While { test, body, orelse } => {
            f(NodeRef::Expr(test));
            stmts(body, f);
            stmts(orelse, f);
        }
        StmtKind::For {
            targets,
            iterable,
            body,
            orelse,
            ..
        } => {
            exprs(targets, f);
            f(NodeRef::Expr(iterable));
            stmts(body, f);
            stmts(orelse, f);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finally,
        } => {
            stmts(body, f);
            for handler in handlers {
                opt(&handler.exception, f);
                opt(&handler.target, f);
                stmts(&handler.body, f);
            }
            stmts(orelse, f);
            stmts(finally, f);
        }
        StmtKind::With { items, body, .. } => {
            for item in items {
                f(NodeRef::Expr(&item.value));
                opt(&item.target, f);
            }
            stmts(body, f);
        }
        StmtKind::FunctionDef {
            name,
            params: list,
            return_annotation,
            body,
            decorators,
            ..
        } => {
            exprs(decorators, f);
            f(NodeRef::Expr(name));
            params(list, f);
            opt(return_annotation, f);
            stmts(body, f);
        }
        StmtKind::ClassDef {
            name,
            args,
            vararg,
            kwarg,
            body,
            decorators,
        } => {
            exprs(decorators, f);
            f(NodeRef::Expr(name));
            for arg in args {
                opt(&arg.name, f);
                f(NodeRef::Expr(&arg.value));
            }
            opt(vararg, f);
            opt(kwarg, f);
            stmts(body, f);
        }
        StmtKind::Bad { approximations } => stmts(approximations, f),
    }
}

/// Mutable tree visitor used for node surgery: id re-stamping on deep copy
/// and span shifting when reconstructed fragments are re-anchored.
pub(crate) trait MutVisitor {
    /// Called once per statement/expression with its id and span.
    fn node(&mut self, _id: &mut NodeId, _span: &mut Span) {}
    /// Called for the spans of auxiliary nodes (arguments, clauses, ...).
    fn aux_span(&mut self, _span: &mut Span) {}
}

pub(crate) struct ShiftSpans(pub u32);

impl MutVisitor for ShiftSpans {
    fn node(&mut self, _id: &mut NodeId, span: &mut Span) {
        *span = span.shifted(self.0);
    }

    fn aux_span(&mut self, span: &mut Span) {
        *span = span.shifted(self.0);
    }
}

fn visit_mut_opt(e: &mut Option<Expr>, v: &mut impl MutVisitor) {
    if let Some(e) = e {
        visit_mut_expr(e, v);
    }
}

fn visit_mut_exprs(es: &mut [Expr], v: &mut impl MutVisitor) {
    for e in es {
        visit_mut_expr(e, v);
    }
}

fn visit_mut_stmts(ss: &mut [Stmt], v: &mut impl MutVisitor) {
    for s in ss {
        visit_mut_stmt(s, v);
    }
}

fn visit_mut_params(list: &mut ParameterList, v: &mut impl MutVisitor) {
    for p in &mut list.params {
        v.aux_span(&mut p.span);
        visit_mut_expr(&mut p.name, v);
        visit_mut_opt(&mut p.annotation, v);
        visit_mut_opt(&mut p.default, v);
    }
    for args in [&mut list.vararg, &mut list.kwarg].into_iter().flatten() {
        v.aux_span(&mut args.span);
        visit_mut_opt(&mut args.name, v);
        visit_mut_opt(&mut args.annotation, v);
    }
}

fn visit_mut_comprehensions(gens: &mut [Comprehension], v: &mut impl MutVisitor) {
    for r#gen in gens {
        v.aux_span(&mut r#gen.span);
        visit_mut_exprs(&mut r#gen.targets, v);
        visit_mut_expr(&mut r#gen.iterable, v);
        visit_mut_exprs(&mut r#gen.conditions, v);
    }
}

pub(crate) fn visit_mut_expr(expr: &mut Expr, v: &mut impl MutVisitor) {
    v.node(&mut expr.id, &mut expr.span);
    match &mut expr.kind {
        ExprKind::Name { .. } | ExprKind::Num { .. } | ExprKind::Str { .. } => {}
        ExprKind::Attribute {
            value,
            attribute_span,
            ..
        } => {
            v.aux_span(attribute_span);
            visit_mut_expr(value, v);
        }
        ExprKind::Repr { value } | ExprKind::Await { value } => visit_mut_expr(value, v),
        ExprKind::Index {
            value, subscripts, ..
        } => {
            visit_mut_expr(value, v);
            for sub in subscripts {
                v.aux_span(&mut sub.span);
                match &mut sub.kind {
                    SubscriptKind::Index(e) => visit_mut_expr(e, v),
                    SubscriptKind::Slice { lower, upper, step } => {
                        visit_mut_opt(lower, v);
                        visit_mut_opt(upper, v);
                        visit_mut_opt(step, v);
                    }
                    SubscriptKind::Ellipsis => {}
                }
            }
        }
        ExprKind::Tuple { elements, .. }
        | ExprKind::List { elements, .. }
        | ExprKind::Set { elements } => visit_mut_exprs(elements, v),
        ExprKind::Dict { items } => {
            for item in items {
                v.aux_span(&mut item.span);
                visit_mut_expr(&mut item.key, v);
                visit_mut_expr(&mut item.value, v);
            }
        }
        ExprKind::Call {
            func,
            args,
            vararg,
            kwarg,
        } => {
            visit_mut_expr(func, v);
            for arg in args {
                v.aux_span(&mut arg.span);
                visit_mut_opt(&mut arg.name, v);
                visit_mut_expr(&mut arg.value, v);
            }
            if let Some(e) = vararg {
                visit_mut_expr(e, v);
            }
            if let Some(e) = kwarg {
                visit_mut_expr(e, v);
            }
        }
        ExprKind::Unary { operand, .. } => visit_mut_expr(operand, v),
        ExprKind::Binary { left, right, .. } => {
            visit_mut_expr(left, v);
            visit_mut_expr(right, v);
        }
        ExprKind::Lambda { params, body } => {
            visit_mut_params(params, v);
            visit_mut_expr(body, v);
        }
        ExprKind::IfElse { body, test, orelse } => {
            visit_mut_expr(body, v);
            visit_mut_expr(test, v);
            visit_mut_expr(orelse, v);
        }
        ExprKind::Yield { value } => {
            if let Some(e) = value {
                visit_mut_expr(e, v);
            }
        }
        ExprKind::ListComp {
            element,
            generators,
        }
        | ExprKind::SetComp {
            element,
            generators,
        }
        | ExprKind::Generator {
            element,
            generators,
        } => {
            visit_mut_expr(element, v);
            visit_mut_comprehensions(generators, v);
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            visit_mut_expr(key, v);
            visit_mut_expr(value, v);
            visit_mut_comprehensions(generators, v);
        }
        ExprKind::Bad { approximations } => visit_mut_exprs(approximations, v),
    }
}

pub(crate) fn visit_mut_stmt(stmt: &mut Stmt, v: &mut impl MutVisitor) {
    v.node(&mut stmt.id, &mut stmt.span);
    match &mut stmt.kind {
        StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        StmtKind::Expr { value } => visit_mut_expr(value, v),
        StmtKind::Assign {
            targets,
            annotation,
            value,
        } => {
            visit_mut_exprs(targets, v);
            visit_mut_opt(annotation, v);
            visit_mut_opt(value, v);
        }
        StmtKind::AugAssign { target, value, .. } => {
            visit_mut_expr(target, v);
            visit_mut_expr(value, v);
        }
        StmtKind::Del { targets } => visit_mut_exprs(targets, v),
        StmtKind::Print { dest, values } => {
            visit_mut_opt(dest, v);
            visit_mut_exprs(values, v);
        }
        StmtKind::Exec {
            body,
            globals,
            locals,
        } => {
            visit_mut_expr(body, v);
            visit_mut_opt(globals, v);
            visit_mut_opt(locals, v);
        }
        StmtKind::Return { value } => visit_mut_opt(value, v),
        StmtKind::Raise {
            exc,
            instance,
            traceback,
        } => {
            visit_mut_opt(exc, v);
            visit_mut_opt(instance, v);
            visit_mut_opt(traceback, v);
        }
        StmtKind::Global { names } | StmtKind::NonLocal { names } => visit_mut_exprs(names, v),
        StmtKind::Assert { test, message } => {
            visit_mut_expr(test, v);
            visit_mut_opt(message, v);
        }
        StmtKind::Import { names } => {
            for name in names {
                v.aux_span(&mut name.span);
                v.aux_span(&mut name.external.span);
                visit_mut_exprs(&mut name.external.names, v);
                visit_mut_opt(&mut name.internal, v);
            }
        }
        StmtKind::ImportFrom { package, names, .. } => {
            if let Some(package) = package {
                v.aux_span(&mut package.span);
                visit_mut_exprs(&mut package.names, v);
            }
            for name in names {
                v.aux_span(&mut name.span);
                visit_mut_expr(&mut name.external, v);
                visit_mut_opt(&mut name.internal, v);
            }
        }
        StmtKind::If { branches, orelse } => {
            for branch in branches {
                v.aux_span(&mut branch.span);
                visit_mut_expr(&mut branch.test, v);
                visit_mut_stmts(&mut branch.body, v);
            }
            visit_mut_stmts(orelse, v);
        }
        StmtKind::While { test, body, orelse } => {
            visit_mut_expr(test, v);
            visit_mut_stmts(body, v);
            visit_mut_stmts(orelse, v);
        }
        StmtKind::For {
            targets,
            iterable,
            body,
            orelse,
            ..
        } => {
            visit_mut_exprs(targets, v);
            visit_mut_expr(iterable, v);
            visit_mut_stmts(body, v);
            visit_mut_stmts(orelse, v);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finally,
        } => {
            visit_mut_stmts(body, v);
            for handler in handlers {
                v.aux_span(&mut handler.span);
                visit_mut_opt(&mut handler.exception, v);
                visit_mut_opt(&mut handler.target, v);
                visit_mut_stmts(&mut handler.body, v);
            }
            visit_mut_stmts(orelse, v);
            visit_mut_stmts(finally, v);
        }
        StmtKind::With { items, body, .. } => {
            for item in items {
                v.aux_span(&mut item.span);
                visit_mut_expr(&mut item.value, v);
                visit_mut_opt(&mut item.target, v);
            }
            visit_mut_stmts(body, v);
        }
        StmtKind::FunctionDef {
            name,
            params,
            return_annotation,
            body,
            decorators,
            ..
        } => {
            visit_mut_exprs(decorators, v);
            visit_mut_expr(name, v);
            visit_mut_params(params, v);
            visit_mut_opt(return_annotation, v);
            visit_mut_stmts(body, v);
        }
        StmtKind::ClassDef {
            name,
            args,
            vararg,
            kwarg,
            body,
            decorators,
        } => {
            visit_mut_exprs(decorators, v);
            visit_mut_expr(name, v);
            for arg in args {
                v.aux_span(&mut arg.span);
                visit_mut_opt(&mut arg.name, v);
                visit_mut_expr(&mut arg.value, v);
            }
            visit_mut_opt(vararg, v);
            visit_mut_opt(kwarg, v);
            visit_mut_stmts(body, v);
        }
        StmtKind::Bad { approximations } => visit_mut_stmts(approximations, v),
    }
}

/// Checks the containment invariant below `node`, returning the first
/// violating child id if any. Used by tests and debug assertions.
#[must_use]
pub fn first_containment_violation(node: NodeRef<'_>) -> Option<NodeId> {
    let mut found = None;
    let span = node.span();
    each_child(node, &mut |child| {
        if found.is_none() {
            if !span.contains(child.span()) {
                found = Some(child.id());
            } else {
                found = first_containment_violation(child);
            }
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(r#gen: &mut NodeIdGen, ident: &str, start: u32) -> Expr {
        let end = start + ident.len() as u32;
        Expr::new(
            r#gen.fresh(),
            Span::new(start, end),
            ExprKind::Name {
                ident: ident.into(),
                usage: Usage::Undecided,
            },
        )
    }

    /// `x = y` as a one-statement module.
    fn tiny_module() -> Module {
        let mut r#gen = NodeIdGen::new();
        let module_id = r#gen.fresh();
        let target = name(&mut r#gen, "x", 0);
        let value = name(&mut r#gen, "y", 4);
        let stmt = Stmt::new(
            r#gen.fresh(),
            Span::new(0, 5),
            StmtKind::Assign {
                targets: vec![target],
                annotation: None,
                value: Some(value),
            },
        );
        Module {
            id: module_id,
            span: Span::new(0, 5),
            body: vec![stmt],
            id_bound: r#gen.bound(),
        }
    }

    #[test]
    fn node_ids_are_unique() {
        let module = tiny_module();
        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(module.id));
        for stmt in &module.body {
            let mut stack = vec![NodeRef::Stmt(stmt)];
            while let Some(node) = stack.pop() {
                assert!(seen.insert(node.id()), "duplicate id {}", node.id());
                each_child(node, &mut |child| stack.push(child));
            }
        }
        assert!(seen.iter().all(|&id| id < module.id_bound));
    }

    #[test]
    fn containment_holds_for_tiny_module() {
        let module = tiny_module();
        for stmt in &module.body {
            assert_eq!(first_containment_violation(NodeRef::Stmt(stmt)), None);
        }
    }

    #[test]
    fn containment_violation_detected() {
        let mut r#gen = NodeIdGen::new();
        let inner = name(&mut r#gen, "victim", 100);
        let inner_id = inner.id;
        let stmt = Stmt::new(
            r#gen.fresh(),
            Span::new(0, 5),
            StmtKind::Expr { value: inner },
        );
        assert_eq!(
            first_containment_violation(NodeRef::Stmt(&stmt)),
            Some(inner_id)
        );
    }

    #[test]
    fn deep_copy_restamps_every_id() {
        let module = tiny_module();
        let (copy, map) = module.deep_copy();

        assert_eq!(copy.body[0].span, module.body[0].span);
        assert_eq!(map.len(), 4); // module, stmt, two names
        assert_eq!(map[&module.id], copy.id);
        for (&old, &new) in &map {
            assert!(old < module.id_bound);
            assert!(new >= module.id_bound);
        }
        assert!(copy.id_bound > module.id_bound);
    }

    #[test]
    fn shift_spans_moves_everything() {
        let mut module = tiny_module();
        let mut shift = ShiftSpans(10);
        for stmt in &mut module.body {
            visit_mut_stmt(stmt, &mut shift);
        }
        let stmt = &module.body[0];
        assert_eq!(stmt.span, Span::new(10, 15));
        let StmtKind::Assign { targets, .. } = &stmt.kind else {
            panic!("expected assign");
        };
        assert_eq!(targets[0].span, Span::new(10, 11));
    }

    #[test]
    fn dotted_name_join() {
        let mut r#gen = NodeIdGen::new();
        let dotted = DottedName {
            span: Span::new(0, 7),
            names: vec![name(&mut r#gen, "os", 0), name(&mut r#gen, "path", 3)],
        };
        assert_eq!(dotted.join(), "os.path");
    }

    #[test]
    fn usage_accessor_covers_name_like_kinds() {
        let mut r#gen = NodeIdGen::new();
        let n = name(&mut r#gen, "x", 0);
        assert_eq!(n.usage(), Some(Usage::Undecided));
        let num = Expr::new(
            r#gen.fresh(),
            Span::new(0, 1),
            ExprKind::Num {
                literal: "1".into(),
                number: NumberKind::Int,
            },
        );
        assert_eq!(num.usage(), None);
    }
}
