// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Value propagation over the syntax tree.
//!
//! One propagation pass walks every statement, evaluates every expression
//! against the current bindings, and feeds everything assigned to a name
//! into its symbol. Bindings persist across passes, so a second pass sees
//! names that were first bound late in the previous one (forward-referenced
//! classes, names assigned after first use in a loop). The observer is told
//! about every evaluated expression, resolved or not.
//!
//! Scoping rules reproduced here: a class body reads its enclosing scope,
//! but functions nested in the class do not see class-body names (their
//! locals chain to the scope *around* the class); `self` receives an
//! instance of the declaring class, `cls` the class itself, staticmethods
//! nothing; `super()` proxies the base list in declaration order.

use ecow::EcoString;
use rustc_hash::FxHashMap;

use crate::ast::{
    Argument, Comprehension, Expr, ExprKind, Module, NodeId, ParameterList, Stmt, StmtKind,
    SubscriptKind, Usage,
};
use crate::ast::{BinaryOp, NumberKind, UnaryOp};
use crate::cancel::{CancelToken, Cancelled};

use super::graph::{GraphNode, SymbolGraph, TypeInducer};
use super::scope::{ScopeId, Scopes, SymbolId};
use super::value::{
    disjuncts, unite, unite2, widen_constants, ClassId, ClassInfo, FunctionId, FunctionInfo,
    ParameterInfo, Value, ValueCtx, MAX_TRACKED_INT,
};

/// Receives callbacks during propagation.
pub trait PropagateObserver {
    /// Called at the start of each pass with the current pass (0-indexed)
    /// and the total number of passes.
    fn pass(&mut self, current: usize, total: usize);

    /// Called after evaluating each expression, with its inferred value.
    /// Called even when evaluation produced nothing, with `None`.
    fn resolved(&mut self, expr: NodeId, value: Option<&Value>);
}

/// Everything discovered about the module so far: scope tables, source
/// classes and functions, and the node-to-scope indexes. Persists across
/// passes so bindings accumulate.
pub(crate) struct Assembly {
    pub scopes: Scopes,
    pub values: super::value::Values,
    pub module_scope: ScopeId,
    pub classes_by_stmt: FxHashMap<NodeId, ClassId>,
    pub functions_by_node: FxHashMap<NodeId, FunctionId>,
    pub comprehension_scopes: FxHashMap<NodeId, ScopeId>,
    lambda_counter: usize,
    builtins: Option<GraphNode>,
    isinstance: Option<GraphNode>,
    issubclass: Option<GraphNode>,
    super_builtin: Option<GraphNode>,
}

impl Assembly {
    pub(crate) fn new(graph: &dyn SymbolGraph, module_name: &str, path: &str) -> Self {
        let mut scopes = Scopes::new();
        let module_scope = scopes.create_scope(module_name, None);
        scopes.put(module_scope, "__name__", Some(Value::Str(module_name.into())));
        scopes.put(module_scope, "__file__", Some(Value::Str(path.into())));
        scopes.put(module_scope, "__doc__", Some(Value::StrInstance));

        let builtins = graph.lookup("builtins");
        let member = |name| builtins.and_then(|b| graph.member(b, name));
        Self {
            scopes,
            values: super::value::Values::new(),
            module_scope,
            classes_by_stmt: FxHashMap::default(),
            functions_by_node: FxHashMap::default(),
            comprehension_scopes: FxHashMap::default(),
            lambda_counter: 0,
            builtins,
            isinstance: member("isinstance"),
            issubclass: member("issubclass"),
            super_builtin: member("super"),
        }
    }
}

/// Lexical position of the propagator: the scope names are written into and
/// read from, plus the class/function whose immediate body is being walked.
#[derive(Clone, Copy)]
struct Frame {
    /// Where name expressions resolve and new symbols are created.
    scope: ScopeId,
    /// Parent for any scope created from here. Equal to `scope` except in
    /// a class body, where nested scopes skip the class table.
    inherited: ScopeId,
    class: Option<ClassId>,
    function: Option<FunctionId>,
}

pub(crate) struct Propagator<'a> {
    cancel: &'a CancelToken,
    graph: &'a dyn SymbolGraph,
    inducer: Option<&'a dyn TypeInducer>,
    observer: &'a mut dyn PropagateObserver,
    asm: &'a mut Assembly,
    trace: bool,
    frame: Frame,
}

impl<'a> Propagator<'a> {
    pub(crate) fn new(
        asm: &'a mut Assembly,
        graph: &'a dyn SymbolGraph,
        inducer: Option<&'a dyn TypeInducer>,
        observer: &'a mut dyn PropagateObserver,
        cancel: &'a CancelToken,
        trace: bool,
    ) -> Self {
        let frame = Frame {
            scope: asm.module_scope,
            inherited: asm.module_scope,
            class: None,
            function: None,
        };
        Self {
            cancel,
            graph,
            inducer,
            observer,
            asm,
            trace,
            frame,
        }
    }

    /// Runs one pass over the module body.
    pub(crate) fn propagate_module(&mut self, module: &Module) -> Result<(), Cancelled> {
        self.propagate_stmts(&module.body)
    }

    fn ctx(&self) -> ValueCtx<'_> {
        ValueCtx {
            scopes: &self.asm.scopes,
            values: &self.asm.values,
            graph: self.graph,
            inducer: self.inducer,
        }
    }

    fn in_frame<T>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> Result<T, Cancelled>,
    ) -> Result<T, Cancelled> {
        let saved = self.frame;
        self.frame = frame;
        let out = f(self);
        self.frame = saved;
        out
    }

    fn emit(&mut self, expr: NodeId, value: Option<&Value>) {
        if self.trace {
            tracing::trace!(expr, resolved = value.is_some(), "evaluated expression");
        }
        self.observer.resolved(expr, value);
    }

    /// Unites `value` into the symbol's accumulated binding.
    fn produce(&mut self, sym: SymbolId, value: Option<Value>) {
        if self.trace {
            let name = &self.asm.scopes.symbol(sym).name;
            tracing::trace!(symbol = %name, resolved = value.is_some(), "producing value");
        }
        let slot = self.asm.scopes.symbol_mut(sym);
        slot.value = unite2(slot.value.take(), value);
    }

    // ==================================================================
    // Statements
    // ==================================================================

    fn propagate_stmts(&mut self, stmts: &[Stmt]) -> Result<(), Cancelled> {
        for stmt in stmts {
            self.propagate_stmt(stmt)?;
        }
        Ok(())
    }

    fn propagate_stmt(&mut self, stmt: &Stmt) -> Result<(), Cancelled> {
        self.cancel.check()?;
        match &stmt.kind {
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::Expr { value } => self.evaluate(value).map(drop),
            StmtKind::Assign {
                targets,
                annotation,
                value,
            } => self.propagate_assign(targets, annotation.as_ref(), value.as_ref()),
            StmtKind::AugAssign { target, value, .. } => {
                let t = self.evaluate(value)?;
                self.assign_expr(target, t)
            }
            StmtKind::Del { targets } => self.evaluate_all(targets),
            StmtKind::Print { dest, values } => {
                self.evaluate_all(values)?;
                self.evaluate_opt(dest.as_ref()).map(drop)
            }
            StmtKind::Exec {
                body,
                globals,
                locals,
            } => {
                self.evaluate(body)?;
                self.evaluate_opt(globals.as_ref())?;
                self.evaluate_opt(locals.as_ref()).map(drop)
            }
            StmtKind::Return { value } => {
                if let Some(t) = self.evaluate_opt(value.as_ref())? {
                    self.can_return(Some(t));
                }
                Ok(())
            }
            StmtKind::Raise {
                exc,
                instance,
                traceback,
            } => {
                self.evaluate_opt(exc.as_ref())?;
                self.evaluate_opt(instance.as_ref())?;
                self.evaluate_opt(traceback.as_ref()).map(drop)
            }
            StmtKind::Global { names } | StmtKind::NonLocal { names } => self.evaluate_all(names),
            StmtKind::Assert { test, message } => self.propagate_assert(test, message.as_ref()),
            StmtKind::Import { names } => self.propagate_import(names),
            StmtKind::ImportFrom {
                dots,
                package,
                names,
                wildcard,
            } => self.propagate_import_from(*dots, package.as_ref(), names, *wildcard),
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    self.evaluate(&branch.test)?;
                    self.propagate_stmts(&branch.body)?;
                }
                self.propagate_stmts(orelse)
            }
            StmtKind::While { test, body, orelse } => {
                self.evaluate(test)?;
                self.propagate_stmts(body)?;
                self.propagate_stmts(orelse)
            }
            StmtKind::For {
                targets,
                iterable,
                body,
                orelse,
                ..
            } => {
                let sequence = self.evaluate(iterable)?;
                let elem = sequence.as_ref().and_then(|s| self.ctx().element_of(s));
                self.assign_exprs(targets, elem)?;
                self.propagate_stmts(body)?;
                self.propagate_stmts(orelse)
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finally,
            } => {
                self.propagate_stmts(body)?;
                for handler in handlers {
                    let ex_type = self.evaluate_opt(handler.exception.as_ref())?;
                    if let Some(target) = &handler.target {
                        let ex = ex_type.as_ref().and_then(|t| self.ctx().call_result(t));
                        self.assign_expr(target, ex)?;
                    }
                    self.propagate_stmts(&handler.body)?;
                }
                self.propagate_stmts(orelse)?;
                self.propagate_stmts(finally)
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    let value = self.evaluate(&item.value)?;
                    if let Some(target) = &item.target {
                        self.assign_expr(target, value)?;
                    }
                }
                self.propagate_stmts(body)
            }
            StmtKind::FunctionDef {
                name,
                params,
                return_annotation,
                body,
                decorators,
                ..
            } => self.propagate_function_def(
                stmt.id,
                name,
                params,
                return_annotation.as_ref(),
                body,
                decorators,
            ),
            StmtKind::ClassDef {
                name,
                args,
                vararg,
                kwarg,
                body,
                decorators,
            } => self.propagate_class_def(
                stmt.id,
                name,
                args,
                vararg.as_ref(),
                kwarg.as_ref(),
                body,
                decorators,
            ),
            StmtKind::Bad { approximations } => self.propagate_stmts(approximations),
        }
    }

    fn propagate_assign(
        &mut self,
        targets: &[Expr],
        annotation: Option<&Expr>,
        value: Option<&Expr>,
    ) -> Result<(), Cancelled> {
        if let Some(value) = value {
            let t = self.evaluate(value)?;
            for target in targets {
                self.assign_expr(target, t.clone())?;
            }
        } else {
            // bare annotation `x: T` still forces x into the local scope
            for target in targets {
                self.evaluate(target)?;
                if let Some(ident) = target.as_name() {
                    let ident = ident.clone();
                    self.asm.scopes.local_or_create(self.frame.scope, &ident);
                }
            }
        }
        if let Some(annotation) = annotation {
            let ann = self.evaluate(annotation)?;
            if let Some(ann) = ann {
                let instance = {
                    let ctx = self.ctx();
                    unite(disjuncts(&ann).iter().map(|d| ctx.call_result(d)))
                };
                if instance.is_some() {
                    if let Some(target) = targets.first() {
                        self.assign_expr(target, instance)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `assert isinstance(x, T)` and `assert issubclass(x, T)` narrow `x`.
    fn propagate_assert(&mut self, test: &Expr, message: Option<&Expr>) -> Result<(), Cancelled> {
        self.evaluate(test)?;
        self.evaluate_opt(message)?;

        let ExprKind::Call { func, args, .. } = &test.kind else {
            return Ok(());
        };
        if args.len() < 2 {
            return Ok(());
        }
        let Some(fun) = self.evaluate(func)? else {
            return Ok(());
        };
        let Some(arg2) = self.evaluate(&args[1].value)? else {
            return Ok(());
        };

        if matches!(fun, Value::External(n) if Some(n) == self.asm.isinstance) {
            // isinstance accepts a tuple of types; any of them is possible
            let candidates = match &arg2 {
                Value::Tuple(elements) => elements.iter().flatten().cloned().collect(),
                other => vec![other.clone()],
            };
            let narrowed = {
                let ctx = self.ctx();
                unite(candidates.iter().map(|c| ctx.call_result(c)))
            };
            self.assign_expr(&args[0].value, narrowed)?;
        } else if matches!(fun, Value::External(n) if Some(n) == self.asm.issubclass) {
            if let Value::Class(class) = arg2 {
                let mut seen = Vec::new();
                self.collect_subclasses(class, &mut seen);
                let narrowed = unite(seen.into_iter().map(|c| Some(Value::Class(c))));
                self.assign_expr(&args[0].value, narrowed)?;
            }
        }
        Ok(())
    }

    fn collect_subclasses(&self, class: ClassId, seen: &mut Vec<ClassId>) {
        if seen.contains(&class) {
            return;
        }
        seen.push(class);
        for &sub in &self.asm.values.class(class).subclasses.clone() {
            self.collect_subclasses(sub, seen);
        }
    }

    fn propagate_import(&mut self, names: &[crate::ast::DottedAsName]) -> Result<(), Cancelled> {
        for clause in names {
            let Some(first) = clause.external.names.first() else {
                continue;
            };
            let root = first.as_name().and_then(|n| self.import_abs(n));
            self.emit(first.id, root.as_ref());

            // traverse the rest of the dotted path
            let mut val = root.clone();
            for name in &clause.external.names[1..] {
                val = match (&val, name.as_name()) {
                    (Some(v), Some(ident)) => self.ctx().attr(v, ident),
                    _ => None,
                };
                self.emit(name.id, val.as_ref());
            }

            // without an alias the top-level package is bound and the user
            // spells out the full path on use; with one, the alias gets the
            // full path's value
            match &clause.internal {
                None => {
                    if let Some(ident) = first.as_name() {
                        self.assign_name(&ident.clone(), root);
                    }
                }
                Some(internal) => {
                    if let Some(ident) = internal.as_name() {
                        self.assign_name(&ident.clone(), val.clone());
                    }
                    self.emit(internal.id, val.as_ref());
                }
            }
        }
        Ok(())
    }

    fn propagate_import_from(
        &mut self,
        dots: u32,
        package: Option<&crate::ast::DottedName>,
        names: &[crate::ast::ImportAsName],
        wildcard: bool,
    ) -> Result<(), Cancelled> {
        let mut pkg: Option<Value> = None;
        let mut path: &[Expr] = package.map_or(&[], |p| p.names.as_slice());

        // relative imports need a source tree to resolve against; with a
        // single file they stay unresolved but their names still get entries
        if dots == 0 {
            if let Some((first, rest)) = path.split_first() {
                pkg = first.as_name().and_then(|n| self.import_abs(n));
                self.emit(first.id, pkg.as_ref());
                path = rest;
            }
        }
        for name in path {
            pkg = match (&pkg, name.as_name()) {
                (Some(v), Some(ident)) => self.ctx().attr(v, ident),
                _ => None,
            };
            self.emit(name.id, pkg.as_ref());
        }

        if wildcard {
            if let Some(Value::External(node)) = &pkg {
                for member in self.graph.member_names(*node) {
                    let val = self.graph.member(*node, &member).map(Value::External);
                    if val.is_some() {
                        self.assign_name(&member, val);
                    }
                }
            }
        }

        for clause in names {
            let val = match (&pkg, clause.external.as_name()) {
                (Some(v), Some(ident)) => self.ctx().attr(v, ident),
                _ => None,
            };
            self.emit(clause.external.id, val.as_ref());
            match &clause.internal {
                None => {
                    if let Some(ident) = clause.external.as_name() {
                        self.assign_name(&ident.clone(), val);
                    }
                }
                Some(internal) => {
                    if let Some(ident) = internal.as_name() {
                        self.assign_name(&ident.clone(), val.clone());
                    }
                    self.emit(internal.id, val.as_ref());
                }
            }
        }
        Ok(())
    }

    fn import_abs(&self, name: &str) -> Option<Value> {
        self.graph.lookup(name).map(Value::External)
    }

    fn propagate_function_def(
        &mut self,
        stmt_id: NodeId,
        name: &Expr,
        params: &ParameterList,
        return_annotation: Option<&Expr>,
        body: &[Stmt],
        decorators: &[Expr],
    ) -> Result<(), Cancelled> {
        let ident = name.as_name().cloned().unwrap_or_default();
        let fid = self.function_for(stmt_id, &ident, params, decorators);

        self.evaluate_all(decorators)?;

        if let Some(annotation) = return_annotation {
            let ann = self.evaluate(annotation)?;
            let rv = self.annotation_instance(ann);
            if rv.is_some() {
                let return_symbol = self.asm.values.function(fid).return_symbol;
                self.produce(return_symbol, rv);
            }
        }

        // defaults and annotations are evaluated in the enclosing scope,
        // which is when python evaluates them
        for (i, param) in params.params.iter().enumerate() {
            let symbol = self.asm.values.function(fid).params[i].symbol;
            if let Some(default) = &param.default {
                let t = self.evaluate(default)?;
                self.produce(symbol, t);
            }
            if let Some(annotation) = &param.annotation {
                let ann = self.evaluate(annotation)?;
                let instance = self.annotation_instance(ann);
                self.produce(symbol, instance);
            }
        }
        if let Some(vararg) = &params.vararg {
            if let Some(annotation) = &vararg.annotation {
                let ann = self.evaluate(annotation)?;
                let instance = self.annotation_instance(ann);
                if let Some(info) = self.asm.values.function(fid).vararg.clone() {
                    self.produce(info.symbol, Some(Value::list(instance)));
                }
            }
        }
        if let Some(kwarg) = &params.kwarg {
            if let Some(annotation) = &kwarg.annotation {
                let ann = self.evaluate(annotation)?;
                let instance = self.annotation_instance(ann);
                if let Some(info) = self.asm.values.function(fid).kwarg.clone() {
                    self.produce(info.symbol, Some(Value::dict(Some(Value::StrInstance), instance)));
                }
            }
        }

        // bind the receiver
        let info = self.asm.values.function(fid);
        let receiver = match (info.class, info.has_receiver, info.has_class_receiver) {
            (Some(class), true, _) => Some((info.params[0].symbol, Value::Instance(class))),
            (Some(class), _, true) => Some((info.params[0].symbol, Value::Class(class))),
            _ => None,
        };
        if let Some((symbol, value)) = receiver {
            self.produce(symbol, Some(value));
        }

        let value = Value::Function(fid);
        self.assign_name(&ident, Some(value.clone()));
        self.emit(name.id, Some(&value));

        let locals = self.asm.values.function(fid).locals;
        let class = self.asm.values.function(fid).class;
        let frame = Frame {
            scope: locals,
            inherited: locals,
            class,
            function: Some(fid),
        };
        self.in_frame(frame, |p| {
            p.emit_parameter_names(fid, params)?;
            p.propagate_stmts(body)
        })
    }

    /// Records values for the parameter name expressions themselves, so
    /// `self`, `cls`, and friends resolve at their declaration site too.
    fn emit_parameter_names(
        &mut self,
        fid: FunctionId,
        params: &ParameterList,
    ) -> Result<(), Cancelled> {
        for (i, param) in params.params.iter().enumerate() {
            if param.name.as_name().is_some() {
                let value = {
                    let symbol = self.asm.values.function(fid).params[i].symbol;
                    self.asm.scopes.symbol(symbol).value.clone()
                };
                self.emit(param.name.id, value.as_ref());
            } else {
                // python 2 nested tuple parameter: bind the element names
                self.assign_expr(&param.name, None)?;
            }
        }
        for (info, ast) in [
            (self.asm.values.function(fid).vararg.clone(), &params.vararg),
            (self.asm.values.function(fid).kwarg.clone(), &params.kwarg),
        ] {
            if let (Some(info), Some(ast)) = (info, ast) {
                if let Some(name) = &ast.name {
                    let value = self.asm.scopes.symbol(info.symbol).value.clone();
                    self.emit(name.id, value.as_ref());
                }
            }
        }
        Ok(())
    }

    fn annotation_instance(&self, annotation: Option<Value>) -> Option<Value> {
        let annotation = annotation?;
        let ctx = self.ctx();
        unite(disjuncts(&annotation).iter().map(|d| ctx.call_result(d)))
    }

    fn function_for(
        &mut self,
        node_id: NodeId,
        name: &str,
        params: &ParameterList,
        decorators: &[Expr],
    ) -> FunctionId {
        if let Some(&fid) = self.asm.functions_by_node.get(&node_id) {
            return fid;
        }

        let scope_name = self.asm.scopes.child_name(self.frame.scope, name);
        let locals = self
            .asm
            .scopes
            .create_scope(scope_name, Some(self.frame.inherited));
        let return_symbol = self.asm.scopes.local_or_create(locals, "[return]");

        let (mut has_receiver, mut has_class_receiver) = (false, false);
        if self.frame.class.is_some() && !params.params.is_empty() {
            match function_binding(decorators) {
                Some("classmethod") => has_class_receiver = true,
                Some(_) => {}
                None => has_receiver = true,
            }
        }

        let mut infos = Vec::with_capacity(params.params.len());
        for (i, param) in params.params.iter().enumerate() {
            let pname: EcoString = match param.name.as_name() {
                Some(ident) => ident.clone(),
                None => format!("[param{i}]").into(),
            };
            let symbol = self.asm.scopes.local_or_create(locals, &pname);
            infos.push(ParameterInfo {
                name: pname,
                symbol,
                keyword_only: param.keyword_only,
            });
        }

        let make_args_param = |scopes: &mut Scopes, ast: &Option<crate::ast::ArgsParameter>| {
            let name = ast.as_ref()?.name.as_ref()?.as_name()?.clone();
            let symbol = scopes.local_or_create(locals, &name);
            Some(ParameterInfo {
                name,
                symbol,
                keyword_only: false,
            })
        };
        let vararg = make_args_param(&mut self.asm.scopes, &params.vararg);
        let kwarg = make_args_param(&mut self.asm.scopes, &params.kwarg);

        let fid = self.asm.values.add_function(FunctionInfo {
            name: name.into(),
            locals,
            return_symbol,
            params: infos,
            vararg: vararg.clone(),
            kwarg: kwarg.clone(),
            class: self.frame.class,
            has_receiver,
            has_class_receiver,
        });
        self.asm.functions_by_node.insert(node_id, fid);

        if let Some(vararg) = vararg {
            self.produce(vararg.symbol, Some(Value::list(None)));
        }
        if let Some(kwarg) = kwarg {
            self.produce(
                kwarg.symbol,
                Some(Value::dict(Some(Value::StrInstance), None)),
            );
        }
        fid
    }

    #[allow(clippy::too_many_arguments)]
    fn propagate_class_def(
        &mut self,
        stmt_id: NodeId,
        name: &Expr,
        args: &[Argument],
        vararg: Option<&Expr>,
        kwarg: Option<&Expr>,
        body: &[Stmt],
        decorators: &[Expr],
    ) -> Result<(), Cancelled> {
        let ident = name.as_name().cloned().unwrap_or_default();
        let cid = self.class_for(stmt_id, &ident);

        self.evaluate_all(decorators)?;

        let mut bases = Vec::new();
        for arg in args {
            if let Some(arg_name) = &arg.name {
                // keyword argument such as metaclass=...
                let value = self.evaluate(&arg.value)?;
                self.emit(arg_name.id, value.as_ref());
                continue;
            }
            if let Some(base) = self.evaluate(&arg.value)? {
                for d in disjuncts(&base) {
                    if let Value::Class(base_class) = d {
                        let subs = &mut self.asm.values.class_mut(base_class).subclasses;
                        if !subs.contains(&cid) {
                            subs.push(cid);
                        }
                    }
                }
                bases.push(base);
            }
        }
        self.evaluate_opt(vararg)?;
        self.evaluate_opt(kwarg)?;
        self.asm.values.class_mut(cid).bases = bases;

        // the class body is executed at definition time; it reads the
        // enclosing scope, but scopes nested inside it skip the class table
        let members = self.asm.values.class(cid).members;
        let frame = Frame {
            scope: members,
            inherited: self.frame.inherited,
            class: Some(cid),
            function: None,
        };
        self.in_frame(frame, |p| p.propagate_stmts(body))?;

        let value = Value::Class(cid);
        self.assign_name(&ident, Some(value.clone()));
        self.emit(name.id, Some(&value));
        Ok(())
    }

    fn class_for(&mut self, stmt_id: NodeId, name: &str) -> ClassId {
        if let Some(&cid) = self.asm.classes_by_stmt.get(&stmt_id) {
            return cid;
        }
        let scope_name = self.asm.scopes.child_name(self.frame.scope, name);
        let members = self
            .asm
            .scopes
            .create_scope(scope_name, Some(self.frame.inherited));
        let cid = self.asm.values.add_class(ClassInfo {
            name: name.into(),
            members,
            bases: Vec::new(),
            subclasses: Vec::new(),
        });

        let scopes = &mut self.asm.scopes;
        scopes.put(members, "__name__", Some(Value::Str(name.into())));
        scopes.put(members, "__doc__", Some(Value::StrInstance));
        scopes.put(members, "__module__", Some(Value::Module(self.asm.module_scope)));
        scopes.put(members, "__class__", Some(Value::Class(cid)));

        self.asm.classes_by_stmt.insert(stmt_id, cid);
        cid
    }

    // ==================================================================
    // Assignment
    // ==================================================================

    fn assign_expr(&mut self, expr: &Expr, value: Option<Value>) -> Result<(), Cancelled> {
        self.evaluate(expr)?;
        match &expr.kind {
            ExprKind::Name { ident, .. } => {
                self.assign_name(&ident.clone(), value.clone());
            }
            ExprKind::Attribute {
                value: base,
                attribute,
                ..
            } => {
                let base_value = self.evaluate(base)?;
                if let Some(base_value) = base_value {
                    self.assign_attr(&base_value, &attribute.clone(), value.clone());
                }
            }
            ExprKind::Index {
                value: base,
                subscripts,
                ..
            } => {
                let index = self.evaluate_subscripts(subscripts)?;
                self.assign_index(base, index, value.clone())?;
            }
            ExprKind::Tuple { elements, .. } | ExprKind::List { elements, .. } => {
                self.assign_destructure(&elements.clone(), value.clone())?;
            }
            _ => {}
        }
        // record the assigned value as the expression's final resolution
        self.emit(expr.id, value.as_ref());
        Ok(())
    }

    fn assign_exprs(&mut self, exprs: &[Expr], value: Option<Value>) -> Result<(), Cancelled> {
        match exprs {
            [] => Ok(()),
            [single] => self.assign_expr(single, value),
            _ => self.assign_destructure(exprs, value),
        }
    }

    fn assign_destructure(&mut self, exprs: &[Expr], value: Option<Value>) -> Result<(), Cancelled> {
        match &value {
            // dicts destructure to their keys
            Some(Value::Dict { key, .. }) => {
                let key = key.as_deref().cloned();
                for expr in exprs {
                    self.assign_expr(expr, key.clone())?;
                }
            }
            Some(Value::Tuple(elements)) => {
                for (i, expr) in exprs.iter().enumerate() {
                    let elem = elements.get(i).cloned().flatten();
                    self.assign_expr(expr, elem)?;
                }
            }
            Some(other) => {
                let elem = self.ctx().element_of(other);
                for expr in exprs {
                    self.assign_expr(expr, elem.clone())?;
                }
            }
            // still visit every target so `self.foo, x = unknown` records
            // the left-hand components
            None => {
                for expr in exprs {
                    self.assign_expr(expr, None)?;
                }
            }
        }
        Ok(())
    }

    fn assign_name(&mut self, name: &str, value: Option<Value>) {
        let sym = self.asm.scopes.local_or_create(self.frame.scope, name);
        self.produce(sym, value);
    }

    fn assign_attr(&mut self, base: &Value, attr: &str, value: Option<Value>) {
        match base {
            Value::Instance(class) | Value::Class(class) => {
                let members = self.asm.values.class(*class).members;
                let sym = self.asm.scopes.local_or_create(members, attr);
                self.produce(sym, value);
            }
            Value::Module(scope) => {
                let scope = *scope;
                let sym = self.asm.scopes.local_or_create(scope, attr);
                self.produce(sym, value);
            }
            Value::Union(members) => {
                for member in members.iter() {
                    self.assign_attr(&member.clone(), attr, value.clone());
                }
            }
            _ => {
                if self.trace {
                    tracing::trace!(attr, "cannot assign attribute of immutable value");
                }
            }
        }
    }

    /// `base[index] = value` re-assigns the base to a collection that could
    /// hold the new entry.
    fn assign_index(
        &mut self,
        base: &Expr,
        index: Option<Value>,
        value: Option<Value>,
    ) -> Result<(), Cancelled> {
        let base_value = self.evaluate(base)?;
        let mut updates: Vec<Option<Value>> = Vec::new();
        match base_value {
            Some(Value::List(elem)) => {
                updates.push(Some(Value::list(unite2(elem.map(|b| *b), value))));
            }
            Some(Value::Dict { key, value: old }) => {
                let new_key = unite2(key.map(|b| *b), index.map(widen_constants));
                let new_value = unite2(old.map(|b| *b), value.map(widen_constants));
                updates.push(Some(Value::dict(new_key, new_value)));
            }
            _ => match index {
                // unknown index: could be building a list or a dict
                None => {
                    updates.push(Some(Value::list(value.clone())));
                    updates.push(Some(Value::dict(None, value)));
                }
                Some(index) => {
                    for key in disjuncts(&index) {
                        match key {
                            Value::Int(_) | Value::IntInstance => {
                                updates.push(Some(Value::list(value.clone())));
                            }
                            other => {
                                // widen to match how dict displays evaluate
                                updates.push(Some(Value::dict(
                                    Some(widen_constants(other)),
                                    value.clone().map(widen_constants),
                                )));
                            }
                        }
                    }
                }
            },
        }
        self.assign_expr(base, unite(updates))
    }

    fn can_return(&mut self, value: Option<Value>) {
        if let Some(fid) = self.frame.function {
            let return_symbol = self.asm.values.function(fid).return_symbol;
            self.produce(return_symbol, value);
        }
    }

    // ==================================================================
    // Expressions
    // ==================================================================

    fn evaluate_all(&mut self, exprs: &[Expr]) -> Result<(), Cancelled> {
        for expr in exprs {
            self.evaluate(expr)?;
        }
        Ok(())
    }

    fn evaluate_opt(&mut self, expr: Option<&Expr>) -> Result<Option<Value>, Cancelled> {
        match expr {
            Some(expr) => self.evaluate(expr),
            None => Ok(None),
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Option<Value>, Cancelled> {
        self.cancel.check()?;
        let value = self.evaluate_impl(expr)?;
        self.emit(expr.id, value.as_ref());
        Ok(value)
    }

    fn evaluate_impl(&mut self, expr: &Expr) -> Result<Option<Value>, Cancelled> {
        match &expr.kind {
            ExprKind::Num { literal, number } => Ok(evaluate_number(literal, *number)),
            ExprKind::Str { literal } => Ok(Some(Value::Str(literal.clone()))),
            ExprKind::Repr { value } => {
                self.evaluate(value)?;
                Ok(Some(Value::StrInstance))
            }
            ExprKind::Name { ident, .. } => Ok(self.evaluate_name(ident)),
            ExprKind::Attribute {
                value,
                attribute,
                usage,
                ..
            } => {
                let base = self.evaluate(value)?;
                let Some(base) = base else { return Ok(None) };
                let found = self.ctx().attr(&base, attribute);
                if found.is_none() && *usage == Usage::Evaluate {
                    return Ok(None);
                }
                Ok(found)
            }
            ExprKind::Index {
                value, subscripts, ..
            } => {
                let index = self.evaluate_subscripts(subscripts)?;
                let base = self.evaluate(value)?;
                Ok(base.and_then(|b| self.ctx().index_of(&b, index.as_ref())))
            }
            ExprKind::Call {
                func,
                args,
                vararg,
                kwarg,
            } => self.evaluate_call(func, args, vararg.as_deref(), kwarg.as_deref()),
            ExprKind::Tuple { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Some(Value::Tuple(values)))
            }
            ExprKind::List { elements, .. } => {
                let mut values = Vec::new();
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Some(Value::list(unite(values))))
            }
            ExprKind::Set { elements } => {
                let mut values = Vec::new();
                for element in elements {
                    values.push(self.evaluate(element)?.map(widen_constants));
                }
                Ok(Some(Value::set(unite(values))))
            }
            ExprKind::Dict { items } => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for item in items {
                    keys.push(self.evaluate(&item.key)?.map(widen_constants));
                    values.push(self.evaluate(&item.value)?.map(widen_constants));
                }
                Ok(Some(Value::dict(unite(keys), unite(values))))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                Ok(evaluate_unary(*op, value))
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(evaluate_binary(*op, left, right))
            }
            ExprKind::IfElse { body, test, orelse } => {
                self.evaluate(test)?;
                let body = self.evaluate(body)?;
                let orelse = self.evaluate(orelse)?;
                Ok(unite2(body, orelse))
            }
            ExprKind::Lambda { params, body } => self.evaluate_lambda(expr.id, params, body),
            ExprKind::Yield { value } => {
                let inner = self.evaluate_opt(value.as_deref())?;
                if let Some(inner) = inner {
                    self.can_return(Some(Value::generator(Some(inner))));
                }
                Ok(None)
            }
            ExprKind::Await { value } => self.evaluate(value),
            ExprKind::ListComp {
                element,
                generators,
            } => {
                let (_, elem) =
                    self.evaluate_comprehension(expr.id, generators, None, Some(element))?;
                Ok(Some(Value::list(elem)))
            }
            ExprKind::SetComp {
                element,
                generators,
            } => {
                let (_, elem) =
                    self.evaluate_comprehension(expr.id, generators, None, Some(element))?;
                Ok(Some(Value::set(elem)))
            }
            ExprKind::Generator {
                element,
                generators,
            } => {
                let (_, elem) =
                    self.evaluate_comprehension(expr.id, generators, None, Some(element))?;
                Ok(Some(Value::generator(elem)))
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                let (k, v) =
                    self.evaluate_comprehension(expr.id, generators, Some(key), Some(value))?;
                Ok(Some(Value::dict(k, v)))
            }
            ExprKind::Bad { approximations } => {
                self.evaluate_all(approximations)?;
                Ok(None)
            }
        }
    }

    fn evaluate_name(&self, ident: &str) -> Option<Value> {
        match ident {
            "None" => return Some(Value::NoneInstance),
            "True" => return Some(Value::Bool(true)),
            "False" => return Some(Value::Bool(false)),
            _ => {}
        }
        if let Some(sym) = self.asm.scopes.find(self.frame.scope, ident) {
            return self.asm.scopes.symbol(sym).value.clone();
        }
        // unbound names fall back to builtins
        let builtins = self.asm.builtins?;
        self.graph.member(builtins, ident).map(Value::External)
    }

    fn evaluate_call(
        &mut self,
        func: &Expr,
        args: &[Argument],
        vararg: Option<&Expr>,
        kwarg: Option<&Expr>,
    ) -> Result<Option<Value>, Cancelled> {
        let callee = self.evaluate(func)?;

        let mut positional: Vec<Option<Value>> = Vec::new();
        let mut keywords: Vec<(EcoString, Option<Value>)> = Vec::new();
        for arg in args {
            let value = self.evaluate(&arg.value)?;
            match &arg.name {
                None => positional.push(value),
                Some(name) => {
                    if let Some(ident) = name.as_name() {
                        keywords.push((ident.clone(), value.clone()));
                    }
                    self.emit(name.id, value.as_ref());
                }
            }
        }
        let star = self.evaluate_opt(vararg)?;
        self.evaluate_opt(kwarg)?;
        let passed_star = vararg.is_some();

        let Some(callee) = callee else { return Ok(None) };

        let mut out: Vec<Option<Value>> = Vec::new();
        for target in disjuncts(&callee) {
            match &target {
                Value::External(node) if Some(*node) == self.asm.super_builtin => {
                    // super() inside a method proxies the declaring class's
                    // bases in declaration order
                    if let Some(class) = self.frame.function.and_then(|f| {
                        self.asm.values.function(f).class
                    }) {
                        let bases = self.asm.values.class(class).bases.clone();
                        out.push(Some(Value::Super(std::sync::Arc::new(bases))));
                    }
                }
                Value::Class(class) => {
                    out.push(Some(Value::Instance(*class)));
                    let init = self.ctx().attr(&Value::Class(*class), "__init__");
                    if let Some(init) = init {
                        for d in disjuncts(&init) {
                            if let Value::Function(fid) = d {
                                self.propagate_args(
                                    fid,
                                    &positional,
                                    &keywords,
                                    passed_star,
                                    star.clone(),
                                );
                            }
                        }
                    }
                }
                Value::Function(fid) => {
                    out.push(self.ctx().call_result(&target));
                    self.propagate_args(*fid, &positional, &keywords, passed_star, star.clone());
                }
                other => out.push(self.ctx().call_result(other)),
            }
        }
        Ok(unite(out))
    }

    /// Feeds call-site argument values into a source function's parameter
    /// symbols, so those values are visible when its body is propagated.
    fn propagate_args(
        &mut self,
        fid: FunctionId,
        positional: &[Option<Value>],
        keywords: &[(EcoString, Option<Value>)],
        passed_star: bool,
        star: Option<Value>,
    ) {
        let info = self.asm.values.function(fid);
        let offset = usize::from(info.has_receiver || info.has_class_receiver);
        let params = info.params.clone();
        let vararg = info.vararg.clone();
        let kwarg = info.kwarg.clone();

        for (i, value) in positional.iter().enumerate() {
            if value.is_none() {
                continue;
            }
            if i + offset < params.len() {
                self.produce(params[i + offset].symbol, value.clone());
            }
        }

        if let Some(vararg) = &vararg {
            if passed_star {
                self.produce(vararg.symbol, star);
            }
            let named = params.len().saturating_sub(offset);
            if named < positional.len() {
                let overflow = unite(positional[named..].iter().cloned());
                self.produce(vararg.symbol, Some(Value::list(overflow)));
            }
        }

        'keywords: for (key, value) in keywords {
            for param in &params {
                if param.name == *key {
                    self.produce(param.symbol, value.clone());
                    continue 'keywords;
                }
            }
            if let Some(kwarg) = &kwarg {
                self.produce(
                    kwarg.symbol,
                    Some(Value::dict(
                        Some(Value::StrInstance),
                        value.clone().map(widen_constants),
                    )),
                );
            }
        }
    }

    fn evaluate_lambda(
        &mut self,
        expr_id: NodeId,
        params: &ParameterList,
        body: &Expr,
    ) -> Result<Option<Value>, Cancelled> {
        let fid = match self.asm.functions_by_node.get(&expr_id) {
            Some(&fid) => fid,
            None => {
                let name = format!("[lambda{}]", self.asm.lambda_counter);
                self.asm.lambda_counter += 1;
                self.function_for(expr_id, &name, params, &[])
            }
        };

        // defaults are evaluated in the parent scope
        for (i, param) in params.params.iter().enumerate() {
            if let Some(default) = &param.default {
                let t = self.evaluate(default)?;
                let symbol = self.asm.values.function(fid).params[i].symbol;
                self.produce(symbol, t);
            }
        }

        let locals = self.asm.values.function(fid).locals;
        let frame = Frame {
            scope: locals,
            inherited: locals,
            class: None,
            function: Some(fid),
        };
        self.in_frame(frame, |p| {
            p.emit_parameter_names(fid, params)?;
            let t = p.evaluate(body)?;
            if t.is_some() {
                p.can_return(t);
            }
            Ok(())
        })?;
        Ok(Some(Value::Function(fid)))
    }

    /// The generator clauses of a comprehension run in their own scope;
    /// python 3 does not leak the loop variables to the parent.
    fn evaluate_comprehension(
        &mut self,
        expr_id: NodeId,
        generators: &[Comprehension],
        key: Option<&Expr>,
        value: Option<&Expr>,
    ) -> Result<(Option<Value>, Option<Value>), Cancelled> {
        let scope = match self.asm.comprehension_scopes.get(&expr_id) {
            Some(&scope) => scope,
            None => {
                let tail = format!("[comprehension{}]", self.asm.comprehension_scopes.len());
                let name = self.asm.scopes.child_name(self.frame.scope, &tail);
                let scope = self
                    .asm
                    .scopes
                    .create_scope(name, Some(self.frame.inherited));
                self.asm.comprehension_scopes.insert(expr_id, scope);
                scope
            }
        };

        let frame = Frame {
            scope,
            inherited: scope,
            class: None,
            function: self.frame.function,
        };
        self.in_frame(frame, |p| {
            for generator in generators {
                let sequence = p.evaluate(&generator.iterable)?;
                let elem = sequence
                    .as_ref()
                    .and_then(|s| p.ctx().element_of(s))
                    .map(widen_constants);
                p.assign_exprs(&generator.targets, elem)?;
                for condition in &generator.conditions {
                    p.evaluate(condition)?;
                }
            }
            let key = p.evaluate_opt(key)?;
            let value = p.evaluate_opt(value)?;
            Ok((key, value))
        })
    }

    fn evaluate_subscripts(
        &mut self,
        subscripts: &[crate::ast::Subscript],
    ) -> Result<Option<Value>, Cancelled> {
        let mut values: Vec<Option<Value>> = Vec::new();
        for subscript in subscripts {
            match &subscript.kind {
                SubscriptKind::Index(expr) => values.push(self.evaluate(expr)?),
                SubscriptKind::Slice { lower, upper, step } => {
                    self.evaluate_opt(lower.as_ref())?;
                    self.evaluate_opt(upper.as_ref())?;
                    self.evaluate_opt(step.as_ref())?;
                    values.push(None);
                }
                SubscriptKind::Ellipsis => values.push(None),
            }
        }
        Ok(match values.len() {
            0 => None,
            1 => values.pop().flatten(),
            _ => Some(Value::Tuple(values)),
        })
    }
}

/// The receiver binding a decorator list selects: `Some("classmethod")`,
/// `Some("staticmethod")`, or `None` for an ordinary method.
fn function_binding(decorators: &[Expr]) -> Option<&'static str> {
    for decorator in decorators {
        let name = match &decorator.kind {
            ExprKind::Name { ident, .. } => Some(ident.as_str()),
            ExprKind::Call { func, .. } => func.as_name().map(EcoString::as_str),
            _ => None,
        };
        match name {
            Some("classmethod") => return Some("classmethod"),
            Some("staticmethod") => return Some("staticmethod"),
            _ => {}
        }
    }
    None
}

fn evaluate_number(literal: &str, number: NumberKind) -> Option<Value> {
    match number {
        NumberKind::Int => {
            // only small numbers are tracked as constants
            match literal.parse::<i64>() {
                Ok(n) if (0..=MAX_TRACKED_INT).contains(&n) => Some(Value::Int(n)),
                _ => Some(Value::IntInstance),
            }
        }
        NumberKind::Long => Some(Value::IntInstance),
        NumberKind::Float => Some(Value::FloatInstance),
        NumberKind::Imag => Some(Value::ComplexInstance),
    }
}

fn evaluate_unary(op: UnaryOp, value: Option<Value>) -> Option<Value> {
    if let Some(value) = value {
        if let (UnaryOp::Not, Value::Bool(b)) = (op, &value) {
            return Some(Value::Bool(!b));
        }
        return Some(widen_constants(value));
    }
    // guess from the operator when the operand is unresolved
    match op {
        UnaryOp::Pos | UnaryOp::Neg => {
            unite2(Some(Value::IntInstance), Some(Value::FloatInstance))
        }
        UnaryOp::Invert => unite2(Some(Value::IntInstance), Some(Value::BoolInstance)),
        UnaryOp::Not => None,
    }
}

fn evaluate_binary(op: BinaryOp, left: Option<Value>, right: Option<Value>) -> Option<Value> {
    // operators whose result type barely depends on the operands
    if op.is_comparison() {
        return Some(Value::BoolInstance);
    }
    match op {
        BinaryOp::Div => return Some(Value::FloatInstance),
        // assume string formatting
        BinaryOp::Mod => return Some(Value::StrInstance),
        BinaryOp::Add => {
            if let (Some(Value::Str(l)), Some(Value::Str(r))) = (&left, &right) {
                let mut joined = l.clone();
                joined.push_str(r);
                return Some(Value::Str(joined));
            }
        }
        _ => {}
    }

    let widened = unite2(
        left.map(widen_constants),
        right.map(widen_constants),
    );
    if widened.is_some() {
        return widened;
    }

    // both operands unresolved: guess from the operator
    match op {
        BinaryOp::Sub | BinaryOp::TrueDiv => {
            unite2(Some(Value::IntInstance), Some(Value::FloatInstance))
        }
        BinaryOp::And | BinaryOp::Or => Some(Value::BoolInstance),
        BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::LShift
        | BinaryOp::RShift => Some(Value::IntInstance),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_detection() {
        let name = |ident: &str| Expr::new(
            0,
            crate::ast::Span::new(0, ident.len() as u32),
            ExprKind::Name {
                ident: ident.into(),
                usage: Usage::Evaluate,
            },
        );
        assert_eq!(function_binding(&[name("classmethod")]), Some("classmethod"));
        assert_eq!(function_binding(&[name("staticmethod")]), Some("staticmethod"));
        assert_eq!(function_binding(&[name("property")]), None);
        assert_eq!(function_binding(&[]), None);
    }

    #[test]
    fn small_ints_stay_constant() {
        assert_eq!(evaluate_number("42", NumberKind::Int), Some(Value::Int(42)));
        assert_eq!(
            evaluate_number("10000", NumberKind::Int),
            Some(Value::IntInstance)
        );
        assert_eq!(
            evaluate_number("0x1f", NumberKind::Int),
            Some(Value::IntInstance)
        );
        assert_eq!(
            evaluate_number("1.5", NumberKind::Float),
            Some(Value::FloatInstance)
        );
    }

    #[test]
    fn binary_result_types() {
        assert_eq!(
            evaluate_binary(BinaryOp::Eq, None, None),
            Some(Value::BoolInstance)
        );
        assert_eq!(
            evaluate_binary(BinaryOp::Div, Some(Value::Int(1)), Some(Value::Int(2))),
            Some(Value::FloatInstance)
        );
        assert_eq!(
            evaluate_binary(
                BinaryOp::Add,
                Some(Value::Str("a".into())),
                Some(Value::Str("b".into()))
            ),
            Some(Value::Str("ab".into()))
        );
        assert_eq!(
            evaluate_binary(BinaryOp::Add, Some(Value::Int(1)), Some(Value::Int(2))),
            Some(Value::IntInstance)
        );
        assert_eq!(
            evaluate_binary(BinaryOp::BitAnd, None, None),
            Some(Value::IntInstance)
        );
    }
}
