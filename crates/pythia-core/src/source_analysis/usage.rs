// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Usage marking.
//!
//! After parsing, every name-like expression (name, attribute, index, tuple,
//! list) is tagged with how it is used: evaluated, assigned, deleted, or
//! imported. Resolution depends on this tag to tell definitions apart from
//! references. Marking is total: no name-like node is left [`Usage::Undecided`],
//! including nodes inside Bad placeholders.

use crate::ast::{
    ArgsParameter, Argument, Comprehension, Expr, ExprKind, Module, Parameter, ParameterList,
    Stmt, StmtKind, Subscript, SubscriptKind, Usage,
};
use crate::cancel::{CancelToken, Cancelled};

/// Tags every name-like expression in the module with its usage.
pub fn mark_usages(module: &mut Module, cancel: &CancelToken) -> Result<(), Cancelled> {
    for stmt in &mut module.body {
        mark_stmt(stmt, cancel)?;
    }
    Ok(())
}

/// Tags every name-like expression under a single statement.
pub fn mark_stmt_usages(stmt: &mut Stmt, cancel: &CancelToken) -> Result<(), Cancelled> {
    mark_stmt(stmt, cancel)
}

fn mark_stmts(stmts: &mut [Stmt], cancel: &CancelToken) -> Result<(), Cancelled> {
    for stmt in stmts {
        mark_stmt(stmt, cancel)?;
    }
    Ok(())
}

fn mark_opt(expr: &mut Option<Expr>, usage: Usage, cancel: &CancelToken) -> Result<(), Cancelled> {
    if let Some(expr) = expr {
        mark_expr(expr, usage, cancel)?;
    }
    Ok(())
}

fn mark_all(exprs: &mut [Expr], usage: Usage, cancel: &CancelToken) -> Result<(), Cancelled> {
    for expr in exprs {
        mark_expr(expr, usage, cancel)?;
    }
    Ok(())
}

fn mark_stmt(stmt: &mut Stmt, cancel: &CancelToken) -> Result<(), Cancelled> {
    cancel.check()?;
    match &mut stmt.kind {
        StmtKind::Expr { value } => mark_expr(value, Usage::Evaluate, cancel),

        StmtKind::Assign {
            targets,
            annotation,
            value,
        } => {
            mark_all(targets, Usage::Assign, cancel)?;
            mark_opt(annotation, Usage::Evaluate, cancel)?;
            mark_opt(value, Usage::Evaluate, cancel)
        }

        StmtKind::AugAssign { target, value, .. } => {
            mark_expr(target, Usage::Assign, cancel)?;
            mark_expr(value, Usage::Evaluate, cancel)
        }

        StmtKind::Pass | StmtKind::Break | StmtKind::Continue => Ok(()),

        StmtKind::Del { targets } => mark_all(targets, Usage::Delete, cancel),

        StmtKind::Print { dest, values } => {
            mark_all(values, Usage::Evaluate, cancel)?;
            mark_opt(dest, Usage::Evaluate, cancel)
        }

        StmtKind::Exec {
            body,
            globals,
            locals,
        } => {
            mark_expr(body, Usage::Evaluate, cancel)?;
            mark_opt(globals, Usage::Evaluate, cancel)?;
            mark_opt(locals, Usage::Evaluate, cancel)
        }

        StmtKind::Return { value } => mark_opt(value, Usage::Evaluate, cancel),

        StmtKind::Raise {
            exc,
            instance,
            traceback,
        } => {
            mark_opt(exc, Usage::Evaluate, cancel)?;
            mark_opt(instance, Usage::Evaluate, cancel)?;
            mark_opt(traceback, Usage::Evaluate, cancel)
        }

        // global/nonlocal names are (re)bindings in this scope
        StmtKind::Global { names } | StmtKind::NonLocal { names } => {
            mark_all(names, Usage::Assign, cancel)
        }

        StmtKind::Assert { test, message } => {
            mark_expr(test, Usage::Evaluate, cancel)?;
            mark_opt(message, Usage::Evaluate, cancel)
        }

        StmtKind::Import { names } => {
            for name in names {
                mark_all(&mut name.external.names, Usage::Import, cancel)?;
                mark_opt(&mut name.internal, Usage::Assign, cancel)?;
            }
            Ok(())
        }

        StmtKind::ImportFrom { package, names, .. } => {
            if let Some(package) = package {
                mark_all(&mut package.names, Usage::Import, cancel)?;
            }
            for name in names {
                mark_expr(&mut name.external, Usage::Import, cancel)?;
                mark_opt(&mut name.internal, Usage::Assign, cancel)?;
            }
            Ok(())
        }

        StmtKind::If { branches, orelse } => {
            for branch in branches {
                mark_expr(&mut branch.test, Usage::Evaluate, cancel)?;
                mark_stmts(&mut branch.body, cancel)?;
            }
            mark_stmts(orelse, cancel)
        }

        StmtKind::While { test, body, orelse } => {
            mark_expr(test, Usage::Evaluate, cancel)?;
            mark_stmts(body, cancel)?;
            mark_stmts(orelse, cancel)
        }

        StmtKind::For {
            targets,
            iterable,
            body,
            orelse,
            ..
        } => {
            mark_all(targets, Usage::Assign, cancel)?;
            mark_expr(iterable, Usage::Evaluate, cancel)?;
            mark_stmts(body, cancel)?;
            mark_stmts(orelse, cancel)
        }

        StmtKind::Try {
            body,
            handlers,
            orelse,
            finally,
        } => {
            mark_stmts(body, cancel)?;
            for handler in handlers {
                mark_opt(&mut handler.exception, Usage::Evaluate, cancel)?;
                mark_opt(&mut handler.target, Usage::Assign, cancel)?;
                mark_stmts(&mut handler.body, cancel)?;
            }
            mark_stmts(orelse, cancel)?;
            mark_stmts(finally, cancel)
        }

        StmtKind::With { items, body, .. } => {
            for item in items {
                mark_opt(&mut item.target, Usage::Assign, cancel)?;
                mark_expr(&mut item.value, Usage::Evaluate, cancel)?;
            }
            mark_stmts(body, cancel)
        }

        StmtKind::FunctionDef {
            name,
            params,
            return_annotation,
            body,
            decorators,
            ..
        } => {
            mark_all(decorators, Usage::Evaluate, cancel)?;
            mark_expr(name, Usage::Assign, cancel)?;
            mark_parameter_list(params, cancel)?;
            mark_opt(return_annotation, Usage::Evaluate, cancel)?;
            mark_stmts(body, cancel)
        }

        StmtKind::ClassDef {
            name,
            args,
            vararg,
            kwarg,
            body,
            decorators,
        } => {
            mark_all(decorators, Usage::Evaluate, cancel)?;
            mark_expr(name, Usage::Assign, cancel)?;
            for arg in args {
                mark_argument(arg, cancel)?;
            }
            mark_opt(vararg, Usage::Evaluate, cancel)?;
            mark_opt(kwarg, Usage::Evaluate, cancel)?;
            mark_stmts(body, cancel)
        }

        StmtKind::Bad { approximations } => mark_stmts(approximations, cancel),
    }
}

fn mark_argument(arg: &mut Argument, cancel: &CancelToken) -> Result<(), Cancelled> {
    mark_opt(&mut arg.name, Usage::Assign, cancel)?;
    mark_expr(&mut arg.value, Usage::Evaluate, cancel)
}

fn mark_parameter(param: &mut Parameter, cancel: &CancelToken) -> Result<(), Cancelled> {
    mark_expr(&mut param.name, Usage::Assign, cancel)?;
    mark_opt(&mut param.annotation, Usage::Evaluate, cancel)?;
    mark_opt(&mut param.default, Usage::Evaluate, cancel)
}

fn mark_args_parameter(param: &mut ArgsParameter, cancel: &CancelToken) -> Result<(), Cancelled> {
    mark_opt(&mut param.name, Usage::Assign, cancel)?;
    mark_opt(&mut param.annotation, Usage::Evaluate, cancel)
}

fn mark_parameter_list(params: &mut ParameterList, cancel: &CancelToken) -> Result<(), Cancelled> {
    for param in &mut params.params {
        mark_parameter(param, cancel)?;
    }
    if let Some(vararg) = &mut params.vararg {
        mark_args_parameter(vararg, cancel)?;
    }
    if let Some(kwarg) = &mut params.kwarg {
        mark_args_parameter(kwarg, cancel)?;
    }
    Ok(())
}

fn mark_comprehensions(
    generators: &mut [Comprehension],
    usage: Usage,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    for r#gen in generators {
        mark_all(&mut r#gen.targets, usage, cancel)?;
        mark_expr(&mut r#gen.iterable, usage, cancel)?;
        mark_all(&mut r#gen.conditions, usage, cancel)?;
    }
    Ok(())
}

fn mark_subscript(
    subscript: &mut Subscript,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    match &mut subscript.kind {
        SubscriptKind::Index(index) => mark_expr(index, Usage::Evaluate, cancel),
        SubscriptKind::Slice { lower, upper, step } => {
            mark_opt(lower, Usage::Evaluate, cancel)?;
            mark_opt(upper, Usage::Evaluate, cancel)?;
            mark_opt(step, Usage::Evaluate, cancel)
        }
        SubscriptKind::Ellipsis => Ok(()),
    }
}

fn mark_expr(expr: &mut Expr, usage: Usage, cancel: &CancelToken) -> Result<(), Cancelled> {
    cancel.check()?;
    debug_assert!(
        usage != Usage::Undecided,
        "no usage to assign at {:?}",
        expr.span
    );
    match &mut expr.kind {
        ExprKind::Name { usage: slot, .. } => {
            *slot = usage;
            Ok(())
        }

        // only the outermost link of an attribute chain keeps the usage;
        // everything beneath it is evaluated
        ExprKind::Attribute {
            value, usage: slot, ..
        } => {
            *slot = usage;
            mark_expr(value, Usage::Evaluate, cancel)
        }

        ExprKind::Index {
            value,
            subscripts,
            usage: slot,
        } => {
            *slot = usage;
            mark_expr(value, Usage::Evaluate, cancel)?;
            for subscript in subscripts {
                mark_subscript(subscript, cancel)?;
            }
            Ok(())
        }

        // tuple and list displays distribute their usage over the elements,
        // so `a, b = ...` assigns both
        ExprKind::Tuple {
            elements,
            usage: slot,
        }
        | ExprKind::List {
            elements,
            usage: slot,
        } => {
            *slot = usage;
            mark_all(elements, usage, cancel)
        }

        ExprKind::Set { elements } => mark_all(elements, usage, cancel),

        ExprKind::Dict { items } => {
            for item in items {
                mark_expr(&mut item.key, usage, cancel)?;
                mark_expr(&mut item.value, usage, cancel)?;
            }
            Ok(())
        }

        ExprKind::Num { .. } | ExprKind::Str { .. } => Ok(()),

        ExprKind::Repr { value } | ExprKind::Await { value } => mark_expr(value, usage, cancel),

        ExprKind::Call {
            func,
            args,
            vararg,
            kwarg,
        } => {
            mark_expr(func, usage, cancel)?;
            for arg in args {
                mark_argument(arg, cancel)?;
            }
            if let Some(vararg) = vararg {
                mark_expr(vararg, usage, cancel)?;
            }
            if let Some(kwarg) = kwarg {
                mark_expr(kwarg, usage, cancel)?;
            }
            Ok(())
        }

        ExprKind::Unary { operand, .. } => mark_expr(operand, usage, cancel),

        ExprKind::Binary { left, right, .. } => {
            mark_expr(left, usage, cancel)?;
            mark_expr(right, usage, cancel)
        }

        ExprKind::Lambda { params, body } => {
            mark_parameter_list(params, cancel)?;
            mark_expr(body, usage, cancel)
        }

        ExprKind::IfElse { body, test, orelse } => {
            mark_expr(body, usage, cancel)?;
            mark_expr(test, usage, cancel)?;
            mark_expr(orelse, usage, cancel)
        }

        ExprKind::Yield { value } => {
            if let Some(value) = value {
                mark_expr(value, usage, cancel)?;
            }
            Ok(())
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
            mark_expr(element, usage, cancel)?;
            mark_comprehensions(generators, usage, cancel)
        }

        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            mark_expr(key, usage, cancel)?;
            mark_expr(value, usage, cancel)?;
            mark_comprehensions(generators, usage, cancel)
        }

        ExprKind::Bad { approximations } => mark_all(approximations, usage, cancel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{each_child, NodeRef};
    use crate::source_analysis::lexer::{lex, LexOptions};
    use crate::source_analysis::parser::{parse_module_tokens, ErrorMode, ParseOptions};

    fn marked_module(source: &str) -> Module {
        let (tokens, _) = lex(source, LexOptions::default());
        let options = ParseOptions {
            error_mode: ErrorMode::Recover,
            ..ParseOptions::default()
        };
        let (mut module, _) =
            parse_module_tokens(tokens, &options, &CancelToken::none()).unwrap();
        mark_usages(&mut module, &CancelToken::none()).unwrap();
        module
    }

    /// Collects (identifier, usage) for every name expression in the module.
    fn name_usages(module: &Module) -> Vec<(String, Usage)> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeRef<'_>> = module.body.iter().map(NodeRef::Stmt).collect();
        while let Some(node) = stack.pop() {
            if let NodeRef::Expr(expr) = node {
                if let ExprKind::Name { ident, usage } = &expr.kind {
                    out.push((ident.to_string(), *usage));
                }
            }
            each_child(node, &mut |child| stack.push(child));
        }
        out
    }

    fn usage_of(module: &Module, name: &str) -> Usage {
        name_usages(module)
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, u)| u)
            .unwrap_or_else(|| panic!("no name {name:?} in module"))
    }

    #[test]
    fn assignment_targets_and_value() {
        let module = marked_module("a, b = c\n");
        assert_eq!(usage_of(&module, "a"), Usage::Assign);
        assert_eq!(usage_of(&module, "b"), Usage::Assign);
        assert_eq!(usage_of(&module, "c"), Usage::Evaluate);
    }

    #[test]
    fn attribute_assignment_evaluates_its_base() {
        let module = marked_module("obj.field = x\n");
        // the Attribute node is assigned; the base name is evaluated
        let StmtKind::Assign { targets, .. } = &module.body[0].kind else {
            panic!("expected assign");
        };
        assert_eq!(targets[0].usage(), Some(Usage::Assign));
        assert_eq!(usage_of(&module, "obj"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "x"), Usage::Evaluate);
    }

    #[test]
    fn index_assignment_evaluates_base_and_subscript() {
        let module = marked_module("d[k] = v\n");
        assert_eq!(usage_of(&module, "d"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "k"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "v"), Usage::Evaluate);
    }

    #[test]
    fn del_marks_targets() {
        let module = marked_module("del a, b[0]\n");
        assert_eq!(usage_of(&module, "a"), Usage::Delete);
        // index deletion evaluates the container
        assert_eq!(usage_of(&module, "b"), Usage::Evaluate);
    }

    #[test]
    fn imports_mark_externals_and_aliases() {
        let module = marked_module("import os.path as p\nfrom pkg import q as r\n");
        assert_eq!(usage_of(&module, "os"), Usage::Import);
        assert_eq!(usage_of(&module, "path"), Usage::Import);
        assert_eq!(usage_of(&module, "p"), Usage::Assign);
        assert_eq!(usage_of(&module, "pkg"), Usage::Import);
        assert_eq!(usage_of(&module, "q"), Usage::Import);
        assert_eq!(usage_of(&module, "r"), Usage::Assign);
    }

    #[test]
    fn function_def_marks_name_and_parameters() {
        let module = marked_module("def f(a, b=dflt, *args, **kw):\n    return a\n");
        assert_eq!(usage_of(&module, "f"), Usage::Assign);
        assert_eq!(usage_of(&module, "a"), Usage::Assign);
        assert_eq!(usage_of(&module, "b"), Usage::Assign);
        assert_eq!(usage_of(&module, "dflt"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "args"), Usage::Assign);
        assert_eq!(usage_of(&module, "kw"), Usage::Assign);
    }

    #[test]
    fn class_def_marks_name_and_evaluates_bases() {
        let module = marked_module("@dec\nclass C(Base, metaclass=M):\n    pass\n");
        assert_eq!(usage_of(&module, "C"), Usage::Assign);
        assert_eq!(usage_of(&module, "Base"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "metaclass"), Usage::Assign);
        assert_eq!(usage_of(&module, "M"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "dec"), Usage::Evaluate);
    }

    #[test]
    fn for_targets_and_with_targets_assign() {
        let module = marked_module("for i in xs:\n    pass\nwith f() as fh:\n    pass\n");
        assert_eq!(usage_of(&module, "i"), Usage::Assign);
        assert_eq!(usage_of(&module, "xs"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "fh"), Usage::Assign);
    }

    #[test]
    fn except_target_assigns() {
        let module = marked_module("try:\n    pass\nexcept E as e:\n    pass\n");
        assert_eq!(usage_of(&module, "E"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "e"), Usage::Assign);
    }

    #[test]
    fn keyword_argument_name_assigns() {
        let module = marked_module("f(x, key=v)\n");
        assert_eq!(usage_of(&module, "key"), Usage::Assign);
        assert_eq!(usage_of(&module, "v"), Usage::Evaluate);
        assert_eq!(usage_of(&module, "x"), Usage::Evaluate);
    }

    #[test]
    fn no_name_is_left_undecided_even_after_recovery() {
        let sources = [
            "x = = 1\ny = 2\n",
            "def f(:\n",
            "a.b[c].d = [e for e in f if g]\nglobal h\nlambda k=1: k\n",
        ];
        for source in sources {
            let module = marked_module(source);
            for (name, usage) in name_usages(&module) {
                assert_ne!(
                    usage,
                    Usage::Undecided,
                    "name {name:?} left undecided in {source:?}"
                );
            }
        }
    }
}
