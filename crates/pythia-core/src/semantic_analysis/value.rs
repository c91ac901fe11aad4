// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The resolver's value model.
//!
//! A [`Value`] is the inferred runtime-type/identity abstraction attached to
//! an expression: an external graph reference, an in-source function, class,
//! or instance, a constant, a collection, or a union of alternatives.
//! Absence ("don't know") is `Option::None` throughout, never a variant, so
//! "no idea" and "definitely something" stay distinguishable.
//!
//! Source-defined classes and functions live in a [`Values`] store and are
//! referenced by index, mirroring how scope tables are arena-indexed; this
//! keeps `Value` cheap to clone and lets resolved trees share the store.

use std::sync::Arc;

use ecow::EcoString;

use super::graph::{GraphKind, GraphNode, SymbolGraph, TypeInducer};
use super::scope::{ScopeId, Scopes, SymbolId};

/// Unions wider than this collapse to absent; beyond this point the value
/// carries no usable information.
pub const MAX_UNION_CONSTITUENTS: usize = 25;

/// Small non-negative int literals are tracked as constants; anything wider
/// widens to the plain int instance.
pub const MAX_TRACKED_INT: i64 = 1000;

/// Index of a source-defined class in a [`Values`] store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

/// Index of a source-defined function or lambda in a [`Values`] store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(u32);

/// One formal parameter of a source-defined function.
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: EcoString,
    pub symbol: SymbolId,
    pub keyword_only: bool,
}

/// A class defined in the analyzed source.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: EcoString,
    /// The class body scope; member lookup is local-only, never chained.
    pub members: ScopeId,
    /// Base class values in declaration order.
    pub bases: Vec<Value>,
    /// Source subclasses discovered during propagation.
    pub subclasses: Vec<ClassId>,
}

/// A function or lambda defined in the analyzed source.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: EcoString,
    pub locals: ScopeId,
    /// Accumulates everything the function can return or yield.
    pub return_symbol: SymbolId,
    pub params: Vec<ParameterInfo>,
    pub vararg: Option<ParameterInfo>,
    pub kwarg: Option<ParameterInfo>,
    /// The class whose body declared this function, if any.
    pub class: Option<ClassId>,
    /// Ordinary method: first parameter receives an instance of `class`.
    pub has_receiver: bool,
    /// Classmethod: first parameter receives the class itself.
    pub has_class_receiver: bool,
}

/// Store of source-defined classes and functions for one resolve call.
#[derive(Debug, Default)]
pub struct Values {
    classes: Vec<ClassInfo>,
    functions: Vec<FunctionInfo>,
}

impl Values {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, info: ClassInfo) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(info);
        id
    }

    pub fn add_function(&mut self, info: FunctionInfo) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(info);
        id
    }

    #[must_use]
    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0 as usize]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassInfo {
        &mut self.classes[id.0 as usize]
    }

    #[must_use]
    pub fn function(&self, id: FunctionId) -> &FunctionInfo {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionInfo {
        &mut self.functions[id.0 as usize]
    }
}

/// An inferred value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A module, type, function, or object from the external graph.
    External(GraphNode),
    /// An instance of an external type, e.g. the result of `dict()`.
    ExternalInstance(GraphNode),
    /// The source module under analysis; the scope is its member table.
    Module(ScopeId),
    Class(ClassId),
    Function(FunctionId),
    /// An instance of a source-defined class.
    Instance(ClassId),
    /// The proxy returned by `super()`: member lookup walks the base list
    /// in declaration order.
    Super(Arc<Vec<Value>>),
    /// One of several alternatives, e.g. a conditionally bound name.
    /// Always flat: a union never contains another union.
    Union(Arc<Vec<Value>>),

    // constants
    Int(i64),
    Str(EcoString),
    Bool(bool),

    // bare instances of builtin scalar types
    IntInstance,
    FloatInstance,
    ComplexInstance,
    StrInstance,
    BoolInstance,
    NoneInstance,

    // collections, tracking element values where known
    List(Option<Box<Value>>),
    Tuple(Vec<Option<Value>>),
    Set(Option<Box<Value>>),
    Dict {
        key: Option<Box<Value>>,
        value: Option<Box<Value>>,
    },
    Generator(Option<Box<Value>>),
}

impl Value {
    /// Builds a list value from an optional element.
    #[must_use]
    pub fn list(element: Option<Value>) -> Self {
        Self::List(element.map(Box::new))
    }

    #[must_use]
    pub fn set(element: Option<Value>) -> Self {
        Self::Set(element.map(Box::new))
    }

    #[must_use]
    pub fn dict(key: Option<Value>, value: Option<Value>) -> Self {
        Self::Dict {
            key: key.map(Box::new),
            value: value.map(Box::new),
        }
    }

    #[must_use]
    pub fn generator(element: Option<Value>) -> Self {
        Self::Generator(element.map(Box::new))
    }
}

/// Returns the union constituents of `value`: the members for a union, the
/// value itself otherwise.
#[must_use]
pub fn disjuncts(value: &Value) -> Vec<Value> {
    match value {
        Value::Union(members) => members.as_ref().clone(),
        other => vec![other.clone()],
    }
}

/// Unites any number of optional values into one.
///
/// Absent inputs are skipped; nested unions are flattened; duplicates are
/// dropped. A union wider than [`MAX_UNION_CONSTITUENTS`] carries no usable
/// information and collapses to absent.
#[must_use]
pub fn unite(values: impl IntoIterator<Item = Option<Value>>) -> Option<Value> {
    let mut members: Vec<Value> = Vec::new();
    for value in values.into_iter().flatten() {
        for member in disjuncts(&value) {
            if !members.contains(&member) {
                members.push(member);
            }
            if members.len() > MAX_UNION_CONSTITUENTS {
                return None;
            }
        }
    }
    match members.len() {
        0 => None,
        1 => members.pop(),
        _ => Some(Value::Union(Arc::new(members))),
    }
}

/// Unites two optional values.
#[must_use]
pub fn unite2(a: Option<Value>, b: Option<Value>) -> Option<Value> {
    unite([a, b])
}

/// Widens constants to instances of their type: `3` becomes an int
/// instance, `"x"` a str instance. Applied where constant identity cannot
/// matter, such as set elements and dict keys.
#[must_use]
pub fn widen_constants(value: Value) -> Value {
    match value {
        Value::Int(_) => Value::IntInstance,
        Value::Str(_) => Value::StrInstance,
        Value::Bool(_) => Value::BoolInstance,
        Value::Union(members) => {
            let widened: Vec<Value> = members
                .iter()
                .map(|member| widen_constants(member.clone()))
                .collect();
            match unite(widened.into_iter().map(Some)) {
                Some(v) => v,
                None => Value::Union(Arc::new(Vec::new())),
            }
        }
        other => other,
    }
}

/// Read-only context for value operations: the arenas of the current
/// resolve call plus the external collaborators.
pub(crate) struct ValueCtx<'a> {
    pub scopes: &'a Scopes,
    pub values: &'a Values,
    pub graph: &'a dyn SymbolGraph,
    pub inducer: Option<&'a dyn TypeInducer>,
}

impl ValueCtx<'_> {
    /// Looks up `name` as a member of `value`.
    ///
    /// Union bases look the member up across all constituents and return the
    /// union of the members found, or absent when none match.
    pub(crate) fn attr(&self, value: &Value, name: &str) -> Option<Value> {
        match value {
            Value::External(node) | Value::ExternalInstance(node) => {
                self.graph.member(*node, name).map(Value::External)
            }
            Value::Module(scope) => self.scope_value(*scope, name),
            Value::Class(class) | Value::Instance(class) => self.class_attr(*class, name),
            Value::Super(bases) => bases.iter().find_map(|base| self.attr(base, name)),
            Value::Union(members) => {
                unite(members.iter().map(|member| self.attr(member, name)))
            }
            other => {
                let path = builtin_type_path(other)?;
                let ty = self.graph.lookup(path)?;
                self.graph.member(ty, name).map(Value::External)
            }
        }
    }

    /// The result of calling `callee` with no argument information. Argument
    /// propagation into source functions is the propagator's job.
    pub(crate) fn call_result(&self, callee: &Value) -> Option<Value> {
        match callee {
            Value::Class(class) => Some(Value::Instance(*class)),
            Value::Function(function) => {
                let info = self.values.function(*function);
                self.scopes.symbol(info.return_symbol).value.clone()
            }
            Value::External(node) => match self.graph.kind(*node) {
                GraphKind::Type => Some(Value::ExternalInstance(*node)),
                GraphKind::Function => self.induced_returns(*node),
                GraphKind::Module | GraphKind::Object => None,
            },
            Value::Union(members) => {
                unite(members.iter().map(|member| self.call_result(member)))
            }
            _ => None,
        }
    }

    /// The element produced by iterating `value`.
    pub(crate) fn element_of(&self, value: &Value) -> Option<Value> {
        match value {
            Value::List(elem) | Value::Set(elem) | Value::Generator(elem) => {
                elem.as_deref().cloned()
            }
            Value::Tuple(elements) => unite(elements.iter().cloned()),
            Value::Dict { key, .. } => key.as_deref().cloned(),
            Value::Str(_) | Value::StrInstance => Some(Value::StrInstance),
            Value::Union(members) => {
                unite(members.iter().map(|member| self.element_of(member)))
            }
            _ => None,
        }
    }

    /// The result of indexing `value` with `index`.
    pub(crate) fn index_of(&self, value: &Value, index: Option<&Value>) -> Option<Value> {
        match value {
            Value::List(elem) => elem.as_deref().cloned(),
            Value::Tuple(elements) => match index {
                Some(Value::Int(i)) => {
                    elements.get(usize::try_from(*i).ok()?).cloned().flatten()
                }
                _ => unite(elements.iter().cloned()),
            },
            Value::Dict { value: val, .. } => val.as_deref().cloned(),
            Value::Str(_) | Value::StrInstance => Some(Value::StrInstance),
            Value::Union(members) => {
                unite(members.iter().map(|member| self.index_of(member, index)))
            }
            _ => None,
        }
    }

    fn scope_value(&self, scope: ScopeId, name: &str) -> Option<Value> {
        let sym = self.scopes.local(scope, name)?;
        self.scopes.symbol(sym).value.clone()
    }

    fn class_attr(&self, class: ClassId, name: &str) -> Option<Value> {
        let info = self.values.class(class);
        if let Some(found) = self.scope_value(info.members, name) {
            return Some(found);
        }
        // symbol exists locally but has no value yet: still shadows bases
        if self.scopes.local(info.members, name).is_some() {
            return None;
        }
        info.bases.iter().find_map(|base| self.attr(base, name))
    }

    fn induced_returns(&self, func: GraphNode) -> Option<Value> {
        const THRESHOLD: f64 = 0.1;
        let inducer = self.inducer?;
        unite(
            inducer
                .returns(func)
                .into_iter()
                .filter(|&(_, p)| p >= THRESHOLD)
                .map(|(node, _)| Some(Value::ExternalInstance(node))),
        )
    }
}

/// The graph path of the builtin type a scalar or collection value belongs
/// to, for member lookup like `"a,b".split`.
fn builtin_type_path(value: &Value) -> Option<&'static str> {
    match value {
        Value::Int(_) | Value::IntInstance => Some("builtins.int"),
        Value::FloatInstance => Some("builtins.float"),
        Value::ComplexInstance => Some("builtins.complex"),
        Value::Str(_) | Value::StrInstance => Some("builtins.str"),
        Value::Bool(_) | Value::BoolInstance => Some("builtins.bool"),
        Value::List(_) => Some("builtins.list"),
        Value::Tuple(_) => Some("builtins.tuple"),
        Value::Set(_) => Some("builtins.set"),
        Value::Dict { .. } => Some("builtins.dict"),
        _ => None,
    }
}
