// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Symbol tables for lexical scopes.
//!
//! Scopes form a tree mirroring lexical nesting (module, class, function,
//! lambda, comprehension), not the syntax tree. All tables live in one
//! [`Scopes`] arena and refer to each other by [`ScopeId`]; symbols likewise
//! by [`SymbolId`]. Index-based identity keeps ownership single-rooted and
//! makes sharing tables between a resolved tree and its deep copies a plain
//! `Arc` clone.

use ecow::EcoString;
use rustc_hash::FxHashMap;

use super::value::Value;

/// Index of a symbol table in the [`Scopes`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

/// Index of a symbol in the [`Scopes`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

/// A named binding. `value` accumulates everything assigned to the name
/// across propagation passes; `None` means nothing resolvable yet.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: EcoString,
    pub value: Option<Value>,
}

/// One lexical scope's bindings.
#[derive(Debug, Clone)]
pub struct ScopeTable {
    /// Dotted path of the scope, for trace output.
    pub name: EcoString,
    parent: Option<ScopeId>,
    entries: FxHashMap<EcoString, SymbolId>,
}

/// Arena owning every scope table and symbol of one resolve call.
#[derive(Debug, Default)]
pub struct Scopes {
    tables: Vec<ScopeTable>,
    symbols: Vec<Symbol>,
}

impl Scopes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_scope(&mut self, name: impl Into<EcoString>, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.tables.len() as u32);
        self.tables.push(ScopeTable {
            name: name.into(),
            parent,
            entries: FxHashMap::default(),
        });
        id
    }

    /// Derives a child scope name in the `parent.child` form.
    #[must_use]
    pub fn child_name(&self, parent: ScopeId, tail: &str) -> EcoString {
        let base = &self.tables[parent.0 as usize].name;
        if base.is_empty() {
            tail.into()
        } else {
            let mut out = EcoString::from(base.as_str());
            out.push('.');
            out.push_str(tail);
            out
        }
    }

    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Looks a name up in `scope` only, without walking parents.
    #[must_use]
    pub fn local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.tables[scope.0 as usize].entries.get(name).copied()
    }

    /// Looks a name up in `scope` and its ancestors.
    #[must_use]
    pub fn find(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let table = &self.tables[id.0 as usize];
            if let Some(&sym) = table.entries.get(name) {
                return Some(sym);
            }
            current = table.parent;
        }
        None
    }

    /// Returns the local symbol for `name`, creating an empty one if absent.
    pub fn local_or_create(&mut self, scope: ScopeId, name: &str) -> SymbolId {
        if let Some(sym) = self.local(scope, name) {
            return sym;
        }
        let sym = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.into(),
            value: None,
        });
        self.tables[scope.0 as usize]
            .entries
            .insert(name.into(), sym);
        sym
    }

    /// Binds `name` to exactly `value` in `scope`, replacing any previous
    /// binding. Used for scope bootstrap entries such as `__name__`.
    pub fn put(&mut self, scope: ScopeId, name: &str, value: Option<Value>) {
        let sym = self.local_or_create(scope, name);
        self.symbols[sym.0 as usize].value = value;
    }

    /// Names bound directly in `scope`, in arbitrary order.
    pub fn local_names(&self, scope: ScopeId) -> impl Iterator<Item = &EcoString> {
        self.tables[scope.0 as usize].entries.keys()
    }

    #[must_use]
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.tables[scope.0 as usize].parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_walks_the_parent_chain() {
        let mut scopes = Scopes::new();
        let module = scopes.create_scope("mod", None);
        let inner = scopes.create_scope("mod.f", Some(module));

        scopes.put(module, "x", Some(Value::IntInstance));
        let sym = scopes.find(inner, "x").unwrap();
        assert_eq!(scopes.symbol(sym).name, "x");
        assert!(scopes.local(inner, "x").is_none());
    }

    #[test]
    fn local_or_create_is_idempotent() {
        let mut scopes = Scopes::new();
        let module = scopes.create_scope("mod", None);
        let a = scopes.local_or_create(module, "y");
        let b = scopes.local_or_create(module, "y");
        assert_eq!(a, b);
    }

    #[test]
    fn child_name_joins_with_dots() {
        let mut scopes = Scopes::new();
        let module = scopes.create_scope("pkg.mod", None);
        assert_eq!(scopes.child_name(module, "f"), "pkg.mod.f");
    }
}
