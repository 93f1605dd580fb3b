//! Lexical scopes for lowering.
//!
//! `Scope` uses `im::HashMap` for O(1) structural-sharing clone, so every
//! block, branch and function body gets its own child scope without
//! copying its parent. Bindings are keyed by interned [`Name`].
//!
//! Local variables live in heap cells: a [`ScopeBinding::Variable`] holds
//! the pointer to the cell, and the cell holds the value pointer. This is
//! what lets an environment capture a variable by reference.
//!
//! Variables declared by a `let` or a parameter also carry the identity of
//! that declaration. Environments fill their capture slots by identity, so
//! a callee reaches the variable it was declared next to even when the
//! caller shadows its name.

use im::HashMap;
use tsn_ir::{DeclId, Name};
use tsn_lir::{GlobalId, ValueId};

use crate::type_info::TypeInfo;

/// What a name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeBinding {
    /// Local variable (or parameter) stored in the heap cell `cell`.
    Variable { cell: ValueId, info: TypeInfo },
    /// Module-level variable stored in a global.
    Global { global: GlobalId, info: TypeInfo },
    /// Hoisted function declaration.
    Function(DeclId),
    /// Class declaration.
    Class(DeclId),
}

impl ScopeBinding {
    /// Bindings that survive into nested function bodies unchanged.
    pub fn is_declaration(self) -> bool {
        !matches!(self, ScopeBinding::Variable { .. })
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scope {
    bindings: HashMap<Name, ScopeBinding>,
    /// Declaration behind the variable each name currently refers to.
    declared_by: HashMap<Name, DeclId>,
    /// Every identified variable reachable from here, shadowed or not.
    variables: HashMap<DeclId, ScopeBinding>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child scope that inherits all parent bindings.
    #[must_use]
    pub fn child(&self) -> Self {
        self.clone()
    }

    pub fn bind(&mut self, name: Name, binding: ScopeBinding) {
        self.bindings.insert(name, binding);
        self.declared_by.remove(&name);
    }

    /// Bind `name` to the cell of the variable declared by `decl`.
    pub fn bind_declared(&mut self, name: Name, decl: DeclId, cell: ValueId, info: TypeInfo) {
        let binding = ScopeBinding::Variable { cell, info };
        self.bindings.insert(name, binding);
        self.declared_by.insert(name, decl);
        self.variables.insert(decl, binding);
    }

    /// Make the variable declared by `decl` reachable by identity only;
    /// its name keeps whatever it is bound to.
    pub fn bind_hidden(&mut self, decl: DeclId, cell: ValueId, info: TypeInfo) {
        self.variables
            .insert(decl, ScopeBinding::Variable { cell, info });
    }

    pub fn bind_variable(&mut self, name: Name, cell: ValueId, info: TypeInfo) {
        self.bind(name, ScopeBinding::Variable { cell, info });
    }

    pub fn lookup(&self, name: Name) -> Option<ScopeBinding> {
        self.bindings.get(&name).copied()
    }

    /// Declaration of the variable `name` refers to, when it has one.
    pub fn declaration_of(&self, name: Name) -> Option<DeclId> {
        self.declared_by.get(&name).copied()
    }

    /// The variable declared by `decl`, shadowed or not.
    pub fn variable(&self, decl: DeclId) -> Option<ScopeBinding> {
        self.variables.get(&decl).copied()
    }

    pub fn contains(&self, name: Name) -> bool {
        self.bindings.contains_key(&name)
    }

    /// Update the static info of an existing variable binding.
    pub fn refine(&mut self, name: Name, info: TypeInfo) {
        if let Some(binding) = self.bindings.get_mut(&name) {
            match binding {
                ScopeBinding::Variable { info: i, .. } | ScopeBinding::Global { info: i, .. } => {
                    *i = info;
                }
                ScopeBinding::Function(_) | ScopeBinding::Class(_) => {}
            }
            let binding = *binding;
            if let Some(decl) = self.declared_by.get(&name) {
                self.variables.insert(*decl, binding);
            }
        }
    }

    /// The part of this scope visible from another function body: value
    /// ids of local cells are meaningless outside the function that
    /// created them, so only declarations and globals are kept.
    #[must_use]
    pub fn declaration_view(&self) -> Self {
        let bindings = self
            .bindings
            .iter()
            .filter(|(_, b)| b.is_declaration())
            .map(|(&n, &b)| (n, b))
            .collect();
        Scope {
            bindings,
            ..Scope::default()
        }
    }

    /// Layer `self` over `base`: names bound here shadow `base`.
    #[must_use]
    pub fn over(&self, base: &Scope) -> Self {
        let mut merged = base.clone();
        for (&name, &binding) in &self.bindings {
            merged.bindings.insert(name, binding);
            match self.declared_by.get(&name) {
                Some(&decl) => merged.declared_by.insert(name, decl),
                None => merged.declared_by.remove(&name),
            };
        }
        for (&decl, &binding) in &self.variables {
            merged.variables.insert(decl, binding);
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
