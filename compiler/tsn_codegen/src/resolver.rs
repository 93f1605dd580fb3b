//! The foreign-symbol resolver seam.
//!
//! Before compiling a call, the lowerer asks the resolver whether the
//! target is implemented by the native object-code base. External targets
//! are called by their qualified name with the native ABI
//! `(this?, args...) -> ptr` and never get a body.

use rustc_hash::FxHashMap;
use tsn_ir::{DeclFlags, DeclId, DeclKind, Program};

use crate::type_info::TypeInfo;

/// How a declaration is realized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub is_external_symbol: bool,
    /// Symbol name; for compiled declarations, a base for naming the body.
    pub qualified_name: String,
}

impl Resolution {
    pub fn external(name: impl Into<String>) -> Self {
        Resolution {
            is_external_symbol: true,
            qualified_name: name.into(),
        }
    }

    pub fn compiled(name: impl Into<String>) -> Self {
        Resolution {
            is_external_symbol: false,
            qualified_name: name.into(),
        }
    }
}

pub trait ForeignSymbolResolver {
    fn resolve(
        &self,
        program: &Program,
        decl: DeclId,
        arg_types: &[TypeInfo],
        this_type: Option<TypeInfo>,
    ) -> Resolution;

    /// External symbol holding the native vtable of `class`, if the
    /// object-code base provides one.
    fn vtable_symbol(&self, _program: &Program, _class: DeclId) -> Option<String> {
        None
    }
}

/// `<Class>.<member>` for class members, the plain name otherwise.
pub fn qualified_name(program: &Program, decl: DeclId) -> String {
    let owner = match program.decl(decl).map(|d| &d.kind) {
        Ok(DeclKind::Function(f)) => f.owner,
        Ok(DeclKind::Property(p)) => Some(p.owner),
        _ => None,
    };
    match owner {
        Some(class) => format!("{}.{}", program.decl_name(class), program.decl_name(decl)),
        None => program.decl_name(decl).to_owned(),
    }
}

/// Treats `declare`d and bodyless declarations as external, named by
/// [`qualified_name`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AmbientResolver;

impl ForeignSymbolResolver for AmbientResolver {
    fn resolve(
        &self,
        program: &Program,
        decl: DeclId,
        _arg_types: &[TypeInfo],
        _this_type: Option<TypeInfo>,
    ) -> Resolution {
        let external = program.decl(decl).is_ok_and(|d| {
            d.flags.contains(DeclFlags::AMBIENT)
                || matches!(&d.kind, DeclKind::Function(f) if f.body.is_none())
        });
        let name = qualified_name(program, decl);
        if external {
            Resolution::external(name)
        } else {
            Resolution::compiled(name)
        }
    }
}

/// Explicit symbol table layered over [`AmbientResolver`]: declarations
/// listed here resolve to the given native symbols.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: FxHashMap<DeclId, String>,
    vtables: FxHashMap<DeclId, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_symbol(mut self, decl: DeclId, symbol: impl Into<String>) -> Self {
        self.symbols.insert(decl, symbol.into());
        self
    }

    #[must_use]
    pub fn with_vtable(mut self, class: DeclId, symbol: impl Into<String>) -> Self {
        self.vtables.insert(class, symbol.into());
        self
    }
}

impl ForeignSymbolResolver for SymbolTable {
    fn resolve(
        &self,
        program: &Program,
        decl: DeclId,
        arg_types: &[TypeInfo],
        this_type: Option<TypeInfo>,
    ) -> Resolution {
        match self.symbols.get(&decl) {
            Some(symbol) => Resolution::external(symbol.clone()),
            None => AmbientResolver.resolve(program, decl, arg_types, this_type),
        }
    }

    fn vtable_symbol(&self, _program: &Program, class: DeclId) -> Option<String> {
        self.vtables.get(&class).cloned()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
