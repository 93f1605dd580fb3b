//! Static lowering descriptors for TS values.
//!
//! Every TS value is pointer-sized at runtime. A [`TypeInfo`] records what
//! the pointer refers to, which decides how the value is boxed, compared,
//! projected and passed:
//!
//! | Variant | Runtime value |
//! |---------|---------------|
//! | `Number` / `Boolean` / `String` | `ptr` to an `f64` / `i1` / `str` cell |
//! | `Null`, `Void` | null `ptr` |
//! | `Object(shape)` | `ptr` to an `object.*` record of value pointers |
//! | `Class(decl)` | `ptr` to a `class.<Name>` record |
//! | `Union(shape)` | `ptr` to a `union.*` record |
//! | `Intersection(shape)` | `ptr` to an `*.intersection` record |
//! | `Closure` | `ptr` to `closure { ptr code, ptr env }` |
//! | `LazyClosure(decl)` | `ptr` to `lazy_closure { ptr env }` |
//! | `Opaque` | a pointer nothing is known about (`any`) |
//!
//! `TypeInfo` is `Copy`: aggregate shapes live in the
//! [`MetaRegistry`](crate::registry::MetaRegistry) and are referenced by id.

use tsn_ir::{DeclId, TypeId};
use tsn_lir::{FuncId, TyId};

use crate::registry::{EnvId, ShapeId};

/// What is known statically about a closure value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ClosureInfo {
    /// Declared function type, when concrete.
    pub sig: Option<TypeId>,
    /// Code pointer identity, when the closure was built in this unit.
    pub code: Option<FuncId>,
    /// Environment layout, when known.
    pub env: Option<EnvId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    Void,
    Number,
    Boolean,
    String,
    Null,
    /// Anonymous object or interface, flattened into named fields.
    Object(ShapeId),
    /// Instance of a class declaration.
    Class(DeclId),
    Union(ShapeId),
    Intersection(ShapeId),
    Closure(ClosureInfo),
    /// Generic function whose body is compiled per call-site bindings.
    LazyClosure(DeclId),
    Opaque,
}

/// Key under which a value occupies a union slot.
///
/// Structurally equal values share a key. All closures share one key: the
/// code pointer's ABI is uniform, so any closure fits any closure slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeKey {
    Void,
    Number,
    Boolean,
    String,
    Null,
    Object(ShapeId),
    Class(DeclId),
    Union(ShapeId),
    Intersection(ShapeId),
    Closure,
    Lazy(DeclId),
    Opaque,
}

impl TypeInfo {
    pub fn closure(info: ClosureInfo) -> Self {
        TypeInfo::Closure(info)
    }

    pub fn shape_key(self) -> ShapeKey {
        match self {
            TypeInfo::Void => ShapeKey::Void,
            TypeInfo::Number => ShapeKey::Number,
            TypeInfo::Boolean => ShapeKey::Boolean,
            TypeInfo::String => ShapeKey::String,
            TypeInfo::Null => ShapeKey::Null,
            TypeInfo::Object(s) => ShapeKey::Object(s),
            TypeInfo::Class(d) => ShapeKey::Class(d),
            TypeInfo::Union(s) => ShapeKey::Union(s),
            TypeInfo::Intersection(s) => ShapeKey::Intersection(s),
            TypeInfo::Closure(_) => ShapeKey::Closure,
            TypeInfo::LazyClosure(d) => ShapeKey::Lazy(d),
            TypeInfo::Opaque => ShapeKey::Opaque,
        }
    }

    /// Scalar types that are boxed into a typed cell.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            TypeInfo::Number | TypeInfo::Boolean | TypeInfo::String
        )
    }

    /// Element type of the cell a boxed primitive points to.
    pub fn cell_type(self) -> Option<TyId> {
        match self {
            TypeInfo::Number => Some(TyId::F64),
            TypeInfo::Boolean => Some(TyId::I1),
            TypeInfo::String => Some(TyId::STR),
            _ => None,
        }
    }

    /// Null, undefined or void: represented by the null pointer.
    pub fn is_nullish(self) -> bool {
        matches!(self, TypeInfo::Null | TypeInfo::Void)
    }

    pub fn is_callable(self) -> bool {
        matches!(
            self,
            TypeInfo::Closure(_) | TypeInfo::LazyClosure(_) | TypeInfo::Opaque
        )
    }
}

/// Whether a lowered scalar is still an SSA value or already boxed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repr {
    /// `f64` / `i1` / `str` value, not yet in a cell.
    Raw,
    /// Pointer-sized value (cell pointer for primitives).
    Boxed,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
