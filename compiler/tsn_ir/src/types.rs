//! TS-level types as resolved by the front end.
//!
//! Types are hash-consed in a [`TypePool`]; two structurally equal types
//! always share one [`TypeId`]. The well-known primitive types are
//! pre-interned at fixed ids so they can be named as constants.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{DeclId, Name};

// ── TypeId ──────────────────────────────────────────────────────────

/// Handle into a [`TypePool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const NUMBER: TypeId = TypeId(0);
    pub const BOOLEAN: TypeId = TypeId(1);
    pub const STRING: TypeId = TypeId(2);
    pub const VOID: TypeId = TypeId(3);
    pub const NULL: TypeId = TypeId(4);
    pub const UNDEFINED: TypeId = TypeId(5);
    pub const ANY: TypeId = TypeId(6);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// `null` or `undefined`.
    #[inline]
    pub const fn is_nullish(self) -> bool {
        self.0 == Self::NULL.0 || self.0 == Self::UNDEFINED.0
    }
}

// ── TsType ──────────────────────────────────────────────────────────

/// Signature of a function type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    /// The declaration this type was taken from, when the value is known
    /// to originate from one specific function.
    pub origin: Option<DeclId>,
}

/// A resolved TS type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TsType {
    Number,
    Boolean,
    String,
    Void,
    Null,
    Undefined,
    Any,
    /// Instance type of a class declaration.
    Class(DeclId),
    /// Named interface; its properties live on the declaration.
    Interface(DeclId),
    /// Anonymous object type literal, properties in declaration order.
    Object(Vec<(Name, TypeId)>),
    /// Flattened, deduplicated member list in source order.
    Union(Vec<TypeId>),
    Intersection(Vec<TypeId>),
    Function(FunctionType),
    /// Reference to a generic parameter, bound per specialization.
    TypeParam(Name),
}

// ── TypePool ────────────────────────────────────────────────────────

/// Interning pool for [`TsType`].
#[derive(Clone, Debug)]
pub struct TypePool {
    types: Vec<TsType>,
    map: FxHashMap<TsType, TypeId>,
}

impl TypePool {
    pub fn new() -> Self {
        let mut pool = TypePool {
            types: Vec::new(),
            map: FxHashMap::default(),
        };
        // Order must match the TypeId constants.
        for ty in [
            TsType::Number,
            TsType::Boolean,
            TsType::String,
            TsType::Void,
            TsType::Null,
            TsType::Undefined,
            TsType::Any,
        ] {
            pool.intern(ty);
        }
        pool
    }

    /// Intern a type, returning the existing id for an equal type.
    pub fn intern(&mut self, ty: TsType) -> TypeId {
        if let Some(&id) = self.map.get(&ty) {
            return id;
        }
        let id = TypeId(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.types.push(ty.clone());
        self.map.insert(ty, id);
        id
    }

    /// Resolve an id. Unknown ids resolve to `any`.
    pub fn get(&self, id: TypeId) -> &TsType {
        self.types.get(id.index()).unwrap_or(&TsType::Any)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn class(&mut self, decl: DeclId) -> TypeId {
        self.intern(TsType::Class(decl))
    }

    pub fn interface(&mut self, decl: DeclId) -> TypeId {
        self.intern(TsType::Interface(decl))
    }

    pub fn object(&mut self, fields: Vec<(Name, TypeId)>) -> TypeId {
        self.intern(TsType::Object(fields))
    }

    pub fn type_param(&mut self, name: Name) -> TypeId {
        self.intern(TsType::TypeParam(name))
    }

    pub fn function(&mut self, params: Vec<TypeId>, ret: TypeId, origin: Option<DeclId>) -> TypeId {
        self.intern(TsType::Function(FunctionType {
            params,
            ret,
            origin,
        }))
    }

    /// Build a union, flattening nested unions and dropping duplicates.
    ///
    /// A single surviving member is returned as-is.
    pub fn union(&mut self, members: &[TypeId]) -> TypeId {
        let mut flat: SmallVec<[TypeId; 4]> = SmallVec::new();
        for &m in members {
            match self.get(m) {
                TsType::Union(inner) => {
                    for &i in inner {
                        if !flat.contains(&i) {
                            flat.push(i);
                        }
                    }
                }
                _ => {
                    if !flat.contains(&m) {
                        flat.push(m);
                    }
                }
            }
        }
        if flat.len() == 1 {
            return flat[0];
        }
        self.intern(TsType::Union(flat.into_vec()))
    }

    /// `T | null`.
    pub fn optional(&mut self, ty: TypeId) -> TypeId {
        self.union(&[ty, TypeId::NULL])
    }

    /// Build an intersection, flattening nested intersections.
    pub fn intersection(&mut self, members: &[TypeId]) -> TypeId {
        let mut flat: SmallVec<[TypeId; 4]> = SmallVec::new();
        for &m in members {
            match self.get(m) {
                TsType::Intersection(inner) => flat.extend(inner.iter().copied()),
                _ => flat.push(m),
            }
        }
        if flat.len() == 1 {
            return flat[0];
        }
        self.intern(TsType::Intersection(flat.into_vec()))
    }

    /// If `id` is exactly `T | null`, `T | undefined` or `T | null | undefined`,
    /// return `T`.
    pub fn optional_inner(&self, id: TypeId) -> Option<TypeId> {
        let TsType::Union(members) = self.get(id) else {
            return None;
        };
        let mut inner = None;
        let mut saw_nullish = false;
        for &m in members {
            if m.is_nullish() {
                saw_nullish = true;
            } else if inner.replace(m).is_some() {
                return None;
            }
        }
        if saw_nullish {
            inner
        } else {
            None
        }
    }

    /// Whether a type parameter occurs anywhere inside `id`.
    pub fn mentions_type_param(&self, id: TypeId) -> bool {
        match self.get(id) {
            TsType::TypeParam(_) => true,
            TsType::Object(fields) => fields.iter().any(|&(_, t)| self.mentions_type_param(t)),
            TsType::Union(ms) | TsType::Intersection(ms) => {
                ms.iter().any(|&m| self.mentions_type_param(m))
            }
            TsType::Function(f) => {
                f.params.iter().any(|&p| self.mentions_type_param(p))
                    || self.mentions_type_param(f.ret)
            }
            TsType::Number
            | TsType::Boolean
            | TsType::String
            | TsType::Void
            | TsType::Null
            | TsType::Undefined
            | TsType::Any
            | TsType::Class(_)
            | TsType::Interface(_) => false,
        }
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
