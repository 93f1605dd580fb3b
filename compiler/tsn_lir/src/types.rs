//! Low-level types.
//!
//! Anonymous types are hash-consed. Named structs are unique by name and
//! follow the usual two-step protocol: [`TypeTable::named_struct`] creates
//! an opaque placeholder, [`TypeTable::set_struct_body`] fills it in, so
//! recursive layouts (a class holding a pointer to itself) can be built.

use rustc_hash::FxHashMap;

use crate::TyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LirType {
    Void,
    I1,
    I8,
    I32,
    I64,
    F64,
    /// Immutable runtime string.
    Str,
    /// Opaque pointer.
    Ptr,
    /// `fields == None` while the named struct is still opaque.
    Struct {
        name: Option<String>,
        fields: Option<Vec<TyId>>,
    },
    Array {
        elem: TyId,
        len: u32,
    },
    Func {
        params: Vec<TyId>,
        ret: TyId,
    },
}

impl TyId {
    pub const VOID: TyId = TyId::from_raw(0);
    pub const I1: TyId = TyId::from_raw(1);
    pub const I8: TyId = TyId::from_raw(2);
    pub const I32: TyId = TyId::from_raw(3);
    pub const I64: TyId = TyId::from_raw(4);
    pub const F64: TyId = TyId::from_raw(5);
    pub const STR: TyId = TyId::from_raw(6);
    pub const PTR: TyId = TyId::from_raw(7);
}

#[derive(Clone, Debug)]
pub struct TypeTable {
    types: Vec<LirType>,
    interned: FxHashMap<LirType, TyId>,
    named: FxHashMap<String, TyId>,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            types: Vec::new(),
            interned: FxHashMap::default(),
            named: FxHashMap::default(),
        };
        // Order must match the TyId constants.
        for ty in [
            LirType::Void,
            LirType::I1,
            LirType::I8,
            LirType::I32,
            LirType::I64,
            LirType::F64,
            LirType::Str,
            LirType::Ptr,
        ] {
            table.intern(ty);
        }
        table
    }

    fn push(&mut self, ty: LirType) -> TyId {
        let id = TyId::from_len(self.types.len());
        self.types.push(ty);
        id
    }

    fn intern(&mut self, ty: LirType) -> TyId {
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = self.push(ty.clone());
        self.interned.insert(ty, id);
        id
    }

    pub fn get(&self, id: TyId) -> &LirType {
        self.types.get(id.index()).unwrap_or(&LirType::Void)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Anonymous struct with the given fields.
    pub fn literal_struct(&mut self, fields: &[TyId]) -> TyId {
        self.intern(LirType::Struct {
            name: None,
            fields: Some(fields.to_vec()),
        })
    }

    /// Get or create the named struct `name` (opaque until given a body).
    pub fn named_struct(&mut self, name: &str) -> TyId {
        if let Some(&id) = self.named.get(name) {
            return id;
        }
        let id = self.push(LirType::Struct {
            name: Some(name.to_owned()),
            fields: None,
        });
        self.named.insert(name.to_owned(), id);
        id
    }

    /// Look up a named struct without creating it.
    pub fn lookup_named(&self, name: &str) -> Option<TyId> {
        self.named.get(name).copied()
    }

    /// Set the body of a named struct. Returns `false` if `id` is not a
    /// named struct or already has a different body.
    pub fn set_struct_body(&mut self, id: TyId, body: &[TyId]) -> bool {
        match self.types.get_mut(id.index()) {
            Some(LirType::Struct {
                name: Some(_),
                fields,
            }) => match fields {
                Some(existing) => existing.as_slice() == body,
                None => {
                    *fields = Some(body.to_vec());
                    true
                }
            },
            _ => false,
        }
    }

    pub fn array(&mut self, elem: TyId, len: u32) -> TyId {
        self.intern(LirType::Array { elem, len })
    }

    pub fn func(&mut self, params: &[TyId], ret: TyId) -> TyId {
        self.intern(LirType::Func {
            params: params.to_vec(),
            ret,
        })
    }

    /// Field types of a struct with a body.
    pub fn struct_fields(&self, id: TyId) -> Option<&[TyId]> {
        match self.get(id) {
            LirType::Struct {
                fields: Some(f), ..
            } => Some(f),
            _ => None,
        }
    }

    /// Return type of a function signature type.
    pub fn func_ret(&self, id: TyId) -> Option<TyId> {
        match self.get(id) {
            LirType::Func { ret, .. } => Some(*ret),
            _ => None,
        }
    }

    /// Printable type name.
    pub fn display(&self, id: TyId) -> String {
        match self.get(id) {
            LirType::Void => "void".to_owned(),
            LirType::I1 => "i1".to_owned(),
            LirType::I8 => "i8".to_owned(),
            LirType::I32 => "i32".to_owned(),
            LirType::I64 => "i64".to_owned(),
            LirType::F64 => "f64".to_owned(),
            LirType::Str => "str".to_owned(),
            LirType::Ptr => "ptr".to_owned(),
            LirType::Struct {
                name: Some(n), ..
            } => format!("%\"{n}\""),
            LirType::Struct { name: None, fields } => {
                let inner: Vec<String> = fields
                    .iter()
                    .flatten()
                    .map(|&f| self.display(f))
                    .collect();
                format!("{{ {} }}", inner.join(", "))
            }
            LirType::Array { elem, len } => format!("[{len} x {}]", self.display(*elem)),
            LirType::Func { params, ret } => {
                let inner: Vec<String> = params.iter().map(|&p| self.display(p)).collect();
                format!("{} ({})", self.display(*ret), inner.join(", "))
            }
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
