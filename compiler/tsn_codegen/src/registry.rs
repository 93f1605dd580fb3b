//! The meta-registry: per-unit lookup tables for shapes and environments.
//!
//! Holds no logic beyond keyed storage:
//!
//! - shape name → [`ShapeMeta`] (objects, unions, intersections). Shapes are
//!   registered idempotently: registering a name that already exists
//!   returns the original id and leaves its slots untouched.
//! - declaration → environment. Insert-or-reject.
//! - closure code → [`ClosureMeta`]. Insert-or-reject, with an explicit
//!   overwrite for callers that mean it.
//!
//! The registry is owned by the [`CodegenCx`](crate::CodegenCx) of one
//! compilation unit; nothing here is global.

use rustc_hash::FxHashMap;
use tracing::trace;
use tsn_ir::{DeclId, Name};
use tsn_lir::{FuncId, TyId};

use crate::environment::Environment;
use crate::error::RegistryError;
use crate::type_info::{ShapeKey, TypeInfo};

/// Handle to a registered shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl ShapeId {
    pub const fn from_raw(raw: u32) -> Self {
        ShapeId(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Handle to an environment layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(u32);

impl EnvId {
    pub const fn from_raw(raw: u32) -> Self {
        EnvId(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

// ── Shape metadata ──────────────────────────────────────────────────

/// An anonymous object or interface: one pointer field per property.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectMeta {
    pub name: String,
    pub record: TyId,
    /// Properties in declaration order; field `i` holds property `i`.
    pub props: Vec<(Name, TypeInfo)>,
}

impl ObjectMeta {
    pub fn field_index(&self, name: Name) -> Option<u32> {
        self.props
            .iter()
            .position(|&(n, _)| n == name)
            .and_then(|i| u32::try_from(i).ok())
    }
}

/// One slot of a union record.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionSlot {
    pub key: ShapeKey,
    /// Member display name, or the property name for flattened members.
    pub label: String,
    pub info: TypeInfo,
    /// Set when the slot holds a property of an object/interface member.
    pub prop: Option<Name>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnionMeta {
    pub name: String,
    pub record: TyId,
    /// Exactly `T | null | undefined`: field 0 is the present marker.
    pub optional: bool,
    /// Declared non-nullish members.
    pub members: Vec<TypeInfo>,
    pub slots: Vec<UnionSlot>,
    /// Property name → slot, for flattened object members.
    pub props: FxHashMap<Name, u32>,
}

impl UnionMeta {
    /// Record field holding slot `slot`.
    pub fn field_of_slot(&self, slot: u32) -> u32 {
        slot + u32::from(self.optional)
    }

    pub fn slot_for_key(&self, key: ShapeKey) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| s.prop.is_none() && s.key == key)
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn slot_for_prop(&self, name: Name) -> Option<u32> {
        self.props.get(&name).copied()
    }

    pub fn slot_count(&self) -> u32 {
        u32::try_from(self.slots.len()).unwrap_or(u32::MAX)
    }

    /// Whether object members were flattened into property slots.
    pub fn has_property_slots(&self) -> bool {
        !self.props.is_empty()
    }

    pub fn has_member(&self, info: TypeInfo) -> bool {
        let key = info.shape_key();
        self.members.iter().any(|m| m.shape_key() == key)
    }
}

/// A named member range of an intersection record.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub name: String,
    pub member: TypeInfo,
    pub start: u32,
    pub len: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntersectionMeta {
    /// `A.B.intersection`
    pub name: String,
    pub record: TyId,
    /// Flattened fields of every member, in member order.
    pub fields: Vec<(Name, TypeInfo)>,
    pub segments: Vec<Segment>,
}

impl IntersectionMeta {
    pub fn field_index(&self, name: Name) -> Option<u32> {
        self.fields
            .iter()
            .position(|&(n, _)| n == name)
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShapeMeta {
    Object(ObjectMeta),
    Union(UnionMeta),
    Intersection(IntersectionMeta),
}

impl ShapeMeta {
    pub fn name(&self) -> &str {
        match self {
            ShapeMeta::Object(m) => &m.name,
            ShapeMeta::Union(m) => &m.name,
            ShapeMeta::Intersection(m) => &m.name,
        }
    }

    pub fn record(&self) -> TyId {
        match self {
            ShapeMeta::Object(m) => m.record,
            ShapeMeta::Union(m) => m.record,
            ShapeMeta::Intersection(m) => m.record,
        }
    }
}

/// What the registry knows about a closure built in this unit.
#[derive(Clone, Debug, PartialEq)]
pub struct ClosureMeta {
    pub decl: Option<DeclId>,
    pub env: EnvId,
    /// Parameter representations the code was compiled for.
    pub params: Vec<TypeInfo>,
    pub ret: TypeInfo,
}

// ── Registry ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MetaRegistry {
    shapes: Vec<ShapeMeta>,
    shape_names: FxHashMap<String, ShapeId>,
    envs: Vec<Environment>,
    decl_envs: FxHashMap<DeclId, EnvId>,
    closures: FxHashMap<FuncId, ClosureMeta>,
}

impl MetaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Shapes ──────────────────────────────────────────────────────

    /// Register a shape under its name. An existing registration wins.
    pub fn register_shape(&mut self, meta: ShapeMeta) -> ShapeId {
        if let Some(&id) = self.shape_names.get(meta.name()) {
            return id;
        }
        let id = ShapeId(u32::try_from(self.shapes.len()).unwrap_or(u32::MAX));
        trace!(shape = meta.name(), id = id.0, "shape registered");
        self.shape_names.insert(meta.name().to_owned(), id);
        self.shapes.push(meta);
        id
    }

    pub fn shape_by_name(&self, name: &str) -> Option<ShapeId> {
        self.shape_names.get(name).copied()
    }

    pub fn shape(&self, id: ShapeId) -> Option<&ShapeMeta> {
        self.shapes.get(id.0 as usize)
    }

    pub fn shape_name(&self, id: ShapeId) -> &str {
        self.shape(id).map_or("<unknown shape>", ShapeMeta::name)
    }

    pub fn object(&self, id: ShapeId) -> Option<&ObjectMeta> {
        match self.shape(id)? {
            ShapeMeta::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn union(&self, id: ShapeId) -> Option<&UnionMeta> {
        match self.shape(id)? {
            ShapeMeta::Union(m) => Some(m),
            _ => None,
        }
    }

    pub fn intersection(&self, id: ShapeId) -> Option<&IntersectionMeta> {
        match self.shape(id)? {
            ShapeMeta::Intersection(m) => Some(m),
            _ => None,
        }
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    // ── Environments ────────────────────────────────────────────────

    pub fn add_env(&mut self, env: Environment) -> EnvId {
        let id = EnvId(u32::try_from(self.envs.len()).unwrap_or(u32::MAX));
        self.envs.push(env);
        id
    }

    pub fn env(&self, id: EnvId) -> Option<&Environment> {
        self.envs.get(id.0 as usize)
    }

    /// Associate `decl` with its environment. Rebinding to a different
    /// environment is rejected.
    pub fn bind_decl_env(&mut self, decl: DeclId, env: EnvId) -> Result<(), RegistryError> {
        match self.decl_envs.get(&decl) {
            Some(&existing) if existing != env => Err(RegistryError::Conflict {
                key: format!("declaration #{}", decl.raw()),
                what: "environment",
            }),
            Some(_) => Ok(()),
            None => {
                self.decl_envs.insert(decl, env);
                Ok(())
            }
        }
    }

    pub fn decl_env(&self, decl: DeclId) -> Option<EnvId> {
        self.decl_envs.get(&decl).copied()
    }

    // ── Closures ────────────────────────────────────────────────────

    /// Associate closure code with its environment. Every evaluation of a
    /// function literal registers the same association, which is accepted;
    /// a different environment is rejected.
    pub fn bind_closure(&mut self, code: FuncId, meta: ClosureMeta) -> Result<(), RegistryError> {
        match self.closures.get(&code) {
            Some(existing) if existing.env != meta.env => Err(RegistryError::Conflict {
                key: format!("closure code #{}", code.raw()),
                what: "environment",
            }),
            Some(_) => Ok(()),
            None => {
                self.closures.insert(code, meta);
                Ok(())
            }
        }
    }

    pub fn closure(&self, code: FuncId) -> Option<&ClosureMeta> {
        self.closures.get(&code)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
