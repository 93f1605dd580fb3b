//! Generic type bindings.
//!
//! A [`TypeMapper`] binds type-parameter names to concrete [`TypeInfo`]s
//! for one specialization. Mappers form a chain: a generic arrow nested in
//! a generic function sees its own bindings first, then its parent's.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tsn_ir::Name;

use crate::error::RegistryError;
use crate::type_info::{ShapeKey, TypeInfo};

#[derive(Debug, Default)]
pub struct TypeMapper {
    /// Display name of the generic declaration being specialized.
    owner: String,
    bindings: FxHashMap<Name, TypeInfo>,
    parent: Option<Rc<TypeMapper>>,
}

impl TypeMapper {
    /// The empty root mapper.
    pub fn root() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// An empty mapper whose lookups fall back to `parent`.
    pub fn child_of(parent: &Rc<TypeMapper>) -> Self {
        TypeMapper {
            owner: parent.owner.clone(),
            bindings: FxHashMap::default(),
            parent: Some(Rc::clone(parent)),
        }
    }

    /// A child mapper for specializing the declaration named `owner`.
    pub fn child_for(parent: &Rc<TypeMapper>, owner: &str) -> Self {
        TypeMapper {
            owner: owner.to_owned(),
            ..Self::child_of(parent)
        }
    }

    pub fn owner(&self) -> &str {
        if self.owner.is_empty() {
            "<anonymous>"
        } else {
            &self.owner
        }
    }

    /// Bind `param`. Binding the same parameter twice in one mapper is
    /// rejected; shadowing a parent's binding is allowed.
    pub fn bind(&mut self, param: Name, info: TypeInfo, display: &str) -> Result<(), RegistryError> {
        if self.bindings.contains_key(&param) {
            return Err(RegistryError::DuplicateBinding(display.to_owned()));
        }
        self.bindings.insert(param, info);
        Ok(())
    }

    /// Whether this mapper itself binds `param`.
    pub fn binds(&self, param: Name) -> bool {
        self.bindings.contains_key(&param)
    }

    /// Resolve `param`, walking outwards through the chain.
    pub fn lookup(&self, param: Name) -> Option<TypeInfo> {
        let mut current = Some(self);
        while let Some(mapper) = current {
            if let Some(&info) = mapper.bindings.get(&param) {
                return Some(info);
            }
            current = mapper.parent.as_deref();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.parent.as_ref().map_or(true, |p| p.is_empty())
    }

    /// Every visible binding, inner ones shadowing outer ones, as a
    /// sorted key. Two mappers with equal chain keys specialize a body
    /// identically.
    pub fn chain_key(&self) -> Vec<(Name, ShapeKey)> {
        let mut seen: FxHashMap<Name, ShapeKey> = FxHashMap::default();
        let mut current = Some(self);
        while let Some(mapper) = current {
            for (&n, &info) in &mapper.bindings {
                seen.entry(n).or_insert_with(|| info.shape_key());
            }
            current = mapper.parent.as_deref();
        }
        let mut key: Vec<(Name, ShapeKey)> = seen.into_iter().collect();
        key.sort();
        key
    }

    /// Own bindings as a sorted key.
    pub fn key(&self) -> Vec<(Name, ShapeKey)> {
        let mut key: Vec<(Name, ShapeKey)> = self
            .bindings
            .iter()
            .map(|(&n, &info)| (n, info.shape_key()))
            .collect();
        key.sort();
        key
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
