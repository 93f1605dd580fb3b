//! Closure environments.
//!
//! Every compiled function body takes exactly one argument: a pointer to
//! its environment record. The record holds one pointer per slot, in a
//! fixed order:
//!
//! ```text
//! env.<fn> = { param 0 .. param n-1,   // fresh cells written per call
//!              capture 0 .. capture k,  // cells shared with the creator
//!              this?,                   // the receiver pointer itself
//!              outer 0 .. outer m }     // enclosing function's slots
//! ```
//!
//! Parameters and captures are cell pointers, so a closure observes
//! mutations made by its creator after creation and vice versa. The
//! `this` slot holds the receiver directly.
//!
//! Layouts are computed once per declaration by [`environment_for`] and
//! cached in the [`MetaRegistry`](crate::registry::MetaRegistry); the
//! record type is final before any call site references it.

mod builder;
pub mod free_vars;

use tsn_ir::{DeclId, Name};
use tsn_lir::TyId;

use crate::registry::EnvId;
use crate::type_info::TypeInfo;

pub(crate) use builder::environment_for;

/// What a slot is named by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotName {
    Named(Name),
    This,
}

/// Why a slot exists; decides how call sites fill it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotOrigin {
    Param,
    Capture,
    This,
    /// Copied from the enclosing function's environment.
    Outer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvSlot {
    pub name: SlotName,
    pub info: TypeInfo,
    pub origin: SlotOrigin,
    /// Parameter or `let` declaring the variable held in this slot.
    pub var: Option<DeclId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    /// Declaration this layout belongs to; `None` for synthesized layouts.
    pub owner: Option<DeclId>,
    /// Name of the record type.
    pub name: String,
    pub record: TyId,
    pub slots: Vec<EnvSlot>,
    pub param_count: u32,
    /// Environment of the enclosing function at the declaration site.
    pub outer: Option<EnvId>,
    /// `(own slot, outer slot)` for every `Outer` slot.
    pub remap: Vec<(u32, u32)>,
}

impl Environment {
    /// Layout used to call a closure whose code is unknown: only the
    /// parameter prefix, which every environment shares.
    pub fn synthesized(params: u32, record: TyId) -> Self {
        Environment {
            owner: None,
            name: format!("env.synthetic.{params}"),
            record,
            slots: Vec::new(),
            param_count: params,
            outer: None,
            remap: Vec::new(),
        }
    }

    pub fn slot_of(&self, name: SlotName) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| s.name == name)
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn this_slot(&self) -> Option<u32> {
        self.slot_of(SlotName::This)
    }

    pub fn slot(&self, index: u32) -> Option<&EnvSlot> {
        self.slots.get(index as usize)
    }

    /// Parameter representations recorded in the layout.
    pub fn param_infos(&self) -> Vec<TypeInfo> {
        self.slots
            .iter()
            .filter(|s| s.origin == SlotOrigin::Param)
            .map(|s| s.info)
            .collect()
    }

    /// Slot of the outer environment that feeds own slot `index`.
    pub fn outer_slot_for(&self, index: u32) -> Option<u32> {
        self.remap
            .iter()
            .find(|&&(own, _)| own == index)
            .map(|&(_, outer)| outer)
    }

    /// Iterate `(index, slot)` pairs.
    pub fn indexed_slots(&self) -> impl Iterator<Item = (u32, &EnvSlot)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (u32::try_from(i).unwrap_or(u32::MAX), s))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
