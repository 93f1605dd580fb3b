//! Interpreter memory: heap allocations and globals.

use crate::GlobalId;

use super::value::{Pointer, Region, Value};
use super::Trap;

#[derive(Debug, Default)]
pub(super) struct Memory {
    heap: Vec<Value>,
    globals: Vec<Value>,
    readonly: Vec<bool>,
    global_names: Vec<String>,
}

impl Memory {
    pub(super) fn add_global(&mut self, name: &str, value: Value, readonly: bool) {
        self.globals.push(value);
        self.readonly.push(readonly);
        self.global_names.push(name.to_owned());
    }

    pub(super) fn set_global(&mut self, id: GlobalId, value: Value, readonly: bool) {
        if let Some(slot) = self.globals.get_mut(id.index()) {
            *slot = value;
        }
        if let Some(flag) = self.readonly.get_mut(id.index()) {
            *flag = readonly;
        }
    }

    pub(super) fn alloc(&mut self, value: Value) -> Pointer {
        let id = u32::try_from(self.heap.len()).unwrap_or(u32::MAX);
        self.heap.push(value);
        Pointer::root(Region::Heap(id))
    }

    pub(super) fn allocation_count(&self) -> usize {
        self.heap.len()
    }

    fn root(&self, region: Region) -> Result<&Value, Trap> {
        let slot = match region {
            Region::Heap(h) => self.heap.get(h as usize),
            Region::Global(g) => self.globals.get(g.index()),
        };
        slot.ok_or_else(|| Trap::BadAccess(format!("dangling region {region:?}")))
    }

    fn root_mut(&mut self, region: Region) -> Result<&mut Value, Trap> {
        if let Region::Global(g) = region {
            if self.readonly.get(g.index()).copied().unwrap_or(false) {
                let name = self.global_names.get(g.index()).cloned().unwrap_or_default();
                return Err(Trap::ReadOnlyWrite(name));
            }
        }
        let slot = match region {
            Region::Heap(h) => self.heap.get_mut(h as usize),
            Region::Global(g) => self.globals.get_mut(g.index()),
        };
        slot.ok_or_else(|| Trap::BadAccess(format!("dangling region {region:?}")))
    }

    pub(super) fn read(&self, ptr: &Pointer) -> Result<&Value, Trap> {
        let mut cur = self.root(ptr.region)?;
        for &i in &ptr.path {
            cur = match cur {
                Value::Agg(items) => items
                    .get(i as usize)
                    .ok_or(Trap::OutOfBounds(i64::from(i)))?,
                // Elements of a never-written aggregate are uninitialized too.
                Value::Undef => return Err(Trap::UninitializedRead),
                other => {
                    return Err(Trap::BadAccess(format!(
                        "cannot index into {} at {ptr}",
                        other.kind()
                    )))
                }
            };
        }
        Ok(cur)
    }

    pub(super) fn write(&mut self, ptr: &Pointer, value: Value) -> Result<(), Trap> {
        let mut cur = self.root_mut(ptr.region)?;
        for &i in &ptr.path {
            cur = match cur {
                Value::Agg(items) => items
                    .get_mut(i as usize)
                    .ok_or(Trap::OutOfBounds(i64::from(i)))?,
                other => {
                    return Err(Trap::BadAccess(format!(
                        "cannot index into {} at {ptr}",
                        other.kind()
                    )))
                }
            };
        }
        *cur = value;
        Ok(())
    }
}
