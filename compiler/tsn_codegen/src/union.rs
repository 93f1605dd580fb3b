//! Union records.
//!
//! Two layouts:
//!
//! - **Optional** (`T | null`, `T | undefined`): `{ i1 present, ptr value }`,
//!   named `union.<T>|null`. Absence is the marker, never a null value
//!   pointer, so `T` may itself be nullable.
//! - **General**: one pointer slot per member, named after the members in
//!   declaration order (`union.number|string`). Object and interface
//!   members are flattened: each property gets its own slot, shared
//!   between members that declare the same property name. A null value of
//!   a nullable general union is the null record pointer.
//!
//! Slots are untagged: the static type at each use site decides which
//! slot is read.
//!
//! An `any` value is never a union record. A value leaving a union for
//! `any` is the member it holds, and an `any` value entering a union of
//! whole members is written to every member slot. Slots are all
//! pointer-sized, so whichever member a later use site reads finds the
//! value. Unions with flattened object members pass through `any` as the
//! record itself.

use rustc_hash::FxHashMap;
use tracing::trace;
use tsn_ir::TypeId;
use tsn_lir::{CmpPred, TyId, ValueId};

use crate::context::CodegenCx;
use crate::error::{CodegenError, CodegenResult};
use crate::lower::{FnLowerer, Lowered};
use crate::registry::{ShapeId, ShapeMeta, UnionMeta, UnionSlot};
use crate::type_info::TypeInfo;
use crate::type_mapper::TypeMapper;

impl CodegenCx<'_> {
    /// Lowered info of the union of `members`. Nullish members only make
    /// the union nullable; a single surviving member that is not nullable
    /// is the member itself.
    pub(crate) fn union_info(
        &mut self,
        members: &[TypeId],
        mapper: &TypeMapper,
    ) -> CodegenResult<TypeInfo> {
        let mut infos: Vec<TypeInfo> = Vec::with_capacity(members.len());
        let mut nullable = false;
        for &m in members {
            let info = if m.is_nullish() {
                TypeInfo::Null
            } else {
                self.to_info(m, mapper)?
            };
            if info.is_nullish() {
                nullable = true;
            } else if !infos.contains(&info) {
                infos.push(info);
            }
        }
        Ok(match infos.as_slice() {
            [] => TypeInfo::Null,
            [single] if !nullable => *single,
            _ => TypeInfo::Union(self.union_shape(&infos, nullable)),
        })
    }

    /// Register the union of non-nullish `members`.
    pub(crate) fn union_shape(&mut self, members: &[TypeInfo], nullable: bool) -> ShapeId {
        let names: Vec<String> = members.iter().map(|&m| self.info_name(m)).collect();
        let mut name = format!("union.{}", names.join("|"));
        if nullable {
            name.push_str("|null");
        }
        if let Some(id) = self.registry.shape_by_name(&name) {
            return id;
        }
        let optional = nullable && members.len() == 1;
        let mut slots: Vec<UnionSlot> = Vec::new();
        let mut props = FxHashMap::default();
        for (&member, label) in members.iter().zip(&names) {
            if let (false, TypeInfo::Object(s)) = (optional, member) {
                let fields = self
                    .registry
                    .object(s)
                    .map(|o| o.props.clone())
                    .unwrap_or_default();
                for (prop, info) in fields {
                    if props.contains_key(&prop) {
                        continue;
                    }
                    props.insert(prop, u32::try_from(slots.len()).unwrap_or(u32::MAX));
                    slots.push(UnionSlot {
                        key: info.shape_key(),
                        label: self.program.name(prop).to_owned(),
                        info,
                        prop: Some(prop),
                    });
                }
                continue;
            }
            let key = member.shape_key();
            if slots.iter().any(|s| s.prop.is_none() && s.key == key) {
                continue;
            }
            slots.push(UnionSlot {
                key,
                label: label.clone(),
                info: member,
                prop: None,
            });
        }
        let mut fields = Vec::with_capacity(slots.len() + 1);
        if optional {
            fields.push(TyId::I1);
        }
        fields.extend(std::iter::repeat(TyId::PTR).take(slots.len()));
        let record = self.module.types.named_struct(&name);
        self.module.types.set_struct_body(record, &fields);
        trace!(union = %name, slots = slots.len(), optional, "union shape");
        self.registry.register_shape(ShapeMeta::Union(UnionMeta {
            name,
            record,
            optional,
            members: members.to_vec(),
            slots,
            props,
        }))
    }

    pub(crate) fn union_meta(&self, shape: ShapeId) -> CodegenResult<&UnionMeta> {
        self.registry.union(shape).ok_or_else(|| {
            CodegenError::invalid(format!(
                "`{}` is not a union shape",
                self.registry.shape_name(shape)
            ))
        })
    }
}

impl FnLowerer<'_, '_> {
    /// Store `v` into a fresh record of union `target`.
    pub(crate) fn union_init(&mut self, v: Lowered, target: ShapeId) -> CodegenResult<Lowered> {
        let meta = self.cx.union_meta(target)?.clone();
        let info = TypeInfo::Union(target);
        if v.info == info {
            return Ok(v);
        }
        if v.info.is_nullish() {
            if meta.optional {
                let r = self.b.alloc(meta.record, "union.absent");
                return Ok(Lowered::boxed(r, info));
            }
            return Ok(self.null_value(info));
        }

        if v.info == TypeInfo::Opaque {
            return self.union_from_opaque(v, &meta, target);
        }

        if meta.optional {
            let member = meta.slots[0].info;
            let inner = if let TypeInfo::Union(source) = v.info {
                // `T|null` from a wider union: extract the member.
                self.union_extract(v, source, member)?
            } else {
                self.coerce(v, member)?
            };
            let value = self.boxed(inner);
            let r = self.b.alloc(meta.record, "union");
            let present = self.b.const_bool(true);
            let marker = self.b.struct_gep(meta.record, r, 0, "present.p");
            self.b.store(present, marker);
            self.store_field(meta.record, r, 1, value);
            return Ok(Lowered::boxed(r, info));
        }

        // Exact member.
        if let Some(slot) = meta.slot_for_key(v.info.shape_key()) {
            let value = self.boxed(v);
            return Ok(self.union_with(&meta, target, &[(slot, value)]));
        }

        // Union to union: carry over every slot both sides have.
        if let TypeInfo::Union(source) = v.info {
            let src = self.cx.union_meta(source)?.clone();
            let ptr = self.boxed(v);
            let mut moves = Vec::new();
            for (i, slot) in (0u32..).zip(&src.slots) {
                let dest = match slot.prop {
                    Some(p) => meta.slot_for_prop(p),
                    None => meta.slot_for_key(slot.key),
                };
                if let Some(dest) = dest {
                    let field = src.field_of_slot(i);
                    let value = self.load_field(src.record, ptr, field, &slot.label);
                    moves.push((dest, value));
                }
            }
            if moves.is_empty() {
                return Err(self.mismatch(info, v.info));
            }
            return Ok(self.union_with(&meta, target, &moves));
        }

        // Record-like values fill the slots of their properties.
        if let Some(fields) = self.named_field_values(v)? {
            let mut moves = Vec::new();
            for (name, field) in fields {
                if let Some(slot) = meta.slot_for_prop(name) {
                    let slot_info = meta.slots[slot as usize].info;
                    let value = self.coerce(field, slot_info)?;
                    moves.push((slot, self.boxed(value)));
                }
            }
            if !moves.is_empty() {
                return Ok(self.union_with(&meta, target, &moves));
            }
        }

        // Derived class into a base-class slot.
        if let TypeInfo::Class(class) = v.info {
            let chain = self.cx.program.class_chain(class)?;
            let slot = meta.slots.iter().position(|s| {
                s.prop.is_none() && matches!(s.info, TypeInfo::Class(c) if chain.contains(&c))
            });
            if let Some(slot) = slot {
                let slot = u32::try_from(slot).unwrap_or(u32::MAX);
                return Ok(self.union_with(&meta, target, &[(slot, v.value)]));
            }
        }

        Err(self.mismatch(info, v.info))
    }

    /// An `any` value as a union of `meta`'s shape. A null pointer is the
    /// absent or null union.
    fn union_from_opaque(
        &mut self,
        v: Lowered,
        meta: &UnionMeta,
        shape: ShapeId,
    ) -> CodegenResult<Lowered> {
        let info = TypeInfo::Union(shape);
        let p = self.boxed(v);
        if meta.has_property_slots() {
            let p = self.b.bitcast(p, TyId::PTR, "reinterpret");
            return Ok(Lowered::boxed(p, info));
        }
        let out = self.b.alloc(TyId::PTR, "union.any");
        let null = self.b.const_null();
        let is_null = self.b.cmp(CmpPred::Eq, p, null, "any.null");
        let fill = self.b.append_block("union.fill");
        let done = self.b.append_block("union.done");
        if meta.optional {
            let absent = self.b.alloc(meta.record, "union.absent");
            self.b.store(absent, out);
        }
        self.b.cond_br(is_null, done, fill);

        self.b.position_at_end(fill);
        let r = self.b.alloc(meta.record, "union");
        if meta.optional {
            let present = self.b.const_bool(true);
            let marker = self.b.struct_gep(meta.record, r, 0, "present.p");
            self.b.store(present, marker);
            self.store_field(meta.record, r, 1, p);
        } else {
            for slot in 0..meta.slot_count() {
                let index = self.b.const_i32(field_index(meta.field_of_slot(slot)));
                self.union_write_indexed(r, index, p);
            }
        }
        self.b.store(r, out);
        self.b.br(done);

        self.b.position_at_end(done);
        let r = self.b.load(TyId::PTR, out, "union");
        Ok(Lowered::boxed(r, info))
    }

    /// Store `value` into field `index` of the general union record at
    /// `union`. Every field of a general union is a pointer, so the record
    /// is addressed as a pointer array and `index` may be computed at run
    /// time.
    pub(crate) fn union_write_indexed(&mut self, union: ValueId, index: ValueId, value: ValueId) {
        let slot = self.b.index_gep(TyId::PTR, union, index, "union.slot");
        self.b.store(value, slot);
    }

    /// The member a union value holds, as an `any` value: the present value
    /// of an optional union, else the first filled slot. A null union is a
    /// null pointer.
    pub(crate) fn union_to_opaque(&mut self, v: Lowered, shape: ShapeId) -> CodegenResult<Lowered> {
        let meta = self.cx.union_meta(shape)?.clone();
        let ptr = self.boxed(v);
        if meta.has_property_slots() {
            return Ok(Lowered::boxed(ptr, TypeInfo::Opaque));
        }
        let out = self.b.alloc(TyId::PTR, "member");
        let null = self.b.const_null();
        let done = self.b.append_block("member.done");
        let read = self.b.append_block("member.read");
        let is_null = self.b.cmp(CmpPred::Eq, ptr, null, "union.null");
        self.b.cond_br(is_null, done, read);
        self.b.position_at_end(read);
        if meta.optional {
            let marker = self.b.struct_gep(meta.record, ptr, 0, "present.p");
            let present = self.b.load(TyId::I1, marker, "present");
            let take = self.b.append_block("member.take");
            self.b.cond_br(present, take, done);
            self.b.position_at_end(take);
            let value = self.load_field(meta.record, ptr, 1, "value");
            self.b.store(value, out);
        } else {
            for slot in 0..meta.slot_count() {
                let field = meta.field_of_slot(slot);
                let label = meta.slots[slot as usize].label.clone();
                let value = self.load_field(meta.record, ptr, field, &label);
                let filled = self.b.cmp(CmpPred::Ne, value, null, "filled");
                let take = self.b.append_block("member.take");
                let next = self.b.append_block("member.next");
                self.b.cond_br(filled, take, next);
                self.b.position_at_end(take);
                self.b.store(value, out);
                self.b.br(done);
                self.b.position_at_end(next);
            }
        }
        self.b.br(done);
        self.b.position_at_end(done);
        let member = self.b.load(TyId::PTR, out, "member");
        Ok(Lowered::boxed(member, TypeInfo::Opaque))
    }

    /// A fresh union record with the given slots filled.
    fn union_with(&mut self, meta: &UnionMeta, shape: ShapeId, moves: &[(u32, ValueId)]) -> Lowered {
        let r = self.b.alloc(meta.record, "union");
        for &(slot, value) in moves {
            self.store_field(meta.record, r, meta.field_of_slot(slot), value);
        }
        Lowered::boxed(r, TypeInfo::Union(shape))
    }

    /// Read member `target` out of a union value.
    pub(crate) fn union_extract(
        &mut self,
        v: Lowered,
        source: ShapeId,
        target: TypeInfo,
    ) -> CodegenResult<Lowered> {
        let meta = self.cx.union_meta(source)?.clone();
        if target == TypeInfo::Union(source) {
            return Ok(v);
        }
        if let TypeInfo::Union(wider) = target {
            return self.union_init(v, wider);
        }
        let ptr = self.boxed(v);

        if meta.optional {
            let member = meta.slots[0].info;
            if !meta.has_member(target) && !self.widens_to(member, target)? {
                return Err(CodegenError::unknown_union_member(
                    meta.name,
                    self.cx.info_name(target),
                ));
            }
            let value = self.load_field(meta.record, ptr, 1, "value");
            return self.coerce(Lowered::boxed(value, member), target);
        }

        if let Some(slot) = meta.slot_for_key(target.shape_key()) {
            let slot_info = meta.slots[slot as usize].info;
            let field = meta.field_of_slot(slot);
            let value = self.load_field(meta.record, ptr, field, &meta.slots[slot as usize].label);
            return self.coerce(Lowered::boxed(value, slot_info), target);
        }

        if let TypeInfo::Object(shape) = target {
            let obj = self.cx.object_meta(shape)?.clone();
            let all_present = obj
                .props
                .iter()
                .all(|&(p, _)| meta.slot_for_prop(p).is_some());
            if all_present {
                let r = self.b.alloc(obj.record, "union.obj");
                for (i, &(p, info)) in (0u32..).zip(&obj.props) {
                    let Some(slot) = meta.slot_for_prop(p) else {
                        continue;
                    };
                    let slot_info = meta.slots[slot as usize].info;
                    let field = meta.field_of_slot(slot);
                    let value = self.load_field(meta.record, ptr, field, self.name_str(p));
                    let value = self.coerce(Lowered::boxed(value, slot_info), info)?;
                    let value = self.boxed(value);
                    self.store_field(obj.record, r, i, value);
                }
                return Ok(Lowered::boxed(r, target));
            }
        }

        Err(CodegenError::unknown_union_member(
            meta.name,
            self.cx.info_name(target),
        ))
    }

    /// Whether a `from` value is usable where `to` is expected without
    /// leaving the union's member set.
    fn widens_to(&self, from: TypeInfo, to: TypeInfo) -> CodegenResult<bool> {
        Ok(match (from, to) {
            (TypeInfo::Class(f), TypeInfo::Class(t)) => self.cx.program.class_chain(f)?.contains(&t),
            (TypeInfo::Closure(_), TypeInfo::Closure(_)) | (_, TypeInfo::Opaque) => true,
            (TypeInfo::Object(_), TypeInfo::Object(_)) => true,
            _ => false,
        })
    }

    /// Presence marker of an optional union value, as an `i1`.
    pub(crate) fn union_is_present(&mut self, v: Lowered, shape: ShapeId) -> CodegenResult<ValueId> {
        let meta = self.cx.union_meta(shape)?;
        if !meta.optional {
            return Err(CodegenError::invalid(format!(
                "`{}` has no presence marker",
                meta.name
            )));
        }
        let record = meta.record;
        let ptr = self.boxed(v);
        let marker = self.b.struct_gep(record, ptr, 0, "present.p");
        Ok(self.b.load(TyId::I1, marker, "present"))
    }
}

fn field_index(field: u32) -> i32 {
    i32::try_from(field).unwrap_or(i32::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
