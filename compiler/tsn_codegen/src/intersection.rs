//! Intersection records.
//!
//! `A & B` is laid out as the concatenation of its members' fields, named
//! `A.B.intersection`. Each member owns a contiguous [`Segment`] of the
//! record, which is how a member is projected back out: find the one run
//! of fields shaped like the target, or the segment declared as it.
//!
//! [`Segment`]: crate::registry::Segment

use tracing::trace;
use tsn_ir::{Name, TypeId};
use tsn_lir::TyId;

use crate::context::CodegenCx;
use crate::error::{CodegenError, CodegenResult};
use crate::lower::{FnLowerer, Lowered};
use crate::registry::{IntersectionMeta, Segment, ShapeId, ShapeMeta};
use crate::type_info::TypeInfo;
use crate::type_mapper::TypeMapper;

impl CodegenCx<'_> {
    pub(crate) fn intersection_info(
        &mut self,
        members: &[TypeId],
        mapper: &TypeMapper,
    ) -> CodegenResult<TypeInfo> {
        let program = self.program;
        let mut fields: Vec<(Name, TypeInfo)> = Vec::new();
        let mut segments = Vec::with_capacity(members.len());
        for &m in members {
            let info = self.to_info(m, mapper)?;
            let own = self.member_fields(info)?;
            segments.push(Segment {
                name: program.type_name(m),
                member: info,
                start: index(fields.len()),
                len: index(own.len()),
            });
            fields.extend(own);
        }
        let names: Vec<&str> = segments.iter().map(|s| s.name.as_str()).collect();
        let name = format!("{}.intersection", names.join("."));
        if let Some(id) = self.registry.shape_by_name(&name) {
            return Ok(TypeInfo::Intersection(id));
        }
        let record = self.module.types.named_struct(&name);
        self.module
            .types
            .set_struct_body(record, &vec![TyId::PTR; fields.len()]);
        trace!(intersection = %name, fields = fields.len(), "intersection shape");
        Ok(TypeInfo::Intersection(self.registry.register_shape(
            ShapeMeta::Intersection(IntersectionMeta {
                name,
                record,
                fields,
                segments,
            }),
        )))
    }

    /// Fields a member contributes. Values without named fields contribute
    /// one unnamed field holding the value itself.
    pub(crate) fn member_fields(&mut self, info: TypeInfo) -> CodegenResult<Vec<(Name, TypeInfo)>> {
        Ok(match info {
            TypeInfo::Object(s) => self.object_meta(s)?.props.clone(),
            TypeInfo::Intersection(s) => self.intersection_meta(s)?.fields.clone(),
            TypeInfo::Class(c) => self
                .class_layout(c)?
                .props
                .iter()
                .map(|&(n, _, t)| (n, t))
                .collect(),
            other => vec![(Name::EMPTY, other)],
        })
    }

    pub(crate) fn intersection_meta(&self, shape: ShapeId) -> CodegenResult<&IntersectionMeta> {
        self.registry.intersection(shape).ok_or_else(|| {
            CodegenError::invalid(format!(
                "`{}` is not an intersection shape",
                self.registry.shape_name(shape)
            ))
        })
    }
}

fn index(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

impl FnLowerer<'_, '_> {
    /// Build an intersection record of shape `target` from `v`.
    pub(crate) fn intersection_init(&mut self, v: Lowered, target: ShapeId) -> CodegenResult<Lowered> {
        let meta = self.cx.intersection_meta(target)?.clone();
        let info = TypeInfo::Intersection(target);
        if v.info == info {
            return Ok(v);
        }
        if v.info.is_nullish() {
            return Ok(self.null_value(info));
        }

        if let TypeInfo::Intersection(source) = v.info {
            let src = self.cx.intersection_meta(source)?.clone();
            let ptr = self.boxed(v);
            // Segment by segment when every target member exists in the source.
            let pairs: Option<Vec<(&Segment, &Segment)>> = meta
                .segments
                .iter()
                .map(|t| {
                    src.segments
                        .iter()
                        .find(|s| s.member == t.member || s.name == t.name)
                        .filter(|s| s.len == t.len)
                        .map(|s| (t, s))
                })
                .collect();
            let moves: Vec<(u32, u32)> = match pairs {
                Some(pairs) => pairs
                    .iter()
                    .flat_map(|(t, s)| (0..t.len).map(move |i| (t.start + i, s.start + i)))
                    .collect(),
                None if src.fields.len() == meta.fields.len() => {
                    (0..index(meta.fields.len())).map(|i| (i, i)).collect()
                }
                None => return Err(self.mismatch(info, v.info)),
            };
            let r = self.b.alloc(meta.record, "intersection");
            for (dest, from) in moves {
                let value = self.load_field(src.record, ptr, from, "member");
                let value = Lowered::boxed(value, src.fields[from as usize].1);
                let value = self.coerce(value, meta.fields[dest as usize].1)?;
                let value = self.boxed(value);
                self.store_field(meta.record, r, dest, value);
            }
            return Ok(Lowered::boxed(r, info));
        }

        if let Some(source) = self.named_field_values(v)? {
            let by_name = meta
                .fields
                .iter()
                .all(|&(n, _)| n != Name::EMPTY && source.iter().any(|&(s, _)| s == n));
            let values: Vec<Lowered> = if by_name {
                meta.fields
                    .iter()
                    .filter_map(|&(n, _)| source.iter().find(|&&(s, _)| s == n).map(|&(_, v)| v))
                    .collect()
            } else if source.len() == meta.fields.len() {
                source.into_iter().map(|(_, v)| v).collect()
            } else {
                return Err(self.mismatch(info, v.info));
            };
            let r = self.b.alloc(meta.record, "intersection");
            for (i, (value, &(_, field))) in (0u32..).zip(values.into_iter().zip(&meta.fields)) {
                let value = self.coerce(value, field)?;
                let value = self.boxed(value);
                self.store_field(meta.record, r, i, value);
            }
            return Ok(Lowered::boxed(r, info));
        }

        if let [(_, field)] = meta.fields.as_slice() {
            let value = self.coerce(v, *field)?;
            let value = self.boxed(value);
            let r = self.b.alloc(meta.record, "intersection");
            self.store_field(meta.record, r, 0, value);
            return Ok(Lowered::boxed(r, info));
        }
        Err(self.mismatch(info, v.info))
    }

    /// Project member `target` out of an intersection value.
    pub(crate) fn intersection_extract(
        &mut self,
        v: Lowered,
        source: ShapeId,
        target: TypeInfo,
    ) -> CodegenResult<Lowered> {
        let meta = self.cx.intersection_meta(source)?.clone();
        if target == TypeInfo::Opaque {
            return Ok(Lowered::boxed(self.boxed(v), target));
        }
        let wanted = self.cx.member_fields(target)?;
        let Some(start) = self.find_member(&meta, target, &wanted) else {
            return Err(self.mismatch(target, v.info));
        };
        let ptr = self.boxed(v);

        if let [(Name::EMPTY, _)] = wanted.as_slice() {
            let value = self.load_field(meta.record, ptr, start, "member");
            let value = Lowered::boxed(value, meta.fields[start as usize].1);
            return self.coerce(value, target);
        }

        let (record, offset) = match target {
            TypeInfo::Object(s) => (self.cx.object_meta(s)?.record, 0),
            TypeInfo::Class(c) => {
                let layout = self.cx.class_layout(c)?;
                if layout.has_vptr {
                    return Err(CodegenError::unsupported(format!(
                        "projecting `{}` with a vtable out of `{}`",
                        self.cx.info_name(target),
                        meta.name
                    )));
                }
                (layout.record, 0)
            }
            TypeInfo::Intersection(s) => (self.cx.intersection_meta(s)?.record, 0),
            _ => return Err(self.mismatch(target, v.info)),
        };
        let r = self.b.alloc(record, "member");
        for (i, &(name, field_info)) in (0u32..).zip(&wanted) {
            let from = start + i;
            let value = self.load_field(meta.record, ptr, from, self.name_str(name));
            let value = Lowered::boxed(value, meta.fields[from as usize].1);
            let value = self.coerce(value, field_info)?;
            let value = self.boxed(value);
            self.store_field(record, r, offset + i, value);
        }
        Ok(Lowered::boxed(r, target))
    }

    /// First field of the member shaped like `target`: the unique run of
    /// fields with matching shape keys, else the segment declared as
    /// `target`.
    fn find_member(
        &self,
        meta: &IntersectionMeta,
        target: TypeInfo,
        wanted: &[(Name, TypeInfo)],
    ) -> Option<u32> {
        let len = wanted.len();
        if len > 0 && len <= meta.fields.len() {
            let runs: Vec<usize> = (0..=meta.fields.len() - len)
                .filter(|&s| {
                    meta.fields[s..s + len]
                        .iter()
                        .zip(wanted)
                        .all(|(a, b)| a.1.shape_key() == b.1.shape_key())
                })
                .collect();
            if let [only] = runs.as_slice() {
                return Some(index(*only));
            }
        }
        let target_name = self.cx.info_name(target);
        meta.segments
            .iter()
            .find(|s| s.member == target)
            .or_else(|| meta.segment(&target_name))
            .filter(|s| s.len as usize == len)
            .map(|s| s.start)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
