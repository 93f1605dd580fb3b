//! Anonymous objects and interfaces.
//!
//! An object type is a record of value pointers, one per property, named
//! after its property list: `object.{x:number,y:string}`. Interfaces and
//! object literals with the same property list share one shape.
//!
//! Object-to-object coercion copies by property name, so a value can be
//! passed where a narrower or reordered shape is expected.

use tracing::trace;
use tsn_ir::Name;
use tsn_lir::TyId;

use crate::context::CodegenCx;
use crate::error::{CodegenError, CodegenResult};
use crate::lower::{FnLowerer, Lowered};
use crate::registry::{ObjectMeta, ShapeId, ShapeMeta};
use crate::type_info::TypeInfo;

impl CodegenCx<'_> {
    /// Shape of an object with `props`, registered on first use.
    pub(crate) fn object_shape(&mut self, props: Vec<(Name, TypeInfo)>) -> ShapeId {
        let inner: Vec<String> = props
            .iter()
            .map(|&(n, info)| format!("{}:{}", self.program.name(n), self.info_name(info)))
            .collect();
        let name = format!("object.{{{}}}", inner.join(","));
        if let Some(id) = self.registry.shape_by_name(&name) {
            return id;
        }
        let record = self.module.types.named_struct(&name);
        self.module
            .types
            .set_struct_body(record, &vec![TyId::PTR; props.len()]);
        trace!(shape = %name, props = props.len(), "object shape");
        self.registry.register_shape(ShapeMeta::Object(ObjectMeta {
            name,
            record,
            props,
        }))
    }

    pub(crate) fn object_meta(&self, shape: ShapeId) -> CodegenResult<&ObjectMeta> {
        self.registry.object(shape).ok_or_else(|| {
            CodegenError::invalid(format!(
                "`{}` is not an object shape",
                self.registry.shape_name(shape)
            ))
        })
    }

    /// Named fields of a record-like value type, in record order. Fields
    /// of intersection members that are not objects have no name and are
    /// skipped.
    pub(crate) fn named_fields_of(
        &mut self,
        info: TypeInfo,
    ) -> CodegenResult<Option<Vec<(Name, u32, TypeInfo)>>> {
        let numbered = |props: &[(Name, TypeInfo)], offset: u32| -> Vec<(Name, u32, TypeInfo)> {
            (offset..)
                .zip(props)
                .filter(|(_, field)| field.0 != Name::EMPTY)
                .map(|(i, &(n, t))| (n, i, t))
                .collect()
        };
        Ok(match info {
            TypeInfo::Object(s) => Some(numbered(&self.object_meta(s)?.props, 0)),
            TypeInfo::Intersection(s) => {
                let meta = self.intersection_meta(s)?;
                Some(numbered(&meta.fields, 0))
            }
            TypeInfo::Class(c) => {
                let layout = self.class_layout(c)?;
                let props: Vec<(Name, TypeInfo)> =
                    layout.props.iter().map(|&(n, _, t)| (n, t)).collect();
                Some(numbered(&props, u32::from(layout.has_vptr)))
            }
            _ => None,
        })
    }

    /// Record type of a record-like value.
    pub(crate) fn record_of(&mut self, info: TypeInfo) -> CodegenResult<Option<TyId>> {
        Ok(match info {
            TypeInfo::Object(s) | TypeInfo::Union(s) | TypeInfo::Intersection(s) => {
                self.registry.shape(s).map(ShapeMeta::record)
            }
            TypeInfo::Class(c) => Some(self.class_layout(c)?.record),
            _ => None,
        })
    }
}

/// A property stored directly in a record field.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldRef {
    pub record: TyId,
    pub index: u32,
    pub info: TypeInfo,
}

impl FnLowerer<'_, '_> {
    /// Where property `name` of a value of type `info` is stored, if it is
    /// a plain field.
    pub(crate) fn field_ref(&mut self, info: TypeInfo, name: Name) -> CodegenResult<Option<FieldRef>> {
        if let TypeInfo::Union(s) = info {
            let meta = self.cx.union_meta(s)?;
            return Ok(meta.slot_for_prop(name).map(|slot| FieldRef {
                record: meta.record,
                index: meta.field_of_slot(slot),
                info: meta.slots[slot as usize].info,
            }));
        }
        let Some(record) = self.cx.record_of(info)? else {
            return Ok(None);
        };
        let fields = self.cx.named_fields_of(info)?.unwrap_or_default();
        Ok(fields
            .into_iter()
            .find(|&(n, _, _)| n == name)
            .map(|(_, index, info)| FieldRef {
                record,
                index,
                info,
            }))
    }

    /// Load every named field of `v`.
    pub(crate) fn named_field_values(
        &mut self,
        v: Lowered,
    ) -> CodegenResult<Option<Vec<(Name, Lowered)>>> {
        let Some(fields) = self.cx.named_fields_of(v.info)? else {
            return Ok(None);
        };
        let Some(record) = self.cx.record_of(v.info)? else {
            return Ok(None);
        };
        let ptr = self.boxed(v);
        let mut out = Vec::with_capacity(fields.len());
        for (name, index, info) in fields {
            let text = self.name_str(name);
            let value = self.load_field(record, ptr, index, text);
            out.push((name, Lowered::boxed(value, info)));
        }
        Ok(Some(out))
    }

    /// Copy `v` into a fresh record of object shape `target`, property by
    /// property. Properties `v` lacks are null.
    pub(crate) fn copy_into_object(&mut self, v: Lowered, target: ShapeId) -> CodegenResult<Lowered> {
        let meta = self.cx.object_meta(target)?.clone();
        let Some(source) = self.named_field_values(v)? else {
            return Err(CodegenError::shape_mismatch(
                meta.name,
                self.cx.info_name(v.info),
            ));
        };
        let obj = self.b.alloc(meta.record, "obj.copy");
        for (i, &(name, info)) in (0u32..).zip(meta.props.iter()) {
            let value = match source.iter().find(|(n, _)| *n == name) {
                Some(&(_, field)) => self.coerce(field, info)?,
                None => {
                    let null = self.null_value(TypeInfo::Null);
                    self.coerce(null, info)?
                }
            };
            let p = self.boxed(value);
            self.store_field(meta.record, obj, i, p);
        }
        Ok(Lowered::boxed(obj, TypeInfo::Object(target)))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
