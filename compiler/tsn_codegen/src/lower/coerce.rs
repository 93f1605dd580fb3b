//! Representation changes between [`TypeInfo`]s.
//!
//! Every assignment, argument, return and property store goes through
//! [`FnLowerer::coerce`]. Most conversions are free (the value pointer is
//! reused under a new info); unions, intersections, object copies and
//! lazy closures build new records.

use tsn_lir::TyId;

use super::{FnLowerer, Lowered};
use crate::error::{CodegenError, CodegenResult};
use crate::type_info::{ClosureInfo, TypeInfo};

impl FnLowerer<'_, '_> {
    /// Convert `v` to the representation of `target`.
    pub(crate) fn coerce(&mut self, v: Lowered, target: TypeInfo) -> CodegenResult<Lowered> {
        if v.info == target {
            return Ok(v);
        }
        match (v.info, target) {
            (_, TypeInfo::Void) => Ok(v),
            (TypeInfo::Union(shape), TypeInfo::Opaque) => self.union_to_opaque(v, shape),
            (_, TypeInfo::Opaque) => Ok(Lowered::boxed(self.boxed(v), TypeInfo::Opaque)),
            (_, TypeInfo::Union(shape)) => self.union_init(v, shape),
            (TypeInfo::Opaque, _) => {
                // Nothing is known about the pointer: trust the target.
                let p = self.boxed(v);
                let p = self.b.bitcast(p, TyId::PTR, "reinterpret");
                Ok(Lowered::boxed(p, target))
            }
            (TypeInfo::Union(shape), _) => self.union_extract(v, shape, target),
            (_, TypeInfo::Intersection(shape)) => self.intersection_init(v, shape),
            (TypeInfo::Intersection(shape), _) => self.intersection_extract(v, shape, target),
            (source, _) if source.is_nullish() => Ok(self.null_value(target)),
            (TypeInfo::Class(from), TypeInfo::Class(to)) => {
                let program = self.cx.program;
                let related = program.class_chain(from)?.contains(&to)
                    || program.class_chain(to)?.contains(&from);
                if related {
                    Ok(Lowered::boxed(v.value, target))
                } else {
                    Err(self.mismatch(target, v.info))
                }
            }
            (TypeInfo::Object(_) | TypeInfo::Class(_), TypeInfo::Object(shape)) => {
                self.copy_into_object(v, shape)
            }
            (TypeInfo::Closure(from), TypeInfo::Closure(to)) => Ok(Lowered::boxed(
                v.value,
                TypeInfo::Closure(ClosureInfo {
                    sig: from.sig.or(to.sig),
                    ..from
                }),
            )),
            (TypeInfo::LazyClosure(decl), TypeInfo::Closure(to)) => match to.sig {
                Some(sig) => self.specialize_lazy(v, decl, sig),
                None => Ok(v),
            },
            _ => Err(self.mismatch(target, v.info)),
        }
    }

    pub(crate) fn mismatch(&self, expected: TypeInfo, found: TypeInfo) -> CodegenError {
        CodegenError::shape_mismatch(self.cx.info_name(expected), self.cx.info_name(found))
    }
}
