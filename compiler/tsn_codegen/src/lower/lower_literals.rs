//! Literals, identifiers, `this` and object literals.

use tsn_ir::{ExprId, Name};
use tsn_lir::TyId;

use super::{FnLowerer, Lowered};
use crate::error::{CodegenError, CodegenResult};
use crate::scope::ScopeBinding;
use crate::type_info::TypeInfo;

impl FnLowerer<'_, '_> {
    pub(crate) fn lower_number(&mut self, n: f64) -> Lowered {
        Lowered::raw(self.b.const_f64(n), TypeInfo::Number)
    }

    pub(crate) fn lower_string(&mut self, s: Name) -> Lowered {
        let text = self.name_str(s);
        Lowered::raw(self.b.const_str(text), TypeInfo::String)
    }

    pub(crate) fn lower_bool(&mut self, v: bool) -> Lowered {
        Lowered::raw(self.b.const_bool(v), TypeInfo::Boolean)
    }

    /// Resolve `name` in the body's scope, then among module bindings
    /// that appeared after the body's scope was captured.
    pub(crate) fn lookup(&self, name: Name) -> Option<ScopeBinding> {
        self.scope
            .lookup(name)
            .or_else(|| self.cx.module_scope.lookup(name))
    }

    pub(crate) fn lower_ident(&mut self, name: Name) -> CodegenResult<Lowered> {
        let text = self.name_str(name);
        match self.lookup(name) {
            Some(ScopeBinding::Variable { cell, info }) => {
                Ok(Lowered::boxed(self.b.load(TyId::PTR, cell, text), info))
            }
            Some(ScopeBinding::Global { global, info }) => {
                let addr = self.b.const_global(global);
                Ok(Lowered::boxed(self.b.load(TyId::PTR, addr, text), info))
            }
            Some(ScopeBinding::Function(decl)) => self.lower_function_value(decl),
            Some(ScopeBinding::Class(_)) => Err(CodegenError::unsupported(format!(
                "class `{text}` used as a value"
            ))),
            None => Err(CodegenError::invalid(format!(
                "`{text}` is used before its declaration"
            ))),
        }
    }

    pub(crate) fn lower_this(&mut self) -> CodegenResult<Lowered> {
        self.this
            .ok_or_else(|| CodegenError::unresolved_capture("this"))
    }

    /// `{ a: e1, b: e2 }` allocates an `object.*` record shaped by the
    /// values' infos.
    pub(crate) fn lower_object_literal(
        &mut self,
        fields: &[(Name, ExprId)],
    ) -> CodegenResult<Lowered> {
        let mut values: Vec<(Name, Lowered)> = Vec::with_capacity(fields.len());
        for &(name, e) in fields {
            let v = self.lower_expr(e)?;
            let v = self.to_boxed(v);
            match values.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = v,
                None => values.push((name, v)),
            }
        }
        let props = values.iter().map(|&(n, v)| (n, v.info)).collect();
        let shape = self.cx.object_shape(props);
        let record = self.cx.object_meta(shape)?.record;
        let obj = self.b.alloc(record, "obj");
        for (i, &(_, v)) in (0u32..).zip(values.iter()) {
            self.store_field(record, obj, i, v.value);
        }
        Ok(Lowered::boxed(obj, TypeInfo::Object(shape)))
    }
}
