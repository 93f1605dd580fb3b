//! Function values: literals, named functions used as values, bound
//! methods and static methods taken as values.

use tsn_ir::DeclId;
use tsn_lir::ValueId;

use super::{FnLowerer, Lowered};
use crate::error::{CodegenError, CodegenResult};
use crate::function_compiler::{compile_function, specialize, FnSubject};

impl FnLowerer<'_, '_> {
    /// A closure over function declaration or literal `decl`, filled from
    /// this body. Generic functions become lazy closures.
    pub(crate) fn lower_function_value(&mut self, decl: DeclId) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let f = program.function(decl)?;
        if f.kind.is_literal() {
            let site = self.current_site();
            self.cx.record_site(decl, site);
        }
        if f.body.is_none() {
            return Err(CodegenError::unsupported(format!(
                "native function `{}` used as a value",
                program.decl_name(decl)
            )));
        }
        if f.is_generic() {
            return self.make_lazy(decl);
        }
        let spec = specialize(self.cx, FnSubject::Function(decl), None, &[])?;
        let compiled = compile_function(self.cx, spec)?;
        self.closure_of(&compiled, decl, None)
    }

    /// `recv.m` read as a value: a closure with `recv` in its receiver
    /// slot, compiled for `class`.
    pub(crate) fn lower_bound_method(
        &mut self,
        recv: Lowered,
        class: DeclId,
        method: DeclId,
    ) -> CodegenResult<Lowered> {
        let this = self.boxed(recv);
        self.method_closure(method, Some(class), this)
    }

    /// A static method read as a value; its receiver is null.
    pub(crate) fn lower_static_method_value(&mut self, method: DeclId) -> CodegenResult<Lowered> {
        let null = self.b.const_null();
        self.method_closure(method, None, null)
    }

    fn method_closure(
        &mut self,
        method: DeclId,
        class: Option<DeclId>,
        this: ValueId,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let resolution = self.cx.resolver.resolve(program, method, &[], None);
        let f = program.function(method)?;
        if resolution.is_external_symbol || f.body.is_none() {
            return Err(CodegenError::unsupported(format!(
                "native method `{}` used as a value",
                resolution.qualified_name
            )));
        }
        let spec = specialize(self.cx, FnSubject::Function(method), class, &[])?;
        let compiled = compile_function(self.cx, spec)?;
        self.closure_of(&compiled, method, Some(this))
    }
}
