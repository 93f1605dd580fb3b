//! Calls: direct, native, virtual, static and through values.
//!
//! A call to a declaration asks the resolver first. Native targets are
//! called by symbol with `(this?, args...)`; everything else is
//! specialized for the argument infos, compiled on demand and entered
//! with a freshly filled environment record.

use tracing::trace;
use tsn_ir::{DeclFlags, DeclId, ExprId, ExprKind, FunctionKind, Name};
use tsn_lir::ValueId;

use super::{FnLowerer, Lowered};
use crate::environment::{Environment, SlotName, SlotOrigin};
use crate::error::{CodegenError, CodegenResult};
use crate::function_compiler::{compile_function, specialize, CompiledFn, FnSubject};
use crate::scope::ScopeBinding;
use crate::type_info::TypeInfo;

impl FnLowerer<'_, '_> {
    pub(crate) fn lower_call(
        &mut self,
        callee: ExprId,
        args: &[ExprId],
        target: Option<DeclId>,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        match &program.expr(callee).kind {
            ExprKind::Super => {
                let args = self.lower_args(args)?;
                self.call_base_ctor(args)
            }
            ExprKind::Property { object, name } => self.lower_member_call(*object, *name, args),
            ExprKind::Ident(name) => match self.lookup(*name) {
                Some(ScopeBinding::Function(decl)) => {
                    let args = self.lower_args(args)?;
                    self.call_decl(decl, None, args)
                }
                Some(ScopeBinding::Variable { .. } | ScopeBinding::Global { .. }) => {
                    let f = self.lower_ident(*name)?;
                    let args = self.lower_args(args)?;
                    self.call_value(f, args, None)
                }
                Some(ScopeBinding::Class(_)) => Err(CodegenError::unsupported(format!(
                    "calling class `{}` without `new`",
                    self.name_str(*name)
                ))),
                // Ambient functions are resolved by the front end only.
                None => match target {
                    Some(decl) => {
                        let args = self.lower_args(args)?;
                        self.call_decl(decl, None, args)
                    }
                    None => Err(CodegenError::invalid(format!(
                        "`{}` is used before its declaration",
                        self.name_str(*name)
                    ))),
                },
            },
            _ => {
                let f = self.lower_expr(callee)?;
                let args = self.lower_args(args)?;
                self.call_value(f, args, None)
            }
        }
    }

    /// `recv.name(args)`: `super.m()`, `Class.m()`, a method of a class
    /// instance, or a function-valued property.
    fn lower_member_call(
        &mut self,
        object: ExprId,
        name: Name,
        args: &[ExprId],
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        match &program.expr(object).kind {
            ExprKind::Super => {
                let args = self.lower_args(args)?;
                return self.call_super_method(name, args);
            }
            ExprKind::Ident(n) => {
                if let Some(ScopeBinding::Class(class)) = self.lookup(*n) {
                    let args = self.lower_args(args)?;
                    return self.call_static_method(class, name, args);
                }
            }
            _ => {}
        }

        let recv = self.lower_expr(object)?;
        let recv = self.to_boxed(recv);
        if let TypeInfo::Class(class) = recv.info {
            let chain = program.class_chain(class)?;
            if let Some(m) = program.find_function_in(&chain, name, &[FunctionKind::Method])? {
                let args = self.lower_args(args)?;
                if let Some(slot) = self.virtual_slot(class, m)? {
                    return self.virtual_call(recv, class, m, slot, args);
                }
                return self.call_decl(m, Some((recv, class)), args);
            }
        }
        let f = self.read_property(recv, name)?;
        let args = self.lower_args(args)?;
        self.call_value(f, args, None)
    }

    /// Call declaration `decl`, with `this` and the class it is compiled
    /// for when it is an instance member.
    pub(crate) fn call_decl(
        &mut self,
        decl: DeclId,
        this: Option<(Lowered, DeclId)>,
        args: Vec<Lowered>,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let f = program.function(decl)?;
        let infos: Vec<TypeInfo> = args.iter().map(|a| a.info).collect();
        let resolution =
            self.cx
                .resolver
                .resolve(program, decl, &infos, this.map(|(t, _)| t.info));
        if resolution.is_external_symbol {
            return self.call_external(decl, &resolution.qualified_name, this.map(|(t, _)| t), args);
        }
        if f.body.is_none() {
            return Err(CodegenError::invalid(format!(
                "`{}` has no body and no native symbol",
                resolution.qualified_name
            )));
        }
        let spec = specialize(self.cx, FnSubject::Function(decl), this.map(|(_, c)| c), &infos)?;
        let compiled = compile_function(self.cx, spec)?;
        let this = match this {
            Some((t, _)) => Some(self.boxed(t)),
            // Static members have a receiver slot but no receiver.
            None if program.decl(decl)?.flags.contains(DeclFlags::STATIC) => {
                Some(self.b.const_null())
            }
            None => None,
        };
        self.invoke_compiled(&compiled, this, args)
    }

    /// Call a native symbol with `(this?, args...)`. Arguments take the
    /// declared parameter representations; generic parameters pass as-is.
    pub(crate) fn call_external(
        &mut self,
        decl: DeclId,
        symbol: &str,
        this: Option<Lowered>,
        args: Vec<Lowered>,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let f = program.function(decl)?;
        let generic = f.is_generic();
        let mut values = Vec::with_capacity(f.params.len() + 1);
        if let Some(t) = this {
            values.push(self.boxed(t));
        }
        let mut args = args.into_iter();
        for &p in &f.params {
            let ty = program.param(p)?.ty;
            let info = if generic || program.types.mentions_type_param(ty) {
                TypeInfo::Opaque
            } else {
                self.to_info(ty)?
            };
            let value = match args.next() {
                Some(a) => self.coerce(a, info)?,
                None => {
                    let null = self.null_value(TypeInfo::Null);
                    self.coerce(null, info)?
                }
            };
            values.push(self.boxed(value));
        }
        let func = self.cx.external_function(symbol, values.len())?;
        let r = self.call_ptr(func, &values, "native");
        let ret = match f.ret {
            Some(ty) if !generic && !program.types.mentions_type_param(ty) => self.to_info(ty)?,
            _ => TypeInfo::Opaque,
        };
        trace!(symbol, args = values.len(), "native call");
        Ok(Lowered::boxed(r, ret))
    }

    /// Allocate and fill the environment of `compiled`, then call it.
    pub(crate) fn invoke_compiled(
        &mut self,
        compiled: &CompiledFn,
        this: Option<ValueId>,
        args: Vec<Lowered>,
    ) -> CodegenResult<Lowered> {
        let env = self.cx.env(compiled.env)?.clone();
        let env_ptr = self.b.alloc(env.record, "env");
        self.write_args(&env, env_ptr, &compiled.params, args)?;
        self.fill_captures(&env, env_ptr)?;
        self.fill_this(&env, env_ptr, this)?;
        let r = self.call_ptr(compiled.func, &[env_ptr], "call");
        Ok(Lowered::boxed(r, compiled.ret))
    }

    /// Fill the capture and outer slots of `env` from this body.
    ///
    /// An outer slot is copied from the current environment when `env` was
    /// laid out inside it; otherwise, like a capture, it is looked up by the
    /// `let` or parameter that declares it, whatever the name means here.
    /// A capture that is not reachable from here cannot be filled.
    pub(crate) fn fill_captures(&mut self, env: &Environment, env_ptr: ValueId) -> CodegenResult<()> {
        for (i, slot) in env.indexed_slots() {
            let SlotName::Named(name) = slot.name else {
                continue;
            };
            match slot.origin {
                SlotOrigin::Param | SlotOrigin::This => continue,
                SlotOrigin::Outer => {
                    let current = self.env.filter(|cur| Some(cur.id) == env.outer);
                    if let (Some(cur), Some(from)) = (current, env.outer_slot_for(i)) {
                        let record = self.cx.env(cur.id)?.record;
                        let value = self.load_field(record, cur.ptr, from, self.name_str(name));
                        self.store_field(env.record, env_ptr, i, value);
                        continue;
                    }
                }
                SlotOrigin::Capture => {}
            }
            let found = match slot.var {
                Some(var) => self.scope.variable(var),
                None => self.lookup(name),
            };
            match found {
                Some(ScopeBinding::Variable { cell, .. }) => {
                    self.store_field(env.record, env_ptr, i, cell);
                }
                Some(ScopeBinding::Global { global, .. }) => {
                    let addr = self.b.const_global(global);
                    self.store_field(env.record, env_ptr, i, addr);
                }
                _ if slot.origin == SlotOrigin::Outer => {}
                _ => return Err(CodegenError::unresolved_capture(self.name_str(name))),
            }
        }
        Ok(())
    }

    /// `Class.m(args)`: a static method found along the class chain.
    fn call_static_method(
        &mut self,
        class: DeclId,
        name: Name,
        args: Vec<Lowered>,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let chain = program.class_chain(class)?;
        let method = program
            .find_function_in(&chain, name, &[FunctionKind::Method])?
            .filter(|&m| {
                program
                    .decl(m)
                    .is_ok_and(|d| d.flags.contains(DeclFlags::STATIC))
            });
        match method {
            Some(m) => self.call_decl(m, None, args),
            None => {
                let f = self.read_static(class, name)?;
                self.call_value(f, args, None)
            }
        }
    }

    /// `super.m(args)`: the base implementation, dispatched statically.
    fn call_super_method(&mut self, name: Name, args: Vec<Lowered>) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let owner = self
            .member_owner
            .ok_or_else(|| CodegenError::unsupported("`super` outside a class member"))?;
        let chain = program.class_chain(owner)?;
        let method = program
            .find_function_in(chain.get(1..).unwrap_or(&[]), name, &[FunctionKind::Method])?
            .ok_or_else(|| {
                CodegenError::invalid(format!(
                    "no base class of `{}` has a method `{}`",
                    program.decl_name(owner),
                    program.name(name)
                ))
            })?;
        let this = self.lower_this()?;
        let this_class = self.this_class.unwrap_or(owner);
        self.call_decl(method, Some((this, this_class)), args)
    }
}
