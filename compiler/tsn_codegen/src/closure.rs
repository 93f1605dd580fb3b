//! Closure values.
//!
//! A closure is a `closure { ptr code, ptr env }` record. Calling one
//! writes fresh argument cells into the parameter prefix of its
//! environment and enters `__tsn.closure.call`, which passes the
//! environment to the code.
//!
//! Generic function values are *lazy*: a `lazy_closure { ptr env }`
//! record with filled captures but no code. Each call infers the type
//! bindings from its arguments, compiles (or reuses) the specialization
//! for them, and wraps it around the lazy environment. Specializations for
//! different bindings never share code.

use tracing::{debug, trace};
use tsn_ir::{DeclId, TsType, TypeId};
use tsn_lir::{FuncId, TyId, ValueId};

use crate::environment::{environment_for, Environment};
use crate::error::{CodegenError, CodegenResult};
use crate::function_compiler::{compile_function, specialize, CompiledFn, FnSubject};
use crate::lower::{FnLowerer, Lowered};
use crate::registry::ClosureMeta;
use crate::type_info::{ClosureInfo, TypeInfo};

impl FnLowerer<'_, '_> {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Wrap `code` and a filled environment into a closure record.
    pub(crate) fn make_closure(
        &mut self,
        code: FuncId,
        env_ptr: ValueId,
        meta: ClosureMeta,
        sig: Option<TypeId>,
    ) -> CodegenResult<Lowered> {
        let rt = self.cx.rt;
        let env = meta.env;
        self.cx.registry.bind_closure(code, meta)?;
        let clo = self.b.alloc(rt.closure, "closure");
        let code_ptr = self.b.const_fn(code);
        self.store_field(rt.closure, clo, 0, code_ptr);
        self.store_field(rt.closure, clo, 1, env_ptr);
        trace!(code = code.raw(), env = env.raw(), "closure created");
        Ok(Lowered::boxed(
            clo,
            TypeInfo::Closure(ClosureInfo {
                sig,
                code: Some(code),
                env: Some(env),
            }),
        ))
    }

    /// Allocate the environment of `compiled` filled from this body, and
    /// make a closure of it. `this` fills the receiver slot, if any.
    pub(crate) fn closure_of(
        &mut self,
        compiled: &CompiledFn,
        decl: DeclId,
        this: Option<ValueId>,
    ) -> CodegenResult<Lowered> {
        let env = self.cx.env(compiled.env)?.clone();
        let env_ptr = self.b.alloc(env.record, "env");
        self.fill_captures(&env, env_ptr)?;
        self.fill_this(&env, env_ptr, this)?;
        self.make_closure(
            compiled.func,
            env_ptr,
            ClosureMeta {
                decl: Some(decl),
                env: compiled.env,
                params: compiled.params.clone(),
                ret: compiled.ret,
            },
            None,
        )
    }

    /// Store the receiver into the `this` slot of `env`. A slot with no
    /// receiver available is an unresolved capture of `this`.
    pub(crate) fn fill_this(
        &mut self,
        env: &Environment,
        env_ptr: ValueId,
        this: Option<ValueId>,
    ) -> CodegenResult<()> {
        let Some(slot) = env.this_slot() else {
            return Ok(());
        };
        let this = match this {
            Some(t) => t,
            None => {
                let current = self
                    .this
                    .ok_or_else(|| CodegenError::unresolved_capture("this"))?;
                self.boxed(current)
            }
        };
        self.store_field(env.record, env_ptr, slot, this);
        Ok(())
    }

    /// A lazy closure over generic `decl`: captures are filled now, code is
    /// chosen per call.
    pub(crate) fn make_lazy(&mut self, decl: DeclId) -> CodegenResult<Lowered> {
        let env_id = environment_for(self.cx, decl)?;
        let env = self.cx.env(env_id)?.clone();
        let env_ptr = self.b.alloc(env.record, "env");
        self.fill_captures(&env, env_ptr)?;
        self.fill_this(&env, env_ptr, None)?;
        let rt = self.cx.rt;
        let lazy = self.b.alloc(rt.lazy, "lazy");
        self.store_field(rt.lazy, lazy, 0, env_ptr);
        debug!(decl = %self.cx.info_name(TypeInfo::LazyClosure(decl)), "lazy closure created");
        Ok(Lowered::boxed(lazy, TypeInfo::LazyClosure(decl)))
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Call any callable value.
    pub(crate) fn call_value(
        &mut self,
        f: Lowered,
        args: Vec<Lowered>,
        this: Option<ValueId>,
    ) -> CodegenResult<Lowered> {
        match f.info {
            TypeInfo::Closure(info) => self.closure_call(f, info, args, this),
            TypeInfo::LazyClosure(decl) => self.lazy_call(f, decl, args, this),
            TypeInfo::Opaque => self.closure_call(f, ClosureInfo::default(), args, this),
            other => Err(CodegenError::unsupported(format!(
                "calling a value of type `{}`",
                self.cx.info_name(other)
            ))),
        }
    }

    /// Call through a closure record. The environment layout comes from
    /// the closure's known code, else its known environment, else its
    /// signature, else the arguments: every layout starts with the same
    /// parameter prefix.
    pub(crate) fn closure_call(
        &mut self,
        f: Lowered,
        info: ClosureInfo,
        args: Vec<Lowered>,
        this: Option<ValueId>,
    ) -> CodegenResult<Lowered> {
        let known = info.code.and_then(|c| self.cx.registry.closure(c)).cloned();
        let (env_id, params, ret) = match (known, info.env, info.sig) {
            (Some(meta), _, _) => (meta.env, meta.params, meta.ret),
            (None, Some(env), sig) => {
                let params = self.cx.env(env)?.param_infos();
                let ret = match sig {
                    Some(sig) => self.sig_infos(sig)?.1,
                    None => TypeInfo::Opaque,
                };
                (env, params, ret)
            }
            (None, None, Some(sig)) => {
                let (params, ret) = self.sig_infos(sig)?;
                let env = self.cx.synthetic_env(index(params.len()));
                (env, params, ret)
            }
            (None, None, None) => {
                let env = self.cx.synthetic_env(index(args.len()));
                (env, vec![TypeInfo::Opaque; args.len()], TypeInfo::Opaque)
            }
        };
        let env = self.cx.env(env_id)?.clone();
        let rt = self.cx.rt;
        let clo = self.boxed(f);
        let env_ptr = self.load_field(rt.closure, clo, 1, "env");
        self.write_args(&env, env_ptr, &params, args)?;
        if let (Some(slot), Some(this)) = (env.this_slot(), this) {
            self.store_field(env.record, env_ptr, slot, this);
        }
        let r = self.call_ptr(rt.call, &[clo], "call");
        Ok(Lowered::boxed(r, ret))
    }

    /// Write fresh argument cells into the parameter prefix of `env`.
    /// Missing arguments are null, coerced to their parameter.
    pub(crate) fn write_args(
        &mut self,
        env: &Environment,
        env_ptr: ValueId,
        params: &[TypeInfo],
        args: Vec<Lowered>,
    ) -> CodegenResult<()> {
        let mut args = args.into_iter();
        for i in 0..env.param_count {
            let info = params.get(i as usize).copied().unwrap_or(TypeInfo::Opaque);
            let value = match args.next() {
                Some(a) => self.coerce(a, info)?,
                None => {
                    let null = self.null_value(TypeInfo::Null);
                    self.coerce(null, info)?
                }
            };
            let value = self.boxed(value);
            let cell = self.new_cell(value, "arg");
            self.store_field(env.record, env_ptr, i, cell);
        }
        Ok(())
    }

    /// Parameter and return infos of a concrete function type.
    pub(crate) fn sig_infos(&mut self, sig: TypeId) -> CodegenResult<(Vec<TypeInfo>, TypeInfo)> {
        let program = self.cx.program;
        let TsType::Function(f) = program.types.get(sig) else {
            return Err(CodegenError::invalid(format!(
                "`{}` is not a function type",
                program.type_name(sig)
            )));
        };
        let mut params = Vec::with_capacity(f.params.len());
        for &p in &f.params {
            params.push(self.to_info(p)?);
        }
        Ok((params, self.to_info(f.ret)?))
    }

    /// Call a lazy closure: bind its type parameters from the arguments,
    /// then call the specialization with the lazy environment.
    pub(crate) fn lazy_call(
        &mut self,
        f: Lowered,
        decl: DeclId,
        args: Vec<Lowered>,
        this: Option<ValueId>,
    ) -> CodegenResult<Lowered> {
        let infos: Vec<TypeInfo> = args.iter().map(|a| a.info).collect();
        let spec = specialize(self.cx, FnSubject::Function(decl), None, &infos)?;
        debug!(
            decl = %self.cx.info_name(TypeInfo::LazyClosure(decl)),
            bindings = ?spec.key.bindings,
            "lazy specialization"
        );
        let compiled = compile_function(self.cx, spec)?;
        let clo = self.closure_from_lazy(f, decl, &compiled, None)?;
        let Lowered {
            info: TypeInfo::Closure(info),
            ..
        } = clo
        else {
            return Err(CodegenError::invalid("lazy closure did not produce a closure"));
        };
        self.closure_call(clo, info, args, this)
    }

    /// Specialize a lazy closure for the concrete signature `sig`, as when
    /// a generic function is passed where a concrete callback is expected.
    pub(crate) fn specialize_lazy(
        &mut self,
        f: Lowered,
        decl: DeclId,
        sig: TypeId,
    ) -> CodegenResult<Lowered> {
        let (params, _) = self.sig_infos(sig)?;
        let spec = specialize(self.cx, FnSubject::Function(decl), None, &params)?;
        let compiled = compile_function(self.cx, spec)?;
        self.closure_from_lazy(f, decl, &compiled, Some(sig))
    }

    fn closure_from_lazy(
        &mut self,
        f: Lowered,
        decl: DeclId,
        compiled: &CompiledFn,
        sig: Option<TypeId>,
    ) -> CodegenResult<Lowered> {
        let rt = self.cx.rt;
        let lazy = self.boxed(f);
        let env_ptr = self.load_field(rt.lazy, lazy, 0, "env");
        self.make_closure(
            compiled.func,
            env_ptr,
            ClosureMeta {
                decl: Some(decl),
                env: compiled.env,
                params: compiled.params.clone(),
                ret: compiled.ret,
            },
            sig,
        )
    }

    /// Direct call returning a pointer.
    pub(crate) fn call_ptr(&mut self, func: FuncId, args: &[ValueId], name: &str) -> ValueId {
        match self.b.call(func, TyId::PTR, args, name) {
            Some(v) => v,
            None => self.b.const_null(),
        }
    }
}

fn index(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
