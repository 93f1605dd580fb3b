//! Compiling declarations into LIR functions.
//!
//! A declaration is compiled once per [`FnKey`]: the subject, the class
//! `this` is compiled for, the parameter representations and the visible
//! type bindings. Every compiled body has the signature `ptr (ptr env)`.
//!
//! Compilation is on demand: the entry body is lowered first, and each
//! call site compiles its callee the first time it sees a new key. The
//! key is inserted before the body is lowered so recursive calls find it.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use tracing::debug;
use tsn_ir::{Body, DeclId, FunctionKind, Name, TsType};
use tsn_lir::{CmpPred, FuncId, FunctionBody, FunctionBuilder, TyId, ValueId};

use crate::context::{CodegenCx, DeclSite};
use crate::environment::free_vars::forwarded_params;
use crate::environment::{environment_for, SlotName, SlotOrigin};
use crate::error::{CodegenError, CodegenErrorKind, CodegenResult};
use crate::lower::{CurrentEnv, FnLowerer, Lowered, ReturnKind};
use crate::registry::EnvId;
use crate::resolver::qualified_name;
use crate::scope::{Scope, ScopeBinding};
use crate::type_info::{ClosureInfo, ShapeKey, TypeInfo};
use crate::type_mapper::TypeMapper;

/// What a compiled body implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum FnSubject {
    Function(DeclId),
    /// Constructor synthesized for a class that declares none.
    ImplicitCtor(DeclId),
}

impl FnSubject {
    pub fn decl(self) -> DeclId {
        match self {
            FnSubject::Function(d) | FnSubject::ImplicitCtor(d) => d,
        }
    }
}

/// Identity of one specialization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct FnKey {
    pub subject: FnSubject,
    pub this_class: Option<DeclId>,
    pub params: Vec<TypeInfo>,
    pub bindings: Vec<(Name, ShapeKey)>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CompiledFn {
    pub func: FuncId,
    pub env: EnvId,
    pub params: Vec<TypeInfo>,
    /// Declared return info, else the info of the first `return`.
    pub ret: TypeInfo,
}

/// A key together with the bindings its body is lowered under.
pub(crate) struct Specialization {
    pub key: FnKey,
    pub mapper: Rc<TypeMapper>,
}

// ---------------------------------------------------------------------------
// Specialization
// ---------------------------------------------------------------------------

/// Bind the type parameters of `subject` from the argument infos and
/// compute its parameter infos.
///
/// A type parameter is bound by the first argument whose parameter is
/// declared as exactly that parameter. One left unbound is an error.
pub(crate) fn specialize(
    cx: &mut CodegenCx<'_>,
    subject: FnSubject,
    this_class: Option<DeclId>,
    args: &[TypeInfo],
) -> CodegenResult<Specialization> {
    let program = cx.program;
    let decl = subject.decl();
    let site = cx.site_of(decl)?;
    let (params, type_params): (Vec<DeclId>, &[Name]) = match subject {
        FnSubject::Function(d) => {
            let f = program.function(d)?;
            (f.params.clone(), &f.type_params)
        }
        FnSubject::ImplicitCtor(c) => (forwarded_params(program, c)?, &[]),
    };

    let label = symbol_base(cx, subject);
    let mut mapper = TypeMapper::child_for(&site.mapper, &label);
    for (&p, &arg) in params.iter().zip(args) {
        if let TsType::TypeParam(t) = program.types.get(program.param(p)?.ty) {
            if type_params.contains(t) && !mapper.binds(*t) {
                mapper.bind(*t, arg, program.name(*t))?;
            }
        }
    }
    if let Some(&unbound) = type_params.iter().find(|&&t| !mapper.binds(t)) {
        return Err(CodegenError::bare(CodegenErrorKind::GenericBindingUnavailable {
            decl: label,
            param: program.name(unbound).to_owned(),
        }));
    }
    let mapper = Rc::new(mapper);

    let mut infos = Vec::with_capacity(params.len());
    for (i, &p) in params.iter().enumerate() {
        let declared = cx.to_info(program.param(p)?.ty, &mapper)?;
        infos.push(match args.get(i) {
            Some(&arg) => param_info(declared, arg),
            None => declared,
        });
    }
    let key = FnKey {
        subject,
        this_class,
        params: infos,
        bindings: mapper.chain_key(),
    };
    Ok(Specialization { key, mapper })
}

/// Representation a parameter is compiled with, given its declared info
/// and the argument passed. `any` parameters and untyped callbacks take
/// the argument's representation.
pub(crate) fn param_info(declared: TypeInfo, arg: TypeInfo) -> TypeInfo {
    match (declared, arg) {
        (TypeInfo::Opaque, arg) if !arg.is_nullish() => arg,
        (TypeInfo::Closure(d), TypeInfo::Closure(a)) => TypeInfo::Closure(ClosureInfo {
            sig: a.sig.or(d.sig),
            ..a
        }),
        (TypeInfo::Closure(d), TypeInfo::LazyClosure(_)) if d.sig.is_none() => arg,
        _ => declared,
    }
}

/// Base of the symbol name of a compiled body.
fn symbol_base(cx: &CodegenCx<'_>, subject: FnSubject) -> String {
    let program = cx.program;
    match subject {
        FnSubject::Function(d) if program.decl_name(d).is_empty() => format!("arrow.{}", d.raw()),
        FnSubject::Function(d) => qualified_name(program, d),
        FnSubject::ImplicitCtor(c) => format!("{}.constructor", program.decl_name(c)),
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile `spec`, or return the body already compiled for its key.
pub(crate) fn compile_function(
    cx: &mut CodegenCx<'_>,
    spec: Specialization,
) -> CodegenResult<CompiledFn> {
    if let Some(done) = cx.functions.get(&spec.key) {
        return Ok(done.clone());
    }
    let program = cx.program;
    let subject = spec.key.subject;
    let decl = subject.decl();
    let env = environment_for(cx, decl)?;

    let owner = match subject {
        FnSubject::Function(d) => program.function(d)?.owner,
        FnSubject::ImplicitCtor(c) => Some(c),
    };
    let mut symbol = symbol_base(cx, subject);
    if let Some(this_class) = spec.key.this_class.filter(|&c| Some(c) != owner) {
        symbol = format!("{symbol}@{}", program.decl_name(this_class));
    }
    let func = cx
        .module
        .declare_unique_function(&symbol, &[TyId::PTR], TyId::PTR);
    cx.compiled.insert(func);

    let ret_kind = return_kind(cx, subject, &spec.mapper)?;
    let placeholder = match ret_kind {
        ReturnKind::Value {
            declared: Some(d), ..
        } => d,
        ReturnKind::Value { .. } => TypeInfo::Opaque,
        ReturnKind::Entry | ReturnKind::Discard => TypeInfo::Void,
    };
    let mut compiled = CompiledFn {
        func,
        env,
        params: spec.key.params.clone(),
        ret: placeholder,
    };
    cx.functions.insert(spec.key.clone(), compiled.clone());

    let (body, ret_kind) = lower_body(cx, &spec, func, env, owner, ret_kind)?;
    cx.module.define_function(func, body);
    compiled.ret = match ret_kind {
        ReturnKind::Value { declared, inferred } => {
            declared.or(inferred).unwrap_or(TypeInfo::Void)
        }
        ReturnKind::Entry | ReturnKind::Discard => TypeInfo::Void,
    };
    if let Some(entry) = cx.functions.get_mut(&spec.key) {
        entry.ret = compiled.ret;
    }
    debug!(
        function = %symbol,
        params = ?compiled.params,
        ret = ?compiled.ret,
        "function compiled"
    );
    Ok(compiled)
}

fn return_kind(
    cx: &mut CodegenCx<'_>,
    subject: FnSubject,
    mapper: &TypeMapper,
) -> CodegenResult<ReturnKind> {
    let FnSubject::Function(d) = subject else {
        return Ok(ReturnKind::Discard);
    };
    let f = cx.program.function(d)?;
    if matches!(f.kind, FunctionKind::Constructor | FunctionKind::Setter) {
        return Ok(ReturnKind::Discard);
    }
    let declared = match f.ret {
        Some(ty) => Some(cx.to_info(ty, mapper)?),
        None => None,
    };
    Ok(ReturnKind::Value {
        declared,
        inferred: None,
    })
}

fn lower_body(
    cx: &mut CodegenCx<'_>,
    spec: &Specialization,
    func: FuncId,
    env: EnvId,
    owner: Option<DeclId>,
    ret: ReturnKind,
) -> CodegenResult<(FunctionBody, ReturnKind)> {
    let program = cx.program;
    let subject = spec.key.subject;
    let site = cx.site_of(subject.decl())?;
    let scope = site.scope.declaration_view().over(&cx.module_scope);

    let mut lw = FnLowerer::new(
        cx,
        FunctionBuilder::new(func, &[TyId::PTR]),
        scope,
        Rc::clone(&spec.mapper),
        ret,
    );
    lw.this_class = spec.key.this_class.or(site.this_class);
    lw.member_owner = match subject {
        FnSubject::Function(d) if program.function(d)?.kind.is_member() => owner,
        // Arrows inside members resolve `super` like their enclosing body.
        FnSubject::Function(_) => site.this_class,
        FnSubject::ImplicitCtor(c) => Some(c),
    };
    lw.prologue(env, &spec.key.params, &site)?;

    match subject {
        FnSubject::Function(d) => {
            let f = program.function(d)?;
            lw.run_defaults(&f.params)?;
            if f.kind == FunctionKind::Constructor {
                if let Some(owner) = f.owner {
                    if program.class(owner)?.base.is_none() {
                        lw.run_initializers(owner)?;
                    }
                }
            }
            match &f.body {
                Some(Body::Block(stmts)) => lw.lower_block(stmts)?,
                Some(Body::Expr(e)) => {
                    let value = lw.lower_expr(*e)?;
                    lw.emit_return(Some(value))?;
                }
                None => {
                    return Err(CodegenError::invalid(format!(
                        "`{}` has no body to compile",
                        program.decl_name(d)
                    )))
                }
            }
        }
        FnSubject::ImplicitCtor(c) => lw.lower_implicit_ctor(c)?,
    }
    if !lw.b.is_terminated() {
        lw.emit_return(None)?;
    }
    Ok(lw.finish())
}

// ---------------------------------------------------------------------------
// Prologue
// ---------------------------------------------------------------------------

impl FnLowerer<'_, '_> {
    /// Bind every environment slot: parameter and capture cells become
    /// variables, the `this` slot becomes the receiver.
    pub(crate) fn prologue(
        &mut self,
        env_id: EnvId,
        params: &[TypeInfo],
        site: &DeclSite,
    ) -> CodegenResult<()> {
        let env = self.cx.env(env_id)?.clone();
        let ptr = self.b.param(0);
        self.env = Some(CurrentEnv { id: env_id, ptr });
        let param_names: FxHashSet<SlotName> = env
            .slots
            .iter()
            .filter(|s| s.origin == SlotOrigin::Param)
            .map(|s| s.name)
            .collect();
        for (i, slot) in env.indexed_slots() {
            match slot.name {
                SlotName::This => {
                    let this = self.load_field(env.record, ptr, i, "this");
                    let info = self.this_class.map_or(slot.info, TypeInfo::Class);
                    self.this = Some(Lowered::boxed(this, info));
                }
                SlotName::Named(name) => {
                    let cell = self.load_field(env.record, ptr, i, self.name_str(name));
                    let (info, by_name) = match slot.origin {
                        SlotOrigin::Param => {
                            (params.get(i as usize).copied().unwrap_or(slot.info), true)
                        }
                        SlotOrigin::Capture | SlotOrigin::Outer => {
                            let known = match slot.var {
                                Some(var) => site.scope.variable(var),
                                None => site.scope.lookup(name),
                            };
                            let info = match known {
                                Some(ScopeBinding::Variable { info, .. }) => info,
                                _ => slot.info,
                            };
                            // Shadowed at the site: reachable by identity only.
                            let visible = !param_names.contains(&slot.name)
                                && (slot.var.is_none()
                                    || site.scope.declaration_of(name) == slot.var);
                            (info, visible)
                        }
                        SlotOrigin::This => (slot.info, true),
                    };
                    match (slot.var, by_name) {
                        (Some(var), true) => self.scope.bind_declared(name, var, cell, info),
                        (Some(var), false) => self.scope.bind_hidden(var, cell, info),
                        (None, true) => self.scope.bind_variable(name, cell, info),
                        (None, false) => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate default values of parameters the caller left out.
    pub(crate) fn run_defaults(&mut self, params: &[DeclId]) -> CodegenResult<()> {
        let program = self.cx.program;
        for &p in params {
            let Some(default) = program.param(p)?.default else {
                continue;
            };
            let name = program.decl(p)?.name;
            let Some(ScopeBinding::Variable { cell, info }) = self.scope.lookup(name) else {
                continue;
            };
            let current = self.b.load(TyId::PTR, cell, self.name_str(name));
            let absent = self.is_absent(Lowered::boxed(current, info))?;
            let fill = self.b.append_block("default");
            let done = self.b.append_block("param.ok");
            self.b.cond_br(absent, fill, done);
            self.b.position_at_end(fill);
            let value = self.lower_expr(default)?;
            let value = self.coerce(value, info)?;
            let value = self.boxed(value);
            self.b.store(value, cell);
            self.b.br(done);
            self.b.position_at_end(done);
        }
        Ok(())
    }

    /// `i1` that is true when `v` holds no value.
    pub(crate) fn is_absent(&mut self, v: Lowered) -> CodegenResult<ValueId> {
        if let TypeInfo::Union(shape) = v.info {
            if self.cx.union_meta(shape)?.optional {
                let present = self.union_is_present(v, shape)?;
                return Ok(self.b.not(present, "absent"));
            }
        }
        let p = self.boxed(v);
        let null = self.b.const_null();
        Ok(self.b.cmp(CmpPred::Eq, p, null, "absent"))
    }
}

/// Compile the top-level statements into the entry function.
pub(crate) fn compile_entry(cx: &mut CodegenCx<'_>) -> CodegenResult<FuncId> {
    let program = cx.program;
    let name = cx.config.entry_name.clone();
    let func = cx.module.declare_function(&name, &[], TyId::VOID);
    let mut lw = FnLowerer::new(
        cx,
        FunctionBuilder::new(func, &[]),
        Scope::new(),
        TypeMapper::root(),
        ReturnKind::Entry,
    );
    lw.is_entry = true;
    lw.lower_block(&program.entry)?;
    if !lw.b.is_terminated() {
        lw.b.ret(None);
    }
    let (body, _) = lw.finish();
    cx.module.define_function(func, body);
    debug!(entry = %name, statements = program.entry.len(), "entry compiled");
    Ok(func)
}
