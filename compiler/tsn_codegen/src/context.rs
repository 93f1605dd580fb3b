//! Per-unit code generation state.
//!
//! [`CodegenCx`] owns the module under construction, the meta-registry and
//! every cache keyed by declaration identity. One context compiles one
//! program; nothing outlives it.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;
use tsn_ir::{DeclFlags, DeclId, Name, Program, TsType, TypeId};
use tsn_lir::{ConstInit, FuncId, FunctionBuilder, GlobalId, Module, TyId};

use crate::config::CodegenConfig;
use crate::environment::Environment;
use crate::error::{CodegenError, CodegenErrorKind, CodegenResult};
use crate::function_compiler::{CompiledFn, FnKey};
use crate::registry::{EnvId, MetaRegistry};
use crate::resolver::ForeignSymbolResolver;
use crate::scope::Scope;
use crate::type_info::{ClosureInfo, TypeInfo};
use crate::type_mapper::TypeMapper;
use crate::vtable::VTable;

/// Where a declaration was declared: what its body can see.
#[derive(Clone, Debug)]
pub struct DeclSite {
    /// Scope at the declaration, refreshed as later `let`s come into view.
    pub scope: Scope,
    /// Environment of the function the declaration is nested in.
    pub outer: Option<EnvId>,
    /// Class `this` refers to at the declaration.
    pub this_class: Option<DeclId>,
    pub mapper: Rc<TypeMapper>,
}

/// Record layout of a class instance.
#[derive(Clone, Debug)]
pub struct ClassLayout {
    pub record: TyId,
    /// Field 0 holds the vtable pointer.
    pub has_vptr: bool,
    /// Instance properties of the whole chain, base-most first.
    pub props: Vec<(Name, DeclId, TypeInfo)>,
}

impl ClassLayout {
    /// Record field and static info of property `name`.
    pub fn field_of(&self, name: Name) -> Option<(u32, TypeInfo)> {
        let i = self.props.iter().position(|&(n, _, _)| n == name)?;
        let offset = u32::from(self.has_vptr);
        Some((u32::try_from(i).ok()? + offset, self.props[i].2))
    }
}

/// Types and helpers every unit needs.
#[derive(Clone, Copy, Debug)]
pub struct Runtime {
    /// `closure { ptr code, ptr env }`
    pub closure: TyId,
    /// `lazy_closure { ptr env }`
    pub lazy: TyId,
    /// `ptr (ptr env)`, the signature of every compiled body.
    pub body_sig: TyId,
    /// `__tsn.closure.call(ptr closure) -> ptr`
    pub call: FuncId,
}

pub struct CodegenCx<'p> {
    pub program: &'p Program,
    pub module: Module,
    pub registry: MetaRegistry,
    pub resolver: &'p dyn ForeignSymbolResolver,
    pub config: CodegenConfig,
    pub(crate) rt: Runtime,
    /// Module-level bindings, growing as top-level statements are lowered.
    pub(crate) module_scope: Scope,
    pub(crate) sites: FxHashMap<DeclId, DeclSite>,
    pub(crate) functions: FxHashMap<FnKey, CompiledFn>,
    pub(crate) compiled: FxHashSet<FuncId>,
    pub(crate) layouts: FxHashMap<DeclId, ClassLayout>,
    pub(crate) vtables: FxHashMap<DeclId, VTable>,
    pub(crate) statics: FxHashMap<DeclId, GlobalId>,
    /// `(class, method)` → trampoline of an override.
    pub(crate) overrides: FxHashMap<(DeclId, Name), FuncId>,
    pub(crate) synthetic_envs: FxHashMap<u32, EnvId>,
    interfaces_in_progress: FxHashSet<DeclId>,
}

impl<'p> CodegenCx<'p> {
    pub fn new(
        program: &'p Program,
        resolver: &'p dyn ForeignSymbolResolver,
        config: CodegenConfig,
    ) -> Self {
        let mut module = Module::new("tsn");
        let rt = declare_runtime(&mut module);
        CodegenCx {
            program,
            module,
            registry: MetaRegistry::new(),
            resolver,
            config,
            rt,
            module_scope: Scope::new(),
            sites: FxHashMap::default(),
            functions: FxHashMap::default(),
            compiled: FxHashSet::default(),
            layouts: FxHashMap::default(),
            vtables: FxHashMap::default(),
            statics: FxHashMap::default(),
            overrides: FxHashMap::default(),
            synthetic_envs: FxHashMap::default(),
            interfaces_in_progress: FxHashSet::default(),
        }
    }

    /// The finished module and the registry describing its records.
    pub fn finish(self) -> (Module, MetaRegistry) {
        (self.module, self.registry)
    }

    // ── Declaration sites ───────────────────────────────────────────

    pub(crate) fn record_site(&mut self, decl: DeclId, site: DeclSite) {
        self.sites.insert(decl, site);
    }

    /// Site of `decl`. Class members and property initializers share
    /// their class's site.
    pub(crate) fn site_of(&self, decl: DeclId) -> CodegenResult<DeclSite> {
        if let Some(site) = self.sites.get(&decl) {
            return Ok(site.clone());
        }
        let owner = match &self.program.decl(decl)?.kind {
            tsn_ir::DeclKind::Function(f) => f.owner,
            tsn_ir::DeclKind::Property(p) => Some(p.owner),
            _ => None,
        };
        owner
            .and_then(|o| self.sites.get(&o))
            .cloned()
            .ok_or_else(|| {
                CodegenError::invalid(format!(
                    "`{}` is used before its declaration is in scope",
                    self.program.decl_name(decl)
                ))
            })
    }

    // ── Naming ──────────────────────────────────────────────────────

    /// `base`, or `base.N` if a named struct of that name exists.
    pub(crate) fn unique_struct_name(&self, base: &str) -> String {
        if self.module.types.lookup_named(base).is_none() {
            return base.to_owned();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{base}.{n}");
            if self.module.types.lookup_named(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Human-readable name of a lowered type, used in shape names and
    /// diagnostics.
    pub fn info_name(&self, info: TypeInfo) -> String {
        match info {
            TypeInfo::Void => "void".to_owned(),
            TypeInfo::Number => "number".to_owned(),
            TypeInfo::Boolean => "boolean".to_owned(),
            TypeInfo::String => "string".to_owned(),
            TypeInfo::Null => "null".to_owned(),
            TypeInfo::Opaque => "any".to_owned(),
            TypeInfo::Object(s) | TypeInfo::Union(s) | TypeInfo::Intersection(s) => {
                self.registry.shape_name(s).to_owned()
            }
            TypeInfo::Class(d) => self.program.decl_name(d).to_owned(),
            TypeInfo::Closure(c) => c
                .sig
                .map_or_else(|| "closure".to_owned(), |t| self.program.type_name(t)),
            TypeInfo::LazyClosure(d) => {
                let name = self.program.decl_name(d);
                if name.is_empty() {
                    "generic arrow".to_owned()
                } else {
                    format!("generic {name}")
                }
            }
        }
    }

    // ── Type lowering ───────────────────────────────────────────────

    /// Lowered descriptor of a TS type under `mapper`'s bindings.
    pub fn to_info(&mut self, ty: TypeId, mapper: &TypeMapper) -> CodegenResult<TypeInfo> {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || self.to_info_inner(ty, mapper))
    }

    fn to_info_inner(&mut self, ty: TypeId, mapper: &TypeMapper) -> CodegenResult<TypeInfo> {
        let program = self.program;
        Ok(match program.types.get(ty) {
            TsType::Number => TypeInfo::Number,
            TsType::Boolean => TypeInfo::Boolean,
            TsType::String => TypeInfo::String,
            TsType::Void => TypeInfo::Void,
            TsType::Null | TsType::Undefined => TypeInfo::Null,
            TsType::Any => TypeInfo::Opaque,
            TsType::Class(d) => TypeInfo::Class(*d),
            TsType::Interface(d) => {
                // A self-referential interface sees itself as opaque.
                if !self.interfaces_in_progress.insert(*d) {
                    return Ok(TypeInfo::Opaque);
                }
                let fields = program.interface_fields(*d);
                let info = fields
                    .map_err(CodegenError::from)
                    .and_then(|f| self.object_from_types(&f, mapper));
                self.interfaces_in_progress.remove(d);
                info?
            }
            TsType::Object(fields) => self.object_from_types(fields, mapper)?,
            TsType::Union(members) => self.union_info(members, mapper)?,
            TsType::Intersection(members) => self.intersection_info(members, mapper)?,
            TsType::Function(_) => TypeInfo::Closure(ClosureInfo {
                sig: (!program.types.mentions_type_param(ty)).then_some(ty),
                ..ClosureInfo::default()
            }),
            TsType::TypeParam(name) => mapper.lookup(*name).ok_or_else(|| {
                CodegenError::bare(CodegenErrorKind::GenericBindingUnavailable {
                    decl: mapper.owner().to_owned(),
                    param: program.name(*name).to_owned(),
                })
            })?,
        })
    }

    fn object_from_types(
        &mut self,
        fields: &[(Name, TypeId)],
        mapper: &TypeMapper,
    ) -> CodegenResult<TypeInfo> {
        let mut props = Vec::with_capacity(fields.len());
        for &(name, ty) in fields {
            props.push((name, self.to_info(ty, mapper)?));
        }
        Ok(TypeInfo::Object(self.object_shape(props)))
    }

    // ── Classes ─────────────────────────────────────────────────────

    pub(crate) fn class_layout(&mut self, class: DeclId) -> CodegenResult<ClassLayout> {
        if let Some(layout) = self.layouts.get(&class) {
            return Ok(layout.clone());
        }
        let program = self.program;
        let chain = program.class_chain(class)?;
        let mut has_vptr = false;
        for &c in &chain {
            has_vptr |= program.decl(c)?.flags.contains(DeclFlags::VTABLE);
        }
        let mut props = Vec::new();
        for p in program.instance_properties(class)? {
            let ty = program.property(p)?.ty;
            let info = if program.types.mentions_type_param(ty) {
                TypeInfo::Opaque
            } else {
                self.to_info(ty, &TypeMapper::default())?
            };
            props.push((program.decl(p)?.name, p, info));
        }
        let name = self.unique_struct_name(&format!("class.{}", program.decl_name(class)));
        let record = self.module.types.named_struct(&name);
        let fields = vec![TyId::PTR; props.len() + usize::from(has_vptr)];
        self.module.types.set_struct_body(record, &fields);
        trace!(class = %name, fields = fields.len(), has_vptr, "class layout");
        let layout = ClassLayout {
            record,
            has_vptr,
            props,
        };
        self.layouts.insert(class, layout.clone());
        Ok(layout)
    }

    /// Global backing static property `prop`.
    pub(crate) fn static_global(&mut self, prop: DeclId) -> CodegenResult<GlobalId> {
        if let Some(&g) = self.statics.get(&prop) {
            return Ok(g);
        }
        let owner = self.program.property(prop)?.owner;
        let name = format!(
            "static.{}.{}",
            self.program.decl_name(owner),
            self.program.decl_name(prop)
        );
        let g = self
            .module
            .add_global(&name, TyId::PTR, false, ConstInit::Zero);
        self.statics.insert(prop, g);
        Ok(g)
    }

    // ── Functions ───────────────────────────────────────────────────

    /// Declaration of a native function taking `arity` pointers.
    pub(crate) fn external_function(&mut self, name: &str, arity: usize) -> CodegenResult<FuncId> {
        if let Some(f) = self.module.function_by_name(name) {
            if self.compiled.contains(&f) {
                return Err(CodegenError::invalid(format!(
                    "`{name}` is both compiled and provided by the object-code base"
                )));
            }
            return Ok(f);
        }
        Ok(self
            .module
            .declare_function(name, &vec![TyId::PTR; arity], TyId::PTR))
    }

    /// Parameter-prefix layout for calling closures of unknown origin.
    pub(crate) fn synthetic_env(&mut self, params: u32) -> EnvId {
        if let Some(&env) = self.synthetic_envs.get(&params) {
            return env;
        }
        let record = self
            .module
            .types
            .literal_struct(&vec![TyId::PTR; params as usize]);
        let env = self
            .registry
            .add_env(Environment::synthesized(params, record));
        self.synthetic_envs.insert(params, env);
        env
    }

    pub(crate) fn env(&self, id: EnvId) -> CodegenResult<&Environment> {
        self.registry
            .env(id)
            .ok_or_else(|| CodegenError::invalid(format!("environment #{} is not registered", id.raw())))
    }
}

/// Declare the closure runtime: record types and the call trampoline
/// `__tsn.closure.call`, which loads the code pointer and environment out
/// of a closure record and calls the code with the environment.
fn declare_runtime(module: &mut Module) -> Runtime {
    let closure = module.types.named_struct("closure");
    module
        .types
        .set_struct_body(closure, &[TyId::PTR, TyId::PTR]);
    let lazy = module.types.named_struct("lazy_closure");
    module.types.set_struct_body(lazy, &[TyId::PTR]);
    let body_sig = module.types.func(&[TyId::PTR], TyId::PTR);

    let call = module.declare_function("__tsn.closure.call", &[TyId::PTR], TyId::PTR);
    let mut b = FunctionBuilder::new(call, &[TyId::PTR]);
    let code_p = b.struct_gep(closure, b.param(0), 0, "code.p");
    let code = b.load(TyId::PTR, code_p, "code");
    let env_p = b.struct_gep(closure, b.param(0), 1, "env.p");
    let env = b.load(TyId::PTR, env_p, "env");
    let r = b.call_indirect(body_sig, TyId::PTR, code, &[env], "r");
    b.ret(r);
    module.define_function(call, b.finish());

    Runtime {
        closure,
        lazy,
        body_sig,
        call,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
