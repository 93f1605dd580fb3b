//! Environment layout construction.
//!
//! The free names of a declaration are resolved against the scope
//! recorded at its declaration site:
//!
//! - a local variable of an enclosing function becomes a capture slot;
//! - module globals, classes and unknown-at-runtime names need no slot;
//! - a function declaration contributes the captures *it* needs, since
//!   calling it from this body means filling its environment from here.
//!   The same holds for `new C` (constructor and initializers), `super(...)`
//!   and `this.m()`. Such pulled names resolve at the callee's own site and
//!   are kept by declaring `let` or parameter, so a local of the caller
//!   with the same name does not stand in for them.

use rustc_hash::FxHashSet;
use tracing::debug;
use tsn_ir::{DeclId, DeclKind, FunctionKind, Name};
use tsn_lir::TyId;

use super::free_vars::{self, forwarded_params, Ref, Unit};
use super::{EnvSlot, Environment, SlotName, SlotOrigin};
use crate::context::{CodegenCx, DeclSite};
use crate::error::{CodegenError, CodegenResult};
use crate::registry::EnvId;
use crate::resolver::qualified_name;
use crate::scope::ScopeBinding;
use crate::type_info::TypeInfo;
use crate::type_mapper::TypeMapper;

const MEMBER_KINDS: &[FunctionKind] = &[
    FunctionKind::Method,
    FunctionKind::Getter,
    FunctionKind::Setter,
];

/// Environment layout of `owner`: a function declaration, or a class for
/// its implicit constructor. Built on first request, cached afterwards.
pub(crate) fn environment_for(cx: &mut CodegenCx<'_>, owner: DeclId) -> CodegenResult<EnvId> {
    if let Some(env) = cx.registry.decl_env(owner) {
        return Ok(env);
    }
    let program = cx.program;
    let site = cx.site_of(owner)?;
    let decl = program.decl(owner)?;
    let (unit, params, member_of, label) = match &decl.kind {
        DeclKind::Class(_) => (
            Unit::ImplicitCtor(owner),
            forwarded_params(program, owner)?,
            Some(owner),
            format!("{}.constructor", program.decl_name(owner)),
        ),
        DeclKind::Function(f) => {
            let label = if program.name(decl.name).is_empty() {
                format!("arrow.{}", owner.raw())
            } else {
                qualified_name(program, owner)
            };
            let member_of = if f.kind.is_member() { f.owner } else { None };
            (Unit::Function(owner), f.params.clone(), member_of, label)
        }
        _ => {
            return Err(CodegenError::invalid(format!(
                "`{}` has no environment",
                program.decl_name(owner)
            )))
        }
    };
    let context_class = member_of.or(site.this_class);

    let found = free_vars::collect(program, unit)?;
    let mut acc = Accumulator {
        cx,
        site: &site,
        locals: &found.locals,
        local_decls: &found.local_decls,
        captures: Vec::new(),
        needs_this: false,
        visited: std::iter::once(owner).collect(),
    };
    for &r in &found.refs {
        acc.visit(r, context_class, &Origin::Own)?;
    }
    let Accumulator {
        captures,
        needs_this,
        ..
    } = acc;

    let mut slots = Vec::with_capacity(params.len() + captures.len() + 1);
    for &p in &params {
        let ty = program.param(p)?.ty;
        let info = if program.types.mentions_type_param(ty) {
            TypeInfo::Opaque
        } else {
            cx.to_info(ty, &TypeMapper::default())?
        };
        slots.push(EnvSlot {
            name: SlotName::Named(program.decl(p)?.name),
            info,
            origin: SlotOrigin::Param,
            var: Some(p),
        });
    }
    let capture_count = captures.len();
    for c in captures {
        slots.push(EnvSlot {
            name: SlotName::Named(c.name),
            info: c.info,
            origin: SlotOrigin::Capture,
            var: c.var,
        });
    }
    if member_of.is_some() || needs_this {
        slots.push(EnvSlot {
            name: SlotName::This,
            info: context_class.map_or(TypeInfo::Opaque, TypeInfo::Class),
            origin: SlotOrigin::This,
            var: None,
        });
    }
    let mut remap = Vec::new();
    if let Some(outer) = site.outer {
        let outer_slots = cx
            .registry
            .env(outer)
            .map(|e| e.slots.clone())
            .unwrap_or_default();
        for (i, s) in outer_slots.iter().enumerate() {
            if slots.iter().any(|own| own.name == s.name && own.var == s.var) {
                continue;
            }
            remap.push((index(slots.len()), index(i)));
            slots.push(EnvSlot {
                name: s.name,
                info: s.info,
                origin: SlotOrigin::Outer,
                var: s.var,
            });
        }
    }

    let name = cx.unique_struct_name(&format!("env.{label}"));
    let record = cx.module.types.named_struct(&name);
    cx.module
        .types
        .set_struct_body(record, &vec![TyId::PTR; slots.len()]);
    debug!(
        env = %name,
        slots = slots.len(),
        captures = capture_count,
        outer = remap.len(),
        "environment built"
    );
    let env = Environment {
        owner: Some(owner),
        name,
        record,
        param_count: index(params.len()),
        slots,
        outer: site.outer,
        remap,
    };
    let id = cx.registry.add_env(env);
    cx.registry.bind_decl_env(owner, id)?;
    Ok(id)
}

fn index(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

struct Accumulator<'a, 'p> {
    cx: &'a CodegenCx<'p>,
    site: &'a DeclSite,
    locals: &'a FxHashSet<Name>,
    local_decls: &'a FxHashSet<DeclId>,
    captures: Vec<Captured>,
    needs_this: bool,
    visited: FxHashSet<DeclId>,
}

#[derive(Clone, Copy)]
struct Captured {
    name: Name,
    var: Option<DeclId>,
    info: TypeInfo,
}

/// Whose body a reference was found in.
enum Origin {
    Own,
    /// Another declaration's body, resolved at its own site. `None` when
    /// that declaration is nested in this unit and has no site yet: it
    /// then sees exactly what this body sees.
    Pulled(Option<DeclSite>),
}

impl Origin {
    fn site(&self) -> Option<&DeclSite> {
        match self {
            Origin::Pulled(site) => site.as_ref(),
            Origin::Own => None,
        }
    }
}

impl Accumulator<'_, '_> {
    fn resolve(&self, name: Name, origin: &Origin) -> Option<(ScopeBinding, Option<DeclId>)> {
        let scope = &origin.site().unwrap_or(self.site).scope;
        scope
            .lookup(name)
            .map(|b| (b, scope.declaration_of(name)))
            .or_else(|| self.cx.module_scope.lookup(name).map(|b| (b, None)))
    }

    /// `this` in a pulled body is supplied by the call, never captured here.
    fn visit(&mut self, r: Ref, class: Option<DeclId>, origin: &Origin) -> CodegenResult<()> {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || match r {
            Ref::Name(name) => self.name(name, origin),
            Ref::Callee(name, decl) => match self.resolve(name, origin) {
                Some(_) => self.name(name, origin),
                None => self.pull_function(decl),
            },
            Ref::This => {
                if matches!(origin, Origin::Own) {
                    self.needs_this = true;
                }
                Ok(())
            }
            Ref::Member(name) => {
                let Some(class) = class else { return Ok(()) };
                let program = self.cx.program;
                let chain = program.class_chain(class)?;
                match program.find_function_in(&chain, name, MEMBER_KINDS)? {
                    Some(m) => self.pull_function(m),
                    None => Ok(()),
                }
            }
            Ref::SuperMember(name) => {
                let Some(class) = class else { return Ok(()) };
                let program = self.cx.program;
                let chain = program.class_chain(class)?;
                match program.find_function_in(chain.get(1..).unwrap_or(&[]), name, MEMBER_KINDS)? {
                    Some(m) => self.pull_function(m),
                    None => Ok(()),
                }
            }
            Ref::BaseCtor => {
                let Some(class) = class else { return Ok(()) };
                match self.cx.program.class(class)?.base {
                    Some(base) => self.pull_construct(base),
                    None => Ok(()),
                }
            }
            Ref::Construct(class) => self.pull_construct(class),
        })
    }

    fn name(&mut self, name: Name, origin: &Origin) -> CodegenResult<()> {
        if origin.site().is_none() && self.locals.contains(&name) {
            return Ok(());
        }
        match self.resolve(name, origin) {
            Some((ScopeBinding::Variable { info, .. }, var)) => self.capture(name, var, info),
            Some((ScopeBinding::Global { .. } | ScopeBinding::Class(_), _)) => Ok(()),
            Some((ScopeBinding::Function(decl), _)) => self.pull_function(decl),
            None => Err(CodegenError::unresolved_capture(self.cx.program.name(name))),
        }
    }

    /// Capture the variable declared by `var`, unless this unit declares it.
    fn capture(&mut self, name: Name, var: Option<DeclId>, info: TypeInfo) -> CodegenResult<()> {
        let Some(var) = var else {
            if !self.captures.iter().any(|c| c.var.is_none() && c.name == name) {
                self.captures.push(Captured { name, var: None, info });
            }
            return Ok(());
        };
        if self.local_decls.contains(&var) || self.captures.iter().any(|c| c.var == Some(var)) {
            return Ok(());
        }
        if self.site.scope.variable(var).is_none() {
            return Err(CodegenError::unresolved_capture(self.cx.program.name(name)));
        }
        self.captures.push(Captured {
            name,
            var: Some(var),
            info,
        });
        Ok(())
    }

    fn pull_function(&mut self, decl: DeclId) -> CodegenResult<()> {
        if !self.visited.insert(decl) {
            return Ok(());
        }
        let program = self.cx.program;
        let f = program.function(decl)?;
        if f.body.is_none() {
            return Ok(());
        }
        if let Some(env) = self.cx.registry.decl_env(decl) {
            let captured: Vec<Captured> = self
                .cx
                .registry
                .env(env)
                .map(|e| {
                    e.slots
                        .iter()
                        .filter(|s| s.origin == SlotOrigin::Capture)
                        .filter_map(|s| match s.name {
                            SlotName::Named(name) => Some(Captured {
                                name,
                                var: s.var,
                                info: s.info,
                            }),
                            SlotName::This => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            for c in captured {
                match c.var {
                    Some(_) => self.capture(c.name, c.var, c.info)?,
                    None => self.name(c.name, &Origin::Own)?,
                }
            }
            return Ok(());
        }
        let class = if f.kind.is_member() {
            f.owner
        } else {
            self.cx.sites.get(&decl).and_then(|s| s.this_class)
        };
        let origin = Origin::Pulled(self.cx.site_of(decl).ok());
        let found = free_vars::collect(program, Unit::Function(decl))?;
        for r in found.refs {
            self.visit(r, class, &origin)?;
        }
        Ok(())
    }

    fn pull_construct(&mut self, class: DeclId) -> CodegenResult<()> {
        let program = self.cx.program;
        if let Some(ctor) = program.constructor_of(class)? {
            return self.pull_function(ctor);
        }
        if !self.visited.insert(class) {
            return Ok(());
        }
        let origin = Origin::Pulled(self.cx.site_of(class).ok());
        let found = free_vars::collect(program, Unit::ImplicitCtor(class))?;
        for r in found.refs {
            self.visit(r, Some(class), &origin)?;
        }
        Ok(())
    }
}
