//! Classes: `new`, constructors, property initializers, property and
//! accessor access, and static members.
//!
//! An instance is a `class.<Name>` record holding the instance properties
//! of the whole chain, base-most first, after the vtable pointer if the
//! chain has one. Construction allocates the record, installs the vtable,
//! then runs the constructor chain. Property initializers of a class run
//! when its constructor starts (classes without a base) or right after
//! its `super(...)` call returns.

use tracing::debug;
use tsn_ir::{DeclFlags, DeclId, DeclKind, ExprId, ExprKind, FunctionKind, Name};
use tsn_lir::{TyId, ValueId};

use super::{FnLowerer, Lowered};
use crate::environment::free_vars::forwarded_params;
use crate::error::{CodegenError, CodegenResult};
use crate::function_compiler::{compile_function, specialize, FnSubject};
use crate::object::FieldRef;
use crate::scope::ScopeBinding;
use crate::type_info::TypeInfo;

impl FnLowerer<'_, '_> {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub(crate) fn lower_new(&mut self, class: DeclId, args: &[ExprId]) -> CodegenResult<Lowered> {
        let args = self.lower_args(args)?;
        self.construct(class, args)
    }

    /// Allocate an instance of `class` and run its constructor chain.
    pub(crate) fn construct(&mut self, class: DeclId, args: Vec<Lowered>) -> CodegenResult<Lowered> {
        let layout = self.cx.class_layout(class)?;
        let obj = self.b.alloc(layout.record, "new");
        if layout.has_vptr {
            self.install_vtable(obj, class)?;
        }
        self.run_constructor(class, class, obj, args)?;
        debug!(class = %self.cx.program.decl_name(class), "instance constructed");
        Ok(Lowered::boxed(obj, TypeInfo::Class(class)))
    }

    /// Run the constructor of `ctor_class` on `this`, an instance of
    /// `this_class`. Classes without a declared constructor get an
    /// implicit one, except ambient classes, which are initialized natively.
    pub(crate) fn run_constructor(
        &mut self,
        ctor_class: DeclId,
        this_class: DeclId,
        this: ValueId,
        args: Vec<Lowered>,
    ) -> CodegenResult<()> {
        let program = self.cx.program;
        let infos: Vec<TypeInfo> = args.iter().map(|a| a.info).collect();
        let subject = match program.constructor_of(ctor_class)? {
            Some(ctor) => {
                let resolution = self.cx.resolver.resolve(
                    program,
                    ctor,
                    &infos,
                    Some(TypeInfo::Class(this_class)),
                );
                if resolution.is_external_symbol {
                    let recv = Lowered::boxed(this, TypeInfo::Class(this_class));
                    self.call_external(ctor, &resolution.qualified_name, Some(recv), args)?;
                    return Ok(());
                }
                FnSubject::Function(ctor)
            }
            None if program.decl(ctor_class)?.flags.contains(DeclFlags::AMBIENT) => return Ok(()),
            None => FnSubject::ImplicitCtor(ctor_class),
        };
        let spec = specialize(self.cx, subject, Some(this_class), &infos)?;
        let compiled = compile_function(self.cx, spec)?;
        self.invoke_compiled(&compiled, Some(this), args)?;
        Ok(())
    }

    /// `super(args)`: the base constructor on `this`, then the
    /// initializers of the class whose constructor is running.
    pub(crate) fn call_base_ctor(&mut self, args: Vec<Lowered>) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let owner = self
            .member_owner
            .ok_or_else(|| CodegenError::unsupported("`super(...)` outside a constructor"))?;
        let base = program.class(owner)?.base.ok_or_else(|| {
            CodegenError::invalid(format!(
                "`{}` calls `super(...)` but has no base class",
                program.decl_name(owner)
            ))
        })?;
        let this = self.lower_this()?;
        let this = self.boxed(this);
        let this_class = self.this_class.unwrap_or(owner);
        self.run_constructor(base, this_class, this, args)?;
        self.run_initializers(owner)?;
        Ok(self.null_value(TypeInfo::Void))
    }

    /// Body of the constructor synthesized for `class`: forward the
    /// parameters to the base constructor, then run the initializers.
    pub(crate) fn lower_implicit_ctor(&mut self, class: DeclId) -> CodegenResult<()> {
        let program = self.cx.program;
        if program.class(class)?.base.is_none() {
            return self.run_initializers(class);
        }
        let mut args = Vec::new();
        for p in forwarded_params(program, class)? {
            let name = program.decl(p)?.name;
            let Some(ScopeBinding::Variable { cell, info }) = self.scope.lookup(name) else {
                return Err(CodegenError::invalid(format!(
                    "forwarded parameter `{}` of `{}` is not bound",
                    program.name(name),
                    program.decl_name(class)
                )));
            };
            let value = self.b.load(TyId::PTR, cell, self.name_str(name));
            args.push(Lowered::boxed(value, info));
        }
        self.call_base_ctor(args)?;
        Ok(())
    }

    /// Store the initializer of every own instance property of `owner`
    /// into `this`, in declaration order.
    pub(crate) fn run_initializers(&mut self, owner: DeclId) -> CodegenResult<()> {
        let program = self.cx.program;
        let class = program.class(owner)?;
        let has_init = class.members.iter().any(|&m| {
            program.decl(m).is_ok_and(|d| {
                !d.flags.contains(DeclFlags::STATIC)
                    && matches!(&d.kind, DeclKind::Property(p) if p.init.is_some())
            })
        });
        if !has_init {
            return Ok(());
        }
        let this = self.lower_this()?;
        let this = self.boxed(this);
        let layout = self.cx.class_layout(self.this_class.unwrap_or(owner))?;
        for &m in &class.members {
            let decl = program.decl(m)?;
            let DeclKind::Property(prop) = &decl.kind else {
                continue;
            };
            if decl.flags.contains(DeclFlags::STATIC) {
                continue;
            }
            let Some(init) = prop.init else {
                continue;
            };
            let (index, info) = layout.field_of(decl.name).ok_or_else(|| {
                CodegenError::invalid(format!(
                    "property `{}` is missing from the layout of `{}`",
                    program.name(decl.name),
                    program.decl_name(owner)
                ))
            })?;
            let value = self.lower_expr(init)?;
            let value = self.coerce(value, info)?;
            let value = self.boxed(value);
            self.store_field(layout.record, this, index, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Property access
    // -----------------------------------------------------------------------

    pub(crate) fn lower_property(&mut self, object: ExprId, name: Name) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        match &program.expr(object).kind {
            ExprKind::Super => return self.read_super_property(name),
            ExprKind::Ident(n) => {
                if let Some(ScopeBinding::Class(class)) = self.lookup(*n) {
                    return self.read_static(class, name);
                }
            }
            _ => {}
        }
        let recv = self.lower_expr(object)?;
        self.read_property(recv, name)
    }

    /// Read property `name` of `recv`: a getter, a field, or a method
    /// bound to `recv`.
    pub(crate) fn read_property(&mut self, recv: Lowered, name: Name) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let recv = self.to_boxed(recv);
        match recv.info {
            TypeInfo::Class(class) => {
                let chain = program.class_chain(class)?;
                if let Some(getter) = program.find_function_in(&chain, name, &[FunctionKind::Getter])? {
                    return self.call_decl(getter, Some((recv, class)), Vec::new());
                }
                if let Some(field) = self.field_ref(recv.info, name)? {
                    return Ok(self.load_ref(recv.value, field, name));
                }
                if let Some(m) = program.find_function_in(&chain, name, &[FunctionKind::Method])? {
                    return self.lower_bound_method(recv, class, m);
                }
                Err(self.no_property(recv.info, name))
            }
            TypeInfo::Union(shape) if self.cx.union_meta(shape)?.optional => {
                let member = self.cx.union_meta(shape)?.slots[0].info;
                let inner = self.union_extract(recv, shape, member)?;
                self.read_property(inner, name)
            }
            TypeInfo::Opaque => Err(CodegenError::unsupported(format!(
                "reading `{}` from a value of type `any`",
                program.name(name)
            ))),
            info => match self.field_ref(info, name)? {
                Some(field) => Ok(self.load_ref(recv.value, field, name)),
                None => Err(self.no_property(info, name)),
            },
        }
    }

    /// Write `value` to property `name` of `recv`, through a setter when
    /// the class declares one. Returns the stored value.
    pub(crate) fn write_property(
        &mut self,
        recv: Lowered,
        name: Name,
        value: Lowered,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let recv = self.to_boxed(recv);
        if let TypeInfo::Class(class) = recv.info {
            let chain = program.class_chain(class)?;
            if let Some(setter) = program.find_function_in(&chain, name, &[FunctionKind::Setter])? {
                let value = self.to_boxed(value);
                self.call_decl(setter, Some((recv, class)), vec![value])?;
                return Ok(value);
            }
        }
        if let TypeInfo::Union(shape) = recv.info {
            let meta = self.cx.union_meta(shape)?;
            if meta.optional {
                let member = meta.slots[0].info;
                let inner = self.union_extract(recv, shape, member)?;
                return self.write_property(inner, name, value);
            }
        }
        let Some(field) = self.field_ref(recv.info, name)? else {
            return Err(self.no_property(recv.info, name));
        };
        let value = self.coerce(value, field.info)?;
        let p = self.boxed(value);
        self.store_field(field.record, recv.value, field.index, p);
        Ok(Lowered::boxed(p, field.info))
    }

    /// `super.name`: a base getter, else the field of `this`.
    fn read_super_property(&mut self, name: Name) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let owner = self
            .member_owner
            .ok_or_else(|| CodegenError::unsupported("`super` outside a class member"))?;
        let this = self.lower_this()?;
        let this_class = self.this_class.unwrap_or(owner);
        let chain = program.class_chain(owner)?;
        let bases = chain.get(1..).unwrap_or(&[]);
        if let Some(getter) = program.find_function_in(bases, name, &[FunctionKind::Getter])? {
            return self.call_decl(getter, Some((this, this_class)), Vec::new());
        }
        if let Some(m) = program.find_function_in(bases, name, &[FunctionKind::Method])? {
            return self.lower_bound_method(this, this_class, m);
        }
        self.read_property(this, name)
    }

    fn load_ref(&mut self, ptr: ValueId, field: FieldRef, name: Name) -> Lowered {
        let value = self.load_field(field.record, ptr, field.index, self.name_str(name));
        Lowered::boxed(value, field.info)
    }

    fn no_property(&self, info: TypeInfo, name: Name) -> CodegenError {
        CodegenError::invalid(format!(
            "`{}` has no property `{}`",
            self.cx.info_name(info),
            self.name_str(name)
        ))
    }

    // -----------------------------------------------------------------------
    // Static members
    // -----------------------------------------------------------------------

    /// `Class.name`: a static property along the chain, or a static
    /// method as a value.
    pub(crate) fn read_static(&mut self, class: DeclId, name: Name) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let chain = program.class_chain(class)?;
        for &c in &chain {
            if let Some(prop) = program.static_property(c, name)? {
                let global = self.cx.static_global(prop)?;
                let info = self.static_info(prop)?;
                let addr = self.b.const_global(global);
                let value = self.b.load(TyId::PTR, addr, self.name_str(name));
                return Ok(Lowered::boxed(value, info));
            }
        }
        let method = program
            .find_function_in(&chain, name, &[FunctionKind::Method])?
            .filter(|&m| program.decl(m).is_ok_and(|d| d.flags.contains(DeclFlags::STATIC)));
        match method {
            Some(m) => self.lower_static_method_value(m),
            None => Err(CodegenError::invalid(format!(
                "`{}` has no static member `{}`",
                program.decl_name(class),
                program.name(name)
            ))),
        }
    }

    /// `Class.name = value`.
    pub(crate) fn write_static(
        &mut self,
        class: DeclId,
        name: Name,
        value: Lowered,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        for c in program.class_chain(class)? {
            if let Some(prop) = program.static_property(c, name)? {
                let global = self.cx.static_global(prop)?;
                let info = self.static_info(prop)?;
                let value = self.coerce(value, info)?;
                let p = self.boxed(value);
                let addr = self.b.const_global(global);
                self.b.store(p, addr);
                return Ok(Lowered::boxed(p, info));
            }
        }
        Err(CodegenError::invalid(format!(
            "`{}` has no static property `{}`",
            program.decl_name(class),
            program.name(name)
        )))
    }

    fn static_info(&mut self, prop: DeclId) -> CodegenResult<TypeInfo> {
        let program = self.cx.program;
        let ty = program.property(prop)?.ty;
        if program.types.mentions_type_param(ty) {
            return Ok(TypeInfo::Opaque);
        }
        self.to_info(ty)
    }

    /// A class statement initializes its static properties in order.
    pub(crate) fn lower_class_stmt(&mut self, class: DeclId) -> CodegenResult<()> {
        let program = self.cx.program;
        for &m in &program.class(class)?.members {
            let decl = program.decl(m)?;
            let DeclKind::Property(prop) = &decl.kind else {
                continue;
            };
            let (true, Some(init)) = (decl.flags.contains(DeclFlags::STATIC), prop.init) else {
                continue;
            };
            let global = self.cx.static_global(m)?;
            let info = self.static_info(m)?;
            let value = self.lower_expr(init)?;
            let value = self.coerce(value, info)?;
            let p = self.boxed(value);
            let addr = self.b.const_global(global);
            self.b.store(p, addr);
        }
        Ok(())
    }
}
