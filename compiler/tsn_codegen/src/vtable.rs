//! Native vtables.
//!
//! A class flagged `VTABLE` is laid out with a vtable pointer in field 0.
//! The table belongs to the top-most such class in the chain, the *root*:
//! a pointer array of `header` reserved slots followed by one slot per
//! virtual method the root declares, in declaration order. Subclasses
//! never add slots; a virtual method introduced below the root is called
//! statically.
//!
//! The root table is a read-only global, either provided by the
//! object-code base or emitted here as `vtable.<Root>` with one thunk per
//! method. Instances of classes that override nothing point at it
//! directly. Every other instance gets a private copy whose override
//! slots point at trampolines, so patching one object never affects its
//! siblings or the shared table. The copy is longer than the table: its
//! trailing slots hold the instance's override closures, one per
//! override, and a trampoline reaches its closure through the receiver's
//! table pointer. An override capturing locals of the function that
//! declared its class therefore keeps the captures of its own instance.
//!
//! Every slot uses the native ABI `ptr (ptr this, ptr args...)`.

use tracing::debug;
use tsn_ir::{DeclFlags, DeclId, FunctionKind, Name, Program, ProgramError};
use tsn_lir::{Const, ConstInit, FuncId, FunctionBuilder, GlobalId, TyId, ValueId};

use crate::context::CodegenCx;
use crate::environment::SlotOrigin;
use crate::error::{CodegenError, CodegenErrorKind, CodegenResult};
use crate::function_compiler::{compile_function, specialize, CompiledFn, FnSubject};
use crate::lower::{FnLowerer, Lowered};
use crate::type_info::TypeInfo;

/// The vtable of one root class.
#[derive(Clone, Debug)]
pub struct VTable {
    pub root: DeclId,
    pub global: GlobalId,
    /// `[len x ptr]`
    pub array: TyId,
    pub len: u32,
    /// Reserved slots before the first method.
    pub header: u32,
    /// Root virtual methods, in slot order.
    pub methods: Vec<(Name, DeclId)>,
    /// Provided by the object-code base rather than emitted.
    pub external: bool,
}

impl VTable {
    /// Slot index of virtual method `name`.
    pub fn slot_of(&self, name: Name) -> Option<u32> {
        let i = self.methods.iter().position(|&(n, _)| n == name)?;
        u32::try_from(i).ok().map(|i| i + self.header)
    }
}

/// Top-most class of `class`'s chain laid out with a vtable.
pub fn vtable_root(program: &Program, class: DeclId) -> Result<Option<DeclId>, ProgramError> {
    let mut root = None;
    for c in program.class_chain(class)? {
        if program.decl(c)?.flags.contains(DeclFlags::VTABLE) {
            root = Some(c);
        }
    }
    Ok(root)
}

/// Virtual methods declared by `root` itself, in declaration order.
pub fn root_virtuals(program: &Program, root: DeclId) -> Result<Vec<DeclId>, ProgramError> {
    let mut out = Vec::new();
    for m in program.own_functions(root, FunctionKind::Method)? {
        let flags = program.decl(m)?.flags;
        if flags.contains(DeclFlags::VIRTUAL) && !flags.contains(DeclFlags::STATIC) {
            out.push(m);
        }
    }
    Ok(out)
}

fn slot_value(slot: u32) -> i32 {
    i32::try_from(slot).unwrap_or(i32::MAX)
}

impl CodegenCx<'_> {
    /// The vtable of `root`, declared or emitted on first request.
    pub(crate) fn vtable(&mut self, root: DeclId) -> CodegenResult<VTable> {
        if let Some(vt) = self.vtables.get(&root) {
            return Ok(vt.clone());
        }
        let program = self.program;
        let root_name = program.decl_name(root).to_owned();
        let mut methods = Vec::new();
        for m in root_virtuals(program, root)? {
            methods.push((program.decl(m)?.name, m));
        }
        let header = self.config.vtable_header_slots;
        let needed = header + u32::try_from(methods.len()).unwrap_or(u32::MAX);
        let len = program.class(root)?.vtable_size.unwrap_or(needed);
        if len < needed {
            return Err(CodegenError::invalid(format!(
                "vtable of `{root_name}` has {len} slots but needs {needed}"
            )));
        }
        let array = self.module.types.array(TyId::PTR, len);

        if let Some(symbol) = self.resolver.vtable_symbol(program, root) {
            let global = self.module.declare_external_global(&symbol, array, true);
            debug!(class = %root_name, symbol = %symbol, len, "foreign vtable");
            let vt = VTable {
                root,
                global,
                array,
                len,
                header,
                methods,
                external: true,
            };
            self.vtables.insert(root, vt.clone());
            return Ok(vt);
        }

        // Thunks are declared before the table so that compiling a method
        // that constructs the class again finds the table cached.
        let mut entries = vec![ConstInit::Scalar(Const::Null); header as usize];
        let mut pending = Vec::new();
        for &(name, m) in &methods {
            let f = program.function(m)?;
            let arity = f.params.len() + 1;
            let resolution = self.resolver.resolve(program, m, &[], Some(TypeInfo::Class(root)));
            let func = if resolution.is_external_symbol {
                self.external_function(&resolution.qualified_name, arity)?
            } else {
                let symbol = format!("vthunk.{root_name}.{}", program.name(name));
                let thunk = self
                    .module
                    .declare_unique_function(&symbol, &vec![TyId::PTR; arity], TyId::PTR);
                self.compiled.insert(thunk);
                pending.push((thunk, m));
                thunk
            };
            entries.push(ConstInit::Scalar(Const::Func(func)));
        }
        entries.resize(len as usize, ConstInit::Scalar(Const::Null));
        let global = self.module.add_global(
            &format!("vtable.{root_name}"),
            array,
            true,
            ConstInit::Aggregate(entries),
        );
        let vt = VTable {
            root,
            global,
            array,
            len,
            header,
            methods,
            external: false,
        };
        self.vtables.insert(root, vt.clone());

        for (thunk, m) in pending {
            self.define_thunk(thunk, root, m)?;
        }
        debug!(class = %root_name, len, methods = vt.methods.len(), "vtable emitted");
        Ok(vt)
    }

    /// `vthunk.<Root>.<m>`: native ABI entry into the root's own method.
    fn define_thunk(&mut self, thunk: FuncId, root: DeclId, method: DeclId) -> CodegenResult<()> {
        let spec = specialize(self, FnSubject::Function(method), Some(root), &[])?;
        let compiled = compile_function(self, spec)?;
        let env = self.env(compiled.env)?.clone();
        if env
            .slots
            .iter()
            .any(|s| matches!(s.origin, SlotOrigin::Capture | SlotOrigin::Outer))
        {
            return Err(CodegenError::unsupported(format!(
                "virtual method `{}` capturing local variables",
                self.program.decl_name(method)
            )));
        }
        let arity = env.param_count + 1;
        let mut b = FunctionBuilder::new(thunk, &vec![TyId::PTR; arity as usize]);
        let env_ptr = b.alloc(env.record, "env");
        for i in 0..env.param_count {
            let cell = b.alloc(TyId::PTR, "arg");
            b.store(b.param(i + 1), cell);
            let slot = b.struct_gep(env.record, env_ptr, i, "arg.p");
            b.store(cell, slot);
        }
        if let Some(slot) = env.this_slot() {
            let p = b.struct_gep(env.record, env_ptr, slot, "this.p");
            b.store(b.param(0), p);
        }
        let r = b.call(compiled.func, TyId::PTR, &[env_ptr], "r");
        b.ret(r);
        self.module.define_function(thunk, b.finish());
        Ok(())
    }

    /// Trampoline for the override of `name` compiled for `class`. It calls
    /// the closure the receiver's private table holds at `closure_slot`,
    /// with the receiver it was called with.
    fn override_trampoline(
        &mut self,
        class: DeclId,
        name: Name,
        compiled: &CompiledFn,
        closure_slot: u32,
    ) -> CodegenResult<FuncId> {
        if let Some(&found) = self.overrides.get(&(class, name)) {
            return Ok(found);
        }
        let program = self.program;
        let label = format!("{}.{}", program.decl_name(class), program.name(name));
        let layout = self.class_layout(class)?;
        let env = self.env(compiled.env)?.clone();
        let arity = env.param_count + 1;
        let tramp = self.module.declare_unique_function(
            &format!("vtramp.{label}"),
            &vec![TyId::PTR; arity as usize],
            TyId::PTR,
        );
        self.compiled.insert(tramp);

        let rt = self.rt;
        let mut b = FunctionBuilder::new(tramp, &vec![TyId::PTR; arity as usize]);
        let vptr_p = b.struct_gep(layout.record, b.param(0), 0, "vptr.p");
        let vptr = b.load(TyId::PTR, vptr_p, "vptr");
        let index = b.const_i32(slot_value(closure_slot));
        let clo_p = b.index_gep(TyId::PTR, vptr, index, "closure.p");
        let clo = b.load(TyId::PTR, clo_p, "closure");
        let env_p = b.struct_gep(rt.closure, clo, 1, "env.p");
        let env_ptr = b.load(TyId::PTR, env_p, "env");
        for i in 0..env.param_count {
            let cell = b.alloc(TyId::PTR, "arg");
            b.store(b.param(i + 1), cell);
            let slot = b.struct_gep(env.record, env_ptr, i, "arg.p");
            b.store(cell, slot);
        }
        if let Some(slot) = env.this_slot() {
            let p = b.struct_gep(env.record, env_ptr, slot, "this.p");
            b.store(b.param(0), p);
        }
        let r = b.call(rt.call, TyId::PTR, &[clo], "r");
        b.ret(r);
        self.module.define_function(tramp, b.finish());

        self.overrides.insert((class, name), tramp);
        Ok(tramp)
    }
}

impl FnLowerer<'_, '_> {
    /// Point the vtable slot of the fresh instance `obj` of `class` at
    /// the right table.
    pub(crate) fn install_vtable(&mut self, obj: ValueId, class: DeclId) -> CodegenResult<()> {
        let program = self.cx.program;
        let Some(root) = vtable_root(program, class)? else {
            return Ok(());
        };
        let vt = self.cx.vtable(root)?;
        let chain = program.class_chain(class)?;
        let below_root: Vec<DeclId> = chain.iter().copied().take_while(|&c| c != root).collect();

        // Overrides must name a root slot.
        for &c in &below_root {
            for m in program.own_functions(c, FunctionKind::Method)? {
                let decl = program.decl(m)?;
                if decl.flags.contains(DeclFlags::OVERRIDE) && vt.slot_of(decl.name).is_none() {
                    return Err(CodegenError::bare(CodegenErrorKind::AmbiguousVirtualSlot {
                        class: program.decl_name(c).to_owned(),
                        method: program.name(decl.name).to_owned(),
                        candidates: vt
                            .methods
                            .iter()
                            .map(|&(n, _)| program.name(n).to_owned())
                            .collect(),
                    }));
                }
            }
        }

        let mut overrides = Vec::new();
        for &(name, _) in &vt.methods {
            let found = program.find_function_in(&below_root, name, &[FunctionKind::Method])?;
            if let (Some(m), Some(slot)) = (found, vt.slot_of(name)) {
                overrides.push((name, m, slot));
            }
        }

        let layout = self.cx.class_layout(class)?;
        let table = self.b.const_global(vt.global);
        if overrides.is_empty() {
            self.store_field(layout.record, obj, 0, table);
            return Ok(());
        }

        let count = u32::try_from(overrides.len()).unwrap_or(u32::MAX);
        let private = self.cx.module.types.array(TyId::PTR, vt.len + count);
        let copy = self.b.alloc(private, "vtable.copy");
        for i in 0..vt.len {
            let index = self.b.const_i32(slot_value(i));
            let from = self.b.index_gep(TyId::PTR, table, index, "vslot.shared");
            let entry = self.b.load(TyId::PTR, from, "ventry");
            let to = self.b.index_gep(TyId::PTR, copy, index, "vslot");
            self.b.store(entry, to);
        }
        self.store_field(layout.record, obj, 0, copy);
        for (closure_slot, (name, m, slot)) in (vt.len..).zip(overrides) {
            let spec = specialize(self.cx, FnSubject::Function(m), Some(class), &[])?;
            let compiled = compile_function(self.cx, spec)?;
            let clo = self.closure_of(&compiled, m, Some(obj))?;
            let tramp = self.cx.override_trampoline(class, name, &compiled, closure_slot)?;
            let index = self.b.const_i32(slot_value(closure_slot));
            let held = self.b.index_gep(TyId::PTR, copy, index, "vclosure");
            self.b.store(clo.value, held);
            let index = self.b.const_i32(slot_value(slot));
            let entry = self.b.index_gep(TyId::PTR, copy, index, "vslot");
            let code = self.b.const_fn(tramp);
            self.b.store(code, entry);
            debug!(
                class = %program.decl_name(class),
                method = %program.name(name),
                slot,
                "vtable slot patched"
            );
        }
        Ok(())
    }

    /// Slot of `method` in the vtable of `class`, if it is virtual there.
    pub(crate) fn virtual_slot(&mut self, class: DeclId, method: DeclId) -> CodegenResult<Option<u32>> {
        let program = self.cx.program;
        let Some(root) = vtable_root(program, class)? else {
            return Ok(None);
        };
        let name = program.decl(method)?.name;
        let is_virtual = root_virtuals(program, root)?
            .into_iter()
            .any(|m| program.decl(m).is_ok_and(|d| d.name == name));
        if !is_virtual {
            return Ok(None);
        }
        Ok(self.cx.vtable(root)?.slot_of(name))
    }

    /// Call `method` through the vtable of the receiver.
    pub(crate) fn virtual_call(
        &mut self,
        recv: Lowered,
        class: DeclId,
        method: DeclId,
        slot: u32,
        args: Vec<Lowered>,
    ) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let f = program.function(method)?;
        let resolution = self.cx.resolver.resolve(
            program,
            method,
            &[],
            Some(TypeInfo::Class(class)),
        );
        // Overrides are compiled with their declared parameter types, so
        // arguments are passed in that representation.
        let compiled = if resolution.is_external_symbol {
            None
        } else {
            let spec = specialize(self.cx, FnSubject::Function(method), Some(class), &[])?;
            Some(compile_function(self.cx, spec)?)
        };

        let this = self.boxed(recv);
        let mut values = Vec::with_capacity(f.params.len() + 1);
        values.push(this);
        let mut args = args.into_iter();
        for (i, &p) in f.params.iter().enumerate() {
            let info = match &compiled {
                Some(c) => c.params.get(i).copied().unwrap_or(TypeInfo::Opaque),
                None => {
                    let ty = program.param(p)?.ty;
                    if program.types.mentions_type_param(ty) {
                        TypeInfo::Opaque
                    } else {
                        self.to_info(ty)?
                    }
                }
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
        let ret = match (&compiled, f.ret) {
            (Some(c), _) => c.ret,
            (None, Some(ty)) if !program.types.mentions_type_param(ty) => self.to_info(ty)?,
            (None, _) => TypeInfo::Opaque,
        };

        let layout = self.cx.class_layout(class)?;
        let vptr = self.load_field(layout.record, this, 0, "vptr");
        let index = self.b.const_i32(slot_value(slot));
        let entry = self.b.index_gep(TyId::PTR, vptr, index, "vslot");
        let code = self.b.load(TyId::PTR, entry, "vfn");
        let sig = self
            .cx
            .module
            .types
            .func(&vec![TyId::PTR; values.len()], TyId::PTR);
        let r = match self.b.call_indirect(sig, TyId::PTR, code, &values, "vcall") {
            Some(r) => r,
            None => self.b.const_null(),
        };
        Ok(Lowered::boxed(r, ret))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
