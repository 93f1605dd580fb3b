//! Modules, functions and globals.

use rustc_hash::FxHashMap;

use crate::{BlockId, ConstInit, FuncId, GlobalId, Inst, Terminator, TyId, TypeTable};

/// A basic block: straight-line instructions plus one terminator.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub name: String,
    pub insts: Vec<Inst>,
    /// `None` only while the block is under construction.
    pub term: Option<Terminator>,
}

/// Body of a defined function.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionBody {
    pub blocks: Vec<Block>,
    /// Number of values (including parameters) defined in the body.
    pub value_count: u32,
    /// Type of every value, indexed by `ValueId`.
    pub value_types: Vec<TyId>,
    /// Debug name of every value.
    pub value_names: Vec<String>,
}

impl FunctionBody {
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// All instructions in block order.
    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<TyId>,
    pub ret: TyId,
    /// `None` for external functions supplied by the object-code base.
    pub body: Option<FunctionBody>,
}

impl Function {
    pub fn is_external(&self) -> bool {
        self.body.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: TyId,
    pub readonly: bool,
    /// `None` for external globals supplied by the object-code base.
    pub init: Option<ConstInit>,
}

/// A compilation unit of low-level code.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub name: String,
    pub types: TypeTable,
    functions: Vec<Function>,
    globals: Vec<Global>,
    function_names: FxHashMap<String, FuncId>,
    global_names: FxHashMap<String, GlobalId>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    // ── Functions ───────────────────────────────────────────────────

    /// Declare a function without a body. Re-declaring returns the existing id.
    pub fn declare_function(&mut self, name: &str, params: &[TyId], ret: TyId) -> FuncId {
        if let Some(&id) = self.function_names.get(name) {
            return id;
        }
        let id = FuncId::from_len(self.functions.len());
        self.functions.push(Function {
            name: name.to_owned(),
            params: params.to_vec(),
            ret,
            body: None,
        });
        self.function_names.insert(name.to_owned(), id);
        id
    }

    /// Declare a function under a name that is made unique with a numeric
    /// suffix if already taken.
    pub fn declare_unique_function(&mut self, name: &str, params: &[TyId], ret: TyId) -> FuncId {
        let name = unique_name(name, |n| self.function_names.contains_key(n));
        self.declare_function(&name, params, ret)
    }

    pub fn define_function(&mut self, id: FuncId, body: FunctionBody) {
        if let Some(f) = self.functions.get_mut(id.index()) {
            f.body = Some(body);
        }
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.function_names.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId::from_len(i), f))
    }

    /// Return type of `id`, `void` if unknown.
    pub fn ret_type(&self, id: FuncId) -> TyId {
        self.function(id).map_or(TyId::VOID, |f| f.ret)
    }

    /// Signature type of `id`.
    pub fn signature(&mut self, id: FuncId) -> TyId {
        let (params, ret) = match self.function(id) {
            Some(f) => (f.params.clone(), f.ret),
            None => (Vec::new(), TyId::VOID),
        };
        self.types.func(&params, ret)
    }

    // ── Globals ─────────────────────────────────────────────────────

    pub fn add_global(&mut self, name: &str, ty: TyId, readonly: bool, init: ConstInit) -> GlobalId {
        let name = unique_name(name, |n| self.global_names.contains_key(n));
        self.push_global(Global {
            name,
            ty,
            readonly,
            init: Some(init),
        })
    }

    /// Declare an external global. Re-declaring returns the existing id.
    pub fn declare_external_global(&mut self, name: &str, ty: TyId, readonly: bool) -> GlobalId {
        if let Some(&id) = self.global_names.get(name) {
            return id;
        }
        self.push_global(Global {
            name: name.to_owned(),
            ty,
            readonly,
            init: None,
        })
    }

    fn push_global(&mut self, global: Global) -> GlobalId {
        let id = GlobalId::from_len(self.globals.len());
        self.global_names.insert(global.name.clone(), id);
        self.globals.push(global);
        id
    }

    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.index())
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.global_names.get(name).copied()
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId::from_len(i), g))
    }
}

fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_owned();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}.{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
