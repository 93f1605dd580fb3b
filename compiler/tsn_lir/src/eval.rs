//! Reference interpreter for low-level modules.
//!
//! `Machine` executes a [`Module`] directly. It is how tests observe what
//! code generation emitted: a program is compiled, then run here, and host
//! functions registered under external symbol names record what the
//! program did.
//!
//! # Memory model
//!
//! Allocations hold structured [`Value`]s rather than bytes. A [`Pointer`]
//! is a region (heap allocation or global) plus a field path, so
//! `struct_gep`/`index_gep` simply extend the path. The allocator
//! zero-initializes every allocation. Stores into read-only globals trap,
//! which is how native vtables shared between instances are protected.
//!
//! # Host interface
//!
//! External functions and globals stand in for the native object-code
//! base. Register them with [`Machine::register_host`] and
//! [`Machine::define_global`] before running.

mod memory;
mod value;

use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

use crate::{
    BinOp, BlockId, CmpPred, Const, ConstInit, FuncId, FunctionBody, Inst, Module, Terminator,
    TyId,
};

use memory::Memory;
pub use value::{zero_value, HostFnId, Pointer, Region, Value};

/// Runtime fault.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Trap {
    #[error("null pointer dereference")]
    NullDeref,
    #[error("call through a null function pointer")]
    NullCall,
    #[error("value of kind `{0}` is not callable")]
    NotCallable(&'static str),
    #[error("write to read-only global `{0}`")]
    ReadOnlyWrite(String),
    #[error("out-of-bounds access at index {0}")]
    OutOfBounds(i64),
    #[error("invalid memory access: {0}")]
    BadAccess(String),
    #[error("read of uninitialized memory")]
    UninitializedRead,
    #[error("unresolved external symbol `{0}`")]
    UnresolvedSymbol(String),
    #[error("unknown function #{0}")]
    UnknownFunction(u32),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("`{name}` expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("reached unreachable code")]
    Unreachable,
    #[error("block `{0}` has no terminator")]
    Unterminated(String),
    #[error("instruction budget exhausted")]
    OutOfFuel,
    #[error("call depth limit exceeded")]
    StackOverflow,
    #[error("host function failed: {0}")]
    Host(String),
}

/// A host function: receives the machine and the call arguments.
pub type HostFn = Rc<dyn Fn(&mut Machine, &[Value]) -> Result<Value, Trap>>;

const DEFAULT_FUEL: u64 = 1_000_000;
const MAX_DEPTH: u32 = 200;

pub struct Machine {
    module: Rc<Module>,
    memory: Memory,
    hosts: Vec<(String, HostFn)>,
    host_names: FxHashMap<String, HostFnId>,
    fuel: u64,
    depth: u32,
}

impl Machine {
    pub fn new(module: Module) -> Self {
        let module = Rc::new(module);
        let mut memory = Memory::default();
        for (_, global) in module.globals() {
            let value = match &global.init {
                Some(init) => init_value(&module, global.ty, init),
                None => Value::Undef,
            };
            memory.add_global(&global.name, value, global.readonly);
        }
        Machine {
            module,
            memory,
            hosts: Vec::new(),
            host_names: FxHashMap::default(),
            fuel: DEFAULT_FUEL,
            depth: 0,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Replace the instruction budget.
    pub fn set_fuel(&mut self, fuel: u64) {
        self.fuel = fuel;
    }

    // ── Host interface ──────────────────────────────────────────────

    /// Register a host function. External module functions named `name`
    /// dispatch to it; the returned value is its address.
    pub fn register_host(
        &mut self,
        name: &str,
        f: impl Fn(&mut Machine, &[Value]) -> Result<Value, Trap> + 'static,
    ) -> Value {
        let id = HostFnId(u32::try_from(self.hosts.len()).unwrap_or(u32::MAX));
        let f: HostFn = Rc::new(f);
        self.hosts.push((name.to_owned(), f));
        self.host_names.insert(name.to_owned(), id);
        Value::Host(id)
    }

    /// Supply the contents of an external global.
    pub fn define_global(&mut self, name: &str, value: Value, readonly: bool) -> Result<(), Trap> {
        let id = self
            .module
            .global_by_name(name)
            .ok_or_else(|| Trap::UnresolvedSymbol(name.to_owned()))?;
        self.memory.set_global(id, value, readonly);
        Ok(())
    }

    /// Address of a global, if the module has one named `name`.
    pub fn global_address(&self, name: &str) -> Option<Value> {
        self.module
            .global_by_name(name)
            .map(|g| Value::Ptr(Some(Pointer::root(Region::Global(g)))))
    }

    /// Address of a module function.
    pub fn function_address(&self, name: &str) -> Option<Value> {
        self.module.function_by_name(name).map(Value::Func)
    }

    // ── Memory access for hosts and tests ───────────────────────────

    pub fn alloc(&mut self, value: Value) -> Value {
        Value::Ptr(Some(self.memory.alloc(value)))
    }

    pub fn allocation_count(&self) -> usize {
        self.memory.allocation_count()
    }

    /// Load the value `ptr` points at.
    pub fn read(&self, ptr: &Value) -> Result<Value, Trap> {
        let value = self.memory.read(ptr.as_pointer()?)?;
        if matches!(value, Value::Undef) {
            return Err(Trap::UninitializedRead);
        }
        Ok(value.clone())
    }

    pub fn write(&mut self, ptr: &Value, value: Value) -> Result<(), Trap> {
        self.memory.write(ptr.as_pointer()?, value)
    }

    /// Pointer to field/element `index` of the aggregate at `ptr`.
    pub fn field(&self, ptr: &Value, index: u32) -> Result<Value, Trap> {
        Ok(Value::Ptr(Some(ptr.as_pointer()?.child(index))))
    }

    /// Read a boxed number.
    pub fn read_number(&self, ptr: &Value) -> Result<f64, Trap> {
        self.read(ptr)?.as_f64()
    }

    /// Read a boxed boolean.
    pub fn read_bool(&self, ptr: &Value) -> Result<bool, Trap> {
        self.read(ptr)?.as_bool()
    }

    /// Read a boxed string.
    pub fn read_string(&self, ptr: &Value) -> Result<String, Trap> {
        Ok(self.read(ptr)?.as_str()?.to_owned())
    }

    // ── Execution ───────────────────────────────────────────────────

    /// Run the function named `name`.
    pub fn run(&mut self, name: &str, args: Vec<Value>) -> Result<Value, Trap> {
        let func = self
            .module
            .function_by_name(name)
            .ok_or_else(|| Trap::UnresolvedSymbol(name.to_owned()))?;
        self.call_function(func, args)
    }

    /// Call a function pointer (module function or host function).
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, Trap> {
        match callee {
            Value::Func(f) => self.call_function(*f, args),
            Value::Host(h) => self.call_host(*h, &args),
            Value::Ptr(None) => Err(Trap::NullCall),
            other => Err(Trap::NotCallable(other.kind())),
        }
    }

    pub fn call_function(&mut self, func: FuncId, args: Vec<Value>) -> Result<Value, Trap> {
        let module = Rc::clone(&self.module);
        let f = module
            .function(func)
            .ok_or(Trap::UnknownFunction(func.raw()))?;
        if args.len() != f.params.len() {
            return Err(Trap::Arity {
                name: f.name.clone(),
                expected: f.params.len(),
                found: args.len(),
            });
        }
        let Some(body) = &f.body else {
            let host = self
                .host_names
                .get(&f.name)
                .copied()
                .ok_or_else(|| Trap::UnresolvedSymbol(f.name.clone()))?;
            return self.call_host(host, &args);
        };
        if self.depth >= MAX_DEPTH {
            return Err(Trap::StackOverflow);
        }
        trace!(function = %f.name, args = args.len(), "call");
        self.depth += 1;
        let result = self.exec_body(body, args);
        self.depth -= 1;
        result
    }

    fn call_host(&mut self, id: HostFnId, args: &[Value]) -> Result<Value, Trap> {
        let (name, f) = self
            .hosts
            .get(id.0 as usize)
            .cloned()
            .ok_or_else(|| Trap::UnresolvedSymbol(format!("host#{}", id.0)))?;
        trace!(host = %name, args = args.len(), "host call");
        f(self, args)
    }

    fn exec_body(&mut self, body: &FunctionBody, args: Vec<Value>) -> Result<Value, Trap> {
        let mut vals = vec![Value::Undef; body.value_count as usize];
        for (slot, arg) in vals.iter_mut().zip(args) {
            *slot = arg;
        }
        let mut current = BlockId::from_raw(0);
        loop {
            let block = body
                .block(current)
                .ok_or_else(|| Trap::BadAccess(format!("no block {}", current.raw())))?;
            for inst in &block.insts {
                self.consume_fuel()?;
                self.exec_inst(inst, &mut vals)?;
            }
            let term = block
                .term
                .as_ref()
                .ok_or_else(|| Trap::Unterminated(block.name.clone()))?;
            current = match term {
                Terminator::Ret(v) => {
                    return Ok(v.map_or(Value::Undef, |v| vals[v.index()].clone()));
                }
                Terminator::Br(b) => *b,
                Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                } => {
                    if vals[cond.index()].as_bool()? {
                        *then_block
                    } else {
                        *else_block
                    }
                }
                Terminator::Switch {
                    value,
                    default,
                    cases,
                } => {
                    let v = vals[value.index()].as_int()?;
                    cases
                        .iter()
                        .find(|(c, _)| *c == v)
                        .map_or(*default, |(_, b)| *b)
                }
                Terminator::Unreachable => return Err(Trap::Unreachable),
            };
        }
    }

    fn consume_fuel(&mut self) -> Result<(), Trap> {
        if self.fuel == 0 {
            return Err(Trap::OutOfFuel);
        }
        self.fuel -= 1;
        Ok(())
    }

    fn exec_inst(&mut self, inst: &Inst, vals: &mut [Value]) -> Result<(), Trap> {
        match inst {
            Inst::Const { dst, value } => {
                vals[dst.index()] = const_value(value);
            }
            Inst::Alloc { dst, ty } => {
                let zero = zero_value(&self.module.types, *ty);
                vals[dst.index()] = Value::Ptr(Some(self.memory.alloc(zero)));
            }
            Inst::Load { dst, ptr, .. } => {
                vals[dst.index()] = self.read(&vals[ptr.index()])?;
            }
            Inst::Store { value, ptr } => {
                let v = vals[value.index()].clone();
                self.write(&vals[ptr.index()], v)?;
            }
            Inst::StructGep {
                dst, ptr, index, ..
            } => {
                vals[dst.index()] = self.field(&vals[ptr.index()], *index)?;
            }
            Inst::IndexGep {
                dst, ptr, index, ..
            } => {
                let i = vals[index.index()].as_int()?;
                let i = u32::try_from(i).map_err(|_| Trap::OutOfBounds(i))?;
                vals[dst.index()] = self.field(&vals[ptr.index()], i)?;
            }
            Inst::Call { dst, func, args } => {
                let args = args.iter().map(|a| vals[a.index()].clone()).collect();
                let r = self.call_function(*func, args)?;
                if let Some(d) = dst {
                    vals[d.index()] = r;
                }
            }
            Inst::CallIndirect {
                dst, callee, args, ..
            } => {
                let callee = vals[callee.index()].clone();
                let args = args.iter().map(|a| vals[a.index()].clone()).collect();
                let r = self.call_value(&callee, args)?;
                if let Some(d) = dst {
                    vals[d.index()] = r;
                }
            }
            Inst::BitCast { dst, value, .. } => {
                vals[dst.index()] = vals[value.index()].clone();
            }
            Inst::Binary { dst, op, lhs, rhs } => {
                vals[dst.index()] = binary(*op, &vals[lhs.index()], &vals[rhs.index()])?;
            }
            Inst::Cmp {
                dst,
                pred,
                lhs,
                rhs,
            } => {
                vals[dst.index()] =
                    Value::Bool(compare(*pred, &vals[lhs.index()], &vals[rhs.index()])?);
            }
            Inst::Not { dst, value } => {
                vals[dst.index()] = Value::Bool(!vals[value.index()].as_bool()?);
            }
            Inst::FNeg { dst, value } => {
                vals[dst.index()] = Value::Float(-vals[value.index()].as_f64()?);
            }
        }
        Ok(())
    }
}

fn const_value(c: &Const) -> Value {
    match c {
        Const::Int { value, .. } => Value::Int(*value),
        Const::Float(v) => Value::Float(*v),
        Const::Bool(b) => Value::Bool(*b),
        Const::Null => Value::NULL,
        Const::Str(s) => Value::Str(Rc::from(s.as_str())),
        Const::Func(f) => Value::Func(*f),
        Const::Global(g) => Value::Ptr(Some(Pointer::root(Region::Global(*g)))),
    }
}

fn init_value(module: &Module, ty: TyId, init: &ConstInit) -> Value {
    match init {
        ConstInit::Zero => zero_value(&module.types, ty),
        ConstInit::Scalar(c) => const_value(c),
        ConstInit::Aggregate(items) => {
            let elem_tys: Vec<TyId> = match module.types.get(ty) {
                crate::LirType::Struct {
                    fields: Some(f), ..
                } => f.clone(),
                crate::LirType::Array { elem, len } => vec![*elem; *len as usize],
                _ => Vec::new(),
            };
            Value::Agg(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let ety = elem_tys.get(i).copied().unwrap_or(TyId::PTR);
                        init_value(module, ety, item)
                    })
                    .collect(),
            )
        }
    }
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, Trap> {
    Ok(match op {
        BinOp::FAdd => Value::Float(lhs.as_f64()? + rhs.as_f64()?),
        BinOp::FSub => Value::Float(lhs.as_f64()? - rhs.as_f64()?),
        BinOp::FMul => Value::Float(lhs.as_f64()? * rhs.as_f64()?),
        BinOp::FDiv => Value::Float(lhs.as_f64()? / rhs.as_f64()?),
        BinOp::Add => Value::Int(lhs.as_int()?.wrapping_add(rhs.as_int()?)),
        BinOp::Sub => Value::Int(lhs.as_int()?.wrapping_sub(rhs.as_int()?)),
        BinOp::Mul => Value::Int(lhs.as_int()?.wrapping_mul(rhs.as_int()?)),
        BinOp::And => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(*a && *b),
            _ => Value::Int(lhs.as_int()? & rhs.as_int()?),
        },
        BinOp::Or => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(*a || *b),
            _ => Value::Int(lhs.as_int()? | rhs.as_int()?),
        },
        BinOp::Concat => {
            let mut s = String::from(lhs.as_str()?);
            s.push_str(rhs.as_str()?);
            Value::Str(Rc::from(s))
        }
    })
}

fn compare(pred: CmpPred, lhs: &Value, rhs: &Value) -> Result<bool, Trap> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (lhs, rhs) {
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (
            Value::Ptr(_) | Value::Func(_) | Value::Host(_),
            Value::Ptr(_) | Value::Func(_) | Value::Host(_),
        ) => {
            let eq = lhs == rhs;
            return match pred {
                CmpPred::Eq => Ok(eq),
                CmpPred::Ne => Ok(!eq),
                _ => Err(Trap::TypeMismatch("ordered comparison of pointers".to_owned())),
            };
        }
        _ => {
            return Err(Trap::TypeMismatch(format!(
                "cannot compare {} with {}",
                lhs.kind(),
                rhs.kind()
            )))
        }
    };
    // NaN compares unequal to everything.
    let Some(ord) = ordering else {
        return Ok(pred == CmpPred::Ne);
    };
    Ok(match pred {
        CmpPred::Eq => ord == Ordering::Equal,
        CmpPred::Ne => ord != Ordering::Equal,
        CmpPred::Lt => ord == Ordering::Less,
        CmpPred::Gt => ord == Ordering::Greater,
        CmpPred::Le => ord != Ordering::Greater,
        CmpPred::Ge => ord != Ordering::Less,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
