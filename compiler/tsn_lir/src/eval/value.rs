//! Runtime values of the reference interpreter.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::{FuncId, GlobalId, LirType, TyId, TypeTable};

use super::Trap;

/// Handle to a registered host function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostFnId(pub(super) u32);

/// Root of a pointer: one heap allocation or one global.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    Heap(u32),
    Global(GlobalId),
}

/// A non-null pointer: a region plus a field/element path inside it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub region: Region,
    pub path: SmallVec<[u32; 4]>,
}

impl Pointer {
    pub fn root(region: Region) -> Self {
        Pointer {
            region,
            path: SmallVec::new(),
        }
    }

    /// Pointer to sub-element `index`.
    #[must_use]
    pub fn child(&self, index: u32) -> Self {
        let mut p = self.clone();
        p.path.push(index);
        p
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            Region::Heap(h) => write!(f, "heap#{h}")?,
            Region::Global(g) => write!(f, "global#{}", g.raw())?,
        }
        for i in &self.path {
            write!(f, ".{i}")?;
        }
        Ok(())
    }
}

/// A runtime value.
///
/// Memory is typed by value shape, not by bytes: an allocation of a struct
/// holds an [`Value::Agg`] with one entry per field, and function pointers
/// are kept symbolic.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Never written (external global not yet supplied by the host).
    Undef,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// `None` is the null pointer.
    Ptr(Option<Pointer>),
    /// Address of a module function.
    Func(FuncId),
    /// Address of a host function.
    Host(HostFnId),
    Agg(Vec<Value>),
}

impl Value {
    pub const NULL: Value = Value::Ptr(None);

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ptr(None))
    }

    pub fn as_pointer(&self) -> Result<&Pointer, Trap> {
        match self {
            Value::Ptr(Some(p)) => Ok(p),
            Value::Ptr(None) => Err(Trap::NullDeref),
            other => Err(mismatch("pointer", other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Trap> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            other => Err(mismatch("i1", other)),
        }
    }

    pub fn as_int(&self) -> Result<i64, Trap> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            other => Err(mismatch("integer", other)),
        }
    }

    pub fn as_f64(&self) -> Result<f64, Trap> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(mismatch("f64", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, Trap> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(mismatch("str", other)),
        }
    }

    /// Short tag for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undef => "undef",
            Value::Bool(_) => "i1",
            Value::Int(_) => "int",
            Value::Float(_) => "f64",
            Value::Str(_) => "str",
            Value::Ptr(_) => "ptr",
            Value::Func(_) => "fn",
            Value::Host(_) => "host fn",
            Value::Agg(_) => "aggregate",
        }
    }
}

pub(super) fn mismatch(expected: &str, found: &Value) -> Trap {
    Trap::TypeMismatch(format!("expected {expected}, found {}", found.kind()))
}

/// The zero value of `ty`, as produced by the allocator.
pub fn zero_value(types: &TypeTable, ty: TyId) -> Value {
    match types.get(ty) {
        LirType::Void | LirType::Func { .. } => Value::Undef,
        LirType::I1 => Value::Bool(false),
        LirType::I8 | LirType::I32 | LirType::I64 => Value::Int(0),
        LirType::F64 => Value::Float(0.0),
        LirType::Str => Value::Str(Rc::from("")),
        LirType::Ptr => Value::NULL,
        LirType::Struct { fields, .. } => Value::Agg(
            fields
                .iter()
                .flatten()
                .map(|&f| zero_value(types, f))
                .collect(),
        ),
        LirType::Array { elem, len } => {
            let zero = zero_value(types, *elem);
            Value::Agg(vec![zero; *len as usize])
        }
    }
}
