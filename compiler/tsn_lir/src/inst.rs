//! Instructions and terminators.

use crate::{BlockId, FuncId, GlobalId, TyId, ValueId};

/// Scalar constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Const {
    /// Integer of type `ty` (`i1` excluded, see [`Const::Bool`]).
    Int { ty: TyId, value: i64 },
    Float(f64),
    Bool(bool),
    /// Null pointer.
    Null,
    Str(String),
    /// Address of a function.
    Func(FuncId),
    /// Address of a global.
    Global(GlobalId),
}

impl Const {
    /// Type of the constant when materialized.
    pub fn ty(&self) -> TyId {
        match self {
            Const::Int { ty, .. } => *ty,
            Const::Float(_) => TyId::F64,
            Const::Bool(_) => TyId::I1,
            Const::Str(_) => TyId::STR,
            Const::Null | Const::Func(_) | Const::Global(_) => TyId::PTR,
        }
    }
}

/// Initializer of a defined global.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstInit {
    /// Zero value of the global's type.
    Zero,
    Scalar(Const),
    Aggregate(Vec<ConstInit>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    Add,
    Sub,
    Mul,
    /// Bitwise on `i1`/integers.
    And,
    Or,
    /// String concatenation.
    Concat,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Concat => "concat",
        }
    }
}

/// Comparison predicate. Operand kind (int, float, bool, str, ptr) is
/// taken from the operands; ordering predicates are numeric only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Lt => "lt",
            CmpPred::Gt => "gt",
            CmpPred::Le => "le",
            CmpPred::Ge => "ge",
        }
    }
}

/// Non-terminator instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    Const {
        dst: ValueId,
        value: Const,
    },
    /// Zero-initialized heap allocation of `ty` through the allocator.
    Alloc {
        dst: ValueId,
        ty: TyId,
    },
    Load {
        dst: ValueId,
        ty: TyId,
        ptr: ValueId,
    },
    Store {
        value: ValueId,
        ptr: ValueId,
    },
    /// Address of field `index` of the struct `ty` at `ptr`.
    StructGep {
        dst: ValueId,
        ty: TyId,
        ptr: ValueId,
        index: u32,
    },
    /// Address of element `index` (a runtime value) of the array at `ptr`.
    IndexGep {
        dst: ValueId,
        elem: TyId,
        ptr: ValueId,
        index: ValueId,
    },
    Call {
        dst: Option<ValueId>,
        func: FuncId,
        args: Vec<ValueId>,
    },
    CallIndirect {
        dst: Option<ValueId>,
        sig: TyId,
        callee: ValueId,
        args: Vec<ValueId>,
    },
    BitCast {
        dst: ValueId,
        value: ValueId,
        ty: TyId,
    },
    Binary {
        dst: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cmp {
        dst: ValueId,
        pred: CmpPred,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Boolean negation of an `i1`.
    Not {
        dst: ValueId,
        value: ValueId,
    },
    FNeg {
        dst: ValueId,
        value: ValueId,
    },
}

impl Inst {
    /// The value defined by this instruction, if any.
    pub fn defined(&self) -> Option<ValueId> {
        match self {
            Inst::Const { dst, .. }
            | Inst::Alloc { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::StructGep { dst, .. }
            | Inst::IndexGep { dst, .. }
            | Inst::BitCast { dst, .. }
            | Inst::Binary { dst, .. }
            | Inst::Cmp { dst, .. }
            | Inst::Not { dst, .. }
            | Inst::FNeg { dst, .. } => Some(*dst),
            Inst::Call { dst, .. } | Inst::CallIndirect { dst, .. } => *dst,
            Inst::Store { .. } => None,
        }
    }
}

/// Block exit.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Ret(Option<ValueId>),
    Br(BlockId),
    CondBr {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Multi-way branch on an integer value.
    Switch {
        value: ValueId,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    Unreachable,
}
