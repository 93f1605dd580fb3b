//! Expressions and statements.
//!
//! Both are closed variant sets stored in arenas owned by the
//! [`Program`](crate::Program) and referenced by stable ids. Consumers
//! dispatch with an exhaustive `match`; adding a variant is a compile
//! error at every consumer.

use crate::{DeclId, Name, Span, TypeId};

// ── IDs ─────────────────────────────────────────────────────────────

/// Index of an expression in the program arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        ExprId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a statement in the program arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StmtId(u32);

impl StmtId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        StmtId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Operators ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    LtEq,
    GtEq,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNotEq,
    /// `&&`, short-circuiting.
    And,
    /// `||`, short-circuiting.
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::LtEq
                | BinaryOp::GtEq
                | BinaryOp::StrictEq
                | BinaryOp::StrictNotEq
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    /// `++`/`--` in either position.
    pub fn is_update(self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        )
    }
}

// ── Expressions ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Number(f64),
    String(Name),
    Bool(bool),
    Null,
    Undefined,
    Ident(Name),
    This,
    /// Only valid as a callee (`super(...)`) or property receiver (`super.m`).
    Super,
    Property {
        object: ExprId,
        name: Name,
    },
    /// `target` is the front end's statically resolved callee, if any.
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
        target: Option<DeclId>,
    },
    New {
        class: DeclId,
        args: Vec<ExprId>,
    },
    /// Arrow function or function expression literal.
    Function(DeclId),
    Object(Vec<(Name, ExprId)>),
    Assign {
        target: ExprId,
        value: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    /// `expr as T`, also inserted by the front end for implicit conversions.
    As {
        expr: ExprId,
        ty: TypeId,
    },
}

// ── Statements ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    /// `let`/`const`; the declaration carries name, type and flags.
    Let {
        decl: DeclId,
        init: Option<ExprId>,
    },
    Expr(ExprId),
    Return(Option<ExprId>),
    If {
        cond: ExprId,
        then_branch: Vec<StmtId>,
        else_branch: Vec<StmtId>,
    },
    While {
        cond: ExprId,
        body: Vec<StmtId>,
    },
    Block(Vec<StmtId>),
    /// Hoisted function declaration.
    Function(DeclId),
    Class(DeclId),
}
