//! Declarations.
//!
//! A [`DeclId`] is the stable identity of a declaration: it is assigned once
//! when the front end creates the node and is what every cache in code
//! generation is keyed by.

use bitflags::bitflags;

use crate::{ExprId, Name, Span, StmtId, TypeId};

/// Index of a declaration in the program arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DeclId(u32);

impl DeclId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        DeclId(raw)
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

bitflags! {
    /// Modifiers and decorators attached to a declaration.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct DeclFlags: u16 {
        /// `static` class member.
        const STATIC = 1 << 0;
        /// Method occupies a slot in the native vtable.
        const VIRTUAL = 1 << 1;
        /// Method overrides a base method.
        const OVERRIDE = 1 << 2;
        /// Class is laid out with a native vtable pointer.
        const VTABLE = 1 << 3;
        /// `declare`d: implemented by the native object-code base.
        const AMBIENT = 1 << 4;
        /// Optional parameter (`x?: T`).
        const OPTIONAL = 1 << 5;
        /// `const` binding.
        const CONST = 1 << 6;
    }
}

/// A declaration node.
#[derive(Clone, Debug, PartialEq)]
pub struct Decl {
    pub name: Name,
    pub span: Span,
    pub flags: DeclFlags,
    pub kind: DeclKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeclKind {
    Function(FunctionDecl),
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Variable(VariableDecl),
    Parameter(ParamDecl),
    Property(PropertyDecl),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Declaration,
    Method,
    Constructor,
    Arrow,
    Expression,
    Getter,
    Setter,
}

impl FunctionKind {
    /// Kinds that are class members and receive `this`.
    pub fn is_member(self) -> bool {
        matches!(
            self,
            FunctionKind::Method
                | FunctionKind::Constructor
                | FunctionKind::Getter
                | FunctionKind::Setter
        )
    }

    /// Function literals appearing in expression position.
    pub fn is_literal(self) -> bool {
        matches!(self, FunctionKind::Arrow | FunctionKind::Expression)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Block(Vec<StmtId>),
    /// Concise arrow body.
    Expr(ExprId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub kind: FunctionKind,
    /// Parameter declarations in order.
    pub params: Vec<DeclId>,
    /// Declared return type; `None` means inferred from the body.
    pub ret: Option<TypeId>,
    /// `None` for ambient declarations.
    pub body: Option<Body>,
    pub type_params: Vec<Name>,
    /// Owning class for members.
    pub owner: Option<DeclId>,
}

impl FunctionDecl {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamDecl {
    pub ty: TypeId,
    pub default: Option<ExprId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDecl {
    /// Annotated type, if any.
    pub ty: Option<TypeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDecl {
    pub ty: TypeId,
    pub init: Option<ExprId>,
    pub owner: DeclId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub base: Option<DeclId>,
    /// Properties, methods, accessors and the constructor, in source order.
    pub members: Vec<DeclId>,
    /// Native vtable length when declared by the object-code base.
    pub vtable_size: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDecl {
    /// Property declarations in order.
    pub properties: Vec<DeclId>,
}
