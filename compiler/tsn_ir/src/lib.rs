//! Resolved program representation for the tsn backend.
//!
//! This crate is the contract between the front end (parser + type checker)
//! and code generation. Everything here is already resolved: identifiers
//! carry interned [`Name`]s, every node has a stable numeric id assigned
//! once at construction, and types are interned in a [`TypePool`].
//!
//! # Layout
//!
//! - [`name`]: interned strings ([`Name`], [`StringInterner`])
//! - [`span`]: source locations
//! - [`types`]: the TS type pool ([`TsType`], [`TypeId`])
//! - [`ast`]: closed expression/statement variant sets
//! - [`decl`]: declarations and [`DeclFlags`]
//! - [`program`]: the arena that owns all of the above
//! - [`builder`]: [`ProgramBuilder`], a convenience constructor

pub mod ast;
pub mod builder;
pub mod decl;
pub mod name;
pub mod program;
pub mod span;
pub mod types;

pub use ast::{BinaryOp, Expr, ExprId, ExprKind, Stmt, StmtId, StmtKind, UnaryOp};
pub use builder::ProgramBuilder;
pub use decl::{
    Body, ClassDecl, Decl, DeclFlags, DeclId, DeclKind, FunctionDecl, FunctionKind,
    InterfaceDecl, ParamDecl, PropertyDecl, VariableDecl,
};
pub use name::{Name, StringInterner};
pub use program::{Program, ProgramError};
pub use span::Span;
pub use types::{FunctionType, TsType, TypeId, TypePool};
