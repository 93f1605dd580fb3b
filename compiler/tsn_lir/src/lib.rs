//! Low-level instruction layer for the tsn backend.
//!
//! Code generation emits into this crate's [`Module`]: a typed,
//! LLVM-shaped IR with opaque pointers, named structs, arrays, globals,
//! direct and indirect calls. A module can be printed ([`print_module`])
//! or executed by the reference interpreter in [`eval`].
//!
//! # Layout
//!
//! - [`ids`]: `Copy` handles for values, blocks, functions, globals, types
//! - [`types`]: the type table ([`LirType`], [`TypeTable`])
//! - [`inst`]: instructions and terminators
//! - [`module`]: functions, globals, the module itself
//! - [`builder`]: [`FunctionBuilder`]
//! - [`printer`]: textual rendering
//! - [`eval`]: the [`Machine`](eval::Machine) interpreter

pub mod builder;
pub mod eval;
pub mod ids;
pub mod inst;
pub mod module;
pub mod printer;
pub mod types;

pub use builder::{FunctionBuilder, Position};
pub use ids::{BlockId, FuncId, GlobalId, TyId, ValueId};
pub use inst::{BinOp, CmpPred, Const, ConstInit, Inst, Terminator};
pub use module::{Block, Function, FunctionBody, Global, Module};
pub use printer::print_module;
pub use types::{LirType, TypeTable};
