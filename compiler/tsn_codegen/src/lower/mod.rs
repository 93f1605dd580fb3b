//! Function body lowering.
//!
//! `FnLowerer` owns the state of one function body under construction
//! (builder, scope, environment pointer, `this`) and dispatches each
//! `ExprKind` / `StmtKind` to a focused `lower_*` method implemented in
//! separate files.
//!
//! # Architecture
//!
//! ```text
//! FnLowerer
//!   ├── lower_literals.rs  : Number, String, Bool, Null, Ident, This, Object
//!   ├── lower_operators.rs : Binary, Unary, Assign, truthiness
//!   ├── lower_calls.rs     : Call, direct and native calls, capture filling
//!   ├── lower_lambdas.rs   : function values, bound methods
//!   ├── lower_classes.rs   : New, constructors, properties, accessors, statics
//!   ├── lower_statements.rs: Let, If, While, Return, blocks and hoisting
//!   └── coerce.rs          : representation changes between TypeInfos
//! ```
//!
//! Unions, intersections, closures and vtables add their own
//! `impl FnLowerer` blocks in the crate-level modules of the same names.

mod coerce;
mod lower_calls;
mod lower_classes;
mod lower_lambdas;
mod lower_literals;
mod lower_operators;
mod lower_statements;

use std::rc::Rc;

use tsn_ir::{DeclId, ExprId, ExprKind, Name, TypeId};
use tsn_lir::{FunctionBody, FunctionBuilder, TyId, ValueId};

use crate::context::{CodegenCx, DeclSite};
use crate::error::{CodegenError, CodegenResult};
use crate::registry::EnvId;
use crate::scope::{Scope, ScopeBinding};
use crate::type_info::{Repr, TypeInfo};
use crate::type_mapper::TypeMapper;

// ---------------------------------------------------------------------------
// Lowered
// ---------------------------------------------------------------------------

/// A lowered expression: its SSA value and what the value is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Lowered {
    pub value: ValueId,
    pub info: TypeInfo,
    pub repr: Repr,
}

impl Lowered {
    pub fn boxed(value: ValueId, info: TypeInfo) -> Self {
        Lowered {
            value,
            info,
            repr: Repr::Boxed,
        }
    }

    pub fn raw(value: ValueId, info: TypeInfo) -> Self {
        Lowered {
            value,
            info,
            repr: Repr::Raw,
        }
    }
}

/// Environment of the body being lowered.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CurrentEnv {
    pub id: EnvId,
    pub ptr: ValueId,
}

/// How `return` behaves in the current body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ReturnKind {
    /// The entry function returns nothing.
    Entry,
    /// Constructors and setters: always return the null pointer.
    Discard,
    /// Return values are coerced to the declared type, or to the type of
    /// the first `return` when none is declared.
    Value {
        declared: Option<TypeInfo>,
        inferred: Option<TypeInfo>,
    },
}

// ---------------------------------------------------------------------------
// FnLowerer
// ---------------------------------------------------------------------------

pub(crate) struct FnLowerer<'a, 'p> {
    pub(crate) cx: &'a mut CodegenCx<'p>,
    pub(crate) b: FunctionBuilder,
    pub(crate) scope: Scope,
    pub(crate) env: Option<CurrentEnv>,
    /// The receiver, for member bodies and arrows that capture it.
    pub(crate) this: Option<Lowered>,
    /// Concrete class the body is compiled for.
    pub(crate) this_class: Option<DeclId>,
    /// Class declaring the member being lowered; `super` is relative to it.
    pub(crate) member_owner: Option<DeclId>,
    pub(crate) mapper: Rc<TypeMapper>,
    pub(crate) ret: ReturnKind,
    /// Block nesting depth; 0 is the function's top-level block.
    pub(crate) depth: u32,
    pub(crate) is_entry: bool,
    /// Declarations hoisted per open block, for site refreshes.
    hoisted: Vec<Vec<DeclId>>,
}

impl<'a, 'p> FnLowerer<'a, 'p> {
    pub(crate) fn new(
        cx: &'a mut CodegenCx<'p>,
        b: FunctionBuilder,
        scope: Scope,
        mapper: Rc<TypeMapper>,
        ret: ReturnKind,
    ) -> Self {
        FnLowerer {
            cx,
            b,
            scope,
            env: None,
            this: None,
            this_class: None,
            member_owner: None,
            mapper,
            ret,
            depth: 0,
            is_entry: false,
            hoisted: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> (FunctionBody, ReturnKind) {
        (self.b.finish(), self.ret)
    }

    pub(crate) fn name_str(&self, name: Name) -> &'p str {
        self.cx.program.name(name)
    }

    /// Lower a TS type under the current bindings.
    pub(crate) fn to_info(&mut self, ty: TypeId) -> CodegenResult<TypeInfo> {
        self.cx.to_info(ty, &self.mapper)
    }

    pub(crate) fn at_module_level(&self) -> bool {
        self.is_entry && self.depth == 0
    }

    // -----------------------------------------------------------------------
    // Main dispatch
    // -----------------------------------------------------------------------

    /// Lower an expression. Errors are tagged with the expression's span.
    pub(crate) fn lower_expr(&mut self, id: ExprId) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let expr = program.expr(id);
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || self.lower_expr_kind(&expr.kind))
            .map_err(|e| e.at(expr.span))
    }

    fn lower_expr_kind(&mut self, kind: &ExprKind) -> CodegenResult<Lowered> {
        match kind {
            ExprKind::Number(n) => Ok(self.lower_number(*n)),
            ExprKind::String(s) => Ok(self.lower_string(*s)),
            ExprKind::Bool(v) => Ok(self.lower_bool(*v)),
            ExprKind::Null | ExprKind::Undefined => Ok(self.null_value(TypeInfo::Null)),
            ExprKind::Ident(name) => self.lower_ident(*name),
            ExprKind::This => self.lower_this(),
            ExprKind::Super => Err(CodegenError::unsupported(
                "`super` outside a call or member access",
            )),
            ExprKind::Property { object, name } => self.lower_property(*object, *name),
            ExprKind::Call {
                callee,
                args,
                target,
            } => self.lower_call(*callee, args, *target),
            ExprKind::New { class, args } => self.lower_new(*class, args),
            ExprKind::Function(decl) => self.lower_function_value(*decl),
            ExprKind::Object(fields) => self.lower_object_literal(fields),
            ExprKind::Assign { target, value } => self.lower_assign(*target, *value),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, *lhs, *rhs),
            ExprKind::Unary { op, operand } => self.lower_unary(*op, *operand),
            ExprKind::As { expr, ty } => {
                let value = self.lower_expr(*expr)?;
                let target = self.to_info(*ty)?;
                self.coerce(value, target)
            }
        }
    }

    /// Lower each argument in order.
    pub(crate) fn lower_args(&mut self, args: &[ExprId]) -> CodegenResult<Vec<Lowered>> {
        args.iter().map(|&a| self.lower_expr(a)).collect()
    }

    // -----------------------------------------------------------------------
    // Representation helpers
    // -----------------------------------------------------------------------

    /// Pointer-sized form of `v`: raw scalars are moved into a fresh cell.
    pub(crate) fn boxed(&mut self, v: Lowered) -> ValueId {
        match (v.repr, v.info.cell_type()) {
            (Repr::Raw, Some(cell)) => {
                let p = self.b.alloc(cell, "box");
                self.b.store(v.value, p);
                p
            }
            _ => v.value,
        }
    }

    pub(crate) fn to_boxed(&mut self, v: Lowered) -> Lowered {
        Lowered::boxed(self.boxed(v), v.info)
    }

    /// Scalar form of a primitive value.
    pub(crate) fn raw(&mut self, v: Lowered) -> CodegenResult<ValueId> {
        match (v.repr, v.info.cell_type()) {
            (Repr::Raw, _) => Ok(v.value),
            (Repr::Boxed, Some(cell)) => Ok(self.b.load(cell, v.value, "unbox")),
            (Repr::Boxed, None) => Err(CodegenError::invalid(format!(
                "`{}` has no scalar form",
                self.cx.info_name(v.info)
            ))),
        }
    }

    pub(crate) fn null_value(&mut self, info: TypeInfo) -> Lowered {
        let null = self.b.const_null();
        Lowered::boxed(null, info)
    }

    /// A fresh variable cell holding `value`.
    pub(crate) fn new_cell(&mut self, value: ValueId, name: &str) -> ValueId {
        let cell = self.b.alloc(TyId::PTR, name);
        self.b.store(value, cell);
        cell
    }

    pub(crate) fn load_field(&mut self, record: TyId, ptr: ValueId, index: u32, name: &str) -> ValueId {
        let p = self.b.struct_gep(record, ptr, index, name);
        self.b.load(TyId::PTR, p, name)
    }

    pub(crate) fn store_field(&mut self, record: TyId, ptr: ValueId, index: u32, value: ValueId) {
        let p = self.b.struct_gep(record, ptr, index, "field");
        self.b.store(value, p);
    }

    // -----------------------------------------------------------------------
    // Declaration sites
    // -----------------------------------------------------------------------

    /// What a declaration made here can see.
    pub(crate) fn current_site(&self) -> DeclSite {
        DeclSite {
            scope: self.scope.clone(),
            outer: self.env.map(|e| e.id),
            this_class: self.this_class,
            mapper: Rc::clone(&self.mapper),
        }
    }

    pub(crate) fn bind_declaration(&mut self, name: Name, binding: ScopeBinding) {
        self.scope.bind(name, binding);
        if self.at_module_level() {
            self.cx.module_scope.bind(name, binding);
        }
    }

    /// Record sites for the declarations hoisted into the block being opened.
    pub(crate) fn open_block(&mut self, decls: Vec<DeclId>) {
        let site = self.current_site();
        for &d in &decls {
            self.cx.record_site(d, site.clone());
        }
        self.hoisted.push(decls);
    }

    pub(crate) fn close_block(&mut self) {
        self.hoisted.pop();
    }

    /// A `let` came into view: declarations of the current block see it.
    pub(crate) fn refresh_sites(&mut self) {
        let Some(decls) = self.hoisted.last() else {
            return;
        };
        if decls.is_empty() {
            return;
        }
        let decls = decls.clone();
        let site = self.current_site();
        for d in decls {
            self.cx.record_site(d, site.clone());
        }
    }
}
