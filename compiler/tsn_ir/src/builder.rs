//! Bottom-up construction of a [`Program`].
//!
//! A front end (or a test) creates leaves first and composes them: the
//! builder hands back ids and never requires a parent to exist before its
//! children. Every node gets a distinct synthetic span so diagnostics can
//! point at it even without source text.

use crate::{
    BinaryOp, Body, ClassDecl, Decl, DeclFlags, DeclId, DeclKind, Expr, ExprId, ExprKind,
    FunctionDecl, FunctionKind, InterfaceDecl, Name, ParamDecl, Program, PropertyDecl, Span,
    Stmt, StmtId, StmtKind, TypeId, TypePool, UnaryOp, VariableDecl,
};

/// Incremental [`Program`] constructor.
#[derive(Default)]
pub struct ProgramBuilder {
    program: Program,
    next_offset: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Program {
        self.program
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn name(&mut self, s: &str) -> Name {
        self.program.interner.intern(s)
    }

    pub fn types(&mut self) -> &mut TypePool {
        &mut self.program.types
    }

    fn span(&mut self) -> Span {
        self.next_offset += 1;
        Span::new(self.next_offset, self.next_offset + 1)
    }

    // ── Types ───────────────────────────────────────────────────────

    pub fn class_type(&mut self, class: DeclId) -> TypeId {
        self.program.types.class(class)
    }

    pub fn union_type(&mut self, members: &[TypeId]) -> TypeId {
        self.program.types.union(members)
    }

    pub fn intersection_type(&mut self, members: &[TypeId]) -> TypeId {
        self.program.types.intersection(members)
    }

    pub fn optional_type(&mut self, ty: TypeId) -> TypeId {
        self.program.types.optional(ty)
    }

    pub fn type_param(&mut self, name: &str) -> TypeId {
        let n = self.name(name);
        self.program.types.type_param(n)
    }

    pub fn fn_type(&mut self, params: &[TypeId], ret: TypeId) -> TypeId {
        self.program.types.function(params.to_vec(), ret, None)
    }

    pub fn object_type(&mut self, fields: &[(&str, TypeId)]) -> TypeId {
        let fields = fields.iter().map(|&(n, t)| (self.name(n), t)).collect();
        self.program.types.object(fields)
    }

    /// Declare an interface with the given properties; returns its type.
    pub fn interface(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId {
        let iface = self.push_decl(
            name,
            DeclFlags::empty(),
            DeclKind::Interface(InterfaceDecl {
                properties: Vec::new(),
            }),
        );
        let mut props = Vec::with_capacity(fields.len());
        for &(field, ty) in fields {
            props.push(self.push_decl(
                field,
                DeclFlags::empty(),
                DeclKind::Property(PropertyDecl {
                    ty,
                    init: None,
                    owner: iface,
                }),
            ));
        }
        if let DeclKind::Interface(i) = &mut self.program.decls[iface.index()].kind {
            i.properties = props;
        }
        self.program.types.interface(iface)
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn expr(&mut self, kind: ExprKind) -> ExprId {
        let span = self.span();
        let id = ExprId::from_raw(u32::try_from(self.program.exprs.len()).unwrap_or(u32::MAX));
        self.program.exprs.push(Expr { kind, span });
        id
    }

    pub fn num(&mut self, value: f64) -> ExprId {
        self.expr(ExprKind::Number(value))
    }

    pub fn str(&mut self, value: &str) -> ExprId {
        let n = self.name(value);
        self.expr(ExprKind::String(n))
    }

    pub fn bool(&mut self, value: bool) -> ExprId {
        self.expr(ExprKind::Bool(value))
    }

    pub fn null(&mut self) -> ExprId {
        self.expr(ExprKind::Null)
    }

    pub fn undefined(&mut self) -> ExprId {
        self.expr(ExprKind::Undefined)
    }

    pub fn ident(&mut self, name: &str) -> ExprId {
        let n = self.name(name);
        self.expr(ExprKind::Ident(n))
    }

    pub fn this(&mut self) -> ExprId {
        self.expr(ExprKind::This)
    }

    pub fn super_(&mut self) -> ExprId {
        self.expr(ExprKind::Super)
    }

    pub fn prop(&mut self, object: ExprId, name: &str) -> ExprId {
        let name = self.name(name);
        self.expr(ExprKind::Property { object, name })
    }

    /// `this.<name>`
    pub fn this_prop(&mut self, name: &str) -> ExprId {
        let this = self.this();
        self.prop(this, name)
    }

    pub fn call(&mut self, callee: ExprId, args: &[ExprId]) -> ExprId {
        self.expr(ExprKind::Call {
            callee,
            args: args.to_vec(),
            target: None,
        })
    }

    /// Call with a statically resolved target.
    pub fn call_decl(&mut self, callee: ExprId, args: &[ExprId], target: DeclId) -> ExprId {
        self.expr(ExprKind::Call {
            callee,
            args: args.to_vec(),
            target: Some(target),
        })
    }

    /// `<receiver>.<method>(args)`
    pub fn method_call(&mut self, receiver: ExprId, method: &str, args: &[ExprId]) -> ExprId {
        let callee = self.prop(receiver, method);
        self.call(callee, args)
    }

    pub fn new_(&mut self, class: DeclId, args: &[ExprId]) -> ExprId {
        self.expr(ExprKind::New {
            class,
            args: args.to_vec(),
        })
    }

    pub fn object(&mut self, fields: &[(&str, ExprId)]) -> ExprId {
        let fields = fields.iter().map(|&(n, e)| (self.name(n), e)).collect();
        self.expr(ExprKind::Object(fields))
    }

    pub fn assign(&mut self, target: ExprId, value: ExprId) -> ExprId {
        self.expr(ExprKind::Assign { target, value })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.expr(ExprKind::Binary { op, lhs, rhs })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.expr(ExprKind::Unary { op, operand })
    }

    pub fn as_(&mut self, expr: ExprId, ty: TypeId) -> ExprId {
        self.expr(ExprKind::As { expr, ty })
    }

    /// Arrow function literal.
    pub fn arrow(&mut self, params: &[DeclId], ret: Option<TypeId>, body: Body) -> ExprId {
        let decl = self.function_decl("", FunctionKind::Arrow, &[], params, ret, Some(body), None);
        self.expr(ExprKind::Function(decl))
    }

    /// Generic arrow function literal.
    pub fn generic_arrow(
        &mut self,
        type_params: &[&str],
        params: &[DeclId],
        ret: Option<TypeId>,
        body: Body,
    ) -> ExprId {
        let decl = self.function_decl(
            "",
            FunctionKind::Arrow,
            type_params,
            params,
            ret,
            Some(body),
            None,
        );
        self.expr(ExprKind::Function(decl))
    }

    // ── Declarations ────────────────────────────────────────────────

    fn push_decl(&mut self, name: &str, flags: DeclFlags, kind: DeclKind) -> DeclId {
        let name = self.name(name);
        let span = self.span();
        let id = DeclId::from_raw(u32::try_from(self.program.decls.len()).unwrap_or(u32::MAX));
        self.program.decls.push(Decl {
            name,
            span,
            flags,
            kind,
        });
        id
    }

    pub fn param(&mut self, name: &str, ty: TypeId) -> DeclId {
        self.push_decl(
            name,
            DeclFlags::empty(),
            DeclKind::Parameter(ParamDecl { ty, default: None }),
        )
    }

    /// `name?: T`; the parameter's type becomes `T | undefined`.
    pub fn optional_param(&mut self, name: &str, ty: TypeId) -> DeclId {
        let ty = self.program.types.union(&[ty, TypeId::UNDEFINED]);
        self.push_decl(
            name,
            DeclFlags::OPTIONAL,
            DeclKind::Parameter(ParamDecl { ty, default: None }),
        )
    }

    pub fn param_with_default(&mut self, name: &str, ty: TypeId, default: ExprId) -> DeclId {
        self.push_decl(
            name,
            DeclFlags::OPTIONAL,
            DeclKind::Parameter(ParamDecl {
                ty,
                default: Some(default),
            }),
        )
    }

    #[allow(clippy::too_many_arguments, reason = "mirrors the declaration fields")]
    fn function_decl(
        &mut self,
        name: &str,
        kind: FunctionKind,
        type_params: &[&str],
        params: &[DeclId],
        ret: Option<TypeId>,
        body: Option<Body>,
        owner: Option<DeclId>,
    ) -> DeclId {
        let type_params = type_params.iter().map(|t| self.name(t)).collect();
        self.push_decl(
            name,
            DeclFlags::empty(),
            DeclKind::Function(FunctionDecl {
                kind,
                params: params.to_vec(),
                ret,
                body,
                type_params,
                owner,
            }),
        )
    }

    /// Function declaration with a block body.
    pub fn function(
        &mut self,
        name: &str,
        params: &[DeclId],
        ret: Option<TypeId>,
        body: Vec<StmtId>,
    ) -> DeclId {
        self.function_decl(
            name,
            FunctionKind::Declaration,
            &[],
            params,
            ret,
            Some(Body::Block(body)),
            None,
        )
    }

    pub fn generic_function(
        &mut self,
        name: &str,
        type_params: &[&str],
        params: &[DeclId],
        ret: Option<TypeId>,
        body: Vec<StmtId>,
    ) -> DeclId {
        self.function_decl(
            name,
            FunctionKind::Declaration,
            type_params,
            params,
            ret,
            Some(Body::Block(body)),
            None,
        )
    }

    /// `declare function name(...)`: implemented by the object-code base.
    pub fn ambient_function(&mut self, name: &str, params: &[DeclId], ret: TypeId) -> DeclId {
        let id = self.function_decl(
            name,
            FunctionKind::Declaration,
            &[],
            params,
            Some(ret),
            None,
            None,
        );
        self.add_flags(id, DeclFlags::AMBIENT);
        id
    }

    pub fn add_flags(&mut self, decl: DeclId, flags: DeclFlags) {
        if let Some(d) = self.program.decls.get_mut(decl.index()) {
            d.flags |= flags;
        }
    }

    // ── Classes ─────────────────────────────────────────────────────

    /// Declare an (initially empty) class. Members are added afterwards.
    pub fn class(&mut self, name: &str, base: Option<DeclId>, flags: DeclFlags) -> DeclId {
        self.push_decl(
            name,
            flags,
            DeclKind::Class(ClassDecl {
                base,
                members: Vec::new(),
                vtable_size: None,
            }),
        )
    }

    pub fn set_vtable_size(&mut self, class: DeclId, size: u32) {
        if let Some(Decl {
            kind: DeclKind::Class(c),
            ..
        }) = self.program.decls.get_mut(class.index())
        {
            c.vtable_size = Some(size);
        }
    }

    fn add_member(&mut self, class: DeclId, member: DeclId) {
        if let Some(Decl {
            kind: DeclKind::Class(c),
            ..
        }) = self.program.decls.get_mut(class.index())
        {
            c.members.push(member);
        }
    }

    pub fn property(&mut self, class: DeclId, name: &str, ty: TypeId, init: Option<ExprId>) -> DeclId {
        let id = self.push_decl(
            name,
            DeclFlags::empty(),
            DeclKind::Property(PropertyDecl {
                ty,
                init,
                owner: class,
            }),
        );
        self.add_member(class, id);
        id
    }

    pub fn static_property(
        &mut self,
        class: DeclId,
        name: &str,
        ty: TypeId,
        init: Option<ExprId>,
    ) -> DeclId {
        let id = self.property(class, name, ty, init);
        self.add_flags(id, DeclFlags::STATIC);
        id
    }

    pub fn constructor(&mut self, class: DeclId, params: &[DeclId], body: Vec<StmtId>) -> DeclId {
        let id = self.function_decl(
            "constructor",
            FunctionKind::Constructor,
            &[],
            params,
            None,
            Some(Body::Block(body)),
            Some(class),
        );
        self.add_member(class, id);
        id
    }

    /// Ambient constructor of a native class.
    pub fn ambient_constructor(&mut self, class: DeclId, params: &[DeclId]) -> DeclId {
        let id = self.function_decl(
            "constructor",
            FunctionKind::Constructor,
            &[],
            params,
            None,
            None,
            Some(class),
        );
        self.add_flags(id, DeclFlags::AMBIENT);
        self.add_member(class, id);
        id
    }

    #[allow(clippy::too_many_arguments, reason = "mirrors the declaration fields")]
    pub fn method(
        &mut self,
        class: DeclId,
        name: &str,
        params: &[DeclId],
        ret: Option<TypeId>,
        body: Vec<StmtId>,
        flags: DeclFlags,
    ) -> DeclId {
        let id = self.function_decl(
            name,
            FunctionKind::Method,
            &[],
            params,
            ret,
            Some(Body::Block(body)),
            Some(class),
        );
        self.add_flags(id, flags);
        self.add_member(class, id);
        id
    }

    /// Bodyless method implemented by the object-code base.
    pub fn ambient_method(
        &mut self,
        class: DeclId,
        name: &str,
        params: &[DeclId],
        ret: TypeId,
        flags: DeclFlags,
    ) -> DeclId {
        let id = self.function_decl(
            name,
            FunctionKind::Method,
            &[],
            params,
            Some(ret),
            None,
            Some(class),
        );
        self.add_flags(id, flags | DeclFlags::AMBIENT);
        self.add_member(class, id);
        id
    }

    pub fn getter(&mut self, class: DeclId, name: &str, ret: TypeId, body: Vec<StmtId>) -> DeclId {
        let id = self.function_decl(
            name,
            FunctionKind::Getter,
            &[],
            &[],
            Some(ret),
            Some(Body::Block(body)),
            Some(class),
        );
        self.add_member(class, id);
        id
    }

    pub fn setter(&mut self, class: DeclId, name: &str, param: DeclId, body: Vec<StmtId>) -> DeclId {
        let id = self.function_decl(
            name,
            FunctionKind::Setter,
            &[],
            &[param],
            Some(TypeId::VOID),
            Some(Body::Block(body)),
            Some(class),
        );
        self.add_member(class, id);
        id
    }

    // ── Statements ──────────────────────────────────────────────────

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        let span = self.span();
        let id = StmtId::from_raw(u32::try_from(self.program.stmts.len()).unwrap_or(u32::MAX));
        self.program.stmts.push(Stmt { kind, span });
        id
    }

    /// `let name: ty = init`; returns the statement and the variable's declaration.
    pub fn let_decl(
        &mut self,
        name: &str,
        ty: Option<TypeId>,
        init: Option<ExprId>,
    ) -> (StmtId, DeclId) {
        let decl = self.push_decl(
            name,
            DeclFlags::empty(),
            DeclKind::Variable(VariableDecl { ty }),
        );
        (self.stmt(StmtKind::Let { decl, init }), decl)
    }

    pub fn let_(&mut self, name: &str, ty: Option<TypeId>, init: ExprId) -> StmtId {
        self.let_decl(name, ty, Some(init)).0
    }

    pub fn const_(&mut self, name: &str, ty: Option<TypeId>, init: ExprId) -> StmtId {
        let (stmt, decl) = self.let_decl(name, ty, Some(init));
        self.add_flags(decl, DeclFlags::CONST);
        stmt
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn ret(&mut self, expr: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Return(expr))
    }

    pub fn if_(&mut self, cond: ExprId, then_branch: Vec<StmtId>, else_branch: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn while_(&mut self, cond: ExprId, body: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::While { cond, body })
    }

    pub fn block(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::Block(stmts))
    }

    pub fn fn_stmt(&mut self, decl: DeclId) -> StmtId {
        self.stmt(StmtKind::Function(decl))
    }

    pub fn class_stmt(&mut self, decl: DeclId) -> StmtId {
        self.stmt(StmtKind::Class(decl))
    }

    /// Append a top-level statement.
    pub fn push_entry(&mut self, stmt: StmtId) {
        self.program.entry.push(stmt);
    }
}
