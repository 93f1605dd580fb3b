//! Free-variable discovery over declaration bodies.
//!
//! The walker reports references in discovery order. Identifiers local to
//! the unit (parameters, `let`s, nested declarations, at any block depth)
//! are filtered out here; resolving what is left against the declaration
//! site is the builder's job.
//!
//! Nested function literals and nested declarations are walked too: their
//! free names become free names of the enclosing unit, which must capture
//! them so the nested closure can be filled when it is created.

use rustc_hash::FxHashSet;
use tsn_ir::{
    Body, DeclFlags, DeclId, DeclKind, ExprId, ExprKind, FunctionKind, Name, Program,
    ProgramError, StmtId, StmtKind,
};

/// One reference that may extend the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ref {
    Name(Name),
    /// Callee identifier the front end resolved to a declaration.
    Callee(Name, DeclId),
    This,
    /// `this.<name>`, possibly a method or accessor.
    Member(Name),
    /// `super.<name>`
    SuperMember(Name),
    /// `super(...)`
    BaseCtor,
    /// `new C(...)`
    Construct(DeclId),
}

/// The unit whose body is walked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Function(DeclId),
    /// Constructor synthesized for a class that declares none.
    ImplicitCtor(DeclId),
}

#[derive(Debug, Default)]
pub struct FreeVars {
    /// Every name bound locally by the unit.
    pub locals: FxHashSet<Name>,
    /// Parameters and block declarations of the unit itself, not of the
    /// functions nested in it.
    pub local_decls: FxHashSet<DeclId>,
    pub refs: Vec<Ref>,
}

pub fn collect(program: &Program, unit: Unit) -> Result<FreeVars, ProgramError> {
    let mut w = Walker {
        program,
        frames: Vec::new(),
        member_depth: 0,
        seen: FxHashSet::default(),
        refs: Vec::new(),
    };
    let mut local_decls = FxHashSet::default();
    let locals = match unit {
        Unit::Function(decl) => {
            let f = program.function(decl)?;
            let mut frame = w.param_names(&f.params)?;
            local_decls.extend(f.params.iter().copied());
            if let Some(Body::Block(stmts)) = &f.body {
                w.block_locals(stmts, &mut frame)?;
                block_decls(program, stmts, &mut local_decls);
            }
            w.frames.push(frame);
            w.walk_defaults(&f.params)?;
            if f.kind == FunctionKind::Constructor {
                if let Some(owner) = f.owner {
                    w.walk_initializers(owner)?;
                }
            }
            match &f.body {
                Some(Body::Block(stmts)) => w.walk_stmts(stmts)?,
                Some(Body::Expr(e)) => w.walk_expr(*e)?,
                None => {}
            }
            w.frames.pop().unwrap_or_default()
        }
        Unit::ImplicitCtor(class) => {
            let params = forwarded_params(program, class)?;
            local_decls.extend(params.iter().copied());
            let frame = w.param_names(&params)?;
            w.frames.push(frame);
            if program.class(class)?.base.is_some() {
                w.push(Ref::This);
                w.push(Ref::BaseCtor);
            }
            w.walk_initializers(class)?;
            w.frames.pop().unwrap_or_default()
        }
    };
    Ok(FreeVars {
        locals,
        local_decls,
        refs: w.refs,
    })
}

fn block_decls(program: &Program, stmts: &[StmtId], out: &mut FxHashSet<DeclId>) {
    for &s in stmts {
        match &program.stmt(s).kind {
            StmtKind::Let { decl, .. } | StmtKind::Function(decl) | StmtKind::Class(decl) => {
                out.insert(*decl);
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                block_decls(program, then_branch, out);
                block_decls(program, else_branch, out);
            }
            StmtKind::While { body, .. } | StmtKind::Block(body) => block_decls(program, body, out),
            StmtKind::Expr(_) | StmtKind::Return(_) => {}
        }
    }
}

/// Parameters an implicit constructor of `class` forwards: those of the
/// nearest declared constructor up the chain.
pub fn forwarded_params(program: &Program, class: DeclId) -> Result<Vec<DeclId>, ProgramError> {
    for c in program.class_chain(class)? {
        if let Some(ctor) = program.constructor_of(c)? {
            return Ok(program.function(ctor)?.params.clone());
        }
    }
    Ok(Vec::new())
}

struct Walker<'p> {
    program: &'p Program,
    frames: Vec<FxHashSet<Name>>,
    /// Nesting depth of member functions inside the unit; `this` there
    /// belongs to the nested class, not to the unit.
    member_depth: u32,
    seen: FxHashSet<Ref>,
    refs: Vec<Ref>,
}

impl Walker<'_> {
    fn push(&mut self, r: Ref) {
        if self.seen.insert(r) {
            self.refs.push(r);
        }
    }

    fn is_local(&self, name: Name) -> bool {
        self.frames.iter().any(|f| f.contains(&name))
    }

    fn param_names(&self, params: &[DeclId]) -> Result<FxHashSet<Name>, ProgramError> {
        let mut out = FxHashSet::default();
        for &p in params {
            out.insert(self.program.decl(p)?.name);
        }
        Ok(out)
    }

    fn block_locals(&self, stmts: &[StmtId], out: &mut FxHashSet<Name>) -> Result<(), ProgramError> {
        for &s in stmts {
            match &self.program.stmt(s).kind {
                StmtKind::Let { decl, .. }
                | StmtKind::Function(decl)
                | StmtKind::Class(decl) => {
                    out.insert(self.program.decl(*decl)?.name);
                }
                StmtKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.block_locals(then_branch, out)?;
                    self.block_locals(else_branch, out)?;
                }
                StmtKind::While { body, .. } | StmtKind::Block(body) => {
                    self.block_locals(body, out)?;
                }
                StmtKind::Expr(_) | StmtKind::Return(_) => {}
            }
        }
        Ok(())
    }

    fn walk_defaults(&mut self, params: &[DeclId]) -> Result<(), ProgramError> {
        for &p in params {
            if let Some(default) = self.program.param(p)?.default {
                self.walk_expr(default)?;
            }
        }
        Ok(())
    }

    /// Own instance property initializers of `class`; they run inside the
    /// constructor.
    fn walk_initializers(&mut self, class: DeclId) -> Result<(), ProgramError> {
        for &m in &self.program.class(class)?.members {
            let decl = self.program.decl(m)?;
            if decl.flags.contains(DeclFlags::STATIC) {
                continue;
            }
            if let DeclKind::Property(p) = &decl.kind {
                if let Some(init) = p.init {
                    self.walk_expr(init)?;
                }
            }
        }
        Ok(())
    }

    fn walk_nested_function(&mut self, decl: DeclId) -> Result<(), ProgramError> {
        let f = self.program.function(decl)?;
        let mut frame = self.param_names(&f.params)?;
        if let Some(Body::Block(stmts)) = &f.body {
            self.block_locals(stmts, &mut frame)?;
        }
        let own_this = f.kind != FunctionKind::Arrow;
        if own_this {
            self.member_depth += 1;
        }
        self.frames.push(frame);
        self.walk_defaults(&f.params)?;
        match &f.body {
            Some(Body::Block(stmts)) => self.walk_stmts(stmts)?,
            Some(Body::Expr(e)) => self.walk_expr(*e)?,
            None => {}
        }
        self.frames.pop();
        if own_this {
            self.member_depth -= 1;
        }
        Ok(())
    }

    fn walk_nested_class(&mut self, class: DeclId) -> Result<(), ProgramError> {
        for &m in &self.program.class(class)?.members {
            let decl = self.program.decl(m)?;
            match &decl.kind {
                DeclKind::Function(_) => self.walk_nested_function(m)?,
                DeclKind::Property(p) => {
                    if let Some(init) = p.init {
                        let is_static = decl.flags.contains(DeclFlags::STATIC);
                        if !is_static {
                            self.member_depth += 1;
                        }
                        self.walk_expr(init)?;
                        if !is_static {
                            self.member_depth -= 1;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn walk_stmts(&mut self, stmts: &[StmtId]) -> Result<(), ProgramError> {
        for &s in stmts {
            self.walk_stmt(s)?;
        }
        Ok(())
    }

    fn walk_stmt(&mut self, id: StmtId) -> Result<(), ProgramError> {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
            match &self.program.stmt(id).kind {
                StmtKind::Let { init, .. } => {
                    if let Some(init) = init {
                        self.walk_expr(*init)?;
                    }
                }
                StmtKind::Expr(e) => self.walk_expr(*e)?,
                StmtKind::Return(e) => {
                    if let Some(e) = e {
                        self.walk_expr(*e)?;
                    }
                }
                StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    self.walk_expr(*cond)?;
                    self.walk_stmts(then_branch)?;
                    self.walk_stmts(else_branch)?;
                }
                StmtKind::While { cond, body } => {
                    self.walk_expr(*cond)?;
                    self.walk_stmts(body)?;
                }
                StmtKind::Block(body) => self.walk_stmts(body)?,
                StmtKind::Function(decl) => self.walk_nested_function(*decl)?,
                StmtKind::Class(decl) => self.walk_nested_class(*decl)?,
            }
            Ok(())
        })
    }

    fn walk_expr(&mut self, id: ExprId) -> Result<(), ProgramError> {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
            let at_unit = self.member_depth == 0;
            match &self.program.expr(id).kind {
                ExprKind::Number(_)
                | ExprKind::String(_)
                | ExprKind::Bool(_)
                | ExprKind::Null
                | ExprKind::Undefined
                | ExprKind::Super => {}
                ExprKind::Ident(name) => {
                    if !self.is_local(*name) {
                        self.push(Ref::Name(*name));
                    }
                }
                ExprKind::This => {
                    if at_unit {
                        self.push(Ref::This);
                    }
                }
                ExprKind::Property { object, name } => {
                    match self.program.expr(*object).kind {
                        ExprKind::This if at_unit => {
                            self.push(Ref::This);
                            self.push(Ref::Member(*name));
                        }
                        ExprKind::Super if at_unit => {
                            self.push(Ref::This);
                            self.push(Ref::SuperMember(*name));
                        }
                        _ => self.walk_expr(*object)?,
                    }
                }
                ExprKind::Call {
                    callee,
                    args,
                    target,
                } => {
                    match (&self.program.expr(*callee).kind, target) {
                        (ExprKind::Super, _) => {
                            if at_unit {
                                self.push(Ref::This);
                                self.push(Ref::BaseCtor);
                            }
                        }
                        (ExprKind::Ident(name), Some(decl)) => {
                            if !self.is_local(*name) {
                                self.push(Ref::Callee(*name, *decl));
                            }
                        }
                        _ => self.walk_expr(*callee)?,
                    }
                    for &a in args {
                        self.walk_expr(a)?;
                    }
                }
                ExprKind::New { class, args } => {
                    let name = self.program.decl(*class)?.name;
                    if !self.is_local(name) {
                        self.push(Ref::Construct(*class));
                    }
                    for &a in args {
                        self.walk_expr(a)?;
                    }
                }
                ExprKind::Function(decl) => self.walk_nested_function(*decl)?,
                ExprKind::Object(fields) => {
                    for &(_, v) in fields {
                        self.walk_expr(v)?;
                    }
                }
                ExprKind::Assign { target, value } => {
                    self.walk_expr(*target)?;
                    self.walk_expr(*value)?;
                }
                ExprKind::Binary { lhs, rhs, .. } => {
                    self.walk_expr(*lhs)?;
                    self.walk_expr(*rhs)?;
                }
                ExprKind::Unary { operand, .. } => self.walk_expr(*operand)?,
                ExprKind::As { expr, .. } => self.walk_expr(*expr)?,
            }
            Ok(())
        })
    }
}
