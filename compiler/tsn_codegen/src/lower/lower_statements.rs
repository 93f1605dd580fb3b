//! Statements, blocks and hoisting.

use tsn_ir::{DeclId, DeclKind, ExprId, StmtId, StmtKind};
use tsn_lir::{ConstInit, TyId};

use super::{FnLowerer, Lowered, ReturnKind};
use crate::error::{CodegenError, CodegenResult};
use crate::scope::ScopeBinding;
use crate::type_info::{ClosureInfo, TypeInfo};

impl FnLowerer<'_, '_> {
    /// Lower a block in the current scope. Function and class
    /// declarations are bound before any statement runs.
    pub(crate) fn lower_block(&mut self, stmts: &[StmtId]) -> CodegenResult<()> {
        let program = self.cx.program;
        let mut hoisted = Vec::new();
        for &s in stmts {
            match program.stmt(s).kind {
                StmtKind::Function(d) => {
                    self.bind_declaration(program.decl(d)?.name, ScopeBinding::Function(d));
                    hoisted.push(d);
                }
                StmtKind::Class(d) => {
                    self.bind_declaration(program.decl(d)?.name, ScopeBinding::Class(d));
                    hoisted.push(d);
                }
                _ => {}
            }
        }
        self.open_block(hoisted);
        let result = self.lower_stmts(stmts);
        self.close_block();
        result
    }

    fn lower_stmts(&mut self, stmts: &[StmtId]) -> CodegenResult<()> {
        for &s in stmts {
            // Statements after a `return` are dead.
            if self.b.is_terminated() {
                break;
            }
            self.lower_stmt(s)?;
        }
        Ok(())
    }

    /// Lower a nested block in a child scope.
    fn lower_nested_block(&mut self, stmts: &[StmtId]) -> CodegenResult<()> {
        let saved = self.scope.child();
        self.depth += 1;
        let result = self.lower_block(stmts);
        self.depth -= 1;
        self.scope = saved;
        result
    }

    fn lower_stmt(&mut self, id: StmtId) -> CodegenResult<()> {
        let program = self.cx.program;
        let stmt = program.stmt(id);
        let result = match &stmt.kind {
            StmtKind::Let { decl, init } => self.lower_let(*decl, *init),
            StmtKind::Expr(e) => self.lower_expr(*e).map(|_| ()),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(e) => Some(self.lower_expr(*e)?),
                    None => None,
                };
                self.emit_return(value)
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(*cond, then_branch, else_branch),
            StmtKind::While { cond, body } => self.lower_while(*cond, body),
            StmtKind::Block(stmts) => self.lower_nested_block(stmts),
            // Bound when the enclosing block was opened.
            StmtKind::Function(_) => Ok(()),
            StmtKind::Class(d) => self.lower_class_stmt(*d),
        };
        result.map_err(|e| e.at(stmt.span))
    }

    /// `let`/`const`. The variable takes its annotated type, else the
    /// type of its initializer.
    fn lower_let(&mut self, decl: DeclId, init: Option<ExprId>) -> CodegenResult<()> {
        let program = self.cx.program;
        let d = program.decl(decl)?;
        let DeclKind::Variable(var) = &d.kind else {
            return Err(CodegenError::invalid(format!(
                "`{}` is not a variable",
                program.decl_name(decl)
            )));
        };
        let declared = match var.ty {
            Some(ty) => Some(self.to_info(ty)?),
            None => None,
        };
        let value = match init {
            Some(e) => self.lower_expr(e)?,
            None => self.null_value(TypeInfo::Null),
        };
        let info = match declared {
            // An untyped callback annotation keeps what is known about the
            // function assigned.
            Some(TypeInfo::Closure(ClosureInfo { sig: None, .. })) if value.info.is_callable() => {
                value.info
            }
            Some(info) => info,
            None if value.info.is_nullish() => TypeInfo::Opaque,
            None => value.info,
        };
        let value = self.coerce(value, info)?;
        let value = self.boxed(value);
        let text = self.name_str(d.name);

        if self.at_module_level() {
            let global = self.cx.module.add_global(
                &format!("global.{text}"),
                TyId::PTR,
                false,
                ConstInit::Zero,
            );
            let addr = self.b.const_global(global);
            self.b.store(value, addr);
            self.bind_declaration(d.name, ScopeBinding::Global { global, info });
        } else {
            let cell = self.new_cell(value, text);
            self.scope.bind_declared(d.name, decl, cell, info);
        }
        self.refresh_sites();
        Ok(())
    }

    /// Return from the current body according to its [`ReturnKind`].
    pub(crate) fn emit_return(&mut self, value: Option<Lowered>) -> CodegenResult<()> {
        match self.ret {
            ReturnKind::Entry => self.b.ret(None),
            ReturnKind::Discard => {
                let null = self.b.const_null();
                self.b.ret(Some(null));
            }
            ReturnKind::Value { declared, inferred } => {
                let value = match value {
                    Some(v) => v,
                    None => self.null_value(TypeInfo::Void),
                };
                let value = match declared.or(inferred) {
                    Some(target) => self.coerce(value, target)?,
                    None => {
                        let first = if value.info == TypeInfo::Null {
                            TypeInfo::Opaque
                        } else {
                            value.info
                        };
                        self.ret = ReturnKind::Value {
                            declared,
                            inferred: Some(first),
                        };
                        self.coerce(value, first)?
                    }
                };
                let p = self.boxed(value);
                self.b.ret(Some(p));
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: ExprId,
        then_branch: &[StmtId],
        else_branch: &[StmtId],
    ) -> CodegenResult<()> {
        let c = self.lower_expr(cond)?;
        let c = self.truthy(c)?;
        let then_block = self.b.append_block("if.then");
        let else_block = self.b.append_block("if.else");
        let end = self.b.append_block("if.end");
        self.b.cond_br(c, then_block, else_block);

        self.b.position_at_end(then_block);
        self.lower_nested_block(then_branch)?;
        if !self.b.is_terminated() {
            self.b.br(end);
        }
        self.b.position_at_end(else_block);
        self.lower_nested_block(else_branch)?;
        if !self.b.is_terminated() {
            self.b.br(end);
        }
        self.b.position_at_end(end);
        Ok(())
    }

    fn lower_while(&mut self, cond: ExprId, body: &[StmtId]) -> CodegenResult<()> {
        let cond_block = self.b.append_block("while.cond");
        let body_block = self.b.append_block("while.body");
        let end = self.b.append_block("while.end");
        self.b.br(cond_block);

        self.b.position_at_end(cond_block);
        let c = self.lower_expr(cond)?;
        let c = self.truthy(c)?;
        self.b.cond_br(c, body_block, end);

        self.b.position_at_end(body_block);
        self.lower_nested_block(body)?;
        if !self.b.is_terminated() {
            self.b.br(cond_block);
        }
        self.b.position_at_end(end);
        Ok(())
    }
}
