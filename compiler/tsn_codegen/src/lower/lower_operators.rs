//! Assignment, arithmetic, comparison, logical operators and truthiness.

use tsn_ir::{BinaryOp, ExprId, ExprKind, Name, UnaryOp};
use tsn_lir::{BinOp, CmpPred, TyId, ValueId};

use super::{FnLowerer, Lowered};
use crate::error::{CodegenError, CodegenResult};
use crate::scope::ScopeBinding;
use crate::type_info::TypeInfo;

enum UpdateTarget {
    Name(Name),
    Property(Lowered, Name),
}

impl FnLowerer<'_, '_> {
    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    pub(crate) fn lower_assign(&mut self, target: ExprId, value: ExprId) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        match &program.expr(target).kind {
            ExprKind::Ident(name) => {
                let v = self.lower_expr(value)?;
                self.assign_name(*name, v)
            }
            ExprKind::Property { object, name } => {
                if let ExprKind::Ident(n) = &program.expr(*object).kind {
                    if let Some(ScopeBinding::Class(class)) = self.lookup(*n) {
                        let v = self.lower_expr(value)?;
                        return self.write_static(class, *name, v);
                    }
                }
                let recv = self.lower_expr(*object)?;
                let recv = self.to_boxed(recv);
                let v = self.lower_expr(value)?;
                self.write_property(recv, *name, v)
            }
            _ => Err(CodegenError::invalid("invalid assignment target")),
        }
    }

    /// Store `v` into the variable `name`.
    fn assign_name(&mut self, name: Name, v: Lowered) -> CodegenResult<Lowered> {
        let (ptr, info) = match self.lookup(name) {
            Some(ScopeBinding::Variable { cell, info }) => (cell, info),
            Some(ScopeBinding::Global { global, info }) => (self.b.const_global(global), info),
            Some(ScopeBinding::Function(_) | ScopeBinding::Class(_)) => {
                return Err(CodegenError::invalid(format!(
                    "cannot assign to declaration `{}`",
                    self.name_str(name)
                )))
            }
            None => {
                return Err(CodegenError::invalid(format!(
                    "`{}` is used before its declaration",
                    self.name_str(name)
                )))
            }
        };
        self.check_rebind(name, info, v.info)?;
        let v = self.coerce(v, info)?;
        let p = self.boxed(v);
        self.b.store(p, ptr);
        Ok(Lowered::boxed(p, info))
    }

    /// A variable whose closure code is known statically may only be
    /// rebound to closures with the same calling convention.
    fn check_rebind(&self, name: Name, current: TypeInfo, new: TypeInfo) -> CodegenResult<()> {
        let (TypeInfo::Closure(old), TypeInfo::Closure(next)) = (current, new) else {
            return Ok(());
        };
        let (Some(old_code), Some(new_code)) = (old.code, next.code) else {
            return Ok(());
        };
        if old_code == new_code {
            return Ok(());
        }
        let registry = &self.cx.registry;
        let same = match (registry.closure(old_code), registry.closure(new_code)) {
            (Some(a), Some(b)) => a.params == b.params && a.ret == b.ret,
            _ => false,
        };
        if same {
            Ok(())
        } else {
            Err(CodegenError::unsupported(format!(
                "rebinding `{}` to a function with a different signature",
                self.name_str(name)
            )))
        }
    }

    /// `++`/`--` on a number variable or property.
    fn lower_update(&mut self, op: UnaryOp, operand: ExprId) -> CodegenResult<Lowered> {
        let program = self.cx.program;
        let bin = match op {
            UnaryOp::PreInc | UnaryOp::PostInc => BinOp::FAdd,
            _ => BinOp::FSub,
        };
        let prefix = matches!(op, UnaryOp::PreInc | UnaryOp::PreDec);
        // The receiver of a property is evaluated once.
        let (old, target) = match &program.expr(operand).kind {
            ExprKind::Ident(name) => (self.lower_ident(*name)?, UpdateTarget::Name(*name)),
            ExprKind::Property { object, name } => {
                let recv = self.lower_expr(*object)?;
                let recv = self.to_boxed(recv);
                (self.read_property(recv, *name)?, UpdateTarget::Property(recv, *name))
            }
            _ => return Err(CodegenError::invalid("invalid update target")),
        };
        if old.info != TypeInfo::Number {
            return Err(CodegenError::unsupported(format!(
                "`++`/`--` on `{}`",
                self.cx.info_name(old.info)
            )));
        }
        let x = self.raw(old)?;
        let one = self.b.const_f64(1.0);
        let new = self.b.binary(bin, x, one, "update");
        let stored = Lowered::raw(new, TypeInfo::Number);
        match target {
            UpdateTarget::Name(name) => self.assign_name(name, stored)?,
            UpdateTarget::Property(recv, name) => self.write_property(recv, name, stored)?,
        };
        Ok(Lowered::raw(if prefix { new } else { x }, TypeInfo::Number))
    }

    // -----------------------------------------------------------------------
    // Binary
    // -----------------------------------------------------------------------

    pub(crate) fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> CodegenResult<Lowered> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lower_logical(op, lhs, rhs);
        }
        let l = self.lower_expr(lhs)?;
        let r = self.lower_expr(rhs)?;
        match (op, l.info, r.info) {
            (BinaryOp::StrictEq | BinaryOp::StrictNotEq, _, _) => {
                let eq = self.equality(l, r)?;
                let v = if op == BinaryOp::StrictNotEq {
                    self.b.not(eq, "ne")
                } else {
                    eq
                };
                Ok(Lowered::raw(v, TypeInfo::Boolean))
            }
            (BinaryOp::Add, TypeInfo::String, TypeInfo::String) => {
                let (a, b) = (self.raw(l)?, self.raw(r)?);
                Ok(Lowered::raw(self.b.binary(BinOp::Concat, a, b, "concat"), TypeInfo::String))
            }
            (_, TypeInfo::Number, TypeInfo::Number) => {
                let (a, b) = (self.raw(l)?, self.raw(r)?);
                let v = match op {
                    BinaryOp::Add => Lowered::raw(self.b.binary(BinOp::FAdd, a, b, "add"), TypeInfo::Number),
                    BinaryOp::Sub => Lowered::raw(self.b.binary(BinOp::FSub, a, b, "sub"), TypeInfo::Number),
                    BinaryOp::Mul => Lowered::raw(self.b.binary(BinOp::FMul, a, b, "mul"), TypeInfo::Number),
                    BinaryOp::Div => Lowered::raw(self.b.binary(BinOp::FDiv, a, b, "div"), TypeInfo::Number),
                    BinaryOp::Lt => Lowered::raw(self.b.cmp(CmpPred::Lt, a, b, "lt"), TypeInfo::Boolean),
                    BinaryOp::Gt => Lowered::raw(self.b.cmp(CmpPred::Gt, a, b, "gt"), TypeInfo::Boolean),
                    BinaryOp::LtEq => Lowered::raw(self.b.cmp(CmpPred::Le, a, b, "le"), TypeInfo::Boolean),
                    BinaryOp::GtEq => Lowered::raw(self.b.cmp(CmpPred::Ge, a, b, "ge"), TypeInfo::Boolean),
                    BinaryOp::StrictEq | BinaryOp::StrictNotEq | BinaryOp::And | BinaryOp::Or => {
                        return Err(CodegenError::invalid("operator lowered out of order"))
                    }
                };
                Ok(v)
            }
            _ => Err(CodegenError::unsupported(format!(
                "`{}` on `{}` and `{}`",
                op.as_str(),
                self.cx.info_name(l.info),
                self.cx.info_name(r.info)
            ))),
        }
    }

    /// `i1` that is true when `l === r`.
    ///
    /// Primitives of the same type compare by value; everything else
    /// compares by pointer. An optional union equals null when absent.
    fn equality(&mut self, l: Lowered, r: Lowered) -> CodegenResult<ValueId> {
        for (a, b) in [(l, r), (r, l)] {
            if let TypeInfo::Union(shape) = a.info {
                if b.info.is_nullish() && self.cx.union_meta(shape)?.optional {
                    return self.is_absent(a);
                }
            }
        }
        if l.info == r.info && l.info.is_primitive() {
            let (a, b) = (self.raw(l)?, self.raw(r)?);
            return Ok(self.b.cmp(CmpPred::Eq, a, b, "eq"));
        }
        let (a, b) = (self.boxed(l), self.boxed(r));
        Ok(self.b.cmp(CmpPred::Eq, a, b, "eq"))
    }

    /// `&&`/`||`: the right operand runs only when needed. The result is
    /// the truthiness of the last operand evaluated.
    fn lower_logical(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> CodegenResult<Lowered> {
        let result = self.b.alloc(TyId::I1, "logic");
        let l = self.lower_expr(lhs)?;
        let lt = self.truthy(l)?;
        self.b.store(lt, result);
        let rhs_block = self.b.append_block("logic.rhs");
        let done = self.b.append_block("logic.done");
        if op == BinaryOp::And {
            self.b.cond_br(lt, rhs_block, done);
        } else {
            self.b.cond_br(lt, done, rhs_block);
        }
        self.b.position_at_end(rhs_block);
        let r = self.lower_expr(rhs)?;
        let rt = self.truthy(r)?;
        self.b.store(rt, result);
        self.b.br(done);
        self.b.position_at_end(done);
        Ok(Lowered::raw(self.b.load(TyId::I1, result, "logic"), TypeInfo::Boolean))
    }

    // -----------------------------------------------------------------------
    // Unary
    // -----------------------------------------------------------------------

    pub(crate) fn lower_unary(&mut self, op: UnaryOp, operand: ExprId) -> CodegenResult<Lowered> {
        if op.is_update() {
            return self.lower_update(op, operand);
        }
        let v = self.lower_expr(operand)?;
        match op {
            UnaryOp::Neg if v.info == TypeInfo::Number => {
                let x = self.raw(v)?;
                Ok(Lowered::raw(self.b.fneg(x, "neg"), TypeInfo::Number))
            }
            UnaryOp::Neg => Err(CodegenError::unsupported(format!(
                "unary `-` on `{}`",
                self.cx.info_name(v.info)
            ))),
            _ => {
                let t = self.truthy(v)?;
                Ok(Lowered::raw(self.b.not(t, "not"), TypeInfo::Boolean))
            }
        }
    }

    /// `i1` truthiness of `v`: `false`, `0`, `""`, null and absent values
    /// are falsy.
    pub(crate) fn truthy(&mut self, v: Lowered) -> CodegenResult<ValueId> {
        match v.info {
            TypeInfo::Boolean => self.raw(v),
            TypeInfo::Number => {
                let x = self.raw(v)?;
                let zero = self.b.const_f64(0.0);
                Ok(self.b.cmp(CmpPred::Ne, x, zero, "truthy"))
            }
            TypeInfo::String => {
                let s = self.raw(v)?;
                let empty = self.b.const_str("");
                Ok(self.b.cmp(CmpPred::Ne, s, empty, "truthy"))
            }
            TypeInfo::Union(shape) if self.cx.union_meta(shape)?.optional => {
                self.union_is_present(v, shape)
            }
            info if info.is_nullish() => Ok(self.b.const_bool(false)),
            _ => {
                let p = self.boxed(v);
                let null = self.b.const_null();
                Ok(self.b.cmp(CmpPred::Ne, p, null, "truthy"))
            }
        }
    }
}
